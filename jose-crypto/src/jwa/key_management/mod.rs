//! Key management algorithms for the `alg` header of a JWE,
//! see section 4 of [`rfc7518`].
//!
//! Every algorithm either determines the content encryption key (CEK)
//! itself (`dir`, `ECDH-ES`) or wraps a CEK chosen by the caller, and
//! may emit extra per recipient header parameters while doing so.
//!
//! [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518

use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use super::{AlgorithmDescriptor, AlgorithmUsage, HeaderLocation};
use crate::{JWK, JoseError, KeyOperation, util::random_bytes};

mod aes_kw;
mod ecdh_es;
mod pbes2;
mod rsa;

pub use pbes2::Pbes2Config;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KeyManagementAlgorithm {
    /// Direct use of a shared symmetric key as the CEK (Recommended)
    Dir,
    /// RSAES-PKCS1-v1_5 (Recommended-)
    ///
    /// Unwrap failures never surface here: a random CEK is substituted
    /// and the error shows up as an authentication failure of the content.
    Rsa1_5,
    /// RSAES OAEP using default parameters (Recommended+)
    RsaOaep,
    /// RSAES OAEP using SHA-256 and MGF1 with SHA-256 (Optional)
    RsaOaep256,
    /// AES Key Wrap with default initial value using 128-bit key (Recommended)
    A128KW,
    /// AES Key Wrap with default initial value using 192-bit key (Optional)
    A192KW,
    /// AES Key Wrap with default initial value using 256-bit key (Recommended)
    A256KW,
    /// Key wrapping with AES GCM using 128-bit key (Optional)
    A128GCMKW,
    /// Key wrapping with AES GCM using 192-bit key (Optional)
    A192GCMKW,
    /// Key wrapping with AES GCM using 256-bit key (Optional)
    A256GCMKW,
    /// PBES2 with HMAC SHA-256 and "A128KW" wrapping (Optional)
    Pbes2Hs256A128KW,
    /// PBES2 with HMAC SHA-384 and "A192KW" wrapping (Optional)
    Pbes2Hs384A192KW,
    /// PBES2 with HMAC SHA-512 and "A256KW" wrapping (Optional)
    Pbes2Hs512A256KW,
    /// Elliptic Curve Diffie-Hellman Ephemeral Static key agreement using Concat KDF (Recommended+)
    EcdhEs,
    /// ECDH-ES using Concat KDF and CEK wrapped with "A128KW" (Recommended)
    EcdhEsA128KW,
    /// ECDH-ES using Concat KDF and CEK wrapped with "A192KW" (Optional)
    EcdhEsA192KW,
    /// ECDH-ES using Concat KDF and CEK wrapped with "A256KW" (Recommended)
    EcdhEsA256KW,
}

/// Result of [`KeyManagementAlgorithm::wrap`]
pub struct WrappedKey {
    /// The content encryption key, either the one passed in or a new one
    pub cek: Zeroizing<Vec<u8>>,
    /// Empty for direct key agreement and direct encryption
    pub encrypted_key: Vec<u8>,
    /// Header parameters to add to the recipient header
    pub header: Map<String, Value>,
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedKey")
            .field("encrypted_key", &self.encrypted_key)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl KeyManagementAlgorithm {
    pub const ALL: [Self; 17] = [
        Self::Dir,
        Self::Rsa1_5,
        Self::RsaOaep,
        Self::RsaOaep256,
        Self::A128KW,
        Self::A192KW,
        Self::A256KW,
        Self::A128GCMKW,
        Self::A192GCMKW,
        Self::A256GCMKW,
        Self::Pbes2Hs256A128KW,
        Self::Pbes2Hs384A192KW,
        Self::Pbes2Hs512A256KW,
        Self::EcdhEs,
        Self::EcdhEsA128KW,
        Self::EcdhEsA192KW,
        Self::EcdhEsA256KW,
    ];

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn descriptor(self) -> AlgorithmDescriptor {
        let (name, description) = match self {
            Self::Dir => ("dir", "Direct use of a shared symmetric key"),
            Self::Rsa1_5 => ("RSA1_5", "RSAES-PKCS1-v1_5"),
            Self::RsaOaep => ("RSA-OAEP", "RSAES OAEP using default parameters"),
            Self::RsaOaep256 => ("RSA-OAEP-256", "RSAES OAEP using SHA-256 and MGF1 with SHA-256"),
            Self::A128KW => ("A128KW", "AES Key Wrap using 128-bit key"),
            Self::A192KW => ("A192KW", "AES Key Wrap using 192-bit key"),
            Self::A256KW => ("A256KW", "AES Key Wrap using 256-bit key"),
            Self::A128GCMKW => ("A128GCMKW", "Key wrapping with AES GCM using 128-bit key"),
            Self::A192GCMKW => ("A192GCMKW", "Key wrapping with AES GCM using 192-bit key"),
            Self::A256GCMKW => ("A256GCMKW", "Key wrapping with AES GCM using 256-bit key"),
            Self::Pbes2Hs256A128KW => (
                "PBES2-HS256+A128KW",
                "PBES2 with HMAC SHA-256 and \"A128KW\" wrapping",
            ),
            Self::Pbes2Hs384A192KW => (
                "PBES2-HS384+A192KW",
                "PBES2 with HMAC SHA-384 and \"A192KW\" wrapping",
            ),
            Self::Pbes2Hs512A256KW => (
                "PBES2-HS512+A256KW",
                "PBES2 with HMAC SHA-512 and \"A256KW\" wrapping",
            ),
            Self::EcdhEs => (
                "ECDH-ES",
                "ECDH-ES using Concat KDF",
            ),
            Self::EcdhEsA128KW => (
                "ECDH-ES+A128KW",
                "ECDH-ES using Concat KDF and \"A128KW\" wrapping",
            ),
            Self::EcdhEsA192KW => (
                "ECDH-ES+A192KW",
                "ECDH-ES using Concat KDF and \"A192KW\" wrapping",
            ),
            Self::EcdhEsA256KW => (
                "ECDH-ES+A256KW",
                "ECDH-ES using Concat KDF and \"A256KW\" wrapping",
            ),
        };
        AlgorithmDescriptor {
            name,
            description,
            key_size: self.key_size(),
            location: HeaderLocation::Alg,
            usage: AlgorithmUsage::KeyExchange,
        }
    }

    /// Fixed key size in bits, `None` when it follows from the content algorithm
    fn key_size(self) -> Option<usize> {
        match self {
            Self::Dir | Self::EcdhEs => None,
            Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256 => Some(2048),
            Self::A128KW | Self::A128GCMKW | Self::Pbes2Hs256A128KW | Self::EcdhEsA128KW => {
                Some(128)
            }
            Self::A192KW | Self::A192GCMKW | Self::Pbes2Hs384A192KW | Self::EcdhEsA192KW => {
                Some(192)
            }
            Self::A256KW | Self::A256GCMKW | Self::Pbes2Hs512A256KW | Self::EcdhEsA256KW => {
                Some(256)
            }
        }
    }

    /// Size in bytes of the AES key encryption key for the wrapping variants
    fn kek_len(self) -> usize {
        self.key_size().unwrap_or(0) / 8
    }

    /// Determine (or reuse) the CEK and produce the encrypted key for one recipient
    ///
    /// `header` is the merged JOSE header of that recipient. `cek_bits` is
    /// the key size of the content encryption algorithm. Passing an
    /// existing `cek` is how additional recipients share one content
    /// encryption; `dir` and `ECDH-ES` cannot do that and fail with
    /// [`JoseError::InvalidOperation`].
    pub fn wrap(
        self,
        key: &JWK,
        cek_bits: usize,
        cek: Option<&[u8]>,
        header: &Map<String, Value>,
        pbes2: &Pbes2Config,
    ) -> Result<WrappedKey, JoseError> {
        const OP: KeyOperation = KeyOperation::WrapKey;

        match self {
            Self::Dir => {
                reject_existing_cek(self, cek)?;
                let k = key.symmetric_key(KeyOperation::Encrypt)?;
                check_len(k, cek_bits / 8)?;
                Ok(WrappedKey {
                    cek: Zeroizing::new(k.to_vec()),
                    encrypted_key: Vec::new(),
                    header: Map::new(),
                })
            }
            Self::Rsa1_5 | Self::RsaOaep | Self::RsaOaep256 => {
                let cek = content_key(cek_bits, cek)?;
                let encrypted_key = rsa::encrypt(self, key, &cek)?;
                Ok(WrappedKey {
                    cek,
                    encrypted_key,
                    header: Map::new(),
                })
            }
            Self::A128KW | Self::A192KW | Self::A256KW => {
                let kek = key.symmetric_key(OP)?;
                check_len(kek, self.kek_len())?;
                let cek = content_key(cek_bits, cek)?;
                let encrypted_key = aes_kw::wrap(kek, &cek)?;
                Ok(WrappedKey {
                    cek,
                    encrypted_key,
                    header: Map::new(),
                })
            }
            Self::A128GCMKW | Self::A192GCMKW | Self::A256GCMKW => {
                let kek = key.symmetric_key(OP)?;
                check_len(kek, self.kek_len())?;
                let cek = content_key(cek_bits, cek)?;
                let (encrypted_key, header) = aes_kw::gcm_wrap(kek, &cek)?;
                Ok(WrappedKey {
                    cek,
                    encrypted_key,
                    header,
                })
            }
            Self::Pbes2Hs256A128KW | Self::Pbes2Hs384A192KW | Self::Pbes2Hs512A256KW => {
                let cek = content_key(cek_bits, cek)?;
                let (encrypted_key, header) = pbes2::wrap(self, key, &cek, header, pbes2)?;
                Ok(WrappedKey {
                    cek,
                    encrypted_key,
                    header,
                })
            }
            Self::EcdhEs => {
                reject_existing_cek(self, cek)?;
                let (derived, header) = ecdh_es::agree(self, key, cek_bits, header)?;
                Ok(WrappedKey {
                    cek: derived,
                    encrypted_key: Vec::new(),
                    header,
                })
            }
            Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => {
                let (kek, header) = ecdh_es::agree(self, key, self.kek_len() * 8, header)?;
                let cek = content_key(cek_bits, cek)?;
                let encrypted_key = aes_kw::wrap(&kek, &cek)?;
                Ok(WrappedKey {
                    cek,
                    encrypted_key,
                    header,
                })
            }
        }
    }

    /// Recover the CEK of one recipient
    ///
    /// `header` is the merged JOSE header of that recipient, from which
    /// algorithm specific parameters (`iv`, `tag`, `p2s`, `p2c`, `epk`,
    /// `apu`, `apv`) are read.
    pub fn unwrap(
        self,
        key: &JWK,
        cek_bits: usize,
        encrypted_key: &[u8],
        header: &Map<String, Value>,
        pbes2: &Pbes2Config,
    ) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        const OP: KeyOperation = KeyOperation::UnwrapKey;

        let cek = match self {
            Self::Dir => {
                require_empty_encrypted_key(self, encrypted_key)?;
                let k = key.symmetric_key(KeyOperation::Decrypt)?;
                Zeroizing::new(k.to_vec())
            }
            Self::Rsa1_5 => return rsa::decrypt_pkcs1(key, cek_bits / 8, encrypted_key),
            Self::RsaOaep | Self::RsaOaep256 => rsa::decrypt_oaep(self, key, encrypted_key)?,
            Self::A128KW | Self::A192KW | Self::A256KW => {
                let kek = key.symmetric_key(OP)?;
                check_len(kek, self.kek_len())?;
                aes_kw::unwrap(kek, encrypted_key)?
            }
            Self::A128GCMKW | Self::A192GCMKW | Self::A256GCMKW => {
                let kek = key.symmetric_key(OP)?;
                check_len(kek, self.kek_len())?;
                aes_kw::gcm_unwrap(kek, encrypted_key, header)?
            }
            Self::Pbes2Hs256A128KW | Self::Pbes2Hs384A192KW | Self::Pbes2Hs512A256KW => {
                pbes2::unwrap(self, key, encrypted_key, header, pbes2)?
            }
            Self::EcdhEs => {
                require_empty_encrypted_key(self, encrypted_key)?;
                ecdh_es::derive(self, key, cek_bits, header)?
            }
            Self::EcdhEsA128KW | Self::EcdhEsA192KW | Self::EcdhEsA256KW => {
                let kek = ecdh_es::derive(self, key, self.kek_len() * 8, header)?;
                aes_kw::unwrap(&kek, encrypted_key)?
            }
        };
        check_len(&cek, cek_bits / 8)?;
        Ok(cek)
    }
}

fn reject_existing_cek(alg: KeyManagementAlgorithm, cek: Option<&[u8]>) -> Result<(), JoseError> {
    if cek.is_some() {
        return Err(JoseError::InvalidOperation(format!(
            "{} determines the content encryption key and cannot share it between recipients",
            alg.name()
        )));
    }
    Ok(())
}

fn require_empty_encrypted_key(
    alg: KeyManagementAlgorithm,
    encrypted_key: &[u8],
) -> Result<(), JoseError> {
    if !encrypted_key.is_empty() {
        return Err(JoseError::invalid_format(format!(
            "{} requires an empty encrypted key",
            alg.name()
        )));
    }
    Ok(())
}

/// The existing CEK, or a fresh random one
fn content_key(cek_bits: usize, cek: Option<&[u8]>) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    match cek {
        Some(cek) => {
            check_len(cek, cek_bits / 8)?;
            Ok(Zeroizing::new(cek.to_vec()))
        }
        None => random_bytes(cek_bits / 8),
    }
}

fn check_len(key: &[u8], expected: usize) -> Result<(), JoseError> {
    if key.len() != expected {
        return Err(JoseError::InvalidKeyLength {
            expected,
            actual: key.len(),
        });
    }
    Ok(())
}

/// Optional base64url encoded header parameter
fn header_bytes(header: &Map<String, Value>, name: &str) -> Result<Option<Vec<u8>>, JoseError> {
    match header.get(name) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(BASE64_URL_SAFE_NO_PAD.decode(value)?)),
        Some(_) => Err(JoseError::invalid_format(format!(
            "header parameter {name} must be a base64url string"
        ))),
    }
}

fn encode(value: &[u8]) -> Value {
    Value::String(BASE64_URL_SAFE_NO_PAD.encode(value))
}
