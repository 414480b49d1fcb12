use std::num::NonZeroU32;

use aws_lc_rs::pbkdf2;
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use super::{KeyManagementAlgorithm, aes_kw, encode, header_bytes};
use crate::{JWK, JoseError, KeyOperation, macros::generate_set_and_with, util::random_bytes};

#[derive(Debug, Clone, PartialEq, Eq)]
/// Parameters for the PBES2 key management algorithms
///
/// `max_iterations` bounds the `p2c` value accepted from a token,
/// a token can otherwise make the recipient spend arbitrary CPU time.
pub struct Pbes2Config {
    default_iterations: u32,
    max_iterations: u32,
    min_salt_len: usize,
    default_salt_len: usize,
}

impl Default for Pbes2Config {
    fn default() -> Self {
        Self {
            default_iterations: 8192,
            max_iterations: 16384,
            min_salt_len: 8,
            default_salt_len: 16,
        }
    }
}

impl Pbes2Config {
    generate_set_and_with! {
        /// Iteration count used on wrap when the header has no `p2c`
        pub fn default_iterations(mut self, iterations: u32) -> Self {
            self.default_iterations = iterations;
            self
        }
    }

    generate_set_and_with! {
        /// Largest `p2c` accepted
        pub fn max_iterations(mut self, iterations: u32) -> Self {
            self.max_iterations = iterations;
            self
        }
    }

    generate_set_and_with! {
        /// Smallest `p2s` accepted, in bytes
        pub fn min_salt_len(mut self, len: usize) -> Self {
            self.min_salt_len = len;
            self
        }
    }

    generate_set_and_with! {
        /// Size of the salt generated on wrap when the header has no `p2s`
        pub fn default_salt_len(mut self, len: usize) -> Self {
            self.default_salt_len = len;
            self
        }
    }

    pub fn default_iterations(&self) -> u32 {
        self.default_iterations
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    fn check(&self, iterations: u32, salt: &[u8]) -> Result<NonZeroU32, JoseError> {
        if iterations > self.max_iterations {
            return Err(JoseError::invalid_format(format!(
                "p2c {iterations} exceeds the maximum of {}",
                self.max_iterations
            )));
        }
        if salt.len() < self.min_salt_len {
            return Err(JoseError::invalid_format(format!(
                "p2s must be at least {} bytes",
                self.min_salt_len
            )));
        }
        NonZeroU32::new(iterations).ok_or_else(|| JoseError::invalid_format("p2c must be positive"))
    }
}

pub(super) fn wrap(
    alg: KeyManagementAlgorithm,
    key: &JWK,
    cek: &[u8],
    header: &Map<String, Value>,
    config: &Pbes2Config,
) -> Result<(Vec<u8>, Map<String, Value>), JoseError> {
    let salt = match header_bytes(header, "p2s")? {
        Some(salt) => salt,
        None => random_bytes(config.default_salt_len)?.to_vec(),
    };
    let iterations = match header.get("p2c") {
        Some(value) => iterations_from(value)?,
        None => config.default_iterations,
    };

    let kek = derive_kek(
        alg,
        key.symmetric_key(KeyOperation::WrapKey)?,
        &salt,
        iterations,
        config,
    )?;
    let encrypted_key = aes_kw::wrap(&kek, cek)?;

    let mut extra = Map::new();
    extra.insert("p2s".to_owned(), encode(&salt));
    extra.insert("p2c".to_owned(), Value::from(iterations));
    Ok((encrypted_key, extra))
}

pub(super) fn unwrap(
    alg: KeyManagementAlgorithm,
    key: &JWK,
    encrypted_key: &[u8],
    header: &Map<String, Value>,
    config: &Pbes2Config,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let salt = header_bytes(header, "p2s")?
        .ok_or_else(|| JoseError::invalid_format("missing p2s header parameter"))?;
    let iterations = iterations_from(
        header
            .get("p2c")
            .ok_or_else(|| JoseError::invalid_format("missing p2c header parameter"))?,
    )?;

    let kek = derive_kek(
        alg,
        key.symmetric_key(KeyOperation::UnwrapKey)?,
        &salt,
        iterations,
        config,
    )?;
    aes_kw::unwrap(&kek, encrypted_key)
}

fn iterations_from(value: &Value) -> Result<u32, JoseError> {
    value
        .as_u64()
        .and_then(|count| u32::try_from(count).ok())
        .ok_or_else(|| JoseError::invalid_format("p2c must be an unsigned 32 bit integer"))
}

fn derive_kek(
    alg: KeyManagementAlgorithm,
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    config: &Pbes2Config,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let iterations = config.check(iterations, salt)?;
    let prf = match alg {
        KeyManagementAlgorithm::Pbes2Hs384A192KW => pbkdf2::PBKDF2_HMAC_SHA384,
        KeyManagementAlgorithm::Pbes2Hs512A256KW => pbkdf2::PBKDF2_HMAC_SHA512,
        _ => pbkdf2::PBKDF2_HMAC_SHA256,
    };

    // salt input is UTF8(alg) || 0x00 || p2s
    let name = alg.name().as_bytes();
    let mut salt_input = Vec::with_capacity(name.len() + 1 + salt.len());
    salt_input.extend_from_slice(name);
    salt_input.push(0);
    salt_input.extend_from_slice(salt);

    let mut kek = Zeroizing::new(vec![0u8; alg.kek_len()]);
    pbkdf2::derive(prf, iterations, &salt_input, password, &mut kek);
    Ok(kek)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password() -> JWK {
        JWK::new_oct(b"Thus from my lips, by yours, my sin is purged.".to_vec())
    }

    #[test]
    fn wrap_emits_salt_and_count() {
        let (_, extra) = wrap(
            KeyManagementAlgorithm::Pbes2Hs256A128KW,
            &password(),
            &[0; 32],
            &Map::new(),
            &Pbes2Config::default(),
        )
        .unwrap();
        assert_eq!(extra["p2c"], 8192);
        assert_eq!(extra["p2s"].as_str().unwrap().len(), 22);
    }

    #[test]
    fn caller_supplied_parameters_are_used() {
        let mut header = Map::new();
        header.insert("p2s".to_owned(), Value::from("2WCTcJZ1Rvd_CJuJripQ1w"));
        header.insert("p2c".to_owned(), Value::from(4096));
        let (encrypted_key, extra) = wrap(
            KeyManagementAlgorithm::Pbes2Hs256A128KW,
            &password(),
            &[1; 16],
            &header,
            &Pbes2Config::default(),
        )
        .unwrap();
        assert_eq!(extra["p2s"], "2WCTcJZ1Rvd_CJuJripQ1w");
        assert_eq!(extra["p2c"], 4096);
        assert_eq!(
            unwrap(
                KeyManagementAlgorithm::Pbes2Hs256A128KW,
                &password(),
                &encrypted_key,
                &header,
                &Pbes2Config::default(),
            )
            .unwrap()
            .as_slice(),
            &[1; 16]
        );
    }

    #[test]
    fn derived_key_matches_rfc7517_appendix_c() {
        // PBES2-HS256+A128KW from the RFC 7517 JWK encryption example
        let salt = base64::Engine::decode(
            &base64::prelude::BASE64_URL_SAFE_NO_PAD,
            "2WCTcJZ1Rvd_CJuJripQ1w",
        )
        .unwrap();
        let kek = derive_kek(
            KeyManagementAlgorithm::Pbes2Hs256A128KW,
            password().symmetric_key(KeyOperation::UnwrapKey).unwrap(),
            &salt,
            4096,
            &Pbes2Config::default(),
        )
        .unwrap();
        assert_eq!(
            kek.as_slice(),
            &[
                110, 171, 169, 92, 129, 92, 109, 117, 233, 242, 116, 233, 170, 14, 24, 75
            ]
        );
    }

    #[test]
    fn excessive_or_missing_parameters_are_rejected() {
        let alg = KeyManagementAlgorithm::Pbes2Hs512A256KW;
        let config = Pbes2Config::default().with_max_iterations(1000);

        let mut header = Map::new();
        header.insert("p2s".to_owned(), Value::from("AAAAAAAAAAA"));
        header.insert("p2c".to_owned(), Value::from(1001));
        assert!(matches!(
            unwrap(alg, &password(), &[0; 40], &header, &config),
            Err(JoseError::InvalidFormat(_))
        ));

        header.insert("p2c".to_owned(), Value::from(0));
        assert!(matches!(
            unwrap(alg, &password(), &[0; 40], &header, &config),
            Err(JoseError::InvalidFormat(_))
        ));

        // 4 byte salt
        header.insert("p2s".to_owned(), Value::from("AAAAAA"));
        header.insert("p2c".to_owned(), Value::from(10));
        assert!(matches!(
            unwrap(alg, &password(), &[0; 40], &header, &config),
            Err(JoseError::InvalidFormat(_))
        ));

        header.remove("p2s");
        assert!(matches!(
            unwrap(alg, &password(), &[0; 40], &header, &config),
            Err(JoseError::InvalidFormat(_))
        ));
    }
}
