use aes::{Aes128, Aes192, Aes256};
use aes_gcm::{
    AeadInPlace, Aes128Gcm, Aes256Gcm, AesGcm, KeyInit,
    aead::{consts::U12, generic_array::GenericArray},
};
use aws_lc_rs::hmac;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::{AlgorithmDescriptor, AlgorithmUsage, HeaderLocation};
use crate::{
    JoseError,
    util::{authentication_failure, crypto_error, random_bytes},
};

type Aes192Gcm = AesGcm<Aes192, U12>;

pub(crate) const GCM_IV_LEN: usize = 12;
pub(crate) const GCM_TAG_LEN: usize = 16;
const CBC_IV_LEN: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Algorithms for the `enc` header of a JWE, see section 5 of [`rfc7518`]
///
/// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518
pub enum ContentEncryptionAlgorithm {
    /// AES_128_CBC_HMAC_SHA_256 authenticated encryption (Required)
    A128CbcHs256,
    /// AES_192_CBC_HMAC_SHA_384 authenticated encryption (Optional)
    A192CbcHs384,
    /// AES_256_CBC_HMAC_SHA_512 authenticated encryption (Required)
    A256CbcHs512,
    /// AES GCM using 128-bit key (Recommended)
    A128Gcm,
    /// AES GCM using 192-bit key (Optional)
    A192Gcm,
    /// AES GCM using 256-bit key (Recommended)
    A256Gcm,
}

/// Output of content encryption, shared by every recipient of a JWE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedContent {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

impl ContentEncryptionAlgorithm {
    pub const ALL: [Self; 6] = [
        Self::A128CbcHs256,
        Self::A192CbcHs384,
        Self::A256CbcHs512,
        Self::A128Gcm,
        Self::A192Gcm,
        Self::A256Gcm,
    ];

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn descriptor(self) -> AlgorithmDescriptor {
        let (name, description) = match self {
            Self::A128CbcHs256 => (
                "A128CBC-HS256",
                "AES_128_CBC_HMAC_SHA_256 authenticated encryption algorithm",
            ),
            Self::A192CbcHs384 => (
                "A192CBC-HS384",
                "AES_192_CBC_HMAC_SHA_384 authenticated encryption algorithm",
            ),
            Self::A256CbcHs512 => (
                "A256CBC-HS512",
                "AES_256_CBC_HMAC_SHA_512 authenticated encryption algorithm",
            ),
            Self::A128Gcm => ("A128GCM", "AES GCM using 128-bit key"),
            Self::A192Gcm => ("A192GCM", "AES GCM using 192-bit key"),
            Self::A256Gcm => ("A256GCM", "AES GCM using 256-bit key"),
        };
        AlgorithmDescriptor {
            name,
            description,
            key_size: Some(self.key_size()),
            location: HeaderLocation::Enc,
            usage: AlgorithmUsage::Encryption,
        }
    }

    /// Size of the content encryption key in bits
    ///
    /// For the CBC-HMAC family this is the combined MAC and encryption key.
    pub fn key_size(self) -> usize {
        match self {
            Self::A128CbcHs256 => 256,
            Self::A192CbcHs384 => 384,
            Self::A256CbcHs512 => 512,
            Self::A128Gcm => 128,
            Self::A192Gcm => 192,
            Self::A256Gcm => 256,
        }
    }

    fn check_key(self, key: &[u8]) -> Result<(), JoseError> {
        let expected = self.key_size() / 8;
        if key.len() != expected {
            return Err(JoseError::InvalidKeyLength {
                expected,
                actual: key.len(),
            });
        }
        Ok(())
    }

    pub fn encrypt(
        self,
        key: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<EncryptedContent, JoseError> {
        self.check_key(key)?;
        match self {
            Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512 => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                let iv = random_bytes(CBC_IV_LEN)?;
                let ciphertext = cbc_encrypt(enc_key, &iv, plaintext)?;
                let tag = self.cbc_tag(mac_key, aad, &iv, &ciphertext);
                Ok(EncryptedContent {
                    iv: iv.to_vec(),
                    ciphertext,
                    tag,
                })
            }
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => {
                let iv = random_bytes(GCM_IV_LEN)?;
                let (ciphertext, tag) = gcm_encrypt(key, &iv, aad, plaintext)?;
                Ok(EncryptedContent {
                    iv: iv.to_vec(),
                    ciphertext,
                    tag,
                })
            }
        }
    }

    /// Authenticate and decrypt
    ///
    /// For CBC-HMAC the tag is verified in constant time before any
    /// block is decrypted, and padding errors are reported the same
    /// way as a bad tag.
    pub fn decrypt(
        self,
        key: &[u8],
        aad: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        self.check_key(key)?;
        match self {
            Self::A128CbcHs256 | Self::A192CbcHs384 | Self::A256CbcHs512 => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                let expected = self.cbc_tag(mac_key, aad, iv, ciphertext);
                if !bool::from(expected.ct_eq(tag)) {
                    return Err(JoseError::AuthenticationFailure);
                }
                if iv.len() != CBC_IV_LEN {
                    return Err(JoseError::AuthenticationFailure);
                }
                cbc_decrypt(enc_key, iv, ciphertext).map(Zeroizing::new)
            }
            Self::A128Gcm | Self::A192Gcm | Self::A256Gcm => {
                gcm_decrypt(key, iv, aad, ciphertext, tag)
            }
        }
    }

    fn cbc_tag(self, mac_key: &[u8], aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
        let algorithm = match self {
            Self::A192CbcHs384 => hmac::HMAC_SHA384,
            Self::A256CbcHs512 => hmac::HMAC_SHA512,
            _ => hmac::HMAC_SHA256,
        };
        let aad_bits = (aad.len() as u64).wrapping_mul(8);

        let mut ctx = hmac::Context::with_key(&hmac::Key::new(algorithm, mac_key));
        ctx.update(aad);
        ctx.update(iv);
        ctx.update(ciphertext);
        ctx.update(&aad_bits.to_be_bytes());
        let mac = ctx.sign();
        // truncated to the size of the MAC key
        mac.as_ref()[..mac_key.len()].to_vec()
    }
}

fn cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, JoseError> {
    let invalid = |err| crypto_error("AES-CBC key", err);
    Ok(match key.len() {
        16 => cbc::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        24 => cbc::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
        _ => cbc::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(invalid)?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext),
    })
}

fn cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, JoseError> {
    match key.len() {
        16 => cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(authentication_failure)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(authentication_failure),
        24 => cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(authentication_failure)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(authentication_failure),
        _ => cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(authentication_failure)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(authentication_failure),
    }
}

/// AES-GCM encryption with the AES variant picked from the key length,
/// returning `(ciphertext, tag)`.
pub(crate) fn gcm_encrypt(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
    match key.len() {
        16 => gcm_seal::<Aes128Gcm>(key, iv, aad, plaintext),
        24 => gcm_seal::<Aes192Gcm>(key, iv, aad, plaintext),
        32 => gcm_seal::<Aes256Gcm>(key, iv, aad, plaintext),
        actual => Err(JoseError::InvalidKeyLength {
            expected: 32,
            actual,
        }),
    }
}

pub(crate) fn gcm_decrypt(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    if iv.len() != GCM_IV_LEN || tag.len() != GCM_TAG_LEN {
        return Err(JoseError::AuthenticationFailure);
    }
    match key.len() {
        16 => gcm_open::<Aes128Gcm>(key, iv, aad, ciphertext, tag),
        24 => gcm_open::<Aes192Gcm>(key, iv, aad, ciphertext, tag),
        32 => gcm_open::<Aes256Gcm>(key, iv, aad, ciphertext, tag),
        actual => Err(JoseError::InvalidKeyLength {
            expected: 32,
            actual,
        }),
    }
}

fn gcm_seal<C: KeyInit + AeadInPlace>(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), JoseError> {
    if iv.len() != GCM_IV_LEN {
        return Err(JoseError::invalid_format("AES-GCM requires a 96 bit IV"));
    }
    let cipher = C::new_from_slice(key).map_err(|err| crypto_error("AES-GCM key", err))?;
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(iv), aad, &mut buffer)
        .map_err(|err| crypto_error("AES-GCM encryption", err))?;
    Ok((buffer, tag.to_vec()))
}

fn gcm_open<C: KeyInit + AeadInPlace>(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let cipher = C::new_from_slice(key).map_err(authentication_failure)?;
    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    cipher
        .decrypt_in_place_detached(
            GenericArray::from_slice(iv),
            aad,
            buffer.as_mut_slice(),
            GenericArray::from_slice(tag),
        )
        .map_err(authentication_failure)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn key_for(alg: ContentEncryptionAlgorithm) -> Vec<u8> {
        (0..alg.key_size() / 8).map(|i| i as u8).collect()
    }

    #[test]
    fn cbc_hmac_matches_rfc7518_appendix_b1() {
        let key: Vec<u8> = (0u8..32).collect();
        let plaintext = b"A cipher system must not be required to be secret, and it must be able to fall into the hands of the enemy without inconvenience";
        let iv = [
            0x1a, 0xf3, 0x8c, 0x2d, 0xc2, 0xb9, 0x6f, 0xfd, 0xd8, 0x66, 0x94, 0x09, 0x23, 0x41,
            0xbc, 0x04,
        ];
        let aad = b"The second principle of Auguste Kerckhoffs";
        let expected_tag = [
            0x65, 0x2c, 0x3f, 0xa3, 0x6b, 0x0a, 0x7c, 0x5b, 0x32, 0x19, 0xfa, 0xb3, 0xa3, 0x0b,
            0xc1, 0xc4,
        ];

        let alg = ContentEncryptionAlgorithm::A128CbcHs256;
        let ciphertext = cbc_encrypt(&key[16..], &iv, plaintext).unwrap();
        assert_eq!(ciphertext.len(), 144);
        assert_eq!(&ciphertext[..4], &[0xc8, 0x0e, 0xdf, 0xa3]);
        assert_eq!(alg.cbc_tag(&key[..16], aad, &iv, &ciphertext), expected_tag);

        let decrypted = alg.decrypt(&key, aad, &iv, &ciphertext, &expected_tag).unwrap();
        assert_eq!(decrypted.as_slice(), plaintext);
    }

    #[test]
    fn every_algorithm_round_trips_and_detects_tampering() {
        for alg in ContentEncryptionAlgorithm::ALL {
            let key = key_for(alg);
            let content = alg.encrypt(&key, b"aad", b"hello world").unwrap();
            let plaintext = alg
                .decrypt(&key, b"aad", &content.iv, &content.ciphertext, &content.tag)
                .unwrap();
            assert_eq!(plaintext.as_slice(), b"hello world");

            assert_eq!(
                alg.decrypt(&key, b"aaD", &content.iv, &content.ciphertext, &content.tag),
                Err(JoseError::AuthenticationFailure),
                "{alg:?}"
            );
            let mut tag = content.tag.clone();
            tag[0] ^= 1;
            assert_eq!(
                alg.decrypt(&key, b"aad", &content.iv, &content.ciphertext, &tag),
                Err(JoseError::AuthenticationFailure),
                "{alg:?}"
            );
            let mut iv = content.iv.clone();
            iv[0] ^= 1;
            assert_eq!(
                alg.decrypt(&key, b"aad", &iv, &content.ciphertext, &content.tag),
                Err(JoseError::AuthenticationFailure),
                "{alg:?}"
            );
        }
    }

    #[test]
    fn tag_lengths_follow_the_algorithm() {
        for (alg, len) in [
            (ContentEncryptionAlgorithm::A128CbcHs256, 16),
            (ContentEncryptionAlgorithm::A192CbcHs384, 24),
            (ContentEncryptionAlgorithm::A256CbcHs512, 32),
            (ContentEncryptionAlgorithm::A192Gcm, 16),
        ] {
            let content = alg.encrypt(&key_for(alg), b"", b"").unwrap();
            assert_eq!(content.tag.len(), len);
        }
    }

    #[test]
    fn wrong_key_size_is_rejected() {
        assert_eq!(
            ContentEncryptionAlgorithm::A256Gcm.encrypt(&[0; 16], b"", b"x"),
            Err(JoseError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        );
        assert_eq!(
            ContentEncryptionAlgorithm::A128CbcHs256.encrypt(&[0; 16], b"", b"x"),
            Err(JoseError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        );
    }

    #[quickcheck]
    fn any_ciphertext_mutation_fails_authentication(plaintext: Vec<u8>, index: usize) -> bool {
        ContentEncryptionAlgorithm::ALL.into_iter().all(|alg| {
            let key = key_for(alg);
            let content = alg.encrypt(&key, b"aad", &plaintext).unwrap();
            let round_trip = alg
                .decrypt(&key, b"aad", &content.iv, &content.ciphertext, &content.tag)
                .is_ok_and(|p| p.as_slice() == plaintext.as_slice());
            if content.ciphertext.is_empty() {
                return round_trip;
            }
            let mut ciphertext = content.ciphertext.clone();
            let len = ciphertext.len();
            ciphertext[index % len] ^= 0x80;
            round_trip
                && alg.decrypt(&key, b"aad", &content.iv, &ciphertext, &content.tag)
                    == Err(JoseError::AuthenticationFailure)
        })
    }
}
