use aws_lc_rs::rsa::{
    OAEP_SHA1_MGF1SHA1, OAEP_SHA256_MGF1SHA256, OaepAlgorithm, OaepPrivateDecryptingKey,
    OaepPublicEncryptingKey, Pkcs1PrivateDecryptingKey, Pkcs1PublicEncryptingKey,
    PrivateDecryptingKey, PublicEncryptingKey,
};
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq};
use zeroize::Zeroizing;

use super::KeyManagementAlgorithm;
use crate::{
    JWK, JoseError, KeyOperation, der,
    util::{authentication_failure, crypto_error, random_bytes},
};

pub(super) fn encrypt(
    alg: KeyManagementAlgorithm,
    key: &JWK,
    cek: &[u8],
) -> Result<Vec<u8>, JoseError> {
    let (n, e) = key.rsa_public(KeyOperation::WrapKey)?;
    let public = PublicEncryptingKey::from_der(&der::create_subject_public_key_info(n, e))?;

    if alg == KeyManagementAlgorithm::Rsa1_5 {
        let key = Pkcs1PublicEncryptingKey::new(public)
            .map_err(|err| crypto_error("RSA1_5 key", err))?;
        let mut out = vec![0; key.ciphertext_size()];
        let len = key
            .encrypt(cek, &mut out)
            .map_err(|err| crypto_error("RSA1_5 encrypt", err))?
            .len();
        out.truncate(len);
        return Ok(out);
    }

    let key =
        OaepPublicEncryptingKey::new(public).map_err(|err| crypto_error("RSA-OAEP key", err))?;
    let mut out = vec![0; key.ciphertext_size()];
    let len = key
        .encrypt(oaep_algorithm(alg), cek, &mut out, None)
        .map_err(|err| crypto_error("RSA-OAEP encrypt", err))?
        .len();
    out.truncate(len);
    Ok(out)
}

pub(super) fn decrypt_oaep(
    alg: KeyManagementAlgorithm,
    key: &JWK,
    encrypted_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let pkcs8 = key.rsa_private_pkcs8(KeyOperation::UnwrapKey)?;
    let key = OaepPrivateDecryptingKey::new(PrivateDecryptingKey::from_pkcs8(&pkcs8)?)
        .map_err(|err| crypto_error("RSA-OAEP key", err))?;

    let mut out = Zeroizing::new(vec![0; key.min_output_size()]);
    let len = key
        .decrypt(oaep_algorithm(alg), encrypted_key, &mut out, None)
        .map_err(authentication_failure)?
        .len();
    out.truncate(len);
    Ok(out)
}

/// RSAES-PKCS1-v1_5 unwrap which never reports a padding failure
///
/// A random key of `cek_len` bytes is always generated up front. The
/// decrypted key is only selected, branch free, when decryption succeeded
/// and produced exactly `cek_len` bytes. Otherwise the random key flows on
/// and content decryption fails its authentication check later.
pub(super) fn decrypt_pkcs1(
    key: &JWK,
    cek_len: usize,
    encrypted_key: &[u8],
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let fallback = random_bytes(cek_len)?;

    let pkcs8 = key.rsa_private_pkcs8(KeyOperation::UnwrapKey)?;
    let key = Pkcs1PrivateDecryptingKey::new(PrivateDecryptingKey::from_pkcs8(&pkcs8)?)
        .map_err(|err| crypto_error("RSA1_5 key", err))?;

    let mut out = Zeroizing::new(vec![0; key.min_output_size()]);
    let (decrypted, len) = match key.decrypt(encrypted_key, &mut out) {
        Ok(plaintext) => (1u8, plaintext.len()),
        Err(_) => (0u8, 0),
    };

    let mut candidate = Zeroizing::new(vec![0u8; cek_len]);
    let copy_len = len.min(cek_len);
    candidate[..copy_len].copy_from_slice(&out[..copy_len]);

    let valid = Choice::from(decrypted) & (len as u64).ct_eq(&(cek_len as u64));
    let cek = fallback
        .iter()
        .zip(candidate.iter())
        .map(|(fallback, candidate)| u8::conditional_select(fallback, candidate, valid))
        .collect();

    tracing::trace!("RSA1_5 content key selected");
    Ok(Zeroizing::new(cek))
}

fn oaep_algorithm(alg: KeyManagementAlgorithm) -> &'static OaepAlgorithm {
    match alg {
        KeyManagementAlgorithm::RsaOaep256 => &OAEP_SHA256_MGF1SHA256,
        _ => &OAEP_SHA1_MGF1SHA1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oaep_variants_are_not_interchangeable() {
        let key = JWK::generate_rsa(2048).unwrap();
        let cek = [3u8; 16];
        let encrypted = encrypt(KeyManagementAlgorithm::RsaOaep, &key, &cek).unwrap();
        assert_eq!(encrypted.len(), 256);
        assert_eq!(
            decrypt_oaep(KeyManagementAlgorithm::RsaOaep, &key, &encrypted)
                .unwrap()
                .as_slice(),
            &cek
        );
        assert_eq!(
            decrypt_oaep(KeyManagementAlgorithm::RsaOaep256, &key, &encrypted),
            Err(JoseError::AuthenticationFailure)
        );
    }

    #[test]
    fn public_key_cannot_unwrap() {
        let key = JWK::generate_rsa(2048).unwrap();
        let public = key.public().unwrap();
        let encrypted = encrypt(KeyManagementAlgorithm::RsaOaep256, &public, &[1; 32]).unwrap();
        assert!(matches!(
            decrypt_oaep(KeyManagementAlgorithm::RsaOaep256, &public, &encrypted),
            Err(JoseError::InvalidKey(_))
        ));
        assert!(matches!(
            decrypt_pkcs1(&public, 32, &encrypted),
            Err(JoseError::InvalidKey(_))
        ));
    }

    #[test]
    fn pkcs1_round_trip() {
        let key = JWK::generate_rsa(2048).unwrap();
        let encrypted = encrypt(KeyManagementAlgorithm::Rsa1_5, &key, &[9; 32]).unwrap();
        assert_eq!(decrypt_pkcs1(&key, 32, &encrypted).unwrap().as_slice(), &[9; 32]);
    }
}
