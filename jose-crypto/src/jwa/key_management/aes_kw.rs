use aes_kw::{KekAes128, KekAes192, KekAes256};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use super::{encode, header_bytes};
use crate::{
    JoseError,
    jwa::content::{GCM_IV_LEN, gcm_decrypt, gcm_encrypt},
    util::{authentication_failure, crypto_error, random_bytes},
};

/// RFC 3394 key wrap with the AES variant picked from the KEK length
pub(super) fn wrap(kek: &[u8], cek: &[u8]) -> Result<Vec<u8>, JoseError> {
    let wrapped = match kek.len() {
        16 => KekAes128::from(kek_array::<16>(kek)?).wrap_vec(cek),
        24 => KekAes192::from(kek_array::<24>(kek)?).wrap_vec(cek),
        32 => KekAes256::from(kek_array::<32>(kek)?).wrap_vec(cek),
        actual => return Err(JoseError::InvalidKeyLength { expected: 16, actual }),
    };
    wrapped.map_err(|err| crypto_error("AES key wrap", err))
}

pub(super) fn unwrap(kek: &[u8], encrypted_key: &[u8]) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let unwrapped = match kek.len() {
        16 => KekAes128::from(kek_array::<16>(kek)?).unwrap_vec(encrypted_key),
        24 => KekAes192::from(kek_array::<24>(kek)?).unwrap_vec(encrypted_key),
        32 => KekAes256::from(kek_array::<32>(kek)?).unwrap_vec(encrypted_key),
        actual => return Err(JoseError::InvalidKeyLength { expected: 16, actual }),
    };
    unwrapped.map(Zeroizing::new).map_err(authentication_failure)
}

fn kek_array<const N: usize>(kek: &[u8]) -> Result<[u8; N], JoseError> {
    kek.try_into().ok().ok_or(JoseError::InvalidKeyLength {
        expected: N,
        actual: kek.len(),
    })
}

/// AES-GCM key wrap, returning the wrapped key and the `iv`/`tag` header parameters
pub(super) fn gcm_wrap(
    kek: &[u8],
    cek: &[u8],
) -> Result<(Vec<u8>, Map<String, Value>), JoseError> {
    let iv = random_bytes(GCM_IV_LEN)?;
    let (encrypted_key, tag) = gcm_encrypt(kek, &iv, &[], cek)?;

    let mut header = Map::new();
    header.insert("iv".to_owned(), encode(&iv));
    header.insert("tag".to_owned(), encode(&tag));
    Ok((encrypted_key, header))
}

pub(super) fn gcm_unwrap(
    kek: &[u8],
    encrypted_key: &[u8],
    header: &Map<String, Value>,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let iv = header_bytes(header, "iv")?
        .ok_or_else(|| JoseError::invalid_format("missing iv header parameter"))?;
    let tag = header_bytes(header, "tag")?
        .ok_or_else(|| JoseError::invalid_format("missing tag header parameter"))?;
    gcm_decrypt(kek, &iv, &[], encrypted_key, &tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_matches_rfc3394_vector() {
        let kek: Vec<u8> = (0u8..16).collect();
        let data = [
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff,
        ];
        let expected = [
            0x1f, 0xa6, 0x8b, 0x0a, 0x81, 0x12, 0xb4, 0x47, 0xae, 0xf3, 0x4b, 0xd8, 0xfb, 0x5a,
            0x7b, 0x82, 0x9d, 0x3e, 0x86, 0x23, 0x71, 0xd2, 0xcf, 0xe5,
        ];
        assert_eq!(wrap(&kek, &data).unwrap(), expected);
        assert_eq!(unwrap(&kek, &expected).unwrap().as_slice(), &data);
    }

    #[test]
    fn gcm_unwrap_requires_iv_and_tag() {
        let kek = [1u8; 24];
        let (encrypted_key, header) = gcm_wrap(&kek, &[2; 32]).unwrap();
        assert_eq!(
            gcm_unwrap(&kek, &encrypted_key, &header).unwrap().as_slice(),
            &[2; 32]
        );

        let mut without_tag = header.clone();
        without_tag.remove("tag");
        assert!(matches!(
            gcm_unwrap(&kek, &encrypted_key, &without_tag),
            Err(JoseError::InvalidFormat(_))
        ));
    }

    #[test]
    fn wrong_kek_fails_authentication() {
        let wrapped = wrap(&[1; 32], &[5; 32]).unwrap();
        assert_eq!(
            unwrap(&[2; 32], &wrapped),
            Err(JoseError::AuthenticationFailure)
        );
    }
}
