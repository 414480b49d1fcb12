use aws_lc_rs::{
    hmac,
    rand::SystemRandom,
    signature::{
        self, ED25519, EcdsaKeyPair, Ed25519KeyPair, RSA_PKCS1_2048_8192_SHA256,
        RSA_PKCS1_2048_8192_SHA384, RSA_PKCS1_2048_8192_SHA512, RSA_PKCS1_SHA256,
        RSA_PKCS1_SHA384, RSA_PKCS1_SHA512, RSA_PSS_2048_8192_SHA256, RSA_PSS_2048_8192_SHA384,
        RSA_PSS_2048_8192_SHA512, RSA_PSS_SHA256, RSA_PSS_SHA384, RSA_PSS_SHA512,
        RsaEncoding, RsaKeyPair, RsaParameters, RsaPublicKeyComponents,
    },
};

use super::{AlgorithmDescriptor, AlgorithmUsage, HeaderLocation};
use crate::{
    JWK, JWKEllipticCurves, JWKOctetCurves, JWKType, JoseError, KeyOperation,
    util::crypto_error,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Algorithms for the `alg` header of a JWS, see section 3 of [`rfc7518`]
///
/// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518
pub enum SigningAlgorithm {
    /// HMAC using SHA-256 (Required)
    HS256,
    /// HMAC using SHA-384 (Optional)
    HS384,
    /// HMAC using SHA-512 (Optional)
    HS512,
    /// RSASSA-PKCS1-v1_5 using SHA-256 (Recommended)
    RS256,
    /// RSASSA-PKCS1-v1_5 using SHA-384 (Optional)
    RS384,
    /// RSASSA-PKCS1-v1_5 using SHA-512 (Optional)
    RS512,
    /// RSASSA-PSS using SHA-256 and MGF1 with SHA-256 (Optional)
    PS256,
    /// RSASSA-PSS using SHA-384 and MGF1 with SHA-384 (Optional)
    PS384,
    /// RSASSA-PSS using SHA-512 and MGF1 with SHA-512 (Optional)
    PS512,
    /// ECDSA using P-256 and SHA-256 (Recommended+)
    ES256,
    /// ECDSA using P-384 and SHA-384 (Optional)
    ES384,
    /// ECDSA using P-521 and SHA-512 (Optional)
    ES512,
    /// ECDSA using secp256k1 and SHA-256, see [`rfc8812`]
    ///
    /// [`rfc8812`]: https://datatracker.ietf.org/doc/html/rfc8812
    ES256K,
    /// Edwards-curve signatures, see [`rfc8037`]
    ///
    /// [`rfc8037`]: https://datatracker.ietf.org/doc/html/rfc8037
    EdDSA,
    /// Unsecured JWS, never allowed unless named explicitly
    None,
}

impl SigningAlgorithm {
    pub const ALL: [Self; 15] = [
        Self::HS256,
        Self::HS384,
        Self::HS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::ES256K,
        Self::EdDSA,
        Self::None,
    ];

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn descriptor(self) -> AlgorithmDescriptor {
        let (name, description, key_size) = match self {
            Self::HS256 => ("HS256", "HMAC using SHA-256", Some(256)),
            Self::HS384 => ("HS384", "HMAC using SHA-384", Some(384)),
            Self::HS512 => ("HS512", "HMAC using SHA-512", Some(512)),
            Self::RS256 => ("RS256", "RSASSA-PKCS1-v1_5 using SHA-256", Some(2048)),
            Self::RS384 => ("RS384", "RSASSA-PKCS1-v1_5 using SHA-384", Some(2048)),
            Self::RS512 => ("RS512", "RSASSA-PKCS1-v1_5 using SHA-512", Some(2048)),
            Self::PS256 => ("PS256", "RSASSA-PSS using SHA-256 and MGF1 with SHA-256", Some(2048)),
            Self::PS384 => ("PS384", "RSASSA-PSS using SHA-384 and MGF1 with SHA-384", Some(2048)),
            Self::PS512 => ("PS512", "RSASSA-PSS using SHA-512 and MGF1 with SHA-512", Some(2048)),
            Self::ES256 => ("ES256", "ECDSA using P-256 and SHA-256", Some(256)),
            Self::ES384 => ("ES384", "ECDSA using P-384 and SHA-384", Some(384)),
            Self::ES512 => ("ES512", "ECDSA using P-521 and SHA-512", Some(521)),
            Self::ES256K => ("ES256K", "ECDSA using secp256k1 and SHA-256", Some(256)),
            Self::EdDSA => ("EdDSA", "EdDSA using Ed25519", None),
            Self::None => ("none", "No digital signature or MAC performed", Some(0)),
        };
        AlgorithmDescriptor {
            name,
            description,
            key_size,
            location: HeaderLocation::Alg,
            usage: AlgorithmUsage::Signature,
        }
    }

    /// Sign `message` with `key`, returning the raw signature bytes
    ///
    /// ECDSA signatures are the fixed width `R || S` concatenation.
    pub fn sign(self, key: &JWK, message: &[u8]) -> Result<Vec<u8>, JoseError> {
        const OP: KeyOperation = KeyOperation::Sign;

        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => {
                let key = hmac::Key::new(self.hmac_algorithm(), key.symmetric_key(OP)?);
                Ok(hmac::sign(&key, message).as_ref().to_vec())
            }
            Self::RS256
            | Self::RS384
            | Self::RS512
            | Self::PS256
            | Self::PS384
            | Self::PS512 => {
                let pkcs8 = key.rsa_private_pkcs8(OP)?;
                let key_pair = RsaKeyPair::from_pkcs8(&pkcs8)?;
                let mut signature = vec![0; key_pair.public_modulus_len()];
                key_pair
                    .sign(
                        self.rsa_encoding(),
                        &SystemRandom::new(),
                        message,
                        &mut signature,
                    )
                    .map_err(|err| crypto_error("RSA sign", err))?;
                Ok(signature)
            }
            Self::ES256 | Self::ES384 | Self::ES512 | Self::ES256K => {
                let (crv, d, point) = key.ec_private(OP)?;
                self.check_curve(crv)?;
                let key_pair =
                    EcdsaKeyPair::from_private_key_and_public_key(crv.ecdsa_signing(), d, &point)?;
                let signature = key_pair
                    .sign(&SystemRandom::new(), message)
                    .map_err(|err| crypto_error("ECDSA sign", err))?;
                Ok(signature.as_ref().to_vec())
            }
            Self::EdDSA => {
                let (crv, d, x) = key.okp_private(OP)?;
                check_ed25519(crv)?;
                let key_pair = Ed25519KeyPair::from_seed_and_public_key(d, x)?;
                Ok(key_pair.sign(message).as_ref().to_vec())
            }
            Self::None => {
                check_empty_key(key)?;
                Ok(Vec::new())
            }
        }
    }

    /// Verify `signature` over `message`
    ///
    /// Every cryptographic mismatch is reported as [`JoseError::InvalidSignature`].
    pub fn verify(self, key: &JWK, message: &[u8], signature: &[u8]) -> Result<(), JoseError> {
        const OP: KeyOperation = KeyOperation::Verify;

        match self {
            Self::HS256 | Self::HS384 | Self::HS512 => {
                let key = hmac::Key::new(self.hmac_algorithm(), key.symmetric_key(OP)?);
                hmac::verify(&key, message, signature).map_err(invalid_signature)
            }
            Self::RS256
            | Self::RS384
            | Self::RS512
            | Self::PS256
            | Self::PS384
            | Self::PS512 => {
                let (n, e) = key.rsa_public(OP)?;
                RsaPublicKeyComponents { n, e }
                    .verify(self.rsa_parameters(), message, signature)
                    .map_err(invalid_signature)
            }
            Self::ES256 | Self::ES384 | Self::ES512 | Self::ES256K => {
                let (crv, point) = key.ec_public(OP)?;
                self.check_curve(crv)?;
                if signature.len() != 2 * crv.coordinate_size() {
                    return Err(JoseError::InvalidSignature);
                }
                signature::UnparsedPublicKey::new(crv.ecdsa_verification(), point)
                    .verify(message, signature)
                    .map_err(invalid_signature)
            }
            Self::EdDSA => {
                let (crv, x) = key.okp_public(OP)?;
                check_ed25519(crv)?;
                signature::UnparsedPublicKey::new(&ED25519, x)
                    .verify(message, signature)
                    .map_err(invalid_signature)
            }
            Self::None => {
                check_empty_key(key)?;
                if signature.is_empty() {
                    Ok(())
                } else {
                    Err(JoseError::InvalidSignature)
                }
            }
        }
    }

    fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            Self::HS384 => hmac::HMAC_SHA384,
            Self::HS512 => hmac::HMAC_SHA512,
            _ => hmac::HMAC_SHA256,
        }
    }

    fn rsa_encoding(self) -> &'static dyn RsaEncoding {
        match self {
            Self::RS384 => &RSA_PKCS1_SHA384,
            Self::RS512 => &RSA_PKCS1_SHA512,
            Self::PS256 => &RSA_PSS_SHA256,
            Self::PS384 => &RSA_PSS_SHA384,
            Self::PS512 => &RSA_PSS_SHA512,
            _ => &RSA_PKCS1_SHA256,
        }
    }

    fn rsa_parameters(self) -> &'static RsaParameters {
        match self {
            Self::RS384 => &RSA_PKCS1_2048_8192_SHA384,
            Self::RS512 => &RSA_PKCS1_2048_8192_SHA512,
            Self::PS256 => &RSA_PSS_2048_8192_SHA256,
            Self::PS384 => &RSA_PSS_2048_8192_SHA384,
            Self::PS512 => &RSA_PSS_2048_8192_SHA512,
            _ => &RSA_PKCS1_2048_8192_SHA256,
        }
    }

    fn check_curve(self, crv: JWKEllipticCurves) -> Result<(), JoseError> {
        let expected = JWKEllipticCurves::try_from(self)?;
        if crv != expected {
            return Err(JoseError::invalid_key(format!(
                "{} requires curve {}, found {}",
                self.name(),
                expected.name(),
                crv.name()
            )));
        }
        Ok(())
    }
}

impl From<JWKEllipticCurves> for SigningAlgorithm {
    fn from(value: JWKEllipticCurves) -> Self {
        match value {
            JWKEllipticCurves::P256 => Self::ES256,
            JWKEllipticCurves::P384 => Self::ES384,
            JWKEllipticCurves::P521 => Self::ES512,
            JWKEllipticCurves::Secp256k1 => Self::ES256K,
        }
    }
}

impl TryFrom<SigningAlgorithm> for JWKEllipticCurves {
    type Error = JoseError;

    fn try_from(value: SigningAlgorithm) -> Result<Self, Self::Error> {
        match value {
            SigningAlgorithm::ES256 => Ok(Self::P256),
            SigningAlgorithm::ES384 => Ok(Self::P384),
            SigningAlgorithm::ES512 => Ok(Self::P521),
            SigningAlgorithm::ES256K => Ok(Self::Secp256k1),
            other => Err(JoseError::invalid_key(format!(
                "{} does not use an elliptic curve key",
                other.name()
            ))),
        }
    }
}

fn check_ed25519(crv: JWKOctetCurves) -> Result<(), JoseError> {
    match crv {
        JWKOctetCurves::Ed25519 => Ok(()),
        JWKOctetCurves::X25519 => Err(JoseError::invalid_key(
            "EdDSA requires an Ed25519 key",
        )),
    }
}

fn check_empty_key(key: &JWK) -> Result<(), JoseError> {
    match key.key_type() {
        JWKType::Oct { k } if k.is_empty() => Ok(()),
        _ => Err(JoseError::invalid_key(
            "the none algorithm can only be used with an empty oct key",
        )),
    }
}

fn invalid_signature<E>(_: E) -> JoseError {
    JoseError::InvalidSignature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JWKOctetCurves;
    use quickcheck_macros::quickcheck;

    #[test]
    fn hs256_matches_known_vector() {
        // {"alg":"HS256"}.{"sub":"1234567890"} signed with "secret"
        let key = JWK::new_oct(b"secret".to_vec());
        let signature = SigningAlgorithm::HS256
            .sign(
                &key,
                b"eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxMjM0NTY3ODkwIn0",
            )
            .unwrap();
        assert_eq!(
            base64::Engine::encode(&base64::prelude::BASE64_URL_SAFE_NO_PAD, signature),
            "Dt2W1GtOLnnqf4-PUr5Ns_9BuLLmwpWO5zBwN4fokX4"
        );
    }

    #[test]
    fn every_asymmetric_algorithm_round_trips() {
        let rsa = JWK::generate_rsa(2048).unwrap();
        let cases = [
            (SigningAlgorithm::RS256, rsa.clone()),
            (SigningAlgorithm::RS384, rsa.clone()),
            (SigningAlgorithm::RS512, rsa.clone()),
            (SigningAlgorithm::PS256, rsa.clone()),
            (SigningAlgorithm::PS384, rsa.clone()),
            (SigningAlgorithm::PS512, rsa),
            (SigningAlgorithm::ES256, JWK::generate_ec(JWKEllipticCurves::P256).unwrap()),
            (SigningAlgorithm::ES384, JWK::generate_ec(JWKEllipticCurves::P384).unwrap()),
            (SigningAlgorithm::ES512, JWK::generate_ec(JWKEllipticCurves::P521).unwrap()),
            (SigningAlgorithm::ES256K, JWK::generate_ec(JWKEllipticCurves::Secp256k1).unwrap()),
            (SigningAlgorithm::EdDSA, JWK::generate_okp(JWKOctetCurves::Ed25519).unwrap()),
        ];

        for (alg, key) in cases {
            let signature = alg.sign(&key, b"payload").unwrap();
            let public = key.public().unwrap();
            alg.verify(&public, b"payload", &signature).unwrap();
            assert_eq!(
                alg.verify(&public, b"pAyload", &signature),
                Err(JoseError::InvalidSignature),
                "{alg:?}"
            );
        }
    }

    #[test]
    fn curves_map_to_ecdsa_algorithms() {
        for crv in [
            JWKEllipticCurves::P256,
            JWKEllipticCurves::P384,
            JWKEllipticCurves::P521,
            JWKEllipticCurves::Secp256k1,
        ] {
            let alg = SigningAlgorithm::from(crv);
            assert_eq!(JWKEllipticCurves::try_from(alg).unwrap(), crv);
        }
        assert!(JWKEllipticCurves::try_from(SigningAlgorithm::PS256).is_err());
    }

    #[test]
    fn ecdsa_signatures_are_fixed_width() {
        let key = JWK::generate_ec(JWKEllipticCurves::P521).unwrap();
        let signature = SigningAlgorithm::ES512.sign(&key, b"m").unwrap();
        assert_eq!(signature.len(), 132);
    }

    #[test]
    fn curve_mismatch_is_rejected_before_signing() {
        let key = JWK::generate_ec(JWKEllipticCurves::P384).unwrap();
        assert!(matches!(
            SigningAlgorithm::ES256.sign(&key, b"m"),
            Err(JoseError::InvalidKey(_))
        ));
        let key = JWK::new_oct(b"secret".to_vec());
        assert!(matches!(
            SigningAlgorithm::RS256.sign(&key, b"m"),
            Err(JoseError::InvalidKey(_))
        ));
    }

    #[test]
    fn none_requires_empty_key_and_signature() {
        let empty = JWK::new_oct(Vec::new());
        assert!(SigningAlgorithm::None.sign(&empty, b"m").unwrap().is_empty());
        assert!(SigningAlgorithm::None.verify(&empty, b"m", b"").is_ok());
        assert_eq!(
            SigningAlgorithm::None.verify(&empty, b"m", b"x"),
            Err(JoseError::InvalidSignature)
        );
        let key = JWK::new_oct(b"secret".to_vec());
        assert!(SigningAlgorithm::None.verify(&key, b"m", b"").is_err());
    }

    #[quickcheck]
    fn hmac_detects_any_single_byte_mutation(message: Vec<u8>, index: usize, flip: u8) -> bool {
        let key = JWK::new_oct(b"0123456789abcdef0123456789abcdef".to_vec());
        let flip = flip | 1;
        let mut signature = SigningAlgorithm::HS512.sign(&key, &message).unwrap();
        let valid = SigningAlgorithm::HS512.verify(&key, &message, &signature).is_ok();

        let i = index % signature.len();
        signature[i] ^= flip;
        let tampered_signature = SigningAlgorithm::HS512
            .verify(&key, &message, &signature)
            .is_err();
        signature[i] ^= flip;

        let tampered_message = if message.is_empty() {
            true
        } else {
            let mut message = message.clone();
            let i = index % message.len();
            message[i] ^= flip;
            SigningAlgorithm::HS512.verify(&key, &message, &signature).is_err()
        };

        valid && tampered_signature && tampered_message
    }
}
