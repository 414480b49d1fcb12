use aws_lc_rs::{
    agreement::{self, PrivateKey, UnparsedPublicKey},
    digest,
};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use super::{KeyManagementAlgorithm, header_bytes};
use crate::{
    JWK, JWKEllipticCurves, JWKOctetCurves, JWKType, JoseError, KeyOperation,
    jwk::split_uncompressed_point,
    util::crypto_error,
};

const OP: KeyOperation = KeyOperation::DeriveKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Curve {
    Ec(JWKEllipticCurves),
    X25519,
}

impl Curve {
    fn of(key: &JWK) -> Result<Self, JoseError> {
        match key.key_type() {
            JWKType::Ec { crv, .. } => Ok(Self::Ec(*crv)),
            JWKType::Okp {
                crv: JWKOctetCurves::X25519,
                ..
            } => Ok(Self::X25519),
            other => Err(JoseError::invalid_key(format!(
                "ECDH-ES requires an EC or X25519 key, found {}",
                other.kty()
            ))),
        }
    }

    fn algorithm(self) -> Result<&'static agreement::Algorithm, JoseError> {
        match self {
            Self::Ec(crv) => crv.agreement(),
            Self::X25519 => Ok(&agreement::X25519),
        }
    }

    /// Public key in the encoding the backend expects
    fn public_bytes(self, key: &JWK) -> Result<Vec<u8>, JoseError> {
        match self {
            Self::Ec(_) => Ok(key.ec_public(OP)?.1),
            Self::X25519 => Ok(key.okp_public(OP)?.1.to_vec()),
        }
    }

    fn private_key(self, key: &JWK) -> Result<PrivateKey, JoseError> {
        let d = match self {
            Self::Ec(_) => key.ec_private(OP)?.1,
            Self::X25519 => key.okp_private(OP)?.1,
        };
        Ok(PrivateKey::from_private_key(self.algorithm()?, d)?)
    }

    fn to_jwk(self, public: &[u8]) -> Result<JWK, JoseError> {
        let key_type = match self {
            Self::Ec(crv) => {
                let (x, y) = split_uncompressed_point(public, crv)?;
                JWKType::Ec {
                    crv,
                    x: x.to_vec(),
                    y: y.to_vec(),
                    d: None,
                }
            }
            Self::X25519 => JWKType::Okp {
                crv: JWKOctetCurves::X25519,
                x: public.to_vec(),
                d: None,
            },
        };
        Ok(JWK::new(key_type))
    }
}

/// Sender side: generate an ephemeral key on the recipient's curve and
/// derive `key_bits` of key material, returning it with the `epk` header.
pub(super) fn agree(
    alg: KeyManagementAlgorithm,
    recipient: &JWK,
    key_bits: usize,
    header: &Map<String, Value>,
) -> Result<(Zeroizing<Vec<u8>>, Map<String, Value>), JoseError> {
    let curve = Curve::of(recipient)?;
    let peer = curve.public_bytes(recipient)?;
    let algorithm = curve.algorithm()?;

    let ephemeral =
        PrivateKey::generate(algorithm).map_err(|err| crypto_error("generate ephemeral key", err))?;
    let public = ephemeral
        .compute_public_key()
        .map_err(|err| crypto_error("compute ephemeral public key", err))?;
    let epk = curve.to_jwk(public.as_ref())?;

    let derived = derive_with(alg, &ephemeral, algorithm, &peer, key_bits, header)?;

    let mut extra = Map::new();
    extra.insert("epk".to_owned(), serde_json::to_value(&epk)?);
    Ok((derived, extra))
}

/// Recipient side: derive `key_bits` of key material from the `epk` header.
pub(super) fn derive(
    alg: KeyManagementAlgorithm,
    recipient: &JWK,
    key_bits: usize,
    header: &Map<String, Value>,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let curve = Curve::of(recipient)?;
    let epk: JWK = serde_json::from_value(
        header
            .get("epk")
            .cloned()
            .ok_or_else(|| JoseError::invalid_format("missing epk header parameter"))?,
    )?;
    if Curve::of(&epk).ok() != Some(curve) {
        return Err(JoseError::invalid_key(
            "ephemeral key does not match the recipient key type and curve",
        ));
    }

    let private = curve.private_key(recipient)?;
    let peer = curve.public_bytes(&epk)?;
    derive_with(alg, &private, curve.algorithm()?, &peer, key_bits, header)
}

fn derive_with(
    alg: KeyManagementAlgorithm,
    private: &PrivateKey,
    algorithm: &'static agreement::Algorithm,
    peer: &[u8],
    key_bits: usize,
    header: &Map<String, Value>,
) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    // direct mode binds the derived key to the content algorithm
    let algorithm_id = match alg {
        KeyManagementAlgorithm::EcdhEs => header
            .get("enc")
            .and_then(Value::as_str)
            .ok_or(JoseError::MissingAlgorithm)?,
        _ => alg.name(),
    };
    let apu = header_bytes(header, "apu")?.unwrap_or_default();
    let apv = header_bytes(header, "apv")?.unwrap_or_default();

    agreement::agree(
        private,
        &UnparsedPublicKey::new(algorithm, peer),
        JoseError::invalid_key("invalid public key for key agreement"),
        |z| Ok(concat_kdf(z, algorithm_id.as_bytes(), &apu, &apv, key_bits)),
    )
}

/// Single step KDF of NIST SP 800-56A section 5.8.1 with SHA-256
///
/// `OtherInfo` is `AlgorithmID || PartyUInfo || PartyVInfo || SuppPubInfo`,
/// the first three length prefixed, `SuppPubInfo` the key size in bits.
fn concat_kdf(
    z: &[u8],
    algorithm_id: &[u8],
    apu: &[u8],
    apv: &[u8],
    key_bits: usize,
) -> Zeroizing<Vec<u8>> {
    let key_len = key_bits / 8;
    let mut out = Zeroizing::new(Vec::with_capacity(key_len + digest::SHA256_OUTPUT_LEN));

    let mut counter: u32 = 1;
    while out.len() < key_len {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(&counter.to_be_bytes());
        ctx.update(z);
        for info in [algorithm_id, apu, apv] {
            ctx.update(&(info.len() as u32).to_be_bytes());
            ctx.update(info);
        }
        ctx.update(&(key_bits as u32).to_be_bytes());
        out.extend_from_slice(ctx.finish().as_ref());
        counter += 1;
    }

    out.truncate(key_len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};

    #[test]
    fn derived_key_matches_rfc7518_appendix_c() {
        let bob = JWK::from_json(
            r#"{"kty":"EC","crv":"P-256",
                "x":"weNJy2HscCSM6AEDTDg04biOvhFhyyWvOHQfeF_PxMQ",
                "y":"e8lnCO-AlStT-NJVX-crhB7QRYhiix03illJOVAOyck",
                "d":"VEmDZpDXXK8p8N0Cndsxs924q6nS1RXFASRl6BfUqdw"}"#,
        )
        .unwrap();
        let header: Map<String, Value> = serde_json::from_str(
            r#"{"alg":"ECDH-ES","enc":"A128GCM","apu":"QWxpY2U","apv":"Qm9i",
                "epk":{"kty":"EC","crv":"P-256",
                    "x":"gI0GAILBdu7T53akrFmMyGcsF3n5dO7MmwNBHKW5SV0",
                    "y":"SLW_xSffzlPWrHEVI30DHM_4egVwt3NQqeUD7nMFpps"}}"#,
        )
        .unwrap();

        let key = derive(KeyManagementAlgorithm::EcdhEs, &bob, 128, &header).unwrap();
        assert_eq!(BASE64_URL_SAFE_NO_PAD.encode(&key), "VqqN6vgjbSBcIijNcacQGg");
    }

    #[test]
    fn both_sides_agree_on_every_curve() {
        let mut header = Map::new();
        header.insert("enc".to_owned(), Value::from("A256CBC-HS512"));
        header.insert("apu".to_owned(), Value::from("QWxpY2U"));

        for recipient in [
            JWK::generate_ec(JWKEllipticCurves::P256).unwrap(),
            JWK::generate_ec(JWKEllipticCurves::P384).unwrap(),
            JWK::generate_ec(JWKEllipticCurves::P521).unwrap(),
            JWK::generate_okp(JWKOctetCurves::X25519).unwrap(),
        ] {
            let (sent, extra) =
                agree(KeyManagementAlgorithm::EcdhEs, &recipient.public().unwrap(), 512, &header)
                    .unwrap();
            assert_eq!(sent.len(), 64);
            assert!(!extra["epk"].as_object().unwrap().contains_key("d"));

            let mut merged = header.clone();
            merged.extend(extra);
            let received =
                derive(KeyManagementAlgorithm::EcdhEs, &recipient, 512, &merged).unwrap();
            assert_eq!(sent, received);
        }
    }

    #[test]
    fn key_wrap_mode_binds_the_algorithm_name() {
        let recipient = JWK::generate_ec(JWKEllipticCurves::P256).unwrap();
        let (kek, extra) =
            agree(KeyManagementAlgorithm::EcdhEsA128KW, &recipient, 128, &Map::new()).unwrap();

        // same agreement, different AlgorithmID
        let mut header = extra.clone();
        header.insert("enc".to_owned(), Value::from("ECDH-ES+A128KW"));
        let direct = derive(KeyManagementAlgorithm::EcdhEs, &recipient, 128, &header).unwrap();
        let wrapped =
            derive(KeyManagementAlgorithm::EcdhEsA128KW, &recipient, 128, &extra).unwrap();
        assert_eq!(kek, wrapped);
        assert_eq!(kek, direct);

        let mut other_apv = extra;
        other_apv.insert("apv".to_owned(), Value::from("Qm9i"));
        assert_ne!(
            kek,
            derive(KeyManagementAlgorithm::EcdhEsA128KW, &recipient, 128, &other_apv).unwrap()
        );
    }

    #[test]
    fn mismatched_or_unsupported_curves_are_rejected() {
        let recipient = JWK::generate_ec(JWKEllipticCurves::P256).unwrap();
        let (_, extra) =
            agree(KeyManagementAlgorithm::EcdhEsA256KW, &recipient, 256, &Map::new()).unwrap();

        let other = JWK::generate_ec(JWKEllipticCurves::P384).unwrap();
        assert!(matches!(
            derive(KeyManagementAlgorithm::EcdhEsA256KW, &other, 256, &extra),
            Err(JoseError::InvalidKey(_))
        ));

        let k1 = JWK::generate_ec(JWKEllipticCurves::Secp256k1).unwrap();
        assert!(matches!(
            agree(KeyManagementAlgorithm::EcdhEsA256KW, &k1, 256, &Map::new()),
            Err(JoseError::InvalidKey(_))
        ));

        assert!(matches!(
            derive(KeyManagementAlgorithm::EcdhEs, &recipient, 256, &extra),
            Err(JoseError::MissingAlgorithm)
        ));
    }
}
