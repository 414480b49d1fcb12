use std::fmt;

use aws_lc_rs::{
    agreement,
    digest::{Digest, SHA256, digest},
    encoding::{AsDer, Pkcs8V1Der},
    rsa::KeySize,
    signature::{
        ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING, ECDSA_P256K1_SHA256_FIXED,
        ECDSA_P256K1_SHA256_FIXED_SIGNING, ECDSA_P384_SHA384_FIXED,
        ECDSA_P384_SHA384_FIXED_SIGNING, ECDSA_P521_SHA512_FIXED, ECDSA_P521_SHA512_FIXED_SIGNING,
        EcdsaKeyPair, EcdsaSigningAlgorithm, EcdsaVerificationAlgorithm, Ed25519KeyPair, KeyPair,
        RsaKeyPair,
    },
};
use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{
    Deserialize, Serialize, Serializer,
    ser::{SerializeMap, SerializeStruct},
};
use zeroize::{Zeroize, Zeroizing};

use crate::{
    JoseError,
    der::{self, RsaPrivateKeyParts},
    macros::generate_set_and_with,
    util::{crypto_error, pad_left, random_bytes},
};

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawJWK")]
/// [`JWK`] or JSON Web Key as defined in [`rfc7517`]
///
/// Material is only handed out through accessors which first check the
/// key's `use` and `key_ops` restrictions against the requested operation.
/// Private material is wiped from memory when the key is dropped.
///
/// [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517
pub struct JWK {
    key_type: JWKType,
    r#use: Option<JWKUse>,
    key_ops: Option<Vec<KeyOperation>>,
    kid: Option<String>,
    /// Intended algorithm to be used with this key
    alg: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
/// The "kty" (key type) parameter identifies the cryptographic algorithm
/// family used with the key, together with its material.
pub enum JWKType {
    /// an octet sequence key, which represents a symmetric key
    Oct { k: Zeroizing<Vec<u8>> },
    Rsa {
        n: Vec<u8>,
        e: Vec<u8>,
        private: Option<Box<RsaPrivateComponents>>,
    },
    /// Elliptic curve
    Ec {
        crv: JWKEllipticCurves,
        x: Vec<u8>,
        y: Vec<u8>,
        d: Option<Zeroizing<Vec<u8>>>,
    },
    /// Octet key pair, see [`rfc8037`]
    ///
    /// [`rfc8037`]: https://datatracker.ietf.org/doc/html/rfc8037
    Okp {
        crv: JWKOctetCurves,
        x: Vec<u8>,
        d: Option<Zeroizing<Vec<u8>>>,
    },
}

#[derive(Clone, PartialEq, Eq)]
/// Private RSA members in CRT form
pub struct RsaPrivateComponents {
    pub d: Zeroizing<Vec<u8>>,
    pub p: Zeroizing<Vec<u8>>,
    pub q: Zeroizing<Vec<u8>>,
    pub dp: Zeroizing<Vec<u8>>,
    pub dq: Zeroizing<Vec<u8>>,
    pub qi: Zeroizing<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JWKEllipticCurves {
    #[serde(rename = "P-256")]
    P256,
    #[serde(rename = "P-384")]
    P384,
    #[serde(rename = "P-521")]
    P521,
    #[serde(rename = "secp256k1")]
    Secp256k1,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
/// Curves of the `OKP` key type
pub enum JWKOctetCurves {
    Ed25519,
    X25519,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
/// [`JWKUse`] identifies the intended use of the public key
pub enum JWKUse {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
/// Values of the `key_ops` member, see section 4.3 of [`rfc7517`]
///
/// [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517
pub enum KeyOperation {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    WrapKey,
    UnwrapKey,
    DeriveKey,
    DeriveBits,
}

impl JWKUse {
    fn permits(self, op: KeyOperation) -> bool {
        match self {
            Self::Signature => matches!(op, KeyOperation::Sign | KeyOperation::Verify),
            Self::Encryption => !matches!(op, KeyOperation::Sign | KeyOperation::Verify),
        }
    }
}

impl fmt::Display for KeyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sign => "sign",
            Self::Verify => "verify",
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::WrapKey => "wrapKey",
            Self::UnwrapKey => "unwrapKey",
            Self::DeriveKey => "deriveKey",
            Self::DeriveBits => "deriveBits",
        };
        f.write_str(name)
    }
}

impl JWKEllipticCurves {
    pub fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
            Self::Secp256k1 => "secp256k1",
        }
    }

    /// Size in bytes of one coordinate (and of the private scalar).
    pub fn coordinate_size(self) -> usize {
        match self {
            Self::P256 | Self::Secp256k1 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }

    pub(crate) fn ecdsa_signing(self) -> &'static EcdsaSigningAlgorithm {
        match self {
            Self::P256 => &ECDSA_P256_SHA256_FIXED_SIGNING,
            Self::P384 => &ECDSA_P384_SHA384_FIXED_SIGNING,
            Self::P521 => &ECDSA_P521_SHA512_FIXED_SIGNING,
            Self::Secp256k1 => &ECDSA_P256K1_SHA256_FIXED_SIGNING,
        }
    }

    pub(crate) fn ecdsa_verification(self) -> &'static EcdsaVerificationAlgorithm {
        match self {
            Self::P256 => &ECDSA_P256_SHA256_FIXED,
            Self::P384 => &ECDSA_P384_SHA384_FIXED,
            Self::P521 => &ECDSA_P521_SHA512_FIXED,
            Self::Secp256k1 => &ECDSA_P256K1_SHA256_FIXED,
        }
    }

    pub(crate) fn agreement(self) -> Result<&'static agreement::Algorithm, JoseError> {
        match self {
            Self::P256 => Ok(&agreement::ECDH_P256),
            Self::P384 => Ok(&agreement::ECDH_P384),
            Self::P521 => Ok(&agreement::ECDH_P521),
            Self::Secp256k1 => Err(JoseError::invalid_key(
                "key agreement is not supported on secp256k1",
            )),
        }
    }

    fn from_name(name: &str) -> Result<Self, JoseError> {
        match name {
            "P-256" => Ok(Self::P256),
            "P-384" => Ok(Self::P384),
            "P-521" => Ok(Self::P521),
            "secp256k1" => Ok(Self::Secp256k1),
            other => Err(JoseError::invalid_key(format!("unsupported curve: {other}"))),
        }
    }
}

impl JWKOctetCurves {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ed25519 => "Ed25519",
            Self::X25519 => "X25519",
        }
    }

    fn from_name(name: &str) -> Result<Self, JoseError> {
        match name {
            "Ed25519" => Ok(Self::Ed25519),
            "X25519" => Ok(Self::X25519),
            other => Err(JoseError::invalid_key(format!("unsupported curve: {other}"))),
        }
    }
}

impl JWKType {
    pub fn kty(&self) -> &'static str {
        match self {
            Self::Oct { .. } => "oct",
            Self::Rsa { .. } => "RSA",
            Self::Ec { .. } => "EC",
            Self::Okp { .. } => "OKP",
        }
    }

    fn has_private(&self) -> bool {
        match self {
            Self::Oct { .. } => true,
            Self::Rsa { private, .. } => private.is_some(),
            Self::Ec { d, .. } | Self::Okp { d, .. } => d.is_some(),
        }
    }
}

impl JWK {
    /// Create a [`JWK`] without usage restrictions from the given material
    pub fn new(key_type: JWKType) -> Self {
        Self {
            key_type,
            r#use: None,
            key_ops: None,
            kid: None,
            alg: None,
        }
    }

    /// Create a symmetric (`oct`) [`JWK`] from raw key bytes
    pub fn new_oct(k: impl Into<Vec<u8>>) -> Self {
        Self::new(JWKType::Oct {
            k: Zeroizing::new(k.into()),
        })
    }

    /// Parse a [`JWK`] from its JSON form
    pub fn from_json(json: &str) -> Result<Self, JoseError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize this [`JWK`], including private members, to JSON
    pub fn to_json(&self) -> Result<String, JoseError> {
        Ok(serde_json::to_string(self)?)
    }

    generate_set_and_with! {
        /// Key identifier used to select this key from a [`crate::JWKSet`]
        pub fn kid(mut self, kid: Option<String>) -> Self {
            self.kid = kid;
            self
        }
    }

    generate_set_and_with! {
        /// Restrict the intended use of this key
        pub fn key_use(mut self, key_use: Option<JWKUse>) -> Self {
            self.r#use = key_use;
            self
        }
    }

    generate_set_and_with! {
        /// Restrict the operations this key may be used for
        pub fn key_ops(mut self, ops: Option<Vec<KeyOperation>>) -> Self {
            self.key_ops = ops;
            self
        }
    }

    generate_set_and_with! {
        /// Intended algorithm to be used with this key
        pub fn alg(mut self, alg: Option<String>) -> Self {
            self.alg = alg;
            self
        }
    }

    pub fn key_type(&self) -> &JWKType {
        &self.key_type
    }

    pub fn kty(&self) -> &'static str {
        self.key_type.kty()
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn key_use(&self) -> Option<JWKUse> {
        self.r#use
    }

    pub fn key_ops(&self) -> Option<&[KeyOperation]> {
        self.key_ops.as_deref()
    }

    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    /// `true` when this key carries private (or symmetric) material
    pub fn has_private(&self) -> bool {
        self.key_type.has_private()
    }

    /// Generate a random symmetric key of `bits` size
    pub fn generate_oct(bits: usize) -> Result<Self, JoseError> {
        if bits == 0 || bits % 8 != 0 {
            return Err(JoseError::invalid_key(
                "symmetric key size must be a positive multiple of 8 bits",
            ));
        }
        Ok(Self::new(JWKType::Oct {
            k: random_bytes(bits / 8)?,
        }))
    }

    /// Generate an RSA key pair with a modulus of `bits` size
    pub fn generate_rsa(bits: usize) -> Result<Self, JoseError> {
        let size = match bits {
            2048 => KeySize::Rsa2048,
            3072 => KeySize::Rsa3072,
            4096 => KeySize::Rsa4096,
            8192 => KeySize::Rsa8192,
            other => {
                return Err(JoseError::invalid_key(format!(
                    "unsupported RSA key size: {other}"
                )));
            }
        };
        let key_pair =
            RsaKeyPair::generate(size).map_err(|err| crypto_error("generate RSA key", err))?;
        let pkcs8: Pkcs8V1Der<'static> = key_pair
            .as_der()
            .map_err(|err| crypto_error("export RSA key", err))?;
        let parts = der::parse_rsa_private_key_info(pkcs8.as_ref())?;

        let secret = |value: &[u8]| Zeroizing::new(value.to_vec());
        Ok(Self::new(JWKType::Rsa {
            n: parts.n.to_vec(),
            e: parts.e.to_vec(),
            private: Some(Box::new(RsaPrivateComponents {
                d: secret(parts.d),
                p: secret(parts.p),
                q: secret(parts.q),
                dp: secret(parts.dp),
                dq: secret(parts.dq),
                qi: secret(parts.qi),
            })),
        }))
    }

    /// Generate an elliptic curve key pair on the given curve
    pub fn generate_ec(crv: JWKEllipticCurves) -> Result<Self, JoseError> {
        let key_pair = EcdsaKeyPair::generate(crv.ecdsa_signing())
            .map_err(|err| crypto_error("generate EC key", err))?;
        let pkcs8 = key_pair
            .to_pkcs8v1()
            .map_err(|err| crypto_error("export EC key", err))?;
        let d = der::parse_ec_private_key_info(pkcs8.as_ref())?;
        let (x, y) = split_uncompressed_point(key_pair.public_key().as_ref(), crv)?;

        Ok(Self::new(JWKType::Ec {
            crv,
            x: x.to_vec(),
            y: y.to_vec(),
            d: Some(pad_left(d, crv.coordinate_size())),
        }))
    }

    /// Generate an octet key pair on the given curve
    pub fn generate_okp(crv: JWKOctetCurves) -> Result<Self, JoseError> {
        let d = random_bytes(32)?;
        let x = match crv {
            JWKOctetCurves::Ed25519 => Ed25519KeyPair::from_seed_unchecked(&d)
                .map_err(|err| crypto_error("generate Ed25519 key", err))?
                .public_key()
                .as_ref()
                .to_vec(),
            JWKOctetCurves::X25519 => {
                agreement::PrivateKey::from_private_key(&agreement::X25519, &d)
                    .map_err(|err| crypto_error("generate X25519 key", err))?
                    .compute_public_key()
                    .map_err(|err| crypto_error("compute X25519 public key", err))?
                    .as_ref()
                    .to_vec()
            }
        };
        Ok(Self::new(JWKType::Okp { crv, x, d: Some(d) }))
    }

    /// A copy of this key with all private members removed
    ///
    /// Symmetric keys have no public part and are rejected.
    pub fn public(&self) -> Result<Self, JoseError> {
        let key_type = match &self.key_type {
            JWKType::Oct { .. } => {
                return Err(JoseError::invalid_key("symmetric keys have no public part"));
            }
            JWKType::Rsa { n, e, .. } => JWKType::Rsa {
                n: n.clone(),
                e: e.clone(),
                private: None,
            },
            JWKType::Ec { crv, x, y, .. } => JWKType::Ec {
                crv: *crv,
                x: x.clone(),
                y: y.clone(),
                d: None,
            },
            JWKType::Okp { crv, x, .. } => JWKType::Okp {
                crv: *crv,
                x: x.clone(),
                d: None,
            },
        };
        Ok(Self {
            key_type,
            r#use: self.r#use,
            key_ops: self.key_ops.clone(),
            kid: self.kid.clone(),
            alg: self.alg.clone(),
        })
    }

    /// JWK thumbprint as defined in [`rfc7638`], computed with SHA-256
    ///
    /// [`rfc7638`]: https://datatracker.ietf.org/doc/html/rfc7638
    pub fn thumb_sha256(&self) -> Result<Digest, JoseError> {
        let members = serde_json::to_vec(&ThumbprintMembers(&self.key_type))?;
        Ok(digest(&SHA256, &members))
    }

    /// Base64url encoded [`Self::thumb_sha256`], usable as a key identifier
    pub fn thumbprint(&self) -> Result<String, JoseError> {
        Ok(BASE64_URL_SAFE_NO_PAD.encode(self.thumb_sha256()?))
    }

    /// Check `use` and `key_ops` against the requested operation
    pub fn check_operation(&self, op: KeyOperation) -> Result<(), JoseError> {
        if let Some(key_use) = self.r#use
            && !key_use.permits(op)
        {
            return Err(JoseError::invalid_key(format!(
                "key use {key_use:?} does not permit {op}"
            )));
        }
        if let Some(ops) = &self.key_ops
            && !ops.contains(&op)
        {
            return Err(JoseError::invalid_key(format!(
                "key_ops does not permit {op}"
            )));
        }
        Ok(())
    }

    pub(crate) fn symmetric_key(&self, op: KeyOperation) -> Result<&[u8], JoseError> {
        self.check_operation(op)?;
        match &self.key_type {
            JWKType::Oct { k } => Ok(k.as_slice()),
            other => Err(wrong_key_type("oct", other)),
        }
    }

    /// Modulus and public exponent
    pub(crate) fn rsa_public(&self, op: KeyOperation) -> Result<(&[u8], &[u8]), JoseError> {
        self.check_operation(op)?;
        match &self.key_type {
            JWKType::Rsa { n, e, .. } => Ok((n.as_slice(), e.as_slice())),
            other => Err(wrong_key_type("RSA", other)),
        }
    }

    /// PKCS#8 v1 DER of the private key, as accepted by the backend
    pub(crate) fn rsa_private_pkcs8(
        &self,
        op: KeyOperation,
    ) -> Result<Zeroizing<Vec<u8>>, JoseError> {
        self.check_operation(op)?;
        match &self.key_type {
            JWKType::Rsa {
                n,
                e,
                private: Some(private),
            } => Ok(der::create_rsa_private_key_info(&RsaPrivateKeyParts {
                n,
                e,
                d: &private.d,
                p: &private.p,
                q: &private.q,
                dp: &private.dp,
                dq: &private.dq,
                qi: &private.qi,
            })),
            JWKType::Rsa { private: None, .. } => Err(missing_private_key()),
            other => Err(wrong_key_type("RSA", other)),
        }
    }

    /// Curve and uncompressed public point (`0x04 || x || y`)
    pub(crate) fn ec_public(
        &self,
        op: KeyOperation,
    ) -> Result<(JWKEllipticCurves, Vec<u8>), JoseError> {
        self.check_operation(op)?;
        match &self.key_type {
            JWKType::Ec { crv, x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Ok((*crv, point))
            }
            other => Err(wrong_key_type("EC", other)),
        }
    }

    /// Curve, private scalar and uncompressed public point
    pub(crate) fn ec_private(
        &self,
        op: KeyOperation,
    ) -> Result<(JWKEllipticCurves, &[u8], Vec<u8>), JoseError> {
        let (crv, point) = self.ec_public(op)?;
        match &self.key_type {
            JWKType::Ec { d: Some(d), .. } => Ok((crv, d.as_slice(), point)),
            _ => Err(missing_private_key()),
        }
    }

    pub(crate) fn okp_public(
        &self,
        op: KeyOperation,
    ) -> Result<(JWKOctetCurves, &[u8]), JoseError> {
        self.check_operation(op)?;
        match &self.key_type {
            JWKType::Okp { crv, x, .. } => Ok((*crv, x.as_slice())),
            other => Err(wrong_key_type("OKP", other)),
        }
    }

    /// Curve, private key and public key
    pub(crate) fn okp_private(
        &self,
        op: KeyOperation,
    ) -> Result<(JWKOctetCurves, &[u8], &[u8]), JoseError> {
        let (crv, x) = self.okp_public(op)?;
        match &self.key_type {
            JWKType::Okp { d: Some(d), .. } => Ok((crv, d.as_slice(), x)),
            _ => Err(missing_private_key()),
        }
    }
}

fn wrong_key_type(expected: &str, found: &JWKType) -> JoseError {
    JoseError::invalid_key(format!(
        "expected {expected} key, found {}",
        found.kty()
    ))
}

fn missing_private_key() -> JoseError {
    JoseError::invalid_key("operation requires a private key")
}

pub(crate) fn split_uncompressed_point(
    point: &[u8],
    crv: JWKEllipticCurves,
) -> Result<(&[u8], &[u8]), JoseError> {
    let size = crv.coordinate_size();
    match point.split_first() {
        Some((0x04, coordinates)) if coordinates.len() == 2 * size => {
            Ok(coordinates.split_at(size))
        }
        _ => Err(JoseError::invalid_key("expected an uncompressed EC point")),
    }
}

impl fmt::Debug for JWK {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JWK")
            .field("kty", &self.kty())
            .field("kid", &self.kid)
            .field("use", &self.r#use)
            .field("key_ops", &self.key_ops)
            .field("alg", &self.alg)
            .field("private", &self.has_private())
            .finish()
    }
}

/// Required members of a key in lexicographic order, see section 3.2 of [`rfc7638`]
///
/// [`rfc7638`]: https://datatracker.ietf.org/doc/html/rfc7638
struct ThumbprintMembers<'a>(&'a JWKType);

impl Serialize for ThumbprintMembers<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // Order here is important as this output is hashed
        match self.0 {
            JWKType::Ec { crv, x, y, .. } => {
                let mut state = serializer.serialize_struct("JWK", 4)?;
                state.serialize_field("crv", crv)?;
                state.serialize_field("kty", "EC")?;
                state.serialize_field("x", &BASE64_URL_SAFE_NO_PAD.encode(x))?;
                state.serialize_field("y", &BASE64_URL_SAFE_NO_PAD.encode(y))?;
                state.end()
            }
            JWKType::Rsa { n, e, .. } => {
                let mut state = serializer.serialize_struct("JWK", 3)?;
                state.serialize_field("e", &BASE64_URL_SAFE_NO_PAD.encode(e))?;
                state.serialize_field("kty", "RSA")?;
                state.serialize_field("n", &BASE64_URL_SAFE_NO_PAD.encode(n))?;
                state.end()
            }
            JWKType::Oct { k } => {
                let k = Zeroizing::new(BASE64_URL_SAFE_NO_PAD.encode(k));
                let mut state = serializer.serialize_struct("JWK", 2)?;
                state.serialize_field("k", k.as_str())?;
                state.serialize_field("kty", "oct")?;
                state.end()
            }
            JWKType::Okp { crv, x, .. } => {
                let mut state = serializer.serialize_struct("JWK", 3)?;
                state.serialize_field("crv", crv)?;
                state.serialize_field("kty", "OKP")?;
                state.serialize_field("x", &BASE64_URL_SAFE_NO_PAD.encode(x))?;
                state.end()
            }
        }
    }
}

impl Serialize for JWK {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let b64 = |value: &[u8]| BASE64_URL_SAFE_NO_PAD.encode(value);
        let secret = |value: &[u8]| Zeroizing::new(BASE64_URL_SAFE_NO_PAD.encode(value));

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("kty", self.kty())?;
        match &self.key_type {
            JWKType::Oct { k } => {
                map.serialize_entry("k", secret(k).as_str())?;
            }
            JWKType::Rsa { n, e, private } => {
                map.serialize_entry("n", &b64(n))?;
                map.serialize_entry("e", &b64(e))?;
                if let Some(private) = private {
                    map.serialize_entry("d", secret(&private.d).as_str())?;
                    map.serialize_entry("p", secret(&private.p).as_str())?;
                    map.serialize_entry("q", secret(&private.q).as_str())?;
                    map.serialize_entry("dp", secret(&private.dp).as_str())?;
                    map.serialize_entry("dq", secret(&private.dq).as_str())?;
                    map.serialize_entry("qi", secret(&private.qi).as_str())?;
                }
            }
            JWKType::Ec { crv, x, y, d } => {
                map.serialize_entry("crv", crv)?;
                map.serialize_entry("x", &b64(x))?;
                map.serialize_entry("y", &b64(y))?;
                if let Some(d) = d {
                    map.serialize_entry("d", secret(d).as_str())?;
                }
            }
            JWKType::Okp { crv, x, d } => {
                map.serialize_entry("crv", crv)?;
                map.serialize_entry("x", &b64(x))?;
                if let Some(d) = d {
                    map.serialize_entry("d", secret(d).as_str())?;
                }
            }
        }
        if let Some(key_use) = &self.r#use {
            map.serialize_entry("use", key_use)?;
        }
        if let Some(key_ops) = &self.key_ops {
            map.serialize_entry("key_ops", key_ops)?;
        }
        if let Some(kid) = &self.kid {
            map.serialize_entry("kid", kid)?;
        }
        if let Some(alg) = &self.alg {
            map.serialize_entry("alg", alg)?;
        }
        map.end()
    }
}

#[derive(Deserialize)]
/// Wire form of a [`JWK`], members are validated when converting into a [`JWK`]
struct RawJWK {
    kty: String,
    crv: Option<String>,
    k: Option<String>,
    n: Option<String>,
    e: Option<String>,
    d: Option<String>,
    p: Option<String>,
    q: Option<String>,
    dp: Option<String>,
    dq: Option<String>,
    qi: Option<String>,
    x: Option<String>,
    y: Option<String>,
    r#use: Option<JWKUse>,
    key_ops: Option<Vec<KeyOperation>>,
    kid: Option<String>,
    alg: Option<String>,
}

impl Drop for RawJWK {
    fn drop(&mut self) {
        for secret in [
            &mut self.k,
            &mut self.d,
            &mut self.p,
            &mut self.q,
            &mut self.dp,
            &mut self.dq,
            &mut self.qi,
        ] {
            secret.zeroize();
        }
    }
}

fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str, JoseError> {
    value
        .map(String::as_str)
        .ok_or_else(|| JoseError::invalid_key(format!("missing member: {name}")))
}

fn decode_public(value: Option<&String>, name: &str) -> Result<Vec<u8>, JoseError> {
    Ok(BASE64_URL_SAFE_NO_PAD.decode(required(value, name)?)?)
}

fn decode_secret(value: Option<&String>, name: &str) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    Ok(Zeroizing::new(
        BASE64_URL_SAFE_NO_PAD.decode(required(value, name)?)?,
    ))
}

fn check_len(value: &[u8], expected: usize) -> Result<(), JoseError> {
    if value.len() != expected {
        return Err(JoseError::InvalidKeyLength {
            expected,
            actual: value.len(),
        });
    }
    Ok(())
}

impl TryFrom<RawJWK> for JWK {
    type Error = JoseError;

    fn try_from(raw: RawJWK) -> Result<Self, Self::Error> {
        let key_type = match raw.kty.as_str() {
            "oct" => JWKType::Oct {
                k: decode_secret(raw.k.as_ref(), "k")?,
            },
            "RSA" => {
                let private = match raw.d {
                    None => None,
                    Some(_) => Some(Box::new(RsaPrivateComponents {
                        d: decode_secret(raw.d.as_ref(), "d")?,
                        p: decode_secret(raw.p.as_ref(), "p")?,
                        q: decode_secret(raw.q.as_ref(), "q")?,
                        dp: decode_secret(raw.dp.as_ref(), "dp")?,
                        dq: decode_secret(raw.dq.as_ref(), "dq")?,
                        qi: decode_secret(raw.qi.as_ref(), "qi")?,
                    })),
                };
                JWKType::Rsa {
                    n: decode_public(raw.n.as_ref(), "n")?,
                    e: decode_public(raw.e.as_ref(), "e")?,
                    private,
                }
            }
            "EC" => {
                let crv = JWKEllipticCurves::from_name(required(raw.crv.as_ref(), "crv")?)?;
                let x = decode_public(raw.x.as_ref(), "x")?;
                let y = decode_public(raw.y.as_ref(), "y")?;
                check_len(&x, crv.coordinate_size())?;
                check_len(&y, crv.coordinate_size())?;
                let d = match raw.d {
                    None => None,
                    Some(_) => {
                        let d = decode_secret(raw.d.as_ref(), "d")?;
                        check_len(&d, crv.coordinate_size())?;
                        Some(d)
                    }
                };
                JWKType::Ec { crv, x, y, d }
            }
            "OKP" => {
                let crv = JWKOctetCurves::from_name(required(raw.crv.as_ref(), "crv")?)?;
                let x = decode_public(raw.x.as_ref(), "x")?;
                check_len(&x, 32)?;
                let d = match raw.d {
                    None => None,
                    Some(_) => {
                        let d = decode_secret(raw.d.as_ref(), "d")?;
                        check_len(&d, 32)?;
                        Some(d)
                    }
                };
                JWKType::Okp { crv, x, d }
            }
            other => {
                return Err(JoseError::invalid_key(format!("unsupported key type: {other}")));
            }
        };

        Ok(Self {
            key_type,
            r#use: raw.r#use,
            key_ops: raw.key_ops.clone(),
            kid: raw.kid.clone(),
            alg: raw.alg.clone(),
        })
    }
}
