//! [`JWA`] or JSON Web Algorithms as defined in [`rfc7518`]
//!
//! Algorithms are looked up by their registered name in one process wide
//! table, built on first use and never mutated afterwards. Each lookup is
//! bound to one usage class, so a key management name can never be used
//! where a signature algorithm was asked for.
//!
//! [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518

use std::{collections::HashMap, fmt, sync::LazyLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::JoseError;

mod content;
mod key_management;
mod signing;

pub use content::{ContentEncryptionAlgorithm, EncryptedContent};
pub use key_management::{KeyManagementAlgorithm, Pbes2Config, WrappedKey};
pub use signing::SigningAlgorithm;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Usage class of an algorithm
pub enum AlgorithmUsage {
    /// Digital signature or MAC (`sig`)
    Signature,
    /// Key management (`kex`)
    KeyExchange,
    /// Content encryption (`enc`)
    Encryption,
}

impl AlgorithmUsage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "sig",
            Self::KeyExchange => "kex",
            Self::Encryption => "enc",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Header parameter an algorithm name is carried in
pub enum HeaderLocation {
    Alg,
    Enc,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Immutable description of a registered algorithm
pub struct AlgorithmDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// Key size in bits, `None` when it is derived from context
    /// (such as `dir`, `ECDH-ES` and `EdDSA`)
    pub key_size: Option<usize>,
    pub location: HeaderLocation,
    pub usage: AlgorithmUsage,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
/// Any registered algorithm
pub enum JWA {
    Signing(SigningAlgorithm),
    KeyManagement(KeyManagementAlgorithm),
    ContentEncryption(ContentEncryptionAlgorithm),
}

impl JWA {
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn descriptor(self) -> AlgorithmDescriptor {
        match self {
            Self::Signing(alg) => alg.descriptor(),
            Self::KeyManagement(alg) => alg.descriptor(),
            Self::ContentEncryption(alg) => alg.descriptor(),
        }
    }

    pub fn usage(self) -> AlgorithmUsage {
        self.descriptor().usage
    }
}

impl From<SigningAlgorithm> for JWA {
    fn from(value: SigningAlgorithm) -> Self {
        Self::Signing(value)
    }
}

impl From<KeyManagementAlgorithm> for JWA {
    fn from(value: KeyManagementAlgorithm) -> Self {
        Self::KeyManagement(value)
    }
}

impl From<ContentEncryptionAlgorithm> for JWA {
    fn from(value: ContentEncryptionAlgorithm) -> Self {
        Self::ContentEncryption(value)
    }
}

impl fmt::Display for JWA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for JWA {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for JWA {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        lookup(&name).map_err(serde::de::Error::custom)
    }
}

static REGISTRY: LazyLock<HashMap<&'static str, JWA>> = LazyLock::new(|| {
    SigningAlgorithm::ALL
        .into_iter()
        .map(JWA::from)
        .chain(KeyManagementAlgorithm::ALL.into_iter().map(JWA::from))
        .chain(ContentEncryptionAlgorithm::ALL.into_iter().map(JWA::from))
        .map(|alg| (alg.name(), alg))
        .collect()
});

/// Find a registered algorithm of any usage class
pub fn lookup(name: &str) -> Result<JWA, JoseError> {
    REGISTRY
        .get(name)
        .copied()
        .ok_or_else(|| JoseError::UnknownAlgorithm(name.to_owned()))
}

pub fn signing_algorithm(name: &str) -> Result<SigningAlgorithm, JoseError> {
    match lookup(name)? {
        JWA::Signing(alg) => Ok(alg),
        _ => Err(JoseError::UnknownAlgorithm(name.to_owned())),
    }
}

pub fn keymgmt_algorithm(name: &str) -> Result<KeyManagementAlgorithm, JoseError> {
    match lookup(name)? {
        JWA::KeyManagement(alg) => Ok(alg),
        _ => Err(JoseError::UnknownAlgorithm(name.to_owned())),
    }
}

pub fn encryption_algorithm(name: &str) -> Result<ContentEncryptionAlgorithm, JoseError> {
    match lookup(name)? {
        JWA::ContentEncryption(alg) => Ok(alg),
        _ => Err(JoseError::UnknownAlgorithm(name.to_owned())),
    }
}

/// Every registered algorithm
pub fn registered_algorithms() -> impl Iterator<Item = JWA> {
    REGISTRY.values().copied()
}

/// Names allowed when the caller does not pass an allow-list
///
/// This is every registered name except `none` and `RSA1_5`.
pub fn default_allowed_algorithms() -> Vec<&'static str> {
    let mut names: Vec<_> = REGISTRY
        .keys()
        .copied()
        .filter(|name| !matches!(*name, "none" | "RSA1_5"))
        .collect();
    names.sort_unstable();
    names
}
