use serde::{Deserialize, Serialize};

use crate::{JWK, JoseError};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
/// [`JWKSet`] as defined in section 5 of [`rfc7517`]
///
/// Used for verification and decryption when the right key
/// is not known in advance.
///
/// [`rfc7517`]: https://datatracker.ietf.org/doc/html/rfc7517
pub struct JWKSet {
    keys: Vec<JWK>,
}

impl JWKSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, JoseError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, JoseError> {
        Ok(serde_json::to_string(self)?)
    }

    #[must_use]
    pub fn with_key(mut self, key: JWK) -> Self {
        self.keys.push(key);
        self
    }

    pub fn add(&mut self, key: JWK) -> &mut Self {
        self.keys.push(key);
        self
    }

    /// First key with the given key id
    pub fn get_key(&self, kid: &str) -> Option<&JWK> {
        self.keys.iter().find(|key| key.kid() == Some(kid))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JWK> {
        self.keys.iter()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<JWK> for JWKSet {
    fn from_iter<T: IntoIterator<Item = JWK>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a JWKSet {
    type Item = &'a JWK;
    type IntoIter = std::slice::Iter<'a, JWK>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

#[derive(Debug, Clone, Copy)]
/// Key material offered for verification or decryption
pub enum KeySource<'a> {
    Key(&'a JWK),
    Set(&'a JWKSet),
}

impl<'a> From<&'a JWK> for KeySource<'a> {
    fn from(value: &'a JWK) -> Self {
        Self::Key(value)
    }
}

impl<'a> From<&'a JWKSet> for KeySource<'a> {
    fn from(value: &'a JWKSet) -> Self {
        Self::Set(value)
    }
}

impl<'a> KeySource<'a> {
    /// Keys to try for a token whose merged header carries `kid`
    ///
    /// A single key is always tried. For a set, a `kid` restricts the
    /// candidates to keys with that id, otherwise every key is tried.
    pub fn candidates(self, kid: Option<&str>) -> Result<Vec<&'a JWK>, JoseError> {
        let keys: Vec<&'a JWK> = match (self, kid) {
            (Self::Key(key), _) => vec![key],
            (Self::Set(set), Some(kid)) => {
                set.iter().filter(|key| key.kid() == Some(kid)).collect()
            }
            (Self::Set(set), None) => set.iter().collect(),
        };
        if keys.is_empty() {
            return Err(JoseError::KeyNotFound);
        }
        Ok(keys)
    }

    pub fn keys(self) -> Vec<&'a JWK> {
        match self {
            Self::Key(key) => vec![key],
            Self::Set(set) => set.iter().collect(),
        }
    }
}
