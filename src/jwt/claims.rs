use jose_crypto::JoseError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
/// The `aud` claim, a single audience or a list of them
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Self::One(one) => one == audience,
            Self::Many(many) => many.iter().any(|one| one == audience),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
/// Registered claims of section 4.1 of [`rfc7519`], other claims end up in `extra`
///
/// [`rfc7519`]: https://datatracker.ietf.org/doc/html/rfc7519
pub struct RegisteredClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
/// Payload of a JWT
pub enum Claims {
    /// A JSON claims set
    Object(Map<String, Value>),
    /// Anything else, usually a nested token
    Text(String),
}

impl Claims {
    /// Claims from any value serializing to a JSON object (or string)
    pub fn from_serialize(value: impl Serialize) -> Result<Self, JoseError> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self::Object(map)),
            Value::String(text) => Ok(Self::Text(text)),
            _ => Err(JoseError::InvalidFormat(
                "claims must be a JSON object or a string".to_owned(),
            )),
        }
    }

    pub fn as_object(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Object(_) => None,
            Self::Text(text) => Some(text),
        }
    }

    /// Typed view on the registered claims
    pub fn registered(&self) -> Result<RegisteredClaims, JoseError> {
        match self {
            Self::Object(map) => Ok(RegisteredClaims::deserialize(map)?),
            Self::Text(_) => Err(JoseError::InvalidOperation(
                "claims are not a JSON object".to_owned(),
            )),
        }
    }

    pub(super) fn to_payload(&self) -> Result<Vec<u8>, JoseError> {
        match self {
            Self::Object(map) => Ok(serde_json::to_vec(map)?),
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
        }
    }

    pub(super) fn from_payload(payload: &[u8]) -> Result<Self, JoseError> {
        if let Ok(Value::Object(map)) = serde_json::from_slice(payload) {
            return Ok(Self::Object(map));
        }
        let text = std::str::from_utf8(payload).map_err(|err| {
            JoseError::InvalidFormat(format!("claims are neither JSON nor UTF-8: {err}"))
        })?;
        Ok(Self::Text(text.to_owned()))
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(value: Map<String, Value>) -> Self {
        Self::Object(value)
    }
}

impl From<String> for Claims {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Claims {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// Copy `claims`, adding every claim of `defaults` it does not have
///
/// A `null` default is generated: `exp` as `now + validity`, `nbf` and
/// `iat` as `now` and `jti` as a random UUID. Other `null` defaults are skipped.
pub(super) fn with_defaults(
    claims: &Map<String, Value>,
    defaults: &Map<String, Value>,
    now: i64,
    validity: i64,
) -> Map<String, Value> {
    let mut out = claims.clone();
    for (name, default) in defaults {
        if out.contains_key(name) {
            continue;
        }
        let value = match (name.as_str(), default) {
            ("exp", Value::Null) => Value::from(now.saturating_add(validity)),
            ("nbf" | "iat", Value::Null) => Value::from(now),
            ("jti", Value::Null) => Value::from(uuid::Uuid::new_v4().to_string()),
            (_, Value::Null) => continue,
            (_, value) => value.clone(),
        };
        out.insert(name.clone(), value);
    }
    out
}

/// NumericDate claim, fractions are truncated
fn numeric_date(claims: &Map<String, Value>, name: &str) -> Result<Option<i64>, JoseError> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|date| date as i64))
            .map(Some)
            .ok_or_else(|| JoseError::InvalidClaimValue(name.to_owned())),
    }
}

fn audience(value: &Value) -> Option<Audience> {
    Audience::deserialize(value).ok()
}

/// `exp` and `nbf`, whenever present
pub(super) fn check_validity(
    claims: &Map<String, Value>,
    now: i64,
    leeway: i64,
) -> Result<(), JoseError> {
    if let Some(exp) = numeric_date(claims, "exp")?
        && now > exp.saturating_add(leeway)
    {
        return Err(JoseError::Expired);
    }
    if let Some(nbf) = numeric_date(claims, "nbf")?
        && now < nbf.saturating_sub(leeway)
    {
        return Err(JoseError::NotYetValid);
    }
    Ok(())
}

/// Check every entry of the caller's check table
///
/// A `null` entry only requires the claim to be present. For `exp`,
/// `nbf` and `iat` the entry is the reference time (`null` meaning now),
/// for `aud` one audience (or any of a list) must match, everything
/// else must be equal.
pub(super) fn check_expected(
    claims: &Map<String, Value>,
    expected: &Map<String, Value>,
    now: i64,
    leeway: i64,
) -> Result<(), JoseError> {
    for (name, value) in expected {
        let Some(actual) = claims.get(name) else {
            return Err(JoseError::MissingClaim(name.clone()));
        };

        match name.as_str() {
            "exp" | "nbf" | "iat" => {
                let reference = match value {
                    Value::Null => now,
                    value => value
                        .as_i64()
                        .ok_or_else(|| JoseError::InvalidClaimValue(name.clone()))?,
                };
                let date = numeric_date(claims, name)?.unwrap_or(reference);
                match name.as_str() {
                    "exp" if date.saturating_add(leeway) < reference => {
                        return Err(JoseError::Expired);
                    }
                    "nbf" if date.saturating_sub(leeway) > reference => {
                        return Err(JoseError::NotYetValid);
                    }
                    "iat" if date.saturating_sub(leeway) > reference => {
                        return Err(JoseError::InvalidClaimValue(name.clone()));
                    }
                    _ => (),
                }
            }
            "aud" => {
                if value.is_null() {
                    continue;
                }
                let (Some(actual), Some(wanted)) = (audience(actual), audience(value)) else {
                    return Err(JoseError::InvalidClaimValue(name.clone()));
                };
                let matched = match &wanted {
                    Audience::One(one) => actual.contains(one),
                    Audience::Many(many) => many.iter().any(|one| actual.contains(one)),
                };
                if !matched {
                    return Err(JoseError::InvalidClaimValue(name.clone()));
                }
            }
            _ => {
                if !value.is_null() && actual != value {
                    return Err(JoseError::InvalidClaimValue(name.clone()));
                }
            }
        }
    }
    Ok(())
}
