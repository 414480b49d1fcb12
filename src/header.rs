//! JOSE headers and the header parameter registry.
//!
//! A JOSE header is the union of a protected (integrity protected) header
//! and one or more unprotected headers. Building that union is never
//! lenient: a name occurring twice, a must-protect name found in an
//! unprotected header, or a `crit` entry that is not understood are all
//! fatal.

use std::{borrow::Cow, collections::HashMap};

use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use jose_crypto::{JoseError, macros::generate_set_and_with};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Default, Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
/// [`Headers`] store protected or unprotected headers and already
/// serializes them to correct JSON values.
pub struct Headers(Option<Map<String, Value>>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Set provided header in the header map
        ///
        /// Warning: this function will replace already existing headers
        pub fn header(
            mut self,
            name: impl Into<String>,
            value: impl Serialize,
        ) -> Result<Self, JoseError> {
            let value = serde_json::to_value(value)?;
            self.0.get_or_insert_default().insert(name.into(), value);
            Ok(self)
        }
    }

    generate_set_and_with! {
        /// Set provided headers in the header map
        ///
        /// Warning: this function will replace already existing headers
        pub fn headers(mut self, headers: impl Serialize) -> Result<Self, JoseError> {
            let Value::Object(mut headers) = serde_json::to_value(headers)? else {
                return Err(JoseError::InvalidFormat(
                    "can only set multiple headers from a key value object".to_owned(),
                ));
            };

            match &mut self.0 {
                Some(existing_headers) => existing_headers.append(&mut headers),
                None => self.0 = Some(headers),
            };

            Ok(self)
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.as_ref().and_then(|headers| headers.get(name))
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        self.0.as_ref()
    }

    pub fn into_map(self) -> Option<Map<String, Value>> {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0.as_ref().is_none_or(Map::is_empty)
    }

    pub fn is_some(&self) -> bool {
        !self.is_none()
    }

    /// Try decode headers to the provided `T`
    pub fn decode<'de, 'a: 'de, T>(&'a self) -> Result<T, JoseError>
    where
        T: Deserialize<'de>,
    {
        match &self.0 {
            Some(headers) => Ok(T::deserialize(headers)?),
            None => Err(JoseError::InvalidOperation(
                "headers are None, deserialize not supported".to_owned(),
            )),
        }
    }
}

impl From<Map<String, Value>> for Headers {
    fn from(value: Map<String, Value>) -> Self {
        Self(Some(value))
    }
}

impl From<Option<Map<String, Value>>> for Headers {
    fn from(value: Option<Map<String, Value>>) -> Self {
        Self(value)
    }
}

/// Encode a header map the way it is carried in a token
pub(crate) fn encode_header(header: Option<&Map<String, Value>>) -> Result<String, JoseError> {
    match header {
        Some(header) if !header.is_empty() => {
            Ok(BASE64_URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?))
        }
        _ => Ok(String::new()),
    }
}

/// Decode an encoded protected header, empty input meaning no header
pub(crate) fn decode_header(encoded: &str) -> Result<Option<Map<String, Value>>, JoseError> {
    if encoded.is_empty() {
        return Ok(None);
    }
    let raw = BASE64_URL_SAFE_NO_PAD.decode(encoded)?;
    match serde_json::from_slice(&raw)? {
        Value::Object(header) => Ok(Some(header)),
        _ => Err(JoseError::InvalidFormat(
            "protected header is not a JSON object".to_owned(),
        )),
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Registration of a single header parameter
pub struct HeaderParameter {
    name: Cow<'static, str>,
    description: Cow<'static, str>,
    must_protect: bool,
    supported: bool,
    default: Option<Value>,
}

impl HeaderParameter {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            description: Cow::Borrowed(""),
            must_protect: false,
            supported: false,
            default: None,
        }
    }

    const fn registered(
        name: &'static str,
        description: &'static str,
        must_protect: bool,
        supported: bool,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            description: Cow::Borrowed(description),
            must_protect,
            supported,
            default: None,
        }
    }

    generate_set_and_with! {
        pub fn description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
            self.description = description.into();
            self
        }
    }

    generate_set_and_with! {
        /// Only allow this parameter in the protected header
        pub fn must_protect(mut self, must_protect: bool) -> Self {
            self.must_protect = must_protect;
            self
        }
    }

    generate_set_and_with! {
        /// Mark this parameter as understood, which is required
        /// for it to be listed in `crit`
        pub fn supported(mut self, supported: bool) -> Self {
            self.supported = supported;
            self
        }
    }

    generate_set_and_with! {
        /// Value assumed when the parameter is absent
        pub fn default_value(mut self, default: Option<Value>) -> Self {
            self.default = default;
            self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_must_protect(&self) -> bool {
        self.must_protect
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }
}

const JWS_PARAMETERS: [HeaderParameter; 11] = [
    HeaderParameter::registered("alg", "Algorithm", false, true),
    HeaderParameter::registered("jku", "JWK Set URL", false, false),
    HeaderParameter::registered("jwk", "JSON Web Key", false, false),
    HeaderParameter::registered("kid", "Key ID", false, true),
    HeaderParameter::registered("x5u", "X.509 URL", false, false),
    HeaderParameter::registered("x5c", "X.509 Certificate Chain", false, false),
    HeaderParameter::registered("x5t", "X.509 Certificate SHA-1 Thumbprint", false, false),
    HeaderParameter::registered(
        "x5t#S256",
        "X.509 Certificate SHA-256 Thumbprint",
        false,
        false,
    ),
    HeaderParameter::registered("typ", "Type", false, true),
    HeaderParameter::registered("cty", "Content Type", false, true),
    HeaderParameter::registered("crit", "Critical", true, true),
];

const JWE_PARAMETERS: [HeaderParameter; 9] = [
    HeaderParameter::registered("enc", "Encryption Algorithm", false, true),
    HeaderParameter::registered("zip", "Compression Algorithm", true, true),
    HeaderParameter::registered("epk", "Ephemeral Public Key", false, true),
    HeaderParameter::registered("apu", "Agreement PartyUInfo", false, true),
    HeaderParameter::registered("apv", "Agreement PartyVInfo", false, true),
    HeaderParameter::registered("iv", "Initialization Vector", false, true),
    HeaderParameter::registered("tag", "Authentication Tag", false, true),
    HeaderParameter::registered("p2s", "PBES2 Salt Input", false, true),
    HeaderParameter::registered("p2c", "PBES2 Count", false, true),
];

#[derive(Debug, Clone, PartialEq)]
/// Header parameters known to a JWS or JWE processor
///
/// Names that are not registered may still be used freely,
/// they just cannot be marked critical.
pub struct HeaderRegistry {
    parameters: HashMap<Cow<'static, str>, HeaderParameter>,
}

impl HeaderRegistry {
    /// Parameters of [`rfc7515`] and [`rfc7797`]
    ///
    /// [`rfc7515`]: https://datatracker.ietf.org/doc/html/rfc7515
    /// [`rfc7797`]: https://datatracker.ietf.org/doc/html/rfc7797
    pub fn jws() -> Self {
        let mut registry = Self {
            parameters: HashMap::new(),
        };
        for parameter in JWS_PARAMETERS {
            registry.set_parameter(parameter);
        }
        registry.set_parameter(
            HeaderParameter::registered("b64", "Base64url-Encode Payload", true, true)
                .with_default_value(Value::Bool(true)),
        );
        registry
    }

    /// Parameters of [`rfc7516`] and [`rfc7518`], on top of [`Self::jws`]
    ///
    /// [`rfc7516`]: https://datatracker.ietf.org/doc/html/rfc7516
    /// [`rfc7518`]: https://datatracker.ietf.org/doc/html/rfc7518
    pub fn jwe() -> Self {
        let mut registry = Self::jws();
        registry.parameters.remove("b64");
        for parameter in JWE_PARAMETERS {
            registry.set_parameter(parameter);
        }
        registry
    }

    generate_set_and_with! {
        /// Register (or replace) a header parameter
        pub fn parameter(mut self, parameter: HeaderParameter) -> Self {
            self.parameters.insert(parameter.name.clone(), parameter);
            self
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderParameter> {
        self.parameters.get(name)
    }

    /// Union of the protected header and the given unprotected headers
    pub(crate) fn merge(
        &self,
        protected: Option<&Map<String, Value>>,
        unprotected: &[Option<&Map<String, Value>>],
    ) -> Result<Map<String, Value>, JoseError> {
        let mut merged = protected.cloned().unwrap_or_default();

        for header in unprotected.iter().flatten() {
            for (name, value) in header.iter() {
                if self.get(name).is_some_and(HeaderParameter::is_must_protect) {
                    return Err(JoseError::MisplacedHeader(name.clone()));
                }
                if merged.contains_key(name) {
                    return Err(JoseError::DuplicateHeader(name.clone()));
                }
                merged.insert(name.clone(), value.clone());
            }
        }

        self.check_critical(&merged)?;
        Ok(merged)
    }

    /// Every name in `crit` must be registered, supported and present
    fn check_critical(&self, merged: &Map<String, Value>) -> Result<(), JoseError> {
        let Some(crit) = merged.get("crit") else {
            return Ok(());
        };
        let names = crit
            .as_array()
            .filter(|names| !names.is_empty())
            .ok_or_else(|| {
                JoseError::InvalidFormat("crit must be a non-empty array".to_owned())
            })?;

        for name in names {
            let name = name.as_str().ok_or_else(|| {
                JoseError::InvalidFormat("crit must only contain strings".to_owned())
            })?;
            let understood = self.get(name).is_some_and(HeaderParameter::is_supported);
            if !understood || !merged.contains_key(name) {
                return Err(JoseError::UnsupportedCritical(name.to_owned()));
            }
        }
        Ok(())
    }
}

/// Read a string header parameter
pub(crate) fn header_str<'a>(
    header: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a str>, JoseError> {
    match header.get(name) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(JoseError::InvalidFormat(format!(
            "header parameter {name} must be a string"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn headers_builders() {
        let headers = Headers::new()
            .try_with_header("alg", "HS256")
            .unwrap()
            .try_with_headers(json!({"kid": "1", "typ": "JWT"}))
            .unwrap();
        assert_eq!(headers.get("alg"), Some(&json!("HS256")));
        assert_eq!(headers.get("kid"), Some(&json!("1")));
        assert!(headers.is_some());
        assert!(Headers::new().is_none());
        assert!(Headers::new().try_with_headers("not a map").is_err());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = HeaderRegistry::jws();
        let protected = map(json!({"alg": "HS256"}));
        let unprotected = map(json!({"alg": "HS384"}));
        assert_eq!(
            registry.merge(Some(&protected), &[Some(&unprotected)]),
            Err(JoseError::DuplicateHeader("alg".to_owned()))
        );

        let a = map(json!({"kid": "1"}));
        let b = map(json!({"kid": "2"}));
        assert_eq!(
            registry.merge(None, &[Some(&a), Some(&b)]),
            Err(JoseError::DuplicateHeader("kid".to_owned()))
        );
    }

    #[test]
    fn must_protect_names_are_rejected_when_unprotected() {
        let registry = HeaderRegistry::jwe();
        let unprotected = map(json!({"zip": "DEF"}));
        assert_eq!(
            registry.merge(None, &[Some(&unprotected)]),
            Err(JoseError::MisplacedHeader("zip".to_owned()))
        );
        let unprotected = map(json!({"crit": ["exp"]}));
        assert_eq!(
            registry.merge(None, &[Some(&unprotected)]),
            Err(JoseError::MisplacedHeader("crit".to_owned()))
        );
    }

    #[test]
    fn critical_names_must_be_understood_and_present() {
        let registry = HeaderRegistry::jws();

        let protected = map(json!({"alg": "HS256", "crit": ["b64"], "b64": false}));
        assert!(registry.merge(Some(&protected), &[]).is_ok());

        let protected = map(json!({"alg": "HS256", "crit": ["exp"], "exp": 1}));
        assert_eq!(
            registry.merge(Some(&protected), &[]),
            Err(JoseError::UnsupportedCritical("exp".to_owned()))
        );

        let protected = map(json!({"alg": "HS256", "crit": ["b64"]}));
        assert_eq!(
            registry.merge(Some(&protected), &[]),
            Err(JoseError::UnsupportedCritical("b64".to_owned()))
        );

        let protected = map(json!({"alg": "HS256", "crit": []}));
        assert!(matches!(
            registry.merge(Some(&protected), &[]),
            Err(JoseError::InvalidFormat(_))
        ));

        // extensions become usable once registered as supported
        let registry = registry.with_parameter(
            HeaderParameter::new("exp")
                .with_description("expiry of the signature")
                .with_supported(true),
        );
        let protected = map(json!({"alg": "HS256", "crit": ["exp"], "exp": 1}));
        assert!(registry.merge(Some(&protected), &[]).is_ok());
    }

    #[test]
    fn registry_defaults() {
        let jws = HeaderRegistry::jws();
        assert_eq!(jws.get("b64").unwrap().default_value(), Some(&json!(true)));
        assert!(jws.get("enc").is_none());
        assert!(!jws.get("x5c").unwrap().is_supported());

        let jwe = HeaderRegistry::jwe();
        assert!(jwe.get("b64").is_none());
        assert!(jwe.get("zip").unwrap().is_must_protect());
        assert_eq!(jwe.get("p2c").unwrap().description(), "PBES2 Count");
    }

    #[test]
    fn protected_header_codec() {
        let header = map(json!({"alg": "none"}));
        let encoded = encode_header(Some(&header)).unwrap();
        assert_eq!(encoded, "eyJhbGciOiJub25lIn0");
        assert_eq!(decode_header(&encoded).unwrap(), Some(header));
        assert_eq!(decode_header("").unwrap(), None);
        assert!(decode_header("WzFd").is_err());
    }
}
