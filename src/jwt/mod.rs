//! [`JWT`] or JSON Web Token as defined in [`rfc7519`]
//!
//! A [`JWT`] wraps its [`Claims`] in a [`JWS`] or a [`JWE`]. Tokens
//! received from elsewhere are first authenticated by the wrapped
//! token and only then are their claims checked, so a claims failure
//! (see [`JoseError::is_claims_error`]) always concerns an authentic token.
//!
//! [`rfc7519`]: https://datatracker.ietf.org/doc/html/rfc7519

use jiff::{SignedDuration, Timestamp};
use jose_crypto::{
    JWA, JWK, JWKUse, JoseError, KeyOperation, KeySource, jwa, macros::generate_set_and_with,
};
use serde_json::{Map, Value};

use crate::{
    header::Headers,
    jwe::{JWE, JweDecryptOptions},
    jws::{JWS, JwsVerifyOptions, SignatureState},
};

mod claims;
pub use claims::{Audience, Claims, RegisteredClaims};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Wrapper type of a [`JWT`]
pub enum TokenType {
    Jws,
    Jwe,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jws => "JWS",
            Self::Jwe => "JWE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Options of a [`JWT`]
pub struct JwtOptions {
    leeway: SignedDuration,
    validity: SignedDuration,
    default_claims: Option<Map<String, Value>>,
    check_claims: Option<Map<String, Value>>,
    expected_type: Option<TokenType>,
    allowed_algs: Option<Vec<String>>,
}

impl Default for JwtOptions {
    fn default() -> Self {
        Self {
            leeway: SignedDuration::from_secs(60),
            validity: SignedDuration::from_secs(600),
            default_claims: None,
            check_claims: None,
            expected_type: None,
            allowed_algs: None,
        }
    }
}

impl JwtOptions {
    generate_set_and_with! {
        /// Clock skew tolerated on `exp` and `nbf`
        pub fn leeway(mut self, leeway: SignedDuration) -> Self {
            self.leeway = leeway;
            self
        }
    }

    generate_set_and_with! {
        /// Lifetime used for a generated `exp` claim
        pub fn validity(mut self, validity: SignedDuration) -> Self {
            self.validity = validity;
            self
        }
    }

    generate_set_and_with! {
        /// Claims added to claims that do not have them, `null` values
        /// are generated for `exp`, `nbf`, `iat` and `jti`
        pub fn default_claims(mut self, claims: Option<Map<String, Value>>) -> Self {
            self.default_claims = claims;
            self
        }
    }

    generate_set_and_with! {
        /// Claims a validated token must carry, `null` values
        /// only require presence
        pub fn check_claims(mut self, claims: Option<Map<String, Value>>) -> Self {
            self.check_claims = claims;
            self
        }
    }

    generate_set_and_with! {
        /// Wrapper type a validated token must have,
        /// inferred when not set
        pub fn expected_type(mut self, token_type: Option<TokenType>) -> Self {
            self.expected_type = token_type;
            self
        }
    }

    generate_set_and_with! {
        /// Algorithm names accepted by the wrapped token
        pub fn allowed_algs(mut self, algs: Option<Vec<String>>) -> Self {
            self.allowed_algs = algs;
            self
        }
    }

    pub fn leeway(&self) -> SignedDuration {
        self.leeway
    }

    pub fn validity(&self) -> SignedDuration {
        self.validity
    }

    pub fn expected_type(&self) -> Option<TokenType> {
        self.expected_type
    }
}

#[derive(Debug, Clone)]
/// The token a [`JWT`] is carried in
pub enum Token {
    Jws(JWS),
    Jwe(JWE),
}

impl Token {
    pub fn token_type(&self) -> TokenType {
        match self {
            Self::Jws(_) => TokenType::Jws,
            Self::Jwe(_) => TokenType::Jwe,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// A claims set carried in a signed or encrypted token, see the [module docs](self)
pub struct JWT {
    header: Option<Map<String, Value>>,
    claims: Option<Claims>,
    token: Option<Token>,
    options: JwtOptions,
}

impl JWT {
    pub fn new() -> Self {
        Self::default()
    }

    generate_set_and_with! {
        /// Options are applied to claims set afterwards,
        /// so set them first
        pub fn options(mut self, options: JwtOptions) -> Self {
            self.options = options;
            self
        }
    }

    generate_set_and_with! {
        /// Protected header of the token to create, `typ` defaults to `JWT`
        ///
        /// Before deserializing, an `enc` in this header marks
        /// the expected token as a [`JWE`].
        pub fn header(mut self, header: Headers) -> Self {
            self.header = header.into_map();
            self
        }
    }

    generate_set_and_with! {
        /// Claims of the token to create, augmented with the configured default claims
        pub fn claims(mut self, claims: impl Into<Claims>) -> Self {
            let claims = match (claims.into(), &self.options.default_claims) {
                (Claims::Object(map), Some(defaults)) => Claims::Object(claims::with_defaults(
                    &map,
                    defaults,
                    Timestamp::now().as_second(),
                    self.options.validity.as_secs(),
                )),
                (claims, _) => claims,
            };
            self.claims = Some(claims);
            self
        }
    }

    pub fn options(&self) -> &JwtOptions {
        &self.options
    }

    pub fn header(&self) -> Option<&Map<String, Value>> {
        self.header.as_ref()
    }

    pub fn claims(&self) -> Option<&Claims> {
        self.claims.as_ref()
    }

    pub fn registered_claims(&self) -> Result<RegisteredClaims, JoseError> {
        self.claims
            .as_ref()
            .ok_or_else(|| JoseError::InvalidOperation("no claims".to_owned()))?
            .registered()
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    fn token_header(&self) -> Headers {
        let mut header = self.header.clone().unwrap_or_default();
        header
            .entry("typ")
            .or_insert_with(|| Value::from("JWT"));
        Headers::from(header)
    }

    fn payload(&self) -> Result<Vec<u8>, JoseError> {
        self.claims
            .as_ref()
            .ok_or_else(|| JoseError::InvalidOperation("no claims to wrap".to_owned()))?
            .to_payload()
    }

    /// Sign the claims, `alg` is taken from the header or else from the key
    pub fn make_signed_token(&mut self, key: &JWK) -> Result<(), JoseError> {
        let header = self.token_header();
        let alg = if header.get("alg").is_some() {
            None
        } else {
            key.alg()
        };

        let mut jws = JWS::new(self.payload()?).with_options(
            JwsVerifyOptions::default().maybe_with_allowed_algs(self.options.allowed_algs.clone()),
        );
        jws.add_signature(key, alg, header, Headers::new())?;

        self.token = Some(Token::Jws(jws));
        self.options.expected_type = Some(TokenType::Jws);
        Ok(())
    }

    /// Encrypt the claims, the header must name `alg` and `enc`
    pub fn make_encrypted_token(&mut self, key: &JWK) -> Result<(), JoseError> {
        let mut jwe = JWE::new(self.payload()?, self.token_header(), Headers::new()).with_options(
            JweDecryptOptions::default().maybe_with_allowed_algs(self.options.allowed_algs.clone()),
        );
        jwe.add_recipient(key, Headers::new())?;

        self.token = Some(Token::Jwe(jwe));
        self.options.expected_type = Some(TokenType::Jwe);
        Ok(())
    }

    /// Serialize the wrapped token, see [`JWS::serialize`] and [`JWE::serialize`]
    pub fn serialize(&mut self, compact: bool) -> Result<String, JoseError> {
        match &mut self.token {
            Some(Token::Jws(jws)) => jws.serialize(compact),
            Some(Token::Jwe(jwe)) => jwe.serialize(compact),
            None => Err(JoseError::InvalidOperation(
                "no token, make a signed or encrypted token first".to_owned(),
            )),
        }
    }

    /// Parse a token and, when a key is given, validate it
    ///
    /// The wrapper type follows from the shape alone: three compact
    /// segments are a [`JWS`], five a [`JWE`]. JSON is a [`JWE`] when it
    /// has a `ciphertext` and a [`JWS`] otherwise.
    pub fn deserialize(&mut self, raw: &str, key: Option<KeySource<'_>>) -> Result<(), JoseError> {
        let raw = raw.trim();
        let allowed_algs = self.options.allowed_algs.clone();

        let is_jwe = if raw.starts_with('{') {
            let value: Value = serde_json::from_str(raw)?;
            value.get("ciphertext").is_some()
        } else {
            match raw.split('.').count() {
                3 => false,
                5 => true,
                segments => {
                    return Err(JoseError::InvalidFormat(format!(
                        "token with {segments} segments is neither a JWS nor a JWE"
                    )));
                }
            }
        };

        let token = if is_jwe {
            Token::Jwe(JWE::deserialize(raw)?.with_options(
                JweDecryptOptions::default().maybe_with_allowed_algs(allowed_algs),
            ))
        } else {
            Token::Jws(JWS::deserialize(raw)?.with_options(
                JwsVerifyOptions::default().maybe_with_allowed_algs(allowed_algs),
            ))
        };

        self.token = Some(token);
        self.claims = None;

        match key {
            Some(key) => self.validate(key),
            None => Ok(()),
        }
    }

    /// Authenticate the wrapped token, then check its claims
    pub fn validate<'a>(&mut self, key: impl Into<KeySource<'a>>) -> Result<(), JoseError> {
        let keys = key.into();
        let expected = self.expected_type(keys);

        let Some(token) = &mut self.token else {
            return Err(JoseError::InvalidOperation(
                "no token to validate".to_owned(),
            ));
        };
        let found = token.token_type();
        if expected != found {
            return Err(JoseError::TypeMismatch {
                expected: expected.as_str(),
                found: found.as_str(),
            });
        }

        let (header, payload) = match token {
            Token::Jws(jws) => {
                jws.verify(keys, None, None)?;
                let index = jws
                    .signatures()
                    .iter()
                    .position(|signature| signature.state() == SignatureState::Valid)
                    .unwrap_or_default();
                (jws.jose_header(index)?, jws.payload().map(<[u8]>::to_vec))
            }
            Token::Jwe(jwe) => {
                jwe.decrypt(keys)?;
                (jwe.jose_header(0)?, jwe.plaintext().map(<[u8]>::to_vec))
            }
        };
        let payload = payload.ok_or_else(|| {
            JoseError::InvalidOperation("validated token has no payload".to_owned())
        })?;

        let claims = Claims::from_payload(&payload)?;
        self.header = Some(header);
        self.claims = Some(claims);
        self.check_claims()
    }

    fn check_claims(&self) -> Result<(), JoseError> {
        let now = Timestamp::now().as_second();
        let leeway = self.options.leeway.as_secs();

        match &self.claims {
            Some(Claims::Object(claims)) => {
                claims::check_validity(claims, now, leeway)?;
                if let Some(expected) = &self.options.check_claims {
                    claims::check_expected(claims, expected, now, leeway)?;
                }
                Ok(())
            }
            _ => match self
                .options
                .check_claims
                .as_ref()
                .and_then(|expected| expected.keys().next())
            {
                Some(name) => Err(JoseError::MissingClaim(name.clone())),
                None => Ok(()),
            },
        }
    }

    /// Infer the wrapper type a token must have
    ///
    /// In order: the configured type, the allow-list when it only names
    /// algorithms of one kind, an `enc` header and finally the `use` or
    /// `key_ops` of the key(s). When nothing decides, a [`JWS`] is expected.
    fn expected_type(&self, keys: KeySource<'_>) -> TokenType {
        if let Some(expected) = self.options.expected_type {
            return expected;
        }

        if let Some(algs) = self.options.allowed_algs.as_deref()
            && !algs.is_empty()
        {
            let kinds: Vec<_> = algs.iter().map(|name| jwa::lookup(name).ok()).collect();
            if kinds.iter().all(|kind| {
                matches!(kind, Some(JWA::KeyManagement(_) | JWA::ContentEncryption(_)))
            }) {
                return TokenType::Jwe;
            }
            if kinds.iter().all(|kind| matches!(kind, Some(JWA::Signing(_)))) {
                return TokenType::Jws;
            }
        }

        if self
            .header
            .as_ref()
            .is_some_and(|header| header.contains_key("enc"))
        {
            return TokenType::Jwe;
        }

        let mut hints = keys.keys().into_iter().map(key_type_hint);
        if let Some(Some(first)) = hints.next()
            && hints.all(|hint| hint == Some(first))
        {
            return first;
        }

        tracing::debug!("JWT token type could not be inferred, expecting a JWS");
        TokenType::Jws
    }
}

fn key_type_hint(key: &JWK) -> Option<TokenType> {
    match key.key_use() {
        Some(JWKUse::Signature) => return Some(TokenType::Jws),
        Some(JWKUse::Encryption) => return Some(TokenType::Jwe),
        None => (),
    }

    let ops = key.key_ops().filter(|ops| !ops.is_empty())?;
    let signing = |op: &KeyOperation| matches!(op, KeyOperation::Sign | KeyOperation::Verify);
    if ops.iter().all(signing) {
        Some(TokenType::Jws)
    } else if !ops.iter().any(signing) {
        Some(TokenType::Jwe)
    } else {
        None
    }
}
