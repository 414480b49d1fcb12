//! [`JWE`] or JSON Web Encryption as defined in [`rfc7516`]
//!
//! The plaintext is encrypted once with a content encryption key (CEK),
//! which is then wrapped for every recipient. All recipients of one
//! [`JWE`] therefore share a single `iv`, `ciphertext` and `tag`.
//!
//! [`rfc7516`]: https://datatracker.ietf.org/doc/html/rfc7516

use jose_crypto::{
    ContentEncryptionAlgorithm, EncryptedContent, JWK, JoseError, KeyManagementAlgorithm,
    KeySource, Pbes2Config, jwa, macros::generate_set_and_with,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::{
    header::{HeaderRegistry, Headers, decode_header, encode_header, header_str},
    util::{b64_decode, b64_encode, check_allowed, most_relevant},
};

mod compression;
pub use compression::DEFAULT_MAX_DECOMPRESSED_SIZE;

#[derive(Debug, Clone, PartialEq)]
/// Options applied when content is encrypted or decrypted
pub struct JweDecryptOptions {
    allowed_algs: Option<Vec<String>>,
    max_decompressed_size: usize,
    pbes2: Pbes2Config,
    header_registry: HeaderRegistry,
}

impl Default for JweDecryptOptions {
    fn default() -> Self {
        Self {
            allowed_algs: None,
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            pbes2: Pbes2Config::default(),
            header_registry: HeaderRegistry::jwe(),
        }
    }
}

impl JweDecryptOptions {
    generate_set_and_with! {
        /// Key management and content encryption names accepted,
        /// [`jwa::default_allowed_algorithms`] when unset
        pub fn allowed_algs(mut self, algs: Option<Vec<String>>) -> Self {
            self.allowed_algs = algs;
            self
        }
    }

    generate_set_and_with! {
        /// Upper bound of the plaintext size after inflating `zip: DEF` content
        pub fn max_decompressed_size(mut self, size: usize) -> Self {
            self.max_decompressed_size = size;
            self
        }
    }

    generate_set_and_with! {
        pub fn pbes2(mut self, config: Pbes2Config) -> Self {
            self.pbes2 = config;
            self
        }
    }

    generate_set_and_with! {
        pub fn header_registry(mut self, registry: HeaderRegistry) -> Self {
            self.header_registry = registry;
            self
        }
    }

    pub fn allowed_algs(&self) -> Option<&[String]> {
        self.allowed_algs.as_deref()
    }

    pub fn max_decompressed_size(&self) -> usize {
        self.max_decompressed_size
    }

    pub fn pbes2(&self) -> &Pbes2Config {
        &self.pbes2
    }

    pub fn header_registry(&self) -> &HeaderRegistry {
        &self.header_registry
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    header: Option<Map<String, Value>>,
    encrypted_key: Vec<u8>,
}

impl Recipient {
    pub fn header(&self) -> Option<&Map<String, Value>> {
        self.header.as_ref()
    }

    /// Empty for `dir` and `ECDH-ES`
    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    fn has_header(&self) -> bool {
        self.header.as_ref().is_some_and(|header| !header.is_empty())
    }
}

#[derive(Clone)]
/// Encrypted content for one or more recipients, see the [module docs](self)
pub struct JWE {
    plaintext: Option<Zeroizing<Vec<u8>>>,
    protected: Option<Map<String, Value>>,
    /// Exactly as found on the wire, part of the content AAD
    protected_raw: String,
    unprotected: Option<Map<String, Value>>,
    aad: Option<Vec<u8>>,
    recipients: Vec<Recipient>,
    content: Option<EncryptedContent>,
    enc: Option<ContentEncryptionAlgorithm>,
    cek: Option<Zeroizing<Vec<u8>>>,
    options: JweDecryptOptions,
    decrypt_log: Vec<String>,
}

impl std::fmt::Debug for JWE {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JWE")
            .field("protected", &self.protected)
            .field("unprotected", &self.unprotected)
            .field("aad", &self.aad)
            .field("recipients", &self.recipients)
            .field("content", &self.content)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl JWE {
    /// Start a new [`JWE`], the content is encrypted when the first recipient is added
    pub fn new(plaintext: impl Into<Vec<u8>>, protected: Headers, unprotected: Headers) -> Self {
        Self {
            plaintext: Some(Zeroizing::new(plaintext.into())),
            protected: protected.into_map().filter(|header| !header.is_empty()),
            protected_raw: String::new(),
            unprotected: unprotected.into_map().filter(|header| !header.is_empty()),
            aad: None,
            recipients: Vec::new(),
            content: None,
            enc: None,
            cek: None,
            options: JweDecryptOptions::default(),
            decrypt_log: Vec::new(),
        }
    }

    generate_set_and_with! {
        /// Additional data authenticated together with the protected header
        ///
        /// Fails once the content is encrypted, that is after the first
        /// recipient is added or on a received [`JWE`].
        pub fn external_aad(mut self, aad: impl Into<Vec<u8>>) -> Result<Self, JoseError> {
            if self.content.is_some() {
                return Err(JoseError::InvalidOperation(
                    "external aad must be set before the content is encrypted".to_owned(),
                ));
            }
            self.aad = Some(aad.into());
            Ok(self)
        }
    }

    generate_set_and_with! {
        pub fn options(mut self, options: JweDecryptOptions) -> Self {
            self.options = options;
            self
        }
    }

    pub fn options(&self) -> &JweDecryptOptions {
        &self.options
    }

    /// Wrap the content encryption key for one more recipient
    ///
    /// The first recipient determines the CEK and triggers the content
    /// encryption, every next recipient wraps that same CEK.
    pub fn add_recipient(&mut self, key: &JWK, header: Headers) -> Result<&mut Self, JoseError> {
        if self.plaintext.is_none() {
            return Err(JoseError::InvalidOperation(
                "no plaintext to encrypt".to_owned(),
            ));
        }
        let mut header = header.into_map().unwrap_or_default();

        let merged = self.options.header_registry.merge(
            self.protected.as_ref(),
            &[self.unprotected.as_ref(), Some(&header)],
        )?;
        let (alg, enc) = self.algorithms(&merged)?;
        if let Some(chosen) = self.enc
            && chosen != enc
        {
            return Err(JoseError::InvalidFormat(format!(
                "content is already encrypted with {}",
                chosen.name()
            )));
        }

        let wrapped = alg.wrap(
            key,
            enc.key_size(),
            self.cek.as_deref().map(Vec::as_slice),
            &merged,
            &self.options.pbes2,
        )?;
        for (name, value) in wrapped.header {
            if merged.get(&name) != Some(&value) {
                header.insert(name, value);
            }
        }

        if self.content.is_none() {
            self.seal(enc, &wrapped.cek)?;
            self.enc = Some(enc);
            self.cek = Some(wrapped.cek);
        }

        self.recipients.push(Recipient {
            header: Some(header).filter(|header| !header.is_empty()),
            encrypted_key: wrapped.encrypted_key,
        });
        Ok(self)
    }

    /// Encrypt the plaintext under the current protected header
    fn seal(&mut self, enc: ContentEncryptionAlgorithm, cek: &[u8]) -> Result<(), JoseError> {
        let plaintext = self
            .plaintext
            .as_deref()
            .ok_or_else(|| JoseError::InvalidOperation("no plaintext to encrypt".to_owned()))?;

        let compressed;
        let data = if compression::uses_deflate(self.protected.as_ref())? {
            compressed = compression::deflate(plaintext)?;
            compressed.as_slice()
        } else {
            plaintext.as_slice()
        };

        let protected_raw = encode_header(self.protected.as_ref())?;
        let content = enc.encrypt(cek, &content_aad(&protected_raw, self.aad.as_deref()), data)?;

        self.protected_raw = protected_raw;
        self.content = Some(content);
        Ok(())
    }

    /// Resolve and check `alg` and `enc` of a merged header
    fn algorithms(
        &self,
        merged: &Map<String, Value>,
    ) -> Result<(KeyManagementAlgorithm, ContentEncryptionAlgorithm), JoseError> {
        let allowed = self.options.allowed_algs();

        let alg = header_str(merged, "alg")?.ok_or(JoseError::MissingAlgorithm)?;
        check_allowed(allowed, alg)?;
        let alg = jwa::keymgmt_algorithm(alg)?;

        let enc = header_str(merged, "enc")?.ok_or(JoseError::MissingAlgorithm)?;
        check_allowed(allowed, enc)?;
        let enc = jwa::encryption_algorithm(enc)?;

        Ok((alg, enc))
    }

    /// Decrypt with a key or every candidate key of a key set
    ///
    /// Every recipient is tried until one yields the plaintext.
    pub fn decrypt<'a>(&mut self, keys: impl Into<KeySource<'a>>) -> Result<(), JoseError> {
        let keys = keys.into();
        self.decrypt_log.clear();
        self.plaintext = None;

        let Some(content) = &self.content else {
            return Err(JoseError::InvalidOperation(
                "nothing to decrypt".to_owned(),
            ));
        };

        let mut log = Vec::new();
        let mut failure = None;
        let mut opened = None;
        for recipient in &self.recipients {
            match self.decrypt_recipient(recipient, content, keys, &mut log) {
                Ok(decrypted) => {
                    opened = Some(decrypted);
                    break;
                }
                Err(err @ JoseError::CompressionLimitExceeded { .. }) => {
                    self.decrypt_log = log;
                    return Err(err);
                }
                Err(err) => failure = most_relevant(failure, err),
            }
        }
        self.decrypt_log = log;

        match opened {
            Some(Opened { plaintext, enc, cek }) => {
                self.plaintext = Some(plaintext);
                self.enc = Some(enc);
                self.cek = Some(cek);
                Ok(())
            }
            None => Err(failure.unwrap_or(JoseError::AuthenticationFailure)),
        }
    }

    fn decrypt_recipient(
        &self,
        recipient: &Recipient,
        content: &EncryptedContent,
        keys: KeySource<'_>,
        log: &mut Vec<String>,
    ) -> Result<Opened, JoseError> {
        let merged = self.options.header_registry.merge(
            self.protected.as_ref(),
            &[self.unprotected.as_ref(), recipient.header.as_ref()],
        )?;
        let (alg, enc) = self.algorithms(&merged)?;
        let deflated = compression::uses_deflate(self.protected.as_ref())?;
        let aad = content_aad(&self.protected_raw, self.aad.as_deref());

        let mut failure = None;
        for key in keys.candidates(header_str(&merged, "kid")?)? {
            let attempt = alg
                .unwrap(
                    key,
                    enc.key_size(),
                    &recipient.encrypted_key,
                    &merged,
                    &self.options.pbes2,
                )
                .and_then(|cek| {
                    enc.decrypt(&cek, &aad, &content.iv, &content.ciphertext, &content.tag)
                        .map(|plaintext| (plaintext, cek))
                });

            match attempt {
                Ok((plaintext, cek)) => {
                    let plaintext = if deflated {
                        compression::inflate(&plaintext, self.options.max_decompressed_size)?
                    } else {
                        plaintext
                    };
                    return Ok(Opened {
                        plaintext,
                        enc,
                        cek,
                    });
                }
                Err(err) => {
                    tracing::debug!(
                        kid = key.kid(),
                        alg = alg.name(),
                        enc = enc.name(),
                        error = %err,
                        "JWE decryption attempt failed"
                    );
                    log.push(format!(
                        "kid {}: {}/{}: {err}",
                        key.kid().unwrap_or("<none>"),
                        alg.name(),
                        enc.name()
                    ));
                    failure = most_relevant(failure, err);
                }
            }
        }
        Err(failure.unwrap_or(JoseError::AuthenticationFailure))
    }

    /// The plaintext of a locally created or successfully decrypted [`JWE`]
    pub fn plaintext(&self) -> Option<&[u8]> {
        self.plaintext.as_deref().map(Vec::as_slice)
    }

    pub fn protected_header(&self) -> Option<&Map<String, Value>> {
        self.protected.as_ref()
    }

    pub fn unprotected_header(&self) -> Option<&Map<String, Value>> {
        self.unprotected.as_ref()
    }

    pub fn external_aad(&self) -> Option<&[u8]> {
        self.aad.as_deref()
    }

    pub fn recipients(&self) -> &[Recipient] {
        &self.recipients
    }

    pub fn content(&self) -> Option<&EncryptedContent> {
        self.content.as_ref()
    }

    /// Merged protected, shared and per-recipient header of recipient `index`
    pub fn jose_header(&self, index: usize) -> Result<Map<String, Value>, JoseError> {
        let recipient = self.recipients.get(index).ok_or_else(|| {
            JoseError::InvalidOperation(format!("no recipient at index {index}"))
        })?;
        self.options.header_registry.merge(
            self.protected.as_ref(),
            &[self.unprotected.as_ref(), recipient.header.as_ref()],
        )
    }

    /// One line per failed decryption attempt of the last [`Self::decrypt`]
    pub fn decrypt_log(&self) -> &[String] {
        &self.decrypt_log
    }

    /// Serialize into the compact form, or the JSON form when `compact` is `false`
    ///
    /// For the compact form a per-recipient header (such as `epk` or the
    /// `iv` and `tag` of AES GCM key wrapping) is moved into the protected
    /// header, which requires the content to be encrypted again.
    pub fn serialize(&mut self, compact: bool) -> Result<String, JoseError> {
        let Some(content) = &self.content else {
            return Err(JoseError::InvalidOperation(
                "cannot serialize before a recipient is added".to_owned(),
            ));
        };

        if !compact {
            let shared = JWEShared {
                protected: self.protected_raw.clone(),
                unprotected: self.unprotected.clone(),
                aad: self.aad.as_ref().map(b64_encode),
                iv: b64_encode(&content.iv),
                ciphertext: b64_encode(&content.ciphertext),
                tag: b64_encode(&content.tag),
            };
            let mut recipients: Vec<_> = self.recipients.iter().map(JWERecipient::from).collect();
            let json = if recipients.len() == 1 {
                serde_json::to_string(&JWEFlattened {
                    shared,
                    recipient: recipients.remove(0),
                })?
            } else {
                serde_json::to_string(&JWEGeneral { shared, recipients })?
            };
            return Ok(json);
        }

        if self.recipients.len() != 1 {
            return Err(JoseError::InvalidOperation(format!(
                "compact serialization requires exactly one recipient, found {}",
                self.recipients.len()
            )));
        }
        if self.aad.is_some() {
            return Err(JoseError::InvalidOperation(
                "compact serialization cannot carry additional authenticated data".to_owned(),
            ));
        }
        if self.unprotected.is_some() {
            return Err(JoseError::InvalidOperation(
                "compact serialization cannot carry a shared unprotected header".to_owned(),
            ));
        }

        if self.recipients[0].has_header() {
            self.protect_recipient_header()?;
        }

        let protected = self.protected.as_ref();
        if !protected.is_some_and(|header| header.contains_key("alg") && header.contains_key("enc"))
        {
            return Err(JoseError::InvalidOperation(
                "compact serialization requires alg and enc in the protected header".to_owned(),
            ));
        }

        let (Some(content), [recipient]) = (&self.content, self.recipients.as_slice()) else {
            return Err(JoseError::InvalidOperation(
                "compact serialization requires encrypted content".to_owned(),
            ));
        };
        Ok(format!(
            "{}.{}.{}.{}.{}",
            self.protected_raw,
            b64_encode(&recipient.encrypted_key),
            b64_encode(&content.iv),
            b64_encode(&content.ciphertext),
            b64_encode(&content.tag)
        ))
    }

    /// Move the single recipient header into the protected header and
    /// encrypt again, the AAD covers the new protected header
    fn protect_recipient_header(&mut self) -> Result<(), JoseError> {
        let (Some(enc), Some(cek)) = (self.enc, self.cek.clone()) else {
            return Err(JoseError::InvalidOperation(
                "a per-recipient header can only be made compact while the key is held"
                    .to_owned(),
            ));
        };

        let header = self
            .recipients
            .first_mut()
            .and_then(|recipient| recipient.header.take())
            .unwrap_or_default();
        let protected = self.protected.get_or_insert_default();
        for (name, value) in header {
            if protected.contains_key(&name) {
                return Err(JoseError::DuplicateHeader(name));
            }
            protected.insert(name, value);
        }

        self.seal(enc, &cek)
    }

    /// Parse the compact, flattened or general serialization
    pub fn deserialize(raw: &str) -> Result<Self, JoseError> {
        let raw = raw.trim();
        let mut jwe = Self {
            plaintext: None,
            protected: None,
            protected_raw: String::new(),
            unprotected: None,
            aad: None,
            recipients: Vec::new(),
            content: None,
            enc: None,
            cek: None,
            options: JweDecryptOptions::default(),
            decrypt_log: Vec::new(),
        };

        let (shared, recipients) = if raw.starts_with('{') {
            let value: Value = serde_json::from_str(raw)?;
            if !value.is_object() {
                return Err(JoseError::InvalidFormat("JWE must be a JSON object".to_owned()));
            }
            if value.get("recipients").is_some() {
                if value.get("encrypted_key").is_some() || value.get("header").is_some() {
                    return Err(JoseError::InvalidFormat(
                        "JWE cannot be both flattened and general".to_owned(),
                    ));
                }
                let general: JWEGeneral = serde_json::from_value(value)?;
                (general.shared, general.recipients)
            } else {
                let flattened: JWEFlattened = serde_json::from_value(value)?;
                (flattened.shared, vec![flattened.recipient])
            }
        } else {
            let segments: Vec<&str> = raw.split('.').collect();
            let [protected, encrypted_key, iv, ciphertext, tag] = segments[..] else {
                return Err(JoseError::InvalidFormat(
                    "compact JWE must have five segments".to_owned(),
                ));
            };
            if protected.is_empty() {
                return Err(JoseError::InvalidFormat(
                    "compact JWE requires a protected header".to_owned(),
                ));
            }
            let shared = JWEShared {
                protected: protected.to_owned(),
                unprotected: None,
                aad: None,
                iv: iv.to_owned(),
                ciphertext: ciphertext.to_owned(),
                tag: tag.to_owned(),
            };
            let recipient = JWERecipient {
                header: None,
                encrypted_key: encrypted_key.to_owned(),
            };
            (shared, vec![recipient])
        };

        if recipients.is_empty() {
            return Err(JoseError::InvalidFormat("no recipients".to_owned()));
        }

        jwe.protected = decode_header(&shared.protected)?;
        jwe.protected_raw = shared.protected;
        jwe.unprotected = shared.unprotected.filter(|header| !header.is_empty());
        jwe.aad = shared.aad.as_deref().map(b64_decode).transpose()?;
        jwe.content = Some(EncryptedContent {
            iv: b64_decode(&shared.iv)?,
            ciphertext: b64_decode(&shared.ciphertext)?,
            tag: b64_decode(&shared.tag)?,
        });
        jwe.recipients = recipients
            .into_iter()
            .map(|recipient| {
                Ok(Recipient {
                    header: recipient.header.filter(|header| !header.is_empty()),
                    encrypted_key: b64_decode(&recipient.encrypted_key)?,
                })
            })
            .collect::<Result<_, JoseError>>()?;

        Ok(jwe)
    }
}

/// Outcome of a successful decryption attempt
struct Opened {
    plaintext: Zeroizing<Vec<u8>>,
    enc: ContentEncryptionAlgorithm,
    cek: Zeroizing<Vec<u8>>,
}

/// `ASCII(protected) [|| '.' || BASE64URL(aad)]`
fn content_aad(protected_raw: &str, aad: Option<&[u8]>) -> Vec<u8> {
    let mut out = protected_raw.as_bytes().to_vec();
    if let Some(aad) = aad {
        out.push(b'.');
        out.extend_from_slice(b64_encode(aad).as_bytes());
    }
    out
}

#[derive(Debug, Serialize, Deserialize)]
struct JWEShared {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    protected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unprotected: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    aad: Option<String>,
    iv: String,
    ciphertext: String,
    tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct JWERecipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    encrypted_key: String,
}

impl From<&Recipient> for JWERecipient {
    fn from(value: &Recipient) -> Self {
        Self {
            header: value.header.clone().filter(|header| !header.is_empty()),
            encrypted_key: b64_encode(&value.encrypted_key),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct JWEFlattened {
    #[serde(flatten)]
    shared: JWEShared,
    #[serde(flatten)]
    recipient: JWERecipient,
}

#[derive(Debug, Serialize, Deserialize)]
struct JWEGeneral {
    #[serde(flatten)]
    shared: JWEShared,
    recipients: Vec<JWERecipient>,
}
