use std::{error, fmt};

/// Errors produced while signing, verifying, encrypting or decrypting JOSE objects.
///
/// Verification failures ([`JoseError::InvalidSignature`] and
/// [`JoseError::AuthenticationFailure`]) intentionally carry no detail:
/// a wrong key and tampered data are reported identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoseError {
    /// The algorithm name is not registered for the requested usage.
    UnknownAlgorithm(String),
    /// The algorithm is registered but excluded by the allow-list in use.
    AlgorithmNotAllowed(String),
    /// Neither the caller nor any header provided an `alg` (or `enc`).
    MissingAlgorithm,
    /// Malformed compact or JSON structure, or malformed header values.
    InvalidFormat(String),
    /// The requested operation cannot be performed on this object
    /// in its current state (e.g. compact form with two signatures).
    InvalidOperation(String),
    /// The same header name was found in more than one header object.
    DuplicateHeader(String),
    /// A header which must be integrity protected was found in an unprotected header.
    MisplacedHeader(String),
    /// A name listed in `crit` is unknown, unsupported or absent.
    UnsupportedCritical(String),
    /// Signature verification failed.
    InvalidSignature,
    /// Content decryption or key unwrapping failed authentication.
    AuthenticationFailure,
    /// No key in the key set matched the token.
    KeyNotFound,
    /// Key size does not match the size required by the algorithm.
    InvalidKeyLength {
        /// Required size in bytes.
        expected: usize,
        /// Size of the given key in bytes.
        actual: usize,
    },
    /// Key type, curve or usage does not fit the requested operation.
    InvalidKey(String),
    /// The `exp` claim lies in the past (beyond leeway).
    Expired,
    /// The `nbf` claim lies in the future (beyond leeway).
    NotYetValid,
    /// A claim required by the check table is absent.
    MissingClaim(String),
    /// A claim is present but its value is rejected.
    InvalidClaimValue(String),
    /// Token wrapper type differs from the expected one.
    TypeMismatch {
        /// Type that was expected.
        expected: &'static str,
        /// Type that was found.
        found: &'static str,
    },
    /// Decompressed content exceeds the configured limit.
    CompressionLimitExceeded {
        /// The limit in bytes.
        limit: usize,
    },
    /// The crypto backend rejected an operation outside of verification.
    Crypto(String),
}

impl JoseError {
    /// Returns `true` for claims validation errors.
    ///
    /// Those are raised only after the cryptographic layer succeeded,
    /// which allows callers to treat an expired but authentic token
    /// differently from a forged one.
    pub fn is_claims_error(&self) -> bool {
        matches!(
            self,
            Self::Expired | Self::NotYetValid | Self::MissingClaim(_) | Self::InvalidClaimValue(_)
        )
    }

    pub(crate) fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub(crate) fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }
}

impl From<base64::DecodeError> for JoseError {
    fn from(value: base64::DecodeError) -> Self {
        Self::InvalidFormat(format!("invalid base64url: {value}"))
    }
}

impl From<serde_json::Error> for JoseError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidFormat(format!("invalid json: {value}"))
    }
}

impl From<aws_lc_rs::error::KeyRejected> for JoseError {
    fn from(value: aws_lc_rs::error::KeyRejected) -> Self {
        Self::InvalidKey(format!("key rejected: {value}"))
    }
}

impl fmt::Display for JoseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAlgorithm(name) => write!(f, "Unknown algorithm: {name}"),
            Self::AlgorithmNotAllowed(name) => write!(f, "Algorithm not allowed: {name}"),
            Self::MissingAlgorithm => write!(f, "No algorithm specified"),
            Self::InvalidFormat(msg) => write!(f, "Invalid format: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
            Self::DuplicateHeader(name) => write!(f, "Duplicate header: {name}"),
            Self::MisplacedHeader(name) => {
                write!(f, "Header must be integrity protected: {name}")
            }
            Self::UnsupportedCritical(name) => {
                write!(f, "Unsupported critical header: {name}")
            }
            Self::InvalidSignature => write!(f, "Signature verification failed"),
            Self::AuthenticationFailure => write!(f, "Decryption failed"),
            Self::KeyNotFound => write!(f, "No matching key found"),
            Self::InvalidKeyLength { expected, actual } => {
                write!(f, "Invalid key length: expected {expected} bytes, got {actual}")
            }
            Self::InvalidKey(msg) => write!(f, "Invalid key: {msg}"),
            Self::Expired => write!(f, "Token expired"),
            Self::NotYetValid => write!(f, "Token not yet valid"),
            Self::MissingClaim(name) => write!(f, "Missing claim: {name}"),
            Self::InvalidClaimValue(name) => write!(f, "Invalid claim value: {name}"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "Token type mismatch: expected {expected}, found {found}")
            }
            Self::CompressionLimitExceeded { limit } => {
                write!(f, "Decompressed content exceeds {limit} bytes")
            }
            Self::Crypto(msg) => write!(f, "Crypto backend error: {msg}"),
        }
    }
}

impl error::Error for JoseError {}
