use aws_lc_rs::rand;
use zeroize::Zeroizing;

use crate::JoseError;

/// Fill a fresh buffer of `len` bytes from the system CSPRNG.
pub(crate) fn random_bytes(len: usize) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    rand::fill(buf.as_mut_slice()).map_err(|err| crypto_error("fill random bytes", err))?;
    Ok(buf)
}

/// Map a backend failure which is not a verification failure.
pub(crate) fn crypto_error(context: &str, err: impl std::fmt::Display) -> JoseError {
    JoseError::Crypto(format!("{context}: {err}"))
}

/// Left pad `value` with zeros up to `len` bytes.
pub(crate) fn pad_left(value: &[u8], len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; len.saturating_sub(value.len())]);
    out.extend_from_slice(value);
    out
}

/// Collapse any failure of an authenticated operation into
/// [`JoseError::AuthenticationFailure`].
pub(crate) fn authentication_failure<E>(_: E) -> JoseError {
    JoseError::AuthenticationFailure
}
