use base64::{Engine as _, prelude::BASE64_URL_SAFE_NO_PAD};
use jose_crypto::{JoseError, jwa};

pub(crate) fn b64_encode(data: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(data)
}

pub(crate) fn b64_decode(data: &str) -> Result<Vec<u8>, JoseError> {
    Ok(BASE64_URL_SAFE_NO_PAD.decode(data)?)
}

/// Check an algorithm name against the caller's allow-list,
/// or against [`jwa::default_allowed_algorithms`] when there is none.
pub(crate) fn check_allowed(allowed: Option<&[String]>, name: &str) -> Result<(), JoseError> {
    let permitted = match allowed {
        Some(allowed) => allowed.iter().any(|allowed| allowed == name),
        None => {
            jwa::lookup(name)?;
            jwa::default_allowed_algorithms().contains(&name)
        }
    };

    if permitted {
        Ok(())
    } else {
        tracing::trace!(alg = name, "algorithm rejected by allow-list");
        Err(JoseError::AlgorithmNotAllowed(name.to_owned()))
    }
}

fn relevance(err: &JoseError) -> u8 {
    match err {
        JoseError::InvalidSignature | JoseError::AuthenticationFailure => 0,
        JoseError::InvalidKey(_) | JoseError::InvalidKeyLength { .. } => 1,
        JoseError::KeyNotFound => 2,
        JoseError::AlgorithmNotAllowed(_) => 3,
        JoseError::UnknownAlgorithm(_) => 4,
        _ => 5,
    }
}

/// Of two failed attempts keep the error that tells the caller the most
///
/// A key that was tried and failed outranks a key that was never found,
/// which in turn outranks an algorithm that was never attempted.
pub(crate) fn most_relevant(current: Option<JoseError>, new: JoseError) -> Option<JoseError> {
    match current {
        Some(current) if relevance(&current) <= relevance(&new) => Some(current),
        _ => Some(new),
    }
}
