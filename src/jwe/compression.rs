//! Raw DEFLATE (`zip: "DEF"`) of the JWE plaintext, see section 4.1.3 of [`rfc7516`]
//!
//! [`rfc7516`]: https://datatracker.ietf.org/doc/html/rfc7516

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use jose_crypto::JoseError;
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::header::header_str;

/// Default limit of the inflated plaintext, in bytes
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 256 * 1024;

/// `true` when the header asks for DEFLATE compression
pub(super) fn uses_deflate(header: Option<&Map<String, Value>>) -> Result<bool, JoseError> {
    let Some(header) = header else {
        return Ok(false);
    };
    match header_str(header, "zip")? {
        None => Ok(false),
        Some("DEF") => Ok(true),
        Some(other) => Err(JoseError::InvalidFormat(format!(
            "unsupported compression algorithm: {other}"
        ))),
    }
}

pub(super) fn deflate(input: &[u8]) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let mut compress = Compress::new(Compression::default(), false);
    let mut buf = Zeroizing::new(Vec::with_capacity(input.len() / 2 + 64));

    loop {
        let i = compress.total_in() as usize;
        match compress
            .compress_vec(&input[i..], &mut buf, FlushCompress::Finish)
            .map_err(|err| JoseError::Crypto(format!("deflate: {err}")))?
        {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let additional = buf.capacity().max(64);
                grow(&mut buf, additional);
            }
        }
    }

    Ok(buf)
}

/// Move `buf` into a larger allocation, the old one is wiped on drop
fn grow(buf: &mut Zeroizing<Vec<u8>>, additional: usize) {
    let mut grown = Zeroizing::new(Vec::with_capacity(buf.len().saturating_add(additional)));
    grown.extend_from_slice(buf.as_slice());
    *buf = grown;
}

/// Inflate `input`, failing as soon as the output grows beyond `limit` bytes
pub(super) fn inflate(input: &[u8], limit: usize) -> Result<Zeroizing<Vec<u8>>, JoseError> {
    let mut decompress = Decompress::new(false);
    let mut buf = Zeroizing::new(Vec::with_capacity(
        input.len().saturating_mul(2).max(64).min(limit.saturating_add(1)),
    ));

    loop {
        let i = decompress.total_in() as usize;
        let status = decompress
            .decompress_vec(&input[i..], &mut buf, FlushDecompress::None)
            .map_err(|err| JoseError::InvalidFormat(format!("inflate: {err}")))?;

        if buf.len() > limit {
            return Err(JoseError::CompressionLimitExceeded { limit });
        }

        match status {
            Status::StreamEnd => return Ok(buf),
            Status::Ok | Status::BufError => {
                let exhausted = decompress.total_in() as usize == input.len();
                if exhausted && buf.len() < buf.capacity() {
                    return Err(JoseError::InvalidFormat(
                        "truncated deflate stream".to_owned(),
                    ));
                }
                // never reserve past the first byte over the limit
                let room = (limit.saturating_add(1) - buf.len()).min(buf.capacity().max(1024));
                grow(&mut buf, room);
            }
        }
    }
}
