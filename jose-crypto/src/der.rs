//! Minimal DER support to hand JWK key material to the crypto backend
//! and to read generated keys back into their JWK components.
//!
//! This is ***NOT*** a general ASN.1 implementation. It only knows the
//! handful of structures used for RSA and EC keys:
//!
//! ```rust,ignore
//! SubjectPublicKeyInfo = SEQUENCE {                 -- RFC 5280, 4.1
//!     algorithm AlgorithmIdentifier,
//!     subjectPublicKey BIT STRING                   -- RSAPublicKey
//! }
//! PrivateKeyInfo = SEQUENCE {                       -- RFC 5208, 5
//!     version INTEGER,
//!     privateKeyAlgorithm AlgorithmIdentifier,
//!     privateKey OCTET STRING                       -- RSAPrivateKey / ECPrivateKey
//! }
//! RSAPrivateKey = SEQUENCE {                        -- RFC 8017, A.1.2
//!     version INTEGER, n, e, d, p, q, dp, dq, qi INTEGER
//! }
//! ECPrivateKey = SEQUENCE {                         -- RFC 5915, 3
//!     version INTEGER, privateKey OCTET STRING, ...
//! }
//! ```

use zeroize::Zeroizing;

use crate::JoseError;

const DER_TAG_INTEGER: u8 = 0x02;
const DER_TAG_BIT_STRING: u8 = 0x03;
const DER_TAG_OCTET_STRING: u8 = 0x04;
const DER_TAG_SEQUENCE: u8 = 0x30;

/// Maximum length of a DER encoded length in short form (X.690, 8.1.3).
const DER_LENGTH_SHORT_FORM_MAX: usize = 127;
/// Marks long form lengths, and the sign bit of an integer's first octet.
const HIGH_BIT_MASK: u8 = 0x80;
const BIT_STRING_NO_UNUSED_BITS: u8 = 0x00;

/// `SEQUENCE { OID 1.2.840.113549.1.1.1 (rsaEncryption), NULL }`
///
/// RFC 3279, 2.3.1 requires the parameters of rsaEncryption to be NULL.
const RSA_ALGORITHM_IDENTIFIER: [u8; 15] = [
    0x30, 0x0d, // SEQUENCE
    0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01, // OID
    0x05, 0x00, // NULL
];

/// Borrowed big-endian RSA key components, in `RSAPrivateKey` order.
#[derive(Debug)]
pub(crate) struct RsaPrivateKeyParts<'a> {
    pub(crate) n: &'a [u8],
    pub(crate) e: &'a [u8],
    pub(crate) d: &'a [u8],
    pub(crate) p: &'a [u8],
    pub(crate) q: &'a [u8],
    pub(crate) dp: &'a [u8],
    pub(crate) dq: &'a [u8],
    pub(crate) qi: &'a [u8],
}

/// DER encoded `SubjectPublicKeyInfo` for an RSA public key.
pub(crate) fn create_subject_public_key_info(n: &[u8], e: &[u8]) -> Vec<u8> {
    let rsa_public_key = encode_sequence(&[&encode_integer(n), &encode_integer(e)]);

    let mut bit_string = Vec::with_capacity(1 + rsa_public_key.len());
    bit_string.push(BIT_STRING_NO_UNUSED_BITS);
    bit_string.extend_from_slice(&rsa_public_key);

    encode_sequence(&[
        &RSA_ALGORITHM_IDENTIFIER,
        &encode_tlv(DER_TAG_BIT_STRING, &bit_string),
    ])
}

/// DER encoded PKCS#8 v1 `PrivateKeyInfo` wrapping an `RSAPrivateKey`.
pub(crate) fn create_rsa_private_key_info(parts: &RsaPrivateKeyParts<'_>) -> Zeroizing<Vec<u8>> {
    let version = encode_integer(&[0]);
    let integers: Vec<Zeroizing<Vec<u8>>> = [
        parts.n, parts.e, parts.d, parts.p, parts.q, parts.dp, parts.dq, parts.qi,
    ]
    .into_iter()
    .map(|value| Zeroizing::new(encode_integer(value)))
    .collect();

    let mut rsa_private_key_content: Vec<&[u8]> = vec![&version];
    rsa_private_key_content.extend(integers.iter().map(|v| v.as_slice()));
    let rsa_private_key = Zeroizing::new(encode_sequence(&rsa_private_key_content));
    let octet_string = Zeroizing::new(encode_tlv(DER_TAG_OCTET_STRING, &rsa_private_key));

    Zeroizing::new(encode_sequence(&[
        &version,
        &RSA_ALGORITHM_IDENTIFIER,
        &octet_string,
    ]))
}

/// Read the RSA components out of a PKCS#8 v1 `PrivateKeyInfo`.
pub(crate) fn parse_rsa_private_key_info(der: &[u8]) -> Result<RsaPrivateKeyParts<'_>, JoseError> {
    let private_key = read_private_key_info(der)?;
    let mut reader = DerReader::new(private_key).enter(DER_TAG_SEQUENCE)?;
    let _version = reader.read_unsigned_integer()?;

    Ok(RsaPrivateKeyParts {
        n: reader.read_unsigned_integer()?,
        e: reader.read_unsigned_integer()?,
        d: reader.read_unsigned_integer()?,
        p: reader.read_unsigned_integer()?,
        q: reader.read_unsigned_integer()?,
        dp: reader.read_unsigned_integer()?,
        dq: reader.read_unsigned_integer()?,
        qi: reader.read_unsigned_integer()?,
    })
}

/// Read the private scalar out of a PKCS#8 v1 `PrivateKeyInfo` wrapping an `ECPrivateKey`.
pub(crate) fn parse_ec_private_key_info(der: &[u8]) -> Result<&[u8], JoseError> {
    let private_key = read_private_key_info(der)?;
    let mut reader = DerReader::new(private_key).enter(DER_TAG_SEQUENCE)?;
    let _version = reader.read_unsigned_integer()?;
    reader.read(DER_TAG_OCTET_STRING)
}

fn read_private_key_info(der: &[u8]) -> Result<&[u8], JoseError> {
    let mut reader = DerReader::new(der).enter(DER_TAG_SEQUENCE)?;
    let _version = reader.read_unsigned_integer()?;
    let _algorithm = reader.read(DER_TAG_SEQUENCE)?;
    reader.read(DER_TAG_OCTET_STRING)
}

fn encode_sequence(parts: &[&[u8]]) -> Vec<u8> {
    encode_tlv(DER_TAG_SEQUENCE, &parts.concat())
}

fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = encode_der_length(content.len());
    let mut result = Vec::with_capacity(1 + len.len() + content.len());
    result.push(tag);
    result.extend_from_slice(&len);
    result.extend_from_slice(content);
    result
}

/// Length encoding as defined in section 8.1.3 of
/// [ITU X.690](https://www.itu.int/ITU-T/studygroups/com17/languages/X.690-0207.pdf).
fn encode_der_length(len: usize) -> Vec<u8> {
    if len <= DER_LENGTH_SHORT_FORM_MAX {
        return vec![len as u8];
    }
    let len_bytes: Vec<u8> = len
        .to_be_bytes()
        .into_iter()
        .skip_while(|b| *b == 0)
        .collect();
    let mut result = Vec::with_capacity(1 + len_bytes.len());
    result.push(HIGH_BIT_MASK | len_bytes.len() as u8);
    result.extend(len_bytes);
    result
}

/// DER encoded unsigned integer from big-endian bytes.
///
/// Redundant leading zeros are removed and a single zero is prepended
/// when the sign bit would otherwise be set.
pub(crate) fn encode_integer(value: &[u8]) -> Vec<u8> {
    let value = strip_leading_zeros(value);
    let needs_leading_zero = value.first().is_none_or(|b| b & HIGH_BIT_MASK != 0);
    let mut content = Vec::with_capacity(value.len() + 1);
    if needs_leading_zero {
        content.push(0);
    }
    content.extend_from_slice(value);
    encode_tlv(DER_TAG_INTEGER, &content)
}

fn strip_leading_zeros(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|b| *b != 0)
        .unwrap_or(value.len());
    &value[start..]
}

/// Forward only reader over DER encoded TLV values.
pub(crate) struct DerReader<'a> {
    input: &'a [u8],
}

impl<'a> DerReader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    /// Read a constructed value and return a reader over its content.
    pub(crate) fn enter(mut self, tag: u8) -> Result<Self, JoseError> {
        let content = self.read(tag)?;
        Ok(Self::new(content))
    }

    pub(crate) fn read(&mut self, tag: u8) -> Result<&'a [u8], JoseError> {
        let truncated = || JoseError::invalid_format("truncated DER value");

        let (&actual, rest) = self.input.split_first().ok_or_else(truncated)?;
        if actual != tag {
            return Err(JoseError::invalid_format(format!(
                "unexpected DER tag {actual:#04x}, expected {tag:#04x}"
            )));
        }

        let (&first, mut rest) = rest.split_first().ok_or_else(truncated)?;
        let len = if first & HIGH_BIT_MASK == 0 {
            first as usize
        } else {
            let count = (first & !HIGH_BIT_MASK) as usize;
            if count == 0 || count > size_of::<usize>() || rest.len() < count {
                return Err(JoseError::invalid_format("invalid DER length"));
            }
            let (len_bytes, tail) = rest.split_at(count);
            rest = tail;
            len_bytes
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize)
        };

        if rest.len() < len {
            return Err(truncated());
        }
        let (value, tail) = rest.split_at(len);
        self.input = tail;
        Ok(value)
    }

    /// Read an INTEGER, returning its minimal big-endian magnitude.
    pub(crate) fn read_unsigned_integer(&mut self) -> Result<&'a [u8], JoseError> {
        let value = self.read(DER_TAG_INTEGER)?;
        if value.first().is_some_and(|b| b & HIGH_BIT_MASK != 0) {
            return Err(JoseError::invalid_format("negative DER integer"));
        }
        Ok(strip_leading_zeros(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn integer_gets_leading_zero_when_sign_bit_set() {
        assert_eq!(encode_integer(&[0x80]), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(encode_integer(&[0x7f]), vec![0x02, 0x01, 0x7f]);
        assert_eq!(encode_integer(&[0x00, 0x00, 0x01]), vec![0x02, 0x01, 0x01]);
        assert_eq!(encode_integer(&[0]), vec![0x02, 0x01, 0x00]);
    }

    #[test]
    fn long_form_lengths() {
        assert_eq!(encode_der_length(127), vec![127]);
        assert_eq!(encode_der_length(128), vec![0x81, 0x80]);
        assert_eq!(encode_der_length(256), vec![0x82, 0x01, 0x00]);
    }

    #[test]
    fn subject_public_key_info_layout() {
        let spki = create_subject_public_key_info(&[0xc1; 256], &[0x01, 0x00, 0x01]);
        let mut reader = DerReader::new(&spki).enter(DER_TAG_SEQUENCE).unwrap();
        assert_eq!(reader.read(DER_TAG_SEQUENCE).unwrap(), &RSA_ALGORITHM_IDENTIFIER[2..]);
        let bit_string = reader.read(DER_TAG_BIT_STRING).unwrap();
        assert_eq!(bit_string[0], BIT_STRING_NO_UNUSED_BITS);
        let mut key = DerReader::new(&bit_string[1..])
            .enter(DER_TAG_SEQUENCE)
            .unwrap();
        assert_eq!(key.read_unsigned_integer().unwrap(), &[0xc1; 256][..]);
        assert_eq!(key.read_unsigned_integer().unwrap(), &[0x01, 0x00, 0x01]);
    }

    #[test]
    fn rsa_private_key_info_reads_back() {
        let parts = RsaPrivateKeyParts {
            n: &[0xd3; 256],
            e: &[0x01, 0x00, 0x01],
            d: &[0x42; 255],
            p: &[0xf1; 128],
            q: &[0xe1; 128],
            dp: &[0x11; 128],
            dq: &[0x22; 127],
            qi: &[0x93; 128],
        };
        let der = create_rsa_private_key_info(&parts);
        let parsed = parse_rsa_private_key_info(&der).unwrap();
        assert_eq!(parsed.n, parts.n);
        assert_eq!(parsed.e, parts.e);
        assert_eq!(parsed.d, parts.d);
        assert_eq!(parsed.dq, parts.dq);
        assert_eq!(parsed.qi, parts.qi);
    }

    #[test]
    fn truncated_input_is_rejected() {
        let mut reader = DerReader::new(&[0x30, 0x05, 0x02]);
        assert!(reader.read(DER_TAG_SEQUENCE).is_err());
        let mut reader = DerReader::new(&[0x02, 0x01, 0x01]);
        assert!(reader.read(DER_TAG_SEQUENCE).is_err());
    }

    #[quickcheck]
    fn encoded_lengths_read_back(len: u16) -> bool {
        let content = vec![0x5a; len as usize];
        let encoded = encode_tlv(DER_TAG_OCTET_STRING, &content);
        DerReader::new(&encoded)
            .read(DER_TAG_OCTET_STRING)
            .is_ok_and(|value| value == content.as_slice())
    }
}
