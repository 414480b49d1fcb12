//! JSON Object Signing and Encryption (JOSE) for Rust.
//!
//! This includes:
//! - [`JWS`]: signed payloads, with one or more signatures
//! - [`JWE`]: encrypted payloads, with one or more recipients
//! - [`JWT`]: claims carried in a [`JWS`] or a [`JWE`]
//! - [`JWK`] and [`JWKSet`]: key material and key sets
//! - [`jwa`]: the registry of signing, key management and content encryption algorithms
//!
//! Every operation fails closed with a [`JoseError`]. Algorithms are looked
//! up by name and checked against an allow-list before any key is touched.
//! Without an explicit allow-list the `none` signing algorithm and the
//! `RSA1_5` key management algorithm are refused.
//!
//! ```
//! use jose::{JWK, JWS, KeySource};
//!
//! # fn main() -> Result<(), jose::JoseError> {
//! let key = JWK::generate_oct(256)?;
//!
//! let mut jws = JWS::new(b"hello".to_vec());
//! jws.add_signature(&key, Some("HS256"), Default::default(), Default::default())?;
//! let token = jws.serialize(true)?;
//!
//! let mut received = JWS::deserialize(&token)?;
//! received.verify(KeySource::from(&key), None, None)?;
//! assert_eq!(received.payload(), Some(&b"hello"[..]));
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

mod util;

pub mod header;
pub mod jwe;
pub mod jws;
pub mod jwt;

#[doc(inline)]
pub use jose_crypto::{
    JWK, JWKEllipticCurves, JWKOctetCurves, JWKSet, JWKType, JWKUse, JoseError, KeyOperation,
    KeySource, RsaPrivateComponents, jwa,
};
#[doc(inline)]
pub use jose_crypto::{
    AlgorithmDescriptor, AlgorithmUsage, ContentEncryptionAlgorithm, EncryptedContent,
    HeaderLocation, JWA, KeyManagementAlgorithm, Pbes2Config, SigningAlgorithm, WrappedKey,
};

#[doc(inline)]
pub use header::{HeaderParameter, HeaderRegistry, Headers};
#[doc(inline)]
pub use jwe::{DEFAULT_MAX_DECOMPRESSED_SIZE, JWE, JweDecryptOptions, Recipient};
#[doc(inline)]
pub use jws::{JWS, JwsVerifyOptions, Signature, SignatureState};
#[doc(inline)]
pub use jwt::{Audience, Claims, JWT, JwtOptions, RegisteredClaims, Token, TokenType};

pub mod dep {
    //! Dependencies for jose modules.
    //!
    //! Exported for your convenience

    pub use jose_crypto::dep::aws_lc_rs;

    pub mod serde_json {
        //! Re-export of the [`serde_json`] crate.
        //!
        //! [`serde_json`]: https://docs.rs/serde_json

        #[doc(inline)]
        pub use serde_json::*;
    }

    pub mod jiff {
        //! Re-export of the [`jiff`] crate.
        //!
        //! [`jiff`]: https://docs.rs/jiff

        #[doc(inline)]
        pub use jiff::*;
    }
}
