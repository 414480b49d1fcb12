//! Cryptographic primitives used by the `jose` crate.
//!
//! This includes:
//! - [`JWK`] and [`JWKSet`]: key material in its JSON form, with usage restricted access
//! - [`jwa`]: the registry of signing, key management and content encryption algorithms
//! - [`JoseError`]: the error type shared by all JOSE operations
//!
//! Most users want the `jose` crate, which re-exports everything here
//! and builds JWS, JWE and JWT on top of it.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(not(test), warn(clippy::print_stdout, clippy::dbg_macro))]

mod der;
mod error;
mod jwk;
mod jwk_set;
mod util;

pub mod jwa;
pub mod macros;

#[doc(inline)]
pub use error::JoseError;
#[doc(inline)]
pub use jwa::{
    AlgorithmDescriptor, AlgorithmUsage, ContentEncryptionAlgorithm, EncryptedContent,
    HeaderLocation, JWA, KeyManagementAlgorithm, Pbes2Config, SigningAlgorithm, WrappedKey,
};
#[doc(inline)]
pub use jwk::{
    JWK, JWKEllipticCurves, JWKOctetCurves, JWKType, JWKUse, KeyOperation, RsaPrivateComponents,
};
#[doc(inline)]
pub use jwk_set::{JWKSet, KeySource};

pub mod dep {
    //! Dependencies for jose crypto modules.
    //!
    //! Exported for your convenience

    pub mod aws_lc_rs {
        //! Re-export of the [`aws-lc-rs`] crate.
        //!
        //! [`aws-lc-rs`]: https://docs.rs/aws-lc-rs

        #[doc(inline)]
        pub use aws_lc_rs::*;
    }
}
