//! # saml-crypto
//!
//! Cryptographic primitives behind SAML XML signatures, built on aws-lc-rs.
//!
//! ## Supported Algorithms
//!
//! - Digests: SHA-256, SHA-384, SHA-512 (SHA-1 for verification of legacy peers)
//! - RSA PKCS#1 v1.5 with SHA-256/384/512
//! - ECDSA on P-256, P-384 and P-521, fixed-width `r || s` encoding as
//!   required by RFC 4051
//!
//! Key material enters as PEM or DER. Certificates are parsed with
//! `x509-parser`, encrypted PKCS#8 keys are opened with `pkcs8`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod algorithm;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod keys;

pub use algorithm::{HashAlgorithm, SignatureAlgorithm};
pub use encoding::{decode_certificate, decode_private_key, encode_certificate};
pub use error::CryptoError;
pub use hash::{hash, sha256, sha384, sha512};
pub use keys::{EcCurve, KeyKind, SigningKey, VerifyingKey};
