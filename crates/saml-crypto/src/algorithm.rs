//! Algorithm identifiers.
//!
//! These are the cryptographic halves of the XML-DSig algorithm URIs; the URI
//! mapping itself lives with the XML signature code.

use serde::{Deserialize, Serialize};

/// Message digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashAlgorithm {
    /// SHA-1. Accepted for verification only, and only when explicitly allowed.
    #[serde(rename = "SHA1")]
    Sha1,

    /// SHA-256.
    #[serde(rename = "SHA256")]
    Sha256,

    /// SHA-384.
    #[serde(rename = "SHA384")]
    Sha384,

    /// SHA-512.
    #[serde(rename = "SHA512")]
    Sha512,
}

impl HashAlgorithm {
    /// Returns the output length in bytes.
    #[must_use]
    pub const fn output_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    /// Returns the algorithm name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "SHA-1",
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// Returns true for digests kept only for interoperability with old peers.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        matches!(self, Self::Sha1)
    }
}

/// Signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSA PKCS#1 v1.5 with SHA-1 (verification only).
    #[serde(rename = "RS1")]
    RsaSha1,

    /// RSA PKCS#1 v1.5 with SHA-256.
    #[serde(rename = "RS256")]
    RsaSha256,

    /// RSA PKCS#1 v1.5 with SHA-384.
    #[serde(rename = "RS384")]
    RsaSha384,

    /// RSA PKCS#1 v1.5 with SHA-512.
    #[serde(rename = "RS512")]
    RsaSha512,

    /// ECDSA with SHA-256 (P-256).
    #[serde(rename = "ES256")]
    EcdsaSha256,

    /// ECDSA with SHA-384 (P-384).
    #[serde(rename = "ES384")]
    EcdsaSha384,

    /// ECDSA with SHA-512 (P-521).
    #[serde(rename = "ES512")]
    EcdsaSha512,
}

impl SignatureAlgorithm {
    /// Returns the short algorithm name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RsaSha1 => "RS1",
            Self::RsaSha256 => "RS256",
            Self::RsaSha384 => "RS384",
            Self::RsaSha512 => "RS512",
            Self::EcdsaSha256 => "ES256",
            Self::EcdsaSha384 => "ES384",
            Self::EcdsaSha512 => "ES512",
        }
    }

    /// Returns the digest used by this scheme.
    #[must_use]
    pub const fn hash(self) -> HashAlgorithm {
        match self {
            Self::RsaSha1 => HashAlgorithm::Sha1,
            Self::RsaSha256 | Self::EcdsaSha256 => HashAlgorithm::Sha256,
            Self::RsaSha384 | Self::EcdsaSha384 => HashAlgorithm::Sha384,
            Self::RsaSha512 | Self::EcdsaSha512 => HashAlgorithm::Sha512,
        }
    }

    /// Returns true if this is an RSA scheme.
    #[must_use]
    pub const fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::RsaSha1 | Self::RsaSha256 | Self::RsaSha384 | Self::RsaSha512
        )
    }

    /// Returns true if this is an ECDSA scheme.
    #[must_use]
    pub const fn is_ecdsa(self) -> bool {
        !self.is_rsa()
    }

    /// Returns true if the scheme relies on SHA-1.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        self.hash().is_legacy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_lengths() {
        assert_eq!(HashAlgorithm::Sha1.output_len(), 20);
        assert_eq!(HashAlgorithm::Sha256.output_len(), 32);
        assert_eq!(HashAlgorithm::Sha512.output_len(), 64);
    }

    #[test]
    fn signature_algorithm_families() {
        assert!(SignatureAlgorithm::RsaSha256.is_rsa());
        assert!(!SignatureAlgorithm::RsaSha256.is_ecdsa());
        assert!(SignatureAlgorithm::EcdsaSha384.is_ecdsa());
        assert_eq!(SignatureAlgorithm::EcdsaSha384.hash(), HashAlgorithm::Sha384);
    }

    #[test]
    fn only_sha1_is_legacy() {
        assert!(SignatureAlgorithm::RsaSha1.is_legacy());
        assert!(!SignatureAlgorithm::RsaSha256.is_legacy());
        assert!(!SignatureAlgorithm::EcdsaSha512.is_legacy());
    }

    #[test]
    fn serde_uses_short_names() {
        let json = serde_json::to_string(&SignatureAlgorithm::EcdsaSha256).unwrap();
        assert_eq!(json, "\"ES256\"");
        let parsed: HashAlgorithm = serde_json::from_str("\"SHA384\"").unwrap();
        assert_eq!(parsed, HashAlgorithm::Sha384);
    }
}
