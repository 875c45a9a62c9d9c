//! Error type for cryptographic operations.

use thiserror::Error;

/// Error type for key handling, signing and verification.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material could not be decoded or is not a supported key type.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Certificate could not be decoded.
    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    /// An encrypted private key could not be opened.
    #[error("private key decryption failed: {0}")]
    Decryption(String),

    /// Signing failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Verification failed.
    #[error("signature verification failed")]
    Verification,

    /// Algorithm not supported for this key.
    #[error("algorithm not supported: {0}")]
    UnsupportedAlgorithm(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidKey("bad".to_string());
        assert_eq!(err.to_string(), "invalid key: bad");

        let err = CryptoError::Verification;
        assert_eq!(err.to_string(), "signature verification failed");
    }
}
