//! Decoding of key and certificate text.
//!
//! Configuration and metadata hand over keys as strings: PEM blocks for
//! private keys and either PEM or bare base64 DER for certificates (the
//! latter is what `ds:X509Certificate` contains).

use base64::Engine;
use pkcs8::EncryptedPrivateKeyInfo;

use crate::error::CryptoError;

/// Decodes a PEM private key into DER.
///
/// Accepts `PRIVATE KEY`, `RSA PRIVATE KEY`, `EC PRIVATE KEY` and
/// `ENCRYPTED PRIVATE KEY`. The passphrase is required for the last form and
/// ignored for the others.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] for unreadable or unsupported blocks
/// and [`CryptoError::Decryption`] when an encrypted key cannot be opened.
pub fn decode_private_key(text: &str, passphrase: Option<&str>) -> Result<Vec<u8>, CryptoError> {
    let block = ::pem::parse(text.trim())
        .map_err(|e| CryptoError::InvalidKey(format!("malformed PEM: {e}")))?;

    match block.tag() {
        "PRIVATE KEY" | "RSA PRIVATE KEY" | "EC PRIVATE KEY" => Ok(block.contents().to_vec()),
        "ENCRYPTED PRIVATE KEY" => {
            let passphrase = passphrase.ok_or_else(|| {
                CryptoError::Decryption("key is encrypted but no passphrase was supplied".to_string())
            })?;
            let info = EncryptedPrivateKeyInfo::try_from(block.contents())
                .map_err(|e| CryptoError::InvalidKey(format!("malformed encrypted key: {e}")))?;
            let document = info
                .decrypt(passphrase)
                .map_err(|e| CryptoError::Decryption(e.to_string()))?;
            Ok(document.as_bytes().to_vec())
        }
        other => Err(CryptoError::InvalidKey(format!(
            "unsupported PEM block '{other}'"
        ))),
    }
}

/// Decodes a certificate given as PEM or as base64 DER into DER.
///
/// Whitespace inside the base64 form is ignored.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidCertificate`] if neither form decodes.
pub fn decode_certificate(text: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = text.trim();

    if trimmed.starts_with("-----BEGIN") {
        let block = ::pem::parse(trimmed)
            .map_err(|e| CryptoError::InvalidCertificate(format!("malformed PEM: {e}")))?;
        if block.tag() != "CERTIFICATE" {
            return Err(CryptoError::InvalidCertificate(format!(
                "expected CERTIFICATE block, found '{}'",
                block.tag()
            )));
        }
        return Ok(block.contents().to_vec());
    }

    let compact: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| CryptoError::InvalidCertificate(format!("invalid base64: {e}")))
}

/// Encodes DER certificate bytes as the single-line base64 used in XML.
#[must_use]
pub fn encode_certificate(der: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(der)
}
