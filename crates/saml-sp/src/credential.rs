//! Key material and credential resolution.
//!
//! Keys are configured as text ([`SimpleKey`]) and resolved by alias into a
//! [`Credential`] right before a signing or verification operation.

use std::fmt;
use std::sync::Arc;

use saml_crypto::{decode_certificate, decode_private_key, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};

/// Declared use of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyType {
    /// Signing key.
    Signing,
    /// Encryption key.
    Encryption,
    /// No declared use; good for both.
    #[default]
    Unspecified,
}

impl KeyType {
    /// Returns true if keys of this type may check signatures.
    #[must_use]
    pub const fn can_sign(self) -> bool {
        matches!(self, Self::Signing | Self::Unspecified)
    }
}

/// What a resolved credential will be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    /// Producing signatures; the private key is required.
    Signing,
    /// Checking signatures; only the public key is loaded.
    Verification,
}

/// A named key as configured or published in metadata.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleKey {
    /// Unique name of the key.
    pub alias: String,

    /// PEM private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    /// Passphrase for an encrypted private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase: Option<String>,

    /// Certificate, PEM or base64 DER.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,

    /// Declared use.
    #[serde(default)]
    pub key_type: KeyType,
}

impl SimpleKey {
    /// Creates a key with only an alias.
    #[must_use]
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            private_key: None,
            passphrase: None,
            certificate: None,
            key_type: KeyType::Unspecified,
        }
    }

    /// Sets the certificate.
    #[must_use]
    pub fn with_certificate(mut self, certificate: impl Into<String>) -> Self {
        self.certificate = Some(certificate.into());
        self
    }

    /// Sets the private key and its passphrase.
    #[must_use]
    pub fn with_private_key(mut self, pem: impl Into<String>, passphrase: Option<&str>) -> Self {
        self.private_key = Some(pem.into());
        self.passphrase = passphrase.map(str::to_string);
        self
    }

    /// Sets the declared use.
    #[must_use]
    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }
}

impl fmt::Debug for SimpleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleKey")
            .field("alias", &self.alias)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("has_certificate", &self.certificate.is_some())
            .field("key_type", &self.key_type)
            .finish()
    }
}

/// A key ready for a cryptographic operation.
#[derive(Debug, Clone)]
pub struct Credential {
    alias: String,
    certificate_der: Option<Vec<u8>>,
    verifying_key: VerifyingKey,
    signing_key: Option<Arc<SigningKey>>,
}

impl Credential {
    /// Returns the alias the credential was resolved from.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Returns the DER certificate, if one was configured.
    #[must_use]
    pub fn certificate_der(&self) -> Option<&[u8]> {
        self.certificate_der.as_deref()
    }

    /// Returns the public key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Returns the private key, present only for signing credentials.
    #[must_use]
    pub fn signing_key(&self) -> Option<&SigningKey> {
        self.signing_key.as_deref()
    }
}

/// Alias-indexed key collection.
#[derive(Debug, Clone, Default)]
pub struct KeyStore {
    keys: Vec<SimpleKey>,
}

impl KeyStore {
    /// Creates a store over the given keys.
    ///
    /// Duplicate aliases are kept; resolving one of them fails.
    pub fn from_keys(keys: impl IntoIterator<Item = SimpleKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
        }
    }

    /// Returns the configured keys.
    #[must_use]
    pub fn keys(&self) -> &[SimpleKey] {
        &self.keys
    }

    /// Resolves `alias` into a credential.
    ///
    /// Matching is exact and case-sensitive.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::CredentialResolution`] if the alias is unknown or
    /// ambiguous, if signing is requested without a usable private key, or if
    /// the key material cannot be decoded.
    pub fn resolve(&self, alias: &str, usage: KeyUsage) -> SamlResult<Credential> {
        let mut matches = self.keys.iter().filter(|k| k.alias == alias);
        let key = matches
            .next()
            .ok_or_else(|| SamlError::CredentialResolution(format!("unknown alias '{alias}'")))?;
        if matches.next().is_some() {
            return Err(SamlError::CredentialResolution(format!(
                "ambiguous alias '{alias}'"
            )));
        }

        load(key, usage)
    }
}

/// Resolves a single key by its own alias.
///
/// # Errors
///
/// See [`KeyStore::resolve`].
pub fn resolve_credential(key: &SimpleKey, usage: KeyUsage) -> SamlResult<Credential> {
    KeyStore::from_keys([key.clone()]).resolve(&key.alias, usage)
}

/// Resolves every key that may check signatures, in order.
///
/// Encryption-only keys are skipped. Keys that fail to resolve are skipped
/// with a warning, so an empty result means no trusted key is usable.
#[must_use]
pub fn verification_credentials(keys: &[SimpleKey]) -> Vec<Credential> {
    keys.iter()
        .filter(|k| k.key_type.can_sign())
        .filter_map(|k| match resolve_credential(k, KeyUsage::Verification) {
            Ok(credential) => Some(credential),
            Err(e) => {
                tracing::warn!(alias = %k.alias, error = %e, "skipping unusable key");
                None
            }
        })
        .collect()
}

fn load(key: &SimpleKey, usage: KeyUsage) -> SamlResult<Credential> {
    let failed = |what: &str, e: saml_crypto::CryptoError| {
        SamlError::CredentialResolution(format!("{what} for '{}': {e}", key.alias))
    };

    let certificate_der = key
        .certificate
        .as_deref()
        .map(decode_certificate)
        .transpose()
        .map_err(|e| failed("unreadable certificate", e))?;
    let certificate_key = certificate_der
        .as_deref()
        .map(VerifyingKey::from_certificate_der)
        .transpose()
        .map_err(|e| failed("unusable certificate", e))?;

    let signing_key = match usage {
        KeyUsage::Verification => None,
        KeyUsage::Signing => {
            let pem = key.private_key.as_deref().ok_or_else(|| {
                SamlError::CredentialResolution(format!("no private key for '{}'", key.alias))
            })?;
            let der = decode_private_key(pem, key.passphrase.as_deref())
                .map_err(|e| failed("unreadable private key", e))?;
            let signing = SigningKey::from_der(&der).map_err(|e| failed("unusable private key", e))?;
            Some(Arc::new(signing))
        }
    };

    let verifying_key = match (certificate_key, &signing_key) {
        (Some(public), Some(private)) => {
            if !public.matches(private) {
                return Err(SamlError::CredentialResolution(format!(
                    "private key does not match certificate for '{}'",
                    key.alias
                )));
            }
            public
        }
        (Some(public), None) => public,
        (None, Some(private)) => {
            VerifyingKey::from_public_key(private.kind(), private.public_key().to_vec())
        }
        (None, None) => {
            return Err(SamlError::CredentialResolution(format!(
                "no key material for '{}'",
                key.alias
            )))
        }
    };

    tracing::trace!(alias = %key.alias, fingerprint = verifying_key.fingerprint(), ?usage, "credential resolved");

    Ok(Credential {
        alias: key.alias.clone(),
        certificate_der,
        verifying_key,
        signing_key,
    })
}
