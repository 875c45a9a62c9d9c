//! Signing and verifying keys.
//!
//! Private keys are loaded from DER (PKCS#8, PKCS#1 or SEC1). Public keys come
//! out of X.509 certificates, which is how SAML metadata publishes them.
//!
//! ECDSA signatures use the fixed-width `r || s` form mandated for XML-DSig
//! by RFC 4051, not ASN.1 DER.

use std::fmt;

use aws_lc_rs::{
    rand::SystemRandom,
    signature::{self, EcdsaKeyPair, EcdsaSigningAlgorithm, KeyPair, RsaKeyPair, UnparsedPublicKey},
};
use base64::Engine;

use crate::algorithm::SignatureAlgorithm;
use crate::error::CryptoError;

const RSA_ENCRYPTION_OID: &str = "1.2.840.113549.1.1.1";
const EC_PUBLIC_KEY_OID: &str = "1.2.840.10045.2.1";

/// Elliptic curves accepted for ECDSA keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EcCurve {
    /// NIST P-256.
    P256,
    /// NIST P-384.
    P384,
    /// NIST P-521.
    P521,
}

impl EcCurve {
    /// Returns the curve name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::P256 => "P-256",
            Self::P384 => "P-384",
            Self::P521 => "P-521",
        }
    }

    /// Returns the ECDSA scheme bound to this curve.
    #[must_use]
    pub const fn signature_algorithm(self) -> SignatureAlgorithm {
        match self {
            Self::P256 => SignatureAlgorithm::EcdsaSha256,
            Self::P384 => SignatureAlgorithm::EcdsaSha384,
            Self::P521 => SignatureAlgorithm::EcdsaSha512,
        }
    }

    fn signing_algorithm(self) -> &'static EcdsaSigningAlgorithm {
        match self {
            Self::P256 => &signature::ECDSA_P256_SHA256_FIXED_SIGNING,
            Self::P384 => &signature::ECDSA_P384_SHA384_FIXED_SIGNING,
            Self::P521 => &signature::ECDSA_P521_SHA512_FIXED_SIGNING,
        }
    }

    /// Infers the curve from the length of an uncompressed public point.
    fn from_point_len(len: usize) -> Option<Self> {
        match len {
            65 => Some(Self::P256),
            97 => Some(Self::P384),
            133 => Some(Self::P521),
            _ => None,
        }
    }
}

/// Key family of a signing or verifying key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    /// RSA key.
    Rsa,
    /// ECDSA key on the given curve.
    Ec(EcCurve),
}

enum SigningKeyInner {
    Rsa(RsaKeyPair),
    Ecdsa(EcdsaKeyPair, EcCurve),
}

/// Private key able to produce signatures.
pub struct SigningKey {
    inner: SigningKeyInner,
    fingerprint: String,
}

impl SigningKey {
    /// Loads a private key from DER.
    ///
    /// RSA keys may be PKCS#8 or PKCS#1; EC keys may be PKCS#8 or SEC1. The
    /// curve is detected from the key itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a supported private key.
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        if let Ok(pair) = RsaKeyPair::from_pkcs8(der).or_else(|_| RsaKeyPair::from_der(der)) {
            let fingerprint = fingerprint(pair.public_key().as_ref());
            return Ok(Self {
                inner: SigningKeyInner::Rsa(pair),
                fingerprint,
            });
        }

        for curve in [EcCurve::P256, EcCurve::P384, EcCurve::P521] {
            let alg = curve.signing_algorithm();
            if let Ok(pair) = EcdsaKeyPair::from_pkcs8(alg, der)
                .or_else(|_| EcdsaKeyPair::from_private_key_der(alg, der))
            {
                let fingerprint = fingerprint(pair.public_key().as_ref());
                return Ok(Self {
                    inner: SigningKeyInner::Ecdsa(pair, curve),
                    fingerprint,
                });
            }
        }

        Err(CryptoError::InvalidKey(
            "not an RSA or EC private key in a supported encoding".to_string(),
        ))
    }

    /// Returns the key family.
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        match &self.inner {
            SigningKeyInner::Rsa(_) => KeyKind::Rsa,
            SigningKeyInner::Ecdsa(_, curve) => KeyKind::Ec(*curve),
        }
    }

    /// Returns the raw public key: PKCS#1 `RSAPublicKey` for RSA, the
    /// uncompressed point for EC.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        match &self.inner {
            SigningKeyInner::Rsa(pair) => pair.public_key().as_ref(),
            SigningKeyInner::Ecdsa(pair, _) => pair.public_key().as_ref(),
        }
    }

    /// Short identifier derived from the public key, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Signs `data` with the given scheme.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme does not fit the key, if the scheme is
    /// SHA-1 based, or if the underlying signing operation fails.
    pub fn sign(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let rng = SystemRandom::new();

        match &self.inner {
            SigningKeyInner::Rsa(pair) => {
                let padding = match algorithm {
                    SignatureAlgorithm::RsaSha256 => &signature::RSA_PKCS1_SHA256,
                    SignatureAlgorithm::RsaSha384 => &signature::RSA_PKCS1_SHA384,
                    SignatureAlgorithm::RsaSha512 => &signature::RSA_PKCS1_SHA512,
                    other => {
                        return Err(CryptoError::UnsupportedAlgorithm(format!(
                            "{} signatures cannot be produced with an RSA key",
                            other.name()
                        )))
                    }
                };

                let mut sig = vec![0u8; pair.public_modulus_len()];
                pair.sign(padding, &rng, data, &mut sig)
                    .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;
                Ok(sig)
            }
            SigningKeyInner::Ecdsa(pair, curve) => {
                if curve.signature_algorithm() != algorithm {
                    return Err(CryptoError::UnsupportedAlgorithm(format!(
                        "{} signatures cannot be produced with a {} key",
                        algorithm.name(),
                        curve.name()
                    )));
                }

                let sig = pair
                    .sign(&rng, data)
                    .map_err(|e| CryptoError::Signing(format!("ECDSA signing failed: {e}")))?;
                Ok(sig.as_ref().to_vec())
            }
        }
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kind", &self.kind())
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

/// Public key used to check signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyingKey {
    kind: KeyKind,
    public_key: Vec<u8>,
    fingerprint: String,
}

impl VerifyingKey {
    /// Builds a verifying key from raw public key bytes.
    #[must_use]
    pub fn from_public_key(kind: KeyKind, public_key: Vec<u8>) -> Self {
        let fingerprint = fingerprint(&public_key);
        Self {
            kind,
            public_key,
            fingerprint,
        }
    }

    /// Extracts the subject public key of a DER certificate.
    ///
    /// # Errors
    ///
    /// Returns an error if the certificate cannot be parsed or carries a key
    /// type other than RSA or EC (P-256/384/521).
    pub fn from_certificate_der(der: &[u8]) -> Result<Self, CryptoError> {
        let (_, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;

        let spki = cert.public_key();
        let public_key = spki.subject_public_key.data.to_vec();
        let oid = spki.algorithm.algorithm.to_id_string();

        let kind = match oid.as_str() {
            RSA_ENCRYPTION_OID => KeyKind::Rsa,
            EC_PUBLIC_KEY_OID => {
                let curve = EcCurve::from_point_len(public_key.len()).ok_or_else(|| {
                    CryptoError::InvalidCertificate("unsupported EC point encoding".to_string())
                })?;
                KeyKind::Ec(curve)
            }
            other => {
                return Err(CryptoError::InvalidCertificate(format!(
                    "unsupported public key algorithm {other}"
                )))
            }
        };

        Ok(Self::from_public_key(kind, public_key))
    }

    /// Returns the key family.
    #[must_use]
    pub const fn kind(&self) -> KeyKind {
        self.kind
    }

    /// Returns the raw public key bytes.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Short identifier derived from the public key, safe to log.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Returns true if `signing_key` is the private half of this key.
    #[must_use]
    pub fn matches(&self, signing_key: &SigningKey) -> bool {
        self.kind == signing_key.kind() && self.public_key == signing_key.public_key()
    }

    /// Verifies `sig` over `data`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::UnsupportedAlgorithm`] if the scheme does not
    /// fit the key and [`CryptoError::Verification`] if the signature is bad.
    pub fn verify(
        &self,
        algorithm: SignatureAlgorithm,
        data: &[u8],
        sig: &[u8],
    ) -> Result<(), CryptoError> {
        let params: &'static dyn signature::VerificationAlgorithm = match (self.kind, algorithm) {
            (KeyKind::Rsa, SignatureAlgorithm::RsaSha1) => {
                &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY
            }
            (KeyKind::Rsa, SignatureAlgorithm::RsaSha256) => &signature::RSA_PKCS1_2048_8192_SHA256,
            (KeyKind::Rsa, SignatureAlgorithm::RsaSha384) => &signature::RSA_PKCS1_2048_8192_SHA384,
            (KeyKind::Rsa, SignatureAlgorithm::RsaSha512) => &signature::RSA_PKCS1_2048_8192_SHA512,
            (KeyKind::Ec(EcCurve::P256), SignatureAlgorithm::EcdsaSha256) => {
                &signature::ECDSA_P256_SHA256_FIXED
            }
            (KeyKind::Ec(EcCurve::P384), SignatureAlgorithm::EcdsaSha384) => {
                &signature::ECDSA_P384_SHA384_FIXED
            }
            (KeyKind::Ec(EcCurve::P521), SignatureAlgorithm::EcdsaSha512) => {
                &signature::ECDSA_P521_SHA512_FIXED
            }
            (kind, alg) => {
                return Err(CryptoError::UnsupportedAlgorithm(format!(
                    "{} cannot be verified with a {kind:?} key",
                    alg.name()
                )))
            }
        };

        UnparsedPublicKey::new(params, &self.public_key)
            .verify(data, sig)
            .map_err(|_| CryptoError::Verification)
    }
}

/// Generates a key identifier from the public key bytes.
fn fingerprint(public_key: &[u8]) -> String {
    let hash = crate::sha256(public_key);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&hash[..8])
}
