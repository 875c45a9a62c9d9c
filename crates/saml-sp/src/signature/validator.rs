//! XML Signature validation.
//!
//! Verifies enveloped signatures against trusted credentials. The reference
//! must point at the element being verified; anything else is treated as a
//! wrapping attempt.

use base64::Engine;
use saml_crypto::{decode_certificate, VerifyingKey};

use crate::credential::Credential;
use crate::error::{SamlError, SamlResult};
use crate::types::{transforms, XMLDSIG_NS};
use crate::xml::{canonicalize_with_prefixes, C14nMode};

use super::{CanonicalizationAlgorithm, Signable, Signature, SignatureAlgorithm, VerificationMode};

/// XML signature validator.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSignatureValidator {
    mode: VerificationMode,
    allow_sha1: bool,
}

/// Outcome of a verified HTTP-Redirect query signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectSignature {
    /// The declared algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Alias of the credential that verified it.
    pub credential_alias: String,
}

impl XmlSignatureValidator {
    /// Creates a validator using the given candidate selection.
    #[must_use]
    pub const fn new(mode: VerificationMode) -> Self {
        Self {
            mode,
            allow_sha1: false,
        }
    }

    /// Allows SHA-1 based signatures (not recommended).
    #[must_use]
    pub const fn allow_sha1(mut self, allow: bool) -> Self {
        self.allow_sha1 = allow;
        self
    }

    /// Returns the candidate selection mode.
    #[must_use]
    pub const fn mode(&self) -> VerificationMode {
        self.mode
    }

    /// Verifies the enveloped signature of `target`.
    ///
    /// Candidates are tried in order. The returned signature names the
    /// credential that verified it.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if there is no signature, if
    /// its structure or algorithms are unacceptable, if the reference does
    /// not point at `target`, if the digest does not match, or if no
    /// candidate verifies the signature value.
    pub fn verify<S: Signable + ?Sized>(
        &self,
        target: &S,
        candidates: &[Credential],
    ) -> SamlResult<Signature> {
        let element = target.signable_element();
        let signature_element = target
            .signature_element()
            .ok_or_else(|| SamlError::SignatureInvalid("element is not signed".to_string()))?;
        let mut signature = Signature::from_element(signature_element)?;

        let id = element.id().ok_or_else(|| {
            SamlError::SignatureInvalid("signed element has no ID attribute".to_string())
        })?;
        if signature.referenced_id() != Some(id) {
            return Err(SamlError::SignatureInvalid(format!(
                "reference '{}' does not point at the signed element",
                signature.reference_uri
            )));
        }

        if !self.allow_sha1 && (signature.algorithm.is_deprecated() || signature.digest.is_deprecated()) {
            return Err(SamlError::SignatureInvalid(
                "SHA-1 signatures are not allowed".to_string(),
            ));
        }

        let reference_mode = reference_c14n_mode(&signature.transforms)?;

        let mut unsigned = element.clone();
        unsigned.take_child(XMLDSIG_NS, "Signature");
        let digest = saml_crypto::hash(
            signature.digest.hash(),
            canonicalize_with_prefixes(&unsigned, reference_mode, &signature.reference_prefixes)
                .as_bytes(),
        );
        let expected = decode_base64(&signature.digest_value, "digest value")?;
        if digest != expected {
            return Err(SamlError::SignatureInvalid(
                "digest does not match the signed content".to_string(),
            ));
        }

        let signed_info = signature_element
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or_else(|| SamlError::SignatureInvalid("no SignedInfo".to_string()))?;
        let signed_bytes = canonicalize_with_prefixes(
            signed_info,
            signature.canonicalization.mode(),
            &signature.canonicalization_prefixes,
        );
        let signature_bytes = decode_base64(&signature.signature_value, "signature value")?;

        let embedded = signature
            .certificate
            .as_deref()
            .map(embedded_key)
            .transpose()?;
        let selected = self.select(candidates, embedded.as_ref())?;

        let scheme = signature.algorithm.scheme();
        let verified_by = selected.iter().find(|credential| {
            credential
                .verifying_key()
                .verify(scheme, signed_bytes.as_bytes(), &signature_bytes)
                .is_ok()
        });

        match verified_by {
            Some(credential) => {
                tracing::trace!(id = %id, alias = credential.alias(), "signature verified");
                signature.credential_alias = Some(credential.alias().to_string());
                Ok(signature)
            }
            None => Err(SamlError::SignatureInvalid(
                "no trusted credential verifies the signature".to_string(),
            )),
        }
    }

    /// Verifies the detached signature of an HTTP-Redirect query string.
    ///
    /// `raw_query` is the query exactly as received, without the leading `?`.
    /// The signed octets are rebuilt from the raw, still URL-encoded values.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if required parameters are
    /// missing, the algorithm is unknown or refused, or no candidate verifies.
    pub fn verify_redirect_query(
        &self,
        raw_query: &str,
        candidates: &[Credential],
    ) -> SamlResult<RedirectSignature> {
        let raw = |name: &str| {
            raw_query.split('&').find_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                (key == name).then_some(value)
            })
        };
        let missing = |name: &str| SamlError::SignatureInvalid(format!("query has no {name}"));

        let (parameter, message) = match (raw("SAMLRequest"), raw("SAMLResponse")) {
            (Some(request), None) => ("SAMLRequest", request),
            (None, Some(response)) => ("SAMLResponse", response),
            _ => {
                return Err(SamlError::SignatureInvalid(
                    "query must carry exactly one SAML message".to_string(),
                ))
            }
        };
        let sig_alg = raw("SigAlg").ok_or_else(|| missing("SigAlg"))?;
        let signature_param = raw("Signature").ok_or_else(|| missing("Signature"))?;

        let algorithm_uri = url_decode(sig_alg)?;
        let algorithm = SignatureAlgorithm::from_uri(&algorithm_uri).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("unsupported signature algorithm {algorithm_uri}"))
        })?;
        if algorithm.is_deprecated() && !self.allow_sha1 {
            return Err(SamlError::SignatureInvalid(
                "SHA-1 signatures are not allowed".to_string(),
            ));
        }

        let mut signed = format!("{parameter}={message}");
        if let Some(relay_state) = raw("RelayState") {
            signed.push_str("&RelayState=");
            signed.push_str(relay_state);
        }
        signed.push_str("&SigAlg=");
        signed.push_str(sig_alg);

        let signature_bytes = decode_base64(&url_decode(signature_param)?, "signature value")?;
        let selected = self.select(candidates, None)?;

        selected
            .iter()
            .find(|credential| {
                credential
                    .verifying_key()
                    .verify(algorithm.scheme(), signed.as_bytes(), &signature_bytes)
                    .is_ok()
            })
            .map(|credential| RedirectSignature {
                algorithm,
                credential_alias: credential.alias().to_string(),
            })
            .ok_or_else(|| {
                SamlError::SignatureInvalid(
                    "no trusted credential verifies the query signature".to_string(),
                )
            })
    }

    fn select<'a>(
        &self,
        candidates: &'a [Credential],
        embedded: Option<&VerifyingKey>,
    ) -> SamlResult<Vec<&'a Credential>> {
        if candidates.is_empty() {
            return Err(SamlError::SignatureInvalid(
                "no trusted credentials to verify with".to_string(),
            ));
        }

        match (self.mode, embedded) {
            (VerificationMode::FirstCandidate, _) => Ok(candidates.iter().take(1).collect()),
            (VerificationMode::KeyMatch, None) => Ok(candidates.iter().collect()),
            (VerificationMode::KeyMatch, Some(key)) => {
                let matching: Vec<_> = candidates
                    .iter()
                    .filter(|c| c.verifying_key() == key)
                    .collect();
                if matching.is_empty() {
                    return Err(SamlError::SignatureInvalid(
                        "embedded certificate matches no trusted credential".to_string(),
                    ));
                }
                Ok(matching)
            }
        }
    }
}

/// Works out the canonicalization a reference's transforms ask for.
///
/// The enveloped-signature transform is required. Without an explicit
/// canonicalization transform, inclusive C14N applies.
fn reference_c14n_mode(transform_uris: &[String]) -> SamlResult<C14nMode> {
    let mut enveloped = false;
    let mut mode = None;

    for uri in transform_uris {
        if uri == transforms::ENVELOPED_SIGNATURE {
            enveloped = true;
        } else if let Some(c14n) = CanonicalizationAlgorithm::from_uri(uri) {
            mode = Some(c14n.mode());
        } else {
            return Err(SamlError::SignatureInvalid(format!(
                "unsupported transform {uri}"
            )));
        }
    }

    if !enveloped {
        return Err(SamlError::SignatureInvalid(
            "reference lacks the enveloped-signature transform".to_string(),
        ));
    }
    Ok(mode.unwrap_or(C14nMode::Inclusive))
}

fn embedded_key(certificate: &str) -> SamlResult<VerifyingKey> {
    let der = decode_certificate(certificate)
        .map_err(|e| SamlError::SignatureInvalid(format!("embedded certificate: {e}")))?;
    VerifyingKey::from_certificate_der(&der)
        .map_err(|e| SamlError::SignatureInvalid(format!("embedded certificate: {e}")))
}

fn decode_base64(value: &str, what: &str) -> SamlResult<Vec<u8>> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| SamlError::SignatureInvalid(format!("invalid {what}: {e}")))
}

fn url_decode(value: &str) -> SamlResult<String> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| SamlError::SignatureInvalid(format!("invalid query encoding: {e}")))
}
