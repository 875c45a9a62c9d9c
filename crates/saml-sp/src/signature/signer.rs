//! XML Signature creation.
//!
//! Produces enveloped signatures with exclusive canonicalization and the
//! credential's certificate in `KeyInfo`.

use base64::Engine;

use crate::credential::Credential;
use crate::error::{SamlError, SamlResult};
use crate::types::{transforms, SAML_NS, XMLDSIG_NS};
use crate::xml::{canonicalize, C14nMode, XmlElement};

use super::{CanonicalizationAlgorithm, Signable, Signature, SignatureConfig};

/// XML document signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlSigner {
    config: SignatureConfig,
}

impl XmlSigner {
    /// Creates a signer with the given algorithm choice.
    #[must_use]
    pub const fn new(config: SignatureConfig) -> Self {
        Self { config }
    }

    /// Returns the signature configuration.
    #[must_use]
    pub const fn config(&self) -> &SignatureConfig {
        &self.config
    }

    /// Signs `target` in place.
    ///
    /// Any enveloped signature already present is replaced. The new
    /// `ds:Signature` goes directly after the `saml:Issuer` child, or first
    /// when there is no issuer.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureCreation`] if the credential has no
    /// private key, the element has no `ID`, the algorithm is SHA-1 based or
    /// does not fit the key, or the signing operation fails. No partial
    /// signature is ever inserted.
    pub fn sign<S: Signable + ?Sized>(
        &self,
        target: &mut S,
        credential: &Credential,
    ) -> SamlResult<Signature> {
        let signing_key = credential.signing_key().ok_or_else(|| {
            SamlError::SignatureCreation(format!(
                "credential '{}' has no private key",
                credential.alias()
            ))
        })?;
        if self.config.algorithm.is_deprecated() || self.config.digest.is_deprecated() {
            return Err(SamlError::SignatureCreation(
                "SHA-1 based signatures are not produced".to_string(),
            ));
        }

        let element = target.signable_element_mut();
        while element.take_child(XMLDSIG_NS, "Signature").is_some() {}

        let id = element
            .id()
            .ok_or_else(|| {
                SamlError::SignatureCreation(format!(
                    "element {} has no ID attribute",
                    element.qualified_name()
                ))
            })?
            .to_string();

        let digest = saml_crypto::hash(
            self.config.digest.hash(),
            canonicalize(element, C14nMode::Exclusive).as_bytes(),
        );
        let digest_value = base64::engine::general_purpose::STANDARD.encode(digest);
        let reference_uri = format!("#{id}");

        let signed_info = build_signed_info(&self.config, &reference_uri, &digest_value);
        let signature_bytes = signing_key
            .sign(
                self.config.algorithm.scheme(),
                canonicalize(&signed_info, C14nMode::Exclusive).as_bytes(),
            )
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))?;
        let signature_value = base64::engine::general_purpose::STANDARD.encode(signature_bytes);
        let certificate = credential
            .certificate_der()
            .map(saml_crypto::encode_certificate);

        let signature_element =
            build_signature_element(signed_info, &signature_value, certificate.as_deref());
        let position = element
            .child_position(SAML_NS, "Issuer")
            .map_or(0, |index| index + 1);
        element.insert_child(position, signature_element);

        tracing::trace!(
            id = %id,
            alias = credential.alias(),
            algorithm = self.config.algorithm.uri(),
            "element signed"
        );

        let signature = Signature {
            algorithm: self.config.algorithm,
            digest: self.config.digest,
            canonicalization: CanonicalizationAlgorithm::ExclusiveC14N,
            canonicalization_prefixes: Vec::new(),
            reference_uri,
            transforms: vec![
                transforms::ENVELOPED_SIGNATURE.to_string(),
                CanonicalizationAlgorithm::ExclusiveC14N.uri().to_string(),
            ],
            reference_prefixes: Vec::new(),
            digest_value,
            signature_value,
            certificate,
            credential_alias: Some(credential.alias().to_string()),
        };
        target.attach_signature(signature.clone());
        Ok(signature)
    }

    /// Builds a signed HTTP-Redirect query string.
    ///
    /// `parameter` is `SAMLRequest` or `SAMLResponse` and `encoded_message`
    /// the deflated, base64 message (not yet URL-encoded).
    ///
    /// # Errors
    ///
    /// As [`XmlSigner::sign`] for key and algorithm problems.
    pub fn sign_redirect_query(
        &self,
        parameter: &str,
        encoded_message: &str,
        relay_state: Option<&str>,
        credential: &Credential,
    ) -> SamlResult<String> {
        let signing_key = credential.signing_key().ok_or_else(|| {
            SamlError::SignatureCreation(format!(
                "credential '{}' has no private key",
                credential.alias()
            ))
        })?;
        if self.config.algorithm.is_deprecated() {
            return Err(SamlError::SignatureCreation(
                "SHA-1 based signatures are not produced".to_string(),
            ));
        }

        let mut query = format!("{parameter}={}", urlencoding::encode(encoded_message));
        if let Some(relay_state) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(relay_state));
        }
        query.push_str("&SigAlg=");
        query.push_str(&urlencoding::encode(self.config.algorithm.uri()));

        let signature = signing_key
            .sign(self.config.algorithm.scheme(), query.as_bytes())
            .map_err(|e| SamlError::SignatureCreation(e.to_string()))?;
        let signature = base64::engine::general_purpose::STANDARD.encode(signature);

        query.push_str("&Signature=");
        query.push_str(&urlencoding::encode(&signature));
        Ok(query)
    }
}

fn ds(local_name: &str) -> XmlElement {
    XmlElement::new(Some("ds"), XMLDSIG_NS, local_name)
}

fn build_signed_info(config: &SignatureConfig, reference_uri: &str, digest_value: &str) -> XmlElement {
    let c14n = CanonicalizationAlgorithm::ExclusiveC14N.uri();

    ds("SignedInfo")
        .with_child(ds("CanonicalizationMethod").with_attribute("Algorithm", c14n))
        .with_child(ds("SignatureMethod").with_attribute("Algorithm", config.algorithm.uri()))
        .with_child(
            ds("Reference")
                .with_attribute("URI", reference_uri)
                .with_child(
                    ds("Transforms")
                        .with_child(
                            ds("Transform")
                                .with_attribute("Algorithm", transforms::ENVELOPED_SIGNATURE),
                        )
                        .with_child(ds("Transform").with_attribute("Algorithm", c14n)),
                )
                .with_child(ds("DigestMethod").with_attribute("Algorithm", config.digest.uri()))
                .with_child(ds("DigestValue").with_text(digest_value)),
        )
}

fn build_signature_element(
    signed_info: XmlElement,
    signature_value: &str,
    certificate: Option<&str>,
) -> XmlElement {
    let mut signature = ds("Signature")
        .with_namespace("ds", XMLDSIG_NS)
        .with_child(signed_info)
        .with_child(ds("SignatureValue").with_text(signature_value));

    if let Some(certificate) = certificate {
        signature.push_child(
            ds("KeyInfo").with_child(
                ds("X509Data").with_child(ds("X509Certificate").with_text(certificate)),
            ),
        );
    }
    signature
}
