//! Metadata serialization.

use saml_crypto::{decode_certificate, encode_certificate};

use crate::credential::{Credential, KeyType, SimpleKey};
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;
use crate::types::{format_instant, generate_id, MD_NS, XMLDSIG_NS};
use crate::xml::{to_document_string, XmlElement};

use super::{to_duration, Endpoint, Metadata, Provider, ProviderInfo};

/// Writes [`Metadata`] back to `md:EntityDescriptor` XML.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataWriter;

impl MetadataWriter {
    /// Builds the entity descriptor tree.
    ///
    /// Roles that were only kept as unknown descriptors are not written.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::CredentialResolution`] if a published certificate
    /// cannot be decoded.
    pub fn to_element(metadata: &Metadata) -> SamlResult<XmlElement> {
        let mut root = md("EntityDescriptor")
            .with_namespace("md", MD_NS)
            .with_namespace("ds", XMLDSIG_NS)
            .with_attribute("entityID", metadata.entity_id.as_str());
        if let Some(id) = &metadata.id {
            root.set_attribute("ID", id.as_str());
        }
        set_validity(&mut root, metadata.valid_until, metadata.cache_duration_millis);

        for provider in &metadata.providers {
            match provider {
                Provider::ServiceProvider(sp) => {
                    let mut el = role(md("SPSSODescriptor"), &sp.info)?;
                    if sp.authn_requests_signed {
                        el.set_attribute("AuthnRequestsSigned", "true");
                    }
                    if sp.want_assertions_signed {
                        el.set_attribute("WantAssertionsSigned", "true");
                    }
                    push_endpoints(&mut el, "AssertionConsumerService", &sp.assertion_consumer_services);
                    root.push_child(el);
                }
                Provider::IdentityProvider(idp) => {
                    let mut el = role(md("IDPSSODescriptor"), &idp.info)?;
                    if idp.want_authn_requests_signed {
                        el.set_attribute("WantAuthnRequestsSigned", "true");
                    }
                    push_endpoints(&mut el, "SingleSignOnService", &idp.single_sign_on_services);
                    push_endpoints(&mut el, "NameIDMappingService", &idp.name_id_mapping_services);
                    root.push_child(el);
                }
                Provider::Unknown(unknown) => {
                    tracing::debug!(
                        entity_id = %metadata.entity_id,
                        role = %unknown.element_name,
                        "unknown role not written"
                    );
                }
            }
        }
        Ok(root)
    }

    /// Serializes `metadata` as a document, optionally signed.
    ///
    /// A signed document needs an `ID`; one is generated when the metadata
    /// has none.
    ///
    /// # Errors
    ///
    /// Certificate errors from [`MetadataWriter::to_element`] and signing
    /// errors from [`XmlSigner::sign`].
    pub fn to_xml(
        metadata: &Metadata,
        signing: Option<(&XmlSigner, &Credential)>,
    ) -> SamlResult<String> {
        let mut root = Self::to_element(metadata)?;
        if let Some((signer, credential)) = signing {
            if root.id().is_none() {
                root.set_attribute("ID", generate_id());
            }
            signer.sign(&mut root, credential)?;
        }
        Ok(to_document_string(&root))
    }
}

fn md(local_name: &str) -> XmlElement {
    XmlElement::new(Some("md"), MD_NS, local_name)
}

fn set_validity(
    element: &mut XmlElement,
    valid_until: Option<chrono::DateTime<chrono::Utc>>,
    cache_duration_millis: i64,
) {
    if let Some(valid_until) = valid_until {
        element.set_attribute("validUntil", format_instant(valid_until));
    }
    if let Some(duration) = to_duration(cache_duration_millis) {
        element.set_attribute("cacheDuration", duration.to_string());
    }
}

fn role(mut element: XmlElement, info: &ProviderInfo) -> SamlResult<XmlElement> {
    if let Some(id) = &info.id {
        element.set_attribute("ID", id.as_str());
    }
    set_validity(&mut element, info.valid_until, info.cache_duration_millis);
    if !info.protocols.is_empty() {
        element.set_attribute("protocolSupportEnumeration", info.protocols.join(" "));
    }

    for key in &info.keys {
        element.push_child(key_descriptor(key)?);
    }
    push_endpoints(&mut element, "ArtifactResolutionService", &info.artifact_resolution_services);
    push_endpoints(&mut element, "SingleLogoutService", &info.single_logout_services);
    push_endpoints(&mut element, "ManageNameIDService", &info.manage_name_id_services);
    for format in &info.name_id_formats {
        element.push_child(md("NameIDFormat").with_text(format.uri()));
    }
    Ok(element)
}

fn key_descriptor(key: &SimpleKey) -> SamlResult<XmlElement> {
    let mut descriptor = md("KeyDescriptor");
    match key.key_type {
        KeyType::Signing => descriptor.set_attribute("use", "signing"),
        KeyType::Encryption => descriptor.set_attribute("use", "encryption"),
        KeyType::Unspecified => {}
    }

    let mut key_info = XmlElement::new(Some("ds"), XMLDSIG_NS, "KeyInfo")
        .with_child(XmlElement::new(Some("ds"), XMLDSIG_NS, "KeyName").with_text(key.alias.as_str()));
    if let Some(certificate) = &key.certificate {
        let der = decode_certificate(certificate).map_err(|e| {
            SamlError::CredentialResolution(format!("certificate of '{}': {e}", key.alias))
        })?;
        key_info.push_child(
            XmlElement::new(Some("ds"), XMLDSIG_NS, "X509Data").with_child(
                XmlElement::new(Some("ds"), XMLDSIG_NS, "X509Certificate")
                    .with_text(encode_certificate(&der)),
            ),
        );
    }
    descriptor.push_child(key_info);
    Ok(descriptor)
}

fn push_endpoints(element: &mut XmlElement, local_name: &str, endpoints: &[Endpoint]) {
    for endpoint in endpoints {
        let mut el = md(local_name)
            .with_attribute("Binding", endpoint.binding.uri())
            .with_attribute("Location", endpoint.location.as_str());
        if let Some(response_location) = &endpoint.response_location {
            el.set_attribute("ResponseLocation", response_location.as_str());
        }
        if let Some(index) = endpoint.index {
            el.set_attribute("index", index.to_string());
        }
        if let Some(is_default) = endpoint.is_default {
            el.set_attribute("isDefault", if is_default { "true" } else { "false" });
        }
        element.push_child(el);
    }
}
