//! Metadata resolution.
//!
//! Turns an `md:EntityDescriptor` document into [`Metadata`], verifying the
//! document signature first when trusted keys are supplied.

use std::sync::Arc;

use crate::credential::{verification_credentials, KeyType, SimpleKey};
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSignatureValidator;
use crate::types::{parse_instant, NameIdFormat, SamlBinding, MD_NS, XMLDSIG_NS};
use crate::xml::{XmlContext, XmlElement};

use super::{
    to_millis, Endpoint, IdentityProviderRole, Metadata, Provider, ProviderInfo,
    ServiceProviderRole, UnknownRole, XsDuration,
};

const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

const ROLE_DESCRIPTORS: &[&str] = &[
    "RoleDescriptor",
    "IDPSSODescriptor",
    "SPSSODescriptor",
    "AuthnAuthorityDescriptor",
    "AttributeAuthorityDescriptor",
    "PDPDescriptor",
];

/// Resolves metadata documents.
#[derive(Debug, Clone)]
pub struct MetadataResolver {
    context: Arc<XmlContext>,
    validator: XmlSignatureValidator,
}

impl MetadataResolver {
    /// Creates a resolver parsing through `context`.
    #[must_use]
    pub fn new(context: Arc<XmlContext>) -> Self {
        Self {
            context,
            validator: XmlSignatureValidator::default(),
        }
    }

    /// Uses `validator` for document signatures.
    #[must_use]
    pub fn with_validator(mut self, validator: XmlSignatureValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Parses and translates a metadata document.
    ///
    /// With a non-empty `trusted_keys`, the document must carry a signature
    /// that verifies against one of them before anything is translated.
    ///
    /// # Errors
    ///
    /// Parse errors, [`SamlError::SignatureInvalid`] when the signature is
    /// missing or wrong, and [`SamlError::MetadataFormat`] when the root is
    /// not an entity descriptor or its content is malformed.
    pub fn resolve_metadata(&self, xml: &str, trusted_keys: &[SimpleKey]) -> SamlResult<Metadata> {
        let root = self.context.parse(xml)?;

        let signature = if trusted_keys.is_empty() {
            None
        } else {
            let candidates = verification_credentials(trusted_keys);
            Some(self.validator.verify(&root, &candidates)?)
        };

        let mut metadata = translate(&root)?;
        metadata.signature = signature;

        tracing::debug!(
            entity_id = %metadata.entity_id,
            providers = metadata.providers.len(),
            signed = metadata.signature.is_some(),
            "metadata resolved"
        );
        Ok(metadata)
    }
}

/// Translates a parsed `md:EntityDescriptor`.
///
/// # Errors
///
/// Returns [`SamlError::MetadataFormat`] for any other root or malformed
/// content.
pub fn translate(root: &XmlElement) -> SamlResult<Metadata> {
    if !root.is(MD_NS, "EntityDescriptor") {
        return Err(SamlError::MetadataFormat(format!(
            "expected md:EntityDescriptor, found {}",
            root.qualified_name()
        )));
    }

    let entity_id = root
        .attribute("entityID")
        .ok_or_else(|| SamlError::MetadataFormat("entity descriptor without entityID".to_string()))?
        .to_string();

    let providers = root
        .child_elements()
        .filter(|el| el.namespace.as_deref() == Some(MD_NS))
        .filter(|el| ROLE_DESCRIPTORS.contains(&el.local_name.as_str()))
        .enumerate()
        .map(|(role_index, el)| translate_role(el, &entity_id, role_index))
        .collect::<SamlResult<Vec<_>>>()?;

    Ok(Metadata {
        id: root.id().map(str::to_string),
        cache_duration_millis: cache_duration(root)?,
        valid_until: valid_until(root)?,
        providers,
        signature: None,
        entity_id,
    })
}

fn translate_role(element: &XmlElement, entity_id: &str, role_index: usize) -> SamlResult<Provider> {
    let protocols = protocols(element);

    if element.is(MD_NS, "SPSSODescriptor") {
        return Ok(Provider::ServiceProvider(ServiceProviderRole {
            info: provider_info(element, entity_id, role_index)?,
            authn_requests_signed: boolean(element, "AuthnRequestsSigned")?,
            want_assertions_signed: boolean(element, "WantAssertionsSigned")?,
            assertion_consumer_services: endpoints(element, "AssertionConsumerService")?,
        }));
    }

    if element.is(MD_NS, "IDPSSODescriptor") {
        return Ok(Provider::IdentityProvider(IdentityProviderRole {
            info: provider_info(element, entity_id, role_index)?,
            want_authn_requests_signed: boolean(element, "WantAuthnRequestsSigned")?,
            single_sign_on_services: endpoints(element, "SingleSignOnService")?,
            name_id_mapping_services: endpoints(element, "NameIDMappingService")?,
        }));
    }

    let xsi_type = element
        .attributes
        .iter()
        .find(|a| a.namespace.as_deref() == Some(XSI_NS) && a.local_name == "type")
        .map(|a| a.value.clone());
    tracing::debug!(
        entity_id,
        role = %element.qualified_name(),
        xsi_type = xsi_type.as_deref().unwrap_or(""),
        "keeping unsupported role descriptor as unknown"
    );
    Ok(Provider::Unknown(UnknownRole {
        element_name: element.qualified_name(),
        xsi_type,
        protocols,
    }))
}

fn provider_info(element: &XmlElement, entity_id: &str, role_index: usize) -> SamlResult<ProviderInfo> {
    Ok(ProviderInfo {
        id: element.id().map(str::to_string),
        valid_until: valid_until(element)?,
        cache_duration_millis: cache_duration(element)?,
        protocols: protocols(element),
        keys: keys(element, entity_id, role_index),
        name_id_formats: element
            .children_named(MD_NS, "NameIDFormat")
            .map(|el| {
                let uri = el.text();
                NameIdFormat::from_uri(uri.trim()).unwrap_or_default()
            })
            .collect(),
        artifact_resolution_services: endpoints(element, "ArtifactResolutionService")?,
        single_logout_services: endpoints(element, "SingleLogoutService")?,
        manage_name_id_services: endpoints(element, "ManageNameIDService")?,
    })
}

fn protocols(element: &XmlElement) -> Vec<String> {
    element
        .attribute("protocolSupportEnumeration")
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn keys(element: &XmlElement, entity_id: &str, role_index: usize) -> Vec<SimpleKey> {
    element
        .children_named(MD_NS, "KeyDescriptor")
        .enumerate()
        .filter_map(|(key_index, descriptor)| {
            let key_info = descriptor.child(XMLDSIG_NS, "KeyInfo");
            let certificate = key_info
                .and_then(|k| k.child(XMLDSIG_NS, "X509Data"))
                .and_then(|d| d.child_text(XMLDSIG_NS, "X509Certificate"));
            let alias = key_info
                .and_then(|k| k.child_text(XMLDSIG_NS, "KeyName"))
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("{entity_id}#{role_index}-{key_index}"));

            let Some(certificate) = certificate else {
                tracing::warn!(entity_id, alias = %alias, "key descriptor without certificate ignored");
                return None;
            };

            let key_type = match descriptor.attribute("use") {
                Some("signing") => KeyType::Signing,
                Some("encryption") => KeyType::Encryption,
                _ => KeyType::Unspecified,
            };
            Some(
                SimpleKey::new(alias)
                    .with_certificate(certificate)
                    .with_key_type(key_type),
            )
        })
        .collect()
}

fn endpoints(element: &XmlElement, local_name: &str) -> SamlResult<Vec<Endpoint>> {
    let mut out = Vec::new();
    for el in element.children_named(MD_NS, local_name) {
        let binding_uri = el.attribute("Binding").unwrap_or_default();
        let Some(binding) = SamlBinding::from_uri(binding_uri) else {
            tracing::warn!(endpoint = local_name, binding = binding_uri, "dropping endpoint with unknown binding");
            continue;
        };
        let location = el.attribute("Location").ok_or_else(|| {
            SamlError::MetadataFormat(format!("{local_name} without Location"))
        })?;
        let index = el
            .attribute("index")
            .map(|value| {
                value.trim().parse::<u32>().map_err(|_| {
                    SamlError::MetadataFormat(format!("{local_name} has invalid index '{value}'"))
                })
            })
            .transpose()?;
        let is_default = el
            .attribute("isDefault")
            .map(|value| parse_boolean(value, "isDefault"))
            .transpose()?;

        out.push(Endpoint {
            binding,
            location: location.to_string(),
            response_location: el.attribute("ResponseLocation").map(str::to_string),
            index,
            is_default,
        });
    }
    Ok(out)
}

fn boolean(element: &XmlElement, attribute: &str) -> SamlResult<bool> {
    element
        .attribute(attribute)
        .map_or(Ok(false), |value| parse_boolean(value, attribute))
}

fn parse_boolean(value: &str, attribute: &str) -> SamlResult<bool> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(SamlError::MetadataFormat(format!(
            "{attribute} is not a boolean: '{other}'"
        ))),
    }
}

fn cache_duration(element: &XmlElement) -> SamlResult<i64> {
    let duration = element
        .attribute("cacheDuration")
        .map(str::parse::<XsDuration>)
        .transpose()?;
    Ok(to_millis(duration.as_ref()))
}

fn valid_until(element: &XmlElement) -> SamlResult<Option<chrono::DateTime<chrono::Utc>>> {
    element
        .attribute("validUntil")
        .map(|value| {
            parse_instant(value, "validUntil").map_err(|e| SamlError::MetadataFormat(e.to_string()))
        })
        .transpose()
}
