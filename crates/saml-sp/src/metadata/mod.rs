//! SAML metadata.
//!
//! The trust model built from `md:EntityDescriptor` documents: providers,
//! their endpoints, keys and name identifier formats.

mod duration;
mod registry;
mod resolver;
mod writer;

pub use duration::{to_duration, to_millis, XsDuration, UNSPECIFIED_MILLIS};
pub use registry::MetadataRegistry;
pub use resolver::{translate, MetadataResolver};
pub use writer::MetadataWriter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credential::SimpleKey;
use crate::signature::Signature;
use crate::types::{NameIdFormat, SamlBinding};

/// A protocol endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Binding the endpoint speaks.
    pub binding: SamlBinding,
    /// Where messages are sent.
    pub location: String,
    /// Where responses go, if different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_location: Option<String>,
    /// Index of an indexed endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// `isDefault` of an indexed endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl Endpoint {
    /// Creates a plain endpoint.
    #[must_use]
    pub fn new(binding: SamlBinding, location: impl Into<String>) -> Self {
        Self {
            binding,
            location: location.into(),
            response_location: None,
            index: None,
            is_default: None,
        }
    }

    /// Makes this an indexed endpoint.
    #[must_use]
    pub fn indexed(mut self, index: u32, is_default: bool) -> Self {
        self.index = Some(index);
        self.is_default = Some(is_default);
        self
    }
}

/// Data shared by every role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderInfo {
    /// The role descriptor's `ID`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Validity deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Cache duration in milliseconds, `-1` when unspecified.
    pub cache_duration_millis: i64,
    /// `protocolSupportEnumeration`.
    pub protocols: Vec<String>,
    /// Keys from `KeyDescriptor`s, in document order.
    pub keys: Vec<SimpleKey>,
    /// Supported name identifier formats.
    pub name_id_formats: Vec<NameIdFormat>,
    /// Artifact resolution endpoints.
    pub artifact_resolution_services: Vec<Endpoint>,
    /// Single logout endpoints.
    pub single_logout_services: Vec<Endpoint>,
    /// Manage-NameID endpoints.
    pub manage_name_id_services: Vec<Endpoint>,
}

impl Default for ProviderInfo {
    fn default() -> Self {
        Self {
            id: None,
            valid_until: None,
            cache_duration_millis: UNSPECIFIED_MILLIS,
            protocols: Vec::new(),
            keys: Vec::new(),
            name_id_formats: Vec::new(),
            artifact_resolution_services: Vec::new(),
            single_logout_services: Vec::new(),
            manage_name_id_services: Vec::new(),
        }
    }
}

/// Service provider role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceProviderRole {
    /// Shared role data.
    #[serde(flatten)]
    pub info: ProviderInfo,
    /// `AuthnRequestsSigned`.
    pub authn_requests_signed: bool,
    /// `WantAssertionsSigned`.
    pub want_assertions_signed: bool,
    /// Assertion consumer endpoints, in document order.
    pub assertion_consumer_services: Vec<Endpoint>,
}

impl ServiceProviderRole {
    /// Returns the default assertion consumer service.
    ///
    /// That is the one marked default, else the first not marked
    /// non-default, else the first.
    #[must_use]
    pub fn default_acs(&self) -> Option<&Endpoint> {
        let services = &self.assertion_consumer_services;
        services
            .iter()
            .find(|e| e.is_default == Some(true))
            .or_else(|| services.iter().find(|e| e.is_default.is_none()))
            .or_else(|| services.first())
    }
}

/// Identity provider role.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityProviderRole {
    /// Shared role data.
    #[serde(flatten)]
    pub info: ProviderInfo,
    /// `WantAuthnRequestsSigned`.
    pub want_authn_requests_signed: bool,
    /// Single sign-on endpoints.
    pub single_sign_on_services: Vec<Endpoint>,
    /// NameID mapping endpoints.
    pub name_id_mapping_services: Vec<Endpoint>,
}

impl IdentityProviderRole {
    /// Returns the first single sign-on endpoint with the given binding.
    #[must_use]
    pub fn sso_endpoint(&self, binding: SamlBinding) -> Option<&Endpoint> {
        self.single_sign_on_services
            .iter()
            .find(|e| e.binding == binding)
    }
}

/// A role descriptor kind this engine does not model.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnknownRole {
    /// Element name as written, e.g. `md:PDPDescriptor`.
    pub element_name: String,
    /// `xsi:type` of a generic `md:RoleDescriptor`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xsi_type: Option<String>,
    /// `protocolSupportEnumeration`.
    pub protocols: Vec<String>,
}

/// A role of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum Provider {
    /// `md:SPSSODescriptor`.
    ServiceProvider(ServiceProviderRole),
    /// `md:IDPSSODescriptor`.
    IdentityProvider(IdentityProviderRole),
    /// Any other role descriptor, kept in place.
    Unknown(UnknownRole),
}

impl Provider {
    /// Returns the shared role data, absent for unknown roles.
    #[must_use]
    pub fn info(&self) -> Option<&ProviderInfo> {
        match self {
            Self::ServiceProvider(sp) => Some(&sp.info),
            Self::IdentityProvider(idp) => Some(&idp.info),
            Self::Unknown(_) => None,
        }
    }

    /// Returns the role's keys.
    #[must_use]
    pub fn keys(&self) -> &[SimpleKey] {
        self.info().map_or(&[], |info| info.keys.as_slice())
    }

    /// Returns the supported protocols.
    #[must_use]
    pub fn protocols(&self) -> &[String] {
        match self {
            Self::ServiceProvider(sp) => &sp.info.protocols,
            Self::IdentityProvider(idp) => &idp.info.protocols,
            Self::Unknown(unknown) => &unknown.protocols,
        }
    }
}

/// A resolved `md:EntityDescriptor`.
///
/// Immutable once built; a changed document is resolved into a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// `entityID`.
    pub entity_id: String,
    /// `ID`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Cache duration in milliseconds, `-1` when unspecified.
    #[serde(default = "unspecified")]
    pub cache_duration_millis: i64,
    /// Validity deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    /// Roles in document order.
    #[serde(default)]
    pub providers: Vec<Provider>,
    /// The verified document signature.
    #[serde(skip)]
    pub signature: Option<Signature>,
}

const fn unspecified() -> i64 {
    UNSPECIFIED_MILLIS
}

impl Metadata {
    /// Creates metadata with no roles.
    #[must_use]
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            id: None,
            cache_duration_millis: UNSPECIFIED_MILLIS,
            valid_until: None,
            providers: Vec::new(),
            signature: None,
        }
    }

    /// Adds a role.
    #[must_use]
    pub fn with_provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Returns the first service provider role.
    #[must_use]
    pub fn service_provider(&self) -> Option<&ServiceProviderRole> {
        self.providers.iter().find_map(|p| match p {
            Provider::ServiceProvider(sp) => Some(sp),
            _ => None,
        })
    }

    /// Returns the first identity provider role.
    #[must_use]
    pub fn identity_provider(&self) -> Option<&IdentityProviderRole> {
        self.providers.iter().find_map(|p| match p {
            Provider::IdentityProvider(idp) => Some(idp),
            _ => None,
        })
    }

    /// Returns true once `valid_until` has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until.is_some_and(|until| now >= until)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acs(index: u32, is_default: Option<bool>) -> Endpoint {
        Endpoint {
            index: Some(index),
            is_default,
            ..Endpoint::new(SamlBinding::HttpPost, format!("https://sp/acs/{index}"))
        }
    }

    #[test]
    fn default_acs_selection() {
        let mut sp = ServiceProviderRole {
            assertion_consumer_services: vec![acs(0, Some(false)), acs(1, None), acs(2, Some(true))],
            ..ServiceProviderRole::default()
        };
        assert_eq!(sp.default_acs().and_then(|e| e.index), Some(2));

        sp.assertion_consumer_services.truncate(2);
        assert_eq!(sp.default_acs().and_then(|e| e.index), Some(1));

        sp.assertion_consumer_services.truncate(1);
        assert_eq!(sp.default_acs().and_then(|e| e.index), Some(0));
    }

    #[test]
    fn role_lookup() {
        let metadata = Metadata::new("urn:idp")
            .with_provider(Provider::Unknown(UnknownRole {
                element_name: "md:PDPDescriptor".to_string(),
                ..UnknownRole::default()
            }))
            .with_provider(Provider::IdentityProvider(IdentityProviderRole {
                single_sign_on_services: vec![Endpoint::new(SamlBinding::HttpRedirect, "https://idp/sso")],
                ..IdentityProviderRole::default()
            }));

        assert!(metadata.service_provider().is_none());
        let idp = metadata.identity_provider().unwrap();
        assert!(idp.sso_endpoint(SamlBinding::HttpRedirect).is_some());
        assert!(idp.sso_endpoint(SamlBinding::HttpPost).is_none());
        assert!(metadata.providers[0].keys().is_empty());
        assert_eq!(metadata.cache_duration_millis, -1);
    }

    #[test]
    fn serde_round_trip_keeps_roles() {
        let metadata = Metadata::new("urn:sp").with_provider(Provider::ServiceProvider(
            ServiceProviderRole {
                want_assertions_signed: true,
                assertion_consumer_services: vec![acs(0, Some(true))],
                ..ServiceProviderRole::default()
            },
        ));

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(json.contains(r#""role":"service-provider""#));
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metadata);
    }
}
