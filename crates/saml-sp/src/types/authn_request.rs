//! SAML AuthnRequest types.
//!
//! The request a service provider sends to start single sign-on. Its ID is
//! what a later response must echo in `InResponseTo`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::xml::{to_xml_string, XmlElement};

use super::{format_instant, generate_id, NameIdFormat, SamlBinding, SAMLP_NS, SAML_NS, SAML_VERSION};

/// SAML Authentication Request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnRequest {
    /// Unique identifier for this request.
    pub id: String,

    /// Timestamp when this request was issued.
    pub issue_instant: DateTime<Utc>,

    /// The entity ID of the service provider issuing the request.
    pub issuer: String,

    /// The identity provider endpoint the request is sent to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The URL where the response should be sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion_consumer_service_url: Option<String>,

    /// Binding to use for the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_binding: Option<SamlBinding>,

    /// Requested name identifier format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id_format: Option<NameIdFormat>,

    /// Whether the IdP may create a new identifier for the principal.
    #[serde(default)]
    pub allow_create: bool,

    /// Whether the IdP must authenticate the user directly.
    #[serde(default)]
    pub force_authn: bool,

    /// Whether the IdP must not interact with the user.
    #[serde(default)]
    pub is_passive: bool,
}

impl AuthnRequest {
    /// Creates a request with a fresh ID issued now.
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            issue_instant: Utc::now(),
            issuer: issuer.into(),
            destination: None,
            assertion_consumer_service_url: None,
            protocol_binding: None,
            name_id_format: None,
            allow_create: false,
            force_authn: false,
            is_passive: false,
        }
    }

    /// Sets the destination URL.
    #[must_use]
    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }

    /// Sets the assertion consumer service URL.
    #[must_use]
    pub fn with_acs_url(mut self, url: impl Into<String>) -> Self {
        self.assertion_consumer_service_url = Some(url.into());
        self
    }

    /// Sets the protocol binding for the response.
    #[must_use]
    pub fn with_binding(mut self, binding: SamlBinding) -> Self {
        self.protocol_binding = Some(binding);
        self
    }

    /// Sets the requested name ID format.
    #[must_use]
    pub fn with_name_id_format(mut self, format: NameIdFormat, allow_create: bool) -> Self {
        self.name_id_format = Some(format);
        self.allow_create = allow_create;
        self
    }

    /// Requests re-authentication.
    #[must_use]
    pub fn force_authn(mut self, force: bool) -> Self {
        self.force_authn = force;
        self
    }

    /// Builds the `samlp:AuthnRequest` element.
    #[must_use]
    pub fn to_element(&self) -> XmlElement {
        let mut root = XmlElement::new(Some("samlp"), SAMLP_NS, "AuthnRequest")
            .with_namespace("samlp", SAMLP_NS)
            .with_namespace("saml", SAML_NS)
            .with_attribute("ID", self.id.as_str())
            .with_attribute("Version", SAML_VERSION)
            .with_attribute("IssueInstant", format_instant(self.issue_instant));

        if let Some(destination) = &self.destination {
            root.set_attribute("Destination", destination.as_str());
        }
        if let Some(acs) = &self.assertion_consumer_service_url {
            root.set_attribute("AssertionConsumerServiceURL", acs.as_str());
        }
        if let Some(binding) = self.protocol_binding {
            root.set_attribute("ProtocolBinding", binding.uri());
        }
        if self.force_authn {
            root.set_attribute("ForceAuthn", "true");
        }
        if self.is_passive {
            root.set_attribute("IsPassive", "true");
        }

        root.push_child(XmlElement::new(Some("saml"), SAML_NS, "Issuer").with_text(self.issuer.as_str()));

        if let Some(format) = self.name_id_format {
            root.push_child(
                XmlElement::new(Some("samlp"), SAMLP_NS, "NameIDPolicy")
                    .with_attribute("Format", format.uri())
                    .with_attribute("AllowCreate", if self.allow_create { "true" } else { "false" }),
            );
        }
        root
    }

    /// Serializes the request without an XML declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        to_xml_string(&self.to_element())
    }
}
