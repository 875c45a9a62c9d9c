//! SAML Response types.
//!
//! The response an identity provider posts to the assertion consumer service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::signature::Signature;
use crate::xml::XmlElement;

use super::{
    parse_instant, required_attribute, Assertion, Status, SAMLP_NS, SAML_NS, XMLDSIG_NS,
};

/// SAML Response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Unique identifier for this response.
    pub id: String,

    /// Version of the SAML protocol.
    pub version: String,

    /// Timestamp when this response was issued.
    pub issue_instant: DateTime<Utc>,

    /// The URL this response was addressed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    /// The ID of the request this response is for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// The entity ID of the identity provider, when the response names it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// The status of the response.
    pub status: Status,

    /// Plain assertions, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,

    /// Number of `EncryptedAssertion` children. They are not decrypted.
    #[serde(default)]
    pub encrypted_assertions: usize,

    /// The response signature once it has been verified.
    #[serde(skip)]
    pub signature: Option<Signature>,

    /// The element this response was read from.
    #[serde(skip)]
    pub element: XmlElement,
}

impl Response {
    /// Reads a `samlp:Response` document root.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnexpectedRoot`] for any other root and a parse
    /// error when mandatory parts are missing.
    pub fn from_element(element: XmlElement) -> SamlResult<Self> {
        if !element.is(SAMLP_NS, "Response") {
            return Err(SamlError::UnexpectedRoot {
                expected: "samlp:Response".to_string(),
                actual: element.qualified_name(),
            });
        }

        let id = required_attribute(&element, "ID")?.to_string();
        let version = required_attribute(&element, "Version")?.to_string();
        let issue_instant = parse_instant(required_attribute(&element, "IssueInstant")?, "IssueInstant")?;
        let status = element
            .child(SAMLP_NS, "Status")
            .ok_or_else(|| SamlError::MissingElement("Response/Status".to_string()))
            .and_then(Status::from_element)?;
        let assertions = element
            .children_named(SAML_NS, "Assertion")
            .map(|a| Assertion::from_element(a.clone()))
            .collect::<SamlResult<Vec<_>>>()?;
        let encrypted_assertions = element.children_named(SAML_NS, "EncryptedAssertion").count();
        if encrypted_assertions > 0 {
            tracing::debug!(
                count = encrypted_assertions,
                "encrypted assertions are not processed"
            );
        }

        Ok(Self {
            id,
            version,
            issue_instant,
            destination: element.attribute("Destination").map(str::to_string),
            in_response_to: element.attribute("InResponseTo").map(str::to_string),
            issuer: element.child_text(SAML_NS, "Issuer"),
            status,
            assertions,
            encrypted_assertions,
            signature: None,
            element,
        })
    }

    /// Returns the entity the response claims to come from.
    ///
    /// The response issuer wins; otherwise the issuer of the first assertion.
    #[must_use]
    pub fn origin_entity_id(&self) -> Option<&str> {
        self.issuer
            .as_deref()
            .or_else(|| self.assertions.first().map(|a| a.issuer.as_str()))
    }

    /// Returns the first assertion if present.
    #[must_use]
    pub fn first_assertion(&self) -> Option<&Assertion> {
        self.assertions.first()
    }

    /// Returns true if the status is Success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the response element carries an enveloped signature.
    #[must_use]
    pub fn has_signature(&self) -> bool {
        self.element.child(XMLDSIG_NS, "Signature").is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlParser;

    fn parse(xml: &str) -> SamlResult<Response> {
        Response::from_element(XmlParser::new().parse(xml)?)
    }

    #[test]
    fn reads_response_with_assertion() {
        let response = parse(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0" IssueInstant="2024-03-01T10:00:00Z" Destination="https://sp/acs" InResponseTo="req-1">
  <saml:Issuer>https://idp</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_a1" Version="2.0" IssueInstant="2024-03-01T10:00:00Z"><saml:Issuer>https://idp</saml:Issuer></saml:Assertion>
  <saml:EncryptedAssertion/>
</samlp:Response>"#,
        )
        .unwrap();

        assert_eq!(response.id, "_r1");
        assert_eq!(response.destination.as_deref(), Some("https://sp/acs"));
        assert_eq!(response.in_response_to.as_deref(), Some("req-1"));
        assert!(response.is_success());
        assert_eq!(response.assertions.len(), 1);
        assert_eq!(response.encrypted_assertions, 1);
        assert!(!response.has_signature());
        assert_eq!(response.origin_entity_id(), Some("https://idp"));
    }

    #[test]
    fn origin_falls_back_to_assertion_issuer() {
        let response = parse(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0" IssueInstant="2024-03-01T10:00:00Z">
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:Assertion ID="_a1" Version="2.0" IssueInstant="2024-03-01T10:00:00Z"><saml:Issuer>https://idp-a</saml:Issuer></saml:Assertion>
</samlp:Response>"#,
        )
        .unwrap();
        assert_eq!(response.issuer, None);
        assert_eq!(response.origin_entity_id(), Some("https://idp-a"));
    }

    #[test]
    fn wrong_root_is_rejected() {
        let err = parse(r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion"/>"#).unwrap_err();
        assert!(matches!(err, SamlError::UnexpectedRoot { .. }));
    }

    #[test]
    fn status_is_mandatory() {
        let err = parse(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" ID="_r" Version="2.0" IssueInstant="2024-03-01T10:00:00Z"/>"#,
        )
        .unwrap_err();
        assert!(matches!(err, SamlError::MissingElement(_)));
    }
}
