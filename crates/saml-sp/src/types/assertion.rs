//! SAML Assertion types.
//!
//! Assertions are the core of SAML, containing statements about a subject.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::signature::Signature;
use crate::xml::XmlElement;

use super::{optional_instant, parse_instant, required_attribute, NameId, SAML_NS, XMLDSIG_NS};

/// SAML Assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertion {
    /// Unique identifier for this assertion.
    pub id: String,

    /// SAML version (always "2.0").
    pub version: String,

    /// Time instant of issue.
    pub issue_instant: DateTime<Utc>,

    /// The entity that issued this assertion.
    pub issuer: String,

    /// The subject of the assertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<Subject>,

    /// Conditions under which the assertion is valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Conditions>,

    /// Authentication statements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authn_statements: Vec<AuthnStatement>,

    /// Attribute statements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attribute_statements: Vec<AttributeStatement>,

    /// The assertion's own signature once it has been verified.
    #[serde(skip)]
    pub signature: Option<Signature>,

    /// The element this assertion was read from.
    #[serde(skip)]
    pub element: XmlElement,
}

impl Assertion {
    /// Reads a `saml:Assertion` element.
    ///
    /// # Errors
    ///
    /// Returns an error if mandatory parts are missing or malformed.
    pub fn from_element(element: XmlElement) -> SamlResult<Self> {
        if !element.is(SAML_NS, "Assertion") {
            return Err(SamlError::UnexpectedRoot {
                expected: "Assertion".to_string(),
                actual: element.qualified_name(),
            });
        }

        let id = required_attribute(&element, "ID")?.to_string();
        let version = required_attribute(&element, "Version")?.to_string();
        let issue_instant = parse_instant(required_attribute(&element, "IssueInstant")?, "IssueInstant")?;
        let issuer = element
            .child_text(SAML_NS, "Issuer")
            .ok_or_else(|| SamlError::MissingElement("Assertion/Issuer".to_string()))?;

        let subject = element
            .child(SAML_NS, "Subject")
            .map(Subject::from_element)
            .transpose()?;
        let conditions = element
            .child(SAML_NS, "Conditions")
            .map(Conditions::from_element)
            .transpose()?;
        let authn_statements = element
            .children_named(SAML_NS, "AuthnStatement")
            .map(AuthnStatement::from_element)
            .collect::<SamlResult<Vec<_>>>()?;
        let attribute_statements = element
            .children_named(SAML_NS, "AttributeStatement")
            .map(AttributeStatement::from_element)
            .collect();

        Ok(Self {
            id,
            version,
            issue_instant,
            issuer,
            subject,
            conditions,
            authn_statements,
            attribute_statements,
            signature: None,
            element,
        })
    }

    /// Returns true if the assertion carries its own enveloped signature.
    #[must_use]
    pub fn has_signature(&self) -> bool {
        self.element.child(XMLDSIG_NS, "Signature").is_some()
    }

    /// Returns the subject's name identifier.
    #[must_use]
    pub fn name_id(&self) -> Option<&NameId> {
        self.subject.as_ref().and_then(|s| s.name_id.as_ref())
    }

    /// Iterates over every audience in every audience restriction.
    pub fn audiences(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .flat_map(|c| c.audience_restrictions.iter())
            .flat_map(|r| r.audiences.iter().map(String::as_str))
    }

    /// Returns the first attribute with the given name.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attribute_statements
            .iter()
            .flat_map(|s| s.attributes.iter())
            .find(|a| a.name == name)
    }
}

/// SAML Subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// The name identifier of the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_id: Option<NameId>,

    /// Subject confirmations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subject_confirmations: Vec<SubjectConfirmation>,
}

impl Subject {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            name_id: element.child(SAML_NS, "NameID").map(NameId::from_element),
            subject_confirmations: element
                .children_named(SAML_NS, "SubjectConfirmation")
                .map(SubjectConfirmation::from_element)
                .collect::<SamlResult<Vec<_>>>()?,
        })
    }
}

/// Subject confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectConfirmation {
    /// The confirmation method URI.
    pub method: String,

    /// Confirmation data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_confirmation_data: Option<SubjectConfirmationData>,
}

impl SubjectConfirmation {
    /// Bearer confirmation method.
    pub const BEARER: &'static str = "urn:oasis:names:tc:SAML:2.0:cm:bearer";

    /// Returns true for the bearer method.
    #[must_use]
    pub fn is_bearer(&self) -> bool {
        self.method == Self::BEARER
    }

    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            method: required_attribute(element, "Method")?.to_string(),
            subject_confirmation_data: element
                .child(SAML_NS, "SubjectConfirmationData")
                .map(SubjectConfirmationData::from_element)
                .transpose()?,
        })
    }
}

/// Subject confirmation data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubjectConfirmationData {
    /// Time before which the subject cannot be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at which the subject can no longer be confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// URI of the entity to which the assertion can be presented.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,

    /// ID of the request this is a response to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_response_to: Option<String>,

    /// Network address of the subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl SubjectConfirmationData {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            not_before: optional_instant(element, "NotBefore")?,
            not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
            recipient: element.attribute("Recipient").map(str::to_string),
            in_response_to: element.attribute("InResponseTo").map(str::to_string),
            address: element.attribute("Address").map(str::to_string),
        })
    }
}

/// Assertion conditions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Conditions {
    /// Time before which the assertion is not valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_before: Option<DateTime<Utc>>,

    /// Time at which the assertion expires.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_on_or_after: Option<DateTime<Utc>>,

    /// Audience restrictions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub audience_restrictions: Vec<AudienceRestriction>,

    /// Whether a `OneTimeUse` condition is present.
    #[serde(default)]
    pub one_time_use: bool,
}

impl Conditions {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            not_before: optional_instant(element, "NotBefore")?,
            not_on_or_after: optional_instant(element, "NotOnOrAfter")?,
            audience_restrictions: element
                .children_named(SAML_NS, "AudienceRestriction")
                .map(|restriction| AudienceRestriction {
                    audiences: restriction
                        .children_named(SAML_NS, "Audience")
                        .map(|a| a.text().trim().to_string())
                        .collect(),
                })
                .collect(),
            one_time_use: element.child(SAML_NS, "OneTimeUse").is_some(),
        })
    }

    /// Checks `now` against the validity window, widened by `skew` on
    /// both ends.
    ///
    /// Valid from `not_before` inclusive to `not_on_or_after` exclusive.
    ///
    /// # Errors
    ///
    /// Returns a description of the violated bound.
    pub fn check_window(&self, now: DateTime<Utc>, skew: Duration) -> Result<(), String> {
        if let Some(not_before) = self.not_before {
            if now + skew < not_before {
                return Err(format!("assertion not valid before {not_before}"));
            }
        }
        if let Some(not_on_or_after) = self.not_on_or_after {
            if now - skew >= not_on_or_after {
                return Err(format!("assertion expired at {not_on_or_after}"));
            }
        }
        Ok(())
    }
}

/// Audience restriction condition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AudienceRestriction {
    /// Allowed audiences.
    pub audiences: Vec<String>,
}

/// Authentication statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthnStatement {
    /// Time of authentication.
    pub authn_instant: DateTime<Utc>,

    /// Session index for single logout.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_index: Option<String>,

    /// Time at which the session ends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// Authentication context class reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authn_context_class_ref: Option<String>,
}

impl AuthnStatement {
    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        Ok(Self {
            authn_instant: parse_instant(
                required_attribute(element, "AuthnInstant")?,
                "AuthnInstant",
            )?,
            session_index: element.attribute("SessionIndex").map(str::to_string),
            session_not_on_or_after: optional_instant(element, "SessionNotOnOrAfter")?,
            authn_context_class_ref: element
                .child(SAML_NS, "AuthnContext")
                .and_then(|ctx| ctx.child_text(SAML_NS, "AuthnContextClassRef")),
        })
    }
}

/// Attribute statement.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttributeStatement {
    /// Attributes.
    pub attributes: Vec<Attribute>,
}

impl AttributeStatement {
    fn from_element(element: &XmlElement) -> Self {
        Self {
            attributes: element
                .children_named(SAML_NS, "Attribute")
                .filter_map(Attribute::from_element)
                .collect(),
        }
    }
}

/// SAML Attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,

    /// Attribute name format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_format: Option<String>,

    /// Human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<String>,

    /// Attribute values.
    pub values: Vec<String>,
}

impl Attribute {
    fn from_element(element: &XmlElement) -> Option<Self> {
        let Some(name) = element.attribute("Name") else {
            tracing::debug!("skipping attribute without Name");
            return None;
        };
        Some(Self {
            name: name.to_string(),
            name_format: element.attribute("NameFormat").map(str::to_string),
            friendly_name: element.attribute("FriendlyName").map(str::to_string),
            values: element
                .children_named(SAML_NS, "AttributeValue")
                .map(|v| v.text().trim().to_string())
                .collect(),
        })
    }

    /// Returns the first value.
    #[must_use]
    pub fn first_value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }
}
