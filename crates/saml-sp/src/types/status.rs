//! SAML Status types.

use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::xml::XmlElement;

use super::{status_codes, SAMLP_NS};

/// SAML protocol status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::new(status_codes::SUCCESS),
            status_message: None,
        }
    }

    /// Reads a `samlp:Status` element.
    ///
    /// # Errors
    ///
    /// Returns an error if the mandatory `StatusCode` is missing.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let code = element
            .child(SAMLP_NS, "StatusCode")
            .ok_or_else(|| SamlError::MissingElement("Status/StatusCode".to_string()))?;

        Ok(Self {
            status_code: StatusCode::from_element(code)?,
            status_message: element.child_text(SAMLP_NS, "StatusMessage"),
        })
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.value == status_codes::SUCCESS
    }
}

/// SAML status code, possibly nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI.
    pub value: String,

    /// Optional nested status code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a status code without a sub-code.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            sub_code: None,
        }
    }

    fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let value = super::required_attribute(element, "Value")?.to_string();
        let sub_code = element
            .child(SAMLP_NS, "StatusCode")
            .map(Self::from_element)
            .transpose()?
            .map(Box::new);
        Ok(Self { value, sub_code })
    }
}
