//! SAML 2.0 protocol types.
//!
//! Responses and assertions are read from parsed XML and keep the element they
//! came from, which is what their signatures are checked against.

mod assertion;
mod authn_request;
mod constants;
mod name_id;
mod response;
mod status;

pub use assertion::*;
pub use authn_request::*;
pub use constants::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::xml::XmlElement;

/// Parses an `xs:dateTime` attribute value.
pub(crate) fn parse_instant(value: &str, what: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::XmlParse(format!("invalid {what} '{value}': {e}")))
}

/// Reads an optional `xs:dateTime` attribute.
pub(crate) fn optional_instant(
    element: &XmlElement,
    attribute: &str,
) -> SamlResult<Option<DateTime<Utc>>> {
    element
        .attribute(attribute)
        .map(|value| parse_instant(value, attribute))
        .transpose()
}

/// Reads a mandatory attribute.
pub(crate) fn required_attribute<'a>(element: &'a XmlElement, attribute: &str) -> SamlResult<&'a str> {
    element.attribute(attribute).ok_or_else(|| {
        SamlError::MissingElement(format!("{}/@{attribute}", element.local_name))
    })
}

/// Formats an instant the way SAML documents carry it.
#[must_use]
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generates a fresh message identifier.
///
/// The value starts with an underscore so it is a valid `xs:ID`.
#[must_use]
pub fn generate_id() -> String {
    format!("_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn instants_parse_with_and_without_fraction() {
        let a = parse_instant("2024-03-01T10:00:00Z", "t").unwrap();
        let b = parse_instant("2024-03-01T10:00:00.000Z", "t").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
        assert!(parse_instant("yesterday", "t").is_err());
    }

    #[test]
    fn format_uses_millis_and_z() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(format_instant(t), "2024-03-01T10:00:00.000Z");
    }

    #[test]
    fn ids_are_unique_ncnames() {
        let a = generate_id();
        let b = generate_id();
        assert!(a.starts_with('_'));
        assert_ne!(a, b);
    }
}
