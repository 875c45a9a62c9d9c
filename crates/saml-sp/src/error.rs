//! SAML error types.
//!
//! Every failure maps onto one [`ErrorKind`]. The authentication pipeline
//! turns any of them into a rejection; metadata resolution and signing hand
//! them to the caller.

use std::fmt;

use thiserror::Error;

/// Result type for SAML operations.
pub type SamlResult<T> = Result<T, SamlError>;

/// Coarse error classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed XML or an unexpected document shape.
    Parse,
    /// A key could not be turned into a usable credential.
    CredentialResolution,
    /// Missing, malformed or cryptographically invalid signature.
    Signature,
    /// A semantic rule of the response was violated.
    Validation,
    /// No trusted provider is known for the asserted issuer.
    UnknownIssuer,
    /// Transport encoding (base64, deflate, UTF-8) could not be undone.
    Decode,
    /// The engine was misconfigured or used before initialization.
    Configuration,
    /// Unexpected internal failure.
    Internal,
}

/// Response validation rules, reported with [`SamlError::Validation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationRule {
    /// SAML version must be 2.0.
    Version,
    /// Top-level status must be Success.
    Status,
    /// Response issue instant must lie within the allowed clock skew.
    IssueInstant,
    /// Destination must be the ACS URL the response arrived on.
    Destination,
    /// Issuers must match the entity whose key verified the signature.
    Issuer,
    /// At least one assertion must be present.
    AssertionPresent,
    /// Assertion conditions NotBefore / NotOnOrAfter.
    TimeWindow,
    /// Audience restriction must name the local entity.
    Audience,
    /// A usable bearer subject confirmation must be present.
    SubjectConfirmation,
    /// The authentication event must not be too old.
    AuthenticationAge,
    /// InResponseTo must consume an outstanding request id.
    InResponseTo,
}

impl ValidationRule {
    /// Returns the rule name used in log output.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Status => "status",
            Self::IssueInstant => "issue-instant",
            Self::Destination => "destination",
            Self::Issuer => "issuer",
            Self::AssertionPresent => "assertion-present",
            Self::TimeWindow => "time-window",
            Self::Audience => "audience",
            Self::SubjectConfirmation => "subject-confirmation",
            Self::AuthenticationAge => "authentication-age",
            Self::InResponseTo => "in-response-to",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SAML Service Provider errors.
#[derive(Debug, Error)]
pub enum SamlError {
    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    XmlParse(String),

    /// Missing required element or attribute.
    #[error("missing required element: {0}")]
    MissingElement(String),

    /// Document root is not the expected element.
    #[error("unexpected root element: expected {expected}, found {actual}")]
    UnexpectedRoot {
        /// The expected element name.
        expected: String,
        /// The element actually found.
        actual: String,
    },

    /// Metadata document is structurally unusable.
    #[error("malformed metadata: {0}")]
    MetadataFormat(String),

    /// Credential resolution failed.
    #[error("credential resolution failed: {0}")]
    CredentialResolution(String),

    /// XML signature validation failed.
    #[error("signature validation failed: {0}")]
    SignatureInvalid(String),

    /// XML signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureCreation(String),

    /// A response validation rule failed.
    #[error("{rule} check failed: {reason}")]
    Validation {
        /// The violated rule.
        rule: ValidationRule,
        /// Human readable detail, for logs only.
        reason: String,
    },

    /// Unknown identity provider.
    #[error("unknown identity provider: {0}")]
    UnknownIdentityProvider(String),

    /// Base64 decoding error.
    #[error("base64 decode error: {0}")]
    Base64Decode(String),

    /// Deflate decompression error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// Invalid inbound request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Misconfiguration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SamlError {
    /// Creates a validation error for `rule`.
    pub fn validation(rule: ValidationRule, reason: impl Into<String>) -> Self {
        Self::Validation {
            rule,
            reason: reason.into(),
        }
    }

    /// Returns the error class.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::XmlParse(_)
            | Self::MissingElement(_)
            | Self::UnexpectedRoot { .. }
            | Self::MetadataFormat(_) => ErrorKind::Parse,
            Self::CredentialResolution(_) => ErrorKind::CredentialResolution,
            Self::SignatureInvalid(_) | Self::SignatureCreation(_) => ErrorKind::Signature,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::UnknownIdentityProvider(_) => ErrorKind::UnknownIssuer,
            Self::Base64Decode(_) | Self::Deflate(_) | Self::InvalidRequest(_) => ErrorKind::Decode,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns the violated rule for validation errors.
    #[must_use]
    pub const fn validation_rule(&self) -> Option<ValidationRule> {
        match self {
            Self::Validation { rule, .. } => Some(*rule),
            _ => None,
        }
    }

    /// Returns the HTTP status a front end should answer with.
    ///
    /// Every authentication failure shares one status so that the cause is
    /// not observable remotely.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Parse
            | ErrorKind::Signature
            | ErrorKind::Validation
            | ErrorKind::UnknownIssuer
            | ErrorKind::Decode => 401,
            ErrorKind::CredentialResolution | ErrorKind::Configuration | ErrorKind::Internal => 500,
        }
    }
}

impl From<quick_xml::Error> for SamlError {
    fn from(err: quick_xml::Error) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for SamlError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Self::XmlParse(err.to_string())
    }
}

impl From<base64::DecodeError> for SamlError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64Decode(err.to_string())
    }
}

impl From<std::io::Error> for SamlError {
    fn from(err: std::io::Error) -> Self {
        Self::Deflate(err.to_string())
    }
}
