//! Authentication pipeline for the assertion consumer service.
//!
//! One run per HTTP request:
//!
//! ```text
//! Idle -> Matched -> Decoded -> Parsed -> IdpLocated -> SignatureVerified
//!      -> SemanticallyValidated -> Authenticated
//! ```
//!
//! Any failure moves to `Rejected`. Signatures are always checked before the
//! response content is validated, and the reason for a rejection is only
//! logged, never handed back to the caller's client.

mod provider;
mod request;

pub use provider::*;
pub use request::*;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bindings::decode_saml_message;
use crate::credential::verification_credentials;
use crate::error::{SamlError, SamlResult, ValidationRule};
use crate::metadata::Metadata;
use crate::signature::XmlSignatureValidator;
use crate::types::{Assertion, Response};
use crate::validation::{ResponseValidator, ValidationContext};
use crate::xml::XmlContext;

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineState {
    /// Nothing happened yet.
    Idle,
    /// The request targets the ACS and carries a response.
    Matched,
    /// The response parameter was decoded.
    Decoded,
    /// The response XML was parsed.
    Parsed,
    /// The issuing IdP is trusted.
    IdpLocated,
    /// All required signatures verified.
    SignatureVerified,
    /// All protocol rules passed.
    SemanticallyValidated,
    /// Terminal success.
    Authenticated,
    /// Terminal failure.
    Rejected,
}

impl PipelineState {
    /// Returns the state name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Matched => "matched",
            Self::Decoded => "decoded",
            Self::Parsed => "parsed",
            Self::IdpLocated => "idp-located",
            Self::SignatureVerified => "signature-verified",
            Self::SemanticallyValidated => "semantically-validated",
            Self::Authenticated => "authenticated",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A successful SAML authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamlAuthentication {
    /// Always true for values produced by the pipeline.
    pub authenticated: bool,
    /// The first assertion of the response.
    pub assertion: Assertion,
    /// Entity ID of the asserting IdP.
    pub remote_entity_id: String,
    /// Entity ID of the hosted service provider.
    pub hosted_entity_id: String,
    /// `RelayState` as received.
    pub relay_state: Option<String>,
}

impl SamlAuthentication {
    /// The subject's name identifier.
    #[must_use]
    pub fn principal_name(&self) -> Option<&str> {
        self.assertion.name_id().map(|n| n.value.as_str())
    }
}

/// Why a request was rejected.
#[derive(Debug)]
pub struct Rejection {
    /// Last state reached before the failure.
    pub state: PipelineState,
    /// The internal error; never shown to the remote party.
    pub error: SamlError,
}

impl Rejection {
    /// The message to show the remote party, whatever the cause.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        "SAML authentication failed"
    }
}

/// Result of one pipeline run.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The request is not for the ACS, or carries no response.
    NotApplicable,
    /// The response authenticated a user.
    Authenticated(Box<SamlAuthentication>),
    /// The response was refused.
    Rejected(Rejection),
}

impl PipelineOutcome {
    /// Returns the authentication, if any.
    #[must_use]
    pub fn authentication(&self) -> Option<&SamlAuthentication> {
        match self {
            Self::Authenticated(authentication) => Some(authentication),
            _ => None,
        }
    }

    /// Returns the rejection, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

/// Processes responses posted to the hosted provider's ACS.
#[derive(Debug, Clone)]
pub struct AuthenticationPipeline {
    provider: Arc<HostedServiceProvider>,
    context: Arc<XmlContext>,
    validator: ResponseValidator,
    signatures: XmlSignatureValidator,
}

impl AuthenticationPipeline {
    /// Creates a pipeline, initializing `context` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if the context cannot be
    /// initialized.
    pub fn new(provider: Arc<HostedServiceProvider>, context: Arc<XmlContext>) -> SamlResult<Self> {
        context.initialize()?;
        let config = provider.config();
        let validator = ResponseValidator::new(Arc::clone(provider.request_ids()))
            .with_clock_skew(config.clock_skew())
            .with_max_authentication_age(config.max_authentication_age())
            .allow_unsolicited(config.allow_unsolicited_responses);
        let signatures =
            XmlSignatureValidator::new(config.verification_mode).allow_sha1(config.allow_sha1);

        Ok(Self {
            provider,
            context,
            validator,
            signatures,
        })
    }

    /// The hosted provider.
    #[must_use]
    pub fn provider(&self) -> &Arc<HostedServiceProvider> {
        &self.provider
    }

    /// Whether the pipeline engages for `request`.
    #[must_use]
    pub fn matches(&self, request: &impl SamlHttpRequest) -> bool {
        let config = self.provider.config();
        request.path() == config.acs_path
            && config
                .acs_methods
                .iter()
                .any(|m| m.eq_ignore_ascii_case(request.method()))
            && request
                .parameter("SAMLResponse")
                .is_some_and(|value| !value.trim().is_empty())
    }

    /// Processes `request` against the current time.
    pub fn process(&self, request: &impl SamlHttpRequest) -> PipelineOutcome {
        self.process_at(request, Utc::now())
    }

    /// Processes `request` as of `now`.
    pub fn process_at(&self, request: &impl SamlHttpRequest, now: DateTime<Utc>) -> PipelineOutcome {
        if !self.matches(request) {
            return PipelineOutcome::NotApplicable;
        }

        let mut state = PipelineState::Matched;
        match self.run(request, now, &mut state) {
            Ok(authentication) => {
                tracing::info!(
                    remote_entity_id = %authentication.remote_entity_id,
                    hosted_entity_id = %authentication.hosted_entity_id,
                    principal = authentication.principal_name().unwrap_or(""),
                    "SAML authentication succeeded"
                );
                PipelineOutcome::Authenticated(Box::new(authentication))
            }
            Err(error) => {
                tracing::debug!(
                    %state,
                    kind = ?error.kind(),
                    rule = error.validation_rule().map_or("", |r| r.name()),
                    %error,
                    "SAML response rejected"
                );
                PipelineOutcome::Rejected(Rejection { state, error })
            }
        }
    }

    fn run(
        &self,
        request: &impl SamlHttpRequest,
        now: DateTime<Utc>,
        state: &mut PipelineState,
    ) -> SamlResult<SamlAuthentication> {
        let parameter = request
            .parameter("SAMLResponse")
            .ok_or_else(|| SamlError::InvalidRequest("no SAMLResponse parameter".to_string()))?;
        let is_redirect = request.method().eq_ignore_ascii_case("GET");
        let xml = decode_saml_message(parameter, is_redirect)?;
        *state = PipelineState::Decoded;

        let mut response = Response::from_element(self.context.parse(&xml)?)?;
        *state = PipelineState::Parsed;

        let idp = self.locate_identity_provider(&response)?;
        *state = PipelineState::IdpLocated;

        self.verify_signatures(&mut response, &idp)?;
        *state = PipelineState::SignatureVerified;

        let acs_url = request.endpoint_url();
        self.check_consumer_url(acs_url)?;
        let context = ValidationContext {
            hosted_entity_id: self.provider.entity_id(),
            acs_url,
            remote_entity_id: &idp.entity_id,
        };
        self.validator.validate_at(&response, &context, now)?;
        *state = PipelineState::SemanticallyValidated;

        let remote_entity_id = response
            .origin_entity_id()
            .unwrap_or(&idp.entity_id)
            .to_string();
        let assertion = response
            .assertions
            .into_iter()
            .next()
            .ok_or_else(|| SamlError::Internal("validated response without assertion".to_string()))?;
        *state = PipelineState::Authenticated;

        Ok(SamlAuthentication {
            authenticated: true,
            assertion,
            remote_entity_id,
            hosted_entity_id: self.provider.entity_id().to_string(),
            relay_state: request.parameter("RelayState").map(str::to_string),
        })
    }

    /// The request URL may be derived from proxy headers, so it only stands in
    /// for the expected destination when it is one of our own ACS locations.
    fn check_consumer_url(&self, acs_url: &str) -> SamlResult<()> {
        let configured = self
            .provider
            .service_provider()
            .assertion_consumer_services
            .iter()
            .any(|endpoint| endpoint.location == acs_url);
        if configured {
            Ok(())
        } else {
            Err(SamlError::validation(
                ValidationRule::Destination,
                format!("'{acs_url}' is not a configured assertion consumer service"),
            ))
        }
    }

    fn locate_identity_provider(&self, response: &Response) -> SamlResult<Arc<Metadata>> {
        let entity_id = response
            .first_assertion()
            .map(|a| a.issuer.as_str())
            .or(response.issuer.as_deref())
            .ok_or_else(|| SamlError::UnknownIdentityProvider("response names no issuer".to_string()))?;

        self.provider
            .remote_provider(entity_id)
            .filter(|metadata| metadata.identity_provider().is_some())
            .ok_or_else(|| SamlError::UnknownIdentityProvider(entity_id.to_string()))
    }

    fn verify_signatures(&self, response: &mut Response, idp: &Metadata) -> SamlResult<()> {
        let keys = idp
            .identity_provider()
            .map(|role| verification_credentials(&role.info.keys))
            .unwrap_or_default();
        let config = self.provider.config();

        let response_signed = response.has_signature();
        if response_signed {
            let signature = self.signatures.verify(&*response, &keys)?;
            response.signature = Some(signature);
        } else if config.require_signed_response {
            return Err(SamlError::SignatureInvalid("response is not signed".to_string()));
        }

        let unsigned_allowed = response_signed
            && config.trust_unsigned_assertions
            && !self.provider.service_provider().want_assertions_signed;

        for assertion in &mut response.assertions {
            if assertion.has_signature() {
                let signature = self.signatures.verify(&*assertion, &keys)?;
                assertion.signature = Some(signature);
            } else if !unsigned_allowed {
                return Err(SamlError::SignatureInvalid(format!(
                    "assertion {} is not signed",
                    assertion.id
                )));
            }
        }
        Ok(())
    }
}
