//! Protocol-level checks on a parsed, signature-verified response.
//!
//! [`ResponseValidator::validate_at`] applies the rules of
//! [`ValidationRule`] in a fixed order and stops at the first violation.
//! Correlation with an outstanding request runs last, so a response that
//! fails any other rule never burns the request ID it answers.

mod replay;

pub use replay::*;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::error::{SamlError, SamlResult, ValidationRule};
use crate::types::{Assertion, Response, SAML_VERSION};

/// What a response is validated against.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    /// Entity ID of the hosted service provider.
    pub hosted_entity_id: &'a str,
    /// URL of the assertion consumer service the response was posted to.
    pub acs_url: &'a str,
    /// Entity ID whose keys verified the signatures.
    pub remote_entity_id: &'a str,
}

/// Response validator.
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    clock_skew: Duration,
    max_authentication_age: Duration,
    allow_unsolicited: bool,
    request_ids: Arc<dyn RequestIdStore>,
}

impl ResponseValidator {
    /// Creates a validator with two minutes of clock skew, a one day maximum
    /// authentication age and unsolicited responses allowed.
    #[must_use]
    pub fn new(request_ids: Arc<dyn RequestIdStore>) -> Self {
        Self {
            clock_skew: Duration::minutes(2),
            max_authentication_age: Duration::days(1),
            allow_unsolicited: true,
            request_ids,
        }
    }

    /// Sets the tolerated clock difference.
    #[must_use]
    pub fn with_clock_skew(mut self, skew: Duration) -> Self {
        self.clock_skew = skew;
        self
    }

    /// Sets how long ago the user may have authenticated at the IdP.
    #[must_use]
    pub fn with_max_authentication_age(mut self, age: Duration) -> Self {
        self.max_authentication_age = age;
        self
    }

    /// Accepts or refuses responses without `InResponseTo`.
    #[must_use]
    pub fn allow_unsolicited(mut self, allow: bool) -> Self {
        self.allow_unsolicited = allow;
        self
    }

    /// The replay store consulted for correlation.
    #[must_use]
    pub fn request_ids(&self) -> &Arc<dyn RequestIdStore> {
        &self.request_ids
    }

    /// Validates against the current time.
    ///
    /// # Errors
    ///
    /// See [`ResponseValidator::validate_at`].
    pub fn validate(&self, response: &Response, context: &ValidationContext<'_>) -> SamlResult<()> {
        self.validate_at(response, context, Utc::now())
    }

    /// Validates `response` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Validation`] naming the first rule violated.
    pub fn validate_at(
        &self,
        response: &Response,
        context: &ValidationContext<'_>,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        if response.version != SAML_VERSION {
            return Err(SamlError::validation(
                ValidationRule::Version,
                format!("unsupported response version '{}'", response.version),
            ));
        }

        if !response.is_success() {
            return Err(SamlError::validation(
                ValidationRule::Status,
                format!("status is {}", response.status.status_code.value),
            ));
        }

        self.check_instant(response.issue_instant, now)?;

        if let Some(destination) = &response.destination {
            if destination != context.acs_url {
                return Err(SamlError::validation(
                    ValidationRule::Destination,
                    format!("destination '{destination}' is not '{}'", context.acs_url),
                ));
            }
        }

        if let Some(issuer) = &response.issuer {
            if issuer != context.remote_entity_id {
                return Err(SamlError::validation(
                    ValidationRule::Issuer,
                    format!("response issued by '{issuer}', verified for '{}'", context.remote_entity_id),
                ));
            }
        }

        if response.assertions.is_empty() {
            let reason = if response.encrypted_assertions > 0 {
                "only encrypted assertions, which are not supported"
            } else {
                "response carries no assertion"
            };
            return Err(SamlError::validation(ValidationRule::AssertionPresent, reason));
        }

        for assertion in &response.assertions {
            self.check_assertion(assertion, response, context, now)?;
        }

        self.check_correlation(response, now)
    }

    fn check_instant(&self, issue_instant: DateTime<Utc>, now: DateTime<Utc>) -> SamlResult<()> {
        if issue_instant > now + self.clock_skew || issue_instant < now - self.clock_skew {
            return Err(SamlError::validation(
                ValidationRule::IssueInstant,
                format!("issued at {issue_instant}, outside the allowed skew of {now}"),
            ));
        }
        Ok(())
    }

    fn check_assertion(
        &self,
        assertion: &Assertion,
        response: &Response,
        context: &ValidationContext<'_>,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        if assertion.version != SAML_VERSION {
            return Err(SamlError::validation(
                ValidationRule::Version,
                format!("unsupported assertion version '{}'", assertion.version),
            ));
        }

        if assertion.issuer != context.remote_entity_id {
            return Err(SamlError::validation(
                ValidationRule::Issuer,
                format!(
                    "assertion {} issued by '{}', verified for '{}'",
                    assertion.id, assertion.issuer, context.remote_entity_id
                ),
            ));
        }

        if let Some(conditions) = &assertion.conditions {
            conditions
                .check_window(now, self.clock_skew)
                .map_err(|reason| SamlError::validation(ValidationRule::TimeWindow, reason))?;
        }

        if !assertion.audiences().any(|audience| audience == context.hosted_entity_id) {
            return Err(SamlError::validation(
                ValidationRule::Audience,
                format!("'{}' is not an audience of assertion {}", context.hosted_entity_id, assertion.id),
            ));
        }

        self.check_subject_confirmation(assertion, response, context, now)?;
        self.check_authentication_age(assertion, now)
    }

    fn check_subject_confirmation(
        &self,
        assertion: &Assertion,
        response: &Response,
        context: &ValidationContext<'_>,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        let confirmations = assertion
            .subject
            .as_ref()
            .map(|s| s.subject_confirmations.as_slice())
            .unwrap_or_default();

        let mut last_failure = String::from("no bearer subject confirmation");
        for confirmation in confirmations.iter().filter(|c| c.is_bearer()) {
            let Some(data) = &confirmation.subject_confirmation_data else {
                last_failure = "bearer confirmation without data".to_string();
                continue;
            };
            match data.not_on_or_after {
                None => {
                    last_failure = "bearer confirmation without NotOnOrAfter".to_string();
                    continue;
                }
                Some(limit) if now - self.clock_skew >= limit => {
                    last_failure = format!("bearer confirmation expired at {limit}");
                    continue;
                }
                Some(_) => {}
            }
            if let Some(not_before) = data.not_before {
                if now + self.clock_skew < not_before {
                    last_failure = format!("bearer confirmation not valid before {not_before}");
                    continue;
                }
            }
            if data.recipient.as_deref() != Some(context.acs_url) {
                last_failure = format!(
                    "recipient {:?} is not '{}'",
                    data.recipient.as_deref().unwrap_or(""),
                    context.acs_url
                );
                continue;
            }
            if data.in_response_to.is_some() && data.in_response_to != response.in_response_to {
                last_failure = "confirmation answers a different request".to_string();
                continue;
            }
            return Ok(());
        }

        Err(SamlError::validation(ValidationRule::SubjectConfirmation, last_failure))
    }

    fn check_authentication_age(&self, assertion: &Assertion, now: DateTime<Utc>) -> SamlResult<()> {
        for statement in &assertion.authn_statements {
            if statement.authn_instant > now + self.clock_skew {
                return Err(SamlError::validation(
                    ValidationRule::AuthenticationAge,
                    format!("authenticated in the future at {}", statement.authn_instant),
                ));
            }
            if now - statement.authn_instant > self.max_authentication_age + self.clock_skew {
                return Err(SamlError::validation(
                    ValidationRule::AuthenticationAge,
                    format!("authenticated too long ago at {}", statement.authn_instant),
                ));
            }
            if let Some(session_end) = statement.session_not_on_or_after {
                if now - self.clock_skew >= session_end {
                    return Err(SamlError::validation(
                        ValidationRule::AuthenticationAge,
                        format!("IdP session ended at {session_end}"),
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_correlation(&self, response: &Response, now: DateTime<Utc>) -> SamlResult<()> {
        match &response.in_response_to {
            Some(request_id) => {
                if self.request_ids.consume(request_id, now) {
                    Ok(())
                } else {
                    Err(SamlError::validation(
                        ValidationRule::InResponseTo,
                        format!("'{request_id}' is not an outstanding request"),
                    ))
                }
            }
            None if self.allow_unsolicited => Ok(()),
            None => Err(SamlError::validation(
                ValidationRule::InResponseTo,
                "unsolicited responses are not accepted",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::format_instant;
    use crate::xml::XmlParser;

    const ACS: &str = "https://sp.example.org/saml/SSO";
    const IDP: &str = "https://idp.example.org";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    struct Fixture {
        in_response_to: Option<&'static str>,
        audience: &'static str,
        destination: &'static str,
        status: &'static str,
        response_issuer: &'static str,
        assertion_issuer: &'static str,
        not_before: DateTime<Utc>,
        not_on_or_after: DateTime<Utc>,
        recipient: &'static str,
        authn_instant: DateTime<Utc>,
    }

    impl Default for Fixture {
        fn default() -> Self {
            Self {
                in_response_to: Some("req-123"),
                audience: "sp1",
                destination: ACS,
                status: "urn:oasis:names:tc:SAML:2.0:status:Success",
                response_issuer: IDP,
                assertion_issuer: IDP,
                not_before: now() - Duration::minutes(1),
                not_on_or_after: now() + Duration::minutes(5),
                recipient: ACS,
                authn_instant: now() - Duration::minutes(1),
            }
        }
    }

    impl Fixture {
        fn response(&self) -> Response {
            let irt = self
                .in_response_to
                .map(|id| format!(r#" InResponseTo="{id}""#))
                .unwrap_or_default();
            let xml = format!(
                r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0" IssueInstant="{issued}" Destination="{destination}"{irt}>
  <saml:Issuer>{response_issuer}</saml:Issuer>
  <samlp:Status><samlp:StatusCode Value="{status}"/></samlp:Status>
  <saml:Assertion ID="_a1" Version="2.0" IssueInstant="{issued}">
    <saml:Issuer>{assertion_issuer}</saml:Issuer>
    <saml:Subject>
      <saml:NameID>alice</saml:NameID>
      <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
        <saml:SubjectConfirmationData NotOnOrAfter="{not_on_or_after}" Recipient="{recipient}"{irt}/>
      </saml:SubjectConfirmation>
    </saml:Subject>
    <saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{not_on_or_after}">
      <saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction>
    </saml:Conditions>
    <saml:AuthnStatement AuthnInstant="{authn_instant}"/>
  </saml:Assertion>
</samlp:Response>"#,
                issued = format_instant(now()),
                destination = self.destination,
                response_issuer = self.response_issuer,
                status = self.status,
                assertion_issuer = self.assertion_issuer,
                not_before = format_instant(self.not_before),
                not_on_or_after = format_instant(self.not_on_or_after),
                recipient = self.recipient,
                audience = self.audience,
                authn_instant = format_instant(self.authn_instant),
            );
            Response::from_element(XmlParser::new().parse(&xml).unwrap()).unwrap()
        }
    }

    fn context() -> ValidationContext<'static> {
        ValidationContext {
            hosted_entity_id: "sp1",
            acs_url: ACS,
            remote_entity_id: IDP,
        }
    }

    fn setup() -> (ResponseValidator, Arc<InMemoryRequestIdStore>) {
        let store = Arc::new(InMemoryRequestIdStore::new());
        store.register("req-123", now() + Duration::minutes(5));
        (ResponseValidator::new(store.clone()), store)
    }

    fn rule_of(result: SamlResult<()>) -> Option<ValidationRule> {
        result.err().and_then(|e| e.validation_rule())
    }

    #[test]
    fn valid_response_passes_and_consumes_request() {
        let (validator, store) = setup();
        let response = Fixture::default().response();

        validator.validate_at(&response, &context(), now()).unwrap();
        assert!(store.is_empty());

        assert_eq!(
            rule_of(validator.validate_at(&response, &context(), now())),
            Some(ValidationRule::InResponseTo)
        );
    }

    #[test]
    fn each_rule_reports_itself() {
        let cases = [
            (
                Fixture { status: "urn:oasis:names:tc:SAML:2.0:status:Requester", ..Fixture::default() },
                ValidationRule::Status,
            ),
            (
                Fixture { destination: "https://evil.example.org/acs", ..Fixture::default() },
                ValidationRule::Destination,
            ),
            (
                Fixture { response_issuer: "https://other-idp", ..Fixture::default() },
                ValidationRule::Issuer,
            ),
            (
                Fixture { assertion_issuer: "https://other-idp", ..Fixture::default() },
                ValidationRule::Issuer,
            ),
            (
                Fixture { not_on_or_after: now() - Duration::minutes(10), ..Fixture::default() },
                ValidationRule::TimeWindow,
            ),
            (Fixture { audience: "sp2", ..Fixture::default() }, ValidationRule::Audience),
            (
                Fixture { recipient: "https://sp.example.org/other", ..Fixture::default() },
                ValidationRule::SubjectConfirmation,
            ),
            (
                Fixture { authn_instant: now() - Duration::days(2), ..Fixture::default() },
                ValidationRule::AuthenticationAge,
            ),
            (
                Fixture { in_response_to: Some("req-unknown"), ..Fixture::default() },
                ValidationRule::InResponseTo,
            ),
        ];

        for (fixture, expected) in cases {
            let (validator, _) = setup();
            let result = validator.validate_at(&fixture.response(), &context(), now());
            assert_eq!(rule_of(result), Some(expected));
        }
    }

    #[test]
    fn failed_validation_keeps_request_outstanding() {
        let (validator, store) = setup();
        let wrong_audience = Fixture { audience: "sp2", ..Fixture::default() }.response();

        assert!(validator.validate_at(&wrong_audience, &context(), now()).is_err());
        assert_eq!(store.len(), 1);

        validator
            .validate_at(&Fixture::default().response(), &context(), now())
            .unwrap();
    }

    #[test]
    fn issue_instant_must_be_within_skew() {
        let (validator, _) = setup();
        let response = Fixture::default().response();

        let late = now() + Duration::minutes(3);
        assert_eq!(
            rule_of(validator.validate_at(&response, &context(), late)),
            Some(ValidationRule::IssueInstant)
        );
    }

    #[test]
    fn unsolicited_responses_follow_configuration() {
        let fixture = Fixture { in_response_to: None, ..Fixture::default() };

        let (validator, _) = setup();
        validator.validate_at(&fixture.response(), &context(), now()).unwrap();

        let (validator, _) = setup();
        let strict = validator.allow_unsolicited(false);
        assert_eq!(
            rule_of(strict.validate_at(&fixture.response(), &context(), now())),
            Some(ValidationRule::InResponseTo)
        );
    }

    #[test]
    fn conditions_window_is_widened_by_skew() {
        let (validator, _) = setup();
        let early = Fixture { not_before: now() + Duration::minutes(1), ..Fixture::default() };
        validator.validate_at(&early.response(), &context(), now()).unwrap();

        let (validator, _) = setup();
        let too_early = Fixture { not_before: now() + Duration::minutes(3), ..Fixture::default() };
        assert_eq!(
            rule_of(validator.validate_at(&too_early.response(), &context(), now())),
            Some(ValidationRule::TimeWindow)
        );
    }

    #[test]
    fn encrypted_only_response_has_no_assertion() {
        let xml = format!(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_r1" Version="2.0" IssueInstant="{}">
  <samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>
  <saml:EncryptedAssertion/>
</samlp:Response>"#,
            format_instant(now())
        );
        let response = Response::from_element(XmlParser::new().parse(&xml).unwrap()).unwrap();
        let (validator, _) = setup();

        assert_eq!(
            rule_of(validator.validate_at(&response, &context(), now())),
            Some(ValidationRule::AssertionPresent)
        );
    }
}
