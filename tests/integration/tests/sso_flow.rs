//! End-to-end tests for the assertion consumer pipeline.

use base64::Engine;
use saml_sp::bindings::deflate_encode;
use saml_sp::{
    ErrorKind, PipelineOutcome, PipelineState, SamlHttpRequest, SimpleHttpRequest, SpConfig,
    ValidationRule, VerificationMode,
};

use crate::common::*;

#[test]
fn signed_response_authenticates() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate::default().build(fixture.idp_key())?;

    let authentication = authenticated(fixture.post(&xml, Some("/app/home"))?)?;

    assert!(authentication.authenticated);
    assert_eq!(authentication.remote_entity_id, IDP_ENTITY_ID);
    assert_eq!(authentication.hosted_entity_id, SP_ENTITY_ID);
    assert_eq!(authentication.relay_state.as_deref(), Some("/app/home"));
    assert_eq!(authentication.principal_name(), Some("alice@example.org"));
    assert_eq!(
        authentication
            .assertion
            .attribute("role")
            .and_then(|a| a.first_value()),
        Some("admin")
    );
    assert!(authentication.assertion.signature.is_some());
    Ok(())
}

#[test]
fn wrong_audience_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate {
        audience: "sp2".to_string(),
        ..ResponseTemplate::default()
    }
    .build(fixture.idp_key())?;

    let rejection = rejected(fixture.post(&xml, None)?)?;

    assert_eq!(rejection.state, PipelineState::SignatureVerified);
    assert_eq!(rejection.error.kind(), ErrorKind::Validation);
    assert_eq!(rejection.error.validation_rule(), Some(ValidationRule::Audience));
    assert_eq!(rejection.public_message(), "SAML authentication failed");
    Ok(())
}

#[test]
fn unsigned_response_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate {
        sign_response: false,
        sign_assertion: false,
        ..ResponseTemplate::default()
    }
    .build(fixture.idp_key())?;

    let rejection = rejected(fixture.post(&xml, None)?)?;

    assert_eq!(rejection.state, PipelineState::IdpLocated);
    assert_eq!(rejection.error.kind(), ErrorKind::Signature);
    Ok(())
}

#[test]
fn tampered_response_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate::default()
        .build(fixture.idp_key())?
        .replace("alice@example.org", "mallory@example.org");

    let rejection = rejected(fixture.post(&xml, None)?)?;

    assert_eq!(rejection.error.kind(), ErrorKind::Signature);
    // The request stays outstanding; a genuine response still succeeds.
    let genuine = ResponseTemplate::default().build(fixture.idp_key())?;
    authenticated(fixture.post(&genuine, None)?)?;
    Ok(())
}

#[test]
fn response_signed_by_unknown_key_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let attacker = TestKey::generate("attacker")?;
    let xml = ResponseTemplate::default().build(&attacker)?;

    let rejection = rejected(fixture.post(&xml, None)?)?;

    assert_eq!(rejection.error.kind(), ErrorKind::Signature);
    Ok(())
}

#[test]
fn unknown_issuer_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let xml = ResponseTemplate {
        issuer: "https://rogue.example.org".to_string(),
        ..ResponseTemplate::default()
    }
    .build(fixture.idp_key())?;

    let rejection = rejected(fixture.post(&xml, None)?)?;

    assert_eq!(rejection.state, PipelineState::Parsed);
    assert_eq!(rejection.error.kind(), ErrorKind::UnknownIssuer);
    Ok(())
}

#[test]
fn replayed_response_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate::default().build(fixture.idp_key())?;

    authenticated(fixture.post(&xml, None)?)?;
    let rejection = rejected(fixture.post(&xml, None)?)?;

    assert_eq!(
        rejection.error.validation_rule(),
        Some(ValidationRule::InResponseTo)
    );
    Ok(())
}

#[test]
fn stale_response_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate {
        issued_at: chrono::Utc::now() - chrono::Duration::hours(1),
        ..ResponseTemplate::default()
    }
    .build(fixture.idp_key())?;

    let rejection = rejected(fixture.post(&xml, None)?)?;

    assert_eq!(
        rejection.error.validation_rule(),
        Some(ValidationRule::IssueInstant)
    );
    Ok(())
}

#[test]
fn unsolicited_response_follows_configuration() -> anyhow::Result<()> {
    let template = ResponseTemplate {
        in_response_to: None,
        ..ResponseTemplate::default()
    };

    let permissive = Fixture::new()?;
    let xml = template.build(permissive.idp_key())?;
    authenticated(permissive.post(&xml, None)?)?;

    let strict = Fixture::builder()
        .config(SpConfig {
            allow_unsolicited_responses: false,
            ..Fixture::builder_config()
        })
        .build()?;
    let xml = template.build(strict.idp_key())?;
    let rejection = rejected(strict.post(&xml, None)?)?;
    assert_eq!(
        rejection.error.validation_rule(),
        Some(ValidationRule::InResponseTo)
    );
    Ok(())
}

#[test]
fn rolled_over_key_is_found_by_key_match() -> anyhow::Result<()> {
    let template = ResponseTemplate::default();

    let fixture = Fixture::builder()
        .idp_keys(vec![TestKey::generate("idp-old")?, TestKey::generate("idp-new")?])
        .build()?;
    fixture.issue_request_id("req-123");
    let xml = template.build(&fixture.idp_keys[1])?;
    authenticated(fixture.post(&xml, None)?)?;

    let first_only = Fixture::builder()
        .config(SpConfig {
            verification_mode: VerificationMode::FirstCandidate,
            ..Fixture::builder_config()
        })
        .idp_keys(vec![TestKey::generate("idp-old")?, TestKey::generate("idp-new")?])
        .build()?;
    first_only.issue_request_id("req-123");
    let xml = template.build(&first_only.idp_keys[1])?;
    let rejection = rejected(first_only.post(&xml, None)?)?;
    assert_eq!(rejection.error.kind(), ErrorKind::Signature);
    Ok(())
}

#[test]
fn unsigned_assertion_inside_signed_response() -> anyhow::Result<()> {
    let template = ResponseTemplate {
        sign_assertion: false,
        ..ResponseTemplate::default()
    };

    let trusting = Fixture::new()?;
    trusting.issue_request_id("req-123");
    let xml = template.build(trusting.idp_key())?;
    let authentication = authenticated(trusting.post(&xml, None)?)?;
    assert!(authentication.assertion.signature.is_none());

    let wants_signed = Fixture::builder().want_assertions_signed(true).build()?;
    wants_signed.issue_request_id("req-123");
    let xml = template.build(wants_signed.idp_key())?;
    let rejection = rejected(wants_signed.post(&xml, None)?)?;
    assert_eq!(rejection.error.kind(), ErrorKind::Signature);

    let distrusting = Fixture::builder()
        .config(SpConfig {
            trust_unsigned_assertions: false,
            ..Fixture::builder_config()
        })
        .build()?;
    distrusting.issue_request_id("req-123");
    let xml = template.build(distrusting.idp_key())?;
    let rejection = rejected(distrusting.post(&xml, None)?)?;
    assert_eq!(rejection.error.kind(), ErrorKind::Signature);
    Ok(())
}

#[test]
fn signed_assertion_in_unsigned_response() -> anyhow::Result<()> {
    let template = ResponseTemplate {
        sign_response: false,
        ..ResponseTemplate::default()
    };

    let strict = Fixture::new()?;
    strict.issue_request_id("req-123");
    let xml = template.build(strict.idp_key())?;
    let rejection = rejected(strict.post(&xml, None)?)?;
    assert_eq!(rejection.error.kind(), ErrorKind::Signature);

    let relaxed = Fixture::builder()
        .config(SpConfig {
            require_signed_response: false,
            ..Fixture::builder_config()
        })
        .build()?;
    relaxed.issue_request_id("req-123");
    let xml = template.build(relaxed.idp_key())?;
    let authentication = authenticated(relaxed.post(&xml, None)?)?;
    assert!(authentication.assertion.signature.is_some());
    Ok(())
}

#[test]
fn redirect_encoded_response_is_accepted_on_get() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate::default().build(fixture.idp_key())?;

    let request = SimpleHttpRequest::new("get", ACS_URL)?
        .with_parameter("SAMLResponse", deflate_encode(&xml)?);
    assert_eq!(request.method(), "GET");

    let authentication = authenticated(fixture.pipeline.process(&request))?;
    assert_eq!(authentication.principal_name(), Some("alice@example.org"));
    Ok(())
}

#[test]
fn foreign_host_on_acs_path_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    fixture.issue_request_id("req-123");
    let forged_url = "https://evil.example.net/saml/SSO";
    let xml = ResponseTemplate {
        destination: forged_url.to_string(),
        ..ResponseTemplate::default()
    }
    .build(fixture.idp_key())?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&xml);
    let request = SimpleHttpRequest::post(forged_url)?.with_parameter("SAMLResponse", encoded);

    let rejection = rejected(fixture.pipeline.process(&request))?;

    assert_eq!(rejection.state, PipelineState::SignatureVerified);
    assert_eq!(rejection.error.validation_rule(), Some(ValidationRule::Destination));
    Ok(())
}

#[test]
fn other_paths_are_not_applicable() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let request = SimpleHttpRequest::post("https://sp.example.org/saml/logout")?
        .with_parameter("SAMLResponse", "PHg+");

    assert!(matches!(
        fixture.pipeline.process(&request),
        PipelineOutcome::NotApplicable
    ));
    Ok(())
}

#[test]
fn authentication_request_is_correlated() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let request = fixture.provider.create_authn_request(IDP_ENTITY_ID)?;
    assert_eq!(request.destination.as_deref(), Some("https://idp.example.org/sso"));

    let xml = ResponseTemplate {
        in_response_to: Some(request.id.clone()),
        ..ResponseTemplate::default()
    }
    .build(fixture.idp_key())?;
    authenticated(fixture.post(&xml, None)?)?;
    Ok(())
}
