//! Metadata resolution, publication and trust updates.

use std::sync::Arc;

use saml_sp::metadata::UNSPECIFIED_MILLIS;
use saml_sp::{
    ErrorKind, HostedServiceProvider, InMemoryRequestIdStore, KeyStore, MetadataRegistry,
    MetadataResolver, Provider, SamlBinding, SimpleKey, XmlContext,
};

use crate::common::*;

const FEDERATED_SP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://sp.partner.org">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol" WantAssertionsSigned="true">
    <md:NameIDFormat>urn:oasis:names:tc:SAML:2.0:nameid-format:persistent</md:NameIDFormat>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://sp.partner.org/acs/post" index="3"/>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Artifact" Location="https://sp.partner.org/acs/artifact" index="1" isDefault="true"/>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://sp.partner.org/acs/redirect" index="2"/>
  </md:SPSSODescriptor>
  <md:PDPDescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/>
</md:EntityDescriptor>"#;

fn resolver() -> anyhow::Result<MetadataResolver> {
    Ok(MetadataResolver::new(Arc::new(XmlContext::initialized(2)?)))
}

#[test]
fn federated_metadata_keeps_document_order() -> anyhow::Result<()> {
    init_tracing();
    let metadata = resolver()?.resolve_metadata(FEDERATED_SP, &[])?;

    assert_eq!(metadata.cache_duration_millis, UNSPECIFIED_MILLIS);
    assert_eq!(metadata.providers.len(), 2);

    let sp = metadata.service_provider().expect("service provider role");
    assert!(sp.want_assertions_signed);
    let locations: Vec<&str> = sp
        .assertion_consumer_services
        .iter()
        .map(|e| e.location.as_str())
        .collect();
    assert_eq!(
        locations,
        [
            "https://sp.partner.org/acs/post",
            "https://sp.partner.org/acs/artifact",
            "https://sp.partner.org/acs/redirect",
        ]
    );
    assert_eq!(sp.assertion_consumer_services[1].binding, SamlBinding::HttpArtifact);
    assert_eq!(
        sp.default_acs().map(|e| e.location.as_str()),
        Some("https://sp.partner.org/acs/artifact")
    );

    match &metadata.providers[1] {
        Provider::Unknown(role) => assert_eq!(role.element_name, "md:PDPDescriptor"),
        other => panic!("expected unknown role, got {other:?}"),
    }
    Ok(())
}

#[test]
fn identity_provider_keys_are_named() -> anyhow::Result<()> {
    let old = TestKey::generate("idp-old")?;
    let new = TestKey::generate("idp-new")?;
    let metadata = resolver()?.resolve_metadata(&idp_metadata_xml(&[&old, &new])?, &[])?;

    let idp = metadata.identity_provider().expect("identity provider role");
    let aliases: Vec<&str> = idp.info.keys.iter().map(|k| k.alias.as_str()).collect();
    assert_eq!(aliases, ["idp-old", "idp-new"]);
    assert_eq!(
        idp.sso_endpoint(SamlBinding::HttpRedirect)
            .map(|e| e.location.as_str()),
        Some("https://idp.example.org/sso")
    );
    Ok(())
}

#[test]
fn hosted_metadata_is_signed_and_verifiable() -> anyhow::Result<()> {
    let sp_key = TestKey::generate("sp-signing")?;
    let sp_metadata = saml_sp::Metadata::new(SP_ENTITY_ID).with_provider(Provider::ServiceProvider(
        saml_sp::metadata::ServiceProviderRole {
            authn_requests_signed: true,
            assertion_consumer_services: vec![
                saml_sp::metadata::Endpoint::new(SamlBinding::HttpPost, ACS_URL).indexed(0, true),
            ],
            ..Default::default()
        },
    ));
    let provider = HostedServiceProvider::new(
        sp_metadata.clone(),
        KeyStore::from_keys([sp_key.signing_key()]),
        Arc::new(MetadataRegistry::new()),
        Arc::new(InMemoryRequestIdStore::new()),
        Fixture::builder_config(),
    )?
    .with_signing_key("sp-signing");

    let xml = provider.metadata_xml()?;
    let trusted = SimpleKey::new("sp-signing").with_certificate(sp_key.certificate_pem.as_str());
    let resolved = resolver()?.resolve_metadata(&xml, &[trusted])?;

    assert!(resolved.signature.is_some());
    assert_eq!(resolved.entity_id, SP_ENTITY_ID);
    assert_eq!(resolved.service_provider(), sp_metadata.service_provider());

    let stranger = TestKey::generate("stranger")?;
    let untrusted = SimpleKey::new("stranger").with_certificate(stranger.certificate_pem.as_str());
    let error = resolver()?
        .resolve_metadata(&xml, &[untrusted])
        .expect_err("foreign key must not verify");
    assert_eq!(error.kind(), ErrorKind::Signature);
    Ok(())
}

#[test]
fn trust_follows_registry_updates() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let registry = Arc::clone(fixture.provider.remote_providers());
    let idp_metadata = registry.get(IDP_ENTITY_ID).expect("IdP is registered");

    registry.remove(IDP_ENTITY_ID);
    fixture.issue_request_id("req-123");
    let xml = ResponseTemplate::default().build(fixture.idp_key())?;
    let rejection = rejected(fixture.post(&xml, None)?)?;
    assert_eq!(rejection.error.kind(), ErrorKind::UnknownIssuer);

    registry.insert((*idp_metadata).clone());
    authenticated(fixture.post(&xml, None)?)?;
    Ok(())
}
