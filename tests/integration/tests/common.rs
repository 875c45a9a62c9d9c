//! Common test utilities and fixtures.

use std::sync::Arc;

use anyhow::Context;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};

use saml_sp::credential::{resolve_credential, Credential};
use saml_sp::metadata::{Endpoint, ServiceProviderRole};
use saml_sp::signature::{DigestMethod, SignatureAlgorithm};
use saml_sp::xml::{to_xml_string, XmlParser};
use saml_sp::{
    format_instant, AuthenticationPipeline, HostedServiceProvider, InMemoryRequestIdStore,
    KeyStore, KeyUsage, Metadata, MetadataRegistry, MetadataResolver, PipelineOutcome, Provider,
    Rejection, SamlAuthentication, SamlBinding, SignatureConfig, SimpleHttpRequest, SimpleKey,
    SpConfig, XmlContext, XmlSigner, SAML_NS,
};

pub const SP_ENTITY_ID: &str = "sp1";
pub const IDP_ENTITY_ID: &str = "https://idp.example.org";
pub const ACS_URL: &str = "https://sp.example.org/saml/SSO";

/// Installs a test subscriber once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("saml_sp=debug")
        .with_test_writer()
        .try_init();
}

/// A generated key pair with its certificate.
pub struct TestKey {
    pub name: String,
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl TestKey {
    pub fn generate(name: &str) -> anyhow::Result<Self> {
        let certified = rcgen::generate_simple_self_signed(vec![name.to_string()])?;
        Ok(Self {
            name: name.to_string(),
            certificate_pem: certified.cert.pem(),
            private_key_pem: certified.key_pair.serialize_pem(),
        })
    }

    /// Base64 DER, as carried in metadata.
    pub fn certificate_base64(&self) -> anyhow::Result<String> {
        let der = saml_crypto::decode_certificate(&self.certificate_pem)?;
        Ok(saml_crypto::encode_certificate(&der))
    }

    pub fn signing_key(&self) -> SimpleKey {
        SimpleKey::new(self.name.as_str())
            .with_certificate(self.certificate_pem.as_str())
            .with_private_key(self.private_key_pem.as_str(), None)
    }

    pub fn credential(&self) -> anyhow::Result<Credential> {
        Ok(resolve_credential(&self.signing_key(), KeyUsage::Signing)?)
    }
}

pub fn signer() -> XmlSigner {
    XmlSigner::new(SignatureConfig::new(
        SignatureAlgorithm::EcdsaSha256,
        DigestMethod::Sha256,
    ))
}

/// IdP metadata document publishing `keys` for signing.
pub fn idp_metadata_xml(keys: &[&TestKey]) -> anyhow::Result<String> {
    let mut descriptors = String::new();
    for key in keys {
        descriptors.push_str(&format!(
            r#"<md:KeyDescriptor use="signing"><ds:KeyInfo><ds:KeyName>{}</ds:KeyName><ds:X509Data><ds:X509Certificate>{}</ds:X509Certificate></ds:X509Data></ds:KeyInfo></md:KeyDescriptor>"#,
            key.name,
            key.certificate_base64()?
        ));
    }
    Ok(format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" xmlns:ds="http://www.w3.org/2000/09/xmldsig#" entityID="{IDP_ENTITY_ID}" ID="_idp-metadata"><md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">{descriptors}<md:SingleSignOnService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://idp.example.org/sso"/></md:IDPSSODescriptor></md:EntityDescriptor>"#
    ))
}

/// Builds a hosted service provider trusting one IdP.
pub struct FixtureBuilder {
    config: SpConfig,
    want_assertions_signed: bool,
    idp_keys: Vec<TestKey>,
}

impl FixtureBuilder {
    pub fn config(mut self, config: SpConfig) -> Self {
        self.config = config;
        self
    }

    pub fn want_assertions_signed(mut self, want: bool) -> Self {
        self.want_assertions_signed = want;
        self
    }

    pub fn idp_keys(mut self, keys: Vec<TestKey>) -> Self {
        self.idp_keys = keys;
        self
    }

    pub fn build(self) -> anyhow::Result<Fixture> {
        init_tracing();

        let context = Arc::new(XmlContext::initialized(4)?);
        let idp_keys = if self.idp_keys.is_empty() {
            vec![TestKey::generate("idp-signing")?]
        } else {
            self.idp_keys
        };

        let published: Vec<&TestKey> = idp_keys.iter().collect();
        let idp_metadata = MetadataResolver::new(Arc::clone(&context))
            .resolve_metadata(&idp_metadata_xml(&published)?, &[])?;
        let registry = Arc::new(MetadataRegistry::from_metadata([idp_metadata]));

        let sp_metadata = Metadata::new(SP_ENTITY_ID).with_provider(Provider::ServiceProvider(
            ServiceProviderRole {
                want_assertions_signed: self.want_assertions_signed,
                assertion_consumer_services: vec![
                    Endpoint::new(SamlBinding::HttpPost, ACS_URL).indexed(0, true),
                    Endpoint::new(SamlBinding::HttpRedirect, ACS_URL).indexed(1, false),
                ],
                ..ServiceProviderRole::default()
            },
        ));

        let store = Arc::new(InMemoryRequestIdStore::new());
        let provider = Arc::new(HostedServiceProvider::new(
            sp_metadata,
            KeyStore::default(),
            registry,
            store.clone(),
            self.config,
        )?);
        let pipeline = AuthenticationPipeline::new(Arc::clone(&provider), context)?;

        Ok(Fixture {
            idp_keys,
            provider,
            store,
            pipeline,
        })
    }
}

pub struct Fixture {
    pub idp_keys: Vec<TestKey>,
    pub provider: Arc<HostedServiceProvider>,
    pub store: Arc<InMemoryRequestIdStore>,
    pub pipeline: AuthenticationPipeline,
}

impl Fixture {
    pub fn builder() -> FixtureBuilder {
        FixtureBuilder {
            config: Self::builder_config(),
            want_assertions_signed: false,
            idp_keys: Vec::new(),
        }
    }

    /// Default settings with EC signatures.
    pub fn builder_config() -> SpConfig {
        SpConfig {
            signature: SignatureConfig::new(SignatureAlgorithm::EcdsaSha256, DigestMethod::Sha256),
            ..SpConfig::default()
        }
    }

    pub fn new() -> anyhow::Result<Self> {
        Self::builder().build()
    }

    /// Records `id` as an outstanding request.
    pub fn issue_request_id(&self, id: &str) {
        use saml_sp::RequestIdStore;
        self.store.register(id, Utc::now() + Duration::minutes(5));
    }

    pub fn idp_key(&self) -> &TestKey {
        &self.idp_keys[0]
    }

    pub fn post(&self, response_xml: &str, relay_state: Option<&str>) -> anyhow::Result<PipelineOutcome> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(response_xml);
        let mut request = SimpleHttpRequest::post(ACS_URL)?.with_parameter("SAMLResponse", encoded);
        if let Some(relay_state) = relay_state {
            request = request.with_parameter("RelayState", relay_state);
        }
        Ok(self.pipeline.process(&request))
    }
}

/// Shape of a response produced by the simulated IdP.
#[derive(Clone)]
pub struct ResponseTemplate {
    pub in_response_to: Option<String>,
    pub destination: String,
    pub audience: String,
    pub name_id: String,
    pub issuer: String,
    pub issued_at: DateTime<Utc>,
    pub sign_response: bool,
    pub sign_assertion: bool,
}

impl Default for ResponseTemplate {
    fn default() -> Self {
        Self {
            in_response_to: Some("req-123".to_string()),
            destination: ACS_URL.to_string(),
            audience: SP_ENTITY_ID.to_string(),
            name_id: "alice@example.org".to_string(),
            issuer: IDP_ENTITY_ID.to_string(),
            issued_at: Utc::now(),
            sign_response: true,
            sign_assertion: true,
        }
    }
}

impl ResponseTemplate {
    /// Serialized response, signed as requested with `key`.
    pub fn build(&self, key: &TestKey) -> anyhow::Result<String> {
        let issued = format_instant(self.issued_at);
        let expires = format_instant(self.issued_at + Duration::minutes(5));
        let not_before = format_instant(self.issued_at - Duration::minutes(1));
        let irt = self
            .in_response_to
            .as_ref()
            .map(|id| format!(r#" InResponseTo="{id}""#))
            .unwrap_or_default();

        let xml = format!(
            concat!(
                r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_resp-1" Version="2.0" IssueInstant="{issued}" Destination="{acs}"{irt}>"#,
                r#"<saml:Issuer>{issuer}</saml:Issuer>"#,
                r#"<samlp:Status><samlp:StatusCode Value="urn:oasis:names:tc:SAML:2.0:status:Success"/></samlp:Status>"#,
                r#"<saml:Assertion ID="_assert-1" Version="2.0" IssueInstant="{issued}">"#,
                r#"<saml:Issuer>{issuer}</saml:Issuer>"#,
                r#"<saml:Subject><saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">{name_id}</saml:NameID>"#,
                r#"<saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">"#,
                r#"<saml:SubjectConfirmationData NotOnOrAfter="{expires}" Recipient="{acs}"{irt}/>"#,
                r#"</saml:SubjectConfirmation></saml:Subject>"#,
                r#"<saml:Conditions NotBefore="{not_before}" NotOnOrAfter="{expires}">"#,
                r#"<saml:AudienceRestriction><saml:Audience>{audience}</saml:Audience></saml:AudienceRestriction>"#,
                r#"</saml:Conditions>"#,
                r#"<saml:AuthnStatement AuthnInstant="{issued}" SessionIndex="_session-1"/>"#,
                r#"<saml:AttributeStatement><saml:Attribute Name="role"><saml:AttributeValue>admin</saml:AttributeValue></saml:Attribute></saml:AttributeStatement>"#,
                r#"</saml:Assertion></samlp:Response>"#,
            ),
            issued = issued,
            acs = self.destination,
            irt = irt,
            issuer = self.issuer,
            name_id = self.name_id,
            expires = expires,
            not_before = not_before,
            audience = self.audience,
        );

        let mut root = XmlParser::new().parse(&xml)?;
        let credential = key.credential()?;
        let signer = signer();

        if self.sign_assertion {
            let position = root
                .child_position(SAML_NS, "Assertion")
                .context("response has no assertion")?;
            let mut assertion = root
                .take_child(SAML_NS, "Assertion")
                .context("response has no assertion")?;
            signer.sign(&mut assertion, &credential)?;
            root.insert_child(position, assertion);
        }
        if self.sign_response {
            signer.sign(&mut root, &credential)?;
        }
        Ok(to_xml_string(&root))
    }
}

pub fn authenticated(outcome: PipelineOutcome) -> anyhow::Result<SamlAuthentication> {
    match outcome {
        PipelineOutcome::Authenticated(authentication) => Ok(*authentication),
        other => anyhow::bail!("expected authentication, got {other:?}"),
    }
}

pub fn rejected(outcome: PipelineOutcome) -> anyhow::Result<Rejection> {
    match outcome {
        PipelineOutcome::Rejected(rejection) => Ok(rejection),
        other => anyhow::bail!("expected rejection, got {other:?}"),
    }
}
