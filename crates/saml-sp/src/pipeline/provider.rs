//! The locally hosted service provider.

use std::sync::Arc;

use chrono::Utc;

use crate::bindings::HttpRedirectBinding;
use crate::config::SpConfig;
use crate::credential::{Credential, KeyStore, KeyUsage};
use crate::error::{SamlError, SamlResult};
use crate::metadata::{
    IdentityProviderRole, Metadata, MetadataRegistry, MetadataWriter, ServiceProviderRole,
};
use crate::signature::XmlSigner;
use crate::types::{AuthnRequest, SamlBinding};
use crate::validation::RequestIdStore;

/// A service provider hosted by this process, with its trusted remotes.
#[derive(Debug)]
pub struct HostedServiceProvider {
    metadata: Metadata,
    service_provider: ServiceProviderRole,
    keys: KeyStore,
    signing_key_alias: Option<String>,
    remote_providers: Arc<MetadataRegistry>,
    request_ids: Arc<dyn RequestIdStore>,
    config: SpConfig,
}

impl HostedServiceProvider {
    /// Creates a hosted provider.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if `metadata` has no service
    /// provider role or `config` is invalid.
    pub fn new(
        metadata: Metadata,
        keys: KeyStore,
        remote_providers: Arc<MetadataRegistry>,
        request_ids: Arc<dyn RequestIdStore>,
        config: SpConfig,
    ) -> SamlResult<Self> {
        config.validate()?;
        let service_provider = metadata.service_provider().cloned().ok_or_else(|| {
            SamlError::Configuration(format!(
                "metadata of '{}' has no service provider role",
                metadata.entity_id
            ))
        })?;

        Ok(Self {
            metadata,
            service_provider,
            keys,
            signing_key_alias: None,
            remote_providers,
            request_ids,
            config,
        })
    }

    /// Names the key used for requests and metadata.
    #[must_use]
    pub fn with_signing_key(mut self, alias: impl Into<String>) -> Self {
        self.signing_key_alias = Some(alias.into());
        self
    }

    /// Entity ID of this provider.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.metadata.entity_id
    }

    /// Local metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Local service provider role.
    #[must_use]
    pub fn service_provider(&self) -> &ServiceProviderRole {
        &self.service_provider
    }

    /// Settings.
    #[must_use]
    pub fn config(&self) -> &SpConfig {
        &self.config
    }

    /// Trusted remote providers.
    #[must_use]
    pub fn remote_providers(&self) -> &Arc<MetadataRegistry> {
        &self.remote_providers
    }

    /// Looks up a trusted remote provider.
    #[must_use]
    pub fn remote_provider(&self, entity_id: &str) -> Option<Arc<Metadata>> {
        self.remote_providers.get(entity_id)
    }

    /// Outstanding request IDs.
    #[must_use]
    pub fn request_ids(&self) -> &Arc<dyn RequestIdStore> {
        &self.request_ids
    }

    /// Resolves the signing credential.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::CredentialResolution`] if no signing key is
    /// configured or it cannot be resolved.
    pub fn signing_credential(&self) -> SamlResult<Credential> {
        let alias = self.signing_key_alias.as_deref().ok_or_else(|| {
            SamlError::CredentialResolution(format!(
                "no signing key configured for '{}'",
                self.entity_id()
            ))
        })?;
        self.keys.resolve(alias, KeyUsage::Signing)
    }

    /// Creates an `AuthnRequest` for `idp_entity_id` and records its ID so
    /// the response can be correlated.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::UnknownIdentityProvider`] if the IdP is not
    /// trusted.
    pub fn create_authn_request(&self, idp_entity_id: &str) -> SamlResult<AuthnRequest> {
        let idp = self.identity_provider(idp_entity_id)?;

        let mut request = AuthnRequest::new(self.entity_id()).with_binding(SamlBinding::HttpPost);
        if let Some(acs) = self.service_provider().default_acs() {
            request = request.with_acs_url(acs.location.as_str());
        }
        if let Some(sso) = idp
            .sso_endpoint(SamlBinding::HttpRedirect)
            .or_else(|| idp.sso_endpoint(SamlBinding::HttpPost))
        {
            request = request.with_destination(sso.location.as_str());
        }

        let expires_at = request.issue_instant + self.config.request_id_ttl();
        self.request_ids.register(&request.id, expires_at);
        tracing::debug!(
            request_id = %request.id,
            idp = idp_entity_id,
            %expires_at,
            "authentication request created"
        );
        Ok(request)
    }

    /// Creates a request and encodes it as an HTTP-Redirect URL.
    ///
    /// The query is signed when this provider or the IdP asks for signed
    /// requests.
    ///
    /// # Errors
    ///
    /// [`SamlError::Configuration`] when the IdP has no redirect SSO
    /// endpoint; credential and signing errors when a signature is needed.
    pub fn authn_request_redirect(
        &self,
        idp_entity_id: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        let idp = self.identity_provider(idp_entity_id)?;
        let destination = idp
            .sso_endpoint(SamlBinding::HttpRedirect)
            .ok_or_else(|| {
                SamlError::Configuration(format!(
                    "'{idp_entity_id}' has no HTTP-Redirect single sign-on endpoint"
                ))
            })?
            .location
            .clone();
        let sign = self.service_provider().authn_requests_signed || idp.want_authn_requests_signed;

        let credential = if sign { Some(self.signing_credential()?) } else { None };

        let request = self.create_authn_request(idp_entity_id)?;
        let xml = request.to_xml();
        match credential {
            Some(credential) => {
                let signer = XmlSigner::new(self.config.signature);
                HttpRedirectBinding::encode_signed_request(&xml, &destination, relay_state, &signer, &credential)
            }
            None => HttpRedirectBinding::encode_request(&xml, &destination, relay_state),
        }
    }

    /// Serializes local metadata, signed when a signing key is configured.
    ///
    /// # Errors
    ///
    /// Credential and signing errors.
    pub fn metadata_xml(&self) -> SamlResult<String> {
        if self.signing_key_alias.is_none() {
            return MetadataWriter::to_xml(&self.metadata, None);
        }
        let credential = self.signing_credential()?;
        let signer = XmlSigner::new(self.config.signature);
        MetadataWriter::to_xml(&self.metadata, Some((&signer, &credential)))
    }

    fn identity_provider(&self, entity_id: &str) -> SamlResult<IdentityProviderRole> {
        self.remote_provider(entity_id)
            .and_then(|m| m.identity_provider().cloned())
            .ok_or_else(|| SamlError::UnknownIdentityProvider(entity_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{HttpRedirectBinding, SamlMessageType};
    use crate::credential::SimpleKey;
    use crate::metadata::{Endpoint, Provider};
    use crate::signature::{
        DigestMethod, SignatureAlgorithm, SignatureConfig, VerificationMode, XmlSignatureValidator,
    };
    use crate::validation::InMemoryRequestIdStore;

    fn sp_metadata(signed: bool) -> Metadata {
        Metadata::new("sp1").with_provider(Provider::ServiceProvider(ServiceProviderRole {
            authn_requests_signed: signed,
            assertion_consumer_services: vec![
                Endpoint::new(SamlBinding::HttpPost, "https://sp/saml/SSO").indexed(0, true),
            ],
            ..ServiceProviderRole::default()
        }))
    }

    fn idp_registry() -> Arc<MetadataRegistry> {
        let idp = IdentityProviderRole {
            single_sign_on_services: vec![Endpoint::new(SamlBinding::HttpRedirect, "https://idp/sso")],
            ..IdentityProviderRole::default()
        };
        Arc::new(MetadataRegistry::from_metadata([
            Metadata::new("https://idp").with_provider(Provider::IdentityProvider(idp)),
        ]))
    }

    fn hosted(signed: bool) -> (HostedServiceProvider, Arc<InMemoryRequestIdStore>, SimpleKey) {
        let certified = rcgen::generate_simple_self_signed(vec!["sp".to_string()]).unwrap();
        let key = SimpleKey::new("sp-signing")
            .with_certificate(certified.cert.pem())
            .with_private_key(certified.key_pair.serialize_pem(), None);
        let store = Arc::new(InMemoryRequestIdStore::new());
        let config = SpConfig {
            signature: SignatureConfig::new(SignatureAlgorithm::EcdsaSha256, DigestMethod::Sha256),
            ..SpConfig::default()
        };
        let provider = HostedServiceProvider::new(
            sp_metadata(signed),
            KeyStore::from_keys([key.clone()]),
            idp_registry(),
            store.clone(),
            config,
        )
        .unwrap()
        .with_signing_key("sp-signing");
        (provider, store, key)
    }

    #[test]
    fn authn_request_is_registered() {
        let (provider, store, _) = hosted(false);
        let request = provider.create_authn_request("https://idp").unwrap();

        assert_eq!(request.issuer, "sp1");
        assert_eq!(request.destination.as_deref(), Some("https://idp/sso"));
        assert_eq!(request.assertion_consumer_service_url.as_deref(), Some("https://sp/saml/SSO"));
        assert!(store.consume(&request.id, Utc::now()));
    }

    #[test]
    fn unknown_idp_is_refused() {
        let (provider, store, _) = hosted(false);
        assert!(matches!(
            provider.create_authn_request("https://stranger"),
            Err(SamlError::UnknownIdentityProvider(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn signed_redirect_carries_verifiable_signature() {
        let (provider, _, key) = hosted(true);
        let url = provider.authn_request_redirect("https://idp", Some("rs")).unwrap();

        let (_, query) = url.split_once('?').unwrap();
        let public = crate::credential::resolve_credential(
            &SimpleKey::new("sp").with_certificate(key.certificate.clone().unwrap()),
            KeyUsage::Verification,
        )
        .unwrap();
        XmlSignatureValidator::new(VerificationMode::KeyMatch)
            .verify_redirect_query(query, &[public])
            .unwrap();

        let message = HttpRedirectBinding::decode_url(&url).unwrap();
        assert_eq!(message.message_type, SamlMessageType::Request);
        assert!(message.xml.contains("AuthnRequest"));
    }

    #[test]
    fn unsigned_redirect_has_no_signature() {
        let (provider, _, _) = hosted(false);
        let url = provider.authn_request_redirect("https://idp", None).unwrap();
        assert!(!url.contains("Signature="));
    }

    #[test]
    fn signing_failure_leaves_no_outstanding_request() {
        let store = Arc::new(InMemoryRequestIdStore::new());
        let provider = HostedServiceProvider::new(
            sp_metadata(true),
            KeyStore::default(),
            idp_registry(),
            store.clone(),
            SpConfig::default(),
        )
        .unwrap()
        .with_signing_key("absent");

        assert!(matches!(
            provider.authn_request_redirect("https://idp", None),
            Err(SamlError::CredentialResolution(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn metadata_without_sp_role_is_refused() {
        let err = HostedServiceProvider::new(
            Metadata::new("sp1"),
            KeyStore::default(),
            idp_registry(),
            Arc::new(InMemoryRequestIdStore::new()),
            SpConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SamlError::Configuration(_)));
    }

    #[test]
    fn published_metadata_is_signed() {
        let (provider, _, _) = hosted(false);
        let xml = provider.metadata_xml().unwrap();
        assert!(xml.contains("<ds:Signature"));
        assert!(xml.contains("entityID=\"sp1\""));
    }
}
