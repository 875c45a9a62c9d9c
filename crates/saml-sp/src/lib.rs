//! SAML 2.0 Service Provider engine.
//!
//! This crate turns SAML metadata into a trust model, signs and verifies
//! XML-DSig signatures over SAML objects, and decides whether a response
//! posted to the assertion consumer service authenticates a user:
//!
//! - **Metadata** - Resolve `EntityDescriptor` documents, optionally signed
//! - **XML signature** - Enveloped signatures with key selection by alias
//! - **Response validation** - Time, audience, destination, subject
//!   confirmation and request correlation rules
//! - **Authentication pipeline** - Decode, parse, locate the IdP, verify,
//!   validate, then authenticate or reject
//!
//! # Architecture
//!
//! - [`xml`] - Namespace-aware tree, parser pool and canonicalization
//! - [`types`] - SAML protocol types
//! - [`credential`] - Keys and credential resolution by alias
//! - [`signature`] - XML signature signing and validation
//! - [`metadata`] - Metadata model, resolver, writer and registry
//! - [`bindings`] - POST and Redirect binding codecs
//! - [`validation`] - Response rules and the replay store
//! - [`pipeline`] - Hosted service provider and the ACS pipeline
//! - [`config`] - Settings
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use saml_sp::{AuthenticationPipeline, PipelineOutcome, XmlContext};
//!
//! let pipeline = AuthenticationPipeline::new(hosted_sp, Arc::new(XmlContext::new(50)))?;
//! match pipeline.process(&request) {
//!     PipelineOutcome::Authenticated(auth) => start_session(auth.principal_name()),
//!     PipelineOutcome::Rejected(rejection) => respond_401(rejection.public_message()),
//!     PipelineOutcome::NotApplicable => next_handler(request),
//! }
//! ```
//!
//! # SAML Specifications
//!
//! - [SAML 2.0 Core](https://docs.oasis-open.org/security/saml/v2.0/saml-core-2.0-os.pdf)
//! - [SAML 2.0 Bindings](https://docs.oasis-open.org/security/saml/v2.0/saml-bindings-2.0-os.pdf)
//! - [SAML 2.0 Metadata](https://docs.oasis-open.org/security/saml/v2.0/saml-metadata-2.0-os.pdf)
//! - [XML Signature](https://www.w3.org/TR/xmldsig-core1/)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bindings;
pub mod config;
pub mod credential;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod signature;
pub mod types;
pub mod validation;
pub mod xml;

pub use config::SpConfig;
pub use credential::{Credential, KeyStore, KeyType, KeyUsage, SimpleKey};
pub use error::{ErrorKind, SamlError, SamlResult, ValidationRule};
pub use metadata::{Metadata, MetadataRegistry, MetadataResolver, MetadataWriter, Provider};
pub use pipeline::{
    AuthenticationPipeline, HostedServiceProvider, PipelineOutcome, PipelineState, Rejection,
    SamlAuthentication, SamlHttpRequest, SimpleHttpRequest,
};
pub use signature::{
    Signature, SignatureConfig, VerificationMode, XmlSignatureValidator, XmlSigner,
};
pub use validation::{InMemoryRequestIdStore, RequestIdStore, ResponseValidator};
pub use xml::XmlContext;
pub use types::*;
