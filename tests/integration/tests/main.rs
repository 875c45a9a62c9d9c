//! End-to-end tests.
//!
//! These tests drive the service provider the way an embedding web layer
//! would: IdP metadata is resolved from XML, responses are signed with
//! generated IdP keys and posted to the authentication pipeline.

mod common;
mod concurrency;
mod metadata;
mod sso_flow;
