//! The view of an HTTP request the pipeline needs.

use std::collections::HashMap;

use crate::error::{SamlError, SamlResult};

/// An inbound HTTP request.
///
/// Implemented by the embedding web layer; parameters are form fields for
/// `POST` and query parameters for `GET`, already URL-decoded.
pub trait SamlHttpRequest {
    /// HTTP method.
    fn method(&self) -> &str;

    /// Request path, without query.
    fn path(&self) -> &str;

    /// Full URL the request was received on.
    fn request_url(&self) -> &str;

    /// Looks up a parameter.
    fn parameter(&self, name: &str) -> Option<&str>;

    /// URL without query or fragment.
    fn endpoint_url(&self) -> &str {
        let url = self.request_url();
        url.split(['?', '#']).next().unwrap_or(url)
    }
}

/// Owned [`SamlHttpRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleHttpRequest {
    method: String,
    url: String,
    path: String,
    parameters: HashMap<String, String>,
}

impl SimpleHttpRequest {
    /// Creates a request; query parameters of `url` become parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] if `url` is not absolute.
    pub fn new(method: &str, url: &str) -> SamlResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidRequest(format!("invalid URL '{url}': {e}")))?;
        let parameters = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(Self {
            method: method.to_uppercase(),
            path: parsed.path().to_string(),
            url: url.to_string(),
            parameters,
        })
    }

    /// A `POST` to `url`.
    ///
    /// # Errors
    ///
    /// See [`SimpleHttpRequest::new`].
    pub fn post(url: &str) -> SamlResult<Self> {
        Self::new("POST", url)
    }

    /// Adds or replaces a parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

impl SamlHttpRequest for SimpleHttpRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn request_url(&self) -> &str {
        &self.url
    }

    fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}
