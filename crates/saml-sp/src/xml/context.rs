//! Explicitly initialized parsing context.

use std::sync::OnceLock;

use crate::error::{SamlError, SamlResult};

use super::node::XmlElement;
use super::pool::ParserPool;

/// Owner of the parser pool used by metadata resolution and the
/// authentication pipeline.
///
/// A context is created with a pool size and becomes usable after
/// [`XmlContext::initialize`]. Initialization happens once; later calls are
/// no-ops. The context is shared behind an `Arc`.
#[derive(Debug)]
pub struct XmlContext {
    pool_size: usize,
    pool: OnceLock<ParserPool>,
}

impl XmlContext {
    /// Creates an uninitialized context.
    #[must_use]
    pub const fn new(pool_size: usize) -> Self {
        Self {
            pool_size,
            pool: OnceLock::new(),
        }
    }

    /// Creates and initializes a context in one step.
    ///
    /// # Errors
    ///
    /// See [`XmlContext::initialize`].
    pub fn initialized(pool_size: usize) -> SamlResult<Self> {
        let context = Self::new(pool_size);
        context.initialize()?;
        Ok(context)
    }

    /// Creates the parser pool.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] if the pool size is zero.
    pub fn initialize(&self) -> SamlResult<()> {
        if self.pool_size == 0 {
            return Err(SamlError::Configuration(
                "parser pool size must be at least 1".to_string(),
            ));
        }
        self.pool.get_or_init(|| {
            tracing::debug!(pool_size = self.pool_size, "XML context initialized");
            ParserPool::new(self.pool_size)
        });
        Ok(())
    }

    /// Returns true once [`XmlContext::initialize`] has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.pool.get().is_some()
    }

    /// Returns the pool, if initialized.
    #[must_use]
    pub fn pool(&self) -> Option<&ParserPool> {
        self.pool.get()
    }

    /// Parses a document with a pooled parser.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] before initialization and
    /// [`SamlError::XmlParse`] for malformed documents.
    pub fn parse(&self, xml: &str) -> SamlResult<XmlElement> {
        let pool = self.pool.get().ok_or_else(|| {
            SamlError::Configuration("XML context used before initialize()".to_string())
        })?;
        let mut parser = pool.checkout();
        parser.parse(xml)
    }

    /// Parses UTF-8 bytes.
    ///
    /// # Errors
    ///
    /// As [`XmlContext::parse`], plus [`SamlError::XmlParse`] for invalid UTF-8.
    pub fn parse_bytes(&self, bytes: &[u8]) -> SamlResult<XmlElement> {
        let xml = std::str::from_utf8(bytes)
            .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}")))?;
        self.parse(xml)
    }
}

impl Default for XmlContext {
    fn default() -> Self {
        Self::new(50)
    }
}
