//! Namespace-aware XML tree, pooled parser and canonicalization.
//!
//! The tree keeps everything XML signatures depend on: element and attribute
//! prefixes, resolved namespace URIs, the namespace declarations made on each
//! element and the full in-scope namespace map. Comments and processing
//! instructions are not retained; documents carrying a `DOCTYPE` are refused.
//!
//! Parsing goes through an [`XmlContext`], which owns a bounded
//! [`ParserPool`] and must be initialized once before first use.

mod c14n;
mod context;
mod node;
mod parser;
mod pool;
mod writer;

pub use c14n::{canonicalize, canonicalize_with_prefixes, C14nMode};
pub use context::XmlContext;
pub use node::{XmlAttribute, XmlElement, XmlNode, XML_NS};
pub use parser::XmlParser;
pub use pool::{ParserPool, PooledParser};
pub use writer::{to_document_string, to_xml_string};

pub(crate) use c14n::{escape_attribute, escape_text};
