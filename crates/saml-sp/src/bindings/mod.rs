//! SAML bindings used by the service provider.
//!
//! - **HTTP-POST**: responses arrive base64-encoded in a form field and
//!   requests can be sent through an auto-submitting form.
//! - **HTTP-Redirect**: requests are deflated, base64-encoded and carried in
//!   the query string, optionally with a detached query signature.

mod post;
mod redirect;

pub use post::*;
pub use redirect::*;

use redirect::inflate;

use crate::error::SamlResult;

/// SAML message type for binding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamlMessageType {
    /// AuthnRequest message.
    Request,
    /// Response message.
    Response,
}

impl SamlMessageType {
    /// Returns the form parameter name for this message type.
    #[must_use]
    pub const fn form_param(&self) -> &'static str {
        match self {
            Self::Request => "SAMLRequest",
            Self::Response => "SAMLResponse",
        }
    }
}

/// Decoded SAML binding message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage {
    /// The decoded XML message.
    pub xml: String,
    /// The message type (request or response).
    pub message_type: SamlMessageType,
    /// The RelayState if present.
    pub relay_state: Option<String>,
}

/// Decodes one `SAMLRequest`/`SAMLResponse` parameter value to XML text.
///
/// Redirect values are inflated after base64 decoding; POST values are not.
///
/// # Errors
///
/// Returns [`crate::SamlError::Base64Decode`], [`crate::SamlError::Deflate`]
/// or [`crate::SamlError::InvalidRequest`] for non UTF-8 content.
pub fn decode_saml_message(value: &str, is_redirect: bool) -> SamlResult<String> {
    let bytes = decode_base64(value)?;
    let xml = if is_redirect {
        inflate(&bytes)?
    } else {
        bytes
    };
    utf8(xml)
}

fn decode_base64(value: &str) -> SamlResult<Vec<u8>> {
    use base64::Engine;

    // IdPs commonly wrap the encoded message across lines.
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

fn utf8(bytes: Vec<u8>) -> SamlResult<String> {
    String::from_utf8(bytes).map_err(|e| {
        crate::error::SamlError::InvalidRequest(format!("invalid UTF-8 in message: {e}"))
    })
}
