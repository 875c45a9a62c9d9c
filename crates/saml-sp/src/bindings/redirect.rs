//! HTTP-Redirect binding.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::credential::Credential;
use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSigner;

use super::{decode_saml_message, DecodedMessage, SamlMessageType};

/// Upper bound on an inflated message.
const MAX_INFLATED_SIZE: u64 = 1024 * 1024;

/// HTTP-Redirect binding encoder/decoder.
pub struct HttpRedirectBinding;

impl HttpRedirectBinding {
    /// Builds the redirect URL for an unsigned request.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Deflate`] if compression fails.
    pub fn encode_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
    ) -> SamlResult<String> {
        let encoded = deflate_encode(xml)?;
        let mut query = format!(
            "{}={}",
            SamlMessageType::Request.form_param(),
            urlencoding::encode(&encoded)
        );
        if let Some(rs) = relay_state {
            query.push_str("&RelayState=");
            query.push_str(&urlencoding::encode(rs));
        }
        Ok(join(destination, &query))
    }

    /// Builds the redirect URL for a request with a detached query
    /// signature.
    ///
    /// # Errors
    ///
    /// Compression errors, and signing errors from
    /// [`XmlSigner::sign_redirect_query`].
    pub fn encode_signed_request(
        xml: &str,
        destination: &str,
        relay_state: Option<&str>,
        signer: &XmlSigner,
        credential: &Credential,
    ) -> SamlResult<String> {
        let encoded = deflate_encode(xml)?;
        let query = signer.sign_redirect_query(
            SamlMessageType::Request.form_param(),
            &encoded,
            relay_state,
            credential,
        )?;
        Ok(join(destination, &query))
    }

    /// Decodes already URL-decoded query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] when neither parameter is
    /// present, otherwise the errors of [`decode_saml_message`].
    pub fn decode(
        saml_request: Option<&str>,
        saml_response: Option<&str>,
        relay_state: Option<&str>,
    ) -> SamlResult<DecodedMessage> {
        let (encoded, message_type) = match (saml_request, saml_response) {
            (_, Some(response)) => (response, SamlMessageType::Response),
            (Some(request), None) => (request, SamlMessageType::Request),
            (None, None) => {
                return Err(SamlError::InvalidRequest(
                    "no SAMLRequest or SAMLResponse parameter".to_string(),
                ))
            }
        };

        Ok(DecodedMessage {
            xml: decode_saml_message(encoded, true)?,
            message_type,
            relay_state: relay_state.map(String::from),
        })
    }

    /// Decodes the message carried by a full redirect URL.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::InvalidRequest`] for an unparseable URL, then as
    /// [`HttpRedirectBinding::decode`].
    pub fn decode_url(url: &str) -> SamlResult<DecodedMessage> {
        let parsed = url::Url::parse(url)
            .map_err(|e| SamlError::InvalidRequest(format!("invalid URL: {e}")))?;

        let mut saml_request = None;
        let mut saml_response = None;
        let mut relay_state = None;

        for (key, value) in parsed.query_pairs() {
            match key.as_ref() {
                "SAMLRequest" => saml_request = Some(value.into_owned()),
                "SAMLResponse" => saml_response = Some(value.into_owned()),
                "RelayState" => relay_state = Some(value.into_owned()),
                _ => {}
            }
        }

        Self::decode(
            saml_request.as_deref(),
            saml_response.as_deref(),
            relay_state.as_deref(),
        )
    }
}

fn join(destination: &str, query: &str) -> String {
    let separator = if destination.contains('?') { '&' } else { '?' };
    format!("{destination}{separator}{query}")
}

/// Deflates and base64-encodes a message for the redirect binding.
///
/// # Errors
///
/// Returns [`SamlError::Deflate`] if compression fails.
pub fn deflate_encode(xml: &str) -> SamlResult<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(base64::engine::general_purpose::STANDARD.encode(compressed))
}

/// Inflates raw DEFLATE data.
pub(super) fn inflate(data: &[u8]) -> SamlResult<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data).take(MAX_INFLATED_SIZE + 1);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() as u64 > MAX_INFLATED_SIZE {
        return Err(SamlError::Deflate(format!(
            "inflated message exceeds {MAX_INFLATED_SIZE} bytes"
        )));
    }
    Ok(out)
}
