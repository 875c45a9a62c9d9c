//! HTTP-POST binding.

use base64::Engine;

use crate::error::{SamlError, SamlResult};

use super::{decode_saml_message, DecodedMessage, SamlMessageType};

/// HTTP-POST binding encoder/decoder.
pub struct HttpPostBinding;

impl HttpPostBinding {
    /// Encodes a SAML request as an auto-submitting HTML form.
    #[must_use]
    pub fn encode_request(xml: &str, destination: &str, relay_state: Option<&str>) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(xml);

        let relay_state_input = relay_state
            .map(|rs| {
                format!(
                    r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                    html_escape(rs)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>SAML POST Binding</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="post" action="{}">
        <input type="hidden" name="{}" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
            html_escape(destination),
            SamlMessageType::Request.form_param(),
            encoded,
            relay_state_input
        )
    }

    /// Decodes the form fields of a POST carrying a SAML message.
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
            xml: decode_saml_message(encoded, false)?,
            message_type,
            relay_state: relay_state.map(String::from),
        })
    }
}

/// Escapes HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
