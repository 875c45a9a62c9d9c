//! Service provider configuration.
//!
//! Loaded from serde sources or from `SAML_SP_*` environment variables, with
//! defaults for everything.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::signature::{DigestMethod, SignatureAlgorithm, SignatureConfig, VerificationMode};

/// Service provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpConfig {
    /// Path of the assertion consumer service.
    pub acs_path: String,

    /// HTTP methods accepted on the ACS path. `GET` means HTTP-Redirect.
    pub acs_methods: Vec<String>,

    /// Tolerated clock difference in milliseconds.
    pub clock_skew_ms: u64,

    /// Maximum age of the IdP authentication in milliseconds.
    pub max_authentication_age_ms: u64,

    /// Lifetime of an issued request ID in milliseconds.
    pub request_id_ttl_ms: u64,

    /// Size of the XML parser pool.
    pub parser_pool_size: usize,

    /// How trusted keys are picked for signature checks.
    pub verification_mode: VerificationMode,

    /// Accept unsigned assertions inside a signed response.
    pub trust_unsigned_assertions: bool,

    /// Require the response itself to be signed.
    pub require_signed_response: bool,

    /// Accept responses that answer no request.
    pub allow_unsolicited_responses: bool,

    /// Accept SHA-1 based signatures from remote parties.
    pub allow_sha1: bool,

    /// Algorithms for signatures this service provider produces.
    pub signature: SignatureConfig,
}

impl Default for SpConfig {
    fn default() -> Self {
        Self {
            acs_path: "/saml/SSO".to_string(),
            acs_methods: vec!["POST".to_string(), "GET".to_string()],
            clock_skew_ms: 120_000,
            max_authentication_age_ms: 86_400_000,
            request_id_ttl_ms: 300_000,
            parser_pool_size: 50,
            verification_mode: VerificationMode::KeyMatch,
            trust_unsigned_assertions: true,
            require_signed_response: true,
            allow_unsolicited_responses: true,
            allow_sha1: false,
            signature: SignatureConfig::default(),
        }
    }
}

impl SpConfig {
    /// Loads configuration from `SAML_SP_*` environment variables.
    ///
    /// Unset variables keep their default.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] for a variable whose value cannot
    /// be parsed.
    pub fn from_env() -> SamlResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] for a variable whose value cannot
    /// be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SamlResult<Self> {
        let defaults = Self::default();
        let number = |name: &str, default: u64| -> SamlResult<u64> {
            lookup(name).map_or(Ok(default), |v| parse_number(name, &v))
        };
        let flag = |name: &str, default: bool| -> SamlResult<bool> {
            lookup(name).map_or(Ok(default), |v| parse_flag(name, &v))
        };

        let acs_methods = lookup("SAML_SP_ACS_METHODS")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(str::to_uppercase)
                    .collect()
            })
            .unwrap_or(defaults.acs_methods);

        let verification_mode = match lookup("SAML_SP_VERIFICATION_MODE").as_deref() {
            None => defaults.verification_mode,
            Some("first-candidate") => VerificationMode::FirstCandidate,
            Some("key-match") => VerificationMode::KeyMatch,
            Some(other) => return Err(invalid("SAML_SP_VERIFICATION_MODE", other)),
        };

        let algorithm = match lookup("SAML_SP_SIGNATURE_ALGORITHM") {
            None => defaults.signature.algorithm,
            Some(uri) => SignatureAlgorithm::from_uri(&uri)
                .ok_or_else(|| invalid("SAML_SP_SIGNATURE_ALGORITHM", &uri))?,
        };
        let digest = match lookup("SAML_SP_DIGEST_METHOD") {
            None => defaults.signature.digest,
            Some(uri) => DigestMethod::from_uri(&uri)
                .ok_or_else(|| invalid("SAML_SP_DIGEST_METHOD", &uri))?,
        };

        let parser_pool_size = number(
            "SAML_SP_PARSER_POOL_SIZE",
            defaults.parser_pool_size as u64,
        )?;

        Ok(Self {
            acs_path: lookup("SAML_SP_ACS_PATH").unwrap_or(defaults.acs_path),
            acs_methods,
            clock_skew_ms: number("SAML_SP_CLOCK_SKEW_MS", defaults.clock_skew_ms)?,
            max_authentication_age_ms: number(
                "SAML_SP_MAX_AUTHENTICATION_AGE_MS",
                defaults.max_authentication_age_ms,
            )?,
            request_id_ttl_ms: number("SAML_SP_REQUEST_ID_TTL_MS", defaults.request_id_ttl_ms)?,
            parser_pool_size: usize::try_from(parser_pool_size)
                .map_err(|_| invalid("SAML_SP_PARSER_POOL_SIZE", &parser_pool_size.to_string()))?,
            verification_mode,
            trust_unsigned_assertions: flag(
                "SAML_SP_TRUST_UNSIGNED_ASSERTIONS",
                defaults.trust_unsigned_assertions,
            )?,
            require_signed_response: flag(
                "SAML_SP_REQUIRE_SIGNED_RESPONSE",
                defaults.require_signed_response,
            )?,
            allow_unsolicited_responses: flag(
                "SAML_SP_ALLOW_UNSOLICITED_RESPONSES",
                defaults.allow_unsolicited_responses,
            )?,
            allow_sha1: flag("SAML_SP_ALLOW_SHA1", defaults.allow_sha1)?,
            signature: SignatureConfig::new(algorithm, digest),
        })
    }

    /// Checks the settings for values the engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::Configuration`] describing the first problem.
    pub fn validate(&self) -> SamlResult<()> {
        if !self.acs_path.starts_with('/') {
            return Err(SamlError::Configuration(format!(
                "ACS path '{}' must start with '/'",
                self.acs_path
            )));
        }
        if self.acs_methods.is_empty() {
            return Err(SamlError::Configuration("no ACS method accepted".to_string()));
        }
        if let Some(method) = self.acs_methods.iter().find(|m| *m != "POST" && *m != "GET") {
            return Err(SamlError::Configuration(format!(
                "unsupported ACS method '{method}'"
            )));
        }
        if self.parser_pool_size == 0 {
            return Err(SamlError::Configuration(
                "parser pool size must be at least 1".to_string(),
            ));
        }
        if self.request_id_ttl_ms == 0 {
            return Err(SamlError::Configuration(
                "request ID lifetime must be positive".to_string(),
            ));
        }
        if self.signature.algorithm.is_deprecated() || self.signature.digest.is_deprecated() {
            return Err(SamlError::Configuration(
                "SHA-1 cannot be used for produced signatures".to_string(),
            ));
        }
        Ok(())
    }

    /// Clock skew as a duration.
    #[must_use]
    pub fn clock_skew(&self) -> Duration {
        millis(self.clock_skew_ms)
    }

    /// Maximum authentication age as a duration.
    #[must_use]
    pub fn max_authentication_age(&self) -> Duration {
        millis(self.max_authentication_age_ms)
    }

    /// Request ID lifetime as a duration.
    #[must_use]
    pub fn request_id_ttl(&self) -> Duration {
        millis(self.request_id_ttl_ms)
    }
}

fn invalid(name: &str, value: &str) -> SamlError {
    SamlError::Configuration(format!("invalid value '{value}' for {name}"))
}

fn parse_number(name: &str, value: &str) -> SamlResult<u64> {
    value.trim().parse().map_err(|_| invalid(name, value))
}

fn parse_flag(name: &str, value: &str) -> SamlResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn millis(value: u64) -> Duration {
    Duration::milliseconds(i64::try_from(value).unwrap_or(i64::MAX))
}
