//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over SAML protocol objects and metadata.
//!
//! # Signing Algorithms
//!
//! - RSA-SHA256 (default)
//! - RSA-SHA384
//! - RSA-SHA512
//! - ECDSA-SHA256
//! - ECDSA-SHA384
//! - ECDSA-SHA512
//!
//! RSA-SHA1 and SHA-1 digests are only ever verified, and only when the
//! validator is told to allow them. They are never produced.

mod signer;
mod validator;

pub use signer::*;
pub use validator::*;

use saml_crypto::{EcCurve, HashAlgorithm, KeyKind};
use serde::{Deserialize, Serialize};

use crate::error::{SamlError, SamlResult};
use crate::types::{
    canonicalization_algorithms, digest_algorithms, signature_algorithms, Assertion, Response,
    EXC_C14N_NS, XMLDSIG_NS,
};
use crate::xml::{C14nMode, XmlElement};

/// Signature algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256.
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
    /// ECDSA with SHA-256.
    EcdsaSha256,
    /// ECDSA with SHA-384.
    EcdsaSha384,
    /// ECDSA with SHA-512.
    EcdsaSha512,
    /// Legacy RSA with SHA-1, verification only.
    RsaSha1,
}

impl SignatureAlgorithm {
    /// Returns the URI for this signature algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
            Self::EcdsaSha256 => signature_algorithms::ECDSA_SHA256,
            Self::EcdsaSha384 => signature_algorithms::ECDSA_SHA384,
            Self::EcdsaSha512 => signature_algorithms::ECDSA_SHA512,
            Self::RsaSha1 => signature_algorithms::RSA_SHA1,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            signature_algorithms::ECDSA_SHA256 => Some(Self::EcdsaSha256),
            signature_algorithms::ECDSA_SHA384 => Some(Self::EcdsaSha384),
            signature_algorithms::ECDSA_SHA512 => Some(Self::EcdsaSha512),
            signature_algorithms::RSA_SHA1 => Some(Self::RsaSha1),
            _ => None,
        }
    }

    /// Returns the primitive scheme used by the crypto layer.
    #[must_use]
    pub const fn scheme(&self) -> saml_crypto::SignatureAlgorithm {
        match self {
            Self::RsaSha256 => saml_crypto::SignatureAlgorithm::RsaSha256,
            Self::RsaSha384 => saml_crypto::SignatureAlgorithm::RsaSha384,
            Self::RsaSha512 => saml_crypto::SignatureAlgorithm::RsaSha512,
            Self::EcdsaSha256 => saml_crypto::SignatureAlgorithm::EcdsaSha256,
            Self::EcdsaSha384 => saml_crypto::SignatureAlgorithm::EcdsaSha384,
            Self::EcdsaSha512 => saml_crypto::SignatureAlgorithm::EcdsaSha512,
            Self::RsaSha1 => saml_crypto::SignatureAlgorithm::RsaSha1,
        }
    }

    /// Returns the algorithm that suits a key of the given kind.
    #[must_use]
    pub const fn for_key(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Rsa => Self::RsaSha256,
            KeyKind::Ec(EcCurve::P256) => Self::EcdsaSha256,
            KeyKind::Ec(EcCurve::P384) => Self::EcdsaSha384,
            KeyKind::Ec(EcCurve::P521) => Self::EcdsaSha512,
        }
    }

    /// Returns true if this algorithm uses a deprecated hash (SHA-1).
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::RsaSha1)
    }
}

/// Digest method for signature references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestMethod {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-384.
    Sha384,
    /// SHA-512.
    Sha512,
    /// Legacy SHA-1, verification only.
    Sha1,
}

impl DigestMethod {
    /// Returns the URI for this digest method.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::Sha256 => digest_algorithms::SHA256,
            Self::Sha384 => digest_algorithms::SHA384,
            Self::Sha512 => digest_algorithms::SHA512,
            Self::Sha1 => digest_algorithms::SHA1,
        }
    }

    /// Parses a digest method from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            digest_algorithms::SHA256 => Some(Self::Sha256),
            digest_algorithms::SHA384 => Some(Self::Sha384),
            digest_algorithms::SHA512 => Some(Self::Sha512),
            digest_algorithms::SHA1 => Some(Self::Sha1),
            _ => None,
        }
    }

    /// Returns the hash function.
    #[must_use]
    pub const fn hash(&self) -> HashAlgorithm {
        match self {
            Self::Sha256 => HashAlgorithm::Sha256,
            Self::Sha384 => HashAlgorithm::Sha384,
            Self::Sha512 => HashAlgorithm::Sha512,
            Self::Sha1 => HashAlgorithm::Sha1,
        }
    }

    /// Returns true for SHA-1.
    #[must_use]
    pub const fn is_deprecated(&self) -> bool {
        matches!(self, Self::Sha1)
    }
}

/// Canonicalization algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalizationAlgorithm {
    /// Exclusive C14N without comments.
    #[default]
    ExclusiveC14N,
    /// Exclusive C14N with comments.
    ExclusiveC14NWithComments,
    /// C14N without comments.
    C14N,
    /// C14N with comments.
    C14NWithComments,
}

impl CanonicalizationAlgorithm {
    /// Returns the URI for this canonicalization algorithm.
    #[must_use]
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::ExclusiveC14N => canonicalization_algorithms::EXCLUSIVE_C14N,
            Self::ExclusiveC14NWithComments => {
                canonicalization_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS
            }
            Self::C14N => canonicalization_algorithms::C14N,
            Self::C14NWithComments => canonicalization_algorithms::C14N_WITH_COMMENTS,
        }
    }

    /// Parses a canonicalization algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            canonicalization_algorithms::EXCLUSIVE_C14N => Some(Self::ExclusiveC14N),
            canonicalization_algorithms::EXCLUSIVE_C14N_WITH_COMMENTS => {
                Some(Self::ExclusiveC14NWithComments)
            }
            canonicalization_algorithms::C14N => Some(Self::C14N),
            canonicalization_algorithms::C14N_WITH_COMMENTS => Some(Self::C14NWithComments),
            _ => None,
        }
    }

    /// Returns the canonicalizer mode. Comments are already gone from the
    /// tree, so both variants of a family share a mode.
    #[must_use]
    pub const fn mode(&self) -> C14nMode {
        match self {
            Self::ExclusiveC14N | Self::ExclusiveC14NWithComments => C14nMode::Exclusive,
            Self::C14N | Self::C14NWithComments => C14nMode::Inclusive,
        }
    }
}

/// An XML signature as found in, or attached to, a signed element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// The signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// The reference digest method.
    pub digest: DigestMethod,
    /// Canonicalization applied to `SignedInfo`.
    pub canonicalization: CanonicalizationAlgorithm,
    /// `InclusiveNamespaces` prefix list of the `CanonicalizationMethod`.
    pub canonicalization_prefixes: Vec<String>,
    /// The reference URI, `#` followed by the signed element's ID.
    pub reference_uri: String,
    /// Transform URIs of the reference, in order.
    pub transforms: Vec<String>,
    /// `InclusiveNamespaces` prefix list of the reference's exclusive
    /// canonicalization transform.
    pub reference_prefixes: Vec<String>,
    /// Base64 digest value.
    pub digest_value: String,
    /// Base64 signature value.
    pub signature_value: String,
    /// Base64 DER certificate from `KeyInfo`, if any.
    pub certificate: Option<String>,
    /// Alias of the credential that produced or verified the signature.
    pub credential_alias: Option<String>,
}

impl Signature {
    /// Reads a `ds:Signature` element.
    ///
    /// # Errors
    ///
    /// Returns [`SamlError::SignatureInvalid`] if the structure is incomplete,
    /// holds more than one reference, or names an unknown algorithm.
    pub fn from_element(element: &XmlElement) -> SamlResult<Self> {
        let malformed = |what: &str| SamlError::SignatureInvalid(format!("malformed signature: {what}"));

        let signed_info = element
            .child(XMLDSIG_NS, "SignedInfo")
            .ok_or_else(|| malformed("no SignedInfo"))?;

        let c14n_method = signed_info
            .child(XMLDSIG_NS, "CanonicalizationMethod")
            .ok_or_else(|| malformed("no CanonicalizationMethod"))?;
        let c14n_uri = c14n_method
            .attribute("Algorithm")
            .ok_or_else(|| malformed("no CanonicalizationMethod algorithm"))?;
        let canonicalization = CanonicalizationAlgorithm::from_uri(c14n_uri).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("unsupported canonicalization {c14n_uri}"))
        })?;

        let alg_uri = signed_info
            .child(XMLDSIG_NS, "SignatureMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .ok_or_else(|| malformed("no SignatureMethod"))?;
        let algorithm = SignatureAlgorithm::from_uri(alg_uri).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("unsupported signature algorithm {alg_uri}"))
        })?;

        let mut references = signed_info.children_named(XMLDSIG_NS, "Reference");
        let reference = references.next().ok_or_else(|| malformed("no Reference"))?;
        if references.next().is_some() {
            return Err(malformed("more than one Reference"));
        }

        let reference_uri = reference
            .attribute("URI")
            .ok_or_else(|| malformed("Reference without URI"))?
            .to_string();
        let mut transforms = Vec::new();
        let mut reference_prefixes = Vec::new();
        if let Some(list) = reference.child(XMLDSIG_NS, "Transforms") {
            for transform in list.children_named(XMLDSIG_NS, "Transform") {
                let uri = transform
                    .attribute("Algorithm")
                    .ok_or_else(|| malformed("Transform without algorithm"))?;
                if CanonicalizationAlgorithm::from_uri(uri)
                    .is_some_and(|c| c.mode() == C14nMode::Exclusive)
                {
                    reference_prefixes = inclusive_prefixes(transform);
                }
                transforms.push(uri.to_string());
            }
        }

        let digest_uri = reference
            .child(XMLDSIG_NS, "DigestMethod")
            .and_then(|m| m.attribute("Algorithm"))
            .ok_or_else(|| malformed("no DigestMethod"))?;
        let digest = DigestMethod::from_uri(digest_uri).ok_or_else(|| {
            SamlError::SignatureInvalid(format!("unsupported digest method {digest_uri}"))
        })?;
        let digest_value = reference
            .child_text(XMLDSIG_NS, "DigestValue")
            .ok_or_else(|| malformed("no DigestValue"))?;

        let signature_value = element
            .child_text(XMLDSIG_NS, "SignatureValue")
            .ok_or_else(|| malformed("no SignatureValue"))?;

        let certificate = element
            .child(XMLDSIG_NS, "KeyInfo")
            .and_then(|k| k.child(XMLDSIG_NS, "X509Data"))
            .and_then(|d| d.child_text(XMLDSIG_NS, "X509Certificate"));

        let canonicalization_prefixes = if canonicalization.mode() == C14nMode::Exclusive {
            inclusive_prefixes(c14n_method)
        } else {
            Vec::new()
        };

        Ok(Self {
            algorithm,
            digest,
            canonicalization,
            canonicalization_prefixes,
            reference_uri,
            transforms,
            reference_prefixes,
            digest_value,
            signature_value,
            certificate,
            credential_alias: None,
        })
    }

    /// Returns the ID the reference points at.
    #[must_use]
    pub fn referenced_id(&self) -> Option<&str> {
        self.reference_uri.strip_prefix('#')
    }
}

/// Reads the `ec:InclusiveNamespaces` `PrefixList` of a transform or
/// canonicalization method.
fn inclusive_prefixes(method: &XmlElement) -> Vec<String> {
    method
        .child(EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|list| list.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Configuration for signature creation.
///
/// Canonicalization is always exclusive C14N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// The signature algorithm to use.
    pub algorithm: SignatureAlgorithm,
    /// The reference digest method.
    pub digest: DigestMethod,
}

impl SignatureConfig {
    /// Creates a configuration with the given algorithm and digest.
    #[must_use]
    pub const fn new(algorithm: SignatureAlgorithm, digest: DigestMethod) -> Self {
        Self { algorithm, digest }
    }

    /// Picks the default algorithm for a key kind, with SHA-256 digests.
    #[must_use]
    pub const fn for_key(kind: KeyKind) -> Self {
        Self::new(SignatureAlgorithm::for_key(kind), DigestMethod::Sha256)
    }
}

/// How the validator chooses among trusted credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMode {
    /// Only the first trusted credential is tried.
    FirstCandidate,
    /// Credentials whose key equals the certificate embedded in the signature
    /// are tried; with no embedded certificate every credential is tried.
    #[default]
    KeyMatch,
}

/// Objects that carry an enveloped signature.
pub trait Signable {
    /// The element the signature covers.
    fn signable_element(&self) -> &XmlElement;

    /// Mutable access for inserting a signature.
    fn signable_element_mut(&mut self) -> &mut XmlElement;

    /// Records a signature produced for or verified on this object.
    fn attach_signature(&mut self, _signature: Signature) {}

    /// Returns the enveloped `ds:Signature` child, if any.
    fn signature_element(&self) -> Option<&XmlElement> {
        self.signable_element().child(XMLDSIG_NS, "Signature")
    }
}

impl Signable for XmlElement {
    fn signable_element(&self) -> &XmlElement {
        self
    }

    fn signable_element_mut(&mut self) -> &mut XmlElement {
        self
    }
}

impl Signable for Response {
    fn signable_element(&self) -> &XmlElement {
        &self.element
    }

    fn signable_element_mut(&mut self) -> &mut XmlElement {
        &mut self.element
    }

    fn attach_signature(&mut self, signature: Signature) {
        self.signature = Some(signature);
    }
}

impl Signable for Assertion {
    fn signable_element(&self) -> &XmlElement {
        &self.element
    }

    fn signable_element_mut(&mut self) -> &mut XmlElement {
        &mut self.element
    }

    fn attach_signature(&mut self, signature: Signature) {
        self.signature = Some(signature);
    }
}
