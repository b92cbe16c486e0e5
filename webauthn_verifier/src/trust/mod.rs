//! Trustworthiness of verified attestations.
//!
//! Turns a [`VerifiedAttestation`] and the trust anchors resolved for it into a
//! [`TrustVerdict`]. Whether a verdict is acceptable is decided by the trust policy
//! of the registration pipeline, not here.

mod certpath;
mod revocation;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use x509_parser::time::ASN1Time;

use crate::anchor::TrustAnchorSet;
use crate::attestation::{AttestationType, VerifiedAttestation};
use crate::config::PathValidationConfig;
use crate::errors::CertificateError;

use certpath::CertPathValidator;

pub use revocation::{CrlSource, InMemoryCrlSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustVerdict {
    /// The attestation chain terminates at a trust anchor
    Trusted { anchor_subject: String },
    /// Signed by the credential key itself, so nothing vouches for the authenticator
    SelfAttested,
    /// The authenticator declined to attest
    NoAttestation,
    /// No trust anchors are known for the authenticator
    Untrusted,
}

impl fmt::Display for TrustVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustVerdict::Trusted { anchor_subject } => write!(f, "trusted ({anchor_subject})"),
            TrustVerdict::SelfAttested => f.write_str("self-attested, untrusted"),
            TrustVerdict::NoAttestation => f.write_str("none"),
            TrustVerdict::Untrusted => f.write_str("untrusted"),
        }
    }
}

/// Validates attestation certificate paths against trust anchors.
pub struct TrustworthinessValidator {
    path_validator: CertPathValidator,
}

impl TrustworthinessValidator {
    /// `crl_source` is only consulted when revocation checking is enabled.
    pub fn new(config: PathValidationConfig, crl_source: Option<Arc<dyn CrlSource>>) -> Self {
        Self {
            path_validator: CertPathValidator::new(config, crl_source),
        }
    }

    /// # Errors
    /// * `CertificateError` - the trust path is empty or fails path validation against a
    ///   non-empty anchor set
    pub fn validate(
        &self,
        attestation: &VerifiedAttestation,
        anchors: &TrustAnchorSet,
        now: DateTime<Utc>,
    ) -> Result<TrustVerdict, CertificateError> {
        match attestation.attestation_type {
            AttestationType::None => return Ok(TrustVerdict::NoAttestation),
            AttestationType::SelfAttestation => return Ok(TrustVerdict::SelfAttested),
            AttestationType::Basic | AttestationType::AttCa | AttestationType::AnonCa => {}
        }

        if attestation.trust_path.is_empty() {
            return Err(CertificateError::EmptyPath);
        }
        if anchors.is_empty() {
            tracing::debug!(
                "No trust anchors for {} attestation, verdict is untrusted",
                attestation.format
            );
            return Ok(TrustVerdict::Untrusted);
        }

        let now = ASN1Time::from_timestamp(now.timestamp())
            .map_err(|e| CertificateError::Parse(format!("Invalid validation time: {e}")))?;
        let anchor = self
            .path_validator
            .validate(&attestation.trust_path, anchors, now)?;

        Ok(TrustVerdict::Trusted {
            anchor_subject: anchor.subject().to_string(),
        })
    }
}
