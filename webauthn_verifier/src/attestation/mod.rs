//! Attestation statement validators, one per attestation format.

mod android_key;
mod android_safetynet;
mod apple;
mod certificate;
mod none;
mod packed;
mod tpm;
mod u2f;

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::ValidatorConfig;
use crate::decoder::{AttestationFormat, AttestationObject, AttestationStatement};
use crate::errors::ValidationError;

use android_key::verify_android_key_attestation;
use android_safetynet::verify_android_safetynet_attestation;
use apple::verify_apple_attestation;
use none::verify_none_attestation;
use packed::verify_packed_attestation;
use tpm::verify_tpm_attestation;
use u2f::verify_u2f_attestation;

/// How the attestation vouches for the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttestationType {
    None,
    Basic,
    SelfAttestation,
    AttCa,
    AnonCa,
}

impl fmt::Display for AttestationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttestationType::None => "none",
            AttestationType::Basic => "basic",
            AttestationType::SelfAttestation => "self",
            AttestationType::AttCa => "attca",
            AttestationType::AnonCa => "anonca",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful statement validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAttestation {
    pub format: AttestationFormat,
    pub attestation_type: AttestationType,
    /// DER certificates, leaf first. Empty for `none` and self attestation.
    pub trust_path: Vec<Vec<u8>>,
}

/// Dispatches the attestation statement to the validator of its format.
///
/// # Errors
/// * `ValidationError::UnsupportedFormat` - no validator exists for the format
/// * `ValidationError::Statement` - the format specific verification failed
pub(crate) fn verify_attestation(
    attestation: &AttestationObject,
    client_data_hash: &[u8],
    config: &ValidatorConfig,
    now: DateTime<Utc>,
) -> Result<VerifiedAttestation, ValidationError> {
    let auth_data = attestation.authenticator_data();
    let auth_data_bytes = attestation.authenticator_data_bytes();

    let (format, result) = match attestation.statement() {
        AttestationStatement::None => {
            // for platform authenticators
            tracing::debug!("Using 'none' attestation format");
            (AttestationFormat::None, verify_none_attestation())
        }
        AttestationStatement::FidoU2f(stmt) => {
            tracing::debug!("Using 'fido-u2f' attestation format");
            (
                AttestationFormat::FidoU2f,
                verify_u2f_attestation(stmt, auth_data, client_data_hash),
            )
        }
        AttestationStatement::Packed(stmt) => {
            tracing::debug!("Using 'packed' attestation format");
            (
                AttestationFormat::Packed,
                verify_packed_attestation(stmt, auth_data, auth_data_bytes, client_data_hash),
            )
        }
        AttestationStatement::Tpm(stmt) => {
            tracing::debug!("Using 'tpm' attestation format");
            (
                AttestationFormat::Tpm,
                verify_tpm_attestation(stmt, auth_data, auth_data_bytes, client_data_hash),
            )
        }
        AttestationStatement::AndroidKey(stmt) => {
            tracing::debug!("Using 'android-key' attestation format");
            (
                AttestationFormat::AndroidKey,
                verify_android_key_attestation(
                    stmt,
                    auth_data,
                    auth_data_bytes,
                    client_data_hash,
                    config.android_key.tee_enforced_only,
                ),
            )
        }
        AttestationStatement::AndroidSafetyNet(stmt) => {
            tracing::debug!("Using 'android-safetynet' attestation format");
            (
                AttestationFormat::AndroidSafetyNet,
                verify_android_safetynet_attestation(
                    stmt,
                    auth_data_bytes,
                    client_data_hash,
                    &config.safetynet,
                    now,
                ),
            )
        }
        AttestationStatement::AppleAnonymous(stmt) => {
            tracing::debug!("Using 'apple' attestation format");
            (
                AttestationFormat::AppleAnonymous,
                verify_apple_attestation(stmt, auth_data, auth_data_bytes, client_data_hash),
            )
        }
        AttestationStatement::Unsupported { format, .. } => {
            return Err(ValidationError::UnsupportedFormat(format.clone()));
        }
    };

    result.map_err(|e| {
        tracing::debug!("{} attestation verification failed: {}", format, e);
        ValidationError::statement(format, e)
    })
}
