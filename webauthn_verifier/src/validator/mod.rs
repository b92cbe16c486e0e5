//! Registration and authentication ceremony pipelines.
//!
//! Each pipeline is a single ordered pass. The first failing step ends the ceremony
//! with that step's error.

mod authentication;
mod registration;
mod types;

use crate::config::{UserVerificationRequirement, ValidatorConfig};
use crate::decoder::AuthenticatorData;
use crate::errors::ValidationError;
use crate::utils::{constant_time_eq, sha256};

pub use authentication::AuthenticationValidator;
pub use registration::{AsyncRegistrationValidator, RegistrationValidator};
pub use types::{
    AuthenticationData, AuthenticationRequest, CredentialRecord, RegistrationData,
    RegistrationRequest,
};

fn verify_rp_id_hash(auth_data: &AuthenticatorData, rp_id: &str) -> Result<(), ValidationError> {
    if !constant_time_eq(auth_data.rp_id_hash(), &sha256(rp_id.as_bytes())) {
        tracing::debug!("rpIdHash does not match the hash of '{}'", rp_id);
        return Err(ValidationError::RpIdHashMismatch);
    }
    Ok(())
}

fn verify_flags(
    auth_data: &AuthenticatorData,
    config: &ValidatorConfig,
    requirement: Option<UserVerificationRequirement>,
) -> Result<(), ValidationError> {
    let uv_required = match requirement {
        Some(requirement) => requirement == UserVerificationRequirement::Required,
        None => config.requires_user_verification(),
    };

    if !auth_data.is_user_present() {
        return Err(ValidationError::UserNotPresent);
    }
    if uv_required && !auth_data.is_user_verified() {
        return Err(ValidationError::UserVerificationRequired);
    }
    if auth_data.is_backed_up() && !auth_data.is_backup_eligible() {
        return Err(ValidationError::InconsistentBackupFlags);
    }

    tracing::debug!(
        "User present: true, user verified: {}, backup eligible: {}, backed up: {}",
        auth_data.is_user_verified(),
        auth_data.is_backup_eligible(),
        auth_data.is_backed_up()
    );
    Ok(())
}

/// Rejects extensions the relying party did not request, when strict.
fn verify_extensions(
    auth_data: &AuthenticatorData,
    config: &ValidatorConfig,
) -> Result<(), ValidationError> {
    let Some(extensions) = auth_data.extensions() else {
        return Ok(());
    };
    for id in extensions.identifiers() {
        if config.allowed_extensions.iter().any(|allowed| allowed == id) {
            continue;
        }
        if config.strict_extensions {
            return Err(ValidationError::UnexpectedExtension(id.to_string()));
        }
        tracing::warn!("Ignoring unrequested authenticator extension {}", id);
    }
    Ok(())
}
