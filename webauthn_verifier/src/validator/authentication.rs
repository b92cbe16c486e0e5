use super::types::{AuthenticationData, AuthenticationRequest, CredentialRecord};
use super::{verify_extensions, verify_flags, verify_rp_id_hash};
use crate::config::ValidatorConfig;
use crate::crypto::verify_with_cose_key;
use crate::decoder::{AuthenticatorData, CollectedClientData, TYPE_GET};
use crate::errors::{StatementError, ValidationError};
use crate::utils::{concat, constant_time_eq, sha256};

/// Validates assertions against stored credentials.
pub struct AuthenticationValidator {
    config: ValidatorConfig,
}

impl AuthenticationValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Verifies an assertion made with `credential`.
    ///
    /// On success the caller stores `new_sign_count` for the credential.
    ///
    /// # Errors
    /// * `ValidationError::BadSignature` - the assertion was not made with the stored key
    /// * `ValidationError::CounterLowerThanStored` - the counter did not advance, the
    ///   authenticator may have been cloned
    pub fn validate(
        &self,
        request: &AuthenticationRequest,
        credential: &CredentialRecord,
    ) -> Result<AuthenticationData, ValidationError> {
        if !constant_time_eq(&request.credential_id, &credential.credential_id) {
            return Err(ValidationError::BadSignature(
                "assertion credential id does not match the stored credential".to_string(),
            ));
        }

        let auth_data = AuthenticatorData::decode(&request.authenticator_data)?;

        let client_data = CollectedClientData::from_bytes(&request.client_data_json)?;
        client_data.verify(TYPE_GET, &request.challenge, &self.config.origins)?;

        verify_rp_id_hash(&auth_data, &self.config.rp_id)?;
        verify_flags(&auth_data, &self.config, request.user_verification)?;

        let signed_data = concat(
            &request.authenticator_data,
            &sha256(&request.client_data_json),
        );
        verify_with_cose_key(&credential.public_key, &signed_data, &request.signature).map_err(
            |e| {
                tracing::debug!("Assertion signature verification failed: {:?}", e);
                ValidationError::BadSignature(StatementError::from(e).to_string())
            },
        )?;

        verify_counter(credential.sign_count, auth_data.sign_count())?;
        verify_extensions(&auth_data, &self.config)?;

        Ok(AuthenticationData {
            credential_id: credential.credential_id.clone(),
            new_sign_count: auth_data.sign_count(),
            user_verified: auth_data.is_user_verified(),
            backup_state: auth_data.is_backed_up(),
            extensions: auth_data.extensions().cloned(),
        })
    }
}

/// The counter must advance. Authenticators without a counter report zero every time.
fn verify_counter(stored: u32, received: u32) -> Result<(), ValidationError> {
    if received > stored || (received == 0 && stored == 0) {
        tracing::debug!("Sign count {} -> {}", stored, received);
        return Ok(());
    }
    tracing::warn!(
        "Sign count did not advance: stored {}, received {}. The authenticator may be cloned",
        stored,
        received
    );
    Err(ValidationError::CounterLowerThanStored { stored, received })
}
