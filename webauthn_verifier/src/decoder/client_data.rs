use serde::Deserialize;

use crate::errors::ValidationError;
use crate::utils::{base64url_decode, constant_time_eq};

pub(crate) const TYPE_CREATE: &str = "webauthn.create";
pub(crate) const TYPE_GET: &str = "webauthn.get";

/// The parsed `clientDataJSON` collected by the browser.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CollectedClientData {
    #[serde(rename = "type")]
    pub type_: String,
    /// base64url encoded challenge
    pub challenge: String,
    pub origin: String,
    #[serde(rename = "crossOrigin", default)]
    pub cross_origin: bool,
}

impl CollectedClientData {
    pub fn from_bytes(client_data_json: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(client_data_json)
            .map_err(|e| ValidationError::ClientData(format!("Invalid JSON: {e}")))
    }

    /// Checks ceremony type, challenge and origin.
    pub(crate) fn verify(
        &self,
        expected_type: &str,
        expected_challenge: &[u8],
        allowed_origins: &[String],
    ) -> Result<(), ValidationError> {
        if self.type_ != expected_type {
            return Err(ValidationError::ClientData(format!(
                "Invalid type. Expected '{}', Got: {}",
                expected_type, self.type_
            )));
        }

        let challenge = base64url_decode(&self.challenge)
            .map_err(|e| ValidationError::ClientData(format!("Invalid challenge encoding: {e}")))?;
        if !constant_time_eq(&challenge, expected_challenge) {
            tracing::debug!("Challenge in client data does not match the expected challenge");
            return Err(ValidationError::ChallengeMismatch);
        }

        if !allowed_origins.iter().any(|o| *o == self.origin) {
            return Err(ValidationError::OriginMismatch(self.origin.clone()));
        }

        if self.cross_origin {
            tracing::debug!("Client data reports a cross-origin ceremony");
        }

        Ok(())
    }
}
