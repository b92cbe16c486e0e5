use crate::attestation::AttestationType;
use crate::config::UserVerificationRequirement;
use crate::decoder::{Aaguid, AttestationFormat, AuthenticatorExtensions, CoseKey};
use crate::trust::TrustVerdict;

/// Raw inputs of a registration ceremony.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    /// CBOR attestation object
    pub attestation_object: Vec<u8>,
    pub client_data_json: Vec<u8>,
    /// The challenge issued for this ceremony
    pub challenge: Vec<u8>,
    /// Overrides the configured user verification requirement
    pub user_verification: Option<UserVerificationRequirement>,
}

impl RegistrationRequest {
    pub fn new(attestation_object: Vec<u8>, client_data_json: Vec<u8>, challenge: Vec<u8>) -> Self {
        Self {
            attestation_object,
            client_data_json,
            challenge,
            user_verification: None,
        }
    }

    pub fn with_user_verification(mut self, requirement: UserVerificationRequirement) -> Self {
        self.user_verification = Some(requirement);
        self
    }
}

/// Raw inputs of an authentication ceremony.
#[derive(Debug, Clone)]
pub struct AuthenticationRequest {
    pub credential_id: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub signature: Vec<u8>,
    pub challenge: Vec<u8>,
    pub user_verification: Option<UserVerificationRequirement>,
}

impl AuthenticationRequest {
    pub fn new(
        credential_id: Vec<u8>,
        authenticator_data: Vec<u8>,
        client_data_json: Vec<u8>,
        signature: Vec<u8>,
        challenge: Vec<u8>,
    ) -> Self {
        Self {
            credential_id,
            authenticator_data,
            client_data_json,
            signature,
            challenge,
            user_verification: None,
        }
    }

    pub fn with_user_verification(mut self, requirement: UserVerificationRequirement) -> Self {
        self.user_verification = Some(requirement);
        self
    }
}

/// The stored state of a registered credential. Persisting it is up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct CredentialRecord {
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
    pub sign_count: u32,
}

/// A verified registration.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationData {
    pub credential_id: Vec<u8>,
    pub credential_public_key: CoseKey,
    pub aaguid: Aaguid,
    pub sign_count: u32,
    pub attestation_format: AttestationFormat,
    pub attestation_type: AttestationType,
    pub verdict: TrustVerdict,
    pub user_verified: bool,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub extensions: Option<AuthenticatorExtensions>,
}

impl RegistrationData {
    /// The record to persist for later authentication ceremonies.
    pub fn to_credential_record(&self) -> CredentialRecord {
        CredentialRecord {
            credential_id: self.credential_id.clone(),
            public_key: self.credential_public_key.clone(),
            sign_count: self.sign_count,
        }
    }
}

/// A verified authentication. `new_sign_count` replaces the stored count.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticationData {
    pub credential_id: Vec<u8>,
    pub new_sign_count: u32,
    pub user_verified: bool,
    pub backup_state: bool,
    pub extensions: Option<AuthenticatorExtensions>,
}
