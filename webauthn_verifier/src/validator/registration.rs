use std::sync::Arc;

use chrono::{DateTime, Utc};
use x509_parser::prelude::*;

use super::types::{RegistrationData, RegistrationRequest};
use super::{verify_extensions, verify_flags, verify_rp_id_hash};
use crate::anchor::{TrustAnchorAsyncRepository, TrustAnchorRepository, TrustAnchorSet};
use crate::attestation::{VerifiedAttestation, verify_attestation};
use crate::config::ValidatorConfig;
use crate::crypto::key_identifier;
use crate::decoder::{
    Aaguid, AttestationFormat, AttestationObject, AttestedCredentialData, CollectedClientData,
    TYPE_CREATE,
};
use crate::errors::{CertificateError, DecodeError, PolicyError, ValidationError};
use crate::trust::{CrlSource, TrustVerdict, TrustworthinessValidator};
use crate::utils::sha256;

/// How trust anchors are looked up for an attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum AnchorLookup {
    Aaguid(Aaguid),
    /// FIDO U2F authenticators carry no AAGUID
    KeyIdentifier(Vec<u8>),
}

fn anchor_lookup(
    aaguid: Aaguid,
    verified: &VerifiedAttestation,
) -> Result<AnchorLookup, ValidationError> {
    if verified.format != AttestationFormat::FidoU2f || !aaguid.is_zero() {
        return Ok(AnchorLookup::Aaguid(aaguid));
    }
    let Some(leaf) = verified.trust_path.first() else {
        return Ok(AnchorLookup::Aaguid(aaguid));
    };
    let (_, cert) = X509Certificate::from_der(leaf)
        .map_err(|e| CertificateError::Parse(format!("Invalid attestation certificate: {e}")))?;
    Ok(AnchorLookup::KeyIdentifier(key_identifier(cert.public_key())))
}

/// The parts of a registration that do not depend on trust anchors.
struct VerifiedStatement {
    attestation: AttestationObject,
    verified: VerifiedAttestation,
    lookup: AnchorLookup,
}

/// Registration steps shared by the blocking and async validators.
struct RegistrationCore {
    config: ValidatorConfig,
    trustworthiness: TrustworthinessValidator,
}

impl RegistrationCore {
    fn new(config: ValidatorConfig, crl_source: Option<Arc<dyn CrlSource>>) -> Self {
        let trustworthiness = TrustworthinessValidator::new(config.path_validation, crl_source);
        Self {
            config,
            trustworthiness,
        }
    }

    /// Decodes the request and verifies everything up to the attestation statement.
    fn verify_statement(
        &self,
        request: &RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<VerifiedStatement, ValidationError> {
        let attestation = AttestationObject::decode(&request.attestation_object)?;

        let client_data = CollectedClientData::from_bytes(&request.client_data_json)?;
        client_data.verify(TYPE_CREATE, &request.challenge, &self.config.origins)?;
        let client_data_hash = sha256(&request.client_data_json);

        let auth_data = attestation.authenticator_data();
        verify_rp_id_hash(auth_data, &self.config.rp_id)?;
        verify_flags(auth_data, &self.config, request.user_verification)?;
        let credential = attested_credential(&attestation)?;
        let aaguid = credential.aaguid();

        let verified = verify_attestation(&attestation, &client_data_hash, &self.config, now)?;
        tracing::debug!(
            "{} attestation statement verified, type {}",
            verified.format,
            verified.attestation_type
        );

        let lookup = anchor_lookup(aaguid, &verified)?;
        Ok(VerifiedStatement {
            attestation,
            verified,
            lookup,
        })
    }

    /// Applies path validation, the trust policy and the extension check.
    fn finish(
        &self,
        statement: VerifiedStatement,
        anchors: &TrustAnchorSet,
        now: DateTime<Utc>,
    ) -> Result<RegistrationData, ValidationError> {
        let VerifiedStatement {
            attestation,
            verified,
            ..
        } = statement;

        let verdict = self.trustworthiness.validate(&verified, anchors, now)?;
        self.apply_trust_policy(&verdict)?;

        let auth_data = attestation.authenticator_data();
        verify_extensions(auth_data, &self.config)?;

        let credential = attested_credential(&attestation)?;
        tracing::debug!("Registration verified, trust verdict: {}", verdict);

        Ok(RegistrationData {
            credential_id: credential.credential_id().to_vec(),
            credential_public_key: credential.credential_public_key().clone(),
            aaguid: credential.aaguid(),
            sign_count: auth_data.sign_count(),
            attestation_format: verified.format,
            attestation_type: verified.attestation_type,
            verdict,
            user_verified: auth_data.is_user_verified(),
            backup_eligible: auth_data.is_backup_eligible(),
            backup_state: auth_data.is_backed_up(),
            extensions: auth_data.extensions().cloned(),
        })
    }

    fn apply_trust_policy(&self, verdict: &TrustVerdict) -> Result<(), PolicyError> {
        let policy = &self.config.trust_policy;
        match verdict {
            TrustVerdict::NoAttestation if !policy.allow_none_attestation => {
                Err(PolicyError::NoneAttestationProhibited)
            }
            TrustVerdict::SelfAttested if !policy.allow_self_attestation => {
                Err(PolicyError::SelfAttestationProhibited)
            }
            TrustVerdict::Untrusted if !policy.allow_untrusted_attestation => {
                Err(PolicyError::UntrustedAttestation)
            }
            _ => Ok(()),
        }
    }
}

fn attested_credential(
    attestation: &AttestationObject,
) -> Result<&AttestedCredentialData, ValidationError> {
    attestation
        .authenticator_data()
        .attested_credential_data()
        .ok_or_else(|| {
            DecodeError::new(
                "attestedCredentialData",
                "registration requires attested credential data",
            )
            .into()
        })
}

/// Validates registrations against pre-loaded trust anchors.
pub struct RegistrationValidator {
    core: RegistrationCore,
    anchors: Arc<dyn TrustAnchorRepository>,
}

impl RegistrationValidator {
    pub fn new(config: ValidatorConfig, anchors: Arc<dyn TrustAnchorRepository>) -> Self {
        Self {
            core: RegistrationCore::new(config, None),
            anchors,
        }
    }

    /// Enables CRL lookups for configurations with revocation checking.
    pub fn with_crl_source(
        config: ValidatorConfig,
        anchors: Arc<dyn TrustAnchorRepository>,
        crl_source: Arc<dyn CrlSource>,
    ) -> Self {
        Self {
            core: RegistrationCore::new(config, Some(crl_source)),
            anchors,
        }
    }

    pub fn validate(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationData, ValidationError> {
        self.validate_at(request, Utc::now())
    }

    /// Validates as of `now`, which bounds certificate validity and SafetyNet freshness.
    pub fn validate_at(
        &self,
        request: &RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<RegistrationData, ValidationError> {
        let statement = self.core.verify_statement(request, now)?;
        let anchors = match &statement.lookup {
            AnchorLookup::Aaguid(aaguid) => self.anchors.find_by_aaguid(aaguid),
            AnchorLookup::KeyIdentifier(key_id) => self.anchors.find_by_key_identifier(key_id),
        };
        tracing::debug!("Resolved {} trust anchors", anchors.len());
        self.core.finish(statement, &anchors, now)
    }
}

/// Validates registrations against a repository that loads trust anchors on demand.
pub struct AsyncRegistrationValidator {
    core: RegistrationCore,
    anchors: Arc<dyn TrustAnchorAsyncRepository>,
}

impl AsyncRegistrationValidator {
    pub fn new(config: ValidatorConfig, anchors: Arc<dyn TrustAnchorAsyncRepository>) -> Self {
        Self {
            core: RegistrationCore::new(config, None),
            anchors,
        }
    }

    pub fn with_crl_source(
        config: ValidatorConfig,
        anchors: Arc<dyn TrustAnchorAsyncRepository>,
        crl_source: Arc<dyn CrlSource>,
    ) -> Self {
        Self {
            core: RegistrationCore::new(config, Some(crl_source)),
            anchors,
        }
    }

    pub async fn validate(
        &self,
        request: &RegistrationRequest,
    ) -> Result<RegistrationData, ValidationError> {
        self.validate_at(request, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        request: &RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<RegistrationData, ValidationError> {
        let statement = self.core.verify_statement(request, now)?;
        let anchors = match &statement.lookup {
            AnchorLookup::Aaguid(aaguid) => self.anchors.find_by_aaguid(aaguid).await?,
            AnchorLookup::KeyIdentifier(key_id) => {
                self.anchors.find_by_key_identifier(key_id).await?
            }
        };
        tracing::debug!("Resolved {} trust anchors", anchors.len());
        self.core.finish(statement, &anchors, now)
    }
}
