use super::{AttestationType, VerifiedAttestation};
use crate::decoder::AttestationFormat;
use crate::errors::StatementError;

/// The decoder already guarantees the statement map is empty, so there is nothing to verify.
pub(super) fn verify_none_attestation() -> Result<VerifiedAttestation, StatementError> {
    Ok(VerifiedAttestation {
        format: AttestationFormat::None,
        attestation_type: AttestationType::None,
        trust_path: Vec::new(),
    })
}
