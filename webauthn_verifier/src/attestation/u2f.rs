use super::certificate::parse_certificate;
use super::{AttestationType, VerifiedAttestation};
use crate::crypto::{is_p256_spki, verify_with_spki};
use crate::decoder::{AttestationFormat, AuthenticatorData, CoseAlgorithm, CoseCurve, CoseKey, FidoU2fStatement};
use crate::errors::StatementError;

/// Verifies a FIDO U2F attestation statement
///
/// The signed payload is rebuilt as
/// `0x00 || rpIdHash || clientDataHash || credentialId || publicKeyU2F`.
///
/// # Errors
/// * `StatementError::Malformed` - the chain is not exactly one certificate, or a key is not P-256
/// * `StatementError::SignatureMismatch` - the signature does not verify
pub(super) fn verify_u2f_attestation(
    stmt: &FidoU2fStatement,
    auth_data: &AuthenticatorData,
    client_data_hash: &[u8],
) -> Result<VerifiedAttestation, StatementError> {
    if stmt.x5c.len() != 1 {
        return Err(StatementError::Malformed(format!(
            "FIDO U2F requires exactly one attestation certificate, got {}",
            stmt.x5c.len()
        )));
    }
    let cert = parse_certificate(&stmt.x5c[0])?;
    if !is_p256_spki(cert.public_key()) {
        return Err(StatementError::Malformed(
            "Attestation certificate public key must be an uncompressed P-256 point".to_string(),
        ));
    }

    let credential = auth_data.attested_credential_data().ok_or_else(|| {
        StatementError::Malformed("No attested credential data".to_string())
    })?;
    let public_key_u2f = match credential.credential_public_key() {
        key @ CoseKey::Ec2 {
            curve: CoseCurve::P256,
            ..
        } => key.ec_point(),
        _ => None,
    }
    .ok_or_else(|| {
        StatementError::Malformed("Credential public key must be an EC2 P-256 key".to_string())
    })?;

    let credential_id = credential.credential_id();
    let mut verification_data = Vec::with_capacity(
        1 + 32 + client_data_hash.len() + credential_id.len() + public_key_u2f.len(),
    );
    verification_data.push(0x00);
    verification_data.extend_from_slice(auth_data.rp_id_hash());
    verification_data.extend_from_slice(client_data_hash);
    verification_data.extend_from_slice(credential_id);
    verification_data.extend_from_slice(&public_key_u2f);

    verify_with_spki(
        CoseAlgorithm::Es256,
        cert.public_key(),
        &verification_data,
        &stmt.sig,
    )?;

    Ok(VerifiedAttestation {
        format: AttestationFormat::FidoU2f,
        attestation_type: AttestationType::Basic,
        trust_path: stmt.x5c.clone(),
    })
}
