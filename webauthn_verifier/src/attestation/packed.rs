use x509_parser::prelude::X509Certificate;

use super::certificate::{
    check_aaguid_extension, leaf_certificate, parse_certificate, require_not_ca,
    require_version_3, subject_organizational_unit,
};
use super::{AttestationType, VerifiedAttestation};
use crate::crypto::{cose_algorithm, verify_with_certificate, verify_with_cose_key};
use crate::decoder::{AttestationFormat, AuthenticatorData, PackedStatement};
use crate::errors::StatementError;
use crate::utils::concat;

const ATTESTATION_OU: &str = "Authenticator Attestation";

/// Verifies a packed attestation statement
///
/// With `x5c` the signature over `authenticatorData || clientDataHash` is checked with the
/// attestation certificate. Without it the statement is self attestation and the signature
/// is checked with the credential public key.
///
/// # Errors
/// * `StatementError::UnsupportedAlgorithm` - unknown `alg`, or an ECDAA statement
/// * `StatementError::Malformed` - certificate requirements are not met
/// * `StatementError::SignatureMismatch` - the signature does not verify
pub(super) fn verify_packed_attestation(
    stmt: &PackedStatement,
    auth_data: &AuthenticatorData,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
) -> Result<VerifiedAttestation, StatementError> {
    let alg = cose_algorithm(stmt.alg)?;
    let signed_data = concat(auth_data_bytes, client_data_hash);

    match (&stmt.x5c, &stmt.ecdaa_key_id) {
        (_, Some(_)) => Err(StatementError::UnsupportedAlgorithm(
            "ECDAA attestation not supported".to_string(),
        )),
        (Some(x5c), None) => {
            tracing::debug!("Full attestation with certificate chain");
            let leaf = leaf_certificate(x5c)?;
            let cert = parse_certificate(leaf)?;
            verify_packed_attestation_cert(&cert, auth_data)?;
            verify_with_certificate(alg, leaf, &signed_data, &stmt.sig)?;

            Ok(VerifiedAttestation {
                format: AttestationFormat::Packed,
                attestation_type: AttestationType::Basic,
                trust_path: x5c.clone(),
            })
        }
        (None, None) => {
            tracing::debug!("Self attestation");
            let credential = auth_data.attested_credential_data().ok_or_else(|| {
                StatementError::Malformed(
                    "No attested credential data in self attestation".to_string(),
                )
            })?;
            let key = credential.credential_public_key();
            if key.algorithm() != alg {
                return Err(StatementError::Malformed(format!(
                    "Statement algorithm {alg} does not match credential key algorithm {}",
                    key.algorithm()
                )));
            }
            verify_with_cose_key(key, &signed_data, &stmt.sig)?;

            Ok(VerifiedAttestation {
                format: AttestationFormat::Packed,
                attestation_type: AttestationType::SelfAttestation,
                trust_path: Vec::new(),
            })
        }
    }
}

fn verify_packed_attestation_cert(
    cert: &X509Certificate<'_>,
    auth_data: &AuthenticatorData,
) -> Result<(), StatementError> {
    require_version_3(cert)?;
    if subject_organizational_unit(cert).as_deref() != Some(ATTESTATION_OU) {
        return Err(StatementError::Malformed(format!(
            "Attestation certificate subject OU must be '{ATTESTATION_OU}'"
        )));
    }
    require_not_ca(cert)?;
    check_extended_key_usage(cert)?;
    if let Some(credential) = auth_data.attested_credential_data() {
        check_aaguid_extension(cert, credential.aaguid())?;
    }
    Ok(())
}

/// An absent EKU allows any use. A present one must not be limited to the TLS, code signing,
/// email, timestamping or OCSP purposes.
fn check_extended_key_usage(cert: &X509Certificate<'_>) -> Result<(), StatementError> {
    let eku = cert.extended_key_usage().map_err(|e| {
        StatementError::Malformed(format!("Invalid Extended Key Usage extension: {e}"))
    })?;
    match eku {
        Some(eku) if !eku.value.any && eku.value.other.is_empty() => {
            Err(StatementError::Malformed(
                "Attestation certificate Extended Key Usage excludes attestation".to_string(),
            ))
        }
        _ => Ok(()),
    }
}
