use der_parser::ber::BerObjectContent;
use der_parser::der::parse_der;

use super::certificate::{find_extension, leaf_certificate, parse_certificate};
use super::{AttestationType, VerifiedAttestation};
use crate::crypto::cose_key_matches_spki;
use crate::decoder::{AppleAnonymousStatement, AttestationFormat, AuthenticatorData};
use crate::errors::StatementError;
use crate::utils::{constant_time_eq, sha256_concat};

// OID 1.2.840.113635.100.8.2 (Apple anonymous attestation nonce)
const OID_APPLE_NONCE: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x63, 0x64, 0x08, 0x02];

/// Verifies an Apple anonymous attestation statement
///
/// # Errors
/// * `StatementError::SignatureMismatch` - the certificate nonce is not
///   `SHA-256(authenticatorData || clientDataHash)`
/// * `StatementError::Malformed` - the nonce extension is missing or invalid, or the
///   certificate key is not the credential key
pub(super) fn verify_apple_attestation(
    stmt: &AppleAnonymousStatement,
    auth_data: &AuthenticatorData,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
) -> Result<VerifiedAttestation, StatementError> {
    let cert = parse_certificate(leaf_certificate(&stmt.x5c)?)?;

    let ext = find_extension(&cert, OID_APPLE_NONCE).ok_or_else(|| {
        StatementError::Malformed("Apple nonce extension not found".to_string())
    })?;
    let nonce = extract_nonce(ext.value)?;

    let expected_nonce = sha256_concat(auth_data_bytes, client_data_hash);
    if !constant_time_eq(&nonce, &expected_nonce) {
        return Err(StatementError::SignatureMismatch(
            "Certificate nonce does not match authenticatorData || clientDataHash".to_string(),
        ));
    }

    let credential = auth_data.attested_credential_data().ok_or_else(|| {
        StatementError::Malformed("No attested credential data".to_string())
    })?;
    if !cose_key_matches_spki(credential.credential_public_key(), cert.public_key()) {
        return Err(StatementError::Malformed(
            "Credential public key does not match the certificate key".to_string(),
        ));
    }

    Ok(VerifiedAttestation {
        format: AttestationFormat::AppleAnonymous,
        attestation_type: AttestationType::AnonCa,
        trust_path: stmt.x5c.clone(),
    })
}

/// `SEQUENCE { nonce [1] EXPLICIT OCTET STRING }`
fn extract_nonce(value: &[u8]) -> Result<Vec<u8>, StatementError> {
    let invalid = |what: &str| StatementError::Malformed(format!("Invalid Apple nonce extension: {what}"));

    let (_, obj) = parse_der(value).map_err(|e| invalid(&e.to_string()))?;
    let BerObjectContent::Sequence(items) = obj.content else {
        return Err(invalid("not a SEQUENCE"));
    };
    let tagged = items.first().ok_or_else(|| invalid("empty SEQUENCE"))?;
    if tagged.header.tag().0 != 1 {
        return Err(invalid("nonce is not tagged [1]"));
    }
    let BerObjectContent::Unknown(any) = &tagged.content else {
        return Err(invalid("nonce is not explicitly tagged"));
    };
    let (_, inner) = parse_der(any.data).map_err(|e| invalid(&e.to_string()))?;
    match inner.content {
        BerObjectContent::OctetString(nonce) => Ok(nonce.to_vec()),
        _ => Err(invalid("nonce is not an OCTET STRING")),
    }
}
