use der_parser::ber::{BerObject, BerObjectContent, Class};
use der_parser::der::parse_der;

use super::certificate::{find_extension, leaf_certificate, parse_certificate};
use super::{AttestationType, VerifiedAttestation};
use crate::crypto::{cose_algorithm, cose_key_matches_spki, verify_with_certificate};
use crate::decoder::{AndroidKeyStatement, AttestationFormat, AuthenticatorData};
use crate::errors::StatementError;
use crate::utils::{concat, constant_time_eq};

// OID 1.3.6.1.4.1.11129.2.1.17 (Android key attestation description)
const OID_ANDROID_KEY_DESCRIPTION: &[u8] = &[
    0x2B, 0x06, 0x01, 0x04, 0x01, 0xD6, 0x79, 0x02, 0x01, 0x11,
];

const KM_TAG_PURPOSE: u32 = 1;
const KM_TAG_ALL_APPLICATIONS: u32 = 600;
const KM_TAG_ORIGIN: u32 = 702;

const KM_ORIGIN_GENERATED: u64 = 0;
const KM_PURPOSE_SIGN: u64 = 2;

/// Verifies an Android Key attestation statement
///
/// # Errors
/// * `StatementError::SignatureMismatch` - the signature over `authenticatorData || clientDataHash`
///   does not verify, or the attestation challenge is not the client data hash
/// * `StatementError::Malformed` - the certificate key or key description violate the format
/// * `StatementError::UnsupportedAlgorithm` - unknown `alg`
pub(super) fn verify_android_key_attestation(
    stmt: &AndroidKeyStatement,
    auth_data: &AuthenticatorData,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
    tee_enforced_only: bool,
) -> Result<VerifiedAttestation, StatementError> {
    let alg = cose_algorithm(stmt.alg)?;
    let signed_data = concat(auth_data_bytes, client_data_hash);
    let leaf = leaf_certificate(&stmt.x5c)?;
    verify_with_certificate(alg, leaf, &signed_data, &stmt.sig)?;

    let cert = parse_certificate(leaf)?;
    let credential = auth_data.attested_credential_data().ok_or_else(|| {
        StatementError::Malformed("No attested credential data".to_string())
    })?;
    if !cose_key_matches_spki(credential.credential_public_key(), cert.public_key()) {
        return Err(StatementError::Malformed(
            "Credential public key does not match the attestation certificate key".to_string(),
        ));
    }

    let ext = find_extension(&cert, OID_ANDROID_KEY_DESCRIPTION).ok_or_else(|| {
        StatementError::Malformed("Key description extension not found".to_string())
    })?;
    let description = KeyDescription::parse(ext.value)?;

    if !constant_time_eq(&description.attestation_challenge, client_data_hash) {
        return Err(StatementError::SignatureMismatch(
            "attestationChallenge does not match clientDataHash".to_string(),
        ));
    }

    let software = &description.software_enforced;
    let tee = &description.tee_enforced;
    if software.all_applications || tee.all_applications {
        return Err(StatementError::Malformed(
            "Key is usable by all applications".to_string(),
        ));
    }

    let (origin, purpose_sign) = if tee_enforced_only {
        (tee.origin, tee.purposes.contains(&KM_PURPOSE_SIGN))
    } else {
        (
            tee.origin.or(software.origin),
            tee.purposes.contains(&KM_PURPOSE_SIGN) || software.purposes.contains(&KM_PURPOSE_SIGN),
        )
    };
    if origin != Some(KM_ORIGIN_GENERATED) {
        return Err(StatementError::Malformed(format!(
            "Key origin must be KM_ORIGIN_GENERATED, got {origin:?}"
        )));
    }
    if !purpose_sign {
        return Err(StatementError::Malformed(
            "Key purpose must include KM_PURPOSE_SIGN".to_string(),
        ));
    }

    Ok(VerifiedAttestation {
        format: AttestationFormat::AndroidKey,
        attestation_type: AttestationType::Basic,
        trust_path: stmt.x5c.clone(),
    })
}

#[derive(Debug)]
struct KeyDescription {
    attestation_challenge: Vec<u8>,
    software_enforced: AuthorizationList,
    tee_enforced: AuthorizationList,
}

#[derive(Debug, Default)]
struct AuthorizationList {
    purposes: Vec<u64>,
    origin: Option<u64>,
    all_applications: bool,
}

fn malformed(what: &str) -> StatementError {
    StatementError::Malformed(format!("Invalid key description: {what}"))
}

impl KeyDescription {
    fn parse(value: &[u8]) -> Result<Self, StatementError> {
        let (_, obj) = parse_der(value).map_err(|e| malformed(&e.to_string()))?;
        let BerObjectContent::Sequence(items) = obj.content else {
            return Err(malformed("not a SEQUENCE"));
        };
        if items.len() < 8 {
            return Err(malformed("too few fields"));
        }

        let attestation_challenge = match &items[4].content {
            BerObjectContent::OctetString(challenge) => challenge.to_vec(),
            _ => return Err(malformed("attestationChallenge is not an OCTET STRING")),
        };

        Ok(Self {
            attestation_challenge,
            software_enforced: AuthorizationList::parse(&items[6])?,
            tee_enforced: AuthorizationList::parse(&items[7])?,
        })
    }
}

impl AuthorizationList {
    fn parse(obj: &BerObject<'_>) -> Result<Self, StatementError> {
        let BerObjectContent::Sequence(entries) = &obj.content else {
            return Err(malformed("authorization list is not a SEQUENCE"));
        };

        let mut list = AuthorizationList::default();
        for entry in entries {
            if entry.header.class() != Class::ContextSpecific {
                continue;
            }
            match entry.header.tag().0 {
                KM_TAG_PURPOSE => {
                    let inner = explicit_inner(entry)?;
                    let BerObjectContent::Set(values) = &inner.content else {
                        return Err(malformed("purpose is not a SET"));
                    };
                    for value in values {
                        list.purposes
                            .push(value.as_u64().map_err(|_| malformed("purpose value"))?);
                    }
                }
                KM_TAG_ALL_APPLICATIONS => list.all_applications = true,
                KM_TAG_ORIGIN => {
                    let inner = explicit_inner(entry)?;
                    list.origin = Some(inner.as_u64().map_err(|_| malformed("origin value"))?);
                }
                _ => {}
            }
        }
        Ok(list)
    }
}

/// Content of an `[n] EXPLICIT` element.
fn explicit_inner<'a>(entry: &BerObject<'a>) -> Result<BerObject<'a>, StatementError> {
    match &entry.content {
        BerObjectContent::Unknown(any) => parse_der(any.data)
            .map(|(_, inner)| inner)
            .map_err(|e| malformed(&e.to_string())),
        _ => Err(malformed("expected an explicitly tagged element")),
    }
}
