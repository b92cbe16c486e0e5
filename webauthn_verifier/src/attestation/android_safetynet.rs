use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use x509_parser::public_key::PublicKey;

use super::certificate::{parse_certificate, subject_common_name};
use super::{AttestationType, VerifiedAttestation};
use crate::config::SafetyNetConfig;
use crate::decoder::{AndroidSafetyNetStatement, AttestationFormat};
use crate::errors::StatementError;
use crate::utils::{base64_decode, base64_encode, base64url_decode, sha256_concat};

const ATTEST_HOSTNAME: &str = "attest.android.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyNetPayload {
    nonce: String,
    timestamp_ms: i64,
    cts_profile_match: bool,
}

/// Verifies an Android SafetyNet attestation statement
///
/// The response is a compact JWS whose `x5c` header carries the signing chain.
///
/// # Errors
/// * `StatementError::SignatureMismatch` - the JWS signature or the nonce does not verify
/// * `StatementError::Malformed` - the response, certificate, profile or timestamp are invalid
/// * `StatementError::UnsupportedAlgorithm` - the JWS uses neither RS256 nor ES256
pub(super) fn verify_android_safetynet_attestation(
    stmt: &AndroidSafetyNetStatement,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
    config: &SafetyNetConfig,
    now: DateTime<Utc>,
) -> Result<VerifiedAttestation, StatementError> {
    if stmt.ver.is_empty() {
        return Err(StatementError::Malformed(
            "SafetyNet version must not be empty".to_string(),
        ));
    }

    let jws = std::str::from_utf8(&stmt.response).map_err(|e| {
        StatementError::Malformed(format!("SafetyNet response is not UTF-8: {e}"))
    })?;
    let header = jsonwebtoken::decode_header(jws)
        .map_err(|e| StatementError::Malformed(format!("Invalid JWS header: {e}")))?;

    let x5c = header
        .x5c
        .as_ref()
        .filter(|chain| !chain.is_empty())
        .ok_or_else(|| StatementError::Malformed("JWS header has no x5c chain".to_string()))?
        .iter()
        .map(|cert| {
            base64_decode(cert)
                .map_err(|e| StatementError::Malformed(format!("Invalid x5c entry: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let leaf = parse_certificate(&x5c[0])?;
    if subject_common_name(&leaf).as_deref() != Some(ATTEST_HOSTNAME) {
        return Err(StatementError::Malformed(format!(
            "SafetyNet certificate is not issued to {ATTEST_HOSTNAME}"
        )));
    }

    let key_bytes: &[u8] = &leaf.public_key().subject_public_key.data;
    let decoding_key = match (header.alg, leaf.public_key().parsed()) {
        (Algorithm::RS256, Ok(PublicKey::RSA(_))) => DecodingKey::from_rsa_der(key_bytes),
        (Algorithm::ES256, Ok(PublicKey::EC(_))) => DecodingKey::from_ec_der(key_bytes),
        (Algorithm::RS256 | Algorithm::ES256, _) => {
            return Err(StatementError::Malformed(
                "JWS algorithm does not match the certificate key".to_string(),
            ));
        }
        (alg, _) => {
            return Err(StatementError::UnsupportedAlgorithm(format!(
                "SafetyNet JWS algorithm {alg:?}"
            )));
        }
    };

    let (message, signature) = jws
        .rsplit_once('.')
        .ok_or_else(|| StatementError::Malformed("JWS is not in compact form".to_string()))?;
    let valid = jsonwebtoken::crypto::verify(signature, message.as_bytes(), &decoding_key, header.alg)
        .map_err(|e| StatementError::SignatureMismatch(format!("JWS verification failed: {e}")))?;
    if !valid {
        return Err(StatementError::SignatureMismatch(
            "JWS signature does not verify".to_string(),
        ));
    }

    let payload_b64 = message
        .split('.')
        .nth(1)
        .ok_or_else(|| StatementError::Malformed("JWS has no payload".to_string()))?;
    let payload_bytes = base64url_decode(payload_b64)
        .map_err(|e| StatementError::Malformed(format!("Invalid JWS payload encoding: {e}")))?;
    let payload: SafetyNetPayload = serde_json::from_slice(&payload_bytes)
        .map_err(|e| StatementError::Malformed(format!("Invalid SafetyNet payload: {e}")))?;

    let expected_nonce = base64_encode(&sha256_concat(auth_data_bytes, client_data_hash));
    if payload.nonce != expected_nonce {
        return Err(StatementError::SignatureMismatch(
            "SafetyNet nonce does not match authenticatorData || clientDataHash".to_string(),
        ));
    }

    if !payload.cts_profile_match {
        return Err(StatementError::Malformed(
            "ctsProfileMatch is false".to_string(),
        ));
    }

    let now_ms = now.timestamp_millis();
    if payload.timestamp_ms > now_ms.saturating_add(tolerance_millis(config.forward_tolerance)) {
        return Err(StatementError::Malformed(format!(
            "SafetyNet timestamp {} is in the future",
            payload.timestamp_ms
        )));
    }
    if payload.timestamp_ms < now_ms.saturating_sub(tolerance_millis(config.backward_tolerance)) {
        return Err(StatementError::Malformed(format!(
            "SafetyNet timestamp {} is too old",
            payload.timestamp_ms
        )));
    }

    Ok(VerifiedAttestation {
        format: AttestationFormat::AndroidSafetyNet,
        attestation_type: AttestationType::Basic,
        trust_path: x5c,
    })
}

fn tolerance_millis(tolerance: Duration) -> i64 {
    i64::try_from(tolerance.as_millis()).unwrap_or(i64::MAX)
}
