//! Binary decoding of authenticator data, attestation objects and COSE keys.
//!
//! Decoding is pure. Every failure is a [`DecodeError`] naming the offending field.

mod attestation_object;
mod authenticator_data;
mod client_data;
mod cose;
mod extensions;

use std::io::Cursor;

use ciborium::value::Value as CborValue;

use crate::errors::DecodeError;

pub use attestation_object::{
    AndroidKeyStatement, AndroidSafetyNetStatement, AppleAnonymousStatement, AttestationFormat,
    AttestationObject, AttestationStatement, FidoU2fStatement, PackedStatement, TpmStatement,
};
pub use authenticator_data::{Aaguid, AttestedCredentialData, AuthenticatorData, flags};
pub use client_data::CollectedClientData;
pub(crate) use client_data::{TYPE_CREATE, TYPE_GET};
pub use cose::{CoseAlgorithm, CoseCurve, CoseKey};
pub use extensions::{
    AuthenticatorExtensions, CredentialProtectionPolicy, UserVerificationMethod, UvmEntry,
};

/// Reads a single CBOR item from the front of `bytes` and reports how many bytes it used.
pub(crate) fn read_cbor_prefix(
    bytes: &[u8],
    field: &'static str,
) -> Result<(CborValue, usize), DecodeError> {
    let mut cursor = Cursor::new(bytes);
    let value: CborValue = ciborium::de::from_reader(&mut cursor)
        .map_err(|e| DecodeError::new(field, format!("invalid CBOR: {e}")))?;
    Ok((value, cursor.position() as usize))
}

/// Reads exactly one CBOR item spanning all of `bytes`.
pub(crate) fn read_cbor_exact(bytes: &[u8], field: &'static str) -> Result<CborValue, DecodeError> {
    let (value, used) = read_cbor_prefix(bytes, field)?;
    if used != bytes.len() {
        return Err(DecodeError::new(
            field,
            format!("{} unexpected trailing bytes", bytes.len() - used),
        ));
    }
    Ok(value)
}

pub(crate) fn write_cbor(
    value: &CborValue,
    field: &'static str,
) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)
        .map_err(|e| DecodeError::new(field, format!("CBOR encoding failed: {e}")))?;
    Ok(out)
}

pub(crate) fn cbor_int(value: &CborValue) -> Option<i64> {
    match value {
        CborValue::Integer(i) => i64::try_from(*i).ok(),
        _ => None,
    }
}

pub(crate) fn map_get_int(map: &[(CborValue, CborValue)], key: i64) -> Option<&CborValue> {
    map.iter()
        .find(|(k, _)| cbor_int(k) == Some(key))
        .map(|(_, v)| v)
}

pub(crate) fn map_get_text<'a>(
    map: &'a [(CborValue, CborValue)],
    key: &str,
) -> Option<&'a CborValue> {
    map.iter()
        .find(|(k, _)| matches!(k, CborValue::Text(t) if t == key))
        .map(|(_, v)| v)
}
