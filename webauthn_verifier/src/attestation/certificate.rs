use der_parser::ber::BerObjectContent;
use der_parser::der::parse_der;
use x509_parser::extensions::X509Extension;
use x509_parser::prelude::*;

use crate::decoder::Aaguid;
use crate::errors::StatementError;

// OID 1.3.6.1.4.1.45724.1.1.4 (id-fido-gen-ce-aaguid)
pub(super) const OID_FIDO_GEN_CE_AAGUID: &[u8] = &[
    0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0xE5, 0x1C, 0x01, 0x01, 0x04,
];

/// The attestation certificate, first in `x5c`.
pub(super) fn leaf_certificate(x5c: &[Vec<u8>]) -> Result<&[u8], StatementError> {
    x5c.first()
        .map(Vec::as_slice)
        .ok_or_else(|| StatementError::Malformed("x5c is empty".to_string()))
}

pub(super) fn parse_certificate(der: &[u8]) -> Result<X509Certificate<'_>, StatementError> {
    let (_, cert) = X509Certificate::from_der(der).map_err(|e| {
        StatementError::Malformed(format!("Failed to parse attestation certificate: {e}"))
    })?;
    Ok(cert)
}

pub(super) fn find_extension<'a>(
    cert: &'a X509Certificate<'_>,
    oid: &[u8],
) -> Option<&'a X509Extension<'a>> {
    cert.extensions().iter().find(|ext| ext.oid.as_bytes() == oid)
}

pub(super) fn require_version_3(cert: &X509Certificate<'_>) -> Result<(), StatementError> {
    // X.509 versions are 0-indexed
    if cert.version() != X509Version(2) {
        return Err(StatementError::Malformed(
            "Attestation certificate version must be 3".to_string(),
        ));
    }
    Ok(())
}

pub(super) fn require_not_ca(cert: &X509Certificate<'_>) -> Result<(), StatementError> {
    let constraints = cert.basic_constraints().map_err(|e| {
        StatementError::Malformed(format!("Invalid basic constraints extension: {e}"))
    })?;
    if constraints.is_some_and(|bc| bc.value.ca) {
        return Err(StatementError::Malformed(
            "Attestation certificate must not be a CA certificate".to_string(),
        ));
    }
    Ok(())
}

/// When the certificate carries an id-fido-gen-ce-aaguid extension it must equal `aaguid`.
pub(super) fn check_aaguid_extension(
    cert: &X509Certificate<'_>,
    aaguid: Aaguid,
) -> Result<(), StatementError> {
    let Some(ext) = find_extension(cert, OID_FIDO_GEN_CE_AAGUID) else {
        return Ok(());
    };
    if ext.critical {
        return Err(StatementError::Malformed(
            "AAGUID extension must not be critical".to_string(),
        ));
    }

    // The extension value is an OCTET STRING wrapping the 16 AAGUID bytes
    let (_, obj) = parse_der(ext.value)
        .map_err(|e| StatementError::Malformed(format!("Invalid AAGUID extension: {e}")))?;
    let cert_aaguid = match obj.content {
        BerObjectContent::OctetString(bytes) if bytes.len() == 16 => bytes,
        _ => {
            return Err(StatementError::Malformed(
                "AAGUID extension must hold a 16 byte OCTET STRING".to_string(),
            ));
        }
    };
    tracing::debug!("Certificate AAGUID extension present");

    if cert_aaguid != aaguid.as_bytes() {
        return Err(StatementError::Malformed(
            "AAGUID mismatch between certificate and authenticator data".to_string(),
        ));
    }
    Ok(())
}

pub(super) fn subject_common_name(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

pub(super) fn subject_organizational_unit(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_organizational_unit()
        .next()
        .and_then(|ou| ou.as_str().ok())
        .map(str::to_string)
}
