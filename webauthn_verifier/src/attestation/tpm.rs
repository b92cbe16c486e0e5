use ring::digest;
use sha2::{Digest, Sha256, Sha384, Sha512};
use x509_parser::prelude::X509Certificate;

use super::certificate::{
    check_aaguid_extension, find_extension, leaf_certificate, parse_certificate, require_not_ca,
    require_version_3,
};
use super::{AttestationType, VerifiedAttestation};
use crate::crypto::{cose_algorithm, verify_with_certificate};
use crate::decoder::{
    AttestationFormat, AuthenticatorData, CoseAlgorithm, CoseCurve, CoseKey, TpmStatement,
};
use crate::errors::StatementError;
use crate::utils::{concat, strip_leading_zeros};

const TPM_GENERATED_VALUE: u32 = 0xff544347; // 0xFF + "TCG"
const TPM_ST_ATTEST_CERTIFY: u16 = 0x8017;

const TPM_ALG_RSA: u16 = 0x0001;
const TPM_ALG_SHA256: u16 = 0x000B;
const TPM_ALG_SHA384: u16 = 0x000C;
const TPM_ALG_SHA512: u16 = 0x000D;
const TPM_ALG_NULL: u16 = 0x0010;
const TPM_ALG_ECC: u16 = 0x0023;

const TPM_ECC_NIST_P256: u16 = 0x0003;
const TPM_ECC_NIST_P384: u16 = 0x0004;
const TPM_ECC_NIST_P521: u16 = 0x0005;

// TPMS_CLOCK_INFO: clock (8), resetCount (4), restartCount (4), safe (1)
const CLOCK_INFO_LEN: usize = 17;
const FIRMWARE_VERSION_LEN: usize = 8;

// OID for TCG-KP-AIKCertificate: 2.23.133.8.3
const OID_TCG_KP_AIK_CERTIFICATE: &[u8] = &[0x67, 0x81, 0x05, 0x08, 0x03];

/// Verifies a TPM attestation statement
///
/// # Errors
/// * `StatementError::Malformed` - `pubArea`, `certInfo` or the AIK certificate violate the format
/// * `StatementError::SignatureMismatch` - `extraData` or the signature over `certInfo` do not verify
/// * `StatementError::UnsupportedAlgorithm` - unknown `alg` or TPM name algorithm
pub(super) fn verify_tpm_attestation(
    stmt: &TpmStatement,
    auth_data: &AuthenticatorData,
    auth_data_bytes: &[u8],
    client_data_hash: &[u8],
) -> Result<VerifiedAttestation, StatementError> {
    if stmt.ver != "2.0" {
        return Err(StatementError::Malformed(format!(
            "Unsupported TPM version: {}",
            stmt.ver
        )));
    }
    let alg = cose_algorithm(stmt.alg)?;

    let credential = auth_data.attested_credential_data().ok_or_else(|| {
        StatementError::Malformed("No attested credential data".to_string())
    })?;

    // The public key in pubArea must be the credential public key
    let pub_area = PubArea::parse(&stmt.pub_area)?;
    verify_public_key_match(credential.credential_public_key(), &pub_area.key)?;

    let cert_info = CertInfo::parse(&stmt.cert_info)?;
    if cert_info.magic != TPM_GENERATED_VALUE {
        return Err(StatementError::Malformed(format!(
            "Invalid magic value: {:x}, expected: {:x}",
            cert_info.magic, TPM_GENERATED_VALUE
        )));
    }
    if cert_info.attest_type != TPM_ST_ATTEST_CERTIFY {
        return Err(StatementError::Malformed(format!(
            "Invalid attestation type: {:x}, expected: {:x}",
            cert_info.attest_type, TPM_ST_ATTEST_CERTIFY
        )));
    }

    let att_to_be_signed = concat(auth_data_bytes, client_data_hash);
    if cert_info.extra_data != att_to_be_signed_digest(alg, &att_to_be_signed)?.as_slice() {
        return Err(StatementError::SignatureMismatch(
            "extraData does not match the hash of attToBeSigned".to_string(),
        ));
    }
    verify_attested_name(cert_info.attested_name, pub_area.name_alg, &stmt.pub_area)?;

    let aik_cert_bytes = leaf_certificate(&stmt.x5c)?;
    let aik_cert = parse_certificate(aik_cert_bytes)?;
    verify_aik_certificate(&aik_cert)?;
    check_aaguid_extension(&aik_cert, credential.aaguid())?;

    verify_with_certificate(alg, aik_cert_bytes, &stmt.cert_info, &stmt.sig)?;

    Ok(VerifiedAttestation {
        format: AttestationFormat::Tpm,
        attestation_type: AttestationType::AttCa,
        trust_path: stmt.x5c.clone(),
    })
}

fn att_to_be_signed_digest(alg: CoseAlgorithm, data: &[u8]) -> Result<Vec<u8>, StatementError> {
    let algorithm = match alg {
        CoseAlgorithm::Rs1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
        CoseAlgorithm::Es256 | CoseAlgorithm::Rs256 | CoseAlgorithm::Ps256 => &digest::SHA256,
        CoseAlgorithm::Es384 | CoseAlgorithm::Rs384 | CoseAlgorithm::Ps384 => &digest::SHA384,
        CoseAlgorithm::Es512 | CoseAlgorithm::Rs512 | CoseAlgorithm::Ps512 => &digest::SHA512,
        CoseAlgorithm::EdDsa => {
            return Err(StatementError::UnsupportedAlgorithm(format!(
                "{alg} is not a TPM signing algorithm"
            )));
        }
    };
    Ok(digest::digest(algorithm, data).as_ref().to_vec())
}

/// `attested.name` is `nameAlg || H_nameAlg(pubArea)`.
fn verify_attested_name(name: &[u8], name_alg: u16, pub_area: &[u8]) -> Result<(), StatementError> {
    let pub_area_hash = match name_alg {
        TPM_ALG_SHA256 => Sha256::digest(pub_area).to_vec(),
        TPM_ALG_SHA384 => Sha384::digest(pub_area).to_vec(),
        TPM_ALG_SHA512 => Sha512::digest(pub_area).to_vec(),
        _ => {
            return Err(StatementError::UnsupportedAlgorithm(format!(
                "Unsupported TPM name algorithm: {name_alg:04x}"
            )));
        }
    };

    if name.len() < 2 || name[..2] != name_alg.to_be_bytes() {
        return Err(StatementError::Malformed(
            "attested name algorithm does not match pubArea nameAlg".to_string(),
        ));
    }
    if name[2..] != pub_area_hash[..] {
        return Err(StatementError::Malformed(
            "attested name does not match the hash of pubArea".to_string(),
        ));
    }
    Ok(())
}

fn verify_public_key_match(
    credential_key: &CoseKey,
    tpm_key: &TpmPublicKey,
) -> Result<(), StatementError> {
    let matches = match (credential_key, tpm_key) {
        (CoseKey::Rsa { n, e, .. }, TpmPublicKey::Rsa { modulus, exponent }) => {
            // An exponent of zero stands for the default 65537
            let exponent = if *exponent == 0 { 65537 } else { *exponent };
            strip_leading_zeros(n) == strip_leading_zeros(modulus)
                && strip_leading_zeros(e) == strip_leading_zeros(&exponent.to_be_bytes())
        }
        (CoseKey::Ec2 { curve, x, y, .. }, TpmPublicKey::Ecc { curve_id, x: tx, y: ty }) => {
            let tpm_curve = match *curve_id {
                TPM_ECC_NIST_P256 => Some(CoseCurve::P256),
                TPM_ECC_NIST_P384 => Some(CoseCurve::P384),
                TPM_ECC_NIST_P521 => Some(CoseCurve::P521),
                _ => None,
            };
            tpm_curve == Some(*curve) && x == tx && y == ty
        }
        _ => false,
    };

    if !matches {
        return Err(StatementError::Malformed(
            "pubArea public key does not match the credential public key".to_string(),
        ));
    }
    Ok(())
}

fn verify_aik_certificate(cert: &X509Certificate<'_>) -> Result<(), StatementError> {
    require_version_3(cert)?;

    if cert.subject().iter().next().is_some() {
        return Err(StatementError::Malformed(
            "AIK certificate subject must be empty".to_string(),
        ));
    }

    if find_extension(cert, oid_registry::OID_X509_EXT_SUBJECT_ALT_NAME.as_bytes()).is_none() {
        return Err(StatementError::Malformed(
            "AIK certificate is missing the Subject Alternative Name extension".to_string(),
        ));
    }

    let eku = cert.extended_key_usage().map_err(|e| {
        StatementError::Malformed(format!("Invalid Extended Key Usage extension: {e}"))
    })?;
    let has_aik_usage = eku.is_some_and(|eku| {
        eku.value
            .other
            .iter()
            .any(|oid| oid.as_bytes() == OID_TCG_KP_AIK_CERTIFICATE)
    });
    if !has_aik_usage {
        return Err(StatementError::Malformed(
            "AIK certificate Extended Key Usage must contain tcg-kp-AIKCertificate".to_string(),
        ));
    }

    require_not_ca(cert)
}

/// Big-endian reader over TPM marshalled structures.
struct TpmReader<'a> {
    data: &'a [u8],
    offset: usize,
    structure: &'static str,
}

impl<'a> TpmReader<'a> {
    fn new(data: &'a [u8], structure: &'static str) -> Self {
        Self {
            data,
            offset: 0,
            structure,
        }
    }

    fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], StatementError> {
        if self.data.len() < self.offset + len {
            return Err(StatementError::Malformed(format!(
                "TPM {} too short to parse {}",
                self.structure, field
            )));
        }
        let bytes = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    fn u16(&mut self, field: &str) -> Result<u16, StatementError> {
        let b = self.take(2, field)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, field: &str) -> Result<u32, StatementError> {
        let b = self.take(4, field)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// A TPM2B structure: 2-byte size followed by that many bytes.
    fn sized(&mut self, field: &str) -> Result<&'a [u8], StatementError> {
        let len = self.u16(field)? as usize;
        self.take(len, field)
    }

    /// A TPMT algorithm selector whose details are one u16 unless the algorithm is NULL.
    fn algorithm_with_detail(&mut self, field: &str) -> Result<(), StatementError> {
        if self.u16(field)? != TPM_ALG_NULL {
            self.u16(field)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<(), StatementError> {
        if self.offset != self.data.len() {
            return Err(StatementError::Malformed(format!(
                "TPM {} has {} trailing bytes",
                self.structure,
                self.data.len() - self.offset
            )));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum TpmPublicKey {
    Rsa { modulus: Vec<u8>, exponent: u32 },
    Ecc { curve_id: u16, x: Vec<u8>, y: Vec<u8> },
}

/// TPMT_PUBLIC
#[derive(Debug)]
struct PubArea {
    name_alg: u16,
    key: TpmPublicKey,
}

impl PubArea {
    fn parse(pub_area: &[u8]) -> Result<Self, StatementError> {
        let mut r = TpmReader::new(pub_area, "pubArea");
        let alg_type = r.u16("type")?;
        let name_alg = r.u16("nameAlg")?;
        r.u32("objectAttributes")?;
        r.sized("authPolicy")?;

        // TPMT_SYM_DEF_OBJECT: algorithm, then keyBits and mode unless NULL
        if r.u16("symmetric")? != TPM_ALG_NULL {
            r.u16("symmetric keyBits")?;
            r.u16("symmetric mode")?;
        }

        let key = match alg_type {
            TPM_ALG_RSA => {
                r.algorithm_with_detail("scheme")?;
                r.u16("keyBits")?;
                let exponent = r.u32("exponent")?;
                let modulus = r.sized("unique")?.to_vec();
                TpmPublicKey::Rsa { modulus, exponent }
            }
            TPM_ALG_ECC => {
                r.algorithm_with_detail("scheme")?;
                let curve_id = r.u16("curveID")?;
                r.algorithm_with_detail("kdf")?;
                let x = r.sized("unique.x")?.to_vec();
                let y = r.sized("unique.y")?.to_vec();
                TpmPublicKey::Ecc { curve_id, x, y }
            }
            _ => {
                return Err(StatementError::Malformed(format!(
                    "Unsupported TPM algorithm type: {alg_type:04x}"
                )));
            }
        };
        r.finish()?;

        Ok(Self { name_alg, key })
    }
}

/// TPMS_ATTEST carrying TPMS_CERTIFY_INFO
#[derive(Debug)]
struct CertInfo<'a> {
    magic: u32,
    attest_type: u16,
    extra_data: &'a [u8],
    attested_name: &'a [u8],
}

impl<'a> CertInfo<'a> {
    fn parse(cert_info: &'a [u8]) -> Result<Self, StatementError> {
        let mut r = TpmReader::new(cert_info, "certInfo");
        let magic = r.u32("magic")?;
        let attest_type = r.u16("type")?;
        r.sized("qualifiedSigner")?;
        let extra_data = r.sized("extraData")?;
        r.take(CLOCK_INFO_LEN, "clockInfo")?;
        r.take(FIRMWARE_VERSION_LEN, "firmwareVersion")?;
        let attested_name = r.sized("attested.name")?;
        r.sized("attested.qualifiedName")?;
        r.finish()?;

        Ok(Self {
            magic,
            attest_type,
            extra_data,
            attested_name,
        })
    }
}
