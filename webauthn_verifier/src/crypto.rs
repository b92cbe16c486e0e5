//! Signature verification over COSE keys and X.509 subject public keys.

use ring::digest;
use ring::signature::{self, RsaParameters, RsaPublicKeyComponents, UnparsedPublicKey};
use webpki::EndEntityCert;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::decoder::{CoseAlgorithm, CoseKey};
use crate::errors::StatementError;
use crate::utils::strip_leading_zeros;

// OID 1.3.101.112 (id-Ed25519)
const OID_ED25519: &[u8] = &[0x2B, 0x65, 0x70];

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VerifyError {
    /// No verifier exists for the algorithm
    UnsupportedAlgorithm(String),
    /// The key cannot be used with the requested algorithm
    KeyMismatch(String),
    /// The signature does not verify
    BadSignature,
}

impl From<VerifyError> for StatementError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::UnsupportedAlgorithm(msg) => StatementError::UnsupportedAlgorithm(msg),
            VerifyError::KeyMismatch(msg) => StatementError::Malformed(msg),
            VerifyError::BadSignature => {
                StatementError::SignatureMismatch("signature does not verify".to_string())
            }
        }
    }
}

enum RingAlgorithm {
    Ecdsa(&'static signature::EcdsaVerificationAlgorithm),
    Rsa(&'static RsaParameters),
    Ed25519,
}

fn ring_algorithm(alg: CoseAlgorithm) -> Result<RingAlgorithm, VerifyError> {
    match alg {
        CoseAlgorithm::Es256 => Ok(RingAlgorithm::Ecdsa(&signature::ECDSA_P256_SHA256_ASN1)),
        CoseAlgorithm::Es384 => Ok(RingAlgorithm::Ecdsa(&signature::ECDSA_P384_SHA384_ASN1)),
        CoseAlgorithm::EdDsa => Ok(RingAlgorithm::Ed25519),
        CoseAlgorithm::Rs256 => Ok(RingAlgorithm::Rsa(&signature::RSA_PKCS1_2048_8192_SHA256)),
        CoseAlgorithm::Rs384 => Ok(RingAlgorithm::Rsa(&signature::RSA_PKCS1_2048_8192_SHA384)),
        CoseAlgorithm::Rs512 => Ok(RingAlgorithm::Rsa(&signature::RSA_PKCS1_2048_8192_SHA512)),
        CoseAlgorithm::Ps256 => Ok(RingAlgorithm::Rsa(&signature::RSA_PSS_2048_8192_SHA256)),
        CoseAlgorithm::Ps384 => Ok(RingAlgorithm::Rsa(&signature::RSA_PSS_2048_8192_SHA384)),
        CoseAlgorithm::Ps512 => Ok(RingAlgorithm::Rsa(&signature::RSA_PSS_2048_8192_SHA512)),
        CoseAlgorithm::Rs1 => Ok(RingAlgorithm::Rsa(
            &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
        )),
        CoseAlgorithm::Es512 => Err(VerifyError::UnsupportedAlgorithm(format!(
            "{alg} signatures cannot be verified"
        ))),
    }
}

fn webpki_algorithm(alg: CoseAlgorithm) -> Option<&'static webpki::SignatureAlgorithm> {
    match alg {
        CoseAlgorithm::Es256 => Some(&webpki::ECDSA_P256_SHA256),
        CoseAlgorithm::Es384 => Some(&webpki::ECDSA_P384_SHA384),
        CoseAlgorithm::EdDsa => Some(&webpki::ED25519),
        CoseAlgorithm::Rs256 => Some(&webpki::RSA_PKCS1_2048_8192_SHA256),
        CoseAlgorithm::Rs384 => Some(&webpki::RSA_PKCS1_2048_8192_SHA384),
        CoseAlgorithm::Rs512 => Some(&webpki::RSA_PKCS1_2048_8192_SHA512),
        CoseAlgorithm::Ps256 => Some(&webpki::RSA_PSS_2048_8192_SHA256_LEGACY_KEY),
        CoseAlgorithm::Ps384 => Some(&webpki::RSA_PSS_2048_8192_SHA384_LEGACY_KEY),
        CoseAlgorithm::Ps512 => Some(&webpki::RSA_PSS_2048_8192_SHA512_LEGACY_KEY),
        CoseAlgorithm::Rs1 | CoseAlgorithm::Es512 => None,
    }
}

/// Resolves a raw COSE algorithm identifier from an attestation statement.
pub(crate) fn cose_algorithm(alg: i64) -> Result<CoseAlgorithm, VerifyError> {
    CoseAlgorithm::from_id(alg)
        .ok_or_else(|| VerifyError::UnsupportedAlgorithm(format!("unknown COSE algorithm {alg}")))
}

/// Verifies `signature` over `message` with a COSE credential public key.
pub(crate) fn verify_with_cose_key(
    key: &CoseKey,
    message: &[u8],
    sig: &[u8],
) -> Result<(), VerifyError> {
    let alg = key.algorithm();
    match (ring_algorithm(alg)?, key) {
        (RingAlgorithm::Ecdsa(ring_alg), CoseKey::Ec2 { .. }) => {
            let point = key.ec_point().ok_or(VerifyError::BadSignature)?;
            UnparsedPublicKey::new(ring_alg, point)
                .verify(message, sig)
                .map_err(|_| VerifyError::BadSignature)
        }
        (RingAlgorithm::Rsa(params), CoseKey::Rsa { n, e, .. }) => RsaPublicKeyComponents {
            n: strip_leading_zeros(n),
            e: strip_leading_zeros(e),
        }
        .verify(params, message, sig)
        .map_err(|_| VerifyError::BadSignature),
        (RingAlgorithm::Ed25519, CoseKey::Okp { x, .. }) => {
            UnparsedPublicKey::new(&signature::ED25519, x)
                .verify(message, sig)
                .map_err(|_| VerifyError::BadSignature)
        }
        _ => Err(VerifyError::KeyMismatch(format!(
            "{alg} does not match the key type"
        ))),
    }
}

/// Verifies `signature` over `message` with a certificate's subject public key.
pub(crate) fn verify_with_spki(
    alg: CoseAlgorithm,
    spki: &SubjectPublicKeyInfo,
    message: &[u8],
    sig: &[u8],
) -> Result<(), VerifyError> {
    let key_bytes: &[u8] = &spki.subject_public_key.data;
    let result = match ring_algorithm(alg)? {
        RingAlgorithm::Ecdsa(ring_alg) => {
            UnparsedPublicKey::new(ring_alg, key_bytes).verify(message, sig)
        }
        RingAlgorithm::Rsa(params) => {
            UnparsedPublicKey::new(params, key_bytes).verify(message, sig)
        }
        RingAlgorithm::Ed25519 => {
            UnparsedPublicKey::new(&signature::ED25519, key_bytes).verify(message, sig)
        }
    };
    result.map_err(|_| VerifyError::BadSignature)
}

/// Verifies a signature made by the key of the DER certificate `cert_der`.
///
/// webpki is tried first. Certificates webpki refuses to parse (for example TPM AIK
/// certificates with an empty subject) and algorithms it does not know fall back to
/// x509-parser and ring.
pub(crate) fn verify_with_certificate(
    alg: CoseAlgorithm,
    cert_der: &[u8],
    message: &[u8],
    sig: &[u8],
) -> Result<(), VerifyError> {
    if let Some(webpki_alg) = webpki_algorithm(alg) {
        match EndEntityCert::try_from(cert_der) {
            Ok(cert) => {
                return cert
                    .verify_signature(webpki_alg, message, sig)
                    .map_err(|e| match e {
                        webpki::Error::UnsupportedSignatureAlgorithmForPublicKey => {
                            VerifyError::KeyMismatch(format!(
                                "{alg} does not match the certificate key"
                            ))
                        }
                        _ => VerifyError::BadSignature,
                    });
            }
            Err(e) => {
                tracing::debug!(
                    "webpki failed to parse certificate: {:?}. Using fallback signature verification",
                    e
                );
            }
        }
    }

    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| VerifyError::KeyMismatch(format!("Failed to parse certificate: {e}")))?;
    verify_with_spki(alg, cert.public_key(), message, sig)
}

/// Whether a certificate's subject public key is the same key as a COSE key.
pub(crate) fn cose_key_matches_spki(key: &CoseKey, spki: &SubjectPublicKeyInfo) -> bool {
    match key {
        CoseKey::Ec2 { .. } => match key.ec_point() {
            Some(point) => spki.subject_public_key.data.as_ref() == point.as_slice(),
            None => false,
        },
        CoseKey::Rsa { n, e, .. } => match spki.parsed() {
            Ok(PublicKey::RSA(rsa)) => {
                strip_leading_zeros(rsa.modulus) == strip_leading_zeros(n)
                    && strip_leading_zeros(rsa.exponent) == strip_leading_zeros(e)
            }
            _ => false,
        },
        CoseKey::Okp { x, .. } => {
            spki.algorithm.algorithm.as_bytes() == OID_ED25519
                && spki.subject_public_key.data.as_ref() == x.as_slice()
        }
    }
}

/// SHA-1 over the subject public key bit string, as used by FIDO metadata key identifiers.
pub(crate) fn key_identifier(spki: &SubjectPublicKeyInfo) -> Vec<u8> {
    digest::digest(
        &digest::SHA1_FOR_LEGACY_USE_ONLY,
        &spki.subject_public_key.data,
    )
    .as_ref()
    .to_vec()
}

/// Whether the SPKI is an uncompressed P-256 point.
pub(crate) fn is_p256_spki(spki: &SubjectPublicKeyInfo) -> bool {
    spki.algorithm.algorithm.as_bytes() == oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY.as_bytes()
        && spki.subject_public_key.data.len() == 65
        && spki.subject_public_key.data[0] == 0x04
}
