use thiserror::Error;

use crate::decoder::AttestationFormat;

/// Errors that can occur while validating a WebAuthn registration or authentication ceremony.
///
/// Every variant is terminal for the validation call that produced it. The pipeline
/// never exposes partially validated state.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Malformed, truncated or structurally inconsistent binary input
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The attestation object names a format no validator exists for
    #[error("Unsupported attestation format: {0}")]
    UnsupportedFormat(String),

    /// The attestation statement failed format-specific verification
    #[error("{format} attestation statement invalid: {source}")]
    Statement {
        format: AttestationFormat,
        #[source]
        source: StatementError,
    },

    /// Certificate path building or validation failed
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// The trust anchor repository could not load its trust material
    #[error(transparent)]
    TrustAnchorLoad(#[from] TrustAnchorLoadError),

    /// The attestation was cryptographically valid but rejected by the configured trust policy
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// rpIdHash in authenticator data does not match the expected RP ID
    #[error("RP ID hash mismatch")]
    RpIdHashMismatch,

    /// The user-present flag is not set
    #[error("User not present")]
    UserNotPresent,

    /// User verification was required but the user-verified flag is not set
    #[error("User verification required but flag not set")]
    UserVerificationRequired,

    /// The backup-state flag is set while backup eligibility is not
    #[error("Backup state flag set on a credential that is not backup eligible")]
    InconsistentBackupFlags,

    /// The signature counter did not advance, which may indicate a cloned authenticator
    #[error("Signature counter {received} is not greater than stored counter {stored}")]
    CounterLowerThanStored { stored: u32, received: u32 },

    /// The assertion signature does not verify against the stored credential key
    #[error("Assertion signature invalid: {0}")]
    BadSignature(String),

    /// Error validating the client data JSON
    #[error("Invalid client data: {0}")]
    ClientData(String),

    /// The challenge in the client data does not match the expected challenge
    #[error("Challenge mismatch")]
    ChallengeMismatch,

    /// The origin in the client data is not one of the allowed origins
    #[error("Origin mismatch: {0}")]
    OriginMismatch(String),

    /// Authenticator data carries an extension the relying party did not request
    #[error("Unexpected extension: {0}")]
    UnexpectedExtension(String),

    /// Invalid validator configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ValidationError {
    pub(crate) fn statement(format: AttestationFormat, source: StatementError) -> Self {
        ValidationError::Statement { format, source }
    }
}

/// A decoding failure, always naming the offending field.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Failed to decode {field}: {reason}")]
pub struct DecodeError {
    pub field: &'static str,
    pub reason: String,
}

impl DecodeError {
    pub(crate) fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Format-independent failure kinds reported by attestation statement validators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatementError {
    /// A signature or proof did not verify against the signed bytes
    #[error("Signature mismatch: {0}")]
    SignatureMismatch(String),

    /// The statement is missing fields or carries values that violate the format rules
    #[error("Malformed statement: {0}")]
    Malformed(String),

    /// The statement uses an algorithm this validator cannot verify
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// X.509 path building and validation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CertificateError {
    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("Certificate path is empty")]
    EmptyPath,

    #[error("Broken certificate chain: {0}")]
    BrokenChain(String),

    #[error("Issuing certificate is not a CA: {0}")]
    NotCa(String),

    #[error("Path length constraint exceeded at {0}")]
    PathLengthExceeded(String),

    #[error("Certificate expired: {0}")]
    Expired(String),

    #[error("Certificate not yet valid: {0}")]
    NotYetValid(String),

    #[error("Certificate path does not terminate at a trusted anchor")]
    UntrustedRoot,

    #[error("Name constraint violated by {0}")]
    NameConstraintViolation(String),

    #[error("Certificate revoked: serial {0}")]
    Revoked(String),

    #[error("Revocation status unknown: {0}")]
    RevocationUnknown(String),
}

/// Failures loading trust material. Cloneable so a memoised failure reaches every waiter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrustAnchorLoadError {
    #[error("Failed to load TrustAnchor from keystore: {0}")]
    Io(String),

    #[error("Malformed keystore: {0}")]
    Malformed(String),

    #[error("Keystore contains no certificates")]
    Empty,
}

/// Trust policy rejections. Distinct from cryptographic failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("'none' attestation is not accepted")]
    NoneAttestationProhibited,

    #[error("Self attestation is not accepted, a certificate chain is required")]
    SelfAttestationProhibited,

    #[error("Attestation does not chain to a trusted anchor")]
    UntrustedAttestation,
}
