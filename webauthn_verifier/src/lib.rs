//! webauthn-verifier - WebAuthn attestation and assertion verification
//!
//! This crate decodes and verifies the binary artifacts produced by WebAuthn
//! authenticators. Registrations are checked end to end, from the attestation
//! statement of each supported format through X.509 path validation against
//! relying party trust anchors. Assertions are checked against stored credentials.
//!
//! Persistence, HTTP and session handling are left to the caller.

mod anchor;
mod attestation;
mod config;
mod crypto;
mod decoder;
mod errors;
mod trust;
mod utils;
mod validator;

#[cfg(test)]
mod test_utils;

pub use anchor::{
    AaguidTrustAnchorRepository, KeyStore, KeyStoreLoader, KeyStoreTrustAnchorAsyncRepository,
    KeyStoreTrustAnchorRepository, NameConstraints, PemFileKeyStoreLoader, TrustAnchor,
    TrustAnchorAsyncRepository, TrustAnchorRepository, TrustAnchorSet,
};

pub use attestation::{AttestationType, VerifiedAttestation};

pub use config::{
    AndroidKeyConfig, PathValidationConfig, SafetyNetConfig, TrustPolicy,
    UserVerificationRequirement, ValidatorConfig,
};

pub use decoder::{
    Aaguid, AndroidKeyStatement, AndroidSafetyNetStatement, AppleAnonymousStatement,
    AttestationFormat, AttestationObject, AttestationStatement, AttestedCredentialData,
    AuthenticatorData, AuthenticatorExtensions, CollectedClientData, CoseAlgorithm, CoseCurve,
    CoseKey, CredentialProtectionPolicy, FidoU2fStatement, PackedStatement, TpmStatement,
    UserVerificationMethod, UvmEntry, flags,
};

pub use errors::{
    CertificateError, DecodeError, PolicyError, StatementError, TrustAnchorLoadError,
    ValidationError,
};

pub use trust::{CrlSource, InMemoryCrlSource, TrustVerdict, TrustworthinessValidator};

pub use validator::{
    AsyncRegistrationValidator, AuthenticationData, AuthenticationRequest,
    AuthenticationValidator, CredentialRecord, RegistrationData, RegistrationRequest,
    RegistrationValidator,
};
