use std::sync::Arc;

use ciborium::value::Value as CborValue;
use proptest::prelude::*;
use webauthn_verifier::{
    Aaguid, AaguidTrustAnchorRepository, AttestationFormat, AttestationStatement,
    FidoU2fStatement, PolicyError, RegistrationRequest, RegistrationValidator, StatementError,
    TrustVerdict, ValidationError,
};

use crate::common::*;

fn create_test_validator() -> RegistrationValidator {
    RegistrationValidator::new(
        create_test_config(),
        Arc::new(AaguidTrustAnchorRepository::new()),
    )
}

fn create_test_request(
    attestation_object: Vec<u8>,
    client_data_json: Vec<u8>,
) -> RegistrationRequest {
    RegistrationRequest::new(attestation_object, client_data_json, TEST_CHALLENGE.to_vec())
}

/// A packed self attestation and the client data it signs.
fn create_test_packed_self(key: &TestKey) -> (Vec<u8>, Vec<u8>) {
    let auth_data = create_test_auth_data(Aaguid([0x33; 16]), key).encode().unwrap();
    let client_data_json = create_test_client_data_json("webauthn.create");
    let statement = packed_self_statement(key, &auth_data, &client_data_json);
    (
        encode_attestation_object("packed", statement, &auth_data),
        client_data_json,
    )
}

#[test]
fn test_none_attestation_pipeline() {
    let key = TestKey::generate();
    let attestation_object = create_test_attestation_object(
        create_test_auth_data(Aaguid::ZERO, &key),
        AttestationStatement::None,
    );
    let request = create_test_request(
        attestation_object,
        create_test_client_data_json("webauthn.create"),
    );

    let data = create_test_validator().validate(&request).unwrap();
    assert_eq!(data.verdict, TrustVerdict::NoAttestation);
    assert_eq!(data.attestation_format, AttestationFormat::None);
    assert_eq!(data.credential_public_key, key.cose_key());
    assert_eq!(data.credential_id, vec![0x5A; 32]);
    assert_eq!(data.aaguid, Aaguid::ZERO);
}

#[test]
fn test_u2f_tampered_signature_is_statement_error() {
    let ca = TestCa::root("U2F Integration Root");
    let attestation_key = TestKey::generate();
    let cert = ca.issue_attestation_cert(&attestation_key, "U2F Token");
    let credential_key = TestKey::generate();
    let auth_data = create_test_auth_data(Aaguid::ZERO, &credential_key);
    let client_data_json = create_test_client_data_json("webauthn.create");

    let mut payload = vec![0x00];
    payload.extend_from_slice(auth_data.rp_id_hash());
    payload.extend_from_slice(&sha256(&client_data_json));
    payload.extend_from_slice(&[0x5A; 32]);
    payload.extend_from_slice(&credential_key.public_key());
    let mut sig = attestation_key.sign(&payload);
    let last = sig.len() - 1;
    sig[last] ^= 0x01;

    let attestation_object = create_test_attestation_object(
        auth_data,
        AttestationStatement::FidoU2f(FidoU2fStatement {
            sig,
            x5c: vec![cert],
        }),
    );
    let request = create_test_request(attestation_object, client_data_json);
    let result = create_test_validator().validate(&request);
    assert!(matches!(
        result,
        Err(ValidationError::Statement {
            format: AttestationFormat::FidoU2f,
            source: StatementError::SignatureMismatch(_),
        })
    ));
}

#[test]
fn test_packed_self_attestation_rejected_when_chain_required() {
    let key = TestKey::generate();
    let (attestation_object, client_data_json) = create_test_packed_self(&key);
    let request = create_test_request(attestation_object, client_data_json);

    // The signature itself is valid
    let data = create_test_validator().validate(&request).unwrap();
    assert_eq!(data.verdict, TrustVerdict::SelfAttested);

    let mut config = create_test_config();
    config.trust_policy.allow_self_attestation = false;
    let validator =
        RegistrationValidator::new(config, Arc::new(AaguidTrustAnchorRepository::new()));
    assert!(matches!(
        validator.validate(&request),
        Err(ValidationError::Policy(PolicyError::SelfAttestationProhibited))
    ));
}

#[test]
fn test_unknown_aaguid_yields_untrusted_verdict() {
    let ca = TestCa::root("Packed Integration Root");
    let attestation_key = TestKey::generate();
    let cert = ca.issue_attestation_cert(&attestation_key, "Packed Key");
    let credential_key = TestKey::generate();
    let auth_data = create_test_auth_data(Aaguid([0x44; 16]), &credential_key)
        .encode()
        .unwrap();
    let client_data_json = create_test_client_data_json("webauthn.create");
    let sig = attestation_key.sign(&concat(&auth_data, &sha256(&client_data_json)));
    let statement = vec![
        (CborValue::Text("alg".to_string()), CborValue::Integer((-7i64).into())),
        (CborValue::Text("sig".to_string()), CborValue::Bytes(sig)),
        (
            CborValue::Text("x5c".to_string()),
            CborValue::Array(vec![CborValue::Bytes(cert)]),
        ),
    ];
    let request = create_test_request(
        encode_attestation_object("packed", statement, &auth_data),
        client_data_json,
    );

    assert!(matches!(
        create_test_validator().validate(&request),
        Err(ValidationError::Policy(PolicyError::UntrustedAttestation))
    ));

    let mut config = create_test_config();
    config.trust_policy.allow_untrusted_attestation = true;
    let validator =
        RegistrationValidator::new(config, Arc::new(AaguidTrustAnchorRepository::new()));
    assert_eq!(
        validator.validate(&request).unwrap().verdict,
        TrustVerdict::Untrusted
    );
}

#[test]
fn test_unsupported_format() {
    let key = TestKey::generate();
    let auth_data = create_test_auth_data(Aaguid::ZERO, &key).encode().unwrap();
    let request = create_test_request(
        encode_attestation_object("x-proprietary", vec![], &auth_data),
        create_test_client_data_json("webauthn.create"),
    );
    assert!(matches!(
        create_test_validator().validate(&request),
        Err(ValidationError::UnsupportedFormat(f)) if f == "x-proprietary"
    ));
}

#[test]
fn test_truncated_attestation_object() {
    let key = TestKey::generate();
    let (attestation_object, client_data_json) = create_test_packed_self(&key);
    let truncated = attestation_object[..attestation_object.len() - 10].to_vec();
    assert!(matches!(
        create_test_validator().validate(&create_test_request(truncated, client_data_json)),
        Err(ValidationError::Decode(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_flipping_signed_auth_data_byte_fails(
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let key = TestKey::generate();
        let mut auth_data = create_test_auth_data(Aaguid([0x33; 16]), &key).encode().unwrap();
        let client_data_json = create_test_client_data_json("webauthn.create");
        let statement = packed_self_statement(&key, &auth_data, &client_data_json);

        let i = index.index(auth_data.len());
        auth_data[i] ^= mask;
        let request = create_test_request(
            encode_attestation_object("packed", statement, &auth_data),
            client_data_json,
        );
        prop_assert!(create_test_validator().validate(&request).is_err());
    }

    #[test]
    fn prop_flipping_client_data_byte_fails(
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let key = TestKey::generate();
        let (attestation_object, mut client_data_json) = create_test_packed_self(&key);

        let i = index.index(client_data_json.len());
        client_data_json[i] ^= mask;
        let request = create_test_request(attestation_object, client_data_json);
        prop_assert!(create_test_validator().validate(&request).is_err());
    }
}
