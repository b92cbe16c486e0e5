use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ciborium::value::Value as CborValue;
use webauthn_verifier::{
    Aaguid, AaguidTrustAnchorRepository, AsyncRegistrationValidator, KeyStore, KeyStoreLoader,
    KeyStoreTrustAnchorAsyncRepository, PemFileKeyStoreLoader, RegistrationRequest, TrustAnchor,
    TrustAnchorAsyncRepository, TrustAnchorLoadError, TrustAnchorRepository, TrustVerdict,
    ValidationError,
};

use crate::common::*;

const AAGUID: Aaguid = Aaguid([0x77; 16]);

/// Packed basic attestation issued by `ca` for a fresh credential.
fn create_test_packed_request(ca: &TestCa) -> RegistrationRequest {
    let attestation_key = TestKey::generate();
    let cert = ca.issue_attestation_cert(&attestation_key, "Packed Authenticator");
    let credential_key = TestKey::generate();
    let auth_data = create_test_auth_data(AAGUID, &credential_key).encode().unwrap();
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
    RegistrationRequest::new(
        encode_attestation_object("packed", statement, &auth_data),
        client_data_json,
        TEST_CHALLENGE.to_vec(),
    )
}

struct CountingLoader {
    loads: Arc<AtomicUsize>,
    certificate: Vec<u8>,
}

#[async_trait]
impl KeyStoreLoader for CountingLoader {
    async fn load(&self) -> Result<KeyStore, TrustAnchorLoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        KeyStore::from_der_certificates(vec![self.certificate.clone()])
    }
}

#[test]
fn test_unregistered_aaguid_is_empty_set() {
    let ca = TestCa::root("Known Vendor Root");
    let mut repo = AaguidTrustAnchorRepository::new();
    repo.add_for_aaguid(AAGUID, TrustAnchor::from_der(ca.cert).unwrap());

    assert_eq!(repo.find_by_aaguid(&AAGUID).len(), 1);
    assert!(repo.find_by_aaguid(&Aaguid([0x78; 16])).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registrations_share_one_load() {
    let ca = TestCa::root("Keystore Vendor Root");
    let loads = Arc::new(AtomicUsize::new(0));
    let repo = KeyStoreTrustAnchorAsyncRepository::new(CountingLoader {
        loads: loads.clone(),
        certificate: ca.cert.clone(),
    });
    let validator = Arc::new(AsyncRegistrationValidator::new(
        create_test_config(),
        Arc::new(repo),
    ));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let validator = validator.clone();
            let request = create_test_packed_request(&ca);
            tokio::spawn(async move { validator.validate(&request).await })
        })
        .collect();

    for handle in handles {
        let data = handle.await.unwrap().unwrap();
        assert_eq!(
            data.verdict,
            TrustVerdict::Trusted {
                anchor_subject: "C=US, O=Integration Vendor, CN=Keystore Vendor Root".to_string()
            }
        );
    }
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pem_keystore_end_to_end() {
    let ca = TestCa::root("PEM Vendor Root");
    let path = std::env::temp_dir().join(format!("webauthn-verifier-it-{}.pem", uuid::Uuid::new_v4()));
    tokio::fs::write(&path, ca.to_pem()).await.unwrap();

    let repo = Arc::new(KeyStoreTrustAnchorAsyncRepository::new(
        PemFileKeyStoreLoader::new(&path),
    ));
    assert_eq!(repo.find_by_aaguid(&AAGUID).await.unwrap().len(), 1);

    let validator = AsyncRegistrationValidator::new(create_test_config(), repo);
    let data = validator
        .validate(&create_test_packed_request(&ca))
        .await
        .unwrap();
    assert!(matches!(data.verdict, TrustVerdict::Trusted { .. }));

    tokio::fs::remove_file(&path).await.unwrap();
}

#[tokio::test]
async fn test_missing_keystore_reaches_registration() {
    let ca = TestCa::root("Unreachable Root");
    let repo = KeyStoreTrustAnchorAsyncRepository::new(PemFileKeyStoreLoader::new(
        "/nonexistent/webauthn-anchors.pem",
    ));
    let validator = AsyncRegistrationValidator::new(create_test_config(), Arc::new(repo));
    assert!(matches!(
        validator.validate(&create_test_packed_request(&ca)).await,
        Err(ValidationError::TrustAnchorLoad(TrustAnchorLoadError::Io(_)))
    ));
}
