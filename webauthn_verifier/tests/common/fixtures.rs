//! Keys, certificates and WebAuthn artifacts for the integration tests
//!
//! Only the public API of the crate is available here, so this module carries its
//! own DER writer for the few certificate shapes the scenarios need.

use ciborium::value::Value as CborValue;
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, KeyPair};
use webauthn_verifier::{
    Aaguid, AttestationObject, AttestationStatement, AttestedCredentialData, AuthenticatorData,
    CoseAlgorithm, CoseCurve, CoseKey, flags,
};

use super::constants::{TEST_CHALLENGE_B64, TEST_ORIGIN, TEST_RP_ID};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest::digest(&digest::SHA256, data).as_ref());
    out
}

pub fn concat(first: &[u8], second: &[u8]) -> Vec<u8> {
    let mut out = first.to_vec();
    out.extend_from_slice(second);
    out
}

mod der {
    fn length(len: usize) -> Vec<u8> {
        if len < 0x80 {
            return vec![len as u8];
        }
        let bytes: Vec<u8> = len
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect();
        let mut out = vec![0x80 | bytes.len() as u8];
        out.extend(bytes);
        out
    }

    pub fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend(length(content.len()));
        out.extend_from_slice(content);
        out
    }

    pub fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
        tlv(0x30, &parts.concat())
    }

    pub fn set(parts: &[Vec<u8>]) -> Vec<u8> {
        tlv(0x31, &parts.concat())
    }

    pub fn oid(body: &[u8]) -> Vec<u8> {
        tlv(0x06, body)
    }

    pub fn small_int(value: u8) -> Vec<u8> {
        if value & 0x80 != 0 {
            tlv(0x02, &[0x00, value])
        } else {
            tlv(0x02, &[value])
        }
    }

    pub fn bit_string(content: &[u8]) -> Vec<u8> {
        let mut data = vec![0x00];
        data.extend_from_slice(content);
        tlv(0x03, &data)
    }

    pub fn octet_string(content: &[u8]) -> Vec<u8> {
        tlv(0x04, content)
    }

    pub fn utf8(s: &str) -> Vec<u8> {
        tlv(0x0C, s.as_bytes())
    }

    pub fn utc_time(s: &str) -> Vec<u8> {
        tlv(0x17, s.as_bytes())
    }

    pub fn explicit(tag_number: u8, content: &[u8]) -> Vec<u8> {
        tlv(0xA0 | tag_number, content)
    }
}

const OID_ECDSA_WITH_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02];
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];
const OID_PRIME256V1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1D, 0x13];

/// A P-256 signing key.
pub struct TestKey {
    pair: EcdsaKeyPair,
}

impl TestKey {
    pub fn generate() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 =
            EcdsaKeyPair::generate_pkcs8(&signature::ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
                .unwrap();
        let pair = EcdsaKeyPair::from_pkcs8(
            &signature::ECDSA_P256_SHA256_ASN1_SIGNING,
            pkcs8.as_ref(),
            &rng,
        )
        .unwrap();
        Self { pair }
    }

    /// Uncompressed point
    pub fn public_key(&self) -> Vec<u8> {
        self.pair.public_key().as_ref().to_vec()
    }

    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.pair
            .sign(&SystemRandom::new(), message)
            .unwrap()
            .as_ref()
            .to_vec()
    }

    pub fn cose_key(&self) -> CoseKey {
        let point = self.public_key();
        CoseKey::Ec2 {
            alg: CoseAlgorithm::Es256,
            curve: CoseCurve::P256,
            x: point[1..33].to_vec(),
            y: point[33..65].to_vec(),
        }
    }

    fn spki(&self) -> Vec<u8> {
        der::seq(&[
            der::seq(&[der::oid(OID_EC_PUBLIC_KEY), der::oid(OID_PRIME256V1)]),
            der::bit_string(&self.public_key()),
        ])
    }
}

/// Subject name with the given organizational unit and common name.
pub fn name(organizational_unit: Option<&str>, common_name: &str) -> Vec<u8> {
    let rdn = |oid: &[u8], value: &str| der::set(&[der::seq(&[der::oid(oid), der::utf8(value)])]);
    let mut rdns = vec![
        rdn(&[0x55, 0x04, 0x06], "US"),
        rdn(&[0x55, 0x04, 0x0A], "Integration Vendor"),
    ];
    if let Some(ou) = organizational_unit {
        rdns.push(rdn(&[0x55, 0x04, 0x0B], ou));
    }
    rdns.push(rdn(&[0x55, 0x04, 0x03], common_name));
    der::seq(&rdns)
}

fn certificate(
    serial: u8,
    issuer: &[u8],
    subject: &[u8],
    subject_key: &TestKey,
    signer: &TestKey,
    ca: bool,
) -> Vec<u8> {
    let constraints = if ca {
        der::seq(&[der::tlv(0x01, &[0xFF])])
    } else {
        der::seq(&[])
    };
    let extension = der::seq(&[
        der::oid(OID_BASIC_CONSTRAINTS),
        der::tlv(0x01, &[0xFF]),
        der::octet_string(&constraints),
    ]);
    let algorithm = der::seq(&[der::oid(OID_ECDSA_WITH_SHA256)]);
    let tbs = der::seq(&[
        der::explicit(0, &der::small_int(2)),
        der::small_int(serial),
        algorithm.clone(),
        issuer.to_vec(),
        der::seq(&[
            der::utc_time("200101000000Z"),
            der::utc_time("491231235959Z"),
        ]),
        subject.to_vec(),
        subject_key.spki(),
        der::explicit(3, &der::seq(&[extension])),
    ]);
    let sig = signer.sign(&tbs);
    der::seq(&[tbs, algorithm, der::bit_string(&sig)])
}

/// A self-signed root certificate authority.
pub struct TestCa {
    pub cert: Vec<u8>,
    pub name: Vec<u8>,
    key: TestKey,
}

impl TestCa {
    pub fn root(common_name: &str) -> Self {
        let key = TestKey::generate();
        let name = name(None, common_name);
        let cert = certificate(1, &name, &name, &key, &key, true);
        Self { cert, name, key }
    }

    /// Issues a non-CA attestation certificate for `subject_key`.
    pub fn issue_attestation_cert(&self, subject_key: &TestKey, common_name: &str) -> Vec<u8> {
        let subject = name(Some("Authenticator Attestation"), common_name);
        certificate(2, &self.name, &subject, subject_key, &self.key, false)
    }

    pub fn to_pem(&self) -> String {
        use base64::Engine;
        let body = base64::engine::general_purpose::STANDARD.encode(&self.cert);
        let lines: Vec<&str> = body
            .as_bytes()
            .chunks(64)
            .map(|chunk| std::str::from_utf8(chunk).unwrap())
            .collect();
        format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            lines.join("\n")
        )
    }
}

pub fn create_test_client_data_json(type_: &str) -> Vec<u8> {
    serde_json::json!({
        "type": type_,
        "challenge": TEST_CHALLENGE_B64,
        "origin": TEST_ORIGIN,
    })
    .to_string()
    .into_bytes()
}

pub fn create_test_auth_data(aaguid: Aaguid, credential_key: &TestKey) -> AuthenticatorData {
    AuthenticatorData::new(
        sha256(TEST_RP_ID.as_bytes()),
        flags::UP | flags::UV,
        0,
        Some(AttestedCredentialData::new(
            aaguid,
            vec![0x5A; 32],
            credential_key.cose_key(),
        )),
        None,
    )
}

/// Encodes an attestation object around raw authenticator data bytes.
pub fn encode_attestation_object(
    format: &str,
    statement: Vec<(CborValue, CborValue)>,
    auth_data: &[u8],
) -> Vec<u8> {
    let value = CborValue::Map(vec![
        (
            CborValue::Text("fmt".to_string()),
            CborValue::Text(format.to_string()),
        ),
        (CborValue::Text("attStmt".to_string()), CborValue::Map(statement)),
        (
            CborValue::Text("authData".to_string()),
            CborValue::Bytes(auth_data.to_vec()),
        ),
    ]);
    let mut out = Vec::new();
    ciborium::ser::into_writer(&value, &mut out).unwrap();
    out
}

pub fn create_test_attestation_object(
    auth_data: AuthenticatorData,
    statement: AttestationStatement,
) -> Vec<u8> {
    AttestationObject::new(auth_data, statement)
        .unwrap()
        .encode()
        .unwrap()
}

/// Packed self attestation statement entries signed over `auth_data || SHA-256(client_data_json)`.
pub fn packed_self_statement(
    key: &TestKey,
    auth_data: &[u8],
    client_data_json: &[u8],
) -> Vec<(CborValue, CborValue)> {
    let sig = key.sign(&concat(auth_data, &sha256(client_data_json)));
    vec![
        (CborValue::Text("alg".to_string()), CborValue::Integer((-7i64).into())),
        (CborValue::Text("sig".to_string()), CborValue::Bytes(sig)),
    ]
}
