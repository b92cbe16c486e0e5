//! Test utilities shared by the unit tests of this crate
//!
//! Provides ring-backed test keys, a minimal DER writer and builders for X.509
//! certificates, CRLs and WebAuthn structures. Everything produced here is
//! structurally valid so the code under test sees realistic input.

use ciborium::value::Value as CborValue;
use ring::rand::SystemRandom;
use ring::signature::{self, EcdsaKeyPair, Ed25519KeyPair, KeyPair};

use crate::decoder::{
    Aaguid, AttestationObject, AttestationStatement, AttestedCredentialData, AuthenticatorData,
    CoseAlgorithm, CoseCurve, CoseKey, flags,
};
use crate::utils::{base64_encode, sha256};

pub(crate) const TEST_RP_ID: &str = "example.com";
pub(crate) const TEST_ORIGIN: &str = "https://example.com";
pub(crate) const TEST_CHALLENGE: &[u8] = b"test-challenge";

/// Minimal DER writer
pub(crate) mod der {
    fn length(len: usize) -> Vec<u8> {
        if len < 0x80 {
            vec![len as u8]
        } else {
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
    }

    pub(crate) fn tlv(tag: &[u8], content: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend(length(content.len()));
        out.extend_from_slice(content);
        out
    }

    pub(crate) fn seq(parts: &[Vec<u8>]) -> Vec<u8> {
        tlv(&[0x30], &parts.concat())
    }

    pub(crate) fn set(parts: &[Vec<u8>]) -> Vec<u8> {
        tlv(&[0x31], &parts.concat())
    }

    pub(crate) fn oid(encoded: &[u8]) -> Vec<u8> {
        tlv(&[0x06], encoded)
    }

    pub(crate) fn int(value: u64) -> Vec<u8> {
        let mut bytes: Vec<u8> = value
            .to_be_bytes()
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect();
        if bytes.is_empty() || bytes[0] & 0x80 != 0 {
            bytes.insert(0, 0);
        }
        tlv(&[0x02], &bytes)
    }

    pub(crate) fn enumerated(value: u8) -> Vec<u8> {
        tlv(&[0x0A], &[value])
    }

    pub(crate) fn boolean(value: bool) -> Vec<u8> {
        tlv(&[0x01], &[if value { 0xFF } else { 0x00 }])
    }

    pub(crate) fn null() -> Vec<u8> {
        vec![0x05, 0x00]
    }

    pub(crate) fn octet_string(content: &[u8]) -> Vec<u8> {
        tlv(&[0x04], content)
    }

    pub(crate) fn bit_string(content: &[u8]) -> Vec<u8> {
        let mut data = vec![0x00];
        data.extend_from_slice(content);
        tlv(&[0x03], &data)
    }

    pub(crate) fn utf8(s: &str) -> Vec<u8> {
        tlv(&[0x0C], s.as_bytes())
    }

    pub(crate) fn utc_time(s: &str) -> Vec<u8> {
        tlv(&[0x17], s.as_bytes())
    }

    /// Constructed context-specific tag, `[n] EXPLICIT`, including multi-byte tag numbers.
    pub(crate) fn explicit(tag_number: u32, content: &[u8]) -> Vec<u8> {
        if tag_number < 31 {
            tlv(&[0xA0 | tag_number as u8], content)
        } else {
            let mut tag = vec![0xBF];
            let mut groups = Vec::new();
            let mut n = tag_number;
            while n > 0 {
                groups.push((n & 0x7F) as u8);
                n >>= 7;
            }
            groups.reverse();
            let last = groups.len() - 1;
            for (i, g) in groups.into_iter().enumerate() {
                tag.push(if i == last { g } else { g | 0x80 });
            }
            tlv(&tag, content)
        }
    }
}

// Encoded OID bodies
pub(crate) const OID_CN: &[u8] = &[0x55, 0x04, 0x03];
pub(crate) const OID_ECDSA_WITH_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02];
pub(crate) const OID_EC_PUBLIC_KEY: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];
pub(crate) const OID_PRIME256V1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
pub(crate) const OID_ED25519: &[u8] = &[0x2B, 0x65, 0x70];
pub(crate) const OID_BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1D, 0x13];
pub(crate) const OID_SUBJECT_ALT_NAME: &[u8] = &[0x55, 0x1D, 0x11];
pub(crate) const OID_EXT_KEY_USAGE: &[u8] = &[0x55, 0x1D, 0x25];
pub(crate) const OID_TCG_KP_AIK_CERTIFICATE: &[u8] = &[0x67, 0x81, 0x05, 0x08, 0x03];
pub(crate) const OID_FIDO_GEN_CE_AAGUID: &[u8] = &[
    0x2B, 0x06, 0x01, 0x04, 0x01, 0x82, 0xE5, 0x1C, 0x01, 0x01, 0x04,
];
pub(crate) const OID_ANDROID_KEY_DESCRIPTION: &[u8] = &[
    0x2B, 0x06, 0x01, 0x04, 0x01, 0xD6, 0x79, 0x02, 0x01, 0x11,
];
pub(crate) const OID_APPLE_NONCE: &[u8] = &[
    0x2A, 0x86, 0x48, 0x86, 0xF7, 0x63, 0x64, 0x08, 0x02,
];

/// A signing key for tests, generated with ring.
pub(crate) enum TestKey {
    P256 { pkcs8: Vec<u8>, pair: EcdsaKeyPair },
    Ed25519(Ed25519KeyPair),
}

impl TestKey {
    pub(crate) fn generate_p256() -> Self {
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
        TestKey::P256 {
            pkcs8: pkcs8.as_ref().to_vec(),
            pair,
        }
    }

    pub(crate) fn generate_ed25519() -> Self {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        TestKey::Ed25519(Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap())
    }

    pub(crate) fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            TestKey::P256 { pair, .. } => pair.public_key().as_ref().to_vec(),
            TestKey::Ed25519(pair) => pair.public_key().as_ref().to_vec(),
        }
    }

    /// ASN.1 (DER) ECDSA signature or raw Ed25519 signature.
    pub(crate) fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            TestKey::P256 { pair, .. } => pair
                .sign(&SystemRandom::new(), message)
                .unwrap()
                .as_ref()
                .to_vec(),
            TestKey::Ed25519(pair) => pair.sign(message).as_ref().to_vec(),
        }
    }

    /// Fixed-width `r || s` ECDSA signature as used by JWS.
    pub(crate) fn sign_fixed(&self, message: &[u8]) -> Vec<u8> {
        match self {
            TestKey::P256 { pkcs8, .. } => {
                let rng = SystemRandom::new();
                let pair = EcdsaKeyPair::from_pkcs8(
                    &signature::ECDSA_P256_SHA256_FIXED_SIGNING,
                    pkcs8,
                    &rng,
                )
                .unwrap();
                pair.sign(&rng, message).unwrap().as_ref().to_vec()
            }
            TestKey::Ed25519(pair) => pair.sign(message).as_ref().to_vec(),
        }
    }

    pub(crate) fn cose_key(&self) -> CoseKey {
        let public = self.public_key_bytes();
        match self {
            TestKey::P256 { .. } => CoseKey::Ec2 {
                alg: CoseAlgorithm::Es256,
                curve: CoseCurve::P256,
                x: public[1..33].to_vec(),
                y: public[33..65].to_vec(),
            },
            TestKey::Ed25519(_) => CoseKey::Okp {
                alg: CoseAlgorithm::EdDsa,
                curve: CoseCurve::Ed25519,
                x: public,
            },
        }
    }

    pub(crate) fn algorithm(&self) -> CoseAlgorithm {
        self.cose_key().algorithm()
    }

    pub(crate) fn spki(&self) -> Vec<u8> {
        match self {
            TestKey::P256 { .. } => der::seq(&[
                der::seq(&[der::oid(OID_EC_PUBLIC_KEY), der::oid(OID_PRIME256V1)]),
                der::bit_string(&self.public_key_bytes()),
            ]),
            TestKey::Ed25519(_) => der::seq(&[
                der::seq(&[der::oid(OID_ED25519)]),
                der::bit_string(&self.public_key_bytes()),
            ]),
        }
    }

    fn signature_algorithm(&self) -> Vec<u8> {
        match self {
            TestKey::P256 { .. } => der::seq(&[der::oid(OID_ECDSA_WITH_SHA256)]),
            TestKey::Ed25519(_) => der::seq(&[der::oid(OID_ED25519)]),
        }
    }
}

pub(crate) fn name(common_name: &str) -> Vec<u8> {
    der::seq(&[der::set(&[der::seq(&[
        der::oid(OID_CN),
        der::utf8(common_name),
    ])])])
}

/// Subject name in the shape packed attestation certificates require.
pub(crate) fn attestation_name(common_name: &str) -> Vec<u8> {
    let rdn = |oid: &[u8], value: &str| der::set(&[der::seq(&[der::oid(oid), der::utf8(value)])]);
    der::seq(&[
        rdn(&[0x55, 0x04, 0x06], "US"),
        rdn(&[0x55, 0x04, 0x0A], "Test Vendor"),
        rdn(&[0x55, 0x04, 0x0B], "Authenticator Attestation"),
        rdn(OID_CN, common_name),
    ])
}

pub(crate) fn empty_name() -> Vec<u8> {
    der::seq(&[])
}

pub(crate) fn extension(oid: &[u8], critical: bool, value: &[u8]) -> Vec<u8> {
    let mut parts = vec![der::oid(oid)];
    if critical {
        parts.push(der::boolean(true));
    }
    parts.push(der::octet_string(value));
    der::seq(&parts)
}

pub(crate) fn basic_constraints(ca: bool, path_len: Option<u64>) -> Vec<u8> {
    let mut parts = Vec::new();
    if ca {
        parts.push(der::boolean(true));
    }
    if let Some(len) = path_len {
        parts.push(der::int(len));
    }
    extension(OID_BASIC_CONSTRAINTS, true, &der::seq(&parts))
}

pub(crate) fn aaguid_extension(aaguid: &[u8; 16]) -> Vec<u8> {
    extension(OID_FIDO_GEN_CE_AAGUID, false, &der::octet_string(aaguid))
}

/// Android KeyMaster authorization list entries.
pub(crate) fn android_authorization_list(
    purpose_sign: bool,
    origin_generated: bool,
    all_applications: bool,
) -> Vec<u8> {
    let mut entries = Vec::new();
    if purpose_sign {
        entries.push(der::explicit(1, &der::set(&[der::int(2)])));
    }
    if all_applications {
        entries.push(der::explicit(600, &der::null()));
    }
    if origin_generated {
        entries.push(der::explicit(702, &der::int(0)));
    }
    der::seq(&entries)
}

/// Android key description extension with the given challenge and authorization lists.
pub(crate) fn android_key_extension(
    challenge: &[u8],
    software_enforced: Vec<u8>,
    tee_enforced: Vec<u8>,
) -> Vec<u8> {
    let description = der::seq(&[
        der::int(3),
        der::enumerated(1),
        der::int(4),
        der::enumerated(1),
        der::octet_string(challenge),
        der::octet_string(&[]),
        software_enforced,
        tee_enforced,
    ]);
    extension(OID_ANDROID_KEY_DESCRIPTION, false, &description)
}

/// Apple anonymous attestation nonce extension.
pub(crate) fn apple_nonce_extension(nonce: &[u8]) -> Vec<u8> {
    let value = der::seq(&[der::explicit(1, &der::octet_string(nonce))]);
    extension(OID_APPLE_NONCE, false, &value)
}

/// Parameters of a certificate to issue.
pub(crate) struct CertParams {
    pub(crate) serial: u64,
    pub(crate) subject: Vec<u8>,
    pub(crate) not_before: &'static str,
    pub(crate) not_after: &'static str,
    pub(crate) extensions: Vec<Vec<u8>>,
}

impl CertParams {
    pub(crate) fn new(subject: Vec<u8>) -> Self {
        Self {
            serial: 2,
            subject,
            not_before: "200101000000Z",
            not_after: "491231235959Z",
            extensions: vec![basic_constraints(false, None)],
        }
    }
}

fn sign_structure(tbs: Vec<u8>, signer: &TestKey) -> Vec<u8> {
    let sig = signer.sign(&tbs);
    der::seq(&[tbs, signer.signature_algorithm(), der::bit_string(&sig)])
}

fn build_certificate(
    params: &CertParams,
    issuer: &[u8],
    subject_key: &TestKey,
    signer: &TestKey,
) -> Vec<u8> {
    let mut tbs = vec![
        der::explicit(0, &der::int(2)),
        der::int(params.serial),
        signer.signature_algorithm(),
        issuer.to_vec(),
        der::seq(&[der::utc_time(params.not_before), der::utc_time(params.not_after)]),
        params.subject.clone(),
        subject_key.spki(),
    ];
    if !params.extensions.is_empty() {
        tbs.push(der::explicit(3, &der::seq(&params.extensions)));
    }
    sign_structure(der::seq(&tbs), signer)
}

/// A certificate authority for tests.
pub(crate) struct TestCa {
    pub(crate) cert: Vec<u8>,
    pub(crate) key: TestKey,
    pub(crate) name: Vec<u8>,
}

impl TestCa {
    pub(crate) fn root(common_name: &str) -> Self {
        let key = TestKey::generate_p256();
        let name = name(common_name);
        let params = CertParams {
            serial: 1,
            extensions: vec![basic_constraints(true, None)],
            ..CertParams::new(name.clone())
        };
        let cert = build_certificate(&params, &name, &key, &key);
        Self { cert, key, name }
    }

    pub(crate) fn intermediate(&self, common_name: &str) -> Self {
        let key = TestKey::generate_p256();
        let name = name(common_name);
        let params = CertParams {
            serial: 10,
            extensions: vec![basic_constraints(true, Some(0))],
            ..CertParams::new(name.clone())
        };
        let cert = build_certificate(&params, &self.name, &key, &self.key);
        Self { cert, key, name }
    }

    pub(crate) fn issue(&self, params: &CertParams, subject_key: &TestKey) -> Vec<u8> {
        build_certificate(params, &self.name, subject_key, &self.key)
    }

    /// A v2 CRL listing `revoked` serial numbers.
    pub(crate) fn crl(&self, revoked: &[u64], this_update: &str, next_update: &str) -> Vec<u8> {
        let mut tbs = vec![
            der::int(1),
            self.key.signature_algorithm(),
            self.name.clone(),
            der::utc_time(this_update),
            der::utc_time(next_update),
        ];
        if !revoked.is_empty() {
            let entries: Vec<Vec<u8>> = revoked
                .iter()
                .map(|serial| der::seq(&[der::int(*serial), der::utc_time(this_update)]))
                .collect();
            tbs.push(der::seq(&entries));
        }
        sign_structure(der::seq(&tbs), &self.key)
    }
}

/// Root, intermediate and leaf certificates with their keys.
pub(crate) struct TestChain {
    pub(crate) root: TestCa,
    pub(crate) intermediate: TestCa,
    pub(crate) leaf: Vec<u8>,
    pub(crate) leaf_key: TestKey,
    pub(crate) root_key: TestKey,
}

pub(crate) fn create_test_certificate_chain() -> TestChain {
    let root = TestCa::root("Test Root CA");
    let intermediate = root.intermediate("Test Intermediate CA");
    let leaf_key = TestKey::generate_p256();
    let leaf = intermediate.issue(&CertParams::new(name("Test Attestation")), &leaf_key);
    let root_key = TestKey::generate_p256();
    TestChain {
        root,
        intermediate,
        leaf,
        leaf_key,
        root_key,
    }
}

pub(crate) fn create_test_client_data_json(type_: &str) -> Vec<u8> {
    serde_json::json!({
        "type": type_,
        "challenge": "dGVzdC1jaGFsbGVuZ2U",
        "origin": TEST_ORIGIN,
    })
    .to_string()
    .into_bytes()
}

pub(crate) fn create_test_auth_data(
    aaguid: Aaguid,
    credential_key: CoseKey,
    sign_count: u32,
) -> AuthenticatorData {
    AuthenticatorData::new(
        sha256(TEST_RP_ID.as_bytes()),
        flags::UP | flags::UV,
        sign_count,
        Some(AttestedCredentialData::new(
            aaguid,
            vec![0x02; 16],
            credential_key,
        )),
        None,
    )
}

pub(crate) fn create_test_attestation_object(
    auth_data: AuthenticatorData,
    statement: AttestationStatement,
) -> Vec<u8> {
    AttestationObject::new(auth_data, statement)
        .unwrap()
        .encode()
        .unwrap()
}

pub(crate) fn cbor_text(s: &str) -> CborValue {
    CborValue::Text(s.to_string())
}

pub(crate) fn to_pem(label: &str, der: &[u8]) -> String {
    let body = base64_encode(der)
        .as_bytes()
        .chunks(64)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n");
    format!("-----BEGIN {label}-----\n{body}\n-----END {label}-----\n")
}
