use std::fmt;

use ciborium::value::Value as CborValue;

use super::{cbor_int, map_get_int, read_cbor_exact, read_cbor_prefix, write_cbor};
use crate::errors::DecodeError;

const COSE_KEY_KTY: i64 = 1;
const COSE_KEY_ALG: i64 = 3;
const COSE_KEY_CRV_OR_N: i64 = -1;
const COSE_KEY_X_OR_E: i64 = -2;
const COSE_KEY_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;

/// COSE algorithm identifiers accepted for credential keys and attestation signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseAlgorithm {
    Es256,
    Es384,
    Es512,
    EdDsa,
    Rs256,
    Rs384,
    Rs512,
    Ps256,
    Ps384,
    Ps512,
    /// RSASSA-PKCS1-v1_5 with SHA-1, still produced by some TPMs
    Rs1,
}

impl CoseAlgorithm {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -35 => Some(Self::Es384),
            -36 => Some(Self::Es512),
            -8 => Some(Self::EdDsa),
            -257 => Some(Self::Rs256),
            -258 => Some(Self::Rs384),
            -259 => Some(Self::Rs512),
            -37 => Some(Self::Ps256),
            -38 => Some(Self::Ps384),
            -39 => Some(Self::Ps512),
            -65535 => Some(Self::Rs1),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Es384 => -35,
            Self::Es512 => -36,
            Self::EdDsa => -8,
            Self::Rs256 => -257,
            Self::Rs384 => -258,
            Self::Rs512 => -259,
            Self::Ps256 => -37,
            Self::Ps384 => -38,
            Self::Ps512 => -39,
            Self::Rs1 => -65535,
        }
    }

    pub(crate) fn is_rsa(self) -> bool {
        matches!(
            self,
            Self::Rs256 | Self::Rs384 | Self::Rs512 | Self::Ps256 | Self::Ps384 | Self::Ps512 | Self::Rs1
        )
    }

    /// The curve an ECDSA algorithm is bound to.
    pub(crate) fn ecdsa_curve(self) -> Option<CoseCurve> {
        match self {
            Self::Es256 => Some(CoseCurve::P256),
            Self::Es384 => Some(CoseCurve::P384),
            Self::Es512 => Some(CoseCurve::P521),
            _ => None,
        }
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
            Self::EdDsa => "EdDSA",
            Self::Rs256 => "RS256",
            Self::Rs384 => "RS384",
            Self::Rs512 => "RS512",
            Self::Ps256 => "PS256",
            Self::Ps384 => "PS384",
            Self::Ps512 => "PS512",
            Self::Rs1 => "RS1",
        };
        write!(f, "{name}({})", self.id())
    }
}

/// COSE elliptic curve identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoseCurve {
    P256,
    P384,
    P521,
    Ed25519,
}

impl CoseCurve {
    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::P256),
            2 => Some(Self::P384),
            3 => Some(Self::P521),
            6 => Some(Self::Ed25519),
            _ => None,
        }
    }

    pub fn id(self) -> i64 {
        match self {
            Self::P256 => 1,
            Self::P384 => 2,
            Self::P521 => 3,
            Self::Ed25519 => 6,
        }
    }

    /// Length in bytes of one coordinate (or of the OKP public key).
    pub(crate) fn coordinate_len(self) -> usize {
        match self {
            Self::P256 | Self::Ed25519 => 32,
            Self::P384 => 48,
            Self::P521 => 66,
        }
    }
}

/// A decoded COSE public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoseKey {
    Ec2 {
        alg: CoseAlgorithm,
        curve: CoseCurve,
        x: Vec<u8>,
        y: Vec<u8>,
    },
    Rsa {
        alg: CoseAlgorithm,
        n: Vec<u8>,
        e: Vec<u8>,
    },
    Okp {
        alg: CoseAlgorithm,
        curve: CoseCurve,
        x: Vec<u8>,
    },
}

impl CoseKey {
    pub fn algorithm(&self) -> CoseAlgorithm {
        match self {
            CoseKey::Ec2 { alg, .. } | CoseKey::Rsa { alg, .. } | CoseKey::Okp { alg, .. } => *alg,
        }
    }

    /// Decodes a COSE key that occupies all of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value = read_cbor_exact(bytes, "credentialPublicKey")?;
        Self::from_cbor(&value)
    }

    /// Decodes a COSE key from the front of `bytes`, returning the key and its encoded length.
    pub(crate) fn decode_prefix(bytes: &[u8]) -> Result<(Self, usize), DecodeError> {
        let (value, used) = read_cbor_prefix(bytes, "credentialPublicKey")?;
        Ok((Self::from_cbor(&value)?, used))
    }

    /// # Errors
    /// * `DecodeError` - the key cannot be serialized
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        write_cbor(&self.to_cbor(), "credentialPublicKey")
    }

    /// Decodes the key from a CBOR map and checks that the algorithm fits the key type.
    pub fn from_cbor(value: &CborValue) -> Result<Self, DecodeError> {
        let map = match value {
            CborValue::Map(map) => map,
            _ => {
                return Err(DecodeError::new(
                    "credentialPublicKey",
                    "COSE key is not a CBOR map",
                ));
            }
        };

        let kty = map_get_int(map, COSE_KEY_KTY)
            .and_then(cbor_int)
            .ok_or_else(|| DecodeError::new("credentialPublicKey.kty", "missing or not an integer"))?;

        let alg_id = map_get_int(map, COSE_KEY_ALG)
            .and_then(cbor_int)
            .ok_or_else(|| DecodeError::new("credentialPublicKey.alg", "missing or not an integer"))?;
        let alg = CoseAlgorithm::from_id(alg_id).ok_or_else(|| {
            DecodeError::new(
                "credentialPublicKey.alg",
                format!("unknown COSE algorithm {alg_id}"),
            )
        })?;

        match kty {
            KTY_EC2 => {
                let curve = read_curve(map)?;
                let expected = alg.ecdsa_curve().ok_or_else(|| {
                    DecodeError::new(
                        "credentialPublicKey.alg",
                        format!("{alg} is not an ECDSA algorithm but key type is EC2"),
                    )
                })?;
                if curve != expected {
                    return Err(DecodeError::new(
                        "credentialPublicKey.crv",
                        format!("curve {curve:?} does not match algorithm {alg}"),
                    ));
                }
                let x = read_bytes(map, COSE_KEY_X_OR_E, "credentialPublicKey.x")?;
                let y = read_bytes(map, COSE_KEY_Y, "credentialPublicKey.y")?;
                if x.len() != curve.coordinate_len() || y.len() != curve.coordinate_len() {
                    return Err(DecodeError::new(
                        "credentialPublicKey.x",
                        format!(
                            "coordinates must be {} bytes for {curve:?}",
                            curve.coordinate_len()
                        ),
                    ));
                }
                Ok(CoseKey::Ec2 { alg, curve, x, y })
            }
            KTY_RSA => {
                if !alg.is_rsa() {
                    return Err(DecodeError::new(
                        "credentialPublicKey.alg",
                        format!("{alg} is not an RSA algorithm but key type is RSA"),
                    ));
                }
                let n = read_bytes(map, COSE_KEY_CRV_OR_N, "credentialPublicKey.n")?;
                let e = read_bytes(map, COSE_KEY_X_OR_E, "credentialPublicKey.e")?;
                if n.is_empty() || e.is_empty() {
                    return Err(DecodeError::new(
                        "credentialPublicKey.n",
                        "RSA modulus and exponent must not be empty",
                    ));
                }
                Ok(CoseKey::Rsa { alg, n, e })
            }
            KTY_OKP => {
                if alg != CoseAlgorithm::EdDsa {
                    return Err(DecodeError::new(
                        "credentialPublicKey.alg",
                        format!("{alg} is not valid for an OKP key"),
                    ));
                }
                let curve = read_curve(map)?;
                if curve != CoseCurve::Ed25519 {
                    return Err(DecodeError::new(
                        "credentialPublicKey.crv",
                        format!("unsupported OKP curve {curve:?}"),
                    ));
                }
                let x = read_bytes(map, COSE_KEY_X_OR_E, "credentialPublicKey.x")?;
                if x.len() != curve.coordinate_len() {
                    return Err(DecodeError::new(
                        "credentialPublicKey.x",
                        "Ed25519 public key must be 32 bytes",
                    ));
                }
                Ok(CoseKey::Okp { alg, curve, x })
            }
            other => Err(DecodeError::new(
                "credentialPublicKey.kty",
                format!("unsupported key type {other}"),
            )),
        }
    }

    pub fn to_cbor(&self) -> CborValue {
        let int = |v: i64| CborValue::Integer(v.into());
        let entries = match self {
            CoseKey::Ec2 { alg, curve, x, y } => vec![
                (int(COSE_KEY_KTY), int(KTY_EC2)),
                (int(COSE_KEY_ALG), int(alg.id())),
                (int(COSE_KEY_CRV_OR_N), int(curve.id())),
                (int(COSE_KEY_X_OR_E), CborValue::Bytes(x.clone())),
                (int(COSE_KEY_Y), CborValue::Bytes(y.clone())),
            ],
            CoseKey::Rsa { alg, n, e } => vec![
                (int(COSE_KEY_KTY), int(KTY_RSA)),
                (int(COSE_KEY_ALG), int(alg.id())),
                (int(COSE_KEY_CRV_OR_N), CborValue::Bytes(n.clone())),
                (int(COSE_KEY_X_OR_E), CborValue::Bytes(e.clone())),
            ],
            CoseKey::Okp { alg, curve, x } => vec![
                (int(COSE_KEY_KTY), int(KTY_OKP)),
                (int(COSE_KEY_ALG), int(alg.id())),
                (int(COSE_KEY_CRV_OR_N), int(curve.id())),
                (int(COSE_KEY_X_OR_E), CborValue::Bytes(x.clone())),
            ],
        };
        CborValue::Map(entries)
    }

    /// Uncompressed SEC1 point `0x04 || x || y` for EC2 keys.
    pub(crate) fn ec_point(&self) -> Option<Vec<u8>> {
        match self {
            CoseKey::Ec2 { x, y, .. } => {
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Some(point)
            }
            _ => None,
        }
    }
}

fn read_curve(map: &[(CborValue, CborValue)]) -> Result<CoseCurve, DecodeError> {
    let id = map_get_int(map, COSE_KEY_CRV_OR_N)
        .and_then(cbor_int)
        .ok_or_else(|| DecodeError::new("credentialPublicKey.crv", "missing or not an integer"))?;
    CoseCurve::from_id(id).ok_or_else(|| {
        DecodeError::new("credentialPublicKey.crv", format!("unknown curve {id}"))
    })
}

fn read_bytes(
    map: &[(CborValue, CborValue)],
    key: i64,
    field: &'static str,
) -> Result<Vec<u8>, DecodeError> {
    match map_get_int(map, key) {
        Some(CborValue::Bytes(b)) => Ok(b.clone()),
        Some(_) => Err(DecodeError::new(field, "not a byte string")),
        None => Err(DecodeError::new(field, "missing")),
    }
}
