use std::fmt;

use ciborium::value::Value as CborValue;

use super::authenticator_data::AuthenticatorData;
use super::{cbor_int, map_get_text, read_cbor_exact, write_cbor};
use crate::errors::DecodeError;

/// Attestation statement formats with a registered validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttestationFormat {
    None,
    FidoU2f,
    Packed,
    Tpm,
    AndroidKey,
    AndroidSafetyNet,
    AppleAnonymous,
}

impl AttestationFormat {
    pub fn from_identifier(fmt: &str) -> Option<Self> {
        match fmt {
            "none" => Some(Self::None),
            "fido-u2f" => Some(Self::FidoU2f),
            "packed" => Some(Self::Packed),
            "tpm" => Some(Self::Tpm),
            "android-key" => Some(Self::AndroidKey),
            "android-safetynet" => Some(Self::AndroidSafetyNet),
            "apple" => Some(Self::AppleAnonymous),
            _ => None,
        }
    }

    pub fn identifier(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FidoU2f => "fido-u2f",
            Self::Packed => "packed",
            Self::Tpm => "tpm",
            Self::AndroidKey => "android-key",
            Self::AndroidSafetyNet => "android-safetynet",
            Self::AppleAnonymous => "apple",
        }
    }
}

impl fmt::Display for AttestationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FidoU2fStatement {
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedStatement {
    pub alg: i64,
    pub sig: Vec<u8>,
    pub x5c: Option<Vec<Vec<u8>>>,
    pub ecdaa_key_id: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmStatement {
    pub ver: String,
    pub alg: i64,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
    pub pub_area: Vec<u8>,
    pub cert_info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidKeyStatement {
    pub alg: i64,
    pub sig: Vec<u8>,
    pub x5c: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidSafetyNetStatement {
    pub ver: String,
    /// The compact JWS returned by the SafetyNet API, as UTF-8 bytes
    pub response: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppleAnonymousStatement {
    pub x5c: Vec<Vec<u8>>,
}

/// Format-tagged attestation statement holding exactly the fields of its format.
#[derive(Debug, Clone, PartialEq)]
pub enum AttestationStatement {
    None,
    FidoU2f(FidoU2fStatement),
    Packed(PackedStatement),
    Tpm(TpmStatement),
    AndroidKey(AndroidKeyStatement),
    AndroidSafetyNet(AndroidSafetyNetStatement),
    AppleAnonymous(AppleAnonymousStatement),
    /// A format without a validator. Rejected at dispatch time.
    Unsupported {
        format: String,
        raw: Vec<(CborValue, CborValue)>,
    },
}

impl AttestationStatement {
    pub fn format(&self) -> Option<AttestationFormat> {
        match self {
            Self::None => Some(AttestationFormat::None),
            Self::FidoU2f(_) => Some(AttestationFormat::FidoU2f),
            Self::Packed(_) => Some(AttestationFormat::Packed),
            Self::Tpm(_) => Some(AttestationFormat::Tpm),
            Self::AndroidKey(_) => Some(AttestationFormat::AndroidKey),
            Self::AndroidSafetyNet(_) => Some(AttestationFormat::AndroidSafetyNet),
            Self::AppleAnonymous(_) => Some(AttestationFormat::AppleAnonymous),
            Self::Unsupported { .. } => None,
        }
    }

    fn decode(fmt: &str, map: &[(CborValue, CborValue)]) -> Result<Self, DecodeError> {
        let Some(format) = AttestationFormat::from_identifier(fmt) else {
            tracing::debug!("No validator for attestation format '{}'", fmt);
            return Ok(Self::Unsupported {
                format: fmt.to_string(),
                raw: map.to_vec(),
            });
        };

        warn_unexpected_keys(format, map);

        let statement = match format {
            AttestationFormat::None => {
                if !map.is_empty() {
                    return Err(DecodeError::new(
                        "attStmt",
                        "'none' attestation requires an empty statement",
                    ));
                }
                Self::None
            }
            AttestationFormat::FidoU2f => Self::FidoU2f(FidoU2fStatement {
                sig: required_bytes(map, "sig", "attStmt.sig")?,
                x5c: required_x5c(map)?,
            }),
            AttestationFormat::Packed => Self::Packed(PackedStatement {
                alg: required_int(map, "alg", "attStmt.alg")?,
                sig: required_bytes(map, "sig", "attStmt.sig")?,
                x5c: optional_x5c(map)?,
                ecdaa_key_id: optional_bytes(map, "ecdaaKeyId", "attStmt.ecdaaKeyId")?,
            }),
            AttestationFormat::Tpm => Self::Tpm(TpmStatement {
                ver: required_text(map, "ver", "attStmt.ver")?,
                alg: required_int(map, "alg", "attStmt.alg")?,
                sig: required_bytes(map, "sig", "attStmt.sig")?,
                x5c: required_x5c(map)?,
                pub_area: required_bytes(map, "pubArea", "attStmt.pubArea")?,
                cert_info: required_bytes(map, "certInfo", "attStmt.certInfo")?,
            }),
            AttestationFormat::AndroidKey => Self::AndroidKey(AndroidKeyStatement {
                alg: required_int(map, "alg", "attStmt.alg")?,
                sig: required_bytes(map, "sig", "attStmt.sig")?,
                x5c: required_x5c(map)?,
            }),
            AttestationFormat::AndroidSafetyNet => {
                Self::AndroidSafetyNet(AndroidSafetyNetStatement {
                    ver: required_text(map, "ver", "attStmt.ver")?,
                    response: required_bytes(map, "response", "attStmt.response")?,
                })
            }
            AttestationFormat::AppleAnonymous => Self::AppleAnonymous(AppleAnonymousStatement {
                x5c: required_x5c(map)?,
            }),
        };
        Ok(statement)
    }

    fn to_cbor(&self) -> CborValue {
        let text = |s: &str| CborValue::Text(s.to_string());
        let x5c = |chain: &[Vec<u8>]| {
            CborValue::Array(chain.iter().map(|c| CborValue::Bytes(c.clone())).collect())
        };
        let entries = match self {
            Self::None => vec![],
            Self::FidoU2f(s) => vec![
                (text("sig"), CborValue::Bytes(s.sig.clone())),
                (text("x5c"), x5c(&s.x5c)),
            ],
            Self::Packed(s) => {
                let mut entries = vec![
                    (text("alg"), CborValue::Integer(s.alg.into())),
                    (text("sig"), CborValue::Bytes(s.sig.clone())),
                ];
                if let Some(chain) = &s.x5c {
                    entries.push((text("x5c"), x5c(chain)));
                }
                if let Some(id) = &s.ecdaa_key_id {
                    entries.push((text("ecdaaKeyId"), CborValue::Bytes(id.clone())));
                }
                entries
            }
            Self::Tpm(s) => vec![
                (text("ver"), text(&s.ver)),
                (text("alg"), CborValue::Integer(s.alg.into())),
                (text("x5c"), x5c(&s.x5c)),
                (text("sig"), CborValue::Bytes(s.sig.clone())),
                (text("certInfo"), CborValue::Bytes(s.cert_info.clone())),
                (text("pubArea"), CborValue::Bytes(s.pub_area.clone())),
            ],
            Self::AndroidKey(s) => vec![
                (text("alg"), CborValue::Integer(s.alg.into())),
                (text("sig"), CborValue::Bytes(s.sig.clone())),
                (text("x5c"), x5c(&s.x5c)),
            ],
            Self::AndroidSafetyNet(s) => vec![
                (text("ver"), text(&s.ver)),
                (text("response"), CborValue::Bytes(s.response.clone())),
            ],
            Self::AppleAnonymous(s) => vec![(text("x5c"), x5c(&s.x5c))],
            Self::Unsupported { raw, .. } => raw.clone(),
        };
        CborValue::Map(entries)
    }
}

/// A decoded attestation object: `{fmt, attStmt, authData}`.
///
/// The raw authenticator data bytes are kept alongside the decoded structure because
/// statement signatures cover the exact bytes the authenticator produced.
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationObject {
    pub(crate) format: String,
    pub(crate) authenticator_data: AuthenticatorData,
    pub(crate) authenticator_data_bytes: Vec<u8>,
    pub(crate) statement: AttestationStatement,
}

impl AttestationObject {
    /// Builds an attestation object around `authenticator_data`, keeping its encoded bytes.
    ///
    /// # Errors
    /// * `DecodeError` - the authenticator data cannot be encoded
    pub fn new(
        authenticator_data: AuthenticatorData,
        statement: AttestationStatement,
    ) -> Result<Self, DecodeError> {
        let format = match &statement {
            AttestationStatement::Unsupported { format, .. } => format.clone(),
            other => other
                .format()
                .map(|f| f.identifier().to_string())
                .unwrap_or_default(),
        };
        let authenticator_data_bytes = authenticator_data.encode()?;
        Ok(Self {
            format,
            authenticator_data,
            authenticator_data_bytes,
            statement,
        })
    }

    /// Decodes a CBOR attestation object.
    ///
    /// # Errors
    /// * `DecodeError` when the CBOR is malformed, a required key is missing, the
    ///   authenticator data is invalid or a statement field has the wrong type
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let value = read_cbor_exact(bytes, "attestationObject")?;
        let map = match value {
            CborValue::Map(map) => map,
            _ => {
                return Err(DecodeError::new(
                    "attestationObject",
                    "not a CBOR map",
                ));
            }
        };

        let format = match map_get_text(&map, "fmt") {
            Some(CborValue::Text(fmt)) => fmt.clone(),
            Some(_) => return Err(DecodeError::new("fmt", "not a text string")),
            None => return Err(DecodeError::new("fmt", "missing")),
        };

        let authenticator_data_bytes = match map_get_text(&map, "authData") {
            Some(CborValue::Bytes(b)) => b.clone(),
            Some(_) => return Err(DecodeError::new("authData", "not a byte string")),
            None => return Err(DecodeError::new("authData", "missing")),
        };
        let authenticator_data = AuthenticatorData::decode(&authenticator_data_bytes)?;

        let statement = match map_get_text(&map, "attStmt") {
            Some(CborValue::Map(stmt)) => AttestationStatement::decode(&format, stmt)?,
            Some(_) => return Err(DecodeError::new("attStmt", "not a CBOR map")),
            None => return Err(DecodeError::new("attStmt", "missing")),
        };

        tracing::debug!(
            "Decoded attestation object: fmt={}, authData={} bytes",
            format,
            authenticator_data_bytes.len()
        );

        Ok(Self {
            format,
            authenticator_data,
            authenticator_data_bytes,
            statement,
        })
    }

    /// # Errors
    /// * `DecodeError` - the object cannot be serialized
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let map = CborValue::Map(vec![
            (
                CborValue::Text("fmt".to_string()),
                CborValue::Text(self.format.clone()),
            ),
            (
                CborValue::Text("attStmt".to_string()),
                self.statement.to_cbor(),
            ),
            (
                CborValue::Text("authData".to_string()),
                CborValue::Bytes(self.authenticator_data_bytes.clone()),
            ),
        ]);
        write_cbor(&map, "attestationObject")
    }

    /// The format identifier exactly as carried in `fmt`.
    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn authenticator_data(&self) -> &AuthenticatorData {
        &self.authenticator_data
    }

    pub fn authenticator_data_bytes(&self) -> &[u8] {
        &self.authenticator_data_bytes
    }

    pub fn statement(&self) -> &AttestationStatement {
        &self.statement
    }
}

fn warn_unexpected_keys(format: AttestationFormat, map: &[(CborValue, CborValue)]) {
    let known: &[&str] = match format {
        AttestationFormat::None => &[],
        AttestationFormat::FidoU2f => &["sig", "x5c"],
        AttestationFormat::Packed => &["alg", "sig", "x5c", "ecdaaKeyId"],
        AttestationFormat::Tpm => &["ver", "alg", "sig", "x5c", "pubArea", "certInfo"],
        AttestationFormat::AndroidKey => &["alg", "sig", "x5c"],
        AttestationFormat::AndroidSafetyNet => &["ver", "response"],
        AttestationFormat::AppleAnonymous => &["x5c"],
    };
    for (k, _) in map {
        match k {
            CborValue::Text(key) if known.contains(&key.as_str()) => {}
            other => tracing::warn!("Unexpected key in {} attestation: {:?}", format, other),
        }
    }
}

fn required_bytes(
    map: &[(CborValue, CborValue)],
    key: &str,
    field: &'static str,
) -> Result<Vec<u8>, DecodeError> {
    optional_bytes(map, key, field)?.ok_or_else(|| DecodeError::new(field, "missing"))
}

fn optional_bytes(
    map: &[(CborValue, CborValue)],
    key: &str,
    field: &'static str,
) -> Result<Option<Vec<u8>>, DecodeError> {
    match map_get_text(map, key) {
        Some(CborValue::Bytes(b)) => Ok(Some(b.clone())),
        Some(_) => Err(DecodeError::new(field, "not a byte string")),
        None => Ok(None),
    }
}

fn required_int(
    map: &[(CborValue, CborValue)],
    key: &str,
    field: &'static str,
) -> Result<i64, DecodeError> {
    match map_get_text(map, key) {
        Some(v) => cbor_int(v).ok_or_else(|| DecodeError::new(field, "not an integer")),
        None => Err(DecodeError::new(field, "missing")),
    }
}

fn required_text(
    map: &[(CborValue, CborValue)],
    key: &str,
    field: &'static str,
) -> Result<String, DecodeError> {
    match map_get_text(map, key) {
        Some(CborValue::Text(t)) => Ok(t.clone()),
        Some(_) => Err(DecodeError::new(field, "not a text string")),
        None => Err(DecodeError::new(field, "missing")),
    }
}

fn required_x5c(map: &[(CborValue, CborValue)]) -> Result<Vec<Vec<u8>>, DecodeError> {
    optional_x5c(map)?.ok_or_else(|| DecodeError::new("attStmt.x5c", "missing"))
}

fn optional_x5c(map: &[(CborValue, CborValue)]) -> Result<Option<Vec<Vec<u8>>>, DecodeError> {
    match map_get_text(map, "x5c") {
        Some(CborValue::Array(certs)) => {
            if certs.is_empty() {
                return Err(DecodeError::new("attStmt.x5c", "empty certificate array"));
            }
            certs
                .iter()
                .map(|c| match c {
                    CborValue::Bytes(der) => Ok(der.clone()),
                    _ => Err(DecodeError::new(
                        "attStmt.x5c",
                        "certificate is not a byte string",
                    )),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some)
        }
        Some(_) => Err(DecodeError::new("attStmt.x5c", "not an array")),
        None => Ok(None),
    }
}
