use ciborium::value::Value as CborValue;

use super::cbor_int;
use crate::errors::DecodeError;

const EXT_CRED_PROTECT: &str = "credProtect";
const EXT_HMAC_SECRET: &str = "hmac-secret";
const EXT_UVM: &str = "uvm";

/// Maximum number of entries an authenticator may report in the `uvm` extension.
const UVM_MAX_ENTRIES: usize = 3;

/// Authenticator extension outputs carried in authenticator data.
///
/// Known extensions are validated on decode. Unknown extensions are kept as raw CBOR so
/// the relying party can still inspect them.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorExtensions {
    entries: Vec<(String, CborValue)>,
}

impl AuthenticatorExtensions {
    pub fn new(entries: Vec<(String, CborValue)>) -> Self {
        Self { entries }
    }

    pub fn from_cbor(value: &CborValue) -> Result<Self, DecodeError> {
        let map = match value {
            CborValue::Map(map) => map,
            _ => return Err(DecodeError::new("extensions", "not a CBOR map")),
        };

        let mut entries = Vec::with_capacity(map.len());
        for (key, value) in map {
            let id = match key {
                CborValue::Text(id) => id.clone(),
                other => {
                    return Err(DecodeError::new(
                        "extensions",
                        format!("extension identifier is not a text string: {other:?}"),
                    ));
                }
            };
            if entries.iter().any(|(existing, _)| *existing == id) {
                return Err(DecodeError::new(
                    "extensions",
                    format!("duplicate extension {id}"),
                ));
            }
            match id.as_str() {
                EXT_CRED_PROTECT => {
                    parse_cred_protect(value)?;
                }
                EXT_HMAC_SECRET => {
                    if !matches!(value, CborValue::Bool(_)) {
                        return Err(DecodeError::new(
                            "extensions.hmac-secret",
                            "expected a boolean",
                        ));
                    }
                }
                EXT_UVM => {
                    parse_uvm(value)?;
                }
                other => tracing::debug!("Keeping unrecognized extension: {}", other),
            }
            entries.push((id, value.clone()));
        }

        Ok(Self { entries })
    }

    pub fn to_cbor(&self) -> CborValue {
        CborValue::Map(
            self.entries
                .iter()
                .map(|(k, v)| (CborValue::Text(k.clone()), v.clone()))
                .collect(),
        )
    }

    /// Identifiers of every extension present, in encoded order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&CborValue> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cred_protect(&self) -> Option<CredentialProtectionPolicy> {
        self.get(EXT_CRED_PROTECT)
            .and_then(|v| parse_cred_protect(v).ok())
    }

    pub fn hmac_secret(&self) -> Option<bool> {
        match self.get(EXT_HMAC_SECRET) {
            Some(CborValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn uvm(&self) -> Option<Vec<UvmEntry>> {
        self.get(EXT_UVM).and_then(|v| parse_uvm(v).ok())
    }
}

/// `credProtect` levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialProtectionPolicy {
    UserVerificationOptional,
    UserVerificationOptionalWithCredentialIdList,
    UserVerificationRequired,
}

fn parse_cred_protect(value: &CborValue) -> Result<CredentialProtectionPolicy, DecodeError> {
    match cbor_int(value) {
        Some(1) => Ok(CredentialProtectionPolicy::UserVerificationOptional),
        Some(2) => Ok(CredentialProtectionPolicy::UserVerificationOptionalWithCredentialIdList),
        Some(3) => Ok(CredentialProtectionPolicy::UserVerificationRequired),
        _ => Err(DecodeError::new(
            "extensions.credProtect",
            format!("invalid credProtect value {value:?}"),
        )),
    }
}

/// User verification methods reported through the `uvm` extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserVerificationMethod {
    PresenceInternal,
    FingerprintInternal,
    PasscodeInternal,
    VoiceprintInternal,
    FaceprintInternal,
    LocationInternal,
    EyeprintInternal,
    PatternInternal,
    HandprintInternal,
    None,
    All,
    PasscodeExternal,
    PatternExternal,
}

impl UserVerificationMethod {
    pub fn from_value(value: u32) -> Option<Self> {
        match value {
            0x0001 => Some(Self::PresenceInternal),
            0x0002 => Some(Self::FingerprintInternal),
            0x0004 => Some(Self::PasscodeInternal),
            0x0008 => Some(Self::VoiceprintInternal),
            0x0010 => Some(Self::FaceprintInternal),
            0x0020 => Some(Self::LocationInternal),
            0x0040 => Some(Self::EyeprintInternal),
            0x0080 => Some(Self::PatternInternal),
            0x0100 => Some(Self::HandprintInternal),
            0x0200 => Some(Self::None),
            0x0400 => Some(Self::All),
            0x0800 => Some(Self::PasscodeExternal),
            0x1000 => Some(Self::PatternExternal),
            _ => None,
        }
    }

    pub fn value(self) -> u32 {
        match self {
            Self::PresenceInternal => 0x0001,
            Self::FingerprintInternal => 0x0002,
            Self::PasscodeInternal => 0x0004,
            Self::VoiceprintInternal => 0x0008,
            Self::FaceprintInternal => 0x0010,
            Self::LocationInternal => 0x0020,
            Self::EyeprintInternal => 0x0040,
            Self::PatternInternal => 0x0080,
            Self::HandprintInternal => 0x0100,
            Self::None => 0x0200,
            Self::All => 0x0400,
            Self::PasscodeExternal => 0x0800,
            Self::PatternExternal => 0x1000,
        }
    }
}

/// One `[userVerificationMethod, keyProtectionType, matcherProtectionType]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UvmEntry {
    pub user_verification_method: UserVerificationMethod,
    pub key_protection_type: u16,
    pub matcher_protection_type: u16,
}

fn parse_uvm(value: &CborValue) -> Result<Vec<UvmEntry>, DecodeError> {
    let entries = match value {
        CborValue::Array(entries) => entries,
        _ => return Err(DecodeError::new("extensions.uvm", "expected an array")),
    };
    if entries.is_empty() || entries.len() > UVM_MAX_ENTRIES {
        return Err(DecodeError::new(
            "extensions.uvm",
            format!("expected 1 to {UVM_MAX_ENTRIES} entries, got {}", entries.len()),
        ));
    }

    entries
        .iter()
        .map(|entry| {
            let fields = match entry {
                CborValue::Array(fields) if fields.len() == 3 => fields,
                _ => {
                    return Err(DecodeError::new(
                        "extensions.uvm",
                        "each entry must be an array of three integers",
                    ));
                }
            };
            let ints: Vec<i64> = fields.iter().filter_map(cbor_int).collect();
            if ints.len() != 3 {
                return Err(DecodeError::new(
                    "extensions.uvm",
                    "each entry must be an array of three integers",
                ));
            }
            let method = u32::try_from(ints[0])
                .ok()
                .and_then(UserVerificationMethod::from_value)
                .ok_or_else(|| {
                    DecodeError::new(
                        "extensions.uvm",
                        format!("unknown user verification method {}", ints[0]),
                    )
                })?;
            let key_protection_type = u16::try_from(ints[1]).map_err(|_| {
                DecodeError::new("extensions.uvm", "keyProtectionType out of range")
            })?;
            let matcher_protection_type = u16::try_from(ints[2]).map_err(|_| {
                DecodeError::new("extensions.uvm", "matcherProtectionType out of range")
            })?;
            Ok(UvmEntry {
                user_verification_method: method,
                key_protection_type,
                matcher_protection_type,
            })
        })
        .collect()
}
