use std::fmt;

use uuid::Uuid;

use super::cose::CoseKey;
use super::extensions::AuthenticatorExtensions;
use super::{read_cbor_prefix, write_cbor};
use crate::errors::DecodeError;

const RP_ID_HASH_LEN: usize = 32;
const FIXED_HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;
const MAX_CREDENTIAL_ID_LEN: usize = 1023;

/// Flags for AuthenticatorData as defined in WebAuthn Level 3
pub mod flags {
    /// User Present (UP) - Bit 0
    pub const UP: u8 = 1 << 0;
    /// User Verified (UV) - Bit 2
    pub const UV: u8 = 1 << 2;
    /// Backup Eligibility (BE) - Bit 3
    pub const BE: u8 = 1 << 3;
    /// Backup State (BS) - Bit 4
    pub const BS: u8 = 1 << 4;
    /// Attested Credential Data Present - Bit 6
    pub const AT: u8 = 1 << 6;
    /// Extension Data Present - Bit 7
    pub const ED: u8 = 1 << 7;
}

/// 128-bit authenticator model identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Aaguid(pub [u8; 16]);

impl Aaguid {
    /// The all-zero AAGUID reported by FIDO U2F authenticators and anonymised platforms.
    pub const ZERO: Aaguid = Aaguid([0u8; 16]);

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl fmt::Display for Aaguid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl std::str::FromStr for Aaguid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Aaguid(*Uuid::parse_str(s)?.as_bytes()))
    }
}

/// Attested credential data embedded in authenticator data during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredentialData {
    pub(crate) aaguid: Aaguid,
    pub(crate) credential_id: Vec<u8>,
    pub(crate) credential_public_key: CoseKey,
}

impl AttestedCredentialData {
    pub fn new(aaguid: Aaguid, credential_id: Vec<u8>, credential_public_key: CoseKey) -> Self {
        Self {
            aaguid,
            credential_id,
            credential_public_key,
        }
    }

    pub fn aaguid(&self) -> Aaguid {
        self.aaguid
    }

    pub fn credential_id(&self) -> &[u8] {
        &self.credential_id
    }

    pub fn credential_public_key(&self) -> &CoseKey {
        &self.credential_public_key
    }
}

/// AuthenticatorData structure as defined in WebAuthn Level 3
/// https://www.w3.org/TR/webauthn-3/#sctn-authenticator-data
///
/// Layout:
/// - RP ID Hash (32 bytes)
/// - Flags (1 byte)
/// - Counter (4 bytes, big-endian)
/// - Optional: Attested Credential Data (AAGUID, credential ID length and ID, COSE key)
/// - Optional: Extensions (CBOR map)
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorData {
    pub(crate) rp_id_hash: [u8; 32],
    pub(crate) flags: u8,
    pub(crate) sign_count: u32,
    pub(crate) attested_credential_data: Option<AttestedCredentialData>,
    pub(crate) extensions: Option<AuthenticatorExtensions>,
}

impl AuthenticatorData {
    /// Builds authenticator data, deriving the AT and ED flags from the optional parts.
    pub fn new(
        rp_id_hash: [u8; 32],
        flags: u8,
        sign_count: u32,
        attested_credential_data: Option<AttestedCredentialData>,
        extensions: Option<AuthenticatorExtensions>,
    ) -> Self {
        let mut flags = flags & !(flags::AT | flags::ED);
        if attested_credential_data.is_some() {
            flags |= flags::AT;
        }
        if extensions.is_some() {
            flags |= flags::ED;
        }
        Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        }
    }

    /// Decodes raw authenticator data.
    ///
    /// # Errors
    /// * `DecodeError` naming the offending field when the input is truncated, carries
    ///   trailing bytes, or its flags disagree with its content
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(DecodeError::new(
                "authData",
                format!(
                    "expected at least {FIXED_HEADER_LEN} bytes, got {}",
                    data.len()
                ),
            ));
        }

        let mut rp_id_hash = [0u8; RP_ID_HASH_LEN];
        rp_id_hash.copy_from_slice(&data[..RP_ID_HASH_LEN]);
        let flags = data[32];
        let sign_count = u32::from_be_bytes([data[33], data[34], data[35], data[36]]);
        let mut offset = FIXED_HEADER_LEN;

        let attested_credential_data = if flags & flags::AT != 0 {
            let (acd, used) = decode_attested_credential_data(&data[offset..])?;
            offset += used;
            Some(acd)
        } else {
            None
        };

        let extensions = if flags & flags::ED != 0 {
            if offset >= data.len() {
                return Err(DecodeError::new(
                    "extensions",
                    "extension data flag set but no extension bytes present",
                ));
            }
            let (value, used) = read_cbor_prefix(&data[offset..], "extensions")?;
            offset += used;
            Some(AuthenticatorExtensions::from_cbor(&value)?)
        } else {
            None
        };

        if offset != data.len() {
            return Err(DecodeError::new(
                "authData",
                format!("{} unexpected trailing bytes", data.len() - offset),
            ));
        }

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested_credential_data,
            extensions,
        })
    }

    /// Serializes the structure in its wire layout.
    ///
    /// # Errors
    /// * `DecodeError` - the credential id exceeds 1023 bytes, or a CBOR part cannot be written
    pub fn encode(&self) -> Result<Vec<u8>, DecodeError> {
        let mut out = Vec::with_capacity(FIXED_HEADER_LEN);
        out.extend_from_slice(&self.rp_id_hash);
        out.push(self.flags);
        out.extend_from_slice(&self.sign_count.to_be_bytes());
        if let Some(acd) = &self.attested_credential_data {
            let credential_id_len = acd.credential_id.len();
            let encoded_len = u16::try_from(credential_id_len)
                .ok()
                .filter(|_| credential_id_len <= MAX_CREDENTIAL_ID_LEN)
                .ok_or_else(|| {
                    DecodeError::new(
                        "credentialId",
                        format!("length {credential_id_len} exceeds {MAX_CREDENTIAL_ID_LEN}"),
                    )
                })?;
            out.extend_from_slice(acd.aaguid.as_bytes());
            out.extend_from_slice(&encoded_len.to_be_bytes());
            out.extend_from_slice(&acd.credential_id);
            out.extend_from_slice(&acd.credential_public_key.encode()?);
        }
        if let Some(ext) = &self.extensions {
            out.extend_from_slice(&write_cbor(&ext.to_cbor(), "extensions")?);
        }
        Ok(out)
    }

    pub fn rp_id_hash(&self) -> &[u8; 32] {
        &self.rp_id_hash
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn sign_count(&self) -> u32 {
        self.sign_count
    }

    pub fn attested_credential_data(&self) -> Option<&AttestedCredentialData> {
        self.attested_credential_data.as_ref()
    }

    pub fn extensions(&self) -> Option<&AuthenticatorExtensions> {
        self.extensions.as_ref()
    }

    /// Check if user was present during the ceremony
    pub fn is_user_present(&self) -> bool {
        (self.flags & flags::UP) != 0
    }

    /// Check if user was verified by the authenticator
    pub fn is_user_verified(&self) -> bool {
        (self.flags & flags::UV) != 0
    }

    /// Check if the credential may be backed up
    pub fn is_backup_eligible(&self) -> bool {
        (self.flags & flags::BE) != 0
    }

    /// Check if this credential is backed up
    pub fn is_backed_up(&self) -> bool {
        (self.flags & flags::BS) != 0
    }

    pub fn has_attested_credential_data(&self) -> bool {
        (self.flags & flags::AT) != 0
    }

    pub fn has_extension_data(&self) -> bool {
        (self.flags & flags::ED) != 0
    }
}

fn decode_attested_credential_data(
    data: &[u8],
) -> Result<(AttestedCredentialData, usize), DecodeError> {
    if data.len() < AAGUID_LEN + 2 {
        return Err(DecodeError::new(
            "attestedCredentialData",
            "attested credential data flag set but data is truncated",
        ));
    }

    let mut aaguid = [0u8; AAGUID_LEN];
    aaguid.copy_from_slice(&data[..AAGUID_LEN]);

    let credential_id_len = u16::from_be_bytes([data[16], data[17]]) as usize;
    if credential_id_len > MAX_CREDENTIAL_ID_LEN {
        return Err(DecodeError::new(
            "credentialId",
            format!("length {credential_id_len} exceeds {MAX_CREDENTIAL_ID_LEN}"),
        ));
    }
    let id_start = AAGUID_LEN + 2;
    let id_end = id_start + credential_id_len;
    if data.len() < id_end {
        return Err(DecodeError::new(
            "credentialId",
            format!(
                "declared length {credential_id_len} but only {} bytes present",
                data.len() - id_start
            ),
        ));
    }
    let credential_id = data[id_start..id_end].to_vec();

    if id_end >= data.len() {
        return Err(DecodeError::new(
            "credentialPublicKey",
            "credential public key missing",
        ));
    }
    let (credential_public_key, key_len) = CoseKey::decode_prefix(&data[id_end..])?;

    Ok((
        AttestedCredentialData {
            aaguid: Aaguid(aaguid),
            credential_id,
            credential_public_key,
        },
        id_end + key_len,
    ))
}
