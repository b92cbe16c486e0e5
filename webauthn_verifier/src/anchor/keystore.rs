use x509_parser::pem::Pem;

use super::{TrustAnchor, TrustAnchorRepository, TrustAnchorSet};
use crate::decoder::Aaguid;
use crate::errors::TrustAnchorLoadError;

const PEM_CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Decoded trust material: the certificates of a keystore bundle.
#[derive(Debug, Clone)]
pub struct KeyStore {
    anchors: Vec<TrustAnchor>,
}

impl KeyStore {
    /// Reads every `CERTIFICATE` block of a PEM bundle. Other blocks are skipped.
    ///
    /// # Errors
    /// * `TrustAnchorLoadError::Malformed` - invalid PEM or certificate
    /// * `TrustAnchorLoadError::Empty` - the bundle holds no certificates
    pub fn from_pem(pem: &[u8]) -> Result<Self, TrustAnchorLoadError> {
        let mut certificates = Vec::new();
        for block in Pem::iter_from_buffer(pem) {
            let block = block
                .map_err(|e| TrustAnchorLoadError::Malformed(format!("Invalid PEM: {e}")))?;
            if block.label != PEM_CERTIFICATE_LABEL {
                tracing::warn!("Skipping PEM block with label {}", block.label);
                continue;
            }
            certificates.push(block.contents);
        }
        Self::from_der_certificates(certificates)
    }

    /// # Errors
    /// * `TrustAnchorLoadError::Malformed` - a certificate cannot be parsed
    /// * `TrustAnchorLoadError::Empty` - no certificates were given
    pub fn from_der_certificates(
        certificates: impl IntoIterator<Item = Vec<u8>>,
    ) -> Result<Self, TrustAnchorLoadError> {
        let anchors = certificates
            .into_iter()
            .map(TrustAnchor::from_der)
            .collect::<Result<Vec<_>, _>>()?;
        if anchors.is_empty() {
            return Err(TrustAnchorLoadError::Empty);
        }
        tracing::debug!("Loaded {} trust anchors", anchors.len());
        Ok(Self { anchors })
    }

    pub fn anchors(&self) -> &[TrustAnchor] {
        &self.anchors
    }
}

impl From<KeyStore> for TrustAnchorSet {
    fn from(key_store: KeyStore) -> Self {
        TrustAnchorSet::new(key_store.anchors)
    }
}

/// Trusts every certificate of a keystore for every authenticator.
#[derive(Debug, Clone)]
pub struct KeyStoreTrustAnchorRepository {
    anchors: TrustAnchorSet,
}

impl KeyStoreTrustAnchorRepository {
    pub fn new(key_store: KeyStore) -> Self {
        Self {
            anchors: key_store.into(),
        }
    }
}

impl TrustAnchorRepository for KeyStoreTrustAnchorRepository {
    fn find_by_aaguid(&self, _aaguid: &Aaguid) -> TrustAnchorSet {
        self.anchors.clone()
    }

    fn find_by_key_identifier(&self, _key_identifier: &[u8]) -> TrustAnchorSet {
        self.anchors.clone()
    }
}
