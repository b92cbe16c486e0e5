use std::collections::HashMap;

use super::{TrustAnchor, TrustAnchorRepository, TrustAnchorSet};
use crate::decoder::Aaguid;

/// Trust anchors registered per authenticator model.
///
/// FIDO U2F authenticators carry no AAGUID, so their anchors are registered by the
/// key identifier of the attestation certificate instead.
#[derive(Debug, Clone, Default)]
pub struct AaguidTrustAnchorRepository {
    by_aaguid: HashMap<Aaguid, Vec<TrustAnchor>>,
    by_key_identifier: HashMap<Vec<u8>, Vec<TrustAnchor>>,
}

impl AaguidTrustAnchorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_for_aaguid(&mut self, aaguid: Aaguid, anchor: TrustAnchor) {
        self.by_aaguid.entry(aaguid).or_default().push(anchor);
    }

    pub fn add_for_key_identifier(&mut self, key_identifier: Vec<u8>, anchor: TrustAnchor) {
        self.by_key_identifier
            .entry(key_identifier)
            .or_default()
            .push(anchor);
    }
}

impl TrustAnchorRepository for AaguidTrustAnchorRepository {
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> TrustAnchorSet {
        self.by_aaguid
            .get(aaguid)
            .map(|anchors| TrustAnchorSet::new(anchors.clone()))
            .unwrap_or_default()
    }

    fn find_by_key_identifier(&self, key_identifier: &[u8]) -> TrustAnchorSet {
        self.by_key_identifier
            .get(key_identifier)
            .map(|anchors| TrustAnchorSet::new(anchors.clone()))
            .unwrap_or_default()
    }
}
