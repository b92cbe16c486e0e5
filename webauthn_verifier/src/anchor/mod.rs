//! Trust anchor resolution.
//!
//! Anchors are looked up by AAGUID or by the key identifier of an attestation
//! certificate. An empty result is valid and distinct from a load failure.

mod aaguid;
mod async_repo;
mod keystore;

use std::slice;
use std::sync::Arc;

use async_trait::async_trait;
use x509_parser::prelude::*;

use crate::crypto::key_identifier;
use crate::decoder::Aaguid;
use crate::errors::TrustAnchorLoadError;

pub use aaguid::AaguidTrustAnchorRepository;
pub use async_repo::{KeyStoreLoader, KeyStoreTrustAnchorAsyncRepository, PemFileKeyStoreLoader};
pub use keystore::{KeyStore, KeyStoreTrustAnchorRepository};

/// Directory name constraints of a trust anchor.
///
/// Subtrees are DER encoded names. A name is inside a subtree when the subtree's
/// RDN sequence is a prefix of the name's RDN sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameConstraints {
    pub permitted_subtrees: Vec<Vec<u8>>,
    pub excluded_subtrees: Vec<Vec<u8>>,
}

type Rdn = Vec<(Vec<u8>, Vec<u8>)>;

fn rdn_sequence(name: &X509Name<'_>) -> Vec<Rdn> {
    name.iter()
        .map(|rdn| {
            rdn.iter()
                .map(|atv| (atv.attr_type().as_bytes().to_vec(), atv.attr_value().data.to_vec()))
                .collect()
        })
        .collect()
}

fn parse_subtree(der: &[u8]) -> Option<Vec<Rdn>> {
    X509Name::from_der(der)
        .ok()
        .map(|(_, name)| rdn_sequence(&name))
}

impl NameConstraints {
    /// Whether `name` satisfies the permitted and excluded subtrees.
    ///
    /// An excluded subtree that cannot be parsed excludes every name.
    pub(crate) fn permits(&self, name: &X509Name<'_>) -> bool {
        let rdns = rdn_sequence(name);
        let excluded = |subtree: &Vec<u8>| {
            parse_subtree(subtree).is_none_or(|prefix| rdns.starts_with(&prefix))
        };
        let permitted = |subtree: &Vec<u8>| {
            parse_subtree(subtree).is_some_and(|prefix| rdns.starts_with(&prefix))
        };

        if self.excluded_subtrees.iter().any(excluded) {
            return false;
        }
        self.permitted_subtrees.is_empty() || self.permitted_subtrees.iter().any(permitted)
    }

    fn check_subtrees(&self) -> Result<(), TrustAnchorLoadError> {
        for subtree in self.permitted_subtrees.iter().chain(&self.excluded_subtrees) {
            if parse_subtree(subtree).is_none() {
                return Err(TrustAnchorLoadError::Malformed(
                    "Name constraint subtree is not a DER encoded name".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A trusted root certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustAnchor {
    certificate: Vec<u8>,
    subject: String,
    key_identifier: Vec<u8>,
    name_constraints: Option<NameConstraints>,
}

impl TrustAnchor {
    /// Creates an anchor from a DER certificate.
    ///
    /// # Errors
    /// * `TrustAnchorLoadError::Malformed` - the certificate cannot be parsed
    pub fn from_der(certificate: Vec<u8>) -> Result<Self, TrustAnchorLoadError> {
        let (subject, key_identifier) = {
            let (_, cert) = X509Certificate::from_der(&certificate).map_err(|e| {
                TrustAnchorLoadError::Malformed(format!("Failed to parse certificate: {e}"))
            })?;
            (cert.subject().to_string(), key_identifier(cert.public_key()))
        };
        Ok(Self {
            certificate,
            subject,
            key_identifier,
            name_constraints: None,
        })
    }

    /// Restricts the names this anchor may certify.
    ///
    /// # Errors
    /// * `TrustAnchorLoadError::Malformed` - a subtree is not a DER encoded name
    pub fn with_name_constraints(
        mut self,
        name_constraints: NameConstraints,
    ) -> Result<Self, TrustAnchorLoadError> {
        name_constraints.check_subtrees()?;
        self.name_constraints = Some(name_constraints);
        Ok(self)
    }

    pub fn certificate(&self) -> &[u8] {
        &self.certificate
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// SHA-1 of the subject public key
    pub fn key_identifier(&self) -> &[u8] {
        &self.key_identifier
    }

    pub fn name_constraints(&self) -> Option<&NameConstraints> {
        self.name_constraints.as_ref()
    }
}

/// An immutable, cheaply cloneable set of trust anchors.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorSet(Arc<Vec<TrustAnchor>>);

impl TrustAnchorSet {
    pub fn new(anchors: Vec<TrustAnchor>) -> Self {
        Self(Arc::new(anchors))
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> slice::Iter<'_, TrustAnchor> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a TrustAnchorSet {
    type Item = &'a TrustAnchor;
    type IntoIter = slice::Iter<'a, TrustAnchor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Blocking lookup against pre-loaded trust material.
pub trait TrustAnchorRepository: Send + Sync {
    fn find_by_aaguid(&self, aaguid: &Aaguid) -> TrustAnchorSet;

    fn find_by_key_identifier(&self, key_identifier: &[u8]) -> TrustAnchorSet;
}

/// Non-blocking lookup. Implementations may load trust material on first use.
#[async_trait]
pub trait TrustAnchorAsyncRepository: Send + Sync {
    async fn find_by_aaguid(&self, aaguid: &Aaguid)
    -> Result<TrustAnchorSet, TrustAnchorLoadError>;

    async fn find_by_key_identifier(
        &self,
        key_identifier: &[u8],
    ) -> Result<TrustAnchorSet, TrustAnchorLoadError>;
}
