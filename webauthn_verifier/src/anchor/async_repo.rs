use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::{KeyStore, TrustAnchorAsyncRepository, TrustAnchorSet};
use crate::decoder::Aaguid;
use crate::errors::TrustAnchorLoadError;

/// Source of keystore material for the async repository.
#[async_trait]
pub trait KeyStoreLoader: Send + Sync + 'static {
    async fn load(&self) -> Result<KeyStore, TrustAnchorLoadError>;
}

/// Loads a PEM certificate bundle from disk.
#[derive(Debug, Clone)]
pub struct PemFileKeyStoreLoader {
    path: PathBuf,
}

impl PemFileKeyStoreLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl KeyStoreLoader for PemFileKeyStoreLoader {
    async fn load(&self) -> Result<KeyStore, TrustAnchorLoadError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            TrustAnchorLoadError::Io(format!("{}: {}", self.path.display(), e))
        })?;
        KeyStore::from_pem(&bytes)
    }
}

/// Trusts every keystore certificate, loading the keystore at most once.
///
/// Callers arriving while the load is in flight wait for it instead of starting
/// another one. The outcome, including a failure, is kept for the lifetime of the
/// repository.
pub struct KeyStoreTrustAnchorAsyncRepository<L: KeyStoreLoader> {
    loader: L,
    anchors: OnceCell<Result<TrustAnchorSet, TrustAnchorLoadError>>,
}

impl<L: KeyStoreLoader> KeyStoreTrustAnchorAsyncRepository<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            anchors: OnceCell::new(),
        }
    }

    async fn anchors(&self) -> Result<TrustAnchorSet, TrustAnchorLoadError> {
        self.anchors
            .get_or_init(|| async {
                tracing::info!("Loading trust anchors from keystore");
                let result = self.loader.load().await.map(TrustAnchorSet::from);
                if let Err(e) = &result {
                    tracing::warn!("Failed to load trust anchors: {}", e);
                }
                result
            })
            .await
            .clone()
    }
}

#[async_trait]
impl<L: KeyStoreLoader> TrustAnchorAsyncRepository for KeyStoreTrustAnchorAsyncRepository<L> {
    async fn find_by_aaguid(
        &self,
        _aaguid: &Aaguid,
    ) -> Result<TrustAnchorSet, TrustAnchorLoadError> {
        self.anchors().await
    }

    async fn find_by_key_identifier(
        &self,
        _key_identifier: &[u8],
    ) -> Result<TrustAnchorSet, TrustAnchorLoadError> {
        self.anchors().await
    }
}
