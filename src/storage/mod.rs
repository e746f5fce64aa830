//! Durable storage for generated artifacts and the API key.
//!
//! Artifacts go to the SQLite primary tier when it opened at startup, and to a
//! capped key/value blob otherwise. A primary operation that fails is retried
//! against the fallback. The two tiers are never synchronized with each other.
//! Storage failures are logged, never returned.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::session::GeneratedArtifact;

pub mod credential;
pub mod fallback;
pub mod kv;
pub mod sqlite;

pub use credential::CredentialStore;
pub use fallback::FallbackArtifactRepository;
pub use kv::{FileKvStore, KvStore, MemoryKvStore};
pub use sqlite::SqliteArtifactRepository;

#[async_trait]
pub trait ArtifactRepository: Send + Sync {
    async fn save(&self, artifact: &GeneratedArtifact) -> anyhow::Result<()>;
    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<GeneratedArtifact>>;
    /// Most recent first.
    async fn get_all(&self) -> anyhow::Result<Vec<GeneratedArtifact>>;
    async fn delete(&self, id: &str) -> anyhow::Result<()>;
    async fn clear(&self) -> anyhow::Result<()>;
}

pub struct PersistentStore {
    primary: Option<Arc<dyn ArtifactRepository>>,
    fallback: FallbackArtifactRepository,
    credential: CredentialStore,
}

impl PersistentStore {
    /// Opens the primary tier once. A failure is logged and every later
    /// artifact operation routes to the fallback tier.
    pub async fn initialize(database_url: Option<&str>, kv: Arc<dyn KvStore>) -> Self {
        let primary = match database_url {
            Some(url) => match SqliteArtifactRepository::initialize(url).await {
                Ok(repo) => {
                    info!("storage initialized");
                    Some(Arc::new(repo) as Arc<dyn ArtifactRepository>)
                }
                Err(e) => {
                    error!(error = %e, "failed to open primary store, using fallback");
                    None
                }
            },
            None => {
                warn!("no database configured, using fallback store");
                None
            }
        };
        Self::with_primary(primary, kv)
    }

    pub fn with_primary(primary: Option<Arc<dyn ArtifactRepository>>, kv: Arc<dyn KvStore>) -> Self {
        Self {
            primary,
            fallback: FallbackArtifactRepository::new(kv.clone()),
            credential: CredentialStore::new(kv),
        }
    }

    pub fn is_primary_available(&self) -> bool {
        self.primary.is_some()
    }

    pub fn credential(&self) -> &CredentialStore {
        &self.credential
    }

    pub async fn save(&self, artifact: &GeneratedArtifact) {
        if let Some(primary) = &self.primary {
            match primary.save(artifact).await {
                Ok(()) => return,
                Err(e) => warn!(id = %artifact.id, error = %e, "primary save failed, using fallback"),
            }
        }
        if let Err(e) = self.fallback.save(artifact).await {
            error!(id = %artifact.id, error = %e, "fallback save failed");
        }
    }

    pub async fn get_by_id(&self, id: &str) -> Option<GeneratedArtifact> {
        if let Some(primary) = &self.primary {
            match primary.get_by_id(id).await {
                Ok(found) => return found,
                Err(e) => warn!(id, error = %e, "primary read failed, using fallback"),
            }
        }
        self.fallback.get_by_id(id).await.unwrap_or_else(|e| {
            error!(id, error = %e, "fallback read failed");
            None
        })
    }

    pub async fn get_all(&self) -> Vec<GeneratedArtifact> {
        if let Some(primary) = &self.primary {
            match primary.get_all().await {
                Ok(all) => {
                    info!(count = all.len(), "retrieved artifacts");
                    return all;
                }
                Err(e) => warn!(error = %e, "primary list failed, using fallback"),
            }
        }
        self.fallback.get_all().await.unwrap_or_else(|e| {
            error!(error = %e, "fallback list failed");
            Vec::new()
        })
    }

    pub async fn delete(&self, id: &str) {
        if let Some(primary) = &self.primary {
            match primary.delete(id).await {
                Ok(()) => return,
                Err(e) => warn!(id, error = %e, "primary delete failed, using fallback"),
            }
        }
        if let Err(e) = self.fallback.delete(id).await {
            error!(id, error = %e, "fallback delete failed");
        }
    }

    pub async fn clear(&self) {
        if let Some(primary) = &self.primary {
            match primary.clear().await {
                Ok(()) => return,
                Err(e) => warn!(error = %e, "primary clear failed, using fallback"),
            }
        }
        if let Err(e) = self.fallback.clear().await {
            error!(error = %e, "fallback clear failed");
        }
    }
}
