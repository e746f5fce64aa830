use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task;

use super::ArtifactRepository;
use super::kv::KvStore;
use crate::session::GeneratedArtifact;

pub const FALLBACK_KEY: &str = "ui_forge_artifacts";
pub const FALLBACK_LIMIT: usize = 20;

/// Fallback tier: the newest [`FALLBACK_LIMIT`] artifacts as one JSON blob.
///
/// Writers hold `write_lock` across load, modify and store so concurrent saves
/// of different artifacts never overwrite each other. Blob I/O runs on the
/// blocking pool.
#[derive(Clone)]
pub struct FallbackArtifactRepository {
    kv: Arc<dyn KvStore>,
    write_lock: Arc<Mutex<()>>,
}

impl FallbackArtifactRepository {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv, write_lock: Arc::new(Mutex::new(())) }
    }

    /// Stored order: insertion order, oldest first.
    async fn load(&self) -> anyhow::Result<Vec<GeneratedArtifact>> {
        let kv = self.kv.clone();
        task::spawn_blocking(move || -> anyhow::Result<Vec<GeneratedArtifact>> {
            match kv.get(FALLBACK_KEY)? {
                Some(blob) => Ok(serde_json::from_str(&blob)?),
                None => Ok(Vec::new()),
            }
        })
        .await
        .context("fallback read task failed")?
    }

    async fn store(&self, artifacts: Vec<GeneratedArtifact>) -> anyhow::Result<()> {
        let kv = self.kv.clone();
        task::spawn_blocking(move || -> anyhow::Result<()> {
            kv.set(FALLBACK_KEY, &serde_json::to_string(&artifacts)?)
        })
            .await
            .context("fallback write task failed")?
    }
}

#[async_trait]
impl ArtifactRepository for FallbackArtifactRepository {
    async fn save(&self, artifact: &GeneratedArtifact) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut artifacts = self.load().await?;
        match artifacts.iter_mut().find(|a| a.id == artifact.id) {
            Some(slot) => *slot = artifact.clone(),
            None => artifacts.push(artifact.clone()),
        }
        if artifacts.len() > FALLBACK_LIMIT {
            artifacts.drain(..artifacts.len() - FALLBACK_LIMIT);
        }
        self.store(artifacts).await
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<GeneratedArtifact>> {
        Ok(self.load().await?.into_iter().find(|a| a.id == id))
    }

    async fn get_all(&self) -> anyhow::Result<Vec<GeneratedArtifact>> {
        let mut artifacts = self.load().await?;
        artifacts.reverse();
        artifacts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(artifacts)
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut artifacts = self.load().await?;
        artifacts.retain(|a| a.id != id);
        self.store(artifacts).await
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let kv = self.kv.clone();
        task::spawn_blocking(move || kv.remove(FALLBACK_KEY))
            .await
            .context("fallback clear task failed")?
    }
}
