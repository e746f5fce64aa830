use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};

use super::ArtifactRepository;
use crate::session::GeneratedArtifact;

/// Primary tier: artifacts keyed by id with an index on timestamp.
#[derive(Clone)]
pub struct SqliteArtifactRepository {
    pool: Pool<Sqlite>,
}

impl SqliteArtifactRepository {
    pub async fn initialize(database_url: &str) -> anyhow::Result<Self> {
        let options = database_url
            .parse::<SqliteConnectOptions>()?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);
        let pool = Pool::<Sqlite>::connect_with(options).await?;
        sqlx::query("PRAGMA busy_timeout = 5000;").execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn from_row(r: &sqlx::sqlite::SqliteRow) -> anyhow::Result<GeneratedArtifact> {
    let messages_json: String = r.try_get("messages_json")?;
    Ok(GeneratedArtifact {
        id: r.try_get("id")?,
        code: r.try_get("code")?,
        prompt: r.try_get("prompt")?,
        timestamp: r.try_get("timestamp")?,
        messages: serde_json::from_str(&messages_json)?,
    })
}

#[async_trait]
impl ArtifactRepository for SqliteArtifactRepository {
    async fn save(&self, artifact: &GeneratedArtifact) -> anyhow::Result<()> {
        let messages_json = serde_json::to_string(&artifact.messages)?;
        sqlx::query(
            "INSERT INTO artifacts (id, code, prompt, timestamp, messages_json) VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(id) DO UPDATE SET code = excluded.code, prompt = excluded.prompt, \
             timestamp = excluded.timestamp, messages_json = excluded.messages_json",
        )
        .bind(&artifact.id)
        .bind(&artifact.code)
        .bind(&artifact.prompt)
        .bind(artifact.timestamp)
        .bind(messages_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> anyhow::Result<Option<GeneratedArtifact>> {
        let row = sqlx::query("SELECT id, code, prompt, timestamp, messages_json FROM artifacts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(from_row).transpose()
    }

    async fn get_all(&self) -> anyhow::Result<Vec<GeneratedArtifact>> {
        let rows = sqlx::query(
            "SELECT id, code, prompt, timestamp, messages_json FROM artifacts ORDER BY timestamp DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(from_row).collect()
    }

    async fn delete(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM artifacts WHERE id = ?1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM artifacts").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Message;
    use tempfile::tempdir;

    fn artifact(prompt: &str, timestamp: i64) -> GeneratedArtifact {
        let mut a = GeneratedArtifact::new("<div/>", prompt, vec![Message::user(prompt)]);
        a.timestamp = timestamp;
        a
    }

    #[tokio::test]
    async fn crud_and_ordering() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("forge.db").to_string_lossy());
        let repo = SqliteArtifactRepository::initialize(&url).await.unwrap();

        let old = artifact("old", 1_000);
        let new = artifact("new", 2_000);
        repo.save(&old).await.unwrap();
        repo.save(&new).await.unwrap();

        let all = repo.get_all().await.unwrap();
        assert_eq!(all.iter().map(|a| a.prompt.as_str()).collect::<Vec<_>>(), vec!["new", "old"]);

        let got = repo.get_by_id(&old.id).await.unwrap().unwrap();
        assert_eq!(got, old);

        let mut updated = old.clone();
        updated.code = "<section/>".into();
        repo.save(&updated).await.unwrap();
        assert_eq!(repo.get_by_id(&old.id).await.unwrap().unwrap().code, "<section/>");
        assert_eq!(repo.get_all().await.unwrap().len(), 2);

        repo.delete(&old.id).await.unwrap();
        assert!(repo.get_by_id(&old.id).await.unwrap().is_none());

        repo.clear().await.unwrap();
        assert!(repo.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn migrations_create_timestamp_index_and_are_idempotent() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("forge.db").to_string_lossy());
        let repo = SqliteArtifactRepository::initialize(&url).await.unwrap();

        let row = sqlx::query("SELECT count(*) AS c FROM sqlite_master WHERE type = 'index' AND name = 'idx_artifacts_timestamp'")
            .fetch_one(repo.pool())
            .await
            .unwrap();
        let c: i64 = row.get("c");
        assert_eq!(c, 1);

        let row = sqlx::query("PRAGMA journal_mode;").fetch_one(repo.pool()).await.unwrap();
        let mode: String = row.get(0);
        assert!(mode.eq_ignore_ascii_case("wal"), "journal_mode should be WAL, got {}", mode);

        let _again = SqliteArtifactRepository::initialize(&url).await.unwrap();
    }
}
