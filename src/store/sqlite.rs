use crate::secret::{NewSecret, Secret};
use crate::store::{ConsumeOutcome, SecretStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::info;

pub type DbPool = Pool<Sqlite>;

/// Durable secret storage over SQLite.
///
/// Every consume path is a single conditional `DELETE ... RETURNING`, so the
/// existence check, expiry check, answer check, and deletion are one
/// indivisible statement.
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SecretStore for SqliteStore {
    async fn create(&self, new: NewSecret) -> Result<String, StoreError> {
        new.check_invariants()?;
        let secret = Secret::from_new(new, Utc::now());

        sqlx::query(
            r#"
            INSERT INTO secrets (id, text, prompt, answer, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&secret.id)
        .bind(&secret.text)
        .bind(&secret.prompt)
        .bind(&secret.answer)
        .bind(secret.created_at)
        .bind(secret.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(secret.id.clone())
    }

    async fn consume_if_valid(&self, id: &str) -> Result<ConsumeOutcome, StoreError> {
        let now = Utc::now();

        // A live challenged secret returns its prompt and stays pending
        let prompt = sqlx::query_scalar::<_, String>(
            "SELECT prompt FROM secrets WHERE id = ? AND prompt IS NOT NULL AND expires_at > ?",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(prompt) = prompt {
            return Ok(ConsumeOutcome::ChallengeRequired(prompt));
        }

        let text = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM secrets
            WHERE id = ? AND answer IS NULL AND expires_at > ?
            RETURNING text
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        text.map(ConsumeOutcome::Revealed).ok_or(StoreError::NotFound)
    }

    async fn validate_and_consume(&self, id: &str, answer: &str) -> Result<String, StoreError> {
        let now = Utc::now();

        // TEXT `=` uses BINARY collation: exact, case-sensitive, matching
        // crate::secret::answer_matches
        let text = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM secrets
            WHERE id = ? AND expires_at > ? AND (answer IS NULL OR answer = ?)
            RETURNING text
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(answer)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(text) = text {
            return Ok(text);
        }

        // Distinguish a live mismatch (retryable) from nothing to consume
        let pending = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM secrets WHERE id = ? AND expires_at > ?",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        match pending {
            Some(_) => Err(StoreError::ChallengeMismatch),
            None => Err(StoreError::NotFound),
        }
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM secrets WHERE expires_at <= ?")
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Initialize database schema
pub async fn init_db(pool: &DbPool) -> Result<(), StoreError> {
    info!("Running database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS secrets (
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            prompt TEXT,
            answer TEXT,
            created_at DATETIME NOT NULL,
            expires_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_secrets_expires_at ON secrets(expires_at)")
        .execute(pool)
        .await?;

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
pub async fn setup_test_db() -> DbPool {
    use sqlx::sqlite::SqlitePoolOptions;
    // One connection: each :memory: connection is its own database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_db(&pool).await.expect("Failed to init database");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::Challenge;
    use chrono::Duration;

    fn plain_secret(text: &str, ttl: Duration) -> NewSecret {
        NewSecret {
            text: text.to_string(),
            challenge: None,
            ttl,
        }
    }

    fn challenged_secret(text: &str, prompt: &str, answer: &str) -> NewSecret {
        NewSecret {
            text: text.to_string(),
            challenge: Some(Challenge {
                prompt: prompt.to_string(),
                answer: answer.to_string(),
            }),
            ttl: Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_create_persists_full_record() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool.clone());

        let id = store
            .create(challenged_secret("payload", "hint", "key"))
            .await
            .unwrap();

        let row = sqlx::query_as::<_, Secret>("SELECT * FROM secrets WHERE id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.text, "payload");
        assert_eq!(row.prompt.as_deref(), Some("hint"));
        assert_eq!(row.answer.as_deref(), Some("key"));
        assert_eq!(row.expires_at, row.created_at + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_text() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool);

        let err = store
            .create(plain_secret("", Duration::hours(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidSecret(_)));
    }

    #[tokio::test]
    async fn test_consume_reveals_once() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool);

        let id = store
            .create(plain_secret("one shot", Duration::hours(1)))
            .await
            .unwrap();

        let outcome = store.consume_if_valid(&id).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Revealed("one shot".to_string()));

        let err = store.consume_if_valid(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_consume_unknown_id() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool);

        let err = store.consume_if_valid("does-not-exist").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_expired_secret_behaves_as_not_found() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool.clone());

        let id = store
            .create(plain_secret("gone already", Duration::zero()))
            .await
            .unwrap();

        let err = store.consume_if_valid(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));

        // Physically still present until a sweep runs; behavior is identical
        let rows = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM secrets WHERE id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_challenged_consume_returns_prompt_without_consuming() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool);

        let id = store
            .create(challenged_secret("payload", "hint", "key"))
            .await
            .unwrap();

        let outcome = store.consume_if_valid(&id).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::ChallengeRequired("hint".to_string()));

        // Still pending after any number of first-contact reads
        let outcome = store.consume_if_valid(&id).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::ChallengeRequired("hint".to_string()));
    }

    #[tokio::test]
    async fn test_validate_and_consume_flow() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool);

        let id = store
            .create(challenged_secret("payload", "hint", "key"))
            .await
            .unwrap();

        // Mismatch leaves the secret pending
        let err = store.validate_and_consume(&id, "wrong").await.unwrap_err();
        assert!(matches!(err, StoreError::ChallengeMismatch));

        // Case matters
        let err = store.validate_and_consume(&id, "Key").await.unwrap_err();
        assert!(matches!(err, StoreError::ChallengeMismatch));

        let text = store.validate_and_consume(&id, "key").await.unwrap();
        assert_eq!(text, "payload");

        // Consumed: the same answer now reports NotFound, not mismatch
        let err = store.validate_and_consume(&id, "key").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_validate_and_consume_without_challenge_reveals() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool);

        let id = store
            .create(plain_secret("payload", Duration::hours(1)))
            .await
            .unwrap();

        let text = store.validate_and_consume(&id, "ignored").await.unwrap();
        assert_eq!(text, "payload");
    }

    #[tokio::test]
    async fn test_purge_expired_removes_only_expired() {
        let pool = setup_test_db().await;
        let store = SqliteStore::new(pool.clone());

        store
            .create(plain_secret("expired", Duration::zero()))
            .await
            .unwrap();
        let live_id = store
            .create(plain_secret("live", Duration::hours(1)))
            .await
            .unwrap();

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);

        let outcome = store.consume_if_valid(&live_id).await.unwrap();
        assert_eq!(outcome, ConsumeOutcome::Revealed("live".to_string()));
    }
}
