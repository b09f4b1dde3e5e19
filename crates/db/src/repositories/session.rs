use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use callbridge_core::session::{SessionKey, SessionState, SessionStore, SessionStoreError};

use super::RepositoryError;
use crate::DbPool;

/// Durable session store. Each session is one JSON document keyed by
/// `(user_id, session_id)`. Rows older than `ttl` read as empty and are
/// deleted on every save.
pub struct SqlSessionStore {
    pool: DbPool,
    ttl: Duration,
}

impl SqlSessionStore {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    #[cfg(test)]
    fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn cutoff(&self, now: DateTime<Utc>) -> String {
        let oldest = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        timestamp(oldest)
    }

    async fn find(&self, key: &SessionKey) -> Result<Option<SessionState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT state_json FROM carrier_session
             WHERE user_id = ? AND session_id = ? AND updated_at >= ?",
        )
        .bind(&key.user_id)
        .bind(&key.session_id)
        .bind(self.cutoff(Utc::now()))
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("state_json")?;
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|error| RepositoryError::Decode { key: key.to_string(), message: error.to_string() })
    }

    async fn upsert(&self, key: &SessionKey, state: &SessionState) -> Result<(), RepositoryError> {
        let state_json = serde_json::to_string(state).map_err(|error| RepositoryError::Decode {
            key: key.to_string(),
            message: error.to_string(),
        })?;
        let now = timestamp(Utc::now());

        sqlx::query(
            "INSERT INTO carrier_session (user_id, session_id, state_json, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id, session_id) DO UPDATE SET
                 state_json = excluded.state_json,
                 updated_at = excluded.updated_at",
        )
        .bind(&key.user_id)
        .bind(&key.session_id)
        .bind(&state_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM carrier_session WHERE updated_at < ?")
            .bind(self.cutoff(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Fixed-width UTC timestamps so `updated_at` compares correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait::async_trait]
impl SessionStore for SqlSessionStore {
    async fn load(&self, key: &SessionKey) -> Result<SessionState, SessionStoreError> {
        Ok(self.find(key).await?.unwrap_or_default())
    }

    async fn save(&self, key: &SessionKey, state: &SessionState) -> Result<(), SessionStoreError> {
        self.upsert(key, state).await?;
        self.purge_expired(Utc::now()).await?;
        Ok(())
    }
}
