//! Pending OAuth logins.
//!
//! `/auth/google` stores the CSRF state together with its PKCE verifier.
//! The callback takes it back out exactly once.

use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct OAuthStateStore {
    pool: SqlitePool,
}

impl OAuthStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Store the PKCE verifier for a CSRF state.
    pub async fn store(&self, state: &str, pkce_verifier: &str) -> Result<(), sqlx::Error> {
        self.cleanup_expired().await?;

        sqlx::query(
            "INSERT OR REPLACE INTO oauth_states (state, pkce_verifier, created_at)
             VALUES (?, ?, datetime('now'))",
        )
        .bind(state)
        .bind(pkce_verifier)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get and remove the verifier for a state.
    ///
    /// Returns None if the state is unknown or older than 10 minutes.
    pub async fn take(&self, state: &str) -> Result<Option<String>, sqlx::Error> {
        self.cleanup_expired().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT pkce_verifier FROM oauth_states WHERE state = ?")
                .bind(state)
                .fetch_optional(&self.pool)
                .await?;

        sqlx::query("DELETE FROM oauth_states WHERE state = ?")
            .bind(state)
            .execute(&self.pool)
            .await?;

        Ok(row.map(|(verifier,)| verifier))
    }

    /// Remove states older than 10 minutes.
    pub async fn cleanup_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM oauth_states WHERE created_at < datetime('now', '-10 minutes')",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
