//! Persistent direct-message history, backed by SQLite.
//!
//! Disabled by default (`direct_message_history.enabled = false`); every
//! method returns [`HistoryError::NotInitialized`] in that case, which the
//! core treats as a silent skip rather than a user-visible failure.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("direct message history is not enabled")]
    NotInitialized,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub from_username: String,
    pub to_username: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

pub struct HistoryStore {
    pool: Option<SqlitePool>,
}

impl HistoryStore {
    /// Connects to `path` (creating the file and schema if needed) when
    /// `enabled` is true; otherwise returns a store whose every method is a
    /// no-op [`HistoryError::NotInitialized`].
    pub async fn connect(enabled: bool, path: &str) -> Result<Self, HistoryError> {
        if !enabled {
            return Ok(HistoryStore { pool: None });
        }

        let url = format!("sqlite://{path}?mode=rwc");
        let pool = SqlitePoolOptions::new().max_connections(5).connect(&url).await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS direct_messages (
                id INTEGER PRIMARY KEY,
                from_username TEXT NOT NULL,
                to_username TEXT NOT NULL,
                message TEXT NOT NULL,
                sent_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(HistoryStore { pool: Some(pool) })
    }

    fn pool(&self) -> Result<&SqlitePool, HistoryError> {
        self.pool.as_ref().ok_or(HistoryError::NotInitialized)
    }

    pub async fn log_message(&self, message_id: i64, from: &str, to: &str, message: &str) -> Result<(), HistoryError> {
        let pool = self.pool()?;
        sqlx::query(
            "INSERT INTO direct_messages (id, from_username, to_username, message, sent_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(message_id)
        .bind(from)
        .bind(to)
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Deletes a message by id, checking ownership unless `is_admin`.
    /// Returns whether a row was removed.
    pub async fn takeback_message(&self, username: &str, message_id: i64, is_admin: bool) -> Result<bool, HistoryError> {
        let pool = self.pool()?;
        let result = if is_admin {
            sqlx::query("DELETE FROM direct_messages WHERE id = ?")
                .bind(message_id)
                .execute(pool)
                .await?
        } else {
            sqlx::query("DELETE FROM direct_messages WHERE id = ? AND from_username = ?")
                .bind(message_id)
                .bind(username)
                .execute(pool)
                .await?
        };
        Ok(result.rows_affected() > 0)
    }

    /// Returns up to `page_size` messages between `a` and `b` older than
    /// `before_id` (or the most recent page when `before_id` is `None`),
    /// newest first, plus whether more remain.
    pub async fn paginate(
        &self,
        a: &str,
        b: &str,
        before_id: Option<i64>,
        page_size: i64,
    ) -> Result<(Vec<StoredMessage>, bool), HistoryError> {
        let pool = self.pool()?;
        let before_id = before_id.unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT id, from_username, to_username, message, sent_at FROM direct_messages
            WHERE id < ?
              AND ((from_username = ? AND to_username = ?) OR (from_username = ? AND to_username = ?))
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(before_id)
        .bind(a)
        .bind(b)
        .bind(b)
        .bind(a)
        .bind(page_size + 1)
        .fetch_all(pool)
        .await?;

        let mut messages: Vec<StoredMessage> = rows
            .iter()
            .map(|row| StoredMessage {
                id: row.get("id"),
                from_username: row.get("from_username"),
                to_username: row.get("to_username"),
                message: row.get("message"),
                sent_at: row
                    .get::<String, _>("sent_at")
                    .parse()
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect();

        let has_more = messages.len() as i64 > page_size;
        messages.truncate(page_size as usize);
        Ok((messages, has_more))
    }

    /// Deletes every message sent *by* `username`, returning the count
    /// removed.
    pub async fn clear(&self, username: &str) -> Result<u64, HistoryError> {
        let pool = self.pool()?;
        let result = sqlx::query("DELETE FROM direct_messages WHERE from_username = ?")
            .bind(username)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_returns_not_initialized() {
        let store = HistoryStore::connect(false, "unused.db").await.unwrap();
        let err = store.log_message(1, "a", "b", "hi").await.unwrap_err();
        assert!(matches!(err, HistoryError::NotInitialized));
    }

    #[tokio::test]
    async fn log_and_paginate_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let store = HistoryStore::connect(true, path.to_str().unwrap()).await.unwrap();

        store.log_message(1, "alice", "bob", "hi").await.unwrap();
        store.log_message(2, "bob", "alice", "hello").await.unwrap();

        let (messages, has_more) = store.paginate("alice", "bob", None, 10).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(!has_more);
        assert_eq!(messages[0].id, 2);
    }

    #[tokio::test]
    async fn takeback_requires_ownership_unless_admin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let store = HistoryStore::connect(true, path.to_str().unwrap()).await.unwrap();
        store.log_message(1, "alice", "bob", "hi").await.unwrap();

        assert!(!store.takeback_message("bob", 1, false).await.unwrap());
        assert!(store.takeback_message("alice", 1, false).await.unwrap());
    }

    #[tokio::test]
    async fn clear_removes_only_the_username_sent_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let store = HistoryStore::connect(true, path.to_str().unwrap()).await.unwrap();
        store.log_message(1, "alice", "bob", "hi").await.unwrap();
        store.log_message(2, "bob", "alice", "hello").await.unwrap();

        let removed = store.clear("alice").await.unwrap();
        assert_eq!(removed, 1);
        let (messages, _) = store.paginate("alice", "bob", None, 10).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].from_username, "bob");
    }
}
