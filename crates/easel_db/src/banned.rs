//! Banned-word CRUD. Words are unique case-insensitively.

use crate::error::Result;
use crate::EaselDb;
use easel_protocol::{now_ms, BannedWord};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

impl EaselDb {
    /// Add a banned word. Returns false when the word (any casing) already
    /// exists.
    pub async fn add_banned_word(&self, word: &str, partial: bool, added_by: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO banned_words (word, partial, added_by, added_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(word)
        .bind(partial)
        .bind(added_by)
        .bind(now_ms())
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove a banned word, matching case-insensitively. Returns false
    /// when no such word was stored.
    pub async fn remove_banned_word(&self, word: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM banned_words WHERE word = ?")
            .bind(word)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_banned_words(&self) -> Result<Vec<BannedWord>> {
        let rows = sqlx::query("SELECT * FROM banned_words ORDER BY word")
            .fetch_all(self.pool())
            .await?;
        Ok(rows.iter().map(row_to_banned).collect())
    }
}

fn row_to_banned(row: &SqliteRow) -> BannedWord {
    BannedWord {
        word: row.get("word"),
        partial: row.get("partial"),
        added_by: row.get("added_by"),
        added_at: row.get("added_at"),
    }
}
