use chrono::{DateTime, Utc};
use qbank_core::model::{QuestionId, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{question_id_from_i64, ser, u64_to_i64},
};
use crate::repository::{BookmarkRecord, BookmarkRepository, StorageError};

#[async_trait::async_trait]
impl BookmarkRepository for SqliteRepository {
    async fn set_bookmark(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        bookmarked: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let user = u64_to_i64("user_id", user_id.value())?;
        let question = u64_to_i64("question_id", question_id.value())?;

        let result = if bookmarked {
            sqlx::query(
                r"
                INSERT INTO bookmarks (user_id, question_id, created_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, question_id) DO NOTHING
                ",
            )
            .bind(user)
            .bind(question)
            .bind(now)
            .execute(&self.pool)
            .await
        } else {
            sqlx::query("DELETE FROM bookmarks WHERE user_id = ?1 AND question_id = ?2")
                .bind(user)
                .bind(question)
                .execute(&self.pool)
                .await
        }
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<BookmarkRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id, created_at
            FROM bookmarks
            WHERE user_id = ?1
            ORDER BY created_at DESC, question_id DESC
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut bookmarks = Vec::with_capacity(rows.len());
        for row in rows {
            bookmarks.push(BookmarkRecord {
                question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
                created_at: row.try_get("created_at").map_err(ser)?,
            });
        }
        Ok(bookmarks)
    }
}
