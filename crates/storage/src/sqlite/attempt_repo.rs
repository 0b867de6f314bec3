use chrono::{DateTime, Utc};
use qbank_core::model::{Attempt, AttemptId, QuestionId, UserId};
use sqlx::Row;
use std::collections::HashMap;

use super::{
    SqliteRepository,
    mapping::{map_attempt_row, question_id_from_i64, ser, u64_to_i64},
};
use crate::repository::{AttemptRepository, StorageError};

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO attempts (
                id, user_id, question_id, session_id, choice_id,
                is_correct, time_spent_seconds, answered_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(attempt.id.to_string())
        .bind(u64_to_i64("user_id", attempt.user_id.value())?)
        .bind(u64_to_i64("question_id", attempt.question_id.value())?)
        .bind(attempt.session_id.map(|s| s.to_string()))
        .bind(u64_to_i64("choice_id", attempt.choice_id.value())?)
        .bind(i64::from(attempt.is_correct))
        .bind(attempt.time_spent_seconds.map(i64::from))
        .bind(attempt.answered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn delete_attempt(&self, id: AttemptId) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM attempts WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn last_attempt_times(
        &self,
        user_id: UserId,
        question_ids: &[QuestionId],
    ) -> Result<HashMap<QuestionId, DateTime<Utc>>, StorageError> {
        if question_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut sql = String::from(
            r"
            SELECT question_id, MAX(answered_at) AS last_answered_at
            FROM attempts
            WHERE user_id = ?1 AND question_id IN (
            ",
        );
        for i in 0..question_ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 2).to_string());
        }
        sql.push_str(")\nGROUP BY question_id");

        let mut query = sqlx::query(&sql).bind(u64_to_i64("user_id", user_id.value())?);
        for id in question_ids {
            query = query.bind(u64_to_i64("question_id", id.value())?);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut latest = HashMap::with_capacity(rows.len());
        for row in rows {
            let question_id = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
            let answered_at: DateTime<Utc> = row.try_get("last_answered_at").map_err(ser)?;
            latest.insert(question_id, answered_at);
        }
        Ok(latest)
    }

    async fn list_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, user_id, question_id, session_id, choice_id,
                   is_correct, time_spent_seconds, answered_at
            FROM attempts
            WHERE user_id = ?1
            ORDER BY answered_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(u64_to_i64("user_id", user_id.value())?)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            attempts.push(map_attempt_row(&row)?);
        }
        Ok(attempts)
    }
}
