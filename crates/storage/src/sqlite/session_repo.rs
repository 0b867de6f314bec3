use chrono::{DateTime, Utc};
use qbank_core::model::{PracticeSession, QuestionId, QuestionState, SessionId};

use super::{
    SqliteRepository,
    mapping::{map_session_row, ser, u64_to_i64},
};
use crate::repository::{SessionRepository, StorageError};

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_session(&self, session: &PracticeSession) -> Result<(), StorageError> {
        let question_ids: Vec<QuestionId> = session.question_ids().collect();
        let ids_json = serde_json::to_string(&question_ids).map_err(ser)?;
        let states_json = serde_json::to_string(session.states()).map_err(ser)?;
        let filters_json = serde_json::to_string(session.filters()).map_err(ser)?;

        let result = sqlx::query(
            r"
            INSERT INTO practice_sessions (
                id, user_id, mode, question_ids, question_states, filters,
                started_at, ended_at, version
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
        )
        .bind(session.id().to_string())
        .bind(u64_to_i64("user_id", session.user_id().value())?)
        .bind(session.mode().as_str())
        .bind(ids_json)
        .bind(states_json)
        .bind(filters_json)
        .bind(session.started_at())
        .bind(session.ended_at())
        .bind(session.version())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StorageError::Conflict)
            }
            Err(e) => Err(StorageError::Connection(e.to_string())),
        }
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<PracticeSession>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, user_id, mode, question_ids, question_states, filters,
                   started_at, ended_at, version
            FROM practice_sessions
            WHERE id = ?1
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|row| map_session_row(&row)).transpose()
    }

    async fn update_question_states(
        &self,
        id: SessionId,
        expected_version: i64,
        states: &[QuestionState],
    ) -> Result<bool, StorageError> {
        let states_json = serde_json::to_string(states).map_err(ser)?;

        // Single-row conditional write: the version column and the
        // ended_at IS NULL predicate together form the CAS guard. Zero rows
        // affected means another writer won since our read.
        let result = sqlx::query(
            r"
            UPDATE practice_sessions
            SET question_states = ?2, version = version + 1
            WHERE id = ?1 AND version = ?3 AND ended_at IS NULL
            ",
        )
        .bind(id.to_string())
        .bind(states_json)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn end_session(
        &self,
        id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r"
            UPDATE practice_sessions
            SET ended_at = ?2, version = version + 1
            WHERE id = ?1 AND ended_at IS NULL
            ",
        )
        .bind(id.to_string())
        .bind(ended_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }
}
