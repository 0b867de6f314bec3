use chrono::{DateTime, Utc};
use qbank_core::model::{IdempotencyKey, IdempotencyRecord};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{ser, u64_to_i64},
};
use crate::repository::{IdempotencyRepository, StorageError};

#[async_trait::async_trait]
impl IdempotencyRepository for SqliteRepository {
    async fn claim(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        // One statement, so the claim is atomic across processes: a plain
        // insert wins, a conflicting row is only taken over when its expiry
        // has passed. rows_affected distinguishes winner from loser.
        let result = sqlx::query(
            r"
            INSERT INTO idempotency_records (
                user_id, action, idem_key, result, error, claimed_at, expires_at
            )
            VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5)
            ON CONFLICT(user_id, action, idem_key) DO UPDATE SET
                result = NULL,
                error = NULL,
                claimed_at = excluded.claimed_at,
                expires_at = excluded.expires_at
            WHERE idempotency_records.expires_at <= excluded.claimed_at
            ",
        )
        .bind(u64_to_i64("user_id", key.user_id.value())?)
        .bind(&key.action)
        .bind(&key.key)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let claimed = result.rows_affected() == 1;
        tracing::debug!(
            action = %key.action,
            key = %key.key,
            claimed,
            "idempotency claim"
        );
        Ok(claimed)
    }

    async fn find(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT result, error, claimed_at, expires_at
            FROM idempotency_records
            WHERE user_id = ?1 AND action = ?2 AND idem_key = ?3 AND expires_at > ?4
            ",
        )
        .bind(u64_to_i64("user_id", key.user_id.value())?)
        .bind(&key.action)
        .bind(&key.key)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(IdempotencyRecord {
            key: key.clone(),
            result: row.try_get("result").map_err(ser)?,
            error: row.try_get("error").map_err(ser)?,
            claimed_at: row.try_get("claimed_at").map_err(ser)?,
            expires_at: row.try_get("expires_at").map_err(ser)?,
        }))
    }

    async fn store_result(
        &self,
        key: &IdempotencyKey,
        result_json: &str,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE idempotency_records
            SET result = ?4, error = NULL
            WHERE user_id = ?1 AND action = ?2 AND idem_key = ?3
            ",
        )
        .bind(u64_to_i64("user_id", key.user_id.value())?)
        .bind(&key.action)
        .bind(&key.key)
        .bind(result_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn store_error(
        &self,
        key: &IdempotencyKey,
        error_json: &str,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r"
            UPDATE idempotency_records
            SET error = ?4, result = NULL
            WHERE user_id = ?1 AND action = ?2 AND idem_key = ?3
            ",
        )
        .bind(u64_to_i64("user_id", key.user_id.value())?)
        .bind(&key.action)
        .bind(&key.key)
        .bind(error_json)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
