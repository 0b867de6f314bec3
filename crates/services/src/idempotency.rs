use std::future::Future;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use qbank_core::Clock;
use qbank_core::model::{IdempotencyKey, UserId};
use storage::repository::IdempotencyRepository;

use crate::error::EngineError;

/// Stored failure outcome: enough to replay the original error class to a
/// retrying caller.
#[derive(Debug, Serialize, Deserialize)]
struct StoredError {
    code: String,
    message: String,
}

/// Wraps mutating operations so a retried client call with the same
/// caller-supplied key produces exactly one side effect.
///
/// Exactly one concurrent caller wins the claim and executes; the rest read
/// the stored outcome, or get a `Conflict` asking them to retry shortly when
/// the winner has not resolved yet. Expired records are reclaimable, so a
/// crash between claim and resolution cannot wedge the key forever.
#[derive(Clone)]
pub struct IdempotencyCoordinator {
    records: Arc<dyn IdempotencyRepository>,
    clock: Clock,
    ttl: Duration,
}

impl IdempotencyCoordinator {
    #[must_use]
    pub fn new(records: Arc<dyn IdempotencyRepository>, clock: Clock, ttl: Duration) -> Self {
        Self {
            records,
            clock,
            ttl,
        }
    }

    /// Run `op` at most once per `(user, action, key)` within the TTL.
    ///
    /// The winner's result is serialized and stored for replay; a failed
    /// winner stores its error instead, and retries replay that error
    /// rather than re-executing the side effect.
    ///
    /// # Errors
    ///
    /// The operation's own error (first call), the replayed stored error
    /// (retries), or `Conflict` when the outcome is not yet written.
    pub async fn execute<T, F, Fut>(
        &self,
        user_id: UserId,
        action: &str,
        key: &str,
        op: F,
    ) -> Result<T, EngineError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let key = IdempotencyKey::new(user_id, action, key);
        let now = self.clock.now();

        if self.records.claim(&key, now, now + self.ttl).await? {
            tracing::debug!(action, key = %key.key, "executing as idempotency winner");
            return match op().await {
                Ok(value) => {
                    let json = serde_json::to_string(&value).map_err(|e| {
                        EngineError::Internal(format!("failed to serialize idempotent result: {e}"))
                    })?;
                    self.records.store_result(&key, &json).await?;
                    Ok(value)
                }
                Err(e) => {
                    let stored = StoredError {
                        code: e.code().to_string(),
                        message: e.detail(),
                    };
                    // best effort: the caller gets the original error even
                    // if persisting the outcome fails
                    match serde_json::to_string(&stored) {
                        Ok(json) => {
                            if let Err(store_err) = self.records.store_error(&key, &json).await {
                                tracing::warn!(%store_err, "failed to store idempotent error");
                            }
                        }
                        Err(ser_err) => {
                            tracing::warn!(%ser_err, "failed to encode idempotent error");
                        }
                    }
                    Err(e)
                }
            };
        }

        let Some(record) = self.records.find(&key, now).await? else {
            // claimed by someone else but expired before we could read it
            return Err(EngineError::Conflict(
                "idempotent operation is unresolved; retry".to_string(),
            ));
        };

        if let Some(json) = &record.result {
            return serde_json::from_str(json).map_err(|e| {
                EngineError::Internal(format!("stored idempotent result is corrupt: {e}"))
            });
        }
        if let Some(json) = &record.error {
            let stored: StoredError = serde_json::from_str(json).map_err(|e| {
                EngineError::Internal(format!("stored idempotent error is corrupt: {e}"))
            })?;
            return Err(EngineError::from_code(&stored.code, stored.message));
        }

        // winner is still executing
        Err(EngineError::Conflict(
            "idempotent operation in flight; retry".to_string(),
        ))
    }

    /// Drop expired records. Maintenance path, never called per-request.
    ///
    /// # Errors
    ///
    /// Storage failures map through `EngineError`.
    pub async fn prune_expired(&self) -> Result<u64, EngineError> {
        let pruned = self.records.prune_expired(self.clock.now()).await?;
        if pruned > 0 {
            tracing::info!(pruned, "pruned expired idempotency records");
        }
        Ok(pruned)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
