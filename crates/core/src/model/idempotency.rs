use chrono::{DateTime, Utc};

use crate::model::ids::UserId;

/// Composite key scoping a logical mutation: the owning user, the action
/// name, and the caller-supplied key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub user_id: UserId,
    pub action: String,
    pub key: String,
}

impl IdempotencyKey {
    #[must_use]
    pub fn new(user_id: UserId, action: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            user_id,
            action: action.into(),
            key: key.into(),
        }
    }
}

/// Stored outcome of a claimed idempotency key.
///
/// Lifecycle: claimed (no result or error yet) → resolved (one of the two
/// payloads stored) → expired (ignored by readers, reclaimable by writers).
/// Payloads are carried as pre-serialized JSON strings; the coordinator in
/// the services layer owns the encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub result: Option<String>,
    pub error: Option<String>,
    pub claimed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// A freshly claimed record with no outcome yet.
    #[must_use]
    pub fn claimed(key: IdempotencyKey, claimed_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            key,
            result: None,
            error: None,
            claimed_at,
            expires_at,
        }
    }

    /// Whether a resolved or failed outcome has been stored.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    /// Expired records are invisible to readers and reclaimable by writers,
    /// so a claim that crashed mid-operation cannot block retries forever.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    #[test]
    fn fresh_claim_is_unresolved() {
        let key = IdempotencyKey::new(UserId::new(1), "submit_answer", "abc");
        let record =
            IdempotencyRecord::claimed(key, fixed_now(), fixed_now() + Duration::hours(24));
        assert!(!record.is_resolved());
        assert!(!record.is_expired(fixed_now()));
    }

    #[test]
    fn expiry_is_inclusive_at_the_boundary() {
        let key = IdempotencyKey::new(UserId::new(1), "submit_answer", "abc");
        let expires = fixed_now() + Duration::minutes(5);
        let record = IdempotencyRecord::claimed(key, fixed_now(), expires);
        assert!(record.is_expired(expires));
        assert!(!record.is_expired(expires - Duration::seconds(1)));
    }
}
