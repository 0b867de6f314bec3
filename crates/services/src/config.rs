use chrono::Duration;

/// Tunables injected into the engine at construction. No ambient globals;
/// every handler instance gets its own copy.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    max_session_questions: u32,
    cas_retry_limit: u32,
    idempotency_ttl: Duration,
}

impl EngineConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on the requested question count for a new session.
    #[must_use]
    pub fn max_session_questions(&self) -> u32 {
        self.max_session_questions
    }

    /// Bounded attempts for the read-modify-write loop on session state.
    #[must_use]
    pub fn cas_retry_limit(&self) -> u32 {
        self.cas_retry_limit
    }

    /// How long an idempotency record shields retries before the key
    /// becomes reclaimable.
    #[must_use]
    pub fn idempotency_ttl(&self) -> Duration {
        self.idempotency_ttl
    }

    #[must_use]
    pub fn with_max_session_questions(mut self, max: u32) -> Self {
        self.max_session_questions = max;
        self
    }

    #[must_use]
    pub fn with_cas_retry_limit(mut self, limit: u32) -> Self {
        self.cas_retry_limit = limit.max(1);
        self
    }

    #[must_use]
    pub fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_session_questions: 100,
            cas_retry_limit: 3,
            idempotency_ttl: Duration::hours(24),
        }
    }
}
