use std::sync::Arc;

use chrono::{DateTime, Utc};

use qbank_core::model::{PracticeSession, SessionId, UserId};
use storage::repository::SessionRepository;

use crate::error::EngineError;

/// What a mutator decided: persist the new state, or skip the write because
/// nothing changed (idempotent no-ops must not burn a version).
pub enum Mutation<T> {
    Write(T),
    Noop(T),
}

/// Concurrency-safe adapter over session persistence.
///
/// Every state change goes through a read → mutate → conditional-write loop:
/// the write is guarded on the version captured by the read (and on the
/// session still being active), and a failed guard restarts the loop from a
/// fresh read. Attempts are bounded; exhausting them is an internal error,
/// never a silent drop. No sleeping between attempts — conflicts come from
/// another device answering a different question and resolve immediately.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<dyn SessionRepository>,
    retry_limit: u32,
}

impl SessionStore {
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionRepository>, retry_limit: u32) -> Self {
        Self {
            sessions,
            retry_limit: retry_limit.max(1),
        }
    }

    /// Persist a freshly created session.
    ///
    /// # Errors
    ///
    /// `Conflict` if the id already exists; storage failures map through.
    pub async fn create(&self, session: &PracticeSession) -> Result<(), EngineError> {
        self.sessions.insert_session(session).await?;
        Ok(())
    }

    /// Fetch a session the caller owns. Foreign and missing sessions are
    /// both `NotFound` so ownership is never disclosed.
    ///
    /// # Errors
    ///
    /// `NotFound` if absent or owned by someone else.
    pub async fn load_owned(
        &self,
        id: SessionId,
        user_id: UserId,
    ) -> Result<PracticeSession, EngineError> {
        self.sessions
            .get_session(id)
            .await?
            .filter(|s| s.user_id() == user_id)
            .ok_or(EngineError::NotFound)
    }

    /// Run a state transition under the CAS protocol.
    ///
    /// The mutator is applied to a freshly read session on every attempt; it
    /// must be pure apart from the session it is handed. On a lost race the
    /// loop re-reads and re-applies, so the transition composes with
    /// concurrent writers instead of overwriting them.
    ///
    /// # Errors
    ///
    /// Whatever the mutator returns, `NotFound` for foreign sessions, and
    /// `Internal` once the bounded retries are exhausted.
    pub async fn update<T, F>(
        &self,
        id: SessionId,
        user_id: UserId,
        mutate: F,
    ) -> Result<(PracticeSession, T), EngineError>
    where
        F: Fn(&mut PracticeSession) -> Result<Mutation<T>, EngineError>,
    {
        for attempt in 0..self.retry_limit {
            let mut session = self.load_owned(id, user_id).await?;
            let expected_version = session.version();

            match mutate(&mut session)? {
                Mutation::Noop(value) => return Ok((session, value)),
                Mutation::Write(value) => {
                    let won = self
                        .sessions
                        .update_question_states(id, expected_version, session.states())
                        .await?;
                    if won {
                        session.bump_version();
                        return Ok((session, value));
                    }
                    tracing::debug!(session = %id, attempt, "lost session CAS race, retrying");
                }
            }
        }

        tracing::warn!(session = %id, retries = self.retry_limit, "session CAS retries exhausted");
        Err(EngineError::Internal(format!(
            "session update lost {} compare-and-swap races",
            self.retry_limit
        )))
    }

    /// Terminal end transition.
    ///
    /// # Errors
    ///
    /// `Conflict` when the session has already ended; `NotFound` for
    /// foreign sessions.
    pub async fn end(
        &self,
        id: SessionId,
        user_id: UserId,
        ended_at: DateTime<Utc>,
    ) -> Result<PracticeSession, EngineError> {
        let session = self.load_owned(id, user_id).await?;
        if !session.is_active() {
            return Err(EngineError::Conflict("session already ended".to_string()));
        }

        let won = self.sessions.end_session(id, ended_at).await?;
        if !won {
            // another handler ended it between our read and write
            return Err(EngineError::Conflict("session already ended".to_string()));
        }

        // re-read: the ended_at guard now blocks further state writes, so
        // this snapshot contains every answer that landed before the flip
        self.load_owned(id, user_id).await
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
