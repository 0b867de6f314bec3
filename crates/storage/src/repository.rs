use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qbank_core::model::{
    Attempt, AttemptId, IdempotencyKey, IdempotencyRecord, PracticeSession, Question,
    QuestionFilters, QuestionId, QuestionState, SessionId, UserId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Lightweight candidate row for the question selector: enough to apply the
/// novelty/staleness priority without fetching full question bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateQuestion {
    pub id: QuestionId,
    pub created_at: DateTime<Utc>,
}

/// A user's saved question, as listed by the bookmark read path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkRecord {
    pub question_id: QuestionId,
    pub created_at: DateTime<Utc>,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Published-question lookup and filtered candidate listing. The question
/// content itself is owned by an external pipeline; the engine only reads,
/// except for the seeder/tests which use `upsert_question`.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist or update a question (seeder and tests).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Fetch a question regardless of publication status.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; absence is `Ok(None)`.
    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;

    /// Fetch a question only if it is currently published.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; absence is `Ok(None)`.
    async fn get_published(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;

    /// List published candidates matching the filters, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_published_candidates(
        &self,
        filters: &QuestionFilters,
    ) -> Result<Vec<CandidateQuestion>, StorageError>;
}

/// Practice-session persistence with optimistic concurrency.
///
/// The per-question state array lives inside the session row and is replaced
/// wholesale by `update_question_states`; both mutating calls are
/// compare-and-swap operations that report whether the guard matched instead
/// of blindly overwriting.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a freshly created session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists.
    async fn insert_session(&self, session: &PracticeSession) -> Result<(), StorageError>;

    /// Fetch a session by id. Ownership checks are the caller's concern.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures; absence is `Ok(None)`.
    async fn get_session(&self, id: SessionId) -> Result<Option<PracticeSession>, StorageError>;

    /// Replace the full question-state array, guarded on
    /// `version = expected_version AND ended_at IS NULL`.
    ///
    /// Returns `false` when the guard did not match (another writer won or
    /// the session ended); the caller retries from a fresh read.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures, including a state array
    /// that does not cover the session's question list.
    async fn update_question_states(
        &self,
        id: SessionId,
        expected_version: i64,
        states: &[QuestionState],
    ) -> Result<bool, StorageError>;

    /// Terminal transition to ended, guarded on `ended_at IS NULL`.
    ///
    /// Returns `false` when the session had already ended.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn end_session(
        &self,
        id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;
}

/// Append-only attempt audit log.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Append one attempt row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StorageError>;

    /// Remove an attempt row. Only used as the compensating rollback of the
    /// answer transaction when the session-state write fails after the
    /// attempt was appended.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row does not exist.
    async fn delete_attempt(&self, id: AttemptId) -> Result<(), StorageError>;

    /// Most recent attempt time per question, for the given user and
    /// question set. Questions never attempted are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn last_attempt_times(
        &self,
        user_id: UserId,
        question_ids: &[QuestionId],
    ) -> Result<HashMap<QuestionId, DateTime<Utc>>, StorageError>;

    /// Newest-first attempts for a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_attempts(&self, user_id: UserId, limit: u32)
        -> Result<Vec<Attempt>, StorageError>;
}

/// Single-row atomic claim/find/store operations for idempotency records.
/// Correctness must hold across independent processes, so implementations
/// may not rely on in-process locks alone when the backing store is shared.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Atomically claim the key. Returns `true` when the caller became the
    /// executor — the key was absent, or its previous record had expired and
    /// was reclaimed. Exactly one concurrent caller sees `true`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn claim(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Fetch the non-expired record for the key, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn find(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, StorageError>;

    /// Store the successful outcome for a claimed key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the key was never claimed.
    async fn store_result(
        &self,
        key: &IdempotencyKey,
        result_json: &str,
    ) -> Result<(), StorageError>;

    /// Store the failure outcome for a claimed key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the key was never claimed.
    async fn store_error(&self, key: &IdempotencyKey, error_json: &str)
        -> Result<(), StorageError>;

    /// Delete expired records. Maintenance only, never on the request path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError>;
}

/// Per-user saved questions.
#[async_trait]
pub trait BookmarkRepository: Send + Sync {
    /// Set or clear a bookmark. Returns whether anything changed, so setting
    /// the same value twice is observably a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn set_bookmark(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        bookmarked: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Newest-first bookmarks for a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failures.
    async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<BookmarkRecord>, StorageError>;
}

//
// ─── IN-MEMORY IMPLEMENTATION ──────────────────────────────────────────────────
//

#[derive(Default)]
struct InMemoryState {
    questions: HashMap<QuestionId, Question>,
    sessions: HashMap<SessionId, PracticeSession>,
    attempts: Vec<Attempt>,
    idempotency: HashMap<(UserId, String, String), IdempotencyRecord>,
    bookmarks: HashMap<(UserId, QuestionId), DateTime<Utc>>,
}

/// Simple in-memory repository for testing and prototyping.
///
/// A single mutex over the whole state makes every operation atomic, which
/// is exactly the consistency the CAS and claim contracts demand.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, InMemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn idem_key(key: &IdempotencyKey) -> (UserId, String, String) {
    (key.user_id, key.action.clone(), key.key.clone())
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.questions.insert(question.id(), question.clone());
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let state = self.lock()?;
        Ok(state.questions.get(&id).cloned())
    }

    async fn get_published(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .questions
            .get(&id)
            .filter(|q| q.is_published())
            .cloned())
    }

    async fn list_published_candidates(
        &self,
        filters: &QuestionFilters,
    ) -> Result<Vec<CandidateQuestion>, StorageError> {
        let state = self.lock()?;
        let mut candidates: Vec<CandidateQuestion> = state
            .questions
            .values()
            .filter(|q| q.is_published() && filters.matches(q))
            .map(|q| CandidateQuestion {
                id: q.id(),
                created_at: q.created_at(),
            })
            .collect();
        candidates.sort_by_key(|c| c.id);
        Ok(candidates)
    }
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_session(&self, session: &PracticeSession) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if state.sessions.contains_key(&session.id()) {
            return Err(StorageError::Conflict);
        }
        state.sessions.insert(session.id(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<PracticeSession>, StorageError> {
        let state = self.lock()?;
        Ok(state.sessions.get(&id).cloned())
    }

    async fn update_question_states(
        &self,
        id: SessionId,
        expected_version: i64,
        states: &[QuestionState],
    ) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let Some(existing) = state.sessions.get(&id) else {
            return Err(StorageError::NotFound);
        };
        if !existing.is_active() || existing.version() != expected_version {
            return Ok(false);
        }

        let question_ids: Vec<QuestionId> = existing.question_ids().collect();
        let updated = PracticeSession::from_persisted(
            existing.id(),
            existing.user_id(),
            existing.mode(),
            question_ids,
            existing.filters().clone(),
            states.to_vec(),
            existing.started_at(),
            existing.ended_at(),
            existing.version() + 1,
        )
        .map_err(|e| StorageError::Serialization(e.to_string()))?;

        state.sessions.insert(id, updated);
        Ok(true)
    }

    async fn end_session(
        &self,
        id: SessionId,
        ended_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let Some(existing) = state.sessions.get_mut(&id) else {
            return Err(StorageError::NotFound);
        };
        if existing.end(ended_at).is_err() {
            return Ok(false);
        }
        existing.bump_version();
        Ok(true)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn append_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state.attempts.push(attempt.clone());
        Ok(())
    }

    async fn delete_attempt(&self, id: AttemptId) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let before = state.attempts.len();
        state.attempts.retain(|a| a.id != id);
        if state.attempts.len() == before {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn last_attempt_times(
        &self,
        user_id: UserId,
        question_ids: &[QuestionId],
    ) -> Result<HashMap<QuestionId, DateTime<Utc>>, StorageError> {
        let state = self.lock()?;
        let mut latest: HashMap<QuestionId, DateTime<Utc>> = HashMap::new();
        for attempt in state
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id && question_ids.contains(&a.question_id))
        {
            latest
                .entry(attempt.question_id)
                .and_modify(|t| {
                    if attempt.answered_at > *t {
                        *t = attempt.answered_at;
                    }
                })
                .or_insert(attempt.answered_at);
        }
        Ok(latest)
    }

    async fn list_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let state = self.lock()?;
        let mut attempts: Vec<Attempt> = state
            .attempts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        attempts.sort_by(|a, b| b.answered_at.cmp(&a.answered_at));
        attempts.truncate(limit as usize);
        Ok(attempts)
    }
}

#[async_trait]
impl IdempotencyRepository for InMemoryRepository {
    async fn claim(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let map_key = idem_key(key);
        let reclaimable = state
            .idempotency
            .get(&map_key)
            .is_none_or(|existing| existing.is_expired(now));
        if !reclaimable {
            return Ok(false);
        }
        state.idempotency.insert(
            map_key,
            IdempotencyRecord::claimed(key.clone(), now, expires_at),
        );
        Ok(true)
    }

    async fn find(
        &self,
        key: &IdempotencyKey,
        now: DateTime<Utc>,
    ) -> Result<Option<IdempotencyRecord>, StorageError> {
        let state = self.lock()?;
        Ok(state
            .idempotency
            .get(&idem_key(key))
            .filter(|r| !r.is_expired(now))
            .cloned())
    }

    async fn store_result(
        &self,
        key: &IdempotencyKey,
        result_json: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let record = state
            .idempotency
            .get_mut(&idem_key(key))
            .ok_or(StorageError::NotFound)?;
        record.result = Some(result_json.to_string());
        record.error = None;
        Ok(())
    }

    async fn store_error(
        &self,
        key: &IdempotencyKey,
        error_json: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        let record = state
            .idempotency
            .get_mut(&idem_key(key))
            .ok_or(StorageError::NotFound)?;
        record.error = Some(error_json.to_string());
        record.result = None;
        Ok(())
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, StorageError> {
        let mut state = self.lock()?;
        let before = state.idempotency.len();
        state.idempotency.retain(|_, r| !r.is_expired(now));
        Ok((before - state.idempotency.len()) as u64)
    }
}

#[async_trait]
impl BookmarkRepository for InMemoryRepository {
    async fn set_bookmark(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        bookmarked: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut state = self.lock()?;
        let key = (user_id, question_id);
        if bookmarked {
            if state.bookmarks.contains_key(&key) {
                return Ok(false);
            }
            state.bookmarks.insert(key, now);
            Ok(true)
        } else {
            Ok(state.bookmarks.remove(&key).is_some())
        }
    }

    async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<BookmarkRecord>, StorageError> {
        let state = self.lock()?;
        let mut rows: Vec<BookmarkRecord> = state
            .bookmarks
            .iter()
            .filter(|((uid, _), _)| *uid == user_id)
            .map(|((_, qid), created_at)| BookmarkRecord {
                question_id: *qid,
                created_at: *created_at,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.question_id.cmp(&a.question_id))
        });
        Ok(rows)
    }
}

//
// ─── STORAGE AGGREGATE ─────────────────────────────────────────────────────────
//

/// Bundles the repository handles behind trait objects so backends can be
/// swapped without touching the services layer.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub idempotency: Arc<dyn IdempotencyRepository>,
    pub bookmarks: Arc<dyn BookmarkRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            questions: Arc::new(repo.clone()),
            sessions: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            idempotency: Arc::new(repo.clone()),
            bookmarks: Arc::new(repo),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use qbank_core::model::{
        Choice, ChoiceId, ChoiceLabel, Difficulty, PracticeMode, QuestionStatus, TagSlug,
    };
    use qbank_core::time::fixed_now;

    fn build_question(id: u64, status: QuestionStatus) -> Question {
        let choices = vec![
            Choice {
                id: ChoiceId::new(1),
                label: ChoiceLabel::A,
                text: "right".into(),
                is_correct: true,
                explanation_md: None,
                sort_order: 0,
            },
            Choice {
                id: ChoiceId::new(2),
                label: ChoiceLabel::B,
                text: "wrong".into(),
                is_correct: false,
                explanation_md: None,
                sort_order: 1,
            },
        ];
        Question::new(
            QuestionId::new(id),
            format!("question-{id}"),
            "stem",
            "explanation",
            Difficulty::Medium,
            status,
            choices,
            vec![TagSlug::new("general").unwrap()],
            fixed_now(),
        )
        .unwrap()
    }

    fn build_session(question_ids: &[u64]) -> PracticeSession {
        PracticeSession::new(
            SessionId::random(),
            UserId::new(1),
            PracticeMode::Exam,
            question_ids.iter().copied().map(QuestionId::new).collect(),
            QuestionFilters::any(),
            fixed_now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn published_filter_hides_drafts() {
        let repo = InMemoryRepository::new();
        repo.upsert_question(&build_question(1, QuestionStatus::Published))
            .await
            .unwrap();
        repo.upsert_question(&build_question(2, QuestionStatus::Draft))
            .await
            .unwrap();

        assert!(repo.get_published(QuestionId::new(1)).await.unwrap().is_some());
        assert!(repo.get_published(QuestionId::new(2)).await.unwrap().is_none());
        assert!(repo.get_question(QuestionId::new(2)).await.unwrap().is_some());

        let candidates = repo
            .list_published_candidates(&QuestionFilters::any())
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, QuestionId::new(1));
    }

    #[tokio::test]
    async fn cas_update_rejects_stale_version() {
        let repo = InMemoryRepository::new();
        let session = build_session(&[1, 2]);
        repo.insert_session(&session).await.unwrap();

        let mut fresh = repo.get_session(session.id()).await.unwrap().unwrap();
        fresh
            .record_answer(QuestionId::new(1), ChoiceId::new(1), true, fixed_now())
            .unwrap();
        assert!(repo
            .update_question_states(session.id(), fresh.version(), fresh.states())
            .await
            .unwrap());

        // a second writer still holding version 0 must lose
        assert!(!repo
            .update_question_states(session.id(), 0, session.states())
            .await
            .unwrap());

        let stored = repo.get_session(session.id()).await.unwrap().unwrap();
        assert_eq!(stored.version(), 1);
        assert!(stored.state(QuestionId::new(1)).unwrap().is_answered());
    }

    #[tokio::test]
    async fn end_session_is_terminal() {
        let repo = InMemoryRepository::new();
        let session = build_session(&[1]);
        repo.insert_session(&session).await.unwrap();

        assert!(repo.end_session(session.id(), fixed_now()).await.unwrap());
        assert!(!repo.end_session(session.id(), fixed_now()).await.unwrap());

        // state writes against an ended session fail the guard
        assert!(!repo
            .update_question_states(session.id(), 1, session.states())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_expiry() {
        let repo = InMemoryRepository::new();
        let key = IdempotencyKey::new(UserId::new(1), "submit_answer", "k1");
        let now = fixed_now();
        let expires = now + Duration::hours(1);

        assert!(repo.claim(&key, now, expires).await.unwrap());
        assert!(!repo.claim(&key, now, expires).await.unwrap());

        // after expiry the key is reclaimable
        let later = expires + Duration::seconds(1);
        assert!(repo
            .claim(&key, later, later + Duration::hours(1))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn stored_result_is_readable_until_expiry() {
        let repo = InMemoryRepository::new();
        let key = IdempotencyKey::new(UserId::new(1), "submit_answer", "k1");
        let now = fixed_now();
        let expires = now + Duration::hours(1);

        repo.claim(&key, now, expires).await.unwrap();
        repo.store_result(&key, "{\"ok\":true}").await.unwrap();

        let record = repo.find(&key, now).await.unwrap().unwrap();
        assert_eq!(record.result.as_deref(), Some("{\"ok\":true}"));
        assert!(record.is_resolved());

        assert!(repo
            .find(&key, expires + Duration::seconds(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn prune_removes_only_expired_records() {
        let repo = InMemoryRepository::new();
        let now = fixed_now();
        let live = IdempotencyKey::new(UserId::new(1), "submit_answer", "live");
        let dead = IdempotencyKey::new(UserId::new(1), "submit_answer", "dead");
        repo.claim(&live, now, now + Duration::hours(1)).await.unwrap();
        repo.claim(&dead, now, now + Duration::seconds(1)).await.unwrap();

        let pruned = repo.prune_expired(now + Duration::minutes(1)).await.unwrap();
        assert_eq!(pruned, 1);
        assert!(repo.find(&live, now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn attempt_rollback_removes_the_row() {
        let repo = InMemoryRepository::new();
        let attempt = Attempt::new(
            AttemptId::random(),
            UserId::new(1),
            QuestionId::new(1),
            None,
            ChoiceId::new(1),
            true,
            None,
            fixed_now(),
        );
        repo.append_attempt(&attempt).await.unwrap();
        repo.delete_attempt(attempt.id).await.unwrap();
        assert!(repo.list_attempts(UserId::new(1), 10).await.unwrap().is_empty());

        let err = repo.delete_attempt(attempt.id).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn last_attempt_times_keeps_the_latest() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let q1 = QuestionId::new(1);
        for (secs, correct) in [(0, false), (60, true)] {
            repo.append_attempt(&Attempt::new(
                AttemptId::random(),
                user,
                q1,
                None,
                ChoiceId::new(1),
                correct,
                None,
                fixed_now() + Duration::seconds(secs),
            ))
            .await
            .unwrap();
        }

        let times = repo.last_attempt_times(user, &[q1]).await.unwrap();
        assert_eq!(times[&q1], fixed_now() + Duration::seconds(60));
    }

    #[tokio::test]
    async fn bookmark_toggle_reports_changes() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let q1 = QuestionId::new(1);

        assert!(repo.set_bookmark(user, q1, true, fixed_now()).await.unwrap());
        assert!(!repo.set_bookmark(user, q1, true, fixed_now()).await.unwrap());
        assert_eq!(repo.list_bookmarks(user).await.unwrap().len(), 1);
        assert!(repo.set_bookmark(user, q1, false, fixed_now()).await.unwrap());
        assert!(!repo.set_bookmark(user, q1, false, fixed_now()).await.unwrap());
        assert!(repo.list_bookmarks(user).await.unwrap().is_empty());
    }
}
