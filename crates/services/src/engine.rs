use qbank_core::Clock;
use qbank_core::model::{
    Attempt, AttemptId, ChoiceId, PracticeMode, PracticeSession, QuestionFilters, QuestionId,
    SessionId, UserId,
};
use qbank_core::shuffle::{session_seed, shuffle_question_ids};
use std::sync::Arc;
use storage::repository::{
    AttemptRepository, BookmarkRepository, QuestionRepository, Storage,
};

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::idempotency::IdempotencyCoordinator;
use crate::selector::{NextQuestionRequest, QuestionSelector};
use crate::session_store::{Mutation, SessionStore};
use crate::view::{
    BookmarkOutcome, BookmarkRow, ChoiceExplanation, EndedSession, HistoryRow, MarkOutcome,
    QuestionHeadline, QuestionView, ReviewContent, SessionReview, SessionReviewRow, StartedSession,
    SubmitOutcome,
};

/// One answer submission.
#[derive(Debug, Clone)]
pub struct SubmitAnswerRequest {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
    pub session_id: Option<SessionId>,
    pub time_spent_seconds: Option<u32>,
    /// Caller-supplied key making retries of this submission safe.
    pub idempotency_key: Option<String>,
}

/// The practice session engine: use-case operations over injected storage.
///
/// Handlers are request-scoped and stateless; all session state lives in
/// shared storage, and every instance of this service tolerates concurrent
/// instances working the same rows.
#[derive(Clone)]
pub struct PracticeService {
    clock: Clock,
    config: EngineConfig,
    questions: Arc<dyn QuestionRepository>,
    attempts: Arc<dyn AttemptRepository>,
    bookmarks: Arc<dyn BookmarkRepository>,
    selector: QuestionSelector,
    store: SessionStore,
    idempotency: IdempotencyCoordinator,
}

impl PracticeService {
    #[must_use]
    pub fn new(clock: Clock, storage: &Storage, config: EngineConfig) -> Self {
        let selector = QuestionSelector::new(
            storage.questions.clone(),
            storage.sessions.clone(),
            storage.attempts.clone(),
        );
        let store = SessionStore::new(storage.sessions.clone(), config.cas_retry_limit());
        let idempotency = IdempotencyCoordinator::new(
            storage.idempotency.clone(),
            clock,
            config.idempotency_ttl(),
        );

        Self {
            clock,
            config,
            questions: storage.questions.clone(),
            attempts: storage.attempts.clone(),
            bookmarks: storage.bookmarks.clone(),
            selector,
            store,
            idempotency,
        }
    }

    //
    // ─── START ─────────────────────────────────────────────────────────────────
    //

    /// Start a new practice session.
    ///
    /// Candidates are collected filter-bound, shuffled with the session seed
    /// (user + creation time), and truncated to the requested count. The
    /// question order is fixed from here on.
    ///
    /// # Errors
    ///
    /// `Validation` for a zero or oversized count, `NotFound` when no
    /// published question matches the filters (no empty sessions).
    pub async fn start_session(
        &self,
        user_id: UserId,
        mode: PracticeMode,
        count: u32,
        filters: QuestionFilters,
    ) -> Result<StartedSession, EngineError> {
        if count == 0 {
            return Err(EngineError::Validation(
                "session must request at least one question".to_string(),
            ));
        }
        if count > self.config.max_session_questions() {
            return Err(EngineError::Validation(format!(
                "session may request at most {} questions",
                self.config.max_session_questions()
            )));
        }

        let candidates = self.selector.candidate_ids(&filters).await?;
        if candidates.is_empty() {
            return Err(EngineError::NotFound);
        }

        let now = self.clock.now();
        let seed = session_seed(user_id, now.timestamp_millis());
        let ids: Vec<QuestionId> = candidates.iter().map(|c| c.id).collect();
        let mut order = shuffle_question_ids(ids, seed);
        order.truncate(count as usize);

        let session = PracticeSession::new(
            SessionId::random(),
            user_id,
            mode,
            order,
            filters,
            now,
        )
        .map_err(EngineError::from)?;
        self.store.create(&session).await?;

        tracing::info!(
            session = %session.id(),
            user = %user_id,
            mode = mode.as_str(),
            questions = session.question_count(),
            "practice session started"
        );

        Ok(StartedSession {
            session_id: session.id(),
            mode,
            question_count: session.question_count() as u32,
        })
    }

    //
    // ─── NEXT QUESTION ─────────────────────────────────────────────────────────
    //

    /// Resolve the next question and shape it for display (per-user stable
    /// choice order, no grading data). `None` signals completion.
    ///
    /// # Errors
    ///
    /// See [`QuestionSelector::next_question`].
    pub async fn next_question(
        &self,
        user_id: UserId,
        request: NextQuestionRequest,
    ) -> Result<Option<QuestionView>, EngineError> {
        let question = self.selector.next_question(user_id, request).await?;
        Ok(question.map(|q| QuestionView::for_user(&q, user_id)))
    }

    //
    // ─── SUBMIT ────────────────────────────────────────────────────────────────
    //

    /// Grade a submitted answer, record the attempt, and — when a session is
    /// supplied — transition that question's state under the CAS protocol.
    ///
    /// With an idempotency key, retries replay the stored outcome instead of
    /// re-running the side effects.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown question/choice/session, `Conflict` for ended
    /// sessions, `Internal` when CAS retries are exhausted.
    pub async fn submit_answer(
        &self,
        request: SubmitAnswerRequest,
    ) -> Result<SubmitOutcome, EngineError> {
        match request.idempotency_key.clone() {
            Some(key) => {
                self.idempotency
                    .execute(request.user_id, "submit_answer", &key, || {
                        self.submit_answer_once(request.clone())
                    })
                    .await
            }
            None => self.submit_answer_once(request).await,
        }
    }

    async fn submit_answer_once(
        &self,
        request: SubmitAnswerRequest,
    ) -> Result<SubmitOutcome, EngineError> {
        let question = self
            .questions
            .get_published(request.question_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        let choice = question
            .choice(request.choice_id)
            .ok_or(EngineError::NotFound)?;
        let correct_choice = question.correct_choice().ok_or_else(|| {
            EngineError::Internal(format!(
                "question {} has no correct choice",
                question.id()
            ))
        })?;
        let is_correct = choice.id == correct_choice.id;
        let correct_choice_id = correct_choice.id;

        let now = self.clock.now();
        let attempt = Attempt::new(
            AttemptId::random(),
            request.user_id,
            request.question_id,
            request.session_id,
            request.choice_id,
            is_correct,
            request.time_spent_seconds,
            now,
        );

        let mut withhold_explanations = false;

        if let Some(session_id) = request.session_id {
            // validate ownership, activity, and membership before any write
            let session = self.store.load_owned(session_id, request.user_id).await?;
            if !session.is_active() {
                return Err(EngineError::Conflict("session already ended".to_string()));
            }
            if !session.contains_question(request.question_id) {
                return Err(EngineError::NotFound);
            }
            withhold_explanations = session.mode() == PracticeMode::Exam;

            // the attempt append and the state transition are one logical
            // transaction: a failed state write deletes the attempt again
            self.attempts.append_attempt(&attempt).await?;
            let state_write = self
                .store
                .update(session_id, request.user_id, |s| {
                    s.record_answer(request.question_id, request.choice_id, is_correct, now)?;
                    Ok(Mutation::Write(()))
                })
                .await;

            if let Err(e) = state_write {
                if let Err(rollback) = self.attempts.delete_attempt(attempt.id).await {
                    tracing::error!(
                        attempt = %attempt.id,
                        %rollback,
                        "failed to roll back attempt after state write failure"
                    );
                }
                return Err(e);
            }
        } else {
            self.attempts.append_attempt(&attempt).await?;
        }

        let (explanation_md, choice_explanations) = if withhold_explanations {
            (None, Vec::new())
        } else {
            (
                Some(question.explanation_md().to_string()),
                question
                    .choices()
                    .iter()
                    .map(|c| ChoiceExplanation {
                        choice_id: c.id,
                        label: c.label,
                        explanation_md: c.explanation_md.clone(),
                    })
                    .collect(),
            )
        };

        tracing::debug!(
            user = %request.user_id,
            question = %request.question_id,
            is_correct,
            "answer submitted"
        );

        Ok(SubmitOutcome {
            attempt_id: attempt.id,
            question_id: request.question_id,
            is_correct,
            correct_choice_id,
            explanation_md,
            choice_explanations,
        })
    }

    //
    // ─── MARK FOR REVIEW ───────────────────────────────────────────────────────
    //

    /// Toggle the marked-for-review flag on an exam-session question.
    /// Setting the same value twice is a no-op (no version burned).
    ///
    /// # Errors
    ///
    /// `Conflict` outside exam mode or after the session ended; `NotFound`
    /// for foreign sessions and non-member questions.
    pub async fn mark_for_review(
        &self,
        user_id: UserId,
        session_id: SessionId,
        question_id: QuestionId,
        marked: bool,
    ) -> Result<MarkOutcome, EngineError> {
        let (_session, _changed) = self
            .store
            .update(session_id, user_id, |s| {
                if s.mode() != PracticeMode::Exam {
                    return Err(EngineError::Conflict(
                        "mark for review is only available in exam mode".to_string(),
                    ));
                }
                let changed = s.set_marked_for_review(question_id, marked)?;
                Ok(if changed {
                    Mutation::Write(changed)
                } else {
                    Mutation::Noop(changed)
                })
            })
            .await?;

        Ok(MarkOutcome {
            question_id,
            marked_for_review: marked,
        })
    }

    //
    // ─── END ───────────────────────────────────────────────────────────────────
    //

    /// End the session and return totals computed strictly from the
    /// persisted per-question state.
    ///
    /// # Errors
    ///
    /// `Conflict` if already ended, `NotFound` for foreign sessions.
    pub async fn end_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<EndedSession, EngineError> {
        let now = self.clock.now();
        let session = self.store.end(session_id, user_id, now).await?;
        let ended_at = session
            .ended_at()
            .ok_or_else(|| EngineError::Internal("ended session without timestamp".to_string()))?;
        let totals = session.totals(now);

        tracing::info!(
            session = %session_id,
            user = %user_id,
            answered = totals.answered,
            correct = totals.correct,
            "practice session ended"
        );

        Ok(EndedSession {
            session_id,
            ended_at,
            totals,
        })
    }

    //
    // ─── REVIEW ────────────────────────────────────────────────────────────────
    //

    /// Per-question review of a session, including explanations.
    ///
    /// This is the read path where exam-mode explanations finally surface;
    /// an active exam session therefore refuses review. Questions that no
    /// longer resolve to published content become unavailable marker rows
    /// instead of failing the whole response.
    ///
    /// # Errors
    ///
    /// `NotFound` for foreign sessions, `Conflict` for an active exam
    /// session.
    pub async fn review_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
    ) -> Result<SessionReview, EngineError> {
        let session = self.store.load_owned(session_id, user_id).await?;
        if session.mode() == PracticeMode::Exam && session.is_active() {
            return Err(EngineError::Conflict(
                "exam review is available once the session has ended".to_string(),
            ));
        }

        let mut rows = Vec::with_capacity(session.question_count());
        for state in session.states() {
            let content = match self.questions.get_published(state.question_id).await? {
                Some(question) => {
                    let correct_choice = question.correct_choice().ok_or_else(|| {
                        EngineError::Internal(format!(
                            "question {} has no correct choice",
                            question.id()
                        ))
                    })?;
                    Some(ReviewContent {
                        correct_choice_id: correct_choice.id,
                        explanation_md: question.explanation_md().to_string(),
                        choice_explanations: question
                            .choices()
                            .iter()
                            .map(|c| ChoiceExplanation {
                                choice_id: c.id,
                                label: c.label,
                                explanation_md: c.explanation_md.clone(),
                            })
                            .collect(),
                        question: QuestionView::for_user(&question, user_id),
                    })
                }
                None => None,
            };
            rows.push(SessionReviewRow {
                question_id: state.question_id,
                state: state.clone(),
                content,
            });
        }

        Ok(SessionReview {
            session_id,
            mode: session.mode(),
            started_at: session.started_at(),
            ended_at: session.ended_at(),
            totals: session.totals(self.clock.now()),
            rows,
        })
    }

    //
    // ─── HISTORY & BOOKMARKS ───────────────────────────────────────────────────
    //

    /// Newest-first attempt history with question headlines. Missing
    /// content becomes unavailable marker rows.
    ///
    /// # Errors
    ///
    /// Storage failures map through `EngineError`.
    pub async fn attempt_history(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<HistoryRow>, EngineError> {
        let attempts = self.attempts.list_attempts(user_id, limit).await?;
        let mut rows = Vec::with_capacity(attempts.len());
        for attempt in attempts {
            let question = self
                .questions
                .get_published(attempt.question_id)
                .await?
                .map(|q| QuestionHeadline::from_question(&q));
            rows.push(HistoryRow {
                attempt_id: attempt.id,
                question_id: attempt.question_id,
                session_id: attempt.session_id,
                choice_id: attempt.choice_id,
                is_correct: attempt.is_correct,
                time_spent_seconds: attempt.time_spent_seconds,
                answered_at: attempt.answered_at,
                question,
            });
        }
        Ok(rows)
    }

    /// Set or clear a bookmark. Bookmarking requires the question to
    /// currently resolve; clearing always succeeds.
    ///
    /// # Errors
    ///
    /// `NotFound` when bookmarking a question that is not published.
    pub async fn set_bookmark(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        bookmarked: bool,
    ) -> Result<BookmarkOutcome, EngineError> {
        if bookmarked
            && self
                .questions
                .get_published(question_id)
                .await?
                .is_none()
        {
            return Err(EngineError::NotFound);
        }

        self.bookmarks
            .set_bookmark(user_id, question_id, bookmarked, self.clock.now())
            .await?;

        Ok(BookmarkOutcome {
            question_id,
            bookmarked,
        })
    }

    /// Newest-first bookmarks with question headlines; missing content
    /// becomes unavailable marker rows.
    ///
    /// # Errors
    ///
    /// Storage failures map through `EngineError`.
    pub async fn list_bookmarks(&self, user_id: UserId) -> Result<Vec<BookmarkRow>, EngineError> {
        let bookmarks = self.bookmarks.list_bookmarks(user_id).await?;
        let mut rows = Vec::with_capacity(bookmarks.len());
        for bookmark in bookmarks {
            let question = self
                .questions
                .get_published(bookmark.question_id)
                .await?
                .map(|q| QuestionHeadline::from_question(&q));
            rows.push(BookmarkRow {
                question_id: bookmark.question_id,
                created_at: bookmark.created_at,
                question,
            });
        }
        Ok(rows)
    }

    /// Maintenance: drop expired idempotency records.
    ///
    /// # Errors
    ///
    /// Storage failures map through `EngineError`.
    pub async fn prune_idempotency_records(&self) -> Result<u64, EngineError> {
        self.idempotency.prune_expired().await
    }
}
