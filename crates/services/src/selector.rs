use std::sync::Arc;

use chrono::{DateTime, Utc};

use qbank_core::model::{Question, QuestionFilters, QuestionId, SessionId, UserId};
use storage::repository::{
    AttemptRepository, CandidateQuestion, QuestionRepository, SessionRepository,
};

use crate::error::EngineError;

/// The two ways a next question can be requested, as a tagged variant so
/// call sites stay exhaustiveness-checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextQuestionRequest {
    /// Walk an existing session: its first unanswered question, or a
    /// caller-specified member of the session.
    InSession {
        session_id: SessionId,
        target: Option<QuestionId>,
    },
    /// Ad-hoc practice without a session, driven by filters and the user's
    /// attempt history.
    ByFilters { filters: QuestionFilters },
}

/// Picks the next candidate question for a user.
#[derive(Clone)]
pub struct QuestionSelector {
    questions: Arc<dyn QuestionRepository>,
    sessions: Arc<dyn SessionRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl QuestionSelector {
    #[must_use]
    pub fn new(
        questions: Arc<dyn QuestionRepository>,
        sessions: Arc<dyn SessionRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            questions,
            sessions,
            attempts,
        }
    }

    /// Published candidates matching the filters, in canonical id order.
    /// Session start feeds these ids to the seeded shuffle.
    ///
    /// # Errors
    ///
    /// Storage failures map through `EngineError`.
    pub async fn candidate_ids(
        &self,
        filters: &QuestionFilters,
    ) -> Result<Vec<CandidateQuestion>, EngineError> {
        let candidates = self.questions.list_published_candidates(filters).await?;
        Ok(candidates)
    }

    /// Resolve the next question for the user.
    ///
    /// `Ok(None)` is the completion signal: every session question is
    /// answered, or no published candidate matches the filters. A chosen id
    /// that no longer resolves to a published question (content changed
    /// under us) is `NotFound`.
    ///
    /// # Errors
    ///
    /// `NotFound` for missing/foreign sessions, non-member targets, and the
    /// unpublished race; storage failures map through `EngineError`.
    pub async fn next_question(
        &self,
        user_id: UserId,
        request: NextQuestionRequest,
    ) -> Result<Option<Question>, EngineError> {
        match request {
            NextQuestionRequest::InSession { session_id, target } => {
                self.next_in_session(user_id, session_id, target).await
            }
            NextQuestionRequest::ByFilters { filters } => {
                self.next_by_filters(user_id, &filters).await
            }
        }
    }

    async fn next_in_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        target: Option<QuestionId>,
    ) -> Result<Option<Question>, EngineError> {
        let session = self
            .sessions
            .get_session(session_id)
            .await?
            .filter(|s| s.user_id() == user_id)
            .ok_or(EngineError::NotFound)?;

        let question_id = match target {
            Some(id) => {
                if !session.contains_question(id) {
                    return Err(EngineError::NotFound);
                }
                id
            }
            None => match session.first_unanswered() {
                Some(id) => id,
                // every question answered: completion, not an error
                None => return Ok(None),
            },
        };

        let question = self
            .questions
            .get_published(question_id)
            .await?
            .ok_or(EngineError::NotFound)?;
        Ok(Some(question))
    }

    async fn next_by_filters(
        &self,
        user_id: UserId,
        filters: &QuestionFilters,
    ) -> Result<Option<Question>, EngineError> {
        let candidates = self.questions.list_published_candidates(filters).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let ids: Vec<QuestionId> = candidates.iter().map(|c| c.id).collect();
        let last_attempts = self.attempts.last_attempt_times(user_id, &ids).await?;

        // Priority 1: anything never attempted, newest-created first, then
        // highest id as the deterministic tiebreak.
        let fresh = candidates
            .iter()
            .filter(|c| !last_attempts.contains_key(&c.id))
            .max_by_key(|c| (c.created_at, c.id));

        let chosen = match fresh {
            Some(candidate) => candidate.id,
            // Priority 2: all attempted — pick the one untouched the
            // longest (oldest most-recent attempt), lowest id on ties.
            None => {
                let stalest = candidates.iter().min_by_key(|c| {
                    let last = last_attempts
                        .get(&c.id)
                        .copied()
                        .unwrap_or(DateTime::<Utc>::MIN_UTC);
                    (last, c.id)
                });
                match stalest {
                    Some(candidate) => candidate.id,
                    None => return Ok(None),
                }
            }
        };

        tracing::debug!(user = %user_id, question = %chosen, "selector picked candidate");

        // Re-fetch for display; losing the race with content changes is a
        // hard NotFound rather than a silent skip.
        let question = self
            .questions
            .get_published(chosen)
            .await?
            .ok_or(EngineError::NotFound)?;
        Ok(Some(question))
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
        Attempt, AttemptId, Choice, ChoiceId, ChoiceLabel, Difficulty, PracticeMode,
        PracticeSession, QuestionStatus, TagSlug,
    };
    use qbank_core::time::fixed_now;
    use storage::repository::Storage;

    fn build_selector() -> (Storage, QuestionSelector) {
        let storage = Storage::in_memory();
        let selector = QuestionSelector::new(
            storage.questions.clone(),
            storage.sessions.clone(),
            storage.attempts.clone(),
        );
        (storage, selector)
    }

    fn build_question(id: u64, created_offset_secs: i64) -> Question {
        let choices = vec![
            Choice {
                id: ChoiceId::new(id * 10 + 1),
                label: ChoiceLabel::A,
                text: "right".into(),
                is_correct: true,
                explanation_md: None,
                sort_order: 0,
            },
            Choice {
                id: ChoiceId::new(id * 10 + 2),
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
            QuestionStatus::Published,
            choices,
            vec![TagSlug::new("general").unwrap()],
            fixed_now() + Duration::seconds(created_offset_secs),
        )
        .unwrap()
    }

    async fn attempt(storage: &Storage, user: u64, question: u64, at_offset_secs: i64) {
        storage
            .attempts
            .append_attempt(&Attempt::new(
                AttemptId::random(),
                UserId::new(user),
                QuestionId::new(question),
                None,
                ChoiceId::new(question * 10 + 1),
                true,
                None,
                fixed_now() + Duration::seconds(at_offset_secs),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn prefers_never_attempted_newest_first() {
        let (storage, selector) = build_selector();
        for (id, created) in [(1, 0), (2, 100), (3, 50)] {
            storage
                .questions
                .upsert_question(&build_question(id, created))
                .await
                .unwrap();
        }
        // question 2 is newest and untouched
        attempt(&storage, 7, 1, 10).await;

        let picked = selector
            .next_question(
                UserId::new(7),
                NextQuestionRequest::ByFilters {
                    filters: QuestionFilters::any(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id(), QuestionId::new(2));
    }

    #[tokio::test]
    async fn falls_back_to_longest_untouched() {
        let (storage, selector) = build_selector();
        for id in 1..=3 {
            storage
                .questions
                .upsert_question(&build_question(id, 0))
                .await
                .unwrap();
        }
        attempt(&storage, 7, 1, 300).await;
        attempt(&storage, 7, 2, 100).await; // oldest most-recent attempt
        attempt(&storage, 7, 3, 200).await;

        let picked = selector
            .next_question(
                UserId::new(7),
                NextQuestionRequest::ByFilters {
                    filters: QuestionFilters::any(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id(), QuestionId::new(2));
    }

    #[tokio::test]
    async fn attempt_history_is_per_user() {
        let (storage, selector) = build_selector();
        storage
            .questions
            .upsert_question(&build_question(1, 0))
            .await
            .unwrap();
        storage
            .questions
            .upsert_question(&build_question(2, 50))
            .await
            .unwrap();
        // another user's attempts must not count against this user
        attempt(&storage, 99, 2, 10).await;

        let picked = selector
            .next_question(
                UserId::new(7),
                NextQuestionRequest::ByFilters {
                    filters: QuestionFilters::any(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id(), QuestionId::new(2));
    }

    #[tokio::test]
    async fn no_candidates_is_completion_not_error() {
        let (_storage, selector) = build_selector();
        let picked = selector
            .next_question(
                UserId::new(7),
                NextQuestionRequest::ByFilters {
                    filters: QuestionFilters::any(),
                },
            )
            .await
            .unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn session_walk_returns_first_unanswered_then_none() {
        let (storage, selector) = build_selector();
        for id in 1..=2 {
            storage
                .questions
                .upsert_question(&build_question(id, 0))
                .await
                .unwrap();
        }
        let mut session = PracticeSession::new(
            SessionId::random(),
            UserId::new(7),
            PracticeMode::Tutor,
            vec![QuestionId::new(2), QuestionId::new(1)],
            QuestionFilters::any(),
            fixed_now(),
        )
        .unwrap();
        storage.sessions.insert_session(&session).await.unwrap();

        let request = NextQuestionRequest::InSession {
            session_id: session.id(),
            target: None,
        };
        let picked = selector
            .next_question(UserId::new(7), request.clone())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked.id(), QuestionId::new(2));

        // answer both, CAS through the repository
        session
            .record_answer(QuestionId::new(2), ChoiceId::new(21), true, fixed_now())
            .unwrap();
        session
            .record_answer(QuestionId::new(1), ChoiceId::new(11), true, fixed_now())
            .unwrap();
        assert!(storage
            .sessions
            .update_question_states(session.id(), 0, session.states())
            .await
            .unwrap());

        let picked = selector.next_question(UserId::new(7), request).await.unwrap();
        assert!(picked.is_none());
    }

    #[tokio::test]
    async fn session_target_must_be_a_member() {
        let (storage, selector) = build_selector();
        storage
            .questions
            .upsert_question(&build_question(1, 0))
            .await
            .unwrap();
        let session = PracticeSession::new(
            SessionId::random(),
            UserId::new(7),
            PracticeMode::Tutor,
            vec![QuestionId::new(1)],
            QuestionFilters::any(),
            fixed_now(),
        )
        .unwrap();
        storage.sessions.insert_session(&session).await.unwrap();

        let err = selector
            .next_question(
                UserId::new(7),
                NextQuestionRequest::InSession {
                    session_id: session.id(),
                    target: Some(QuestionId::new(42)),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn foreign_session_is_not_found() {
        let (storage, selector) = build_selector();
        let session = PracticeSession::new(
            SessionId::random(),
            UserId::new(7),
            PracticeMode::Tutor,
            vec![QuestionId::new(1)],
            QuestionFilters::any(),
            fixed_now(),
        )
        .unwrap();
        storage.sessions.insert_session(&session).await.unwrap();

        let err = selector
            .next_question(
                UserId::new(8),
                NextQuestionRequest::InSession {
                    session_id: session.id(),
                    target: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn unpublished_race_is_not_found() {
        let (storage, selector) = build_selector();
        storage
            .questions
            .upsert_question(&build_question(1, 0))
            .await
            .unwrap();
        let session = PracticeSession::new(
            SessionId::random(),
            UserId::new(7),
            PracticeMode::Tutor,
            vec![QuestionId::new(1)],
            QuestionFilters::any(),
            fixed_now(),
        )
        .unwrap();
        storage.sessions.insert_session(&session).await.unwrap();

        // content pipeline archives the question after session creation
        let published = build_question(1, 0);
        let archived = Question::new(
            published.id(),
            published.slug(),
            published.stem_md(),
            published.explanation_md(),
            published.difficulty(),
            QuestionStatus::Archived,
            published.choices().to_vec(),
            published.tags().to_vec(),
            published.created_at(),
        )
        .unwrap();
        storage.questions.upsert_question(&archived).await.unwrap();

        let err = selector
            .next_question(
                UserId::new(7),
                NextQuestionRequest::InSession {
                    session_id: session.id(),
                    target: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }
}
