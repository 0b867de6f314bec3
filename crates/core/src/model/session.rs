use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::filters::QuestionFilters;
use crate::model::ids::{ChoiceId, QuestionId, SessionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("session needs at least one question")]
    NoQuestions,

    #[error("duplicate question in session: {id}")]
    DuplicateQuestion { id: QuestionId },

    #[error("question {id} is not part of this session")]
    UnknownQuestion { id: QuestionId },

    #[error("session has already ended")]
    AlreadyEnded,

    #[error("persisted state does not cover the question list: {questions} questions, {states} states")]
    StateCountMismatch { questions: usize, states: usize },

    #[error("persisted state entry {index} belongs to question {actual}, expected {expected}")]
    StateQuestionMismatch {
        index: usize,
        expected: QuestionId,
        actual: QuestionId,
    },

    #[error("ended_at is before started_at")]
    InvalidTimeRange,
}

//
// ─── MODE ──────────────────────────────────────────────────────────────────────
//

/// Practice mode. Tutor shows explanations immediately after each answer;
/// exam withholds them until the review read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PracticeMode {
    Tutor,
    Exam,
}

impl PracticeMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PracticeMode::Tutor => "tutor",
            PracticeMode::Exam => "exam",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tutor" => Some(PracticeMode::Tutor),
            "exam" => Some(PracticeMode::Exam),
            _ => None,
        }
    }
}

//
// ─── QUESTION STATE ────────────────────────────────────────────────────────────
//

/// Per-question answer/mark state inside a session.
///
/// One entry exists per question in the session, always — unanswered
/// questions carry an entry with all-`None` answer fields. Re-answering
/// overwrites; only the latest answer counts toward totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionState {
    pub question_id: QuestionId,
    pub marked_for_review: bool,
    pub selected_choice_id: Option<ChoiceId>,
    pub is_correct: Option<bool>,
    pub answered_at: Option<DateTime<Utc>>,
}

impl QuestionState {
    /// Fresh unanswered state for a question.
    #[must_use]
    pub fn unanswered(question_id: QuestionId) -> Self {
        Self {
            question_id,
            marked_for_review: false,
            selected_choice_id: None,
            is_correct: None,
            answered_at: None,
        }
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.selected_choice_id.is_some()
    }
}

//
// ─── TOTALS ────────────────────────────────────────────────────────────────────
//

/// Summary statistics computed strictly from persisted per-question state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub answered: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub duration_seconds: i64,
}

//
// ─── PRACTICE SESSION ──────────────────────────────────────────────────────────
//

/// A practice session: an immutable ordered question list fixed at creation,
/// plus mutable per-question state and the active → ended lifecycle.
///
/// The `version` field carries the optimistic-concurrency token; storage
/// bumps it on every successful state write and refuses writes whose
/// expected version is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct PracticeSession {
    id: SessionId,
    user_id: UserId,
    mode: PracticeMode,
    filters: QuestionFilters,
    states: Vec<QuestionState>,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    version: i64,
}

impl PracticeSession {
    /// Create a fresh active session over the given ordered question ids.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NoQuestions` for an empty list and
    /// `SessionStateError::DuplicateQuestion` if an id repeats.
    pub fn new(
        id: SessionId,
        user_id: UserId,
        mode: PracticeMode,
        question_ids: Vec<QuestionId>,
        filters: QuestionFilters,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if question_ids.is_empty() {
            return Err(SessionStateError::NoQuestions);
        }
        for (i, id) in question_ids.iter().enumerate() {
            if question_ids[..i].contains(id) {
                return Err(SessionStateError::DuplicateQuestion { id: *id });
            }
        }

        let states = question_ids
            .into_iter()
            .map(QuestionState::unanswered)
            .collect();

        Ok(Self {
            id,
            user_id,
            mode,
            filters,
            states,
            started_at,
            ended_at: None,
            version: 0,
        })
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError` if the state entries do not exactly cover
    /// the question list (no orphans, no gaps, same order), or if timestamps
    /// are inverted.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: SessionId,
        user_id: UserId,
        mode: PracticeMode,
        question_ids: Vec<QuestionId>,
        filters: QuestionFilters,
        states: Vec<QuestionState>,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        version: i64,
    ) -> Result<Self, SessionStateError> {
        if question_ids.is_empty() {
            return Err(SessionStateError::NoQuestions);
        }
        if question_ids.len() != states.len() {
            return Err(SessionStateError::StateCountMismatch {
                questions: question_ids.len(),
                states: states.len(),
            });
        }
        for (i, (qid, state)) in question_ids.iter().zip(states.iter()).enumerate() {
            if state.question_id != *qid {
                return Err(SessionStateError::StateQuestionMismatch {
                    index: i,
                    expected: *qid,
                    actual: state.question_id,
                });
            }
        }
        if let Some(ended) = ended_at {
            if ended < started_at {
                return Err(SessionStateError::InvalidTimeRange);
            }
        }

        Ok(Self {
            id,
            user_id,
            mode,
            filters,
            states,
            started_at,
            ended_at,
            version,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn mode(&self) -> PracticeMode {
        self.mode
    }

    #[must_use]
    pub fn filters(&self) -> &QuestionFilters {
        &self.filters
    }

    /// The fixed question order. Never changes after creation.
    pub fn question_ids(&self) -> impl Iterator<Item = QuestionId> + '_ {
        self.states.iter().map(|s| s.question_id)
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn contains_question(&self, id: QuestionId) -> bool {
        self.states.iter().any(|s| s.question_id == id)
    }

    /// Per-question states, in session order.
    #[must_use]
    pub fn states(&self) -> &[QuestionState] {
        &self.states
    }

    #[must_use]
    pub fn state(&self, question_id: QuestionId) -> Option<&QuestionState> {
        self.states.iter().find(|s| s.question_id == question_id)
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// First question in session order with no recorded answer.
    #[must_use]
    pub fn first_unanswered(&self) -> Option<QuestionId> {
        self.states
            .iter()
            .find(|s| !s.is_answered())
            .map(|s| s.question_id)
    }

    /// Record (or overwrite) the answer for one question.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyEnded` for ended sessions and `UnknownQuestion` if the
    /// question is not a member of this session.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        choice_id: ChoiceId,
        is_correct: bool,
        answered_at: DateTime<Utc>,
    ) -> Result<(), SessionStateError> {
        if !self.is_active() {
            return Err(SessionStateError::AlreadyEnded);
        }
        let state = self
            .states
            .iter_mut()
            .find(|s| s.question_id == question_id)
            .ok_or(SessionStateError::UnknownQuestion { id: question_id })?;

        state.selected_choice_id = Some(choice_id);
        state.is_correct = Some(is_correct);
        state.answered_at = Some(answered_at);
        Ok(())
    }

    /// Set the marked-for-review flag. Returns whether the flag changed, so
    /// callers can skip the storage write on a no-op.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyEnded` for ended sessions and `UnknownQuestion` if the
    /// question is not a member of this session.
    pub fn set_marked_for_review(
        &mut self,
        question_id: QuestionId,
        marked: bool,
    ) -> Result<bool, SessionStateError> {
        if !self.is_active() {
            return Err(SessionStateError::AlreadyEnded);
        }
        let state = self
            .states
            .iter_mut()
            .find(|s| s.question_id == question_id)
            .ok_or(SessionStateError::UnknownQuestion { id: question_id })?;

        if state.marked_for_review == marked {
            return Ok(false);
        }
        state.marked_for_review = marked;
        Ok(true)
    }

    /// Transition to the terminal ended state.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyEnded` if the session has already ended.
    pub fn end(&mut self, ended_at: DateTime<Utc>) -> Result<(), SessionStateError> {
        if !self.is_active() {
            return Err(SessionStateError::AlreadyEnded);
        }
        self.ended_at = Some(ended_at);
        Ok(())
    }

    /// Called by storage adapters after a successful conditional write.
    pub fn bump_version(&mut self) {
        self.version += 1;
    }

    /// Summary totals from the persisted per-question state alone.
    ///
    /// Duration is measured to `ended_at` when set, otherwise to `as_of`;
    /// it is floored to whole seconds and never negative. Accuracy is 0.0
    /// when nothing was answered.
    #[must_use]
    pub fn totals(&self, as_of: DateTime<Utc>) -> SessionTotals {
        let answered = self.states.iter().filter(|s| s.is_answered()).count() as u32;
        let correct = self
            .states
            .iter()
            .filter(|s| s.is_correct == Some(true))
            .count() as u32;
        let accuracy = if answered == 0 {
            0.0
        } else {
            f64::from(correct) / f64::from(answered)
        };
        let until = self.ended_at.unwrap_or(as_of);
        let duration_seconds = (until - self.started_at).num_seconds().max(0);

        SessionTotals {
            answered,
            correct,
            accuracy,
            duration_seconds,
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
