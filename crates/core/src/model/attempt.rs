use chrono::{DateTime, Utc};

use crate::model::ids::{AttemptId, ChoiceId, QuestionId, SessionId, UserId};

/// Append-only audit record of a single answer submission.
///
/// Attempts feed cross-session history and statistics. Session scoring never
/// reads them — a session's totals come from its own question state, so the
/// two can never disagree about what was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub id: AttemptId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub session_id: Option<SessionId>,
    pub choice_id: ChoiceId,
    pub is_correct: bool,
    pub time_spent_seconds: Option<u32>,
    pub answered_at: DateTime<Utc>,
}

impl Attempt {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        id: AttemptId,
        user_id: UserId,
        question_id: QuestionId,
        session_id: Option<SessionId>,
        choice_id: ChoiceId,
        is_correct: bool,
        time_spent_seconds: Option<u32>,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            question_id,
            session_id,
            choice_id,
            is_correct,
            time_spent_seconds,
            answered_at,
        }
    }
}
