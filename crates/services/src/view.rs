//! Response shapes for the use-case operations.
//!
//! Display views carry no grading information: what a client sees while
//! answering must never include correctness flags or explanations. Those
//! only travel in submit outcomes and review rows, where the visibility
//! rules have already been applied.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use qbank_core::model::{
    AttemptId, ChoiceId, ChoiceLabel, Difficulty, PracticeMode, Question, QuestionId,
    QuestionState, SessionId, SessionTotals, TagSlug, UserId,
};
use qbank_core::shuffle::choice_display_order;

/// One answer option, stripped of grading data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceView {
    pub id: ChoiceId,
    pub label: ChoiceLabel,
    pub text: String,
}

/// A question as shown to a user while answering. Choices are in the
/// per-user stable display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionView {
    pub id: QuestionId,
    pub slug: String,
    pub stem_md: String,
    pub difficulty: Difficulty,
    pub tags: Vec<TagSlug>,
    pub choices: Vec<ChoiceView>,
}

impl QuestionView {
    /// Build the display view for one user, applying the deterministic
    /// per-user choice order.
    #[must_use]
    pub fn for_user(question: &Question, user_id: UserId) -> Self {
        let order = choice_display_order(question, user_id);
        let choices = order
            .iter()
            .filter_map(|id| question.choice(*id))
            .map(|c| ChoiceView {
                id: c.id,
                label: c.label,
                text: c.text.clone(),
            })
            .collect();

        Self {
            id: question.id(),
            slug: question.slug().to_string(),
            stem_md: question.stem_md().to_string(),
            difficulty: question.difficulty(),
            tags: question.tags().to_vec(),
            choices,
        }
    }
}

/// Per-choice rationale, returned only when the visibility rules allow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceExplanation {
    pub choice_id: ChoiceId,
    pub label: ChoiceLabel,
    pub explanation_md: Option<String>,
}

/// Outcome of a submitted answer.
///
/// `explanation_md` and `choice_explanations` are withheld (None / empty)
/// for exam-mode sessions; `is_correct` and `correct_choice_id` are always
/// present so clients can show right/wrong feedback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub is_correct: bool,
    pub correct_choice_id: ChoiceId,
    pub explanation_md: Option<String>,
    pub choice_explanations: Vec<ChoiceExplanation>,
}

/// Result of starting a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: SessionId,
    pub mode: PracticeMode,
    pub question_count: u32,
}

/// Result of a mark-for-review call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkOutcome {
    pub question_id: QuestionId,
    pub marked_for_review: bool,
}

/// Result of ending a session: the terminal timestamp plus totals computed
/// strictly from the persisted per-question state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndedSession {
    pub session_id: SessionId,
    pub ended_at: DateTime<Utc>,
    pub totals: SessionTotals,
}

/// Full review content for one question. Absent (`None` in the row) when
/// the question no longer resolves to published content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewContent {
    pub question: QuestionView,
    pub correct_choice_id: ChoiceId,
    pub explanation_md: String,
    pub choice_explanations: Vec<ChoiceExplanation>,
}

/// One row of the session review read path. A missing question becomes an
/// unavailable marker row (`content: None`) instead of failing the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReviewRow {
    pub question_id: QuestionId,
    pub state: QuestionState,
    pub content: Option<ReviewContent>,
}

/// The session review response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReview {
    pub session_id: SessionId,
    pub mode: PracticeMode,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub totals: SessionTotals,
    pub rows: Vec<SessionReviewRow>,
}

/// Headline fields for history and bookmark listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionHeadline {
    pub id: QuestionId,
    pub slug: String,
    pub stem_md: String,
    pub difficulty: Difficulty,
}

impl QuestionHeadline {
    #[must_use]
    pub fn from_question(question: &Question) -> Self {
        Self {
            id: question.id(),
            slug: question.slug().to_string(),
            stem_md: question.stem_md().to_string(),
            difficulty: question.difficulty(),
        }
    }
}

/// One attempt in the cross-session history. `question: None` marks content
/// that no longer resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub session_id: Option<SessionId>,
    pub choice_id: ChoiceId,
    pub is_correct: bool,
    pub time_spent_seconds: Option<u32>,
    pub answered_at: DateTime<Utc>,
    pub question: Option<QuestionHeadline>,
}

/// One bookmarked question. `question: None` marks content that no longer
/// resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRow {
    pub question_id: QuestionId,
    pub created_at: DateTime<Utc>,
    pub question: Option<QuestionHeadline>,
}

/// Result of a bookmark toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkOutcome {
    pub question_id: QuestionId,
    pub bookmarked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbank_core::model::{Choice, QuestionStatus};
    use qbank_core::time::fixed_now;

    fn build_question() -> Question {
        let choices = (0..4)
            .map(|i| Choice {
                id: ChoiceId::new(i + 1),
                label: ChoiceLabel::ALL[i as usize],
                text: format!("choice {i}"),
                is_correct: i == 2,
                explanation_md: Some(format!("why {i}")),
                sort_order: i as u32,
            })
            .collect();
        Question::new(
            QuestionId::new(5),
            "slug",
            "stem",
            "explanation",
            Difficulty::Medium,
            QuestionStatus::Published,
            choices,
            vec![],
            fixed_now(),
        )
        .unwrap()
    }

    #[test]
    fn view_never_carries_grading_data() {
        let question = build_question();
        let view = QuestionView::for_user(&question, UserId::new(1));

        assert_eq!(view.choices.len(), 4);
        // same multiset of choices, per-user order
        let mut ids: Vec<u64> = view.choices.iter().map(|c| c.id.value()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn view_choice_order_is_stable_per_user() {
        let question = build_question();
        let user = UserId::new(9);
        assert_eq!(
            QuestionView::for_user(&question, user),
            QuestionView::for_user(&question, user)
        );
    }

    #[test]
    fn submit_outcome_round_trips_through_json() {
        let outcome = SubmitOutcome {
            attempt_id: AttemptId::random(),
            question_id: QuestionId::new(5),
            is_correct: true,
            correct_choice_id: ChoiceId::new(3),
            explanation_md: None,
            choice_explanations: vec![],
        };
        let json = serde_json::to_string(&outcome).unwrap();
        let back: SubmitOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
