mod attempt;
mod filters;
mod idempotency;
mod ids;
mod question;
mod session;
mod tag;

pub use attempt::Attempt;
pub use filters::QuestionFilters;
pub use idempotency::{IdempotencyKey, IdempotencyRecord};
pub use ids::{AttemptId, ChoiceId, ParseIdError, QuestionId, SessionId, UserId};
pub use question::{
    Choice, ChoiceLabel, Difficulty, Question, QuestionError, QuestionStatus,
};
pub use session::{
    PracticeMode, PracticeSession, QuestionState, SessionStateError, SessionTotals,
};
pub use tag::{TagError, TagSlug};
