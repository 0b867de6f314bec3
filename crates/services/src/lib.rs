#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod selector;
pub mod session_store;
pub mod view;

pub use qbank_core::Clock;

pub use config::EngineConfig;
pub use engine::{PracticeService, SubmitAnswerRequest};
pub use error::EngineError;
pub use idempotency::IdempotencyCoordinator;
pub use selector::{NextQuestionRequest, QuestionSelector};
pub use session_store::{Mutation, SessionStore};
pub use view::{
    BookmarkOutcome, BookmarkRow, ChoiceExplanation, ChoiceView, EndedSession, HistoryRow,
    MarkOutcome, QuestionHeadline, QuestionView, ReviewContent, SessionReview, SessionReviewRow,
    StartedSession, SubmitOutcome,
};
