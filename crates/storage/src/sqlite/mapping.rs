use qbank_core::model::{
    Attempt, AttemptId, Choice, ChoiceId, Difficulty, PracticeMode, PracticeSession, Question,
    QuestionFilters, QuestionId, QuestionState, QuestionStatus, SessionId, TagSlug, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u64_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn choice_id_from_i64(v: i64) -> Result<ChoiceId, StorageError> {
    Ok(ChoiceId::new(i64_to_u64("choice_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn session_id_from_str(s: &str) -> Result<SessionId, StorageError> {
    s.parse::<SessionId>()
        .map_err(|_| StorageError::Serialization(format!("invalid session id: {s}")))
}

pub(crate) fn attempt_id_from_str(s: &str) -> Result<AttemptId, StorageError> {
    s.parse::<AttemptId>()
        .map_err(|_| StorageError::Serialization(format!("invalid attempt id: {s}")))
}

pub(crate) fn parse_difficulty(s: &str) -> Result<Difficulty, StorageError> {
    Difficulty::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid difficulty: {s}")))
}

pub(crate) fn parse_status(s: &str) -> Result<QuestionStatus, StorageError> {
    QuestionStatus::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid status: {s}")))
}

pub(crate) fn parse_mode(s: &str) -> Result<PracticeMode, StorageError> {
    PracticeMode::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid mode: {s}")))
}

/// Build a domain question from a row plus its tag slugs.
///
/// Choices travel as one JSON document inside the question row; the domain
/// constructor re-validates the content invariants on the way out so a
/// corrupt row surfaces as a serialization error instead of grading answers.
pub(crate) fn map_question_row(
    row: &sqlx::sqlite::SqliteRow,
    tags: Vec<TagSlug>,
) -> Result<Question, StorageError> {
    let choices: Vec<Choice> =
        serde_json::from_str(&row.try_get::<String, _>("choices").map_err(ser)?).map_err(ser)?;

    Question::new(
        question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        row.try_get::<String, _>("slug").map_err(ser)?,
        row.try_get::<String, _>("stem_md").map_err(ser)?,
        row.try_get::<String, _>("explanation_md").map_err(ser)?,
        parse_difficulty(&row.try_get::<String, _>("difficulty").map_err(ser)?)?,
        parse_status(&row.try_get::<String, _>("status").map_err(ser)?)?,
        choices,
        tags,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<PracticeSession, StorageError> {
    let id = session_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?;
    let question_ids: Vec<QuestionId> =
        serde_json::from_str(&row.try_get::<String, _>("question_ids").map_err(ser)?)
            .map_err(ser)?;
    let states: Vec<QuestionState> =
        serde_json::from_str(&row.try_get::<String, _>("question_states").map_err(ser)?)
            .map_err(ser)?;
    let filters: QuestionFilters =
        serde_json::from_str(&row.try_get::<String, _>("filters").map_err(ser)?).map_err(ser)?;

    PracticeSession::from_persisted(
        id,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        parse_mode(&row.try_get::<String, _>("mode").map_err(ser)?)?,
        question_ids,
        filters,
        states,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("ended_at").map_err(ser)?,
        row.try_get("version").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<Attempt, StorageError> {
    let session_id = row
        .try_get::<Option<String>, _>("session_id")
        .map_err(ser)?
        .map(|s| session_id_from_str(&s))
        .transpose()?;
    let time_spent = row
        .try_get::<Option<i64>, _>("time_spent_seconds")
        .map_err(ser)?
        .map(|v| {
            u32::try_from(v)
                .map_err(|_| StorageError::Serialization(format!("invalid time_spent: {v}")))
        })
        .transpose()?;

    Ok(Attempt::new(
        attempt_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        session_id,
        choice_id_from_i64(row.try_get::<i64, _>("choice_id").map_err(ser)?)?,
        row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
        time_spent,
        row.try_get("answered_at").map_err(ser)?,
    ))
}
