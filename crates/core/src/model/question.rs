use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChoiceId, QuestionId};
use crate::model::tag::TagSlug;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question slug cannot be empty")]
    EmptySlug,

    #[error("question stem cannot be empty")]
    EmptyStem,

    #[error("question needs at least two choices, got {len}")]
    TooFewChoices { len: usize },

    #[error("question has more choices than available labels: {len}")]
    TooManyChoices { len: usize },

    #[error("question must have exactly one correct choice, got {count}")]
    CorrectChoiceCount { count: usize },

    #[error("duplicate choice label: {label}")]
    DuplicateLabel { label: ChoiceLabel },

    #[error("duplicate choice id: {id}")]
    DuplicateChoiceId { id: ChoiceId },
}

//
// ─── DIFFICULTY & STATUS ───────────────────────────────────────────────────────
//

/// Difficulty band assigned by the content pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    /// Parse the storage representation back into a difficulty.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

/// Publication lifecycle of a question. Only `Published` questions are
/// selectable by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Draft,
    Published,
    Archived,
}

impl QuestionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Draft => "draft",
            QuestionStatus::Published => "published",
            QuestionStatus::Archived => "archived",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(QuestionStatus::Draft),
            "published" => Some(QuestionStatus::Published),
            "archived" => Some(QuestionStatus::Archived),
            _ => None,
        }
    }
}

//
// ─── CHOICE ────────────────────────────────────────────────────────────────────
//

/// Display label for a choice. The label space caps a question at five
/// choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChoiceLabel {
    A,
    B,
    C,
    D,
    E,
}

impl ChoiceLabel {
    pub const ALL: [ChoiceLabel; 5] = [
        ChoiceLabel::A,
        ChoiceLabel::B,
        ChoiceLabel::C,
        ChoiceLabel::D,
        ChoiceLabel::E,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ChoiceLabel::A => "A",
            ChoiceLabel::B => "B",
            ChoiceLabel::C => "C",
            ChoiceLabel::D => "D",
            ChoiceLabel::E => "E",
        }
    }

    /// Label for the nth choice (0-based), if one exists.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for ChoiceLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single answer option. Authored order is fixed by `sort_order`; display
/// order is a per-user permutation computed by the shuffle module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: ChoiceId,
    pub label: ChoiceLabel,
    pub text: String,
    pub is_correct: bool,
    pub explanation_md: Option<String>,
    pub sort_order: u32,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A published practice question with its choices and tags.
///
/// Owned by the content pipeline and immutable from the engine's
/// perspective; the constructor re-checks the content invariants anyway so a
/// corrupt row can never silently grade answers.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    id: QuestionId,
    slug: String,
    stem_md: String,
    explanation_md: String,
    difficulty: Difficulty,
    status: QuestionStatus,
    choices: Vec<Choice>,
    tags: Vec<TagSlug>,
    created_at: DateTime<Utc>,
}

impl Question {
    /// Build a question, validating the content invariants.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the slug or stem is empty, the choice count
    /// is outside 2..=5, labels or choice ids repeat, or the number of
    /// correct choices is not exactly one.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuestionId,
        slug: impl Into<String>,
        stem_md: impl Into<String>,
        explanation_md: impl Into<String>,
        difficulty: Difficulty,
        status: QuestionStatus,
        mut choices: Vec<Choice>,
        tags: Vec<TagSlug>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuestionError> {
        let slug = slug.into();
        if slug.trim().is_empty() {
            return Err(QuestionError::EmptySlug);
        }
        let stem_md = stem_md.into();
        if stem_md.trim().is_empty() {
            return Err(QuestionError::EmptyStem);
        }

        if choices.len() < 2 {
            return Err(QuestionError::TooFewChoices { len: choices.len() });
        }
        if choices.len() > ChoiceLabel::ALL.len() {
            return Err(QuestionError::TooManyChoices { len: choices.len() });
        }

        choices.sort_by_key(|c| (c.sort_order, c.id));

        for (i, choice) in choices.iter().enumerate() {
            if choices[..i].iter().any(|other| other.label == choice.label) {
                return Err(QuestionError::DuplicateLabel {
                    label: choice.label,
                });
            }
            if choices[..i].iter().any(|other| other.id == choice.id) {
                return Err(QuestionError::DuplicateChoiceId { id: choice.id });
            }
        }

        let correct = choices.iter().filter(|c| c.is_correct).count();
        if correct != 1 {
            return Err(QuestionError::CorrectChoiceCount { count: correct });
        }

        Ok(Self {
            id,
            slug,
            stem_md,
            explanation_md: explanation_md.into(),
            difficulty,
            status,
            choices,
            tags,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn slug(&self) -> &str {
        &self.slug
    }

    #[must_use]
    pub fn stem_md(&self) -> &str {
        &self.stem_md
    }

    #[must_use]
    pub fn explanation_md(&self) -> &str {
        &self.explanation_md
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn status(&self) -> QuestionStatus {
        self.status
    }

    /// Choices in authored order.
    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    #[must_use]
    pub fn tags(&self) -> &[TagSlug] {
        &self.tags
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == QuestionStatus::Published
    }

    /// Look up a choice by id.
    #[must_use]
    pub fn choice(&self, id: ChoiceId) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == id)
    }

    /// The single correct choice.
    ///
    /// The constructor guarantees exactly one; callers treat `None` as a
    /// broken invariant.
    #[must_use]
    pub fn correct_choice(&self) -> Option<&Choice> {
        self.choices.iter().find(|c| c.is_correct)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
