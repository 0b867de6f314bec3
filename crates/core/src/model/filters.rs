use serde::{Deserialize, Serialize};

use crate::model::question::{Difficulty, Question};
use crate::model::tag::TagSlug;

/// Tag/difficulty filters used to assemble candidate question lists.
///
/// Empty filter dimensions match everything; filters only narrow.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QuestionFilters {
    pub tags: Vec<TagSlug>,
    pub difficulties: Vec<Difficulty>,
}

impl QuestionFilters {
    #[must_use]
    pub fn new(tags: Vec<TagSlug>, difficulties: Vec<Difficulty>) -> Self {
        Self { tags, difficulties }
    }

    /// Matches all published questions.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.difficulties.is_empty()
    }

    /// Whether a question satisfies these filters. Publication status is the
    /// caller's concern; this only checks tags and difficulty.
    #[must_use]
    pub fn matches(&self, question: &Question) -> bool {
        if !self.difficulties.is_empty() && !self.difficulties.contains(&question.difficulty()) {
            return false;
        }
        if !self.tags.is_empty()
            && !self
                .tags
                .iter()
                .any(|tag| question.tags().contains(tag))
        {
            return false;
        }
        true
    }
}
