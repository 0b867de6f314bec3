use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validated tag slug: lowercase ASCII letters, digits, and hyphens.
///
/// Slugs are authored by the content pipeline; the engine only needs them as
/// stable filter keys, so validation is deliberately strict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TagSlug(String);

impl TagSlug {
    /// Create a validated tag slug.
    ///
    /// # Errors
    ///
    /// Returns `TagError::EmptySlug` if the slug is empty after trimming, or
    /// `TagError::InvalidSlug` if it contains anything outside `[a-z0-9-]`.
    pub fn new(value: impl Into<String>) -> Result<Self, TagError> {
        let raw = value.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TagError::EmptySlug);
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(TagError::InvalidSlug {
                slug: trimmed.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TagSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for TagSlug {
    type Error = TagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TagSlug> for String {
    fn from(slug: TagSlug) -> Self {
        slug.0
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TagError {
    #[error("tag slug cannot be empty")]
    EmptySlug,

    #[error("tag slug may only contain lowercase letters, digits, and hyphens: {slug}")]
    InvalidSlug { slug: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_slugs() {
        assert_eq!(TagSlug::new("cardiology").unwrap().as_str(), "cardiology");
        assert_eq!(TagSlug::new(" step-1 ").unwrap().as_str(), "step-1");
    }

    #[test]
    fn rejects_empty_and_invalid() {
        assert!(matches!(TagSlug::new("  "), Err(TagError::EmptySlug)));
        assert!(matches!(
            TagSlug::new("Cardiology"),
            Err(TagError::InvalidSlug { .. })
        ));
        assert!(matches!(
            TagSlug::new("a b"),
            Err(TagError::InvalidSlug { .. })
        ));
    }
}
