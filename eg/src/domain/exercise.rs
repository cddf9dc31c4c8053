//! Exercise records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;

/// An exercise whose source files live under `exercises/<slug>/`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Exercise {
    /// Create a new exercise record
    pub fn new(slug: impl Into<String>, title: impl Into<String>) -> Self {
        let slug = slug.into();
        Self {
            id: generate_id("ex", &slug),
            slug,
            title: title.into(),
            created_at: Utc::now(),
        }
    }
}

/// Slugs become directory names, so only lowercase ASCII words joined by
/// single hyphens are accepted.
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 64
        && slug.split('-').all(|part| {
            !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}
