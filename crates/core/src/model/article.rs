use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::ArticleId;
use crate::time::{opt_timestamp, timestamp};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ArticleError {
    #[error("article title cannot be empty")]
    EmptyTitle,

    #[error("article content cannot be empty")]
    EmptyContent,
}

//
// ─── ARTICLE ───────────────────────────────────────────────────────────────────
//

/// A user-visible article, as stored remotely and in the local fallback list.
///
/// The serialized shape matches the hosted `articles` table, so the same
/// record can be written to either location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "opt_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Article {
    /// Build a brand-new article from a validated draft.
    #[must_use]
    pub fn create(
        id: ArticleId,
        draft: ArticleDraft,
        image_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: draft.title,
            content: draft.content,
            image_url,
            created_at: now,
            updated_at: Some(now),
        }
    }

    /// Sort key for recency: `updated_at`, falling back to `created_at`.
    #[must_use]
    pub fn recency(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }

    /// Overwrite the mutable fields with an edit.
    pub fn apply(&mut self, patch: &ArticlePatch) {
        self.title.clone_from(&patch.title);
        self.content.clone_from(&patch.content);
        self.image_url.clone_from(&patch.image_url);
        self.updated_at = Some(patch.updated_at);
    }

    /// Case-insensitive substring match on the title. An empty query matches.
    #[must_use]
    pub fn matches_title(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty() || self.title.to_lowercase().contains(&query)
    }

    /// First line of the content with markup characters stripped, for list rows.
    #[must_use]
    pub fn preview(&self) -> String {
        self.content
            .lines()
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|c| !matches!(c, '#' | '*' | '_'))
            .collect::<String>()
            .trim()
            .to_owned()
    }
}

/// Sort articles newest-first by [`Article::recency`]. Stable for ties.
pub fn sort_by_recency(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.recency().cmp(&a.recency()));
}

//
// ─── DRAFT / PATCH ─────────────────────────────────────────────────────────────
//

/// User-entered title and content, trimmed on validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    title: String,
    content: String,
}

impl ArticleDraft {
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Trim both fields and reject blanks.
    ///
    /// # Errors
    ///
    /// Returns `ArticleError::EmptyTitle` or `ArticleError::EmptyContent`.
    pub fn validate(self) -> Result<Self, ArticleError> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ArticleError::EmptyTitle);
        }
        let content = self.content.trim();
        if content.is_empty() {
            return Err(ArticleError::EmptyContent);
        }
        Ok(Self {
            title: title.to_owned(),
            content: content.to_owned(),
        })
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Mutable fields written by an update, keyed externally by `ArticleId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArticlePatch {
    pub title: String,
    pub content: String,
    pub image_url: Option<String>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl ArticlePatch {
    #[must_use]
    pub fn new(draft: ArticleDraft, image_url: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            title: draft.title,
            content: draft.content,
            image_url,
            updated_at: now,
        }
    }
}
