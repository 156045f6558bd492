use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{AnonymousId, ArticleId, ProgressId, QuestionId};
use crate::time::timestamp;

/// One submitted quiz answer. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: ProgressId,
    pub question_id: QuestionId,
    pub user_id: AnonymousId,
    pub is_correct: bool,
    /// Seconds between showing the question and submitting.
    pub time_taken: u32,
    #[serde(with = "timestamp")]
    pub answered_at: DateTime<Utc>,
    /// Category of the question when it was answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl QuizAttempt {
    #[must_use]
    pub fn new(
        question_id: QuestionId,
        user_id: AnonymousId,
        is_correct: bool,
        time_taken: u32,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ProgressId::generate(),
            question_id,
            user_id,
            is_correct,
            time_taken,
            answered_at,
            category: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: Option<String>) -> Self {
        self.category = category;
        self
    }
}

/// Per-device read counter for an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleProgress {
    pub id: ProgressId,
    pub article_id: ArticleId,
    pub user_id: AnonymousId,
    pub read_count: u32,
    #[serde(with = "timestamp")]
    pub read_at: DateTime<Utc>,
}

impl ArticleProgress {
    /// First view of an article on this device.
    #[must_use]
    pub fn first_read(article_id: ArticleId, user_id: AnonymousId, at: DateTime<Utc>) -> Self {
        Self {
            id: ProgressId::generate(),
            article_id,
            user_id,
            read_count: 1,
            read_at: at,
        }
    }

    /// Another view: bump the counter and refresh the timestamp.
    pub fn record_read(&mut self, at: DateTime<Utc>) {
        self.read_count = self.read_count.saturating_add(1);
        self.read_at = at;
    }
}
