use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::progress::QuizAttempt;
use crate::model::quiz::QuizBank;

/// Label used for attempts whose question has no category (or is gone).
pub const UNCATEGORIZED: &str = "Other";

/// Number of most recent study days shown in the score trend.
pub const RECENT_SESSIONS: usize = 6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub total: u32,
    pub correct: u32,
}

/// A recently read article, resolved to a display title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRead {
    pub title: String,
    pub read_at: DateTime<Utc>,
    pub read_count: u32,
}

/// Aggregated learning progress for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStats {
    pub total_quizzes: u32,
    pub correct_answers: u32,
    pub incorrect_answers: u32,
    /// Rounded percentage, 0 when nothing was answered.
    pub accuracy: u32,
    pub total_articles: u32,
    pub articles_read: u32,
    pub categories: BTreeMap<String, CategoryStats>,
    /// Per-day accuracy, oldest first. Never empty.
    pub recent_scores: Vec<u32>,
    pub recent_articles: Vec<ArticleRead>,
}

impl Default for ProgressStats {
    fn default() -> Self {
        Self {
            total_quizzes: 0,
            correct_answers: 0,
            incorrect_answers: 0,
            accuracy: 0,
            total_articles: 0,
            articles_read: 0,
            categories: BTreeMap::new(),
            recent_scores: vec![0],
            recent_articles: Vec::new(),
        }
    }
}

fn percent(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (f64::from(correct) * 100.0 / f64::from(total)).round();
    // pct is within 0..=100
    pct as u32
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl ProgressStats {
    /// Build statistics from raw progress rows.
    ///
    /// Attempts are grouped into sessions by UTC calendar day; the newest
    /// [`RECENT_SESSIONS`] days make up `recent_scores`.
    #[must_use]
    pub fn compute(
        attempts: &[QuizAttempt],
        bank: &QuizBank,
        recent_articles: Vec<ArticleRead>,
        total_articles: usize,
    ) -> Self {
        let total_quizzes = count(attempts.len());
        let correct_answers = count(attempts.iter().filter(|a| a.is_correct).count());

        let mut categories: BTreeMap<String, CategoryStats> = BTreeMap::new();
        for attempt in attempts {
            let category = attempt
                .category
                .clone()
                .or_else(|| bank.get(&attempt.question_id).and_then(|q| q.category.clone()))
                .unwrap_or_else(|| UNCATEGORIZED.to_owned());
            let entry = categories.entry(category).or_default();
            entry.total += 1;
            if attempt.is_correct {
                entry.correct += 1;
            }
        }

        let mut by_day: BTreeMap<NaiveDate, CategoryStats> = BTreeMap::new();
        for attempt in attempts {
            let day = by_day.entry(attempt.answered_at.date_naive()).or_default();
            day.total += 1;
            if attempt.is_correct {
                day.correct += 1;
            }
        }
        let mut recent_scores: Vec<u32> = by_day
            .values()
            .rev()
            .take(RECENT_SESSIONS)
            .map(|d| percent(d.correct, d.total))
            .collect();
        recent_scores.reverse();
        if recent_scores.is_empty() {
            recent_scores.push(0);
        }

        Self {
            total_quizzes,
            correct_answers,
            incorrect_answers: total_quizzes - correct_answers,
            accuracy: percent(correct_answers, total_quizzes),
            total_articles: count(total_articles),
            articles_read: count(recent_articles.len()),
            categories,
            recent_scores,
            recent_articles,
        }
    }
}
