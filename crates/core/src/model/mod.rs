mod article;
mod ids;
mod progress;
mod quiz;
mod stats;

pub use article::{Article, ArticleDraft, ArticleError, ArticlePatch, sort_by_recency};
pub use ids::{AnonymousId, ArticleId, ParseIdError, ProgressId, QuestionId};
pub use progress::{ArticleProgress, QuizAttempt};
pub use quiz::{CorrectAnswer, Difficulty, QuestionKind, QuizBank, QuizError, QuizQuestion};
pub use stats::{ArticleRead, CategoryStats, ProgressStats, RECENT_SESSIONS, UNCATEGORIZED};
