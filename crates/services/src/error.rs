//! Shared error types for the services crate.

use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use study_core::model::{ArticleError, ArticleId, QuestionId, QuizError};

/// Errors emitted by `ArticleService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArticleServiceError {
    #[error(transparent)]
    Invalid(#[from] ArticleError),

    #[error("article not found: {0}")]
    NotFound(ArticleId),

    /// Neither the hosted store nor the device could serve the request.
    #[error("articles are unavailable")]
    Unavailable(#[source] StorageError),

    #[error("failed to delete article {id}")]
    DeleteFailed {
        id: ArticleId,
        #[source]
        source: StorageError,
    },
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error(transparent)]
    Quiz(#[from] QuizError),
}

/// Reasons an image could not be prepared or uploaded.
///
/// Never surfaced to callers of `ImageUploader::upload`; kept for logging.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImageUploadError {
    #[error("failed to read image: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to process image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("image processing task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("{0} is set but STUDY_REMOTE_KEY is missing")]
    MissingRemoteKey(String),

    #[error("invalid value for {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
}
