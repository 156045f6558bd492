#![forbid(unsafe_code)]

pub mod app_services;
pub mod article_service;
pub mod autosave;
pub mod config;
pub mod error;
pub mod identity;
pub mod image_upload;
pub mod progress_service;
pub mod quiz_service;

pub use study_core::Clock;

pub use app_services::AppServices;
pub use article_service::{
    ArticleService, DeleteOutcome, ImageChange, SaveLocation, SaveMode, SaveOutcome, SaveWarning,
};
pub use autosave::{AutoSaver, Debouncer};
pub use config::AppConfig;
pub use error::{
    AppServicesError, ArticleServiceError, ConfigError, ImageUploadError, QuizServiceError,
};
pub use identity::IdentityService;
pub use image_upload::{ImageSource, ImageUploader};
pub use progress_service::ProgressService;
pub use quiz_service::{AnswerResult, QuizService};
