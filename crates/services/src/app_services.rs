use std::sync::Arc;
use std::time::Duration;

use storage::remote::RemoteClient;
use storage::repository::Storage;
use study_core::model::{ArticleId, ProgressStats, QuizBank};

use crate::Clock;
use crate::article_service::ArticleService;
use crate::autosave::AutoSaver;
use crate::config::AppConfig;
use crate::error::AppServicesError;
use crate::identity::IdentityService;
use crate::image_upload::ImageUploader;
use crate::progress_service::ProgressService;
use crate::quiz_service::QuizService;

/// Assembles app-facing services over one `Storage`.
#[derive(Clone)]
pub struct AppServices {
    autosave_delay: Duration,
    articles: Arc<ArticleService>,
    progress: Arc<ProgressService>,
    quiz: Arc<QuizService>,
}

impl AppServices {
    /// Build services backed by `SQLite` device storage and, when configured,
    /// the hosted backend.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails or the
    /// bundled quiz dataset is invalid.
    pub async fn new_sqlite(config: &AppConfig, clock: Clock) -> Result<Self, AppServicesError> {
        let remote = match &config.remote {
            Some(remote) => Some(RemoteClient::new(remote.clone())?),
            None => None,
        };
        let storage = Storage::sqlite(&config.db_url, remote).await?;
        tracing::debug!(db_url = %config.db_url, "storage ready");
        Self::from_storage(storage, clock, config.autosave_delay)
    }

    /// Wire services over an existing `Storage`, e.g. the in-memory one.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Quiz` if the bundled quiz dataset is invalid.
    pub fn from_storage(
        storage: Storage,
        clock: Clock,
        autosave_delay: Duration,
    ) -> Result<Self, AppServicesError> {
        let bank = Arc::new(QuizBank::bundled()?);
        let identity = Arc::new(IdentityService::new(Arc::clone(&storage.secure)));
        let articles = Arc::new(ArticleService::new(
            clock,
            Arc::clone(&storage.remote_articles),
            Arc::clone(&storage.local_articles),
            Arc::clone(&storage.article_progress),
            ImageUploader::new(Arc::clone(&storage.objects)),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            identity,
            Arc::clone(&storage.article_progress),
            Arc::clone(&storage.quiz_progress),
        ));
        let quiz = Arc::new(QuizService::new(bank, Arc::clone(&progress)));

        Ok(Self {
            autosave_delay,
            articles,
            progress,
            quiz,
        })
    }

    #[must_use]
    pub fn articles(&self) -> Arc<ArticleService> {
        Arc::clone(&self.articles)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizService> {
        Arc::clone(&self.quiz)
    }

    /// An auto-saver for the article being edited, using the configured delay.
    #[must_use]
    pub fn autosaver(&self, article_id: ArticleId) -> AutoSaver {
        AutoSaver::new(self.articles(), article_id, self.autosave_delay)
    }

    /// Statistics over the current article list and this device's progress.
    ///
    /// If the article list cannot be loaded, article totals read as zero.
    pub async fn progress_stats(&self) -> ProgressStats {
        let visible = self.articles.list_articles().await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "article list unavailable for statistics");
            Vec::new()
        });
        self.progress
            .progress_stats(self.quiz.bank(), &visible)
            .await
    }
}
