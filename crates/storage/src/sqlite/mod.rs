use std::sync::Arc;
use std::time::Duration;

use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use thiserror::Error;

use crate::local::LocalArticleStore;
use crate::remote::RemoteClient;
use crate::repository::{
    ArticleProgressRepository, InMemoryRemote, KeyValueStore, LocalArticleBackend, ObjectStore,
    QuizProgressRepository, RemoteArticleBackend, SecureStore, Storage,
};

mod kv_repo;
mod migrate;

/// Device-side storage: the key-value store for app data and the secure
/// store for identity values, in one `SQLite` file.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl SqliteRepository {
    /// Connect to `SQLite` using the given URL.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the connection cannot be established or if
    /// the connection pragmas fail during setup.
    pub async fn connect(database_url: &str) -> Result<Self, SqliteInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA journal_mode = WAL;")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("PRAGMA busy_timeout = 5000;")
                        .execute(&mut *conn)
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if migration queries fail.
    pub async fn migrate(&self) -> Result<(), SqliteInitError> {
        migrate::run_migrations(&self.pool).await
    }
}

impl Storage {
    /// Build a `Storage` whose device stores live in `SQLite`.
    ///
    /// With `remote == None` the hosted side is an always-offline stand-in,
    /// so every write lands in the local fallback.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if connection or migrations cannot be
    /// completed.
    pub async fn sqlite(
        database_url: &str,
        remote: Option<RemoteClient>,
    ) -> Result<Self, SqliteInitError> {
        let repo = SqliteRepository::connect(database_url).await?;
        repo.migrate().await?;

        let kv: Arc<dyn KeyValueStore> = Arc::new(repo.clone());
        let secure: Arc<dyn SecureStore> = Arc::new(repo);
        let local_articles: Arc<dyn LocalArticleBackend> = Arc::new(LocalArticleStore::new(kv));

        let (remote_articles, article_progress, quiz_progress, objects): (
            Arc<dyn RemoteArticleBackend>,
            Arc<dyn ArticleProgressRepository>,
            Arc<dyn QuizProgressRepository>,
            Arc<dyn ObjectStore>,
        ) = match remote {
            Some(client) => (
                Arc::new(client.clone()),
                Arc::new(client.clone()),
                Arc::new(client.clone()),
                Arc::new(client),
            ),
            None => {
                tracing::warn!("no remote configured; running offline with local storage only");
                let offline = InMemoryRemote::offline();
                (
                    Arc::new(offline.clone()),
                    Arc::new(offline.clone()),
                    Arc::new(offline.clone()),
                    Arc::new(offline),
                )
            }
        };

        Ok(Self {
            remote_articles,
            local_articles,
            article_progress,
            quiz_progress,
            objects,
            secure,
        })
    }
}
