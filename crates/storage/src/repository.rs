use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use study_core::model::{
    AnonymousId, Article, ArticleId, ArticlePatch, ArticleProgress, QuizAttempt,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// One location that can hold articles.
///
/// The hosted table and the on-device list both implement this, and the
/// reconciler in `services` composes one of each.
#[async_trait]
pub trait ArticleBackend: Send + Sync {
    /// All articles, newest `created_at` first where the backend can order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn list_articles(&self) -> Result<Vec<Article>, StorageError>;

    /// Point lookup. `Ok(None)` when the id is absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>, StorageError>;

    /// Insert a new article.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the id already exists, or other
    /// storage errors.
    async fn insert_article(&self, article: &Article) -> Result<(), StorageError>;

    /// Apply an edit to an existing article.
    ///
    /// Returns `Ok(None)` when no record with `id` exists here.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn update_article(
        &self,
        id: &ArticleId,
        patch: &ArticlePatch,
    ) -> Result<Option<Article>, StorageError>;

    /// Delete by id. Returns whether a record existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn delete_article(&self, id: &ArticleId) -> Result<bool, StorageError>;
}

/// The hosted article table, which the device list is pruned against.
#[async_trait]
pub trait RemoteArticleBackend: ArticleBackend {
    /// Which of `ids` are present in the hosted table.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the table cannot be read.
    async fn existing_ids(&self, ids: &[ArticleId]) -> Result<Vec<ArticleId>, StorageError>;
}

/// The on-device article list, which drops entries already held remotely.
#[async_trait]
pub trait LocalArticleBackend: ArticleBackend {
    /// Remove every entry whose id is in `ids`, returning how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the list cannot be written.
    async fn remove_articles(&self, ids: &[ArticleId]) -> Result<usize, StorageError>;
}

#[async_trait]
pub trait ArticleProgressRepository: Send + Sync {
    /// Progress row for an (article, device) pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn find_progress(
        &self,
        article_id: &ArticleId,
        user_id: &AnonymousId,
    ) -> Result<Option<ArticleProgress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn insert_progress(&self, progress: &ArticleProgress) -> Result<(), StorageError>;

    /// Persist `read_count` and `read_at` of an existing row.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the row cannot be stored.
    async fn update_progress(&self, progress: &ArticleProgress) -> Result<(), StorageError>;

    /// Remove every progress row for an article, across devices.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be removed.
    async fn delete_progress_for_article(&self, article_id: &ArticleId)
    -> Result<(), StorageError>;

    /// Most recently read first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the rows cannot be read.
    async fn recent_progress(
        &self,
        user_id: &AnonymousId,
        limit: u32,
    ) -> Result<Vec<ArticleProgress>, StorageError>;
}

#[async_trait]
pub trait QuizProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the attempts cannot be read.
    async fn attempts_for_user(&self, user_id: &AnonymousId)
    -> Result<Vec<QuizAttempt>, StorageError>;
}

/// Binary object storage with public retrieval URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `bytes` under `key`. With `upsert == false` an existing key is a
    /// `StorageError::Conflict`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the upload is rejected or fails.
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Whole-value string storage on the device.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Small secrets (anonymous id, session token) kept apart from app data.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be read.
    async fn get_secret(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn set_secret(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be written.
    async fn delete_secret(&self, key: &str) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY REMOTE ──────────────────────────────────────────────────────────
//

#[derive(Default)]
struct RemoteTables {
    articles: Vec<Article>,
    article_progress: Vec<ArticleProgress>,
    quiz_progress: Vec<QuizAttempt>,
    objects: HashMap<String, (String, Vec<u8>)>,
}

/// In-memory stand-in for the hosted backend, for tests and offline runs.
///
/// `set_offline(true)` makes every call fail with `StorageError::Connection`.
#[derive(Clone, Default)]
pub struct InMemoryRemote {
    tables: Arc<Mutex<RemoteTables>>,
    offline: Arc<AtomicBool>,
}

impl InMemoryRemote {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote that is permanently unreachable.
    #[must_use]
    pub fn offline() -> Self {
        let remote = Self::new();
        remote.set_offline(true);
        remote
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Stored object bytes, for assertions.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.objects.get(key).map(|(_, bytes)| bytes.clone()))
    }

    fn tables(&self) -> Result<std::sync::MutexGuard<'_, RemoteTables>, StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("remote unreachable".into()));
        }
        self.tables
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ArticleBackend for InMemoryRemote {
    async fn list_articles(&self) -> Result<Vec<Article>, StorageError> {
        let guard = self.tables()?;
        let mut list = guard.articles.clone();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>, StorageError> {
        let guard = self.tables()?;
        Ok(guard.articles.iter().find(|a| &a.id == id).cloned())
    }

    async fn insert_article(&self, article: &Article) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        if guard.articles.iter().any(|a| a.id == article.id) {
            return Err(StorageError::Conflict);
        }
        guard.articles.push(article.clone());
        Ok(())
    }

    async fn update_article(
        &self,
        id: &ArticleId,
        patch: &ArticlePatch,
    ) -> Result<Option<Article>, StorageError> {
        let mut guard = self.tables()?;
        Ok(guard.articles.iter_mut().find(|a| &a.id == id).map(|a| {
            a.apply(patch);
            a.clone()
        }))
    }

    async fn delete_article(&self, id: &ArticleId) -> Result<bool, StorageError> {
        let mut guard = self.tables()?;
        let before = guard.articles.len();
        guard.articles.retain(|a| &a.id != id);
        Ok(guard.articles.len() != before)
    }
}

#[async_trait]
impl RemoteArticleBackend for InMemoryRemote {
    async fn existing_ids(&self, ids: &[ArticleId]) -> Result<Vec<ArticleId>, StorageError> {
        let guard = self.tables()?;
        Ok(guard
            .articles
            .iter()
            .filter(|a| ids.contains(&a.id))
            .map(|a| a.id.clone())
            .collect())
    }
}

#[async_trait]
impl ArticleProgressRepository for InMemoryRemote {
    async fn find_progress(
        &self,
        article_id: &ArticleId,
        user_id: &AnonymousId,
    ) -> Result<Option<ArticleProgress>, StorageError> {
        let guard = self.tables()?;
        Ok(guard
            .article_progress
            .iter()
            .find(|p| &p.article_id == article_id && &p.user_id == user_id)
            .cloned())
    }

    async fn insert_progress(&self, progress: &ArticleProgress) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        if guard.article_progress.iter().any(|p| p.id == progress.id) {
            return Err(StorageError::Conflict);
        }
        guard.article_progress.push(progress.clone());
        Ok(())
    }

    async fn update_progress(&self, progress: &ArticleProgress) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        let row = guard
            .article_progress
            .iter_mut()
            .find(|p| p.id == progress.id)
            .ok_or(StorageError::NotFound)?;
        row.read_count = progress.read_count;
        row.read_at = progress.read_at;
        Ok(())
    }

    async fn delete_progress_for_article(
        &self,
        article_id: &ArticleId,
    ) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        guard.article_progress.retain(|p| &p.article_id != article_id);
        Ok(())
    }

    async fn recent_progress(
        &self,
        user_id: &AnonymousId,
        limit: u32,
    ) -> Result<Vec<ArticleProgress>, StorageError> {
        let guard = self.tables()?;
        let mut rows: Vec<_> = guard
            .article_progress
            .iter()
            .filter(|p| &p.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.read_at.cmp(&a.read_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl QuizProgressRepository for InMemoryRemote {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        guard.quiz_progress.push(attempt.clone());
        Ok(())
    }

    async fn attempts_for_user(
        &self,
        user_id: &AnonymousId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let guard = self.tables()?;
        Ok(guard
            .quiz_progress
            .iter()
            .filter(|a| &a.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ObjectStore for InMemoryRemote {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        upsert: bool,
    ) -> Result<(), StorageError> {
        let mut guard = self.tables()?;
        if !upsert && guard.objects.contains_key(key) {
            return Err(StorageError::Conflict);
        }
        guard
            .objects
            .insert(key.to_owned(), (content_type.to_owned(), bytes));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://objects/{key}")
    }
}

//
// ─── IN-MEMORY DEVICE STORES ───────────────────────────────────────────────────
//

/// In-memory key-value and secure store, for tests.
///
/// `set_unavailable(true)` makes every call fail, simulating a broken device store.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    secrets: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn guard<'a>(
        &self,
        map: &'a Mutex<HashMap<String, String>>,
    ) -> Result<std::sync::MutexGuard<'a, HashMap<String, String>>, StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("device storage unavailable".into()));
        }
        map.lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.guard(&self.values)?.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.guard(&self.values)?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[async_trait]
impl SecureStore for InMemoryKeyValueStore {
    async fn get_secret(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.guard(&self.secrets)?.get(key).cloned())
    }

    async fn set_secret(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.guard(&self.secrets)?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn delete_secret(&self, key: &str) -> Result<(), StorageError> {
        self.guard(&self.secrets)?.remove(key);
        Ok(())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates every storage contract behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub remote_articles: Arc<dyn RemoteArticleBackend>,
    pub local_articles: Arc<dyn LocalArticleBackend>,
    pub article_progress: Arc<dyn ArticleProgressRepository>,
    pub quiz_progress: Arc<dyn QuizProgressRepository>,
    pub objects: Arc<dyn ObjectStore>,
    pub secure: Arc<dyn SecureStore>,
}

impl Storage {
    /// Everything in memory; the remote is reachable.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_parts(InMemoryRemote::new(), InMemoryKeyValueStore::new())
    }

    /// Wire an in-memory remote and device store together.
    #[must_use]
    pub fn from_parts(remote: InMemoryRemote, device: InMemoryKeyValueStore) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(device.clone());
        Self {
            remote_articles: Arc::new(remote.clone()),
            local_articles: Arc::new(crate::local::LocalArticleStore::new(kv)),
            article_progress: Arc::new(remote.clone()),
            quiz_progress: Arc::new(remote.clone()),
            objects: Arc::new(remote),
            secure: Arc::new(device),
        }
    }
}
