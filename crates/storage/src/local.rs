//! Locally created articles, kept as one JSON array under a single device key.
//!
//! The device store has no query capability, so every write is a whole-list
//! read-modify-write. Writers inside this process are serialized by an
//! advisory lock; nothing protects against another process writing the key.

use std::sync::Arc;

use async_trait::async_trait;
use study_core::model::{Article, ArticleId, ArticlePatch};
use tokio::sync::Mutex;

use crate::repository::{ArticleBackend, KeyValueStore, LocalArticleBackend, StorageError};

/// Device key holding the serialized list of locally created articles.
pub const LOCAL_ARTICLES_KEY: &str = "userArticles";

pub struct LocalArticleStore {
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl LocalArticleStore {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Strict load: `Ok(None)` when the key was never written, a
    /// `Serialization` error when the stored value is not an article list.
    async fn load(&self) -> Result<Option<Vec<Article>>, StorageError> {
        let Some(raw) = self.kv.get_item(LOCAL_ARTICLES_KEY).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Lenient load for reads: malformed content reads as empty.
    async fn load_lenient(&self) -> Result<Vec<Article>, StorageError> {
        match self.load().await {
            Ok(list) => Ok(list.unwrap_or_default()),
            Err(StorageError::Serialization(reason)) => {
                tracing::warn!(%reason, "local article list is malformed; treating as empty");
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    async fn store(&self, articles: &[Article]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(articles)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.kv.set_item(LOCAL_ARTICLES_KEY, &raw).await
    }
}

#[async_trait]
impl ArticleBackend for LocalArticleStore {
    async fn list_articles(&self) -> Result<Vec<Article>, StorageError> {
        self.load_lenient().await
    }

    async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>, StorageError> {
        Ok(self
            .load_lenient()
            .await?
            .into_iter()
            .find(|a| &a.id == id))
    }

    async fn insert_article(&self, article: &Article) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut list = self.load().await?.unwrap_or_default();
        if list.iter().any(|a| a.id == article.id) {
            return Err(StorageError::Conflict);
        }
        list.push(article.clone());
        self.store(&list).await?;
        tracing::debug!(id = %article.id, total = list.len(), "article saved locally");
        Ok(())
    }

    async fn update_article(
        &self,
        id: &ArticleId,
        patch: &ArticlePatch,
    ) -> Result<Option<Article>, StorageError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut list) = self.load().await? else {
            return Ok(None);
        };
        let Some(entry) = list.iter_mut().find(|a| &a.id == id) else {
            return Ok(None);
        };
        entry.apply(patch);
        let updated = entry.clone();
        self.store(&list).await?;
        Ok(Some(updated))
    }

    async fn delete_article(&self, id: &ArticleId) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut list) = self.load().await? else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|a| &a.id != id);
        if list.len() == before {
            return Ok(false);
        }
        self.store(&list).await?;
        Ok(true)
    }
}

#[async_trait]
impl LocalArticleBackend for LocalArticleStore {
    async fn remove_articles(&self, ids: &[ArticleId]) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock().await;
        let Some(mut list) = self.load().await? else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|a| !ids.contains(&a.id));
        // written back even when nothing changed
        self.store(&list).await?;
        Ok(before - list.len())
    }
}
