//! Articles live in two places: the hosted table and a device-local list that
//! only holds articles whose remote insert failed. `ArticleService` presents
//! both as one collection.

use std::collections::HashSet;
use std::sync::Arc;

use storage::repository::{
    ArticleBackend, ArticleProgressRepository, LocalArticleBackend, RemoteArticleBackend,
    StorageError,
};
use study_core::model::{Article, ArticleDraft, ArticleId, ArticlePatch, sort_by_recency};

use crate::Clock;
use crate::error::ArticleServiceError;
use crate::image_upload::{ImageSource, ImageUploader};

/// Where a saved article ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveLocation {
    Remote,
    Local,
}

/// Non-fatal problems encountered while saving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveWarning {
    /// The article was saved without the new image.
    ImageUploadFailed,
}

/// Explicit saves report warnings; auto-saves stay silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveMode {
    #[default]
    Explicit,
    AutoSave,
}

/// What to do with an article's image on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageChange {
    /// Keep the given URL (or no image).
    Keep(Option<String>),
    /// Upload a new image; `previous` is kept if the upload fails.
    Replace {
        source: ImageSource,
        previous: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub article: Article,
    pub location: SaveLocation,
    pub warnings: Vec<SaveWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub remote_deleted: bool,
    pub local_removed: bool,
}

/// Orchestrates article reads and writes across the remote and local stores.
#[derive(Clone)]
pub struct ArticleService {
    clock: Clock,
    remote: Arc<dyn RemoteArticleBackend>,
    local: Arc<dyn LocalArticleBackend>,
    progress: Arc<dyn ArticleProgressRepository>,
    images: ImageUploader,
}

impl ArticleService {
    #[must_use]
    pub fn new(
        clock: Clock,
        remote: Arc<dyn RemoteArticleBackend>,
        local: Arc<dyn LocalArticleBackend>,
        progress: Arc<dyn ArticleProgressRepository>,
        images: ImageUploader,
    ) -> Self {
        Self {
            clock,
            remote,
            local,
            progress,
            images,
        }
    }

    /// Every visible article, each id once, most recently edited first.
    ///
    /// Runs the local cleanup pass first. A failing source contributes
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns `ArticleServiceError::Unavailable` only when the remote and the
    /// device store both failed.
    pub async fn list_articles(&self) -> Result<Vec<Article>, ArticleServiceError> {
        self.cleanup_local().await;

        let remote = match self.remote.list_articles().await {
            Ok(list) => Ok(list),
            Err(StorageError::NotFound) => {
                tracing::info!("remote articles table not found; showing local articles only");
                Ok(Vec::new())
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to list remote articles");
                Err(err)
            }
        };
        let local = self.local.list_articles().await;

        let (remote, local) = match (remote, local) {
            (Err(_), Err(err)) => {
                tracing::error!(error = %err, "no article source could be read");
                return Err(ArticleServiceError::Unavailable(err));
            }
            (remote, local) => (
                remote.unwrap_or_default(),
                local.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "failed to read local articles");
                    Vec::new()
                }),
            ),
        };
        Ok(merge_articles(remote, local))
    }

    /// Articles whose title contains `query`, case-insensitively.
    ///
    /// # Errors
    ///
    /// Same as [`ArticleService::list_articles`].
    pub async fn search_articles(&self, query: &str) -> Result<Vec<Article>, ArticleServiceError> {
        let mut articles = self.list_articles().await?;
        articles.retain(|a| a.matches_title(query));
        Ok(articles)
    }

    /// Drop local articles that now also exist remotely.
    ///
    /// Best-effort: failures are logged and count as zero removed.
    pub async fn cleanup_local(&self) -> usize {
        let local = match self.local.list_articles().await {
            Ok(list) if list.is_empty() => return 0,
            Ok(list) => list,
            Err(err) => {
                tracing::warn!(error = %err, "cleanup skipped: local articles unreadable");
                return 0;
            }
        };
        let ids: Vec<ArticleId> = local.into_iter().map(|a| a.id).collect();
        let on_remote = match self.remote.existing_ids(&ids).await {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!(error = %err, "cleanup skipped: remote check failed");
                return 0;
            }
        };
        match self.local.remove_articles(&on_remote).await {
            Ok(removed) => {
                if removed > 0 {
                    tracing::info!(removed, "pruned local articles already stored remotely");
                }
                removed
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to write pruned local articles");
                0
            }
        }
    }

    /// Fetch one article, preferring the remote copy.
    ///
    /// # Errors
    ///
    /// Returns `ArticleServiceError::NotFound` when neither store has `id`,
    /// or `Unavailable` when both stores failed.
    pub async fn get_article(&self, id: &ArticleId) -> Result<Article, ArticleServiceError> {
        let remote_failed = match self.remote.get_article(id).await {
            Ok(Some(article)) => return Ok(article),
            Ok(None) | Err(StorageError::NotFound) => false,
            Err(err) => {
                tracing::warn!(%id, error = %err, "remote lookup failed; checking local");
                true
            }
        };
        match self.local.get_article(id).await {
            Ok(Some(article)) => Ok(article),
            Ok(None) => Err(ArticleServiceError::NotFound(id.clone())),
            Err(err) if remote_failed => Err(ArticleServiceError::Unavailable(err)),
            Err(err) => {
                tracing::warn!(%id, error = %err, "local lookup failed");
                Err(ArticleServiceError::NotFound(id.clone()))
            }
        }
    }

    /// Create an article remotely, or locally when the remote insert fails.
    ///
    /// Exactly one durable copy is written.
    ///
    /// # Errors
    ///
    /// Returns `ArticleServiceError::Invalid` for a blank title or content,
    /// or `Unavailable` when both the remote insert and the local append fail.
    pub async fn create_article(
        &self,
        draft: ArticleDraft,
        image: Option<ImageSource>,
    ) -> Result<SaveOutcome, ArticleServiceError> {
        let draft = draft.validate()?;
        let mut warnings = Vec::new();
        let image_url = match image {
            Some(source) => {
                let url = self.images.upload(&source).await;
                if url.is_none() {
                    warnings.push(SaveWarning::ImageUploadFailed);
                }
                url
            }
            None => None,
        };

        let article = Article::create(ArticleId::generate(), draft, image_url, self.clock.now());
        let location = match self.remote.insert_article(&article).await {
            Ok(()) => SaveLocation::Remote,
            Err(err) => {
                tracing::warn!(id = %article.id, error = %err, "remote insert failed; saving locally");
                self.local
                    .insert_article(&article)
                    .await
                    .map_err(ArticleServiceError::Unavailable)?;
                SaveLocation::Local
            }
        };
        tracing::info!(id = %article.id, ?location, "article created");
        Ok(SaveOutcome {
            article,
            location,
            warnings,
        })
    }

    /// Edit an article wherever it lives.
    ///
    /// # Errors
    ///
    /// Returns `ArticleServiceError::Invalid` for a blank title or content,
    /// `NotFound` when neither store holds `id`, or `Unavailable` when the
    /// remote failed and the article is not stored locally.
    pub async fn update_article(
        &self,
        id: &ArticleId,
        draft: ArticleDraft,
        image: ImageChange,
        mode: SaveMode,
    ) -> Result<SaveOutcome, ArticleServiceError> {
        let draft = draft.validate()?;
        let mut warnings = Vec::new();
        let image_url = match image {
            ImageChange::Keep(url) => url,
            ImageChange::Replace { source, previous } => match self.images.upload(&source).await {
                Some(url) => Some(url),
                None => {
                    warnings.push(SaveWarning::ImageUploadFailed);
                    previous
                }
            },
        };
        if mode == SaveMode::AutoSave {
            warnings.clear();
        }

        let patch = ArticlePatch::new(draft, image_url, self.clock.now());
        let remote_error = match self.remote.update_article(id, &patch).await {
            Ok(Some(article)) => {
                tracing::debug!(%id, ?mode, "article updated remotely");
                return Ok(SaveOutcome {
                    article,
                    location: SaveLocation::Remote,
                    warnings,
                });
            }
            Ok(None) | Err(StorageError::NotFound) => None,
            Err(err) => {
                tracing::warn!(%id, error = %err, "remote update failed; trying local copy");
                Some(err)
            }
        };

        match self.local.update_article(id, &patch).await {
            Ok(Some(article)) => {
                tracing::debug!(%id, ?mode, "article updated locally");
                Ok(SaveOutcome {
                    article,
                    location: SaveLocation::Local,
                    warnings,
                })
            }
            Ok(None) => match remote_error {
                Some(err) => Err(ArticleServiceError::Unavailable(err)),
                None => Err(ArticleServiceError::NotFound(id.clone())),
            },
            Err(err) => Err(ArticleServiceError::Unavailable(err)),
        }
    }

    /// Background save from the editor. Never surfaces an error.
    pub async fn autosave_article(
        &self,
        id: &ArticleId,
        draft: ArticleDraft,
        image: ImageChange,
    ) -> Option<SaveOutcome> {
        match self
            .update_article(id, draft, image, SaveMode::AutoSave)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                tracing::warn!(%id, error = %err, "auto-save failed");
                None
            }
        }
    }

    /// Delete an article and its read progress from every location.
    ///
    /// Each step runs even if an earlier one failed. Deleting an id that no
    /// longer exists succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ArticleServiceError::DeleteFailed` only when the remote delete
    /// errored and no local copy was removed.
    pub async fn delete_article(&self, id: &ArticleId) -> Result<DeleteOutcome, ArticleServiceError> {
        if let Err(err) = self.progress.delete_progress_for_article(id).await {
            tracing::warn!(%id, error = %err, "failed to delete read progress");
        }
        let remote = self.remote.delete_article(id).await;
        let local_removed = match self.local.delete_article(id).await {
            Ok(removed) => removed,
            Err(err) => {
                tracing::warn!(%id, error = %err, "failed to delete local copy");
                false
            }
        };

        match remote {
            Ok(remote_deleted) => Ok(DeleteOutcome {
                remote_deleted,
                local_removed,
            }),
            Err(StorageError::NotFound) => Ok(DeleteOutcome {
                remote_deleted: false,
                local_removed,
            }),
            Err(err) if local_removed => {
                tracing::warn!(%id, error = %err, "remote delete failed; local copy removed");
                Ok(DeleteOutcome {
                    remote_deleted: false,
                    local_removed,
                })
            }
            Err(source) => Err(ArticleServiceError::DeleteFailed {
                id: id.clone(),
                source,
            }),
        }
    }
}

/// Concatenate remote then local, keep the first entry per id, then sort.
///
/// Remote entries come first, so the remote copy wins an overlap.
fn merge_articles(remote: Vec<Article>, local: Vec<Article>) -> Vec<Article> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Article> = remote
        .into_iter()
        .chain(local)
        .filter(|a| seen.insert(a.id.clone()))
        .collect();
    sort_by_recency(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::repository::{InMemoryKeyValueStore, InMemoryRemote, Storage};
    use study_core::time::{fixed_clock, fixed_now};

    fn article(id: &str, title: &str, hours: i64) -> Article {
        let draft = ArticleDraft::new(title, "body").validate().unwrap();
        Article::create(
            ArticleId::new(id),
            draft,
            None,
            fixed_now() + Duration::hours(hours),
        )
    }

    fn service(storage: &Storage) -> ArticleService {
        ArticleService::new(
            fixed_clock(),
            Arc::clone(&storage.remote_articles),
            Arc::clone(&storage.local_articles),
            Arc::clone(&storage.article_progress),
            ImageUploader::new(Arc::clone(&storage.objects)),
        )
    }

    fn setup() -> (InMemoryRemote, InMemoryKeyValueStore, Storage) {
        let remote = InMemoryRemote::new();
        let device = InMemoryKeyValueStore::new();
        let storage = Storage::from_parts(remote.clone(), device.clone());
        (remote, device, storage)
    }

    #[test]
    fn merge_keeps_remote_copy_and_sorts() {
        let mut stale = article("x", "local x", 5);
        stale.content = "stale".into();
        let merged = merge_articles(
            vec![article("x", "remote x", 1), article("r", "r", 2)],
            vec![stale, article("l", "l", 3)],
        );
        let ids: Vec<_> = merged.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["l", "r", "x"]);
        assert_eq!(merged[2].title, "remote x");
    }

    #[tokio::test]
    async fn list_with_both_sources_down_is_unavailable() {
        let (remote, device, storage) = setup();
        remote.set_offline(true);
        device.set_unavailable(true);
        assert!(matches!(
            service(&storage).list_articles().await,
            Err(ArticleServiceError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn list_with_one_source_down_degrades() {
        let (remote, device, storage) = setup();
        remote.insert_article(&article("r", "r", 0)).await.unwrap();
        device.set_unavailable(true);
        let list = service(&storage).list_articles().await.unwrap();
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn search_filters_by_title() {
        let (remote, _, storage) = setup();
        remote
            .insert_article(&article("a", "Rust ownership", 0))
            .await
            .unwrap();
        remote
            .insert_article(&article("b", "Gardening", 1))
            .await
            .unwrap();
        let found = service(&storage).search_articles("RUST").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ArticleId::new("a"));
    }

    #[tokio::test]
    async fn create_rejects_blank_fields() {
        let (_, _, storage) = setup();
        let err = service(&storage)
            .create_article(ArticleDraft::new("  ", "C"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ArticleServiceError::Invalid(_)));
    }

    #[tokio::test]
    async fn create_with_bad_image_warns_but_saves() {
        let (remote, _, storage) = setup();
        let outcome = service(&storage)
            .create_article(
                ArticleDraft::new("T", "C"),
                Some(ImageSource::Bytes(b"garbage".to_vec())),
            )
            .await
            .unwrap();
        assert_eq!(outcome.location, SaveLocation::Remote);
        assert_eq!(outcome.warnings, vec![SaveWarning::ImageUploadFailed]);
        assert!(outcome.article.image_url.is_none());
        assert!(remote.get_article(&outcome.article.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_fails_when_both_stores_fail() {
        let (remote, device, storage) = setup();
        remote.set_offline(true);
        device.set_unavailable(true);
        let err = service(&storage)
            .create_article(ArticleDraft::new("T", "C"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ArticleServiceError::Unavailable(_)));
    }

    #[tokio::test]
    async fn update_prefers_remote_then_local() {
        let (remote, _, storage) = setup();
        let svc = service(&storage);
        remote.insert_article(&article("r", "old", 0)).await.unwrap();
        storage
            .local_articles
            .insert_article(&article("l", "old", 0))
            .await
            .unwrap();

        let r = svc
            .update_article(
                &ArticleId::new("r"),
                ArticleDraft::new("new r", "b"),
                ImageChange::Keep(None),
                SaveMode::Explicit,
            )
            .await
            .unwrap();
        assert_eq!(r.location, SaveLocation::Remote);
        assert_eq!(r.article.title, "new r");

        let l = svc
            .update_article(
                &ArticleId::new("l"),
                ArticleDraft::new(" new l ", "b"),
                ImageChange::Keep(Some("memory://objects/old.jpg".into())),
                SaveMode::Explicit,
            )
            .await
            .unwrap();
        assert_eq!(l.location, SaveLocation::Local);
        assert_eq!(l.article.title, "new l");
        assert_eq!(l.article.image_url.as_deref(), Some("memory://objects/old.jpg"));
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let (_, _, storage) = setup();
        let err = service(&storage)
            .update_article(
                &ArticleId::new("ghost"),
                ArticleDraft::new("t", "c"),
                ImageChange::Keep(None),
                SaveMode::Explicit,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArticleServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn failed_replacement_keeps_previous_image() {
        let (remote, _, storage) = setup();
        let svc = service(&storage);
        remote.insert_article(&article("r", "t", 0)).await.unwrap();
        let change = || ImageChange::Replace {
            source: ImageSource::Bytes(b"nope".to_vec()),
            previous: Some("memory://objects/prev.jpg".into()),
        };

        let explicit = svc
            .update_article(
                &ArticleId::new("r"),
                ArticleDraft::new("t", "c"),
                change(),
                SaveMode::Explicit,
            )
            .await
            .unwrap();
        assert_eq!(explicit.warnings, vec![SaveWarning::ImageUploadFailed]);
        assert_eq!(
            explicit.article.image_url.as_deref(),
            Some("memory://objects/prev.jpg")
        );

        let auto = svc
            .autosave_article(&ArticleId::new("r"), ArticleDraft::new("t", "c"), change())
            .await
            .unwrap();
        assert!(auto.warnings.is_empty());
    }

    #[tokio::test]
    async fn autosave_swallows_errors() {
        let (_, _, storage) = setup();
        let svc = service(&storage);
        assert!(
            svc.autosave_article(
                &ArticleId::new("ghost"),
                ArticleDraft::new("t", "c"),
                ImageChange::Keep(None)
            )
            .await
            .is_none()
        );
        assert!(
            svc.autosave_article(
                &ArticleId::new("ghost"),
                ArticleDraft::new("", ""),
                ImageChange::Keep(None)
            )
            .await
            .is_none()
        );
    }

    #[tokio::test]
    async fn delete_fails_only_without_remote_and_local_copy() {
        let (remote, _, storage) = setup();
        let svc = service(&storage);
        remote.set_offline(true);
        let err = svc.delete_article(&ArticleId::new("x")).await.unwrap_err();
        assert!(matches!(err, ArticleServiceError::DeleteFailed { .. }));

        storage
            .local_articles
            .insert_article(&article("x", "t", 0))
            .await
            .unwrap();
        let outcome = svc.delete_article(&ArticleId::new("x")).await.unwrap();
        assert_eq!(
            outcome,
            DeleteOutcome {
                remote_deleted: false,
                local_removed: true
            }
        );
    }

    #[tokio::test]
    async fn cleanup_is_a_no_op_when_remote_is_down() {
        let (remote, _, storage) = setup();
        storage
            .local_articles
            .insert_article(&article("x", "t", 0))
            .await
            .unwrap();
        remote.set_offline(true);
        let svc = service(&storage);
        assert_eq!(svc.cleanup_local().await, 0);
        assert_eq!(storage.local_articles.list_articles().await.unwrap().len(), 1);
    }
}
