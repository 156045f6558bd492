use std::sync::Arc;

use storage::local::{LOCAL_ARTICLES_KEY, LocalArticleStore};
use storage::repository::{ArticleBackend, KeyValueStore, SecureStore, Storage};
use storage::sqlite::SqliteRepository;
use study_core::model::{Article, ArticleDraft, ArticleId};
use study_core::time::fixed_now;

fn build_article(id: &str) -> Article {
    let draft = ArticleDraft::new(format!("Title {id}"), "Body").validate().unwrap();
    Article::create(ArticleId::new(id), draft, None, fixed_now())
}

#[tokio::test]
async fn sqlite_key_value_round_trip_and_overwrite() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_kv?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    // migrations are idempotent
    repo.migrate().await.expect("migrate twice");

    assert!(repo.get_item("missing").await.unwrap().is_none());
    repo.set_item("k", "one").await.unwrap();
    repo.set_item("k", "two").await.unwrap();
    assert_eq!(repo.get_item("k").await.unwrap().as_deref(), Some("two"));
}

#[tokio::test]
async fn sqlite_secure_store_is_separate_from_app_data() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_secure?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.set_secret("anonymous_user_id", "abc").await.unwrap();
    assert!(repo.get_item("anonymous_user_id").await.unwrap().is_none());
    assert_eq!(
        repo.get_secret("anonymous_user_id").await.unwrap().as_deref(),
        Some("abc")
    );
    repo.delete_secret("anonymous_user_id").await.unwrap();
    assert!(repo.get_secret("anonymous_user_id").await.unwrap().is_none());
}

#[tokio::test]
async fn local_articles_persist_through_sqlite() {
    let repo = SqliteRepository::connect("sqlite:file:memdb_local_articles?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    let kv: Arc<dyn KeyValueStore> = Arc::new(repo.clone());
    let store = LocalArticleStore::new(kv);

    store.insert_article(&build_article("L1")).await.unwrap();
    store.insert_article(&build_article("L2")).await.unwrap();

    let raw = repo.get_item(LOCAL_ARTICLES_KEY).await.unwrap().unwrap();
    assert!(raw.starts_with('['));
    assert!(raw.contains("\"L1\""));

    assert!(store.delete_article(&ArticleId::new("L1")).await.unwrap());
    let left = store.list_articles().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, ArticleId::new("L2"));
}

#[tokio::test]
async fn storage_without_remote_runs_offline() {
    let storage = Storage::sqlite("sqlite:file:memdb_offline?mode=memory&cache=shared", None)
        .await
        .expect("open storage");
    assert!(storage.remote_articles.list_articles().await.is_err());
    assert!(storage.local_articles.list_articles().await.unwrap().is_empty());
}
