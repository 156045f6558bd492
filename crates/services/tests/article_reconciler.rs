use std::sync::Arc;

use chrono::Duration;
use services::{
    ArticleService, ArticleServiceError, Clock, DeleteOutcome, ImageUploader, SaveLocation,
};
use storage::local::LOCAL_ARTICLES_KEY;
use storage::repository::{
    ArticleBackend, InMemoryKeyValueStore, InMemoryRemote, KeyValueStore, Storage,
};
use study_core::model::{Article, ArticleDraft, ArticleId};
use study_core::time::{fixed_clock, fixed_now};

struct Harness {
    remote: InMemoryRemote,
    device: InMemoryKeyValueStore,
    storage: Storage,
    service: ArticleService,
}

fn harness_at(clock: Clock) -> Harness {
    let remote = InMemoryRemote::new();
    let device = InMemoryKeyValueStore::new();
    let storage = Storage::from_parts(remote.clone(), device.clone());
    let service = ArticleService::new(
        clock,
        Arc::clone(&storage.remote_articles),
        Arc::clone(&storage.local_articles),
        Arc::clone(&storage.article_progress),
        ImageUploader::new(Arc::clone(&storage.objects)),
    );
    Harness {
        remote,
        device,
        storage,
        service,
    }
}

fn harness() -> Harness {
    harness_at(fixed_clock())
}

fn dated(id: &str, title: &str, created: &str, updated: Option<&str>) -> Article {
    let raw = serde_json::json!({
        "id": id,
        "title": title,
        "content": "body",
        "created_at": created,
        "updated_at": updated,
    });
    serde_json::from_value(raw).expect("article json")
}

fn ids(list: &[Article]) -> Vec<&str> {
    list.iter().map(|a| a.id.as_str()).collect()
}

#[tokio::test]
async fn recently_edited_local_sorts_after_newer_remote() {
    let h = harness();
    h.remote
        .insert_article(&dated("R1", "remote", "2024-01-03", None))
        .await
        .unwrap();
    h.storage
        .local_articles
        .insert_article(&dated("L1", "local", "2024-01-01", Some("2024-01-02")))
        .await
        .unwrap();

    let list = h.service.list_articles().await.unwrap();
    assert_eq!(ids(&list), ["R1", "L1"]);
}

#[tokio::test]
async fn shared_id_is_pruned_locally_and_served_from_remote() {
    let h = harness();
    let remote_copy = dated("X", "remote copy", "2024-01-01", Some("2024-01-02"));
    let local_copy = dated("X", "local copy", "2024-01-01", Some("2024-01-05"));
    h.remote.insert_article(&remote_copy).await.unwrap();
    h.storage
        .local_articles
        .insert_article(&local_copy)
        .await
        .unwrap();

    let list = h.service.list_articles().await.unwrap();
    assert_eq!(list, vec![remote_copy]);
    assert!(
        h.storage
            .local_articles
            .get_article(&ArticleId::new("X"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn create_falls_back_to_local_when_remote_fails() {
    let h = harness();
    h.remote.set_offline(true);

    let outcome = h
        .service
        .create_article(ArticleDraft::new("T", "C"), None)
        .await
        .unwrap();
    assert_eq!(outcome.location, SaveLocation::Local);
    assert!(outcome.warnings.is_empty());

    let fetched = h.service.get_article(&outcome.article.id).await.unwrap();
    assert_eq!(fetched.title, "T");
    assert_eq!(fetched.content, "C");
    assert_eq!(fetched.created_at, fixed_now());
    assert_eq!(fetched.updated_at, Some(fixed_now()));
}

#[tokio::test]
async fn create_writes_exactly_one_copy() {
    let h = harness();
    let remote_saved = h
        .service
        .create_article(ArticleDraft::new("online", "C"), None)
        .await
        .unwrap();
    assert_eq!(remote_saved.location, SaveLocation::Remote);
    assert!(
        h.storage
            .local_articles
            .get_article(&remote_saved.article.id)
            .await
            .unwrap()
            .is_none()
    );

    h.remote.set_offline(true);
    let local_saved = h
        .service
        .create_article(ArticleDraft::new("offline", "C"), None)
        .await
        .unwrap();
    h.remote.set_offline(false);
    assert!(
        h.remote
            .get_article(&local_saved.article.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn list_never_repeats_an_id_and_is_sorted() {
    let h = harness_at(fixed_clock());
    for (i, id) in ["a", "b", "c"].into_iter().enumerate() {
        let mut article = dated(id, id, "2024-02-01", None);
        article.updated_at = Some(fixed_now() + Duration::hours(i as i64));
        h.remote.insert_article(&article).await.unwrap();
    }
    // a stale copy of "b" plus a local-only record; the device write goes
    // straight to the key so cleanup cannot run first
    let local = vec![
        dated("b", "stale b", "2024-02-01", None),
        dated("d", "d", "2020-01-01", None),
    ];
    h.device
        .set_item(LOCAL_ARTICLES_KEY, &serde_json::to_string(&local).unwrap())
        .await
        .unwrap();
    h.remote.set_offline(true);
    let offline = h.service.list_articles().await.unwrap();
    assert_eq!(ids(&offline), ["b", "d"]);

    h.remote.set_offline(false);
    let list = h.service.list_articles().await.unwrap();
    assert_eq!(ids(&list), ["c", "b", "a", "d"]);
    assert!(
        list.windows(2)
            .all(|pair| pair[0].recency() >= pair[1].recency())
    );
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let h = harness();
    h.remote
        .insert_article(&dated("shared", "s", "2024-01-01", None))
        .await
        .unwrap();
    for id in ["shared", "only-local"] {
        h.storage
            .local_articles
            .insert_article(&dated(id, id, "2024-01-01", None))
            .await
            .unwrap();
    }

    assert_eq!(h.service.cleanup_local().await, 1);
    let after_first = h.device.get_item(LOCAL_ARTICLES_KEY).await.unwrap();
    assert_eq!(h.service.cleanup_local().await, 0);
    let after_second = h.device.get_item(LOCAL_ARTICLES_KEY).await.unwrap();
    assert_eq!(after_first, after_second);
}

#[tokio::test]
async fn delete_twice_succeeds_both_times() {
    let h = harness();
    let saved = h
        .service
        .create_article(ArticleDraft::new("T", "C"), None)
        .await
        .unwrap();
    let id = saved.article.id;

    let first = h.service.delete_article(&id).await.unwrap();
    assert_eq!(
        first,
        DeleteOutcome {
            remote_deleted: true,
            local_removed: false
        }
    );
    let second = h.service.delete_article(&id).await.unwrap();
    assert_eq!(
        second,
        DeleteOutcome {
            remote_deleted: false,
            local_removed: false
        }
    );
    assert!(matches!(
        h.service.get_article(&id).await,
        Err(ArticleServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn malformed_local_list_does_not_hide_remote_articles() {
    let h = harness();
    h.device
        .set_item(LOCAL_ARTICLES_KEY, "[{\"broken\":")
        .await
        .unwrap();
    h.remote
        .insert_article(&dated("r", "r", "2024-01-01", None))
        .await
        .unwrap();

    let list = h.service.list_articles().await.unwrap();
    assert_eq!(ids(&list), ["r"]);
}

#[tokio::test]
async fn missing_article_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.service.get_article(&ArticleId::new("nope")).await,
        Err(ArticleServiceError::NotFound(id)) if id == ArticleId::new("nope")
    ));
}
