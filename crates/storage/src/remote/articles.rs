use async_trait::async_trait;
use serde::Deserialize;
use study_core::model::{Article, ArticleId, ArticlePatch};

use super::{RemoteClient, in_filter};
use crate::repository::{ArticleBackend, RemoteArticleBackend, StorageError};

const TABLE: &str = "articles";

#[derive(Deserialize)]
struct IdRow {
    id: ArticleId,
}

#[async_trait]
impl ArticleBackend for RemoteClient {
    async fn list_articles(&self) -> Result<Vec<Article>, StorageError> {
        let request = self
            .client
            .get(self.table_url(TABLE))
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        self.send_json(request).await
    }

    async fn get_article(&self, id: &ArticleId) -> Result<Option<Article>, StorageError> {
        let request = self.client.get(self.table_url(TABLE)).query(&[
            ("select", "*".to_owned()),
            ("id", format!("eq.{id}")),
            ("limit", "1".to_owned()),
        ]);
        match self.send_json::<Vec<Article>>(request).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(StorageError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn insert_article(&self, article: &Article) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.table_url(TABLE))
            .header("Prefer", "return=minimal")
            .json(article);
        self.send(request).await?;
        Ok(())
    }

    async fn update_article(
        &self,
        id: &ArticleId,
        patch: &ArticlePatch,
    ) -> Result<Option<Article>, StorageError> {
        // An update matching zero rows still succeeds, so ask for the rows back.
        let request = self
            .client
            .patch(self.table_url(TABLE))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation")
            .json(patch);
        let rows: Vec<Article> = self.send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn delete_article(&self, id: &ArticleId) -> Result<bool, StorageError> {
        let request = self
            .client
            .delete(self.table_url(TABLE))
            .query(&[("id", format!("eq.{id}"))])
            .header("Prefer", "return=representation");
        let rows: Vec<IdRow> = self.send_json(request).await?;
        Ok(!rows.is_empty())
    }
}

#[async_trait]
impl RemoteArticleBackend for RemoteClient {
    async fn existing_ids(&self, ids: &[ArticleId]) -> Result<Vec<ArticleId>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.client.get(self.table_url(TABLE)).query(&[
            ("select", "id".to_owned()),
            ("id", in_filter(ids.iter().map(ArticleId::as_str))),
        ]);
        let rows: Vec<IdRow> = self.send_json(request).await?;
        Ok(rows.into_iter().map(|r| r.id).collect())
    }
}
