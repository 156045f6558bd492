use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use study_core::model::{AnonymousId, ArticleId, ArticleProgress, QuizAttempt};

use super::RemoteClient;
use crate::repository::{ArticleProgressRepository, QuizProgressRepository, StorageError};

const ARTICLE_PROGRESS: &str = "article_progress";
const QUIZ_PROGRESS: &str = "quiz_progress";

#[derive(Serialize)]
struct ReadUpdate {
    read_count: u32,
    #[serde(with = "study_core::time::timestamp")]
    read_at: DateTime<Utc>,
}

#[async_trait]
impl ArticleProgressRepository for RemoteClient {
    async fn find_progress(
        &self,
        article_id: &ArticleId,
        user_id: &AnonymousId,
    ) -> Result<Option<ArticleProgress>, StorageError> {
        let request = self.client.get(self.table_url(ARTICLE_PROGRESS)).query(&[
            ("select", "*".to_owned()),
            ("article_id", format!("eq.{article_id}")),
            ("user_id", format!("eq.{user_id}")),
            ("limit", "1".to_owned()),
        ]);
        match self.send_json::<Vec<ArticleProgress>>(request).await {
            Ok(rows) => Ok(rows.into_iter().next()),
            Err(StorageError::NotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn insert_progress(&self, progress: &ArticleProgress) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.table_url(ARTICLE_PROGRESS))
            .header("Prefer", "return=minimal")
            .json(progress);
        self.send(request).await?;
        Ok(())
    }

    async fn update_progress(&self, progress: &ArticleProgress) -> Result<(), StorageError> {
        let request = self
            .client
            .patch(self.table_url(ARTICLE_PROGRESS))
            .query(&[("id", format!("eq.{}", progress.id))])
            .header("Prefer", "return=minimal")
            .json(&ReadUpdate {
                read_count: progress.read_count,
                read_at: progress.read_at,
            });
        self.send(request).await?;
        Ok(())
    }

    async fn delete_progress_for_article(
        &self,
        article_id: &ArticleId,
    ) -> Result<(), StorageError> {
        let request = self
            .client
            .delete(self.table_url(ARTICLE_PROGRESS))
            .query(&[("article_id", format!("eq.{article_id}"))]);
        self.send(request).await?;
        Ok(())
    }

    async fn recent_progress(
        &self,
        user_id: &AnonymousId,
        limit: u32,
    ) -> Result<Vec<ArticleProgress>, StorageError> {
        let request = self.client.get(self.table_url(ARTICLE_PROGRESS)).query(&[
            ("select", "*".to_owned()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "read_at.desc".to_owned()),
            ("limit", limit.to_string()),
        ]);
        self.send_json(request).await
    }
}

#[async_trait]
impl QuizProgressRepository for RemoteClient {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<(), StorageError> {
        let request = self
            .client
            .post(self.table_url(QUIZ_PROGRESS))
            .header("Prefer", "return=minimal")
            .json(attempt);
        self.send(request).await?;
        Ok(())
    }

    async fn attempts_for_user(
        &self,
        user_id: &AnonymousId,
    ) -> Result<Vec<QuizAttempt>, StorageError> {
        let request = self.client.get(self.table_url(QUIZ_PROGRESS)).query(&[
            ("select", "*".to_owned()),
            ("user_id", format!("eq.{user_id}")),
        ]);
        self.send_json(request).await
    }
}
