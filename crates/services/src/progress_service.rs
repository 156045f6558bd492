use std::collections::HashMap;
use std::sync::Arc;

use storage::repository::{ArticleProgressRepository, QuizProgressRepository, StorageError};
use study_core::model::{
    Article, ArticleId, ArticleProgress, ArticleRead, ProgressStats, QuizAttempt, QuizBank,
    QuizQuestion,
};

use crate::Clock;
use crate::identity::IdentityService;

/// How many recently read articles the statistics list.
pub const RECENT_ARTICLES_LIMIT: u32 = 10;

/// Records article views and quiz attempts for this device.
///
/// Tracking is best-effort: failures are logged and never reach the caller.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    identity: Arc<IdentityService>,
    article_progress: Arc<dyn ArticleProgressRepository>,
    quiz_progress: Arc<dyn QuizProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        identity: Arc<IdentityService>,
        article_progress: Arc<dyn ArticleProgressRepository>,
        quiz_progress: Arc<dyn QuizProgressRepository>,
    ) -> Self {
        Self {
            clock,
            identity,
            article_progress,
            quiz_progress,
        }
    }

    /// Count a view of `article_id`, creating the row on first view.
    pub async fn track_article_view(&self, article_id: &ArticleId) -> Option<ArticleProgress> {
        match self.upsert_view(article_id).await {
            Ok(progress) => Some(progress),
            Err(err) => {
                tracing::warn!(%article_id, error = %err, "failed to track article view");
                None
            }
        }
    }

    async fn upsert_view(&self, article_id: &ArticleId) -> Result<ArticleProgress, StorageError> {
        let user_id = self.identity.anonymous_id().await;
        let now = self.clock.now();
        match self
            .article_progress
            .find_progress(article_id, &user_id)
            .await?
        {
            Some(mut progress) => {
                progress.record_read(now);
                self.article_progress.update_progress(&progress).await?;
                Ok(progress)
            }
            None => {
                let progress = ArticleProgress::first_read(article_id.clone(), user_id, now);
                self.article_progress.insert_progress(&progress).await?;
                Ok(progress)
            }
        }
    }

    /// Append one quiz attempt.
    pub async fn record_quiz_attempt(
        &self,
        question: &QuizQuestion,
        is_correct: bool,
        time_taken_secs: u32,
    ) -> Option<QuizAttempt> {
        let user_id = self.identity.anonymous_id().await;
        let question_id = &question.id;
        let attempt = QuizAttempt::new(
            question_id.clone(),
            user_id,
            is_correct,
            time_taken_secs,
            self.clock.now(),
        )
        .with_category(question.category.clone());
        match self.quiz_progress.insert_attempt(&attempt).await {
            Ok(()) => Some(attempt),
            Err(err) => {
                tracing::warn!(%question_id, error = %err, "failed to record quiz attempt");
                None
            }
        }
    }

    /// Aggregate statistics for this device.
    ///
    /// `visible` is the current article list; it supplies the article total
    /// and the titles of recently read articles. Unreadable progress data
    /// counts as none.
    pub async fn progress_stats(&self, bank: &QuizBank, visible: &[Article]) -> ProgressStats {
        let user_id = self.identity.anonymous_id().await;

        let attempts = self
            .quiz_progress
            .attempts_for_user(&user_id)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to load quiz attempts");
                Vec::new()
            });
        let reads = self
            .article_progress
            .recent_progress(&user_id, RECENT_ARTICLES_LIMIT)
            .await
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "failed to load read progress");
                Vec::new()
            });

        let titles: HashMap<&ArticleId, &str> =
            visible.iter().map(|a| (&a.id, a.title.as_str())).collect();
        let recent_articles = reads
            .into_iter()
            .map(|p| ArticleRead {
                title: titles
                    .get(&p.article_id)
                    .map_or_else(|| format!("Article {}", p.article_id), |t| (*t).to_owned()),
                read_at: p.read_at,
                read_count: p.read_count,
            })
            .collect();

        ProgressStats::compute(&attempts, bank, recent_articles, visible.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use storage::repository::{InMemoryKeyValueStore, InMemoryRemote};
    use study_core::model::ArticleDraft;
    use study_core::time::fixed_now;

    fn service_with(
        remote: &InMemoryRemote,
        identity: &Arc<IdentityService>,
        clock: Clock,
    ) -> ProgressService {
        ProgressService::new(
            clock,
            Arc::clone(identity),
            Arc::new(remote.clone()),
            Arc::new(remote.clone()),
        )
    }

    fn service(remote: &InMemoryRemote, clock: Clock) -> ProgressService {
        let identity = Arc::new(IdentityService::new(Arc::new(InMemoryKeyValueStore::new())));
        service_with(remote, &identity, clock)
    }

    #[tokio::test]
    async fn repeated_views_increment_one_row() {
        let remote = InMemoryRemote::new();
        let identity = Arc::new(IdentityService::new(Arc::new(InMemoryKeyValueStore::new())));
        let mut clock = Clock::fixed(fixed_now());
        let id = ArticleId::new("a1");

        let first = service_with(&remote, &identity, clock)
            .track_article_view(&id)
            .await
            .unwrap();
        assert_eq!(first.read_count, 1);

        clock.advance(Duration::minutes(5));
        let second = service_with(&remote, &identity, clock)
            .track_article_view(&id)
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.read_count, 2);
        assert_eq!(second.read_at, fixed_now() + Duration::minutes(5));

        // another device gets its own row
        let other = service(&remote, clock).track_article_view(&id).await.unwrap();
        assert_eq!(other.read_count, 1);
        assert_ne!(other.user_id, first.user_id);
    }

    #[tokio::test]
    async fn tracking_failures_are_swallowed() {
        let remote = InMemoryRemote::offline();
        let svc = service(&remote, Clock::fixed(fixed_now()));
        let bank = QuizBank::bundled().unwrap();
        assert!(svc.track_article_view(&ArticleId::new("a")).await.is_none());
        assert!(
            svc.record_quiz_attempt(&bank.questions()[0], true, 3)
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn stats_resolve_titles_with_fallback() {
        let remote = InMemoryRemote::new();
        let svc = service(&remote, Clock::fixed(fixed_now()));
        let bank = QuizBank::bundled().unwrap();
        let question = &bank.questions()[0];

        svc.track_article_view(&ArticleId::new("known")).await.unwrap();
        svc.track_article_view(&ArticleId::new("gone")).await.unwrap();
        let attempt = svc.record_quiz_attempt(question, true, 4).await.unwrap();
        assert_eq!(attempt.category, question.category);
        svc.record_quiz_attempt(question, false, 9).await.unwrap();

        let draft = ArticleDraft::new("Known title", "c").validate().unwrap();
        let visible = vec![Article::create(
            ArticleId::new("known"),
            draft,
            None,
            fixed_now(),
        )];
        let stats = svc.progress_stats(&bank, &visible).await;

        assert_eq!(stats.total_quizzes, 2);
        assert_eq!(stats.accuracy, 50);
        assert_eq!(stats.total_articles, 1);
        assert_eq!(stats.articles_read, 2);
        let mut titles: Vec<_> = stats.recent_articles.iter().map(|r| r.title.as_str()).collect();
        titles.sort_unstable();
        assert_eq!(titles, ["Article gone", "Known title"]);
        assert_eq!(stats.recent_scores, vec![50]);
    }

    #[tokio::test]
    async fn stats_degrade_to_zero_when_remote_is_down() {
        let remote = InMemoryRemote::offline();
        let svc = service(&remote, Clock::fixed(fixed_now()));
        let stats = svc.progress_stats(&QuizBank::bundled().unwrap(), &[]).await;
        assert_eq!(stats, ProgressStats::default());
    }
}
