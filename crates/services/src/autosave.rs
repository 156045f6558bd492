//! Debounced background saving for the article editor.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use study_core::model::{ArticleDraft, ArticleId};
use tokio::task::JoinHandle;

use crate::article_service::{ArticleService, ImageChange};

/// Quiet period after the last edit before an auto-save runs.
pub const DEFAULT_AUTOSAVE_DELAY: Duration = Duration::from_secs(5);

/// Keeps at most one delayed task waiting at a time.
///
/// Scheduling again cancels the previous task while it is still waiting.
/// A task whose delay has elapsed always runs to completion. Dropping the
/// debouncer cancels the waiting task the same way.
///
/// Must be used from within a tokio runtime.
#[derive(Default)]
pub struct Debouncer {
    pending: Mutex<Option<Pending>>,
}

struct Pending {
    handle: JoinHandle<()>,
    /// Set by whichever side gets there first: the task when it starts
    /// running, or the debouncer when it cancels.
    claimed: Arc<AtomicBool>,
}

impl Pending {
    fn cancel(self) {
        if !self.claimed.swap(true, Ordering::SeqCst) {
            self.handle.abort();
        }
    }
}

impl Debouncer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay`, replacing anything still waiting.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.cancel();
        }
        let claimed = Arc::new(AtomicBool::new(false));
        let claim = Arc::clone(&claimed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if claim.swap(true, Ordering::SeqCst) {
                return;
            }
            task.await;
        });
        *pending = Some(Pending { handle, claimed });
    }

    /// Cancel the scheduled task if it has not started yet.
    pub fn cancel(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.take() {
            previous.cancel();
        }
    }

    /// Whether the most recently scheduled task has not finished yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|p| !p.handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Auto-save for one article being edited.
pub struct AutoSaver {
    articles: Arc<ArticleService>,
    article_id: ArticleId,
    quiet_period: Duration,
    debouncer: Debouncer,
}

impl AutoSaver {
    #[must_use]
    pub fn new(articles: Arc<ArticleService>, article_id: ArticleId, quiet_period: Duration) -> Self {
        Self {
            articles,
            article_id,
            quiet_period,
            debouncer: Debouncer::new(),
        }
    }

    /// Note an edit. The save runs once edits stop for the quiet period.
    ///
    /// A draft with a blank title or content cancels any pending save
    /// instead of scheduling one.
    pub fn on_edit(&self, draft: ArticleDraft, image: ImageChange) {
        if draft.clone().validate().is_err() {
            self.debouncer.cancel();
            return;
        }
        let articles = Arc::clone(&self.articles);
        let id = self.article_id.clone();
        self.debouncer.schedule(self.quiet_period, async move {
            if articles.autosave_article(&id, draft, image).await.is_some() {
                tracing::debug!(%id, "auto-saved");
            }
        });
    }

    /// Drop any pending save, e.g. when the editor closes after an explicit save.
    pub fn cancel(&self) {
        self.debouncer.cancel();
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter_task(counter: Arc<AtomicUsize>, add: usize) -> impl Future<Output = ()> {
        async move {
            counter.fetch_add(add, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn only_the_last_scheduled_task_runs() {
        let debouncer = Debouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(Duration::from_secs(5), counter_task(Arc::clone(&counter), 1));
        tokio::time::sleep(Duration::from_secs(3)).await;
        debouncer.schedule(Duration::from_secs(5), counter_task(Arc::clone(&counter), 10));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_pending_task() {
        let debouncer = Debouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        debouncer.schedule(Duration::from_secs(1), counter_task(Arc::clone(&counter), 1));
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn a_started_task_is_left_to_finish() {
        let debouncer = Debouncer::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let slow = Arc::clone(&counter);
        debouncer.schedule(Duration::from_secs(1), async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            slow.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(2)).await;

        debouncer.schedule(Duration::from_secs(1), counter_task(Arc::clone(&counter), 10));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);

        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_debouncer_cancels() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let debouncer = Debouncer::new();
            debouncer.schedule(Duration::from_secs(1), counter_task(Arc::clone(&counter), 1));
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
