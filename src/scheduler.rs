//! Dispatch scheduler: fans a changed URL set into purge and preload tasks.

use std::sync::Arc;

use crate::error::Result;
use crate::events::{ContentEvent, UrlCollector};
use crate::queue::{DispatchTask, TaskQueue};
use crate::urls::UrlSet;

/// Splits a URL set into one `Purge` and one `Preload` task and hands both
/// to the external task queue.
///
/// The two tasks are independent: no ordering is guaranteed between them,
/// and a preload may fetch a URL before its purge has landed. That staleness
/// window is accepted; the next change event closes it.
pub struct DispatchScheduler<Q: TaskQueue> {
    queue: Arc<Q>,
}

impl<Q: TaskQueue> DispatchScheduler<Q> {
    pub fn new(queue: Arc<Q>) -> Self {
        Self { queue }
    }

    /// Enqueue purge and preload work for a deduplicated URL set.
    ///
    /// An empty set enqueues nothing. This performs no network I/O of its
    /// own; its only side effect is two enqueue calls.
    #[tracing::instrument(skip(self, urls), fields(urls = urls.len()))]
    pub async fn schedule(&self, urls: UrlSet) -> Result<()> {
        if urls.is_empty() {
            tracing::debug!("No URLs to schedule");
            return Ok(());
        }

        self.queue
            .enqueue(DispatchTask::purge(urls.clone()))
            .await?;
        self.queue.enqueue(DispatchTask::preload(urls)).await?;
        Ok(())
    }

    /// Collect the URLs affected by a content event and schedule them.
    #[tracing::instrument(skip(self, event, collector), fields(event = event.name()))]
    pub async fn handle_event(
        &self,
        event: &ContentEvent,
        collector: &dyn UrlCollector,
    ) -> Result<()> {
        let urls = collector.collect(event).await?;
        tracing::debug!(urls = urls.len(), "Collected URLs for event");
        self.schedule(urls).await
    }
}
