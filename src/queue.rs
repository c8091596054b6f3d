//! Task queue boundary.
//!
//! The dispatcher hands work to an external at-least-once task queue and is
//! invoked by it; this module defines the payload types and the enqueue seam.
//! Duplicate delivery is tolerated because every operation is idempotent at
//! the URL-set level.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Result, SweepError};
use crate::urls::UrlSet;

/// The two kinds of dispatch work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Purge,
    Preload,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Purge => write!(f, "purge"),
            TaskKind::Preload => write!(f, "preload"),
        }
    }
}

/// One unit of work handed to the task queue.
///
/// Tasks carry no retry counter: a failed attempt re-enqueues a fresh task
/// with the same, untouched URL set. Attempt accounting, if any, is the
/// queue's concern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchTask {
    pub kind: TaskKind,
    pub urls: UrlSet,
}

impl DispatchTask {
    pub fn purge(urls: UrlSet) -> Self {
        Self {
            kind: TaskKind::Purge,
            urls,
        }
    }

    pub fn preload(urls: UrlSet) -> Self {
        Self {
            kind: TaskKind::Preload,
            urls,
        }
    }
}

/// Enqueue side of the external task queue.
///
/// Implementations must provide at-least-once delivery; the dispatcher never
/// requires ordering between tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: DispatchTask) -> Result<()>;
}

/// Channel-backed queue for tests and single-process embedding.
///
/// The receiver half is consumed by a [`crate::worker::TaskWorker`].
pub struct InMemoryTaskQueue {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

impl InMemoryTaskQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DispatchTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, task: DispatchTask) -> Result<()> {
        tracing::debug!(kind = %task.kind, urls = task.urls.len(), "Enqueueing task");
        self.tx
            .send(task)
            .map_err(|error| SweepError::QueueClosed(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enqueue_delivers_to_receiver() {
        let (queue, mut rx) = InMemoryTaskQueue::new();
        let urls = UrlSet::new(["https://example.com/a"]);
        queue.enqueue(DispatchTask::purge(urls.clone())).await.unwrap();

        let task = rx.recv().await.unwrap();
        assert_eq!(task.kind, TaskKind::Purge);
        assert_eq!(task.urls, urls);
    }

    #[tokio::test]
    async fn enqueue_fails_when_receiver_dropped() {
        let (queue, rx) = InMemoryTaskQueue::new();
        drop(rx);
        let result = queue
            .enqueue(DispatchTask::preload(UrlSet::new(["https://example.com/a"])))
            .await;
        assert!(matches!(result, Err(SweepError::QueueClosed(_))));
    }

    #[test]
    fn task_payload_round_trips_as_json() {
        let task = DispatchTask::preload(UrlSet::new(["https://example.com/a"]));
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains(r#""kind":"preload""#));
        let back: DispatchTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
