//! Task worker: drains the dispatch queue and routes tasks to their
//! executors.
//!
//! One worker owns the receiving end of the queue. Tasks run one at a time;
//! concurrency lives inside the executors, which fan out per batch or chunk.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::http::HttpClient;
use crate::preload::PreloadThrottler;
use crate::purge::PurgeBatcher;
use crate::queue::{DispatchTask, TaskKind, TaskQueue};

/// Consumes `DispatchTask`s and runs them to completion.
pub struct TaskWorker<H, Q>
where
    H: HttpClient,
    Q: TaskQueue,
{
    purge: Arc<PurgeBatcher<H, Q>>,
    preload: Arc<PreloadThrottler<H, Q>>,
    shutdown: CancellationToken,
    tasks_in_flight: Arc<AtomicUsize>,
    tasks_processed: Arc<AtomicUsize>,
}

impl<H, Q> TaskWorker<H, Q>
where
    H: HttpClient + 'static,
    Q: TaskQueue,
{
    pub fn new(
        purge: Arc<PurgeBatcher<H, Q>>,
        preload: Arc<PreloadThrottler<H, Q>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            purge,
            preload,
            shutdown,
            tasks_in_flight: Arc::new(AtomicUsize::new(0)),
            tasks_processed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Run until the task channel closes or shutdown is requested.
    ///
    /// A task already being processed when shutdown fires runs to
    /// completion; only the pickup of new tasks stops.
    pub async fn run(&self, mut tasks: mpsc::UnboundedReceiver<DispatchTask>) {
        tracing::info!("Task worker started");

        loop {
            tokio::select! {
                maybe_task = tasks.recv() => {
                    match maybe_task {
                        Some(task) => self.process(task).await,
                        None => {
                            tracing::info!("Task channel closed, stopping worker");
                            break;
                        }
                    }
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!(
                        tasks_processed = self.tasks_processed.load(Ordering::Relaxed),
                        "Shutdown requested, stopping worker"
                    );
                    break;
                }
            }
        }
    }

    async fn process(&self, task: DispatchTask) {
        self.tasks_in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.tasks_in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        tracing::debug!(kind = %task.kind, urls = task.urls.len(), "Processing dispatch task");
        match task.kind {
            TaskKind::Purge => self.purge.purge(&task.urls).await,
            TaskKind::Preload => self.preload.preload(&task.urls).await,
        }
        self.tasks_processed.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of tasks fully processed so far.
    pub fn tasks_processed(&self) -> usize {
        self.tasks_processed.load(Ordering::SeqCst)
    }

    /// Number of tasks currently being processed (0 or 1 for a single
    /// worker loop).
    pub fn tasks_in_flight(&self) -> usize {
        self.tasks_in_flight.load(Ordering::SeqCst)
    }
}
