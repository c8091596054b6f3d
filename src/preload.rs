//! Preload throttler: load-aware concurrent origin warming.
//!
//! Re-fetches purged URLs against the origin so the cache is repopulated
//! before a real visitor arrives. Concurrency scales with the dispatching
//! host's idle capacity and is hard-capped, because the origin must tolerate
//! the fetch load too.

use std::sync::Arc;

use crate::config::SweepConfig;
use crate::error::Result;
use crate::fanout::{fanout, FanoutRequest};
use crate::http::HttpClient;
use crate::journal::EventLog;
use crate::queue::{DispatchTask, TaskQueue};
use crate::urls::UrlSet;

/// Snapshot of the dispatching host's capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostLoad {
    /// Logical CPU count; 1 when undetectable.
    pub cores: usize,
    /// 1-minute load average; 0 when undetectable.
    pub load1: f64,
}

/// Samples live host load. Swappable so tests can pin the inputs of the
/// concurrency computation.
///
/// Sampling is part of preload setup: an `Err` here fails the whole task,
/// which re-enqueues it. Implementations that can produce partial
/// information should prefer the documented fallbacks (1 core, load 0)
/// over failing.
pub trait LoadSampler: Send + Sync {
    fn sample(&self) -> Result<HostLoad>;
}

/// Sampler backed by the operating system. Never fails; undetectable
/// values take the fallbacks.
pub struct SystemLoadSampler;

impl LoadSampler for SystemLoadSampler {
    fn sample(&self) -> Result<HostLoad> {
        Ok(HostLoad {
            cores: num_cpus::get().max(1),
            load1: load_average_1m().unwrap_or(0.0),
        })
    }
}

/// Sampler returning a fixed snapshot.
pub struct FixedLoadSampler(pub HostLoad);

impl LoadSampler for FixedLoadSampler {
    fn sample(&self) -> Result<HostLoad> {
        Ok(self.0)
    }
}

#[cfg(unix)]
fn load_average_1m() -> Option<f64> {
    let mut averages = [0f64; 3];
    let written = unsafe { libc::getloadavg(averages.as_mut_ptr(), 3) };
    if written >= 1 {
        Some(averages[0])
    } else {
        None
    }
}

#[cfg(not(unix))]
fn load_average_1m() -> Option<f64> {
    None
}

/// Best-effort request to deprioritize the current process.
///
/// Preloading runs next to user-facing request handling on the same host;
/// the hint keeps it out of the way. Failure is logged, never fatal, and the
/// runtime environment may not honor the hint at all.
pub trait HostHints: Send + Sync {
    fn lower_priority(&self) -> std::io::Result<()>;
}

/// Lowers CPU scheduling priority via `nice` semantics on unix, and I/O
/// priority to the idle class on Linux; a no-op elsewhere.
pub struct NicePriorityHints;

impl HostHints for NicePriorityHints {
    #[cfg(unix)]
    fn lower_priority(&self) -> std::io::Result<()> {
        let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS as _, 0, 19) };
        if rc == -1 {
            return Err(std::io::Error::last_os_error());
        }
        lower_io_priority()
    }

    #[cfg(not(unix))]
    fn lower_priority(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Move the current process's I/O to the idle scheduling class. Only Linux
/// exposes the syscall; elsewhere the CPU hint is all we can do.
#[cfg(target_os = "linux")]
fn lower_io_priority() -> std::io::Result<()> {
    const IOPRIO_WHO_PROCESS: libc::c_int = 1;
    const IOPRIO_CLASS_IDLE: libc::c_long = 3;
    const IOPRIO_CLASS_SHIFT: u32 = 13;

    let rc = unsafe {
        libc::syscall(
            libc::SYS_ioprio_set,
            IOPRIO_WHO_PROCESS,
            0,
            IOPRIO_CLASS_IDLE << IOPRIO_CLASS_SHIFT,
        )
    };
    if rc == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn lower_io_priority() -> std::io::Result<()> {
    Ok(())
}

/// Hints implementation that does nothing.
pub struct NoHostHints;

impl HostHints for NoHostHints {
    fn lower_priority(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Safe concurrency degree for origin fetches.
///
/// `round(cores * 2 - load1)` clamped to `[min, max]`: scale with available
/// headroom, always keep one in-flight slot, and never exceed the cap no
/// matter how large the machine is.
pub fn concurrency_degree(cores: usize, load1: f64, min: usize, max: usize) -> usize {
    let min = min.max(1);
    let max = max.max(min);
    let raw = (cores as f64) * 2.0 - load1;
    let rounded = if raw.is_finite() { raw.round() } else { min as f64 };
    rounded.clamp(min as f64, max as f64) as usize
}

/// Executes `Preload` tasks pulled from the task queue.
pub struct PreloadThrottler<H, Q>
where
    H: HttpClient,
    Q: TaskQueue,
{
    http: H,
    queue: Arc<Q>,
    config: Arc<SweepConfig>,
    journal: Arc<dyn EventLog>,
    sampler: Arc<dyn LoadSampler>,
    hints: Arc<dyn HostHints>,
}

impl<H, Q> PreloadThrottler<H, Q>
where
    H: HttpClient + 'static,
    Q: TaskQueue,
{
    pub fn new(
        http: H,
        queue: Arc<Q>,
        config: Arc<SweepConfig>,
        journal: Arc<dyn EventLog>,
        sampler: Arc<dyn LoadSampler>,
        hints: Arc<dyn HostHints>,
    ) -> Self {
        Self {
            http,
            queue,
            config,
            journal,
            sampler,
            hints,
        }
    }

    /// Process one `Preload` task.
    ///
    /// Individual URL failures are logged and swallowed; a setup failure
    /// re-enqueues the whole original set as a new task.
    #[tracing::instrument(skip(self, urls), fields(urls = urls.len()))]
    pub async fn preload(&self, urls: &UrlSet) {
        if urls.is_empty() {
            return;
        }

        match self.warm_chunks(urls).await {
            Ok(()) => {
                self.journal
                    .record(&format!("finished preloading {} urls", urls.len()));
            }
            Err(error) => {
                tracing::warn!(error = %error, kind = error.kind(), "Preload setup failed, re-enqueueing task");
                self.journal
                    .record(&format!("preload failed ({error}), task re-enqueued"));
                if let Err(enqueue_error) = self
                    .queue
                    .enqueue(DispatchTask::preload(urls.clone()))
                    .await
                {
                    tracing::error!(error = %enqueue_error, "Failed to re-enqueue preload task");
                }
            }
        }
    }

    async fn warm_chunks(&self, urls: &UrlSet) -> Result<()> {
        if let Err(error) = self.hints.lower_priority() {
            tracing::warn!(error = %error, "Could not lower process priority");
        } else {
            tracing::debug!("Lowered process scheduling priority for preload");
        }

        let load = self.sampler.sample()?;
        let degree = concurrency_degree(
            load.cores,
            load.load1,
            self.config.min_concurrency,
            self.config.max_concurrency,
        );
        self.journal.record(&format!(
            "computed preload concurrency: {degree} (cores: {}, load1: {:.2})",
            load.cores, load.load1
        ));
        tracing::debug!(degree, cores = load.cores, load1 = load.load1, "Computed preload concurrency");

        // Chunk size equals the concurrency degree: every chunk runs at full
        // computed parallelism, chunks themselves never overlap.
        for chunk in urls.chunks(degree) {
            let requests: Vec<_> = chunk
                .iter()
                .map(|url| {
                    FanoutRequest::get(url, self.config.preload_timeout)
                        .header("User-Agent", &self.config.preload_user_agent)
                })
                .collect();

            let results = fanout(&self.http, requests, Some(degree)).await;
            for result in results {
                if result.is_success() {
                    self.journal.record(&format!("preloaded {}", result.url));
                } else if let Some(status) = result.status {
                    self.journal
                        .record(&format!("preload of {} returned status {status}", result.url));
                    tracing::debug!(url = %result.url, status, "Preload returned non-success status");
                } else {
                    let error = result.error.as_deref().unwrap_or("unknown error");
                    self.journal
                        .record(&format!("preload of {} failed: {error}", result.url));
                    tracing::debug!(url = %result.url, error, "Preload transport failure");
                }
            }
        }

        Ok(())
    }

    /// The HTTP client, shared with the sitemap preloader.
    pub(crate) fn http(&self) -> &H {
        &self.http
    }

    /// The journal, shared with the sitemap preloader.
    pub(crate) fn journal(&self) -> &Arc<dyn EventLog> {
        &self.journal
    }
}
