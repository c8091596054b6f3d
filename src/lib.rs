//! Edge-cache purge and preload dispatcher.
//!
//! This crate turns content-change events into CDN maintenance work: changed
//! URLs are deduplicated, split into purge batches sent to the CDN API and
//! preload fetches sent to the origin, and both run through a concurrent
//! HTTP fan-out engine. Work travels through an external at-least-once task
//! queue, so every operation is idempotent and safe to replay.

pub mod config;
pub mod error;
pub mod events;
pub mod fanout;
pub mod http;
pub mod journal;
pub mod preload;
pub mod purge;
pub mod queue;
pub mod scheduler;
pub mod sitemap;
pub mod urls;
pub mod worker;

// Re-export commonly used types
pub use config::{CredentialProvider, Credentials, StaticCredentials, SweepConfig};
pub use error::{Result, SweepError};
pub use events::{ContentEvent, UrlCollector};
pub use fanout::{fanout, FanoutRequest, FanoutResult};
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use journal::{EventLog, FileEventLog, NullEventLog};
pub use preload::{concurrency_degree, PreloadThrottler, SystemLoadSampler};
pub use purge::PurgeBatcher;
pub use queue::{DispatchTask, InMemoryTaskQueue, TaskKind, TaskQueue};
pub use scheduler::DispatchScheduler;
pub use sitemap::SitemapPreloader;
pub use urls::UrlSet;
pub use worker::TaskWorker;
