//! In-process job scheduling.
//!
//! A [`Job`] is a cloneable async closure. Cross-cutting policies (retry,
//! market gating) wrap a `Job` and return a new `Job`, so they compose at
//! registration time without the job body knowing about them.

pub mod jobs;
pub mod market_gate;
pub mod retry;
pub mod scheduler;

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub use market_gate::{MarketGate, with_market_gate};
pub use retry::{RetryPolicy, with_retry};
pub use scheduler::{DispatchOutcome, HourlyTrigger, JobScheduler, JobSettings, SchedulerHandle};

/// How a job run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(String),
    /// Deliberately did nothing (e.g. market closed).
    Skipped(String),
}

pub type JobFuture = BoxFuture<'static, anyhow::Result<JobOutcome>>;

pub type Job = Arc<dyn Fn() -> JobFuture + Send + Sync>;

/// Boxes an async closure into a [`Job`].
pub fn job_fn<F, Fut>(f: F) -> Job
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<JobOutcome>> + Send + 'static,
{
    Arc::new(move || -> JobFuture { Box::pin(f()) })
}
