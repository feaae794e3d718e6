//! Wall-clock job scheduler.
//!
//! One tokio task per registered job sleeps until the job's next fire time
//! and dispatches it. All jobs share one bounded worker pool. Each job runs
//! at most once at a time; a tick that arrives while the previous run is
//! still going is coalesced into it (dropped, not queued).

use super::{Job, JobOutcome};
use crate::domain::market::session::floor_to_hour;
use crate::domain::ports::{AlertSink, Clock, JobAlert};
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Fires once per hour at `minute:second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourlyTrigger {
    pub minute: u32,
    pub second: u32,
}

impl HourlyTrigger {
    pub fn new(minute: u32, second: u32) -> Self {
        Self { minute, second }
    }

    fn offset(&self) -> ChronoDuration {
        ChronoDuration::minutes(self.minute as i64) + ChronoDuration::seconds(self.second as i64)
    }

    /// First fire time strictly after `now`.
    pub fn next_fire_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let candidate = floor_to_hour(now) + self.offset();
        if candidate > now {
            candidate
        } else {
            candidate + ChronoDuration::hours(1)
        }
    }
}

/// Per-job execution settings. Runs never overlap (one instance per job,
/// overlapping ticks coalesced).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// A tick dispatched later than this after its fire time is skipped.
    pub misfire_grace: Duration,
    /// Runs longer than this are reported, not cancelled.
    pub soft_deadline: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            misfire_grace: Duration::from_secs(60),
            soft_deadline: Duration::from_secs(120),
        }
    }
}

/// True when `woke_at` is past `fire_at` by more than `grace`.
pub fn is_misfire(fire_at: DateTime<Utc>, woke_at: DateTime<Utc>, grace: Duration) -> bool {
    match ChronoDuration::from_std(grace) {
        Ok(grace) => woke_at - fire_at > grace,
        Err(_) => false,
    }
}

#[derive(Default)]
struct JobState {
    running: AtomicBool,
    consecutive_failures: AtomicU32,
}

/// Clears the running flag when the job task ends, panics included.
struct RunningGuard(Arc<JobState>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct RegisteredJob {
    name: String,
    trigger: HourlyTrigger,
    settings: JobSettings,
    job: Job,
    state: Arc<JobState>,
}

/// Result of asking the scheduler to run a job now.
#[derive(Debug)]
pub enum DispatchOutcome {
    Started(JoinHandle<()>),
    /// The previous run is still in flight.
    Coalesced,
    UnknownJob,
}

#[derive(Clone)]
struct Runtime {
    pool: Arc<Semaphore>,
    clock: Arc<dyn Clock>,
    alert_sink: Arc<dyn AlertSink>,
    alert_after_failures: u32,
    metrics: Option<Metrics>,
}

pub struct JobScheduler {
    runtime: Runtime,
    jobs: Vec<RegisteredJob>,
}

/// Running scheduler tasks.
pub struct SchedulerHandle {
    handles: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
        info!("JobScheduler: Stopped");
    }
}

impl JobScheduler {
    pub fn new(
        max_workers: usize,
        clock: Arc<dyn Clock>,
        alert_sink: Arc<dyn AlertSink>,
        alert_after_failures: u32,
    ) -> Self {
        Self {
            runtime: Runtime {
                pool: Arc::new(Semaphore::new(max_workers.max(1))),
                clock,
                alert_sink,
                alert_after_failures: alert_after_failures.max(1),
                metrics: None,
            },
            jobs: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.runtime.metrics = Some(metrics);
        self
    }

    pub fn register(
        &mut self,
        name: &str,
        trigger: HourlyTrigger,
        settings: JobSettings,
        job: Job,
    ) {
        info!(
            "JobScheduler: Registered '{}' at xx:{:02}:{:02}",
            name, trigger.minute, trigger.second
        );
        self.jobs.push(RegisteredJob {
            name: name.to_string(),
            trigger,
            settings,
            job,
            state: Arc::new(JobState::default()),
        });
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    /// Runs `name` immediately, subject to the same pool, coalescing and
    /// failure tracking as scheduled ticks.
    pub fn dispatch(&self, name: &str) -> DispatchOutcome {
        match self.jobs.iter().find(|j| j.name == name) {
            Some(entry) => Self::dispatch_entry(&self.runtime, entry),
            None => DispatchOutcome::UnknownJob,
        }
    }

    pub fn consecutive_failures(&self, name: &str) -> Option<u32> {
        self.jobs
            .iter()
            .find(|j| j.name == name)
            .map(|j| j.state.consecutive_failures.load(Ordering::SeqCst))
    }

    /// Spawns one trigger loop per job.
    pub fn start(self) -> SchedulerHandle {
        let handles = self
            .jobs
            .into_iter()
            .map(|entry| {
                let runtime = self.runtime.clone();
                tokio::spawn(Self::trigger_loop(runtime, entry))
            })
            .collect();
        info!("JobScheduler: Started");
        SchedulerHandle { handles }
    }

    async fn trigger_loop(runtime: Runtime, entry: RegisteredJob) {
        loop {
            let now = runtime.clock.now();
            let fire_at = entry.trigger.next_fire_after(now);
            let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
            debug!("JobScheduler: '{}' next run at {}", entry.name, fire_at);
            tokio::time::sleep(wait).await;

            let woke_at = runtime.clock.now();
            if is_misfire(fire_at, woke_at, entry.settings.misfire_grace) {
                warn!(
                    "JobScheduler: '{}' misfired (due {}, woke {}), skipping",
                    entry.name, fire_at, woke_at
                );
                if let Some(metrics) = &runtime.metrics {
                    metrics.inc_job_run(&entry.name, "misfired");
                }
                continue;
            }

            // The handle is not awaited; the next tick coalesces if still running
            let _ = Self::dispatch_entry(&runtime, &entry);
        }
    }

    fn dispatch_entry(runtime: &Runtime, entry: &RegisteredJob) -> DispatchOutcome {
        if entry
            .state
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(
                "JobScheduler: '{}' still running, coalescing tick",
                entry.name
            );
            if let Some(metrics) = &runtime.metrics {
                metrics.inc_job_run(&entry.name, "coalesced");
            }
            return DispatchOutcome::Coalesced;
        }

        let guard = RunningGuard(entry.state.clone());
        let runtime = runtime.clone();
        let entry = entry.clone();
        DispatchOutcome::Started(tokio::spawn(async move {
            let _guard = guard;
            Self::run_entry(&runtime, &entry).await;
        }))
    }

    async fn run_entry(runtime: &Runtime, entry: &RegisteredJob) {
        let Ok(_permit) = runtime.pool.clone().acquire_owned().await else {
            error!("JobScheduler: worker pool closed, '{}' not run", entry.name);
            return;
        };

        let started = Instant::now();
        let mut run = (entry.job)();
        let result = match tokio::time::timeout(entry.settings.soft_deadline, &mut run).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "JobScheduler: '{}' exceeded soft deadline of {:?}, still running",
                    entry.name, entry.settings.soft_deadline
                );
                run.await
            }
        };
        let elapsed = started.elapsed();

        if let Some(metrics) = &runtime.metrics {
            metrics.observe_job_duration(&entry.name, elapsed.as_secs_f64());
        }

        match result {
            Ok(outcome) => {
                entry.state.consecutive_failures.store(0, Ordering::SeqCst);
                let status = match &outcome {
                    JobOutcome::Completed(detail) => {
                        info!(
                            "JobScheduler: '{}' completed in {:?}: {}",
                            entry.name, elapsed, detail
                        );
                        "success"
                    }
                    JobOutcome::Skipped(reason) => {
                        info!("JobScheduler: '{}' skipped: {}", entry.name, reason);
                        "skipped"
                    }
                };
                if let Some(metrics) = &runtime.metrics {
                    metrics.inc_job_run(&entry.name, status);
                }
            }
            Err(e) => {
                let failures = entry.state.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                error!(
                    "JobScheduler: '{}' failed ({} in a row): {:#}",
                    entry.name, failures, e
                );
                if let Some(metrics) = &runtime.metrics {
                    metrics.inc_job_run(&entry.name, "failure");
                }

                if failures % runtime.alert_after_failures == 0 {
                    let alert = JobAlert {
                        job: entry.name.clone(),
                        consecutive_failures: failures,
                        last_error: format!("{:#}", e),
                        raised_at: runtime.clock.now(),
                    };
                    if let Err(alert_err) = runtime.alert_sink.raise(&alert).await {
                        error!(
                            "JobScheduler: failed to raise alert for '{}': {:#}",
                            entry.name, alert_err
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::scheduling::job_fn;
    use crate::infrastructure::mock::{ManualClock, RecordingAlertSink};
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    fn scheduler(max_workers: usize, alerts: Arc<RecordingAlertSink>) -> JobScheduler {
        JobScheduler::new(
            max_workers,
            Arc::new(ManualClock::new(at(10, 0, 0))),
            alerts,
            3,
        )
    }

    #[test]
    fn test_next_fire_after() {
        let trigger = HourlyTrigger::new(42, 51);
        assert_eq!(trigger.next_fire_after(at(10, 0, 0)), at(10, 42, 51));
        assert_eq!(trigger.next_fire_after(at(10, 42, 51)), at(11, 42, 51));
        assert_eq!(trigger.next_fire_after(at(10, 50, 0)), at(11, 42, 51));

        let top = HourlyTrigger::new(0, 0);
        assert_eq!(top.next_fire_after(at(10, 0, 0)), at(11, 0, 0));
        assert_eq!(top.next_fire_after(at(23, 59, 59)), at(23, 59, 59) + ChronoDuration::seconds(1));
    }

    #[test]
    fn test_misfire_grace() {
        let grace = Duration::from_secs(60);
        assert!(!is_misfire(at(10, 0, 0), at(10, 0, 59), grace));
        assert!(!is_misfire(at(10, 0, 0), at(10, 1, 0), grace));
        assert!(is_misfire(at(10, 0, 0), at(10, 1, 1), grace));
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_coalesced() {
        let alerts = Arc::new(RecordingAlertSink::new());
        let mut sched = scheduler(3, alerts);
        let release = Arc::new(Notify::new());
        let runs = Arc::new(AtomicUsize::new(0));

        let (r, n) = (release.clone(), runs.clone());
        sched.register(
            "generation",
            HourlyTrigger::new(42, 51),
            JobSettings::default(),
            job_fn(move || {
                let (r, n) = (r.clone(), n.clone());
                async move {
                    n.fetch_add(1, Ordering::SeqCst);
                    r.notified().await;
                    Ok(JobOutcome::Completed("ok".to_string()))
                }
            }),
        );

        let DispatchOutcome::Started(first) = sched.dispatch("generation") else {
            panic!("first dispatch should start");
        };
        assert!(matches!(
            sched.dispatch("generation"),
            DispatchOutcome::Coalesced
        ));

        release.notify_one();
        first.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Free again after completion
        let DispatchOutcome::Started(second) = sched.dispatch("generation") else {
            panic!("dispatch after completion should start");
        };
        release.notify_one();
        second.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(matches!(sched.dispatch("nope"), DispatchOutcome::UnknownJob));
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_block_later_ticks() {
        let alerts = Arc::new(RecordingAlertSink::new());
        let mut sched = scheduler(3, alerts);
        let runs = Arc::new(AtomicUsize::new(0));
        let n = runs.clone();
        sched.register(
            "generation",
            HourlyTrigger::new(42, 51),
            JobSettings::default(),
            job_fn(move || {
                let n = n.clone();
                async move {
                    if n.fetch_add(1, Ordering::SeqCst) == 0 {
                        panic!("bar decoding bug");
                    }
                    Ok(JobOutcome::Completed("ok".to_string()))
                }
            }),
        );

        let DispatchOutcome::Started(first) = sched.dispatch("generation") else {
            panic!("first tick should start");
        };
        assert!(first.await.is_err());

        let DispatchOutcome::Started(second) = sched.dispatch("generation") else {
            panic!("tick after a panic should start");
        };
        second.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let alerts = Arc::new(RecordingAlertSink::new());
        let mut sched = scheduler(1, alerts);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for name in ["a", "b", "c"] {
            let (active, peak) = (active.clone(), peak.clone());
            sched.register(
                name,
                HourlyTrigger::new(0, 0),
                JobSettings::default(),
                job_fn(move || {
                    let (active, peak) = (active.clone(), peak.clone());
                    async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok(JobOutcome::Completed("ok".to_string()))
                    }
                }),
            );
        }

        let mut handles = Vec::new();
        for name in ["a", "b", "c"] {
            if let DispatchOutcome::Started(h) = sched.dispatch(name) {
                handles.push(h);
            }
        }
        assert_eq!(handles.len(), 3);
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_alert_after_consecutive_failures() {
        let alerts = Arc::new(RecordingAlertSink::new());
        let mut sched = scheduler(3, alerts.clone());
        sched.register(
            "verification",
            HourlyTrigger::new(0, 0),
            JobSettings::default(),
            job_fn(|| async { Err::<JobOutcome, _>(anyhow::anyhow!("bar source down")) }),
        );

        for _ in 0..3 {
            let DispatchOutcome::Started(h) = sched.dispatch("verification") else {
                panic!("should start");
            };
            h.await.unwrap();
        }

        assert_eq!(sched.consecutive_failures("verification"), Some(3));
        let raised = alerts.alerts().await;
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].job, "verification");
        assert_eq!(raised[0].consecutive_failures, 3);
        assert!(raised[0].last_error.contains("bar source down"));
    }

    #[tokio::test]
    async fn test_soft_deadline_does_not_cancel() {
        let alerts = Arc::new(RecordingAlertSink::new());
        let mut sched = scheduler(3, alerts);
        let finished = Arc::new(AtomicBool::new(false));
        let f = finished.clone();
        sched.register(
            "slow",
            HourlyTrigger::new(0, 0),
            JobSettings {
                misfire_grace: Duration::from_secs(60),
                soft_deadline: Duration::from_millis(5),
            },
            job_fn(move || {
                let f = f.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    f.store(true, Ordering::SeqCst);
                    Ok(JobOutcome::Completed("late".to_string()))
                }
            }),
        );

        let DispatchOutcome::Started(h) = sched.dispatch("slow") else {
            panic!("should start");
        };
        h.await.unwrap();
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(sched.consecutive_failures("slow"), Some(0));
    }
}
