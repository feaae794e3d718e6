use anyhow::Result;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::application::bootstrap::{PersistenceBootstrap, PersistenceHandle};
use crate::application::prediction::{
    PredictionContext, PredictionOrchestrator, VerificationEngine,
};
use crate::application::scheduling::jobs::{generation_job, verification_job};
use crate::application::scheduling::{
    HourlyTrigger, JobScheduler, JobSettings, MarketGate, RetryPolicy, SchedulerHandle,
    with_market_gate, with_retry,
};
use crate::config::{Config, Mode};
use crate::domain::ports::{AlertSink, BarSource, Clock};
use crate::domain::repositories::PredictionRepository;
use crate::infrastructure::binance::BinanceBarSource;
use crate::infrastructure::mock::MockBarSource;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::{
    HistoricalVolatilityProvider, LogAlertSink, SessionCalendar, StaticIdentityResolver,
    SystemClock,
};

pub const GENERATION_JOB: &str = "generation";
pub const VERIFICATION_JOB: &str = "verification";

/// Everything a running process needs, wired from [`Config`].
pub struct Application {
    pub config: Config,
    pub persistence: PersistenceHandle,
    pub context: PredictionContext,
    pub orchestrator: Arc<PredictionOrchestrator>,
    pub verifier: Arc<VerificationEngine>,
    pub instruments: Vec<String>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub metrics: Metrics,
}

pub struct SystemHandle {
    pub scheduler: SchedulerHandle,
    pub repository: Arc<dyn PredictionRepository>,
    pub clock: Arc<dyn Clock>,
    pub metrics: Metrics,
}

impl Application {
    pub async fn build(config: Config) -> Result<Self> {
        Self::build_with_clock(config, Arc::new(SystemClock)).await
    }

    /// Same wiring as [`Application::build`] on an injected clock.
    pub async fn build_with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        info!("Building Hourcast Application (Mode: {:?})...", config.mode);

        let persistence = PersistenceBootstrap::init(&config.database_url).await?;
        let metrics = Metrics::new()?;

        let bar_source: Arc<dyn BarSource> = match config.mode {
            Mode::Mock => {
                info!("Using Mock bar source (synthetic prices)");
                Arc::new(MockBarSource::new())
            }
            Mode::Binance => {
                info!(
                    "Using Binance bar source at {}",
                    config.broker.binance.base_url
                );
                Arc::new(BinanceBarSource::new(
                    config.broker.binance.api_key.clone(),
                    config.broker.binance.base_url.clone(),
                ))
            }
        };

        let identity = StaticIdentityResolver::new(&config.prediction.symbols);
        let instruments = identity.instruments();

        let context = PredictionContext {
            identity: Arc::new(identity),
            bar_source: bar_source.clone(),
            volatility: Arc::new(HistoricalVolatilityProvider::new(
                bar_source,
                config.prediction.volatility_lookback_hours,
            )),
            market_status: Arc::new(SessionCalendar::new(config.prediction.market_calendar)),
            repository: persistence.prediction_repository.clone(),
            clock,
            metrics: Some(metrics.clone()),
        };

        let timeframe = config.prediction.bar_timeframe;
        let orchestrator = Arc::new(PredictionOrchestrator::new(context.clone(), timeframe));
        let verifier = Arc::new(VerificationEngine::new(
            context.clone(),
            timeframe,
            ChronoDuration::minutes(config.prediction.verification_buffer_minutes),
        ));

        info!(
            "Tracking {} instruments: {:?} ({} bars, {:?} calendar)",
            instruments.len(),
            instruments,
            timeframe,
            config.prediction.market_calendar
        );

        Ok(Self {
            config,
            persistence,
            context,
            orchestrator,
            verifier,
            instruments,
            alert_sink: Arc::new(LogAlertSink),
            metrics,
        })
    }

    /// Builds the scheduler with both recurring jobs.
    pub fn scheduler(&self) -> JobScheduler {
        let sched = &self.config.scheduler;
        let retry = RetryPolicy::from(sched.retry);
        let settings = JobSettings {
            misfire_grace: Duration::from_secs(sched.misfire_grace_seconds),
            soft_deadline: Duration::from_secs(sched.job_soft_deadline_seconds),
        };

        let mut scheduler = JobScheduler::new(
            sched.max_workers,
            self.context.clock.clone(),
            self.alert_sink.clone(),
            sched.alert_after_failures,
        )
        .with_metrics(self.metrics.clone());

        let generation = with_retry(
            generation_job(
                self.orchestrator.clone(),
                self.config.prediction.symbols.clone(),
                self.context.clock.clone(),
            ),
            retry,
        );
        let generation = with_market_gate(
            generation,
            MarketGate {
                provider: self.context.market_status.clone(),
                clock: self.context.clock.clone(),
                instruments: self.instruments.clone(),
                mode: sched.market_gate,
            },
        );
        scheduler.register(
            GENERATION_JOB,
            HourlyTrigger::new(sched.generation_minute, sched.generation_second),
            settings,
            generation,
        );

        if !sched.verifies_previous_hour_on_time(self.config.prediction.verification_buffer_minutes)
        {
            info!(
                "Verification tick {:02}:{:02} precedes the {}-minute buffer; hours are scored one tick later",
                sched.verification_minute,
                sched.verification_second,
                self.config.prediction.verification_buffer_minutes
            );
        }

        scheduler.register(
            VERIFICATION_JOB,
            HourlyTrigger::new(sched.verification_minute, sched.verification_second),
            settings,
            with_retry(
                verification_job(self.verifier.clone(), self.config.prediction.verify_batch_limit),
                retry,
            ),
        );

        scheduler
    }

    pub async fn start(self) -> Result<SystemHandle> {
        info!("Starting Scheduler...");
        let scheduler = self.scheduler().start();

        Ok(SystemHandle {
            scheduler,
            repository: self.context.repository.clone(),
            clock: self.context.clock.clone(),
            metrics: self.metrics,
        })
    }
}
