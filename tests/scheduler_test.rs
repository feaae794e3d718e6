use chrono::{DateTime, Duration, TimeZone, Utc};
use hourcast::application::scheduling::{DispatchOutcome, JobOutcome, JobScheduler};
use hourcast::application::system::{Application, GENERATION_JOB, VERIFICATION_JOB};
use hourcast::config::{Config, EnvSource};
use hourcast::infrastructure::mock::ManualClock;
use std::collections::HashMap;
use std::sync::Arc;

fn generation_tick() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 42, 51).unwrap()
}

async fn mock_application(
    dir: &tempfile::TempDir,
    clock: Arc<ManualClock>,
) -> anyhow::Result<Application> {
    let url = format!("sqlite://{}", dir.path().join("scheduler.db").display());
    let vars: HashMap<String, String> = [
        ("MODE", "mock"),
        ("DATABASE_URL", url.as_str()),
        ("SYMBOLS", "BTC/USDT,ETH/USDT"),
        ("RETRY_INITIAL_DELAY_MS", "1"),
        ("RETRY_MAX_DELAY_MS", "5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let config = Config::from_source(&EnvSource::from_map(vars))?;
    Application::build_with_clock(config, clock).await
}

async fn run(scheduler: &JobScheduler, name: &str) {
    match scheduler.dispatch(name) {
        DispatchOutcome::Started(handle) => handle.await.expect("job task panicked"),
        other => panic!("{} did not start: {:?}", name, other),
    }
}

#[tokio::test]
async fn test_registered_jobs() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = mock_application(&dir, Arc::new(ManualClock::new(generation_tick()))).await?;
    let scheduler = app.scheduler();
    assert_eq!(scheduler.job_names(), vec![GENERATION_JOB, VERIFICATION_JOB]);
    Ok(())
}

#[tokio::test]
async fn test_generation_tick_stores_current_hour() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(generation_tick()));
    let app = mock_application(&dir, clock.clone()).await?;
    let scheduler = app.scheduler();
    let everything = generation_tick() + Duration::days(1);

    run(&scheduler, GENERATION_JOB).await;
    assert_eq!(scheduler.consecutive_failures(GENERATION_JOB), Some(0));

    let pending = app
        .context
        .repository
        .get_pending_verifications(everything, 10)
        .await?;
    assert_eq!(pending.len(), 2);
    assert!(pending.iter().all(|p| p.is_pending()));

    // Same tick again only finds duplicates
    run(&scheduler, GENERATION_JOB).await;
    let pending = app
        .context
        .repository
        .get_pending_verifications(everything, 10)
        .await?;
    assert_eq!(pending.len(), 2);

    // The current hour is not ready, so verification leaves it pending
    run(&scheduler, VERIFICATION_JOB).await;
    assert_eq!(scheduler.consecutive_failures(VERIFICATION_JOB), Some(0));
    let pending = app
        .context
        .repository
        .get_pending_verifications(everything, 10)
        .await?;
    assert_eq!(pending.len(), 2);

    // After the hour and its buffer, the verification tick scores both
    clock.set(Utc.with_ymd_and_hms(2024, 3, 1, 11, 5, 30).unwrap());
    run(&scheduler, VERIFICATION_JOB).await;
    let pending = app
        .context
        .repository
        .get_pending_verifications(everything, 10)
        .await?;
    assert!(pending.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_generation_tick_before_prediction_point_stores_nothing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap(),
    ));
    let app = mock_application(&dir, clock.clone()).await?;
    let scheduler = app.scheduler();
    let everything = generation_tick() + Duration::days(1);

    run(&scheduler, GENERATION_JOB).await;
    assert_eq!(scheduler.consecutive_failures(GENERATION_JOB), Some(0));
    assert!(
        app.context
            .repository
            .get_pending_verifications(everything, 10)
            .await?
            .is_empty()
    );

    // The on-time tick still owns the hour
    clock.set(generation_tick());
    run(&scheduler, GENERATION_JOB).await;
    assert_eq!(
        app.context
            .repository
            .get_pending_verifications(everything, 10)
            .await?
            .len(),
        2
    );
    Ok(())
}

#[tokio::test]
async fn test_job_outcome_from_verification_body() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let app = mock_application(&dir, Arc::new(ManualClock::new(generation_tick()))).await?;

    let job = hourcast::application::scheduling::jobs::verification_job(app.verifier.clone(), 10);
    let outcome = job().await?;
    assert_eq!(
        outcome,
        JobOutcome::Completed(
            "verified=0 correct=0 incorrect=0 not_ready=0 failed=0".to_string()
        )
    );
    Ok(())
}
