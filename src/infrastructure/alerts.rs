use crate::domain::ports::{AlertSink, JobAlert};
use anyhow::Result;
use async_trait::async_trait;
use tracing::error;

/// Emits alerts as `error!` events for whatever collects the logs.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn raise(&self, alert: &JobAlert) -> Result<()> {
        error!(
            job = %alert.job,
            consecutive_failures = alert.consecutive_failures,
            raised_at = %alert.raised_at,
            "ALERT: job {} failed {} times in a row: {}",
            alert.job,
            alert.consecutive_failures,
            alert.last_error
        );
        Ok(())
    }
}
