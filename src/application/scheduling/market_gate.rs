use super::{Job, JobFuture, JobOutcome};
use crate::config::MarketGateMode;
use crate::domain::ports::{Clock, MarketStatusProvider};
use anyhow::bail;
use std::sync::Arc;
use tracing::{debug, info};

/// Runs a job only while at least one of its instruments is trading.
#[derive(Clone)]
pub struct MarketGate {
    pub provider: Arc<dyn MarketStatusProvider>,
    pub clock: Arc<dyn Clock>,
    pub instruments: Vec<String>,
    pub mode: MarketGateMode,
}

impl MarketGate {
    /// Instruments currently trading.
    async fn open_instruments(&self) -> anyhow::Result<Vec<String>> {
        let now = self.clock.now();
        let mut open = Vec::new();
        for instrument in &self.instruments {
            let status = self.provider.get_status(instrument, now).await?;
            debug!(
                "MarketGate: {} trading={} ({}, {})",
                instrument, status.is_trading, status.session_kind, status.timezone
            );
            if status.is_trading {
                open.push(instrument.clone());
            }
        }
        Ok(open)
    }
}

/// Skips (or fails) the job when none of the gate's instruments is trading.
/// `MarketGateMode::Off` returns the job unchanged.
pub fn with_market_gate(job: Job, gate: MarketGate) -> Job {
    if gate.mode == MarketGateMode::Off {
        return job;
    }

    Arc::new(move || -> JobFuture {
        let job = job.clone();
        let gate = gate.clone();
        Box::pin(async move {
            if !gate.open_instruments().await?.is_empty() {
                return (job)().await;
            }

            match gate.mode {
                MarketGateMode::Fail => bail!(
                    "MarketGate: all markets closed for {:?}",
                    gate.instruments
                ),
                _ => {
                    info!("MarketGate: markets closed, skipping run");
                    Ok(JobOutcome::Skipped("market closed".to_string()))
                }
            }
        })
    })
}
