//! One-shot prediction CLI.
//!
//! Runs the same generation and verification paths as the server against the
//! configured database, without starting the scheduler.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use hourcast::application::prediction::{HourOutcome, VerificationOutcome};
use hourcast::application::system::Application;
use hourcast::config::Config;
use hourcast::domain::errors::PredictionError;
use hourcast::domain::market::session::floor_to_hour;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Hourly block prediction CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the prediction for one instrument-hour
    Generate {
        #[arg(short, long, default_value = "BTC/USDT")]
        symbol: String,

        /// Hour start (RFC 3339, e.g. 2024-03-01T14:00:00Z). Defaults to the current hour.
        #[arg(long)]
        hour: Option<String>,

        /// Fall back to the last trading hour when the market is closed
        #[arg(long)]
        market_aware: bool,
    },
    /// Generate every started hour of a UTC day
    GenerateDay {
        #[arg(short, long, default_value = "BTC/USDT")]
        symbol: String,

        /// Day (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
    /// Verify the stored prediction for one instrument-hour
    Verify {
        #[arg(short, long, default_value = "BTC/USDT")]
        symbol: String,

        /// Hour start (RFC 3339)
        #[arg(long)]
        hour: String,
    },
    /// Verify pending predictions whose hour has finished
    VerifyPending {
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Print accuracy of verified predictions
    Accuracy {
        /// Restrict to one instrument (any known spelling of its symbol)
        #[arg(short, long)]
        symbol: Option<String>,

        #[arg(long, default_value = "30")]
        days: i64,
    },
}

fn parse_hour(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid hour '{}', expected RFC 3339", raw))?
        .with_timezone(&Utc))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let app = Application::build(config).await?;
    let now = app.context.clock.now();

    match cli.command {
        Commands::Generate {
            symbol,
            hour,
            market_aware,
        } => {
            let hour_start = match hour {
                Some(raw) => parse_hour(&raw)?,
                None => floor_to_hour(now),
            };
            if market_aware {
                let result = app
                    .orchestrator
                    .generate_market_aware(&symbol, hour_start)
                    .await?;
                if result.substituted() {
                    info!(
                        "Market closed, resolved {} to {} (reused: {})",
                        result.requested_hour, result.resolved_hour, result.reused
                    );
                }
                println!("{}", serde_json::to_string_pretty(&result.prediction)?);
            } else {
                let prediction = app.orchestrator.generate(&symbol, hour_start).await?;
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            }
        }
        Commands::GenerateDay { symbol, date } => {
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", date))?;
            let summary = app.orchestrator.generate_day(&symbol, date).await;
            for report in &summary.hours {
                let line = match &report.outcome {
                    HourOutcome::Generated(p) => format!(
                        "{} {} {:.1}% ({})",
                        p.direction, p.strength, p.confidence, p.decision_tree
                    ),
                    HourOutcome::SkippedFuture => "future".to_string(),
                    HourOutcome::SkippedNoData(reason) => format!("no data: {}", reason),
                    HourOutcome::Duplicate => "already stored".to_string(),
                    HourOutcome::Failed(reason) => format!("failed: {}", reason),
                };
                println!("{}  {}", report.hour_start.format("%H:%M"), line);
            }
            println!(
                "generated={} duplicate={} no_data={} future={} failed={}",
                summary.generated(),
                summary.duplicates(),
                summary.skipped_no_data(),
                summary.skipped_future(),
                summary.failed()
            );
        }
        Commands::Verify { symbol, hour } => {
            let hour_start = parse_hour(&hour)?;
            let instrument_id = app
                .context
                .identity
                .resolve_strict(&symbol)
                .await?
                .ok_or_else(|| PredictionError::IdentityNotFound {
                    symbol: symbol.clone(),
                })?;
            let prediction = app
                .context
                .repository
                .get_by_hour(&instrument_id, hour_start)
                .await?
                .ok_or_else(|| {
                    PredictionError::data_unavailable(&instrument_id, "no stored prediction")
                })?;

            match app.verifier.verify(&prediction).await? {
                VerificationOutcome::NotReady { ready_at } => {
                    return Err(PredictionError::NotReadyYet {
                        hour_start,
                        ready_at,
                    }
                    .into());
                }
                VerificationOutcome::AlreadyVerified => println!(
                    "already verified: {}",
                    prediction
                        .actual_result
                        .map(|r| r.to_string())
                        .unwrap_or_else(|| "concurrently".to_string())
                ),
                VerificationOutcome::Verified {
                    result,
                    realized_direction,
                    realized_close,
                    realized_deviation,
                    ..
                } => println!(
                    "{}: predicted {} realized {} (close {}, deviation {:+.2})",
                    result,
                    prediction.direction,
                    realized_direction,
                    realized_close,
                    realized_deviation
                ),
            }
        }
        Commands::VerifyPending { limit } => {
            let summary = app.verifier.verify_pending(limit).await?;
            println!(
                "verified={} correct={} incorrect={} not_ready={} failed={}",
                summary.verified,
                summary.correct,
                summary.incorrect,
                summary.not_ready,
                summary.failed
            );
        }
        Commands::Accuracy { symbol, days } => {
            let since = now - Duration::days(days);
            let stats = app.verifier.accuracy(symbol.as_deref(), since).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}
