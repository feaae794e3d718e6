pub mod orchestrator;
pub mod verification;

pub use orchestrator::{
    DaySummary, HourOutcome, HourReport, MarketAwarePrediction, PredictionContext,
    PredictionOrchestrator,
};
pub use verification::{VerificationEngine, VerificationOutcome, VerificationSummary};
