// Bars, sessions, symbols, timeframes
pub mod market;

// Hourly block prediction engine
pub mod prediction;

// Accuracy tracking
pub mod performance;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;

// Market data integrity checks
pub mod validation;
