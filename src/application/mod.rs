// Wiring from configuration
pub mod bootstrap;
pub mod system;

// Generation and verification use cases
pub mod prediction;

// Recurring triggers, retry and market gating
pub mod scheduling;
