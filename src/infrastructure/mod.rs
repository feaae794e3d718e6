pub mod alerts;
pub mod binance;
pub mod clock;
pub mod core;
pub mod identity;
pub mod market_status;
pub mod mock;
pub mod observability;
pub mod persistence;
pub mod repositories;
pub mod volatility;

pub use alerts::LogAlertSink;
pub use clock::SystemClock;
pub use identity::StaticIdentityResolver;
pub use market_status::SessionCalendar;
pub use repositories::InMemoryPredictionRepository;
pub use volatility::HistoricalVolatilityProvider;
