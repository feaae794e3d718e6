pub mod bar_source;

pub use bar_source::BinanceBarSource;
