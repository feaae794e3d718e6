pub mod bar;
pub mod session;
pub mod symbol;
pub mod timeframe;
