pub mod accuracy;

pub use accuracy::{AccuracyBucket, AccuracyStats};
