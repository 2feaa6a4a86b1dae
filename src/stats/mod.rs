//! Runtime statistics

pub mod metrics;

pub use metrics::GroupStats;
