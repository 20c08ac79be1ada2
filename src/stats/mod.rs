//! Statistics for relayed streams and the liveness monitor

pub mod metrics;

pub use metrics::{MonitorStats, StreamStats};
