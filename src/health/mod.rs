//! C5: the health monitor.

mod monitor;

pub use monitor::{HealthMonitor, HealthStatus, OverallHealth, ProbeOutcome, ProbeResult};
