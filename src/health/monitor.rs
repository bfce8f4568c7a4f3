//! C5: register named probes, evaluate them on a ticker, and derive an
//! overall health status with bounded history and change callbacks.
//!
//! The ticker/timeout/shutdown shape below follows the pattern used
//! elsewhere in this codebase for monitoring a long-lived background
//! resource: a `tokio::time::interval` raced against a broadcast shutdown
//! signal inside `tokio::select!`, with every check bounded by its own
//! timeout so one wedged probe can never stall the loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

use crate::events::{Event, EventBus};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_HISTORY_LEN: usize = 100;

/// What a single probe reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub healthy: bool,
    pub error: Option<String>,
    pub metrics: Option<Value>,
}

impl ProbeResult {
    #[must_use]
    pub fn healthy() -> Self {
        Self { healthy: true, error: None, metrics: None }
    }

    #[must_use]
    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self { healthy: false, error: Some(error.into()), metrics: None }
    }
}

/// A single named probe's most recent observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub name: String,
    pub result: ProbeResult,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// One point in the rolling history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverallHealth {
    pub status: HealthStatus,
    pub probes: Vec<ProbeOutcome>,
    pub observed_at: DateTime<Utc>,
}

type Probe = Arc<dyn Fn() -> BoxFuture<'static, ProbeResult> + Send + Sync>;
type ChangeCallback = Arc<dyn Fn(HealthStatus) + Send + Sync>;

pub struct HealthMonitor {
    probes: RwLock<HashMap<String, Probe>>,
    history: RwLock<VecDeque<OverallHealth>>,
    max_history: usize,
    check_interval: Duration,
    unhealthy_threshold: usize,
    degraded_threshold: usize,
    current_status: RwLock<Option<HealthStatus>>,
    change_callbacks: RwLock<Vec<ChangeCallback>>,
    events: Arc<EventBus>,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(events: Arc<EventBus>, check_interval: Duration) -> Self {
        Self {
            probes: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            max_history: DEFAULT_HISTORY_LEN,
            check_interval,
            unhealthy_threshold: 1,
            degraded_threshold: 1,
            current_status: RwLock::new(None),
            change_callbacks: RwLock::new(Vec::new()),
            events,
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, unhealthy_threshold: usize, degraded_threshold: usize) -> Self {
        self.unhealthy_threshold = unhealthy_threshold.max(1);
        self.degraded_threshold = degraded_threshold.max(1);
        self
    }

    pub async fn register_probe<F>(&self, name: impl Into<String>, probe: F)
    where
        F: Fn() -> BoxFuture<'static, ProbeResult> + Send + Sync + 'static,
    {
        self.probes.write().await.insert(name.into(), Arc::new(probe));
    }

    pub async fn on_change<F>(&self, callback: F)
    where
        F: Fn(HealthStatus) + Send + Sync + 'static,
    {
        self.change_callbacks.write().await.push(Arc::new(callback));
    }

    /// Race every registered probe against the fixed per-probe timeout and
    /// aggregate into an overall status, without altering history or firing
    /// callbacks — used both by the background ticker and for on-demand
    /// health checks.
    pub async fn run_once(&self) -> OverallHealth {
        let probes: Vec<(String, Probe)> = self
            .probes
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut outcomes = Vec::with_capacity(probes.len());
        for (name, probe) in probes {
            let result = match tokio::time::timeout(PROBE_TIMEOUT, probe()).await {
                Ok(result) => result,
                Err(_) => ProbeResult::unhealthy("Health check timeout"),
            };
            outcomes.push(ProbeOutcome { name, result, observed_at: Utc::now() });
        }

        let unhealthy_count = outcomes.iter().filter(|o| !o.result.healthy).count();
        let status = if unhealthy_count >= self.unhealthy_threshold {
            HealthStatus::Unhealthy
        } else if unhealthy_count > 0 || unhealthy_count >= self.degraded_threshold {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        OverallHealth { status, probes: outcomes, observed_at: Utc::now() }
    }

    async fn record_and_notify(&self, snapshot: OverallHealth) {
        let changed = {
            let mut current = self.current_status.write().await;
            let changed = *current != Some(snapshot.status);
            *current = Some(snapshot.status);
            changed
        };

        {
            let mut history = self.history.write().await;
            if history.len() >= self.max_history {
                history.pop_front();
            }
            history.push_back(snapshot.clone());
        }

        self.events
            .emit(Event::new(
                "system:healthcheck",
                "health-monitor",
                json!({ "status": snapshot.status, "probeCount": snapshot.probes.len() }),
            ))
            .await;

        if changed {
            for callback in self.change_callbacks.read().await.iter() {
                callback(snapshot.status);
            }
        }
    }

    /// Start the background ticker. Returns a handle that resolves once
    /// `shutdown_rx` fires or is dropped.
    pub fn start(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.check_interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let snapshot = self.run_once().await;
                        self.record_and_notify(snapshot).await;
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::info!("health monitor received shutdown signal");
                        break;
                    }
                }
            }
        })
    }

    pub async fn history(&self) -> Vec<OverallHealth> {
        self.history.read().await.iter().cloned().collect()
    }

    pub async fn current_status(&self) -> Option<HealthStatus> {
        *self.current_status.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> Arc<HealthMonitor> {
        Arc::new(HealthMonitor::new(Arc::new(EventBus::new()), Duration::from_millis(20)))
    }

    #[tokio::test]
    async fn run_once_with_no_probes_is_healthy() {
        let monitor = monitor();
        let snapshot = monitor.run_once().await;
        assert_eq!(snapshot.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn one_unhealthy_probe_makes_overall_unhealthy_at_default_threshold() {
        let monitor = monitor();
        monitor
            .register_probe("db", || Box::pin(async { ProbeResult::unhealthy("down") }))
            .await;
        let snapshot = monitor.run_once().await;
        assert_eq!(snapshot.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn timeout_probe_result_carries_the_spec_mandated_message() {
        let result = ProbeResult::unhealthy("Health check timeout");
        assert_eq!(result.error.unwrap(), "Health check timeout");
        assert!(!result.healthy);
    }

    #[tokio::test]
    async fn graceful_shutdown_stops_the_ticker() {
        let monitor = monitor();
        let (tx, rx) = broadcast::channel(1);
        let handle = monitor.start(rx);
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn change_callback_fires_only_on_status_transition() {
        let monitor = monitor();
        let seen = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        monitor
            .on_change(move |status| {
                let seen_clone = seen_clone.clone();
                tokio::spawn(async move {
                    seen_clone.lock().await.push(status);
                });
            })
            .await;

        monitor.record_and_notify(OverallHealth { status: HealthStatus::Healthy, probes: vec![], observed_at: Utc::now() }).await;
        monitor.record_and_notify(OverallHealth { status: HealthStatus::Healthy, probes: vec![], observed_at: Utc::now() }).await;
        monitor.record_and_notify(OverallHealth { status: HealthStatus::Unhealthy, probes: vec![], observed_at: Utc::now() }).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(seen.lock().await.len(), 2);
    }
}
