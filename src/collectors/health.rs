use crossbeam::atomic::AtomicCell;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};

use super::RunFlag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LinkState {
    /// Turned off by the operator or by an init failure.
    Disabled,
    Disconnected,
    Connecting,
    Streaming,
    /// Connected, but the peer went quiet; retrying reads before reconnecting.
    SocketIdleRetry,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Disabled => "disabled",
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Streaming => "streaming",
            LinkState::SocketIdleRetry => "idle-retry",
        };
        f.write_str(s)
    }
}

/// Link state and liveness of one collector.
#[derive(Debug)]
pub struct CollectorHealth {
    pub name: &'static str,
    state: AtomicCell<LinkState>,
    last_update: AtomicCell<Option<Instant>>,
    failures: AtomicCell<u32>,
}

impl CollectorHealth {
    pub fn new(name: &'static str) -> Self {
        CollectorHealth {
            name,
            state: AtomicCell::new(LinkState::Disconnected),
            last_update: AtomicCell::new(None),
            failures: AtomicCell::new(0),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state.load()
    }

    /// Record a transition; logs only when the state actually changes.
    pub fn set_state(&self, state: LinkState) {
        let previous = self.state.swap(state);
        if previous != state {
            log::info!("{}: {} -> {}", self.name, previous, state);
        }
    }

    /// Data arrived.
    pub fn update(&self) {
        self.last_update.store(Some(Instant::now()));
    }

    pub fn time_since_last_update(&self) -> Option<Duration> {
        self.last_update.load().map(|t| t.elapsed())
    }

    /// True when nothing arrived within `threshold`, or nothing ever did.
    pub fn is_silent(&self, threshold: Duration) -> bool {
        self.time_since_last_update()
            .map(|d| d > threshold)
            .unwrap_or(true)
    }

    pub fn record_failure(&self) -> u32 {
        self.failures.fetch_add(1) + 1
    }

    pub fn reset_failures(&self) {
        self.failures.store(0);
    }

    pub fn failures(&self) -> u32 {
        self.failures.load()
    }

    pub fn report(&self, silence_threshold: Duration) -> HealthReport {
        HealthReport {
            name: self.name,
            state: self.state(),
            silent: self.state() != LinkState::Disabled && self.is_silent(silence_threshold),
            silence_secs: self.time_since_last_update().map(|d| d.as_secs_f64()),
            failures: self.failures(),
        }
    }
}

/// Point-in-time view of one collector, for logs and the status file.
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    pub name: &'static str,
    pub state: LinkState,
    pub silent: bool,
    pub silence_secs: Option<f64>,
    pub failures: u32,
}

/// Health of the three collectors.
#[derive(Debug)]
pub struct HealthMonitor {
    pub i2c: CollectorHealth,
    pub serial: CollectorHealth,
    pub network: CollectorHealth,
    silence_threshold: Duration,
    check_interval: Duration,
}

impl HealthMonitor {
    pub fn new(silence_threshold: Duration) -> Self {
        HealthMonitor {
            i2c: CollectorHealth::new("i2c"),
            serial: CollectorHealth::new("serial"),
            network: CollectorHealth::new("network"),
            silence_threshold,
            check_interval: Duration::from_secs(5),
        }
    }

    pub fn collectors(&self) -> [&CollectorHealth; 3] {
        [&self.i2c, &self.serial, &self.network]
    }

    pub fn check_health(&self) -> Vec<HealthReport> {
        self.collectors()
            .iter()
            .map(|c| c.report(self.silence_threshold))
            .collect()
    }

    pub fn format_status(&self) -> String {
        let parts: Vec<String> = self
            .check_health()
            .into_iter()
            .map(|r| match (r.state, r.silent) {
                (LinkState::Disabled, _) => format!("{} off", r.name),
                (state, false) => format!("{} {} ✓", r.name, state),
                (state, true) => format!(
                    "{} {} ⚠ (silent {:.1}s)",
                    r.name,
                    state,
                    r.silence_secs.unwrap_or(0.0)
                ),
            })
            .collect();
        format!("Health: {}", parts.join(" | "))
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(Duration::from_secs(4))
    }
}

/// Periodically log collector health until the run flag clears.
pub async fn health_monitor_task(monitor: Arc<HealthMonitor>, run_flag: RunFlag) {
    while run_flag.is_running() {
        sleep(monitor.check_interval).await;

        for report in monitor.check_health() {
            if report.state == LinkState::Streaming && report.silent {
                log::warn!(
                    "{} streaming but silent for {:.1}s",
                    report.name,
                    report.silence_secs.unwrap_or(0.0)
                );
            }
        }
        log::debug!("{}", monitor.format_status());
    }
}
