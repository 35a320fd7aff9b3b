use serde::Serialize;
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

use crate::blackboard::{NavigationSnapshot, NavigationView, Source};
use crate::collectors::{HealthMonitor, HealthReport};
use crate::error::NavResult;

/// Status file for mirroring consumers: navigation fields plus collector
/// health, rewritten periodically by the binary.
#[derive(Serialize, Clone, Debug)]
pub struct LiveStatus {
    pub timestamp: f64,
    pub uptime_seconds: u64,
    pub imu_chip: Option<String>,
    pub network_live: bool,
    pub serial_live: bool,
    pub navigation: NavigationSnapshot,
    pub collectors: Vec<HealthReport>,
}

impl LiveStatus {
    pub fn capture(
        view: &NavigationView,
        health: &HealthMonitor,
        uptime: Duration,
        imu_chip: Option<&str>,
    ) -> Self {
        let now = Instant::now();
        Self {
            timestamp: current_timestamp(),
            uptime_seconds: uptime.as_secs(),
            imu_chip: imu_chip.map(str::to_string),
            network_live: view.is_source_live(Source::Network, now),
            serial_live: view.is_source_live(Source::Serial, now),
            navigation: view.snapshot(now),
            collectors: health.check_health(),
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> NavResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::{NavigationState, Origin, Provenance};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_status_round_trips_to_json() {
        let state = Arc::new(NavigationState::default());
        state
            .depth
            .set_if_fresher(8.5, Provenance::new(Source::Serial, Origin::Dpt), Instant::now());
        let view = NavigationView::new(state);
        let health = HealthMonitor::default();

        let status = LiveStatus::capture(&view, &health, Duration::from_secs(90), Some("LSM9DS1"));
        let path = std::env::temp_dir().join(format!("speedometer-status-{}.json", std::process::id()));
        status.save(&path).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["uptime_seconds"], 90);
        assert_eq!(json["imu_chip"], "LSM9DS1");
        assert_eq!(json["navigation"]["depth"]["value"], 8.5);
        assert_eq!(json["navigation"]["depth"]["fresh"], true);
        assert_eq!(json["navigation"]["depth"]["source"], "Serial");
        assert_eq!(json["navigation"]["heading"]["age_secs"], serde_json::Value::Null);
        assert_eq!(json["collectors"].as_array().unwrap().len(), 3);
        let _ = fs::remove_file(&path);
    }
}
