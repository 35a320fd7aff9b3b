use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{NavError, NavResult};

// ─── Tuned constants ─────────────────────────────────────────────────────────

/// A field older than this is stale.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(4);
/// Lower-tier sentences yield to a higher-tier one seen within this window.
pub const DEFERENCE_WINDOW: Duration = Duration::from_secs(2);
/// Below this SOG (knots) GPS track is noise and is not used as heading.
pub const TRUSTED_SOG_KNOTS: f64 = 2.5;
pub const HEADING_DEADBAND_DEG: f64 = 2.0;
pub const HEADING_SUBSAMPLE: u32 = 6;
pub const MAG_LPF_FACTOR: f64 = 0.4;
pub const ACC_LPF_FACTOR: f64 = 0.1;
/// Gyro sensitivity at 2000 dps full scale, degrees/s per LSB.
pub const GYRO_GAIN: f64 = 0.070;
pub const COMPLEMENTARY_GYRO_WEIGHT: f64 = 0.97;
pub const I2C_POLL_PERIOD: Duration = Duration::from_millis(260);
pub const PROFILE_RELOAD_POLLS: u32 = 10;
pub const I2C_FAILURE_BUDGET: u32 = 3;
pub const KNOTS_PER_MPS: f64 = 1.94;
pub const TRUE_WIND_MIN_STW_KNOTS: f64 = 0.9;

pub const DEFAULT_BAUD: u32 = 9600;
pub const SUPPORTED_BAUDS: [u32; 4] = [4800, 9600, 38400, 115200];
pub const DEFAULT_NMEA_PORT: u16 = 10110;

// ─── Timing and thresholds ───────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Tuning {
    // ── Blackboard ──
    pub freshness_window: Duration,
    pub deference_window: Duration,
    pub trusted_sog_knots: f64,
    pub true_wind_min_stw_knots: f64,

    // ── IMU fusion ──
    pub heading_deadband_deg: f64,
    pub heading_subsample: u32,
    pub mag_lpf: f64,
    pub acc_lpf: f64,
    pub gyro_gain: f64,
    pub gyro_weight: f64,

    // ── I2C collector ──
    pub i2c_poll_period: Duration,
    pub profile_reload_polls: u32,
    pub i2c_failure_budget: u32,

    // ── Serial collector ──
    pub serial_read_timeout: Duration,
    pub serial_error_delay: Duration,
    pub serial_defer_sleep: Duration,
    pub serial_reopen_delay: Duration,

    // ── Network collector ──
    pub connect_base_backoff: Duration,
    pub connect_max_backoff: Duration,
    pub connect_logged_attempts: u32,
    pub initial_readable_wait: Duration,
    pub read_wait: Duration,
    pub idle_read_budget: u32,
    pub idle_retry_delay: Duration,
    pub empty_read_delay: Duration,

    // ── Calibration ──
    pub calibration_duration: Duration,
    pub calibration_sample_period: Duration,
    pub declination_timeout: Duration,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            freshness_window: FRESHNESS_WINDOW,
            deference_window: DEFERENCE_WINDOW,
            trusted_sog_knots: TRUSTED_SOG_KNOTS,
            true_wind_min_stw_knots: TRUE_WIND_MIN_STW_KNOTS,
            heading_deadband_deg: HEADING_DEADBAND_DEG,
            heading_subsample: HEADING_SUBSAMPLE,
            mag_lpf: MAG_LPF_FACTOR,
            acc_lpf: ACC_LPF_FACTOR,
            gyro_gain: GYRO_GAIN,
            gyro_weight: COMPLEMENTARY_GYRO_WEIGHT,
            i2c_poll_period: I2C_POLL_PERIOD,
            profile_reload_polls: PROFILE_RELOAD_POLLS,
            i2c_failure_budget: I2C_FAILURE_BUDGET,
            serial_read_timeout: Duration::from_secs(1),
            serial_error_delay: Duration::from_millis(40),
            serial_defer_sleep: Duration::from_secs(1),
            serial_reopen_delay: Duration::from_secs(5),
            connect_base_backoff: Duration::from_secs(10),
            connect_max_backoff: Duration::from_secs(30),
            connect_logged_attempts: 3,
            initial_readable_wait: Duration::from_secs(5),
            read_wait: Duration::from_secs(3),
            idle_read_budget: 10,
            idle_retry_delay: Duration::from_secs(1),
            empty_read_delay: Duration::from_millis(30),
            calibration_duration: Duration::from_secs(60),
            calibration_sample_period: Duration::from_millis(25),
            declination_timeout: Duration::from_secs(10),
        }
    }
}

// ─── Runtime configuration ───────────────────────────────────────────────────

/// Channel settings loaded from the settings store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub serial_device: String,
    pub baud: u32,
    pub network_host: String,
    pub network_port: u16,
    pub i2c_bus: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            serial_device: "/dev/ttyS0".to_string(),
            baud: DEFAULT_BAUD,
            network_host: "localhost".to_string(),
            network_port: DEFAULT_NMEA_PORT,
            i2c_bus: "/dev/i2c-1".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Normalize the baud rate and reject unusable network settings.
    pub fn validated(mut self) -> NavResult<Self> {
        if !SUPPORTED_BAUDS.contains(&self.baud) {
            log::warn!(
                "Unsupported baud rate {} for {}, falling back to {}",
                self.baud,
                self.serial_device,
                DEFAULT_BAUD
            );
            self.baud = DEFAULT_BAUD;
        }
        if self.network_host.trim().is_empty() {
            return Err(NavError::InvalidConfig("network host is empty".to_string()));
        }
        if self.network_port == 0 {
            return Err(NavError::InvalidConfig("network port is 0".to_string()));
        }
        Ok(self)
    }

    pub fn network_address(&self) -> String {
        format!("{}:{}", self.network_host, self.network_port)
    }
}
