use std::sync::{Arc, PoisonError};
use tokio::task;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::health::{CollectorHealth, HealthMonitor, LinkState};
use super::RunFlag;
use crate::blackboard::{NavigationState, Origin, Provenance, Source};
use crate::calibration::ProfileCell;
use crate::config::Tuning;
use crate::error::NavResult;
use crate::imu::{ImuReading, SharedImu};
use crate::persistence::SettingsStore;

/// Polls the IMU at a fixed period and publishes heading, roll and pitch.
///
/// The IMU is the lowest-ranked heading source, so its heading only lands
/// when no NMEA heading is fresh.
pub struct I2cCollector {
    imu: SharedImu,
    state: Arc<NavigationState>,
    profile: Arc<ProfileCell>,
    store: Arc<dyn SettingsStore>,
    health: Arc<HealthMonitor>,
    tuning: Tuning,
    polls: u64,
    consecutive_failures: u32,
}

impl I2cCollector {
    pub fn new(
        imu: SharedImu,
        state: Arc<NavigationState>,
        profile: Arc<ProfileCell>,
        store: Arc<dyn SettingsStore>,
        health: Arc<HealthMonitor>,
        tuning: &Tuning,
    ) -> Self {
        Self {
            imu,
            state,
            profile,
            store,
            health,
            tuning: tuning.clone(),
            polls: 0,
            consecutive_failures: 0,
        }
    }

    fn link(&self) -> &CollectorHealth {
        &self.health.i2c
    }

    /// Poll on the blocking pool each tick; bus transactions never run on
    /// a runtime worker.
    pub async fn run(self, run_flag: RunFlag) {
        let mut ticker = interval(self.tuning.i2c_poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let health = self.health.clone();
        health.i2c.set_state(LinkState::Streaming);

        let mut collector = self;
        while run_flag.is_running() {
            ticker.tick().await;
            let now = Instant::now();
            let polled = task::spawn_blocking(move || {
                let keep_going = collector.step(now);
                (collector, keep_going)
            })
            .await;
            match polled {
                Ok((back, true)) => collector = back,
                Ok((_, false)) => return,
                Err(e) => {
                    log::error!("I2C poll task failed: {}", e);
                    health.i2c.set_state(LinkState::Disabled);
                    return;
                }
            }
        }
        health.i2c.set_state(LinkState::Disconnected);
    }

    /// One poll. Returns false once the failure budget is spent.
    pub fn step(&mut self, now: Instant) -> bool {
        match self.poll_once(now) {
            Ok(_) => {
                self.consecutive_failures = 0;
                self.link().reset_failures();
                self.link().update();
                true
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let failures = self.link().record_failure();
                log::warn!("IMU read failed ({} in a row): {}", failures, e);
                if self.consecutive_failures > self.tuning.i2c_failure_budget {
                    log::error!(
                        "IMU failed {} consecutive reads; stopping I2C collector",
                        self.consecutive_failures
                    );
                    self.link().set_state(LinkState::Disabled);
                    return false;
                }
                true
            }
        }
    }

    pub fn poll_once(&mut self, now: Instant) -> NavResult<ImuReading> {
        if self.polls > 0 && self.polls % u64::from(self.tuning.profile_reload_polls.max(1)) == 0 {
            self.reload_profile();
        }
        self.polls += 1;

        let profile = self.profile.load();
        let dt = self.tuning.i2c_poll_period.as_secs_f64();
        let reading = self
            .imu
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .poll(&profile, dt)?;

        if reading.heading_updated {
            if let Some(heading) = reading.heading {
                self.state.heading.set_if_fresher(
                    heading,
                    Provenance::new(Source::Imu, Origin::Compass),
                    now,
                );
            }
        }
        let attitude = Provenance::new(Source::Imu, Origin::Attitude);
        self.state.roll.set_if_fresher(reading.roll_deg, attitude, now);
        self.state.pitch.set_if_fresher(reading.pitch_deg, attitude, now);
        Ok(reading)
    }

    fn reload_profile(&self) {
        match self.store.load_calibration() {
            Ok(profile) => {
                if profile != self.profile.load() {
                    log::info!("Calibration profile changed; using new offsets");
                }
                self.profile.store(profile);
            }
            Err(e) => log::warn!("Keeping current calibration, reload failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationProfile;
    use crate::imu::bus::ScriptedBus;
    use crate::imu::chip::{lsm9ds1, script_identity, Lsm9ds1};
    use crate::imu::ImuFusionEngine;
    use crate::persistence::MemoryStore;
    use crate::types::RawAxes;
    use std::time::Duration;

    struct Rig {
        bus: ScriptedBus,
        state: Arc<NavigationState>,
        profile: Arc<ProfileCell>,
        store: Arc<MemoryStore>,
        health: Arc<HealthMonitor>,
        collector: I2cCollector,
    }

    fn rig() -> Rig {
        let bus = ScriptedBus::new();
        script_identity(&bus, &Lsm9ds1);
        bus.set_axes(lsm9ds1::XG_ADDRESS, lsm9ds1::OUT_X_L_XL, RawAxes::new(0, 0, 1000));
        bus.set_axes(lsm9ds1::XG_ADDRESS, lsm9ds1::OUT_X_L_G, RawAxes::default());
        bus.set_axes(lsm9ds1::MAG_ADDRESS, lsm9ds1::OUT_X_L_M, RawAxes::new(0, 800, -400));

        let tuning = Tuning::default();
        let imu = ImuFusionEngine::init(Box::new(bus.clone()), &tuning).unwrap().into_shared();
        let state = Arc::new(NavigationState::default());
        let flat = CalibrationProfile {
            mag_min: [-2000, -2000, -2000],
            mag_max: [2000, 2000, 2000],
            declination_rad: 0.0,
            ..CalibrationProfile::default()
        };
        let profile = Arc::new(ProfileCell::new(flat));
        let store = Arc::new(MemoryStore::default());
        store.save_calibration(&flat).unwrap();
        let health = Arc::new(HealthMonitor::default());
        let collector = I2cCollector::new(
            imu,
            state.clone(),
            profile.clone(),
            store.clone(),
            health.clone(),
            &tuning,
        );
        Rig {
            bus,
            state,
            profile,
            store,
            health,
            collector,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_heading_and_attitude() {
        let mut rig = rig();
        let now = Instant::now();
        assert!(rig.collector.step(now));

        let heading = rig.state.heading.read(now);
        assert!(heading.fresh);
        assert_eq!(heading.source, Some(Source::Imu));
        assert!((heading.value - 90.0).abs() < 1e-6);
        assert!(rig.state.roll.is_fresh(now));
        assert!(rig.state.pitch.is_fresh(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_defers_to_fresh_nmea_heading() {
        let mut rig = rig();
        let now = Instant::now();
        rig.state
            .heading
            .set_if_fresher(123.0, Provenance::new(Source::Serial, Origin::Hdt), now);

        rig.collector.step(now + Duration::from_secs(1));
        assert_eq!(rig.state.heading.read(now).value, 123.0);

        // Once the serial heading is stale, the compass takes over.
        for i in 1..=6 {
            rig.collector.step(now + Duration::from_secs(4) + Duration::from_millis(260 * i));
        }
        let later = now + Duration::from_secs(6);
        assert_eq!(rig.state.heading.read(later).source, Some(Source::Imu));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reloads_profile_every_ten_polls() {
        let mut rig = rig();
        let mut updated = rig.profile.load();
        updated.roll_offset_deg = 5.0;
        rig.store.save_calibration(&updated).unwrap();

        let now = Instant::now();
        for _ in 0..10 {
            rig.collector.step(now);
        }
        assert_eq!(rig.profile.load().roll_offset_deg, 0.0);

        let reading = rig.collector.poll_once(now).unwrap();
        assert_eq!(rig.profile.load().roll_offset_deg, 5.0);
        assert!((reading.roll_deg - 5.0).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_failure_budget() {
        let rig = rig();
        rig.bus.set_failing(true);
        let flag = RunFlag::new();
        let handle = tokio::spawn(rig.collector.run(flag.clone()));

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("collector should stop by itself")
            .unwrap();
        assert!(flag.is_running());
        assert_eq!(rig.health.i2c.state(), LinkState::Disabled);
        assert_eq!(rig.health.i2c.failures(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_is_tolerated() {
        let mut rig = rig();
        let now = Instant::now();
        rig.bus.set_failing(true);
        for _ in 0..3 {
            assert!(rig.collector.step(now));
        }
        rig.bus.set_failing(false);
        assert!(rig.collector.step(now));
        assert_eq!(rig.health.i2c.failures(), 0);

        rig.bus.set_failing(true);
        for _ in 0..3 {
            assert!(rig.collector.step(now));
        }
        assert!(!rig.collector.step(now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_exits_on_flag() {
        let rig = rig();
        let flag = RunFlag::new();
        let state = rig.state.clone();
        let handle = tokio::spawn(rig.collector.run(flag.clone()));

        tokio::time::sleep(Duration::from_secs(2)).await;
        flag.stop();
        handle.await.unwrap();
        assert!(state.roll.stamp().is_some());
        assert_eq!(rig.health.i2c.state(), LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_slow_bus_does_not_stall_runtime() {
        let rig = rig();
        rig.bus.set_latency(Duration::from_millis(100));
        let flag = RunFlag::new();
        let handle = tokio::spawn(rig.collector.run(flag.clone()));

        // Let the first poll start, then check the runtime still ticks.
        tokio::task::yield_now().await;
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let waited = started.elapsed();

        flag.stop();
        handle.await.unwrap();
        assert!(waited < Duration::from_millis(100), "runtime stalled for {:?}", waited);
        assert!(rig.state.roll.stamp().is_some());
    }
}
