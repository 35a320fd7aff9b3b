//! Timed hard-iron capture.
//!
//! The operator turns the boat through a full circle while the recorder
//! samples the raw magnetometer. The midpoint of each axis' extremes is the
//! hard-iron bias.

use std::sync::PoisonError;
use std::time::Duration;
use tokio::task;
use tokio::time::Instant;

use super::profile::{CalibrationProfile, ProfileCell};
use crate::collectors::RunFlag;
use crate::config::Tuning;
use crate::declination::{lookup_with_timeout, DeclinationLookup};
use crate::error::{NavError, NavResult};
use crate::imu::SharedImu;
use crate::persistence::SettingsStore;
use crate::types::{Axis3, Position, RawAxes};

/// Running per-axis min/max of raw magnetometer samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MagExtrema {
    min: [i16; 3],
    max: [i16; 3],
    samples: u64,
}

impl Default for MagExtrema {
    fn default() -> Self {
        Self {
            min: [i16::MAX; 3],
            max: [-i16::MAX; 3],
            samples: 0,
        }
    }
}

impl MagExtrema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sample: RawAxes) {
        for (i, v) in sample.as_array().into_iter().enumerate() {
            self.min[i] = self.min[i].min(v);
            self.max[i] = self.max[i].max(v);
        }
        self.samples += 1;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    pub fn min(&self) -> RawAxes {
        RawAxes::new(self.min[0], self.min[1], self.min[2])
    }

    pub fn max(&self) -> RawAxes {
        RawAxes::new(self.max[0], self.max[1], self.max[2])
    }

    /// (min + max) / 2 per axis.
    pub fn offsets(&self) -> Axis3 {
        (Axis3::from(self.min()) + Axis3::from(self.max())) / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationOutcome {
    Completed(CalibrationProfile),
    /// Stopped by the operator; the previous profile stays in effect.
    Cancelled,
}

pub struct CalibrationRecorder {
    duration: Duration,
    sample_period: Duration,
    lookup_timeout: Duration,
}

impl CalibrationRecorder {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            duration: tuning.calibration_duration,
            sample_period: tuning.calibration_sample_period,
            lookup_timeout: tuning.declination_timeout,
        }
    }

    /// Sample the magnetometer for the configured duration while the
    /// declination lookup runs alongside.
    ///
    /// The returned profile keeps every field of `base` except the extrema
    /// and, when the lookup answered, the declination.
    pub async fn record(
        &self,
        imu: &SharedImu,
        base: CalibrationProfile,
        position: Option<Position>,
        lookup: &dyn DeclinationLookup,
        run_flag: &RunFlag,
    ) -> NavResult<CalibrationOutcome> {
        log::info!(
            "Calibration started: turn the boat slowly through 360 degrees ({}s)",
            self.duration.as_secs()
        );

        let lookup_timeout = self.lookup_timeout;
        let declination_lookup = async move {
            match position {
                Some(position) => lookup_with_timeout(lookup, position, lookup_timeout).await,
                None => None,
            }
        };
        tokio::pin!(declination_lookup);
        let mut lookup_pending = position.is_some();
        let mut declination = None;

        let deadline = Instant::now() + self.duration;
        let mut ticker = tokio::time::interval(self.sample_period);
        let mut extrema = MagExtrema::new();
        let mut read_errors = 0u64;

        loop {
            tokio::select! {
                found = &mut declination_lookup, if lookup_pending => {
                    lookup_pending = false;
                    declination = found;
                }
                _ = ticker.tick() => {
                    if !run_flag.is_running() {
                        log::info!("Calibration cancelled after {} samples", extrema.samples());
                        return Ok(CalibrationOutcome::Cancelled);
                    }
                    if Instant::now() >= deadline {
                        break;
                    }
                    let shared = imu.clone();
                    let sample = task::spawn_blocking(move || {
                        shared.lock().unwrap_or_else(PoisonError::into_inner).read_raw_mag()
                    })
                    .await
                    .map_err(|e| NavError::Calibration(format!("sampling task failed: {}", e)))?;
                    match sample {
                        Ok(sample) => extrema.observe(sample),
                        Err(e) => {
                            read_errors += 1;
                            log::debug!("Calibration sample failed: {}", e);
                        }
                    }
                }
            }
        }

        if lookup_pending {
            log::warn!("Declination lookup still pending at end of calibration; keeping previous value");
        }
        if extrema.is_empty() {
            return Err(NavError::Calibration(format!(
                "no magnetometer samples ({} read errors)",
                read_errors
            )));
        }

        let mut profile = base.with_extrema(extrema.min(), extrema.max());
        if let Some(rad) = declination {
            profile.declination_rad = rad;
        }
        log::info!(
            "Calibration done: {} samples, min {:?} max {:?}, declination {:.4} rad",
            extrema.samples(),
            profile.mag_min,
            profile.mag_max,
            profile.declination_rad
        );
        Ok(CalibrationOutcome::Completed(profile))
    }
}

/// Persist a completed calibration, then publish it to the running engine.
///
/// Returns the profile now in effect, or `None` for a cancelled session.
pub fn apply_calibration(
    store: &dyn SettingsStore,
    cell: &ProfileCell,
    outcome: &CalibrationOutcome,
) -> NavResult<Option<CalibrationProfile>> {
    match outcome {
        CalibrationOutcome::Completed(profile) => {
            store.save_calibration(profile)?;
            cell.store(*profile);
            Ok(Some(*profile))
        }
        CalibrationOutcome::Cancelled => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declination::FixedDeclination;
    use crate::imu::bus::ScriptedBus;
    use crate::imu::chip::{lsm9ds1, script_identity, Lsm9ds1};
    use crate::imu::ImuFusionEngine;
    use crate::persistence::MemoryStore;

    fn short_tuning() -> Tuning {
        Tuning {
            calibration_duration: Duration::from_millis(600),
            ..Tuning::default()
        }
    }

    fn scripted_imu() -> (ScriptedBus, SharedImu) {
        let bus = ScriptedBus::new();
        script_identity(&bus, &Lsm9ds1);
        bus.set_axes(lsm9ds1::XG_ADDRESS, lsm9ds1::OUT_X_L_XL, RawAxes::new(0, 0, 1000));
        bus.set_axes(lsm9ds1::XG_ADDRESS, lsm9ds1::OUT_X_L_G, RawAxes::default());
        bus.set_axes(lsm9ds1::MAG_ADDRESS, lsm9ds1::OUT_X_L_M, RawAxes::new(0, 0, 0));
        let engine = ImuFusionEngine::init(Box::new(bus.clone()), &Tuning::default()).unwrap();
        (bus, engine.into_shared())
    }

    const HOME: Position = Position {
        latitude: 57.7,
        longitude: 11.9,
    };

    #[test]
    fn test_extrema_round_trip() {
        let stream = [
            RawAxes::new(-300, 50, -1200),
            RawAxes::new(900, -700, -400),
            RawAxes::new(100, 650, -2500),
            RawAxes::new(-50, 0, -800),
        ];
        let mut extrema = MagExtrema::new();
        for s in stream {
            extrema.observe(s);
        }
        assert_eq!(extrema.min(), RawAxes::new(-300, -700, -2500));
        assert_eq!(extrema.max(), RawAxes::new(900, 650, -400));
        assert_eq!(extrema.offsets(), Axis3::new(300.0, -25.0, -1450.0));

        let profile = CalibrationProfile::default().with_extrema(extrema.min(), extrema.max());
        assert_eq!(profile.hard_iron_offset(), extrema.offsets());
    }

    #[tokio::test(start_paused = true)]
    async fn test_record_captures_turn() {
        let (bus, imu) = scripted_imu();
        let turn = [
            RawAxes::new(400, 0, -900),
            RawAxes::new(0, 380, -950),
            RawAxes::new(-420, 0, -1000),
            RawAxes::new(0, -390, -870),
        ];
        bus.set_axes(lsm9ds1::MAG_ADDRESS, lsm9ds1::OUT_X_L_M, turn[0]);
        let feeder = tokio::spawn(async move {
            for s in turn {
                bus.set_axes(lsm9ds1::MAG_ADDRESS, lsm9ds1::OUT_X_L_M, s);
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        });

        let recorder = CalibrationRecorder::new(&short_tuning());
        let base = CalibrationProfile {
            heading_offset_deg: 4.0,
            ..CalibrationProfile::default()
        };
        let outcome = recorder
            .record(&imu, base, Some(HOME), &FixedDeclination(Some(0.05)), &RunFlag::new())
            .await
            .unwrap();
        feeder.await.unwrap();

        let CalibrationOutcome::Completed(profile) = outcome else {
            panic!("expected a completed calibration");
        };
        assert_eq!(profile.mag_min, [-420, -390, -1000]);
        assert_eq!(profile.mag_max, [400, 380, -870]);
        assert_eq!(profile.declination_rad, 0.05);
        assert_eq!(profile.heading_offset_deg, 4.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_declination_keeps_previous() {
        let (_bus, imu) = scripted_imu();
        let recorder = CalibrationRecorder::new(&short_tuning());
        let outcome = recorder
            .record(&imu, CalibrationProfile::default(), Some(HOME), &FixedDeclination(None), &RunFlag::new())
            .await
            .unwrap();
        match outcome {
            CalibrationOutcome::Completed(profile) => assert_eq!(profile.declination_rad, 0.11),
            CalibrationOutcome::Cancelled => panic!("not cancelled"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_leaves_profile_untouched() {
        let (_bus, imu) = scripted_imu();
        let flag = RunFlag::new();
        flag.stop();
        let recorder = CalibrationRecorder::new(&short_tuning());
        let outcome = recorder
            .record(&imu, CalibrationProfile::default(), None, &FixedDeclination(None), &flag)
            .await
            .unwrap();
        assert_eq!(outcome, CalibrationOutcome::Cancelled);

        let store = MemoryStore::default();
        let cell = ProfileCell::default();
        assert_eq!(apply_calibration(&store, &cell, &outcome).unwrap(), None);
        assert_eq!(cell.load(), CalibrationProfile::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_is_error() {
        let (bus, imu) = scripted_imu();
        bus.set_failing(true);
        let recorder = CalibrationRecorder::new(&short_tuning());
        let result = recorder
            .record(&imu, CalibrationProfile::default(), None, &FixedDeclination(None), &RunFlag::new())
            .await;
        assert!(matches!(result, Err(NavError::Calibration(_))));
    }

    #[test]
    fn test_apply_saves_then_publishes() {
        let store = MemoryStore::default();
        let cell = ProfileCell::default();
        let profile = CalibrationProfile::default().with_extrema(RawAxes::new(-5, -5, -5), RawAxes::new(5, 5, 5));

        let applied = apply_calibration(&store, &cell, &CalibrationOutcome::Completed(profile)).unwrap();
        assert_eq!(applied, Some(profile));
        assert_eq!(cell.load(), profile);
        assert_eq!(store.load_calibration().unwrap(), profile);
    }
}
