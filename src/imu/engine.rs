use std::sync::{Arc, Mutex};

use super::bus::RegisterBus;
use super::chip::{detect, SensorChip};
use crate::calibration::CalibrationProfile;
use crate::config::Tuning;
use crate::error::NavResult;
use crate::filters::{AttitudeState, ComplementaryFilter, HeadingPipeline};
use crate::types::{RawAxes, RawImuSample};

/// Output of one poll.
#[derive(Clone, Copy, Debug)]
pub struct ImuReading {
    /// Debounced heading; repeats the last value between sub-samples.
    pub heading: Option<f64>,
    /// True when this poll recomputed the heading.
    pub heading_updated: bool,
    /// Blended roll plus the profile's roll offset.
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub attitude: AttitudeState,
}

/// IMU behind a probed chip strategy, with heading and attitude filters.
pub struct ImuFusionEngine {
    bus: Box<dyn RegisterBus>,
    chip: Box<dyn SensorChip>,
    heading: HeadingPipeline,
    attitude: ComplementaryFilter,
}

/// The engine is polled by the I2C collector and sampled by calibration.
pub type SharedImu = Arc<Mutex<ImuFusionEngine>>;

impl ImuFusionEngine {
    /// Probe for a supported chip, enable it, and build the filters.
    pub fn init(mut bus: Box<dyn RegisterBus>, tuning: &Tuning) -> NavResult<Self> {
        let chip = detect(bus.as_mut())?;
        Ok(Self {
            bus,
            chip,
            heading: HeadingPipeline::new(tuning),
            attitude: ComplementaryFilter::new(tuning.gyro_gain, tuning.gyro_weight),
        })
    }

    pub fn into_shared(self) -> SharedImu {
        Arc::new(Mutex::new(self))
    }

    pub fn chip_name(&self) -> &'static str {
        self.chip.name()
    }

    /// Run the attitude filter every poll and the heading pipeline on its
    /// sub-sampled cadence.
    pub fn poll(&mut self, profile: &CalibrationProfile, dt: f64) -> NavResult<ImuReading> {
        let heading_updated = self.heading.tick();
        let heading = if heading_updated {
            let mag = self.chip.read_mag(self.bus.as_mut())?;
            let acc = self.chip.read_accel(self.bus.as_mut())?;
            self.heading
                .update(mag, acc, profile, self.chip.mag_z_tilt_sign())
                .or_else(|| self.heading.current())
        } else {
            self.heading.current()
        };

        let gyro = self.chip.read_gyro(self.bus.as_mut())?;
        let acc = self.chip.read_accel(self.bus.as_mut())?;
        let attitude = self.attitude.update(gyro, acc, dt);

        Ok(ImuReading {
            heading,
            heading_updated,
            roll_deg: attitude.roll_deg + profile.roll_offset_deg,
            pitch_deg: attitude.pitch_deg,
            attitude,
        })
    }

    pub fn read_raw_mag(&mut self) -> NavResult<RawAxes> {
        self.chip.read_mag(self.bus.as_mut())
    }

    pub fn read_raw(&mut self) -> NavResult<RawImuSample> {
        Ok(RawImuSample {
            accel: self.chip.read_accel(self.bus.as_mut())?,
            gyro: self.chip.read_gyro(self.bus.as_mut())?,
            mag: self.chip.read_mag(self.bus.as_mut())?,
        })
    }
}
