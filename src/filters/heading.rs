//! Tilt-compensated magnetic heading.

use crate::calibration::CalibrationProfile;
use crate::config::Tuning;
use crate::types::{low_pass, normalize_degrees, Axis3, RawAxes};

/// Shortest angle between two headings, 0..=180.
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Magnetic heading in degrees (not normalized) from hard-iron corrected
/// magnetometer and accelerometer vectors.
///
/// `z_sign` is the chip's orientation of the magnetometer Z axis relative
/// to the accelerometer. Returns `None` for a zero gravity vector.
pub fn tilt_compensated_heading(mag: &Axis3, acc: &Axis3, z_sign: f64) -> Option<f64> {
    let norm = acc.norm();
    if norm == 0.0 || !norm.is_finite() {
        return None;
    }
    let acc_x = acc.x / norm;
    let acc_y = acc.y / norm;

    let pitch = acc_x.asin();
    let roll = -(acc_y / pitch.cos()).clamp(-1.0, 1.0).asin();

    let mag_x = mag.x * pitch.cos() + mag.z * pitch.sin();
    let mag_y = mag.x * roll.sin() * pitch.sin()
        + mag.y * roll.cos()
        + z_sign * mag.z * roll.sin() * pitch.cos();

    Some(mag_y.atan2(mag_x).to_degrees())
}

/// Holds the last accepted heading until a new one moves past the deadband.
#[derive(Clone, Debug)]
pub struct HeadingDebouncer {
    deadband_deg: f64,
    current: Option<f64>,
}

impl HeadingDebouncer {
    pub fn new(deadband_deg: f64) -> Self {
        Self {
            deadband_deg,
            current: None,
        }
    }

    pub fn accept(&mut self, heading: f64) -> f64 {
        match self.current {
            Some(current) if angular_distance(heading, current) <= self.deadband_deg => current,
            _ => {
                self.current = Some(heading);
                heading
            }
        }
    }

    pub fn current(&self) -> Option<f64> {
        self.current
    }
}

/// Low-pass, hard-iron, tilt-compensate, correct, debounce.
///
/// Runs on a sub-sampled cadence: the first poll computes, then every
/// `subsample`-th poll after it.
pub struct HeadingPipeline {
    mag_lpf: Option<Axis3>,
    acc_lpf: Option<Axis3>,
    mag_factor: f64,
    acc_factor: f64,
    subsample: u32,
    polls: u64,
    debouncer: HeadingDebouncer,
}

impl HeadingPipeline {
    pub fn new(tuning: &Tuning) -> Self {
        Self {
            mag_lpf: None,
            acc_lpf: None,
            mag_factor: tuning.mag_lpf,
            acc_factor: tuning.acc_lpf,
            subsample: tuning.heading_subsample.max(1),
            polls: 0,
            debouncer: HeadingDebouncer::new(tuning.heading_deadband_deg),
        }
    }

    /// Count one poll; true when this poll should compute a heading.
    pub fn tick(&mut self) -> bool {
        let due = self.polls % u64::from(self.subsample) == 0;
        self.polls += 1;
        due
    }

    /// Last debounced heading, degrees in [0, 360).
    pub fn current(&self) -> Option<f64> {
        self.debouncer.current()
    }

    pub fn update(
        &mut self,
        mag: RawAxes,
        acc: RawAxes,
        profile: &CalibrationProfile,
        z_sign: f64,
    ) -> Option<f64> {
        let mag = filter(&mut self.mag_lpf, Axis3::from(mag), self.mag_factor);
        let acc = filter(&mut self.acc_lpf, Axis3::from(acc), self.acc_factor);

        let corrected = mag - profile.hard_iron_offset();
        let raw = tilt_compensated_heading(&corrected, &acc, z_sign)?;
        let heading = normalize_degrees(raw + profile.declination_deg() + profile.heading_offset_deg);
        Some(self.debouncer.accept(heading))
    }
}

fn filter(state: &mut Option<Axis3>, sample: Axis3, factor: f64) -> Axis3 {
    let next = match state {
        Some(prev) => low_pass(prev, &sample, factor),
        None => sample,
    };
    *state = Some(next);
    next
}
