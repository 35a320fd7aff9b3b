use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::config::{COMPLEMENTARY_GYRO_WEIGHT, GYRO_GAIN};
use crate::types::{Axis3, RawAxes};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct AttitudeState {
    /// Blended roll, degrees.
    pub roll_deg: f64,
    /// Blended pitch, degrees.
    pub pitch_deg: f64,
    /// Pure gyro integration, kept for drift comparison.
    pub gyro_roll_deg: f64,
    pub gyro_pitch_deg: f64,
}

/// Gyro/accelerometer complementary filter for roll and pitch.
pub struct ComplementaryFilter {
    roll: Option<f64>,
    pitch: Option<f64>,
    gyro_roll: f64,
    gyro_pitch: f64,

    // Filter gains
    gyro_gain: f64,   // deg/s per LSB
    gyro_weight: f64, // 0.97 = 97% trust gyro over one step
}

impl Default for ComplementaryFilter {
    fn default() -> Self {
        Self::new(GYRO_GAIN, COMPLEMENTARY_GYRO_WEIGHT)
    }
}

impl ComplementaryFilter {
    pub fn new(gyro_gain: f64, gyro_weight: f64) -> Self {
        Self {
            roll: None,
            pitch: None,
            gyro_roll: 0.0,
            gyro_pitch: 0.0,
            gyro_gain,
            gyro_weight,
        }
    }

    /// One step of `dt` seconds.
    pub fn update(&mut self, gyro: RawAxes, accel: RawAxes, dt: f64) -> AttitudeState {
        let rate = Axis3::from(gyro) * self.gyro_gain;
        self.gyro_roll += rate.x * dt;
        self.gyro_pitch += rate.y * dt;

        let (acc_roll, acc_pitch) = accel_angles(&Axis3::from(accel));
        let accel_weight = 1.0 - self.gyro_weight;

        // First sample seeds from the accelerometer so the output does not
        // ramp up from zero.
        let roll = match self.roll {
            Some(prev) => self.gyro_weight * (prev + rate.x * dt) + accel_weight * acc_roll,
            None => acc_roll,
        };
        let pitch = match self.pitch {
            Some(prev) => self.gyro_weight * (prev + rate.y * dt) + accel_weight * acc_pitch,
            None => acc_pitch,
        };
        self.roll = Some(roll);
        self.pitch = Some(pitch);

        self.state()
    }

    pub fn state(&self) -> AttitudeState {
        AttitudeState {
            roll_deg: self.roll.unwrap_or(0.0),
            pitch_deg: self.pitch.unwrap_or(0.0),
            gyro_roll_deg: self.gyro_roll,
            gyro_pitch_deg: self.gyro_pitch,
        }
    }

    pub fn reset(&mut self) {
        self.roll = None;
        self.pitch = None;
        self.gyro_roll = 0.0;
        self.gyro_pitch = 0.0;
    }
}

/// Roll and pitch in degrees from the gravity vector; 0/0 when level.
pub fn accel_angles(acc: &Axis3) -> (f64, f64) {
    let roll = (acc.y.atan2(acc.z) + PI).to_degrees() - 180.0;
    let pitch = (acc.z.atan2(acc.x) + PI).to_degrees();
    let pitch = if pitch > 90.0 { pitch - 270.0 } else { pitch + 90.0 };
    (roll, pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_level_is_zero() {
        let (roll, pitch) = accel_angles(&Axis3::new(0.0, 0.0, 1000.0));
        assert_abs_diff_eq!(roll, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pitch, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_heel_to_starboard() {
        // 10 degrees of roll: gravity leaks into +Y.
        let a = 10.0_f64.to_radians();
        let (roll, _) = accel_angles(&Axis3::new(0.0, 1000.0 * a.sin(), 1000.0 * a.cos()));
        assert_abs_diff_eq!(roll, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_first_sample_seeds_from_accel() {
        let mut filter = ComplementaryFilter::default();
        let a = 15.0_f64.to_radians();
        let accel = RawAxes::new(0, (1000.0 * a.sin()) as i16, (1000.0 * a.cos()) as i16);
        let state = filter.update(RawAxes::default(), accel, 0.26);
        assert!((state.roll_deg - 15.0).abs() < 0.1);
    }

    #[test]
    fn test_gyro_drift_is_suppressed() {
        let mut filter = ComplementaryFilter::default();
        let level = RawAxes::new(0, 0, 1000);
        // Constant 1 LSB bias on X: pure integration drifts without bound.
        let biased = RawAxes::new(1, 0, 0);
        let mut state = AttitudeState::default();
        for _ in 0..2000 {
            state = filter.update(biased, level, 0.26);
        }
        assert!(state.gyro_roll_deg > 30.0);
        assert!(state.roll_deg.abs() < 1.0);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = ComplementaryFilter::default();
        filter.update(RawAxes::new(100, 0, 0), RawAxes::new(0, 0, 1000), 0.26);
        filter.reset();
        assert_eq!(filter.state().gyro_roll_deg, 0.0);
        assert_eq!(filter.state().roll_deg, 0.0);
    }
}
