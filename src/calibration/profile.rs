use crossbeam::atomic::AtomicCell;
use serde::{Deserialize, Serialize};

use crate::types::{Axis3, RawAxes};

/// Magnetometer hard-iron extrema plus heading, roll and depth corrections.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationProfile {
    pub mag_min: [i16; 3],
    pub mag_max: [i16; 3],
    /// Radians, east positive.
    pub declination_rad: f64,
    pub heading_offset_deg: f64,
    pub roll_offset_deg: f64,
    /// Added to depth-below-transducer readings.
    pub depth_offset_m: f64,
}

impl Default for CalibrationProfile {
    fn default() -> Self {
        // Bench values for a BerryIMU mounted in the cabin.
        Self {
            mag_min: [-681, -1414, -2719],
            mag_max: [1707, 717, -618],
            declination_rad: 0.11,
            heading_offset_deg: 0.0,
            roll_offset_deg: 0.0,
            depth_offset_m: 0.0,
        }
    }
}

impl CalibrationProfile {
    /// Midpoint of min and max per axis.
    pub fn hard_iron_offset(&self) -> Axis3 {
        Axis3::new(
            midpoint(self.mag_min[0], self.mag_max[0]),
            midpoint(self.mag_min[1], self.mag_max[1]),
            midpoint(self.mag_min[2], self.mag_max[2]),
        )
    }

    /// min <= max on every axis.
    pub fn is_consistent(&self) -> bool {
        self.mag_min
            .iter()
            .zip(self.mag_max.iter())
            .all(|(lo, hi)| lo <= hi)
    }

    pub fn declination_deg(&self) -> f64 {
        self.declination_rad.to_degrees()
    }

    pub fn with_extrema(mut self, min: RawAxes, max: RawAxes) -> Self {
        self.mag_min = min.as_array();
        self.mag_max = max.as_array();
        self
    }
}

fn midpoint(lo: i16, hi: i16) -> f64 {
    (lo as f64 + hi as f64) / 2.0
}

/// Profile shared between the I2C collector and its writers.
///
/// Readers copy the whole profile once per fusion step; writers replace it
/// whole, so a step never mixes two profiles.
#[derive(Debug)]
pub struct ProfileCell {
    inner: AtomicCell<CalibrationProfile>,
}

impl ProfileCell {
    pub fn new(profile: CalibrationProfile) -> Self {
        Self {
            inner: AtomicCell::new(profile),
        }
    }

    pub fn load(&self) -> CalibrationProfile {
        self.inner.load()
    }

    pub fn store(&self, profile: CalibrationProfile) {
        self.inner.store(profile);
    }
}

impl Default for ProfileCell {
    fn default() -> Self {
        Self::new(CalibrationProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_consistent() {
        let profile = CalibrationProfile::default();
        assert!(profile.is_consistent());
        let offset = profile.hard_iron_offset();
        assert!((offset.x - 513.0).abs() < 1e-9);
        assert!((offset.y + 348.5).abs() < 1e-9);
        assert!((offset.z + 1668.5).abs() < 1e-9);
    }

    #[test]
    fn test_inverted_axis_detected() {
        let profile = CalibrationProfile::default()
            .with_extrema(RawAxes::new(10, 0, 0), RawAxes::new(5, 1, 1));
        assert!(!profile.is_consistent());
    }

    #[test]
    fn test_cell_replaces_whole_profile() {
        let cell = ProfileCell::default();
        let mut next = cell.load();
        next.roll_offset_deg = 1.5;
        next.declination_rad = 0.05;
        cell.store(next);
        assert_eq!(cell.load(), next);
    }

    #[test]
    fn test_missing_json_keys_use_defaults() {
        let profile: CalibrationProfile =
            serde_json::from_str(r#"{"roll_offset_deg": -2.0}"#).unwrap();
        assert_eq!(profile.roll_offset_deg, -2.0);
        assert_eq!(profile.mag_max, [1707, 717, -618]);
    }
}
