pub mod linalg;

pub use linalg::*;

use serde::{Deserialize, Serialize};

/// One signed 16-bit register triple as read from the sensor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAxes {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl RawAxes {
    pub fn new(x: i16, y: i16, z: i16) -> Self {
        Self { x, y, z }
    }

    /// Decode three little-endian i16 values (X_L, X_H, Y_L, Y_H, Z_L, Z_H).
    pub fn from_le_bytes(block: &[u8; 6]) -> Self {
        Self {
            x: i16::from_le_bytes([block[0], block[1]]),
            y: i16::from_le_bytes([block[2], block[3]]),
            z: i16::from_le_bytes([block[4], block[5]]),
        }
    }

    pub fn as_array(&self) -> [i16; 3] {
        [self.x, self.y, self.z]
    }
}

/// Accelerometer, gyroscope and magnetometer triples from one poll.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawImuSample {
    pub accel: RawAxes,
    pub gyro: RawAxes,
    pub mag: RawAxes,
}

/// Decimal-degree position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

/// Wrap an angle into [0, 360).
///
/// `rem_euclid` rounds a tiny negative input up to exactly 360.0, so that
/// case folds back to north.
pub fn normalize_degrees(deg: f64) -> f64 {
    let d = deg.rem_euclid(360.0);
    if d >= 360.0 {
        0.0
    } else {
        d
    }
}
