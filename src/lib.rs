//! Marine navigation sensor fusion.
//!
//! Collectors read a 9-DOF IMU over I2C, a serial GPS and an NMEA-0183 TCP
//! feed, and write into a shared [`blackboard::NavigationState`]. Each field
//! carries a timestamp and provenance; [`blackboard::policy`] decides which
//! writer wins when sources overlap.

pub mod blackboard;
pub mod calibration;
pub mod collectors;
pub mod config;
pub mod declination;
pub mod error;
pub mod filters;
pub mod imu;
pub mod live_status;
pub mod nmea;
pub mod persistence;
pub mod types;

pub use blackboard::{NavigationState, NavigationView};
pub use config::{RuntimeConfig, Tuning};
pub use error::{NavError, NavResult};
