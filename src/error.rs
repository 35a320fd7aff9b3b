use thiserror::Error;

/// Navigation layer error types
#[derive(Error, Debug)]
pub enum NavError {
    #[error("I2C bus error: {0}")]
    Bus(String),

    #[error("No supported IMU answered the identity probe")]
    NoSensor,

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Settings encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Calibration failed: {0}")]
    Calibration(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for the navigation layer
pub type NavResult<T> = Result<T, NavError>;
