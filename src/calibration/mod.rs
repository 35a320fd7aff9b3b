pub mod profile;
pub mod recorder;

pub use profile::{CalibrationProfile, ProfileCell};
pub use recorder::{apply_calibration, CalibrationOutcome, CalibrationRecorder, MagExtrema};
