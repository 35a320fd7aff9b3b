pub mod bus;
pub mod chip;
pub mod engine;

#[cfg(target_os = "linux")]
pub use bus::LinuxI2cBus;
pub use bus::{RegisterBus, ScriptedBus};
pub use chip::{detect, Lsm9ds0, Lsm9ds1, SensorChip};
pub use engine::{ImuFusionEngine, ImuReading, SharedImu};
