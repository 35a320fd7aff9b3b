//! Producer loops that feed the blackboard.
//!
//! Each collector polls a shared [`RunFlag`] once per iteration and returns
//! when it clears; the orchestrator awaits every handle before releasing the
//! bus, serial port and sockets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod backoff;
pub mod health;
pub mod i2c;
pub mod network;
pub mod serial;

pub use backoff::ReconnectBackoff;
pub use health::{health_monitor_task, CollectorHealth, HealthMonitor, HealthReport, LinkState};
pub use i2c::I2cCollector;
pub use network::NetworkCollector;
pub use serial::{SerialCollector, SerialOpener};

/// Cooperative stop signal shared by all collectors.
#[derive(Clone, Debug)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        RunFlag(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for RunFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_flag_is_shared() {
        let flag = RunFlag::new();
        let clone = flag.clone();
        assert!(clone.is_running());
        flag.stop();
        assert!(!clone.is_running());
    }
}
