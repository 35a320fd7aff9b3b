//! Register-level access to the IMU.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crate::error::{NavError, NavResult};
use crate::types::RawAxes;

/// Set on a register address to auto-increment through a block read.
pub const AUTO_INCREMENT: u8 = 0x80;

/// 8-bit device address plus register access.
pub trait RegisterBus: Send {
    fn read_register(&mut self, address: u8, register: u8) -> NavResult<u8>;

    fn read_block(&mut self, address: u8, register: u8, buf: &mut [u8]) -> NavResult<()>;

    fn write_register(&mut self, address: u8, register: u8, value: u8) -> NavResult<()>;

    /// Three little-endian i16 values starting at `register`.
    fn read_axes(&mut self, address: u8, register: u8) -> NavResult<RawAxes> {
        let mut block = [0u8; 6];
        self.read_block(address, AUTO_INCREMENT | register, &mut block)?;
        Ok(RawAxes::from_le_bytes(&block))
    }
}

#[cfg(target_os = "linux")]
pub use linux::LinuxI2cBus;

#[cfg(target_os = "linux")]
mod linux {
    use i2cdev::core::I2CDevice;
    use i2cdev::linux::LinuxI2CDevice;
    use std::path::Path;

    use super::RegisterBus;
    use crate::error::{NavError, NavResult};

    /// `/dev/i2c-N` through i2cdev, re-targeting the slave address as needed.
    pub struct LinuxI2cBus {
        device: LinuxI2CDevice,
        selected: u16,
    }

    impl LinuxI2cBus {
        pub fn open<P: AsRef<Path>>(path: P) -> NavResult<Self> {
            let path = path.as_ref();
            let device = LinuxI2CDevice::new(path, 0)
                .map_err(|e| NavError::Bus(format!("{}: {}", path.display(), e)))?;
            Ok(Self {
                device,
                selected: 0,
            })
        }

        fn select(&mut self, address: u8) -> NavResult<()> {
            let address = u16::from(address);
            if self.selected != address {
                self.device
                    .set_slave_address(address)
                    .map_err(|e| NavError::Bus(format!("select 0x{:02X}: {}", address, e)))?;
                self.selected = address;
            }
            Ok(())
        }
    }

    impl RegisterBus for LinuxI2cBus {
        fn read_register(&mut self, address: u8, register: u8) -> NavResult<u8> {
            self.select(address)?;
            self.device
                .smbus_read_byte_data(register)
                .map_err(|e| NavError::Bus(format!("read 0x{:02X}/0x{:02X}: {}", address, register, e)))
        }

        fn read_block(&mut self, address: u8, register: u8, buf: &mut [u8]) -> NavResult<()> {
            self.select(address)?;
            let data = self
                .device
                .smbus_read_i2c_block_data(register, buf.len() as u8)
                .map_err(|e| NavError::Bus(format!("block 0x{:02X}/0x{:02X}: {}", address, register, e)))?;
            if data.len() < buf.len() {
                return Err(NavError::Bus(format!(
                    "short block read from 0x{:02X}: {} of {} bytes",
                    address,
                    data.len(),
                    buf.len()
                )));
            }
            buf.copy_from_slice(&data[..buf.len()]);
            Ok(())
        }

        fn write_register(&mut self, address: u8, register: u8, value: u8) -> NavResult<()> {
            self.select(address)?;
            self.device
                .smbus_write_byte_data(register, value)
                .map_err(|e| NavError::Bus(format!("write 0x{:02X}/0x{:02X}: {}", address, register, e)))
        }
    }
}

#[derive(Debug, Default)]
struct ScriptedRegisters {
    registers: HashMap<(u8, u8), u8>,
    writes: Vec<(u8, u8, u8)>,
    failing: bool,
    latency: Duration,
}

/// In-memory register file for bench runs and tests.
///
/// Clones share the same registers, so a test can keep one handle and
/// change readings while the engine owns another.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBus {
    inner: Arc<Mutex<ScriptedRegisters>>,
}

impl ScriptedBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut ScriptedRegisters) -> R) -> R {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    pub fn set_register(&self, address: u8, register: u8, value: u8) {
        self.with(|r| {
            r.registers.insert((address, register), value);
        });
    }

    /// Store an axis triple as six little-endian bytes.
    pub fn set_axes(&self, address: u8, register: u8, axes: RawAxes) {
        let bytes = [axes.x.to_le_bytes(), axes.y.to_le_bytes(), axes.z.to_le_bytes()].concat();
        self.with(|r| {
            for (i, b) in bytes.into_iter().enumerate() {
                r.registers.insert((address, register.wrapping_add(i as u8)), b);
            }
        });
    }

    /// Make every subsequent transaction fail.
    pub fn set_failing(&self, failing: bool) {
        self.with(|r| r.failing = failing);
    }

    /// Stall every block read, like a slow bus transaction.
    pub fn set_latency(&self, latency: Duration) {
        self.with(|r| r.latency = latency);
    }

    pub fn writes(&self) -> Vec<(u8, u8, u8)> {
        self.with(|r| r.writes.clone())
    }
}

impl RegisterBus for ScriptedBus {
    fn read_register(&mut self, address: u8, register: u8) -> NavResult<u8> {
        self.with(|r| {
            if r.failing {
                return Err(NavError::Bus(format!("no ack from 0x{:02X}", address)));
            }
            r.registers
                .get(&(address, register))
                .copied()
                .ok_or_else(|| NavError::Bus(format!("no ack from 0x{:02X}", address)))
        })
    }

    fn read_block(&mut self, address: u8, register: u8, buf: &mut [u8]) -> NavResult<()> {
        let base = register & !AUTO_INCREMENT;
        let latency = self.with(|r| r.latency);
        if !latency.is_zero() {
            thread::sleep(latency);
        }
        self.with(|r| {
            if r.failing {
                return Err(NavError::Bus(format!("no ack from 0x{:02X}", address)));
            }
            for (i, slot) in buf.iter_mut().enumerate() {
                let reg = base.wrapping_add(i as u8);
                *slot = r.registers.get(&(address, reg)).copied().unwrap_or(0);
            }
            Ok(())
        })
    }

    fn write_register(&mut self, address: u8, register: u8, value: u8) -> NavResult<()> {
        self.with(|r| {
            if r.failing {
                return Err(NavError::Bus(format!("no ack from 0x{:02X}", address)));
            }
            r.writes.push((address, register, value));
            r.registers.insert((address, register), value);
            Ok(())
        })
    }
}
