//! LSM9DS0 / LSM9DS1 register maps, chosen once by probing WHO_AM_I.

use super::bus::RegisterBus;
use crate::error::{NavError, NavResult};
use crate::types::RawAxes;

/// Where each sensor's output block lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegisterMap {
    pub accel_address: u8,
    pub accel_out: u8,
    pub gyro_address: u8,
    pub gyro_out: u8,
    pub mag_address: u8,
    pub mag_out: u8,
}

/// A WHO_AM_I register and the value the chip answers with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityProbe {
    pub address: u8,
    pub register: u8,
    pub expected: u8,
}

/// (device address, register, value)
pub type RegisterWrite = (u8, u8, u8);

pub trait SensorChip: Send + Sync {
    fn name(&self) -> &'static str;

    fn registers(&self) -> &RegisterMap;

    fn identity(&self) -> &[IdentityProbe];

    fn init_sequence(&self) -> &[RegisterWrite];

    /// Sign of the Z term in tilt-compensated magnetometer Y; the two chips
    /// mount the magnetometer with opposite Z orientation.
    fn mag_z_tilt_sign(&self) -> f64;

    /// True when every identity register answers as expected.
    fn probe(&self, bus: &mut dyn RegisterBus) -> bool {
        self.identity().iter().all(|p| {
            bus.read_register(p.address, p.register)
                .map(|v| v == p.expected)
                .unwrap_or(false)
        })
    }

    fn enable(&self, bus: &mut dyn RegisterBus) -> NavResult<()> {
        for &(address, register, value) in self.init_sequence() {
            bus.write_register(address, register, value)?;
        }
        Ok(())
    }

    fn read_accel(&self, bus: &mut dyn RegisterBus) -> NavResult<RawAxes> {
        let map = self.registers();
        bus.read_axes(map.accel_address, map.accel_out)
    }

    fn read_gyro(&self, bus: &mut dyn RegisterBus) -> NavResult<RawAxes> {
        let map = self.registers();
        bus.read_axes(map.gyro_address, map.gyro_out)
    }

    fn read_mag(&self, bus: &mut dyn RegisterBus) -> NavResult<RawAxes> {
        let map = self.registers();
        bus.read_axes(map.mag_address, map.mag_out)
    }
}

// ─── LSM9DS0 ─────────────────────────────────────────────────────────────────

pub mod lsm9ds0 {
    pub const GYR_ADDRESS: u8 = 0x6A;
    pub const XM_ADDRESS: u8 = 0x1E;
    pub const WHO_AM_I: u8 = 0x0F;
    pub const WHO_AM_I_G_RESPONSE: u8 = 0xD4;
    pub const WHO_AM_I_XM_RESPONSE: u8 = 0x49;
    pub const OUT_X_L_G: u8 = 0x28;
    pub const OUT_X_L_A: u8 = 0x28;
    pub const OUT_X_L_M: u8 = 0x08;
    pub const CTRL_REG1_G: u8 = 0x20;
    pub const CTRL_REG4_G: u8 = 0x23;
    pub const CTRL_REG1_XM: u8 = 0x20;
    pub const CTRL_REG2_XM: u8 = 0x21;
    pub const CTRL_REG5_XM: u8 = 0x24;
    pub const CTRL_REG6_XM: u8 = 0x25;
    pub const CTRL_REG7_XM: u8 = 0x26;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Lsm9ds0;

impl Lsm9ds0 {
    const MAP: RegisterMap = RegisterMap {
        accel_address: lsm9ds0::XM_ADDRESS,
        accel_out: lsm9ds0::OUT_X_L_A,
        gyro_address: lsm9ds0::GYR_ADDRESS,
        gyro_out: lsm9ds0::OUT_X_L_G,
        mag_address: lsm9ds0::XM_ADDRESS,
        mag_out: lsm9ds0::OUT_X_L_M,
    };

    const IDENTITY: [IdentityProbe; 2] = [
        IdentityProbe {
            address: lsm9ds0::GYR_ADDRESS,
            register: lsm9ds0::WHO_AM_I,
            expected: lsm9ds0::WHO_AM_I_G_RESPONSE,
        },
        IdentityProbe {
            address: lsm9ds0::XM_ADDRESS,
            register: lsm9ds0::WHO_AM_I,
            expected: lsm9ds0::WHO_AM_I_XM_RESPONSE,
        },
    ];

    const INIT: [RegisterWrite; 7] = [
        (lsm9ds0::XM_ADDRESS, lsm9ds0::CTRL_REG1_XM, 0b0110_0111), // xyz, 100 Hz
        (lsm9ds0::XM_ADDRESS, lsm9ds0::CTRL_REG2_XM, 0b0010_0000), // ±16 g
        (lsm9ds0::XM_ADDRESS, lsm9ds0::CTRL_REG5_XM, 0b1111_0000), // temp on, mag 50 Hz
        (lsm9ds0::XM_ADDRESS, lsm9ds0::CTRL_REG6_XM, 0b0110_0000), // ±12 gauss
        (lsm9ds0::XM_ADDRESS, lsm9ds0::CTRL_REG7_XM, 0b0000_0000), // continuous
        (lsm9ds0::GYR_ADDRESS, lsm9ds0::CTRL_REG1_G, 0b0000_1111), // normal power, xyz
        (lsm9ds0::GYR_ADDRESS, lsm9ds0::CTRL_REG4_G, 0b0011_0000), // 2000 dps
    ];
}

impl SensorChip for Lsm9ds0 {
    fn name(&self) -> &'static str {
        "LSM9DS0"
    }

    fn registers(&self) -> &RegisterMap {
        &Self::MAP
    }

    fn identity(&self) -> &[IdentityProbe] {
        &Self::IDENTITY
    }

    fn init_sequence(&self) -> &[RegisterWrite] {
        &Self::INIT
    }

    fn mag_z_tilt_sign(&self) -> f64 {
        -1.0
    }
}

// ─── LSM9DS1 ─────────────────────────────────────────────────────────────────

pub mod lsm9ds1 {
    pub const XG_ADDRESS: u8 = 0x6A;
    pub const MAG_ADDRESS: u8 = 0x1C;
    pub const WHO_AM_I: u8 = 0x0F;
    pub const WHO_AM_I_XG_RESPONSE: u8 = 0x68;
    pub const WHO_AM_I_M_RESPONSE: u8 = 0x3D;
    pub const OUT_X_L_G: u8 = 0x18;
    pub const OUT_X_L_XL: u8 = 0x28;
    pub const OUT_X_L_M: u8 = 0x28;
    pub const CTRL_REG1_G: u8 = 0x10;
    pub const ORIENT_CFG_G: u8 = 0x13;
    pub const CTRL_REG4: u8 = 0x1E;
    pub const CTRL_REG5_XL: u8 = 0x1F;
    pub const CTRL_REG6_XL: u8 = 0x20;
    pub const CTRL_REG1_M: u8 = 0x20;
    pub const CTRL_REG2_M: u8 = 0x21;
    pub const CTRL_REG3_M: u8 = 0x22;
    pub const CTRL_REG4_M: u8 = 0x23;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Lsm9ds1;

impl Lsm9ds1 {
    const MAP: RegisterMap = RegisterMap {
        accel_address: lsm9ds1::XG_ADDRESS,
        accel_out: lsm9ds1::OUT_X_L_XL,
        gyro_address: lsm9ds1::XG_ADDRESS,
        gyro_out: lsm9ds1::OUT_X_L_G,
        mag_address: lsm9ds1::MAG_ADDRESS,
        mag_out: lsm9ds1::OUT_X_L_M,
    };

    const IDENTITY: [IdentityProbe; 2] = [
        IdentityProbe {
            address: lsm9ds1::XG_ADDRESS,
            register: lsm9ds1::WHO_AM_I,
            expected: lsm9ds1::WHO_AM_I_XG_RESPONSE,
        },
        IdentityProbe {
            address: lsm9ds1::MAG_ADDRESS,
            register: lsm9ds1::WHO_AM_I,
            expected: lsm9ds1::WHO_AM_I_M_RESPONSE,
        },
    ];

    const INIT: [RegisterWrite; 9] = [
        (lsm9ds1::XG_ADDRESS, lsm9ds1::CTRL_REG4, 0b0011_1000), // gyro xyz
        (lsm9ds1::XG_ADDRESS, lsm9ds1::CTRL_REG1_G, 0b1011_1000), // 476 Hz, 2000 dps
        (lsm9ds1::XG_ADDRESS, lsm9ds1::ORIENT_CFG_G, 0b1011_1000),
        (lsm9ds1::XG_ADDRESS, lsm9ds1::CTRL_REG5_XL, 0b0011_1000), // accel xyz
        (lsm9ds1::XG_ADDRESS, lsm9ds1::CTRL_REG6_XL, 0b0010_1000), // ±16 g
        (lsm9ds1::MAG_ADDRESS, lsm9ds1::CTRL_REG1_M, 0b1001_1100), // temp comp, 80 Hz
        (lsm9ds1::MAG_ADDRESS, lsm9ds1::CTRL_REG2_M, 0b0100_0000), // ±12 gauss
        (lsm9ds1::MAG_ADDRESS, lsm9ds1::CTRL_REG3_M, 0b0000_0000), // continuous
        (lsm9ds1::MAG_ADDRESS, lsm9ds1::CTRL_REG4_M, 0b0000_0000),
    ];
}

impl SensorChip for Lsm9ds1 {
    fn name(&self) -> &'static str {
        "LSM9DS1"
    }

    fn registers(&self) -> &RegisterMap {
        &Self::MAP
    }

    fn identity(&self) -> &[IdentityProbe] {
        &Self::IDENTITY
    }

    fn init_sequence(&self) -> &[RegisterWrite] {
        &Self::INIT
    }

    fn mag_z_tilt_sign(&self) -> f64 {
        1.0
    }
}

/// Probe for a supported chip and enable it.
pub fn detect(bus: &mut dyn RegisterBus) -> NavResult<Box<dyn SensorChip>> {
    let candidates: [Box<dyn SensorChip>; 2] = [Box::new(Lsm9ds0), Box::new(Lsm9ds1)];
    for chip in candidates {
        if chip.probe(bus) {
            log::info!("Found {} IMU", chip.name());
            chip.enable(bus)?;
            return Ok(chip);
        }
    }
    Err(NavError::NoSensor)
}

/// Answer the identity probe of `chip` on a scripted bus.
pub fn script_identity(bus: &super::bus::ScriptedBus, chip: &dyn SensorChip) {
    for p in chip.identity() {
        bus.set_register(p.address, p.register, p.expected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imu::bus::ScriptedBus;

    #[test]
    fn test_detect_lsm9ds1() {
        let handle = ScriptedBus::new();
        script_identity(&handle, &Lsm9ds1);
        let mut bus = handle.clone();
        let chip = detect(&mut bus).unwrap();
        assert_eq!(chip.name(), "LSM9DS1");
        assert_eq!(chip.mag_z_tilt_sign(), 1.0);
        assert_eq!(handle.writes().len(), 9);
        assert!(handle.writes().contains(&(0x1C, 0x20, 0b1001_1100)));
    }

    #[test]
    fn test_detect_lsm9ds0() {
        let handle = ScriptedBus::new();
        script_identity(&handle, &Lsm9ds0);
        let mut bus = handle.clone();
        let chip = detect(&mut bus).unwrap();
        assert_eq!(chip.name(), "LSM9DS0");
        assert_eq!(chip.mag_z_tilt_sign(), -1.0);
    }

    #[test]
    fn test_no_chip_fails() {
        let mut bus = ScriptedBus::new();
        assert!(matches!(detect(&mut bus), Err(NavError::NoSensor)));
    }

    #[test]
    fn test_half_answering_chip_rejected() {
        let handle = ScriptedBus::new();
        handle.set_register(0x6A, 0x0F, 0x68);
        handle.set_register(0x1C, 0x0F, 0x00);
        let mut bus = handle.clone();
        assert!(detect(&mut bus).is_err());
    }

    #[test]
    fn test_gyro_uses_gyro_block() {
        let handle = ScriptedBus::new();
        handle.set_axes(0x6A, 0x18, RawAxes::new(1, 2, 3));
        handle.set_axes(0x6A, 0x28, RawAxes::new(4, 5, 6));
        let mut bus = handle.clone();
        assert_eq!(Lsm9ds1.read_gyro(&mut bus).unwrap(), RawAxes::new(1, 2, 3));
        assert_eq!(Lsm9ds1.read_accel(&mut bus).unwrap(), RawAxes::new(4, 5, 6));
    }
}
