//! Register transport between a driver and its sensor chip.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Register transport failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Nothing answered at the device address.
    #[error("no acknowledge from device at {address:#04x}")]
    NoAcknowledge {
        /// 7-bit device address.
        address: u8,
    },
    /// The device stopped responding mid-transfer.
    #[error("transfer to register {register:#06x} failed")]
    Transfer {
        /// Register being accessed.
        register: u16,
    },
}

/// Byte-wide register access with 16-bit register addresses.
///
/// Multi-byte values are big-endian on the wire, high byte at the lower
/// address.
pub trait SensorBus {
    /// Reads one register.
    fn read8(&mut self, register: u16) -> Result<u8, BusError>;

    /// Writes one register.
    fn write8(&mut self, register: u16, value: u8) -> Result<(), BusError>;

    /// Reads a big-endian register pair.
    fn read16(&mut self, register: u16) -> Result<u16, BusError> {
        let high = self.read8(register)?;
        let low = self.read8(register.wrapping_add(1))?;
        Ok(u16::from_be_bytes([high, low]))
    }

    /// Writes a big-endian register pair.
    fn write16(&mut self, register: u16, value: u16) -> Result<(), BusError> {
        let [high, low] = value.to_be_bytes();
        self.write8(register, high)?;
        self.write8(register.wrapping_add(1), low)
    }

    /// Waits at least `us` microseconds.
    fn delay_us(&mut self, _us: u32) {}
}

/// In-memory register file standing in for a sensor chip.
///
/// Unwritten registers read as zero. A disconnected file fails every
/// transfer, and individual registers can be made to fail.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    address: u8,
    registers: HashMap<u16, u8>,
    failing: HashSet<u16>,
    connected: bool,
    writes: usize,
}

impl RegisterFile {
    /// Empty register file answering at `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: HashMap::new(),
            failing: HashSet::new(),
            connected: true,
            writes: 0,
        }
    }

    /// A bus with nothing attached.
    pub fn disconnected(address: u8) -> Self {
        Self {
            connected: false,
            ..Self::new(address)
        }
    }

    /// Presets registers without counting them as driver writes.
    pub fn with(mut self, values: &[(u16, u8)]) -> Self {
        self.registers.extend(values.iter().copied());
        self
    }

    /// Current register value; unset registers read zero.
    pub fn get(&self, register: u16) -> u8 {
        self.registers.get(&register).copied().unwrap_or(0)
    }

    /// Current big-endian register pair.
    pub fn get16(&self, register: u16) -> u16 {
        u16::from_be_bytes([self.get(register), self.get(register.wrapping_add(1))])
    }

    /// Overwrites a register, as the chip itself would.
    pub fn set(&mut self, register: u16, value: u8) {
        self.registers.insert(register, value);
    }

    /// Makes every transfer touching `register` fail.
    pub fn fail_on(&mut self, register: u16) {
        self.failing.insert(register);
    }

    /// Number of register writes issued through the bus.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn check(&self, register: u16) -> Result<(), BusError> {
        if !self.connected {
            return Err(BusError::NoAcknowledge {
                address: self.address,
            });
        }
        if self.failing.contains(&register) {
            return Err(BusError::Transfer { register });
        }
        Ok(())
    }
}

impl SensorBus for RegisterFile {
    fn read8(&mut self, register: u16) -> Result<u8, BusError> {
        self.check(register)?;
        Ok(self.get(register))
    }

    fn write8(&mut self, register: u16, value: u8) -> Result<(), BusError> {
        self.check(register)?;
        self.writes += 1;
        self.set(register, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixteen_bit_access_is_big_endian() {
        let mut bus = RegisterFile::new(0x10);
        bus.write16(0x0160, 0x0dc6).unwrap();

        assert_eq!(bus.get(0x0160), 0x0d);
        assert_eq!(bus.get(0x0161), 0xc6);
        assert_eq!(bus.read16(0x0160).unwrap(), 0x0dc6);
        assert_eq!(bus.write_count(), 2);
    }

    #[test]
    fn test_disconnected_bus_fails() {
        let mut bus = RegisterFile::disconnected(0x36);
        assert_eq!(
            bus.read8(0x300a),
            Err(BusError::NoAcknowledge { address: 0x36 })
        );
    }

    #[test]
    fn test_failing_register() {
        let mut bus = RegisterFile::new(0x10);
        bus.fail_on(0x0100);
        assert!(bus.write8(0x0100, 1).is_err());
        assert!(bus.write8(0x0101, 1).is_ok());
    }
}
