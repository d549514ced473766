//! Sensor chip drivers.
//!
//! The capture engine talks to a sensor only through [`SensorDriver`]. Two
//! chips are supported: the 5MP [`Ov5647`] and the 8MP [`Imx219`]. Each
//! driver reaches its chip through a [`SensorBus`]; [`RegisterFile`] is an
//! in-memory bus for tests and the simulated pipeline.

mod bus;
mod driver;
mod imx219;
mod ov5647;

pub use bus::{BusError, RegisterFile, SensorBus};
pub use driver::{SensorDriver, SensorError, Size};
pub use imx219::Imx219;
pub use ov5647::Ov5647;

use crate::control::{Control, ControlSet};
use crate::format::{FormatCode, Rect};

/// Whichever supported chip was found.
#[derive(Debug)]
pub enum Sensor<B> {
    /// OmniVision OV5647.
    Ov5647(Ov5647<B>),
    /// Sony IMX219.
    Imx219(Imx219<B>),
}

impl<B: SensorBus> Sensor<B> {
    /// Probes for the 5MP chip, then the 8MP chip.
    ///
    /// `open` returns a bus for the given 7-bit device address.
    pub fn probe(mut open: impl FnMut(u8) -> B) -> Result<Self, SensorError> {
        let mut bus = open(Ov5647::<B>::ADDRESS);
        match Ov5647::detect(&mut bus) {
            Ok(()) => return Ov5647::new(bus).map(Sensor::Ov5647),
            Err(e) => tracing::debug!(error = %e, "No OV5647"),
        }

        let mut bus = open(Imx219::<B>::ADDRESS);
        match Imx219::detect(&mut bus) {
            Ok(()) => Imx219::new(bus).map(Sensor::Imx219),
            Err(e) => {
                tracing::warn!(error = %e, "No camera found");
                Err(e)
            }
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $sensor:ident => $body:expr) => {
        match $self {
            Sensor::Ov5647($sensor) => $body,
            Sensor::Imx219($sensor) => $body,
        }
    };
}

impl<B: SensorBus> SensorDriver for Sensor<B> {
    fn model(&self) -> &'static str {
        dispatch!(self, s => s.model())
    }

    fn select_mode(&mut self, width: u32, height: u32, depth: u8) -> Result<Size, SensorError> {
        dispatch!(self, s => s.select_mode(width, height, depth))
    }

    fn physical_format(&self) -> Option<FormatCode> {
        dispatch!(self, s => s.physical_format())
    }

    fn logical_format(&self) -> Option<FormatCode> {
        dispatch!(self, s => s.logical_format())
    }

    fn crop(&self) -> Option<Rect> {
        dispatch!(self, s => s.crop())
    }

    fn controls(&self) -> &ControlSet {
        dispatch!(self, s => s.controls())
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<(), SensorError> {
        dispatch!(self, s => s.set_control(control, value))
    }

    fn start(&mut self) -> Result<(), SensorError> {
        dispatch!(self, s => s.start())
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        dispatch!(self, s => s.stop())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imx219_bus(address: u8) -> RegisterFile {
        if address == Imx219::<RegisterFile>::ADDRESS {
            RegisterFile::new(address).with(&[(0x0000, 0x02), (0x0001, 0x19)])
        } else {
            RegisterFile::disconnected(address)
        }
    }

    #[test]
    fn test_probe_prefers_ov5647() {
        let sensor = Sensor::probe(|address| {
            RegisterFile::new(address).with(&[(0x300a, 0x56), (0x300b, 0x47)])
        })
        .unwrap();
        assert_eq!(sensor.model(), "ov5647");
    }

    #[test]
    fn test_probe_falls_back_to_imx219() {
        let sensor = Sensor::probe(imx219_bus).unwrap();
        assert_eq!(sensor.model(), "imx219");
    }

    #[test]
    fn test_probe_nothing_attached() {
        let err = Sensor::probe(RegisterFile::disconnected).unwrap_err();
        assert!(matches!(err, SensorError::Bus(BusError::NoAcknowledge { address: 0x10 })));
    }

    #[test]
    fn test_dispatch_reaches_driver() {
        let mut sensor = Sensor::probe(imx219_bus).unwrap();
        sensor.select_mode(640, 480, 8).unwrap();
        assert_eq!(sensor.logical_format(), Some(FormatCode::SRGGB8));
        assert!(sensor.is_control_supported(Control::TestPattern));
    }
}
