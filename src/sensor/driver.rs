//! Capability interface the capture engine consumes from a sensor chip.

use super::bus::BusError;
use crate::control::{Control, ControlInfo, ControlSet};
use crate::format::{FormatCode, Rect};
use thiserror::Error;

/// Errors reported by sensor drivers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SensorError {
    /// No sensor mode matches the request.
    #[error("resolution not supported ({width}x{height})")]
    UnsupportedMode {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// The chip cannot deliver this depth.
    #[error("depth not supported ({0})")]
    UnsupportedDepth(u8),
    /// Value outside the control's range.
    #[error("control {control} rejected value {value}")]
    ControlRejected {
        /// Control being set.
        control: Control,
        /// Rejected value.
        value: i32,
    },
    /// The chip has no such control.
    #[error("control {0} not supported by this sensor")]
    ControlUnsupported(Control),
    /// The chip-id registers name a different chip.
    #[error("chip identity mismatch (expected {expected:#06x}, found {found:#06x})")]
    ChipMismatch {
        /// Id the driver supports.
        expected: u16,
        /// Id read from the chip.
        found: u16,
    },
    /// Streaming was requested before a mode was set.
    #[error("no sensor mode selected")]
    NoMode,
    /// Register access failed.
    #[error("sensor bus: {0}")]
    Bus(#[from] BusError),
}

/// Frame size negotiated with the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Builds a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Operations a sensor chip driver provides to the capture engine.
///
/// The physical format is what travels over the wire and may be packed;
/// the logical format is what lands in memory after the receiver unpacks
/// it, and is what the application sees.
pub trait SensorDriver {
    /// Human-readable chip name.
    fn model(&self) -> &'static str;

    /// Selects the mode closest to (or exactly matching, depending on the
    /// chip) the requested size and depth.
    fn select_mode(&mut self, width: u32, height: u32, depth: u8) -> Result<Size, SensorError>;

    /// Format on the wire; `None` until a mode is selected.
    fn physical_format(&self) -> Option<FormatCode>;

    /// Format in memory; `None` until a mode is selected.
    fn logical_format(&self) -> Option<FormatCode>;

    /// Analog crop of the selected mode.
    fn crop(&self) -> Option<Rect>;

    /// The chip's control table.
    fn controls(&self) -> &ControlSet;

    /// Validates and programs a control.
    fn set_control(&mut self, control: Control, value: i32) -> Result<(), SensorError>;

    /// Leaves standby and starts streaming, re-applying every control.
    fn start(&mut self) -> Result<(), SensorError>;

    /// Returns the chip to standby.
    fn stop(&mut self) -> Result<(), SensorError>;

    /// Whether the chip implements `control`.
    fn is_control_supported(&self, control: Control) -> bool {
        self.controls().is_supported(control)
    }

    /// Current value of `control`.
    fn control_value(&self, control: Control) -> i32 {
        self.controls().value(control)
    }

    /// Range and default of `control`.
    fn control_info(&self, control: Control) -> ControlInfo {
        self.controls().info(control)
    }

    /// Sets a control to `percent` of its range (0..=100).
    fn set_control_percent(&mut self, control: Control, percent: u32) -> Result<(), SensorError> {
        if !self.is_control_supported(control) {
            return Err(SensorError::ControlUnsupported(control));
        }
        let value = self
            .controls()
            .get(control)
            .percent_value(percent)
            .ok_or(SensorError::ControlRejected {
                control,
                value: i32::try_from(percent).unwrap_or(i32::MAX),
            })?;
        self.set_control(control, value)
    }
}

/// Stores `value` in the control table, or explains why it cannot.
pub(super) fn accept(controls: &mut ControlSet, control: Control, value: i32) -> Result<(), SensorError> {
    if !controls.is_supported(control) {
        return Err(SensorError::ControlUnsupported(control));
    }
    if !controls.get_mut(control).set_value(value) {
        return Err(SensorError::ControlRejected { control, value });
    }
    Ok(())
}

/// Orientation index into a four-entry format table:
/// none, h-flip, v-flip, both.
pub(super) fn flip_index(controls: &ControlSet) -> usize {
    let vflip = controls.value(Control::VFlip) != 0;
    let hflip = controls.value(Control::HFlip) != 0;
    (usize::from(vflip) << 1) | usize::from(hflip)
}

/// Recomputes the exposure range after a vblank change.
pub(super) fn rederive_exposure(controls: &mut ControlSet, height: u32, vblank: i32, default: i32) {
    let info = controls.info(Control::Exposure);
    let max = height as i32 + vblank - 4;
    controls
        .get_mut(Control::Exposure)
        .setup(info.min, max, info.step, max.min(default));
}
