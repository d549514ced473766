//! Control enumeration and the per-sensor control table.

use super::register::{ControlInfo, ControlRegister};
use std::fmt;

/// Camera controls a sensor driver may expose.
///
/// Availability is chip dependent; query
/// [`ControlSet::is_supported`] before relying on a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Vertical blanking in lines.
    VBlank,
    /// Horizontal blanking in pixels.
    HBlank,
    /// Changes the Bayer order; rejected while streaming.
    VFlip,
    /// Changes the Bayer order; rejected while streaming.
    HFlip,
    /// Exposure time in lines.
    Exposure,
    /// Sensor analog gain.
    AnalogGain,
    /// Sensor digital gain.
    DigitalGain,
    /// On-chip automatic exposure.
    AutoExposure,
    /// On-chip automatic gain.
    AutoGain,
    /// On-chip automatic white balance.
    AutoWhiteBalance,
    /// Test pattern selector; zero is live video.
    TestPattern,
    /// Red level of the solid-colour test pattern.
    TestPatternRed,
    /// Green-on-red-row level of the solid-colour test pattern.
    TestPatternGreenR,
    /// Green-on-blue-row level of the solid-colour test pattern.
    TestPatternGreenB,
    /// Blue level of the solid-colour test pattern.
    TestPatternBlue,
}

impl Control {
    /// Number of controls.
    pub const COUNT: usize = 15;

    /// All controls, in the order they are applied to a sensor at start.
    pub const ALL: [Control; Self::COUNT] = [
        Control::VBlank,
        Control::HBlank,
        Control::VFlip,
        Control::HFlip,
        Control::Exposure,
        Control::AnalogGain,
        Control::DigitalGain,
        Control::AutoExposure,
        Control::AutoGain,
        Control::AutoWhiteBalance,
        Control::TestPattern,
        Control::TestPatternRed,
        Control::TestPatternGreenR,
        Control::TestPatternGreenB,
        Control::TestPatternBlue,
    ];

    #[inline]
    fn index(self) -> usize {
        self as usize
    }

    /// Returns true for controls that alter the Bayer order of the output.
    pub fn affects_format(self) -> bool {
        matches!(self, Control::VFlip | Control::HFlip)
    }

    /// Short lowercase name used in logs and configuration.
    pub fn name(self) -> &'static str {
        match self {
            Control::VBlank => "vblank",
            Control::HBlank => "hblank",
            Control::VFlip => "vflip",
            Control::HFlip => "hflip",
            Control::Exposure => "exposure",
            Control::AnalogGain => "analog_gain",
            Control::DigitalGain => "digital_gain",
            Control::AutoExposure => "auto_exposure",
            Control::AutoGain => "auto_gain",
            Control::AutoWhiteBalance => "auto_white_balance",
            Control::TestPattern => "test_pattern",
            Control::TestPatternRed => "test_pattern_red",
            Control::TestPatternGreenR => "test_pattern_green_r",
            Control::TestPatternGreenB => "test_pattern_green_b",
            Control::TestPatternBlue => "test_pattern_blue",
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One [`ControlRegister`] per [`Control`].
#[derive(Debug, Clone, Default)]
pub struct ControlSet {
    registers: [ControlRegister; Control::COUNT],
}

impl ControlSet {
    /// Creates a set with every control unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register backing `control`.
    #[inline]
    pub fn get(&self, control: Control) -> &ControlRegister {
        &self.registers[control.index()]
    }

    /// Mutable register backing `control`.
    #[inline]
    pub fn get_mut(&mut self, control: Control) -> &mut ControlRegister {
        &mut self.registers[control.index()]
    }

    /// Whether the chip implements `control`.
    pub fn is_supported(&self, control: Control) -> bool {
        self.get(control).is_supported()
    }

    /// Current value of `control`.
    pub fn value(&self, control: Control) -> i32 {
        self.get(control).value()
    }

    /// Range and default of `control`.
    pub fn info(&self, control: Control) -> ControlInfo {
        self.get(control).info()
    }

    /// Iterates over supported controls with their current values.
    pub fn supported(&self) -> impl Iterator<Item = (Control, i32)> + '_ {
        Control::ALL
            .iter()
            .copied()
            .filter(|&control| self.is_supported(control))
            .map(|control| (control, self.value(control)))
    }
}
