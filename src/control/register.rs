//! Clamped integer control setting.

use serde::{Deserialize, Serialize};

/// Immutable description of a control, used for introspection and UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlInfo {
    /// Is it supported by this camera?
    pub supported: bool,
    /// Minimum value.
    pub min: i32,
    /// Maximum value.
    pub max: i32,
    /// Value granularity (currently always 1).
    pub step: i32,
    /// Value applied after setup.
    pub default: i32,
}

impl Default for ControlInfo {
    fn default() -> Self {
        Self {
            supported: false,
            min: 0,
            max: 0,
            step: 1,
            default: 0,
        }
    }
}

/// A single camera control with a bounded current value.
///
/// A register starts out unsupported and rejects every write until
/// [`setup`](Self::setup) gives it a range. Once configured,
/// `min <= default <= max` and `min <= value <= max` always hold.
#[derive(Debug, Clone, Default)]
pub struct ControlRegister {
    info: ControlInfo,
    value: i32,
}

impl ControlRegister {
    /// Creates an unsupported control.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a supported control with the given range.
    pub fn with_range(min: i32, max: i32, step: i32, default: i32) -> Self {
        let mut register = Self::new();
        register.setup(min, max, step, default);
        register
    }

    /// Configures the range and resets the value to `default`.
    ///
    /// Callers must pass `min <= default <= max`; violating that is a
    /// programming error, not a runtime condition.
    pub fn setup(&mut self, min: i32, max: i32, step: i32, default: i32) {
        debug_assert!(min <= max, "control min {min} above max {max}");
        debug_assert!(
            min <= default && default <= max,
            "control default {default} outside [{min}, {max}]"
        );

        self.info = ControlInfo {
            supported: true,
            min,
            max,
            step,
            default,
        };
        self.value = default;
    }

    /// Returns the current value.
    #[inline]
    pub fn value(&self) -> i32 {
        self.value
    }

    /// Stores `value` if the control is supported and `value` is in range.
    ///
    /// Returns `false` and leaves the current value untouched otherwise.
    pub fn set_value(&mut self, value: i32) -> bool {
        if !self.info.supported {
            return false;
        }

        if self.info.min <= value && value <= self.info.max {
            self.value = value;
            return true;
        }

        false
    }

    /// Maps `percent` linearly onto `[min, max]` with integer truncation.
    ///
    /// Returns `None` for unsupported controls or `percent > 100`.
    pub fn percent_value(&self, percent: u32) -> Option<i32> {
        if !self.info.supported || percent > 100 {
            return None;
        }

        let span = i64::from(self.info.max) - i64::from(self.info.min);
        let offset = span * i64::from(percent) / 100;
        i32::try_from(i64::from(self.info.min) + offset).ok()
    }

    /// Sets the value from a percentage of the range.
    pub fn set_value_percent(&mut self, percent: u32) -> bool {
        match self.percent_value(percent) {
            Some(value) => self.set_value(value),
            None => false,
        }
    }

    /// Returns the control bounds.
    #[inline]
    pub fn info(&self) -> ControlInfo {
        self.info
    }

    /// Returns true if the control has been configured.
    #[inline]
    pub fn is_supported(&self) -> bool {
        self.info.supported
    }
}
