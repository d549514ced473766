//! Capture configuration.
//!
//! Controls are expressed as percentages of each control's range so the
//! same file works with either sensor.

use crate::context::CameraContext;
use crate::control::Control;
use crate::ring::Consumer;
use crate::sensor::SensorDriver;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::engine::CaptureError;
use super::hardware::ReceiverHardware;

/// Mode, buffer pool and control settings for a capture session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Bits per sample, 8 or 10.
    pub depth: u8,
    /// Ring slots; clamped to the supported range at allocation.
    pub buffer_count: usize,
    /// Flip the image vertically.
    pub vflip: bool,
    /// Mirror the image horizontally.
    pub hflip: bool,
    /// Exposure as a percentage of the current exposure range.
    pub exposure_percent: u32,
    /// Analog gain as a percentage of its range.
    pub analog_gain_percent: u32,
    /// Left at the sensor default when unset.
    pub digital_gain_percent: Option<u32>,
    /// Let the sensor control exposure, where supported.
    pub auto_exposure: bool,
    /// Let the sensor control gain, where supported.
    pub auto_gain: bool,
    /// Only some chips have on-sensor white balance.
    pub auto_white_balance: Option<bool>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            depth: 10,
            buffer_count: 4,
            vflip: false,
            hflip: false,
            exposure_percent: 50,
            analog_gain_percent: 0,
            digital_gain_percent: None,
            auto_exposure: false,
            auto_gain: false,
            auto_white_balance: None,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.depth != 8 && self.depth != 10 {
            return Err(ConfigError::InvalidDepth(self.depth));
        }
        let percents = [
            ("exposure_percent", Some(self.exposure_percent)),
            ("analog_gain_percent", Some(self.analog_gain_percent)),
            ("digital_gain_percent", self.digital_gain_percent),
        ];
        for (field, value) in percents {
            if let Some(value) = value.filter(|v| *v > 100) {
                return Err(ConfigError::InvalidPercent { field, value });
            }
        }
        Ok(())
    }

    /// Sets up `context` for capture: format, then buffers, then controls.
    ///
    /// Controls the attached chip lacks are skipped. Returns the consumer
    /// end of the freshly allocated ring.
    pub fn apply<H, S>(&self, context: &mut CameraContext<H, S>) -> Result<Consumer, CaptureError>
    where
        H: ReceiverHardware,
        S: SensorDriver,
    {
        let info = context.set_format(self.width, self.height, self.depth)?;
        if info.width != self.width || info.height != self.height {
            tracing::info!(
                requested_width = self.width,
                requested_height = self.height,
                width = info.width,
                height = info.height,
                "Sensor picked the nearest mode"
            );
        }

        let consumer = context.allocate_buffers(self.buffer_count)?;

        let flags = [
            (Control::VFlip, Some(self.vflip)),
            (Control::HFlip, Some(self.hflip)),
            (Control::AutoExposure, Some(self.auto_exposure)),
            (Control::AutoGain, Some(self.auto_gain)),
            (Control::AutoWhiteBalance, self.auto_white_balance),
        ];
        for (control, value) in flags {
            if let Some(value) = value {
                apply_control(context, control, |c| c.set_control(control, i32::from(value)))?;
            }
        }

        let percents = [
            (Control::Exposure, Some(self.exposure_percent)),
            (Control::AnalogGain, Some(self.analog_gain_percent)),
            (Control::DigitalGain, self.digital_gain_percent),
        ];
        for (control, percent) in percents {
            if let Some(percent) = percent {
                apply_control(context, control, |c| c.set_control_percent(control, percent))?;
            }
        }

        Ok(consumer)
    }
}

fn apply_control<H, S, F>(
    context: &mut CameraContext<H, S>,
    control: Control,
    set: F,
) -> Result<(), CaptureError>
where
    H: ReceiverHardware,
    S: SensorDriver,
    F: FnOnce(&mut CameraContext<H, S>) -> Result<(), CaptureError>,
{
    if !context.is_control_supported(control) {
        tracing::debug!(%control, model = context.model(), "Control not supported, skipping");
        return Ok(());
    }
    set(context)
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Depth other than 8 or 10.
    #[error("invalid sample depth {0} (must be 8 or 10)")]
    InvalidDepth(u8),
    /// A percentage above 100.
    #[error("{field} must be 0-100, got {value}")]
    InvalidPercent {
        /// Name of the offending setting.
        field: &'static str,
        /// Value found.
        value: u32,
    },
    /// White balance enabled with no samples.
    #[error("white balance needs at least one sample per round")]
    InvalidWhiteBalance,
    /// Config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// Config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Format, buffers and sensor controls.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Software white balance on the consumer side.
    #[serde(default)]
    pub white_balance: WhiteBalanceConfig,
    /// How long to run and where to export metrics.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Software white balance applied to captured frames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhiteBalanceConfig {
    /// Run white balance on every consumed frame.
    pub enabled: bool,
    /// Pixels sampled per round.
    pub samples: u32,
    /// Number of sampling rounds.
    pub rounds: u32,
}

impl Default for WhiteBalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            samples: crate::buffer::DEFAULT_SAMPLE_PIXELS,
            rounds: crate::buffer::DEFAULT_SAMPLE_ROUNDS,
        }
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Run continuously (true) or process fixed number of frames (false).
    pub continuous: bool,
    /// Number of frames to process if not continuous.
    pub frame_count: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 100,
            metrics_port: 9090,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.capture.validate()?;
        if config.white_balance.enabled
            && (config.white_balance.samples == 0 || config.white_balance.rounds == 0)
        {
            return Err(ConfigError::InvalidWhiteBalance);
        }
        Ok(config)
    }
}
