//! OmniVision OV5647 (5MP camera module).

use super::bus::SensorBus;
use super::driver::{accept, flip_index, rederive_exposure, SensorDriver, SensorError, Size};
use crate::control::{Control, ControlSet};
use crate::format::{FormatCode, Rect};

const MIPI_CTRL00_CLOCK_LANE_GATE: u8 = 1 << 5;
const MIPI_CTRL00_LINE_SYNC_ENABLE: u8 = 1 << 4;
const MIPI_CTRL00_BUS_IDLE: u8 = 1 << 2;
const MIPI_CTRL00_CLOCK_LANE_DISABLE: u8 = 1 << 0;

const REG_SW_STANDBY: u16 = 0x0100;
const REG_SW_RESET: u16 = 0x0103;
const REG_CHIP_ID_H: u16 = 0x300a;
const REG_CHIP_ID_L: u16 = 0x300b;
const REG_PAD_OUT: u16 = 0x300d;
const REG_EXP_HI: u16 = 0x3500;
const REG_EXP_MID: u16 = 0x3501;
const REG_EXP_LO: u16 = 0x3502;
const REG_AEC_AGC: u16 = 0x3503;
const REG_GAIN_HI: u16 = 0x350a;
const REG_GAIN_LO: u16 = 0x350b;
const REG_VTS: u16 = 0x380e;
const REG_VFLIP: u16 = 0x3820;
const REG_HFLIP: u16 = 0x3821;
const REG_FRAME_OFF_NUMBER: u16 = 0x4202;
const REG_MIPI_CTRL00: u16 = 0x4800;
const REG_MIPI_CTRL14: u16 = 0x4814;
const REG_AWB: u16 = 0x5001;

const CHIP_ID: u16 = 0x5647;

const PIXEL_ARRAY_LEFT: u32 = 16;
const PIXEL_ARRAY_TOP: u32 = 6;

const VBLANK_MIN: i32 = 24;
const VTS_MAX: i32 = 32767;

const EXPOSURE_MIN: i32 = 4;
const EXPOSURE_DEFAULT: i32 = 1000;

/// Analog gain is in 1/16 steps: 16 is 1.0x, 32 is 2.0x.
const ANALOG_GAIN_MIN: i32 = 16;
const ANALOG_GAIN_MAX: i32 = 1023;
const ANALOG_GAIN_DEFAULT: i32 = 32;

/// Power-up pad configuration.
const SENSOR_ENABLE: [(u16, u8); 3] = [(0x3000, 0x0f), (0x3001, 0xff), (0x3002, 0xe4)];

/// Delay after power-down is released before the chip answers.
const POWER_UP_DELAY_US: u32 = 20_000;

#[derive(Debug)]
struct Mode {
    width: u32,
    height: u32,
    crop: Rect,
    vts: u32,
}

static MODES: [Mode; 4] = [
    Mode {
        width: 2592,
        height: 1944,
        crop: Rect::new(PIXEL_ARRAY_LEFT, PIXEL_ARRAY_TOP, 2592, 1944),
        vts: 0x7b0,
    },
    Mode {
        width: 1920,
        height: 1080,
        crop: Rect::new(348 + PIXEL_ARRAY_LEFT, 434 + PIXEL_ARRAY_TOP, 1928, 1080),
        vts: 0x450,
    },
    Mode {
        width: 1296,
        height: 972,
        crop: Rect::new(PIXEL_ARRAY_LEFT, PIXEL_ARRAY_TOP, 2592, 1944),
        vts: 0x59b,
    },
    Mode {
        width: 640,
        height: 480,
        crop: Rect::new(16 + PIXEL_ARRAY_LEFT, PIXEL_ARRAY_TOP, 2560, 1920),
        vts: 0x1f8,
    },
];

/// Logical formats by flip index (none, h, v, both).
const LOGICAL_FORMATS: [FormatCode; 4] = [
    FormatCode::SGBRG10,
    FormatCode::SBGGR10,
    FormatCode::SRGGB10,
    FormatCode::SGRBG10,
];

/// OV5647 driver over a register bus.
///
/// Only 10-bit output is supported. Mode selection picks the closest
/// mode and reports the size actually chosen.
#[derive(Debug)]
pub struct Ov5647<B> {
    bus: B,
    mode: Option<&'static Mode>,
    logical: Option<FormatCode>,
    controls: ControlSet,
}

impl<B: SensorBus> Ov5647<B> {
    /// 7-bit bus address.
    pub const ADDRESS: u8 = 0x36;

    /// Model name reported to the application.
    pub const MODEL: &'static str = "ov5647";

    /// Reads the chip identity registers.
    pub fn detect(bus: &mut B) -> Result<(), SensorError> {
        let found = u16::from_be_bytes([bus.read8(REG_CHIP_ID_H)?, bus.read8(REG_CHIP_ID_L)?]);
        if found != CHIP_ID {
            return Err(SensorError::ChipMismatch {
                expected: CHIP_ID,
                found,
            });
        }
        Ok(())
    }

    /// Powers the pads up, verifies the chip and leaves it idle.
    pub fn new(mut bus: B) -> Result<Self, SensorError> {
        bus.delay_us(POWER_UP_DELAY_US);

        for (register, value) in SENSOR_ENABLE {
            bus.write8(register, value)?;
        }
        Self::idle_outputs(&mut bus)?;

        bus.write8(REG_SW_RESET, 0x01)?;
        Self::detect(&mut bus)?;
        bus.write8(REG_SW_RESET, 0x00)?;

        tracing::info!(model = Self::MODEL, "Sensor initialized");

        Ok(Self {
            bus,
            mode: None,
            logical: None,
            controls: ControlSet::new(),
        })
    }

    /// The register bus, for inspection.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Gates the MIPI clock lane and parks the output pads.
    fn idle_outputs(bus: &mut B) -> Result<(), SensorError> {
        bus.write8(
            REG_MIPI_CTRL00,
            MIPI_CTRL00_CLOCK_LANE_GATE | MIPI_CTRL00_BUS_IDLE | MIPI_CTRL00_CLOCK_LANE_DISABLE,
        )?;
        bus.write8(REG_FRAME_OFF_NUMBER, 0x0f)?;
        bus.write8(REG_PAD_OUT, 0x01)?;
        Ok(())
    }

    fn setup_controls(&mut self, mode: &Mode) {
        let height = mode.height as i32;
        let c = &mut self.controls;

        for control in [
            Control::AutoGain,
            Control::AutoWhiteBalance,
            Control::AutoExposure,
        ] {
            c.get_mut(control).setup(0, 1, 1, 0);
        }

        let exposure_max = mode.vts as i32 - 4;
        c.get_mut(Control::Exposure).setup(
            EXPOSURE_MIN,
            exposure_max,
            1,
            exposure_max.min(EXPOSURE_DEFAULT),
        );

        c.get_mut(Control::AnalogGain).setup(
            ANALOG_GAIN_MIN,
            ANALOG_GAIN_MAX,
            1,
            ANALOG_GAIN_DEFAULT,
        );

        c.get_mut(Control::VBlank)
            .setup(VBLANK_MIN, VTS_MAX - height, 1, mode.vts as i32 - height);

        c.get_mut(Control::VFlip).setup(0, 1, 1, 0);
        c.get_mut(Control::HFlip).setup(0, 1, 1, 0);
    }

    fn setup_format(&mut self) {
        self.logical = Some(LOGICAL_FORMATS[flip_index(&self.controls)]);
    }

    fn update8(&mut self, register: u16, f: impl FnOnce(u8) -> u8) -> Result<(), SensorError> {
        let value = self.bus.read8(register)?;
        self.bus.write8(register, f(value))?;
        Ok(())
    }

    fn write_control(&mut self, mode: &Mode, control: Control, value: i32) -> Result<(), SensorError> {
        let on = value != 0;

        match control {
            Control::AutoWhiteBalance => self.bus.write8(REG_AWB, u8::from(on))?,
            // AGC runs while bit 1 is clear.
            Control::AutoGain => {
                self.update8(REG_AEC_AGC, |r| if on { r & !0x02 } else { r | 0x02 })?
            }
            // AEC runs while bit 0 is clear.
            Control::AutoExposure => {
                self.update8(REG_AEC_AGC, |r| if on { r & !0x01 } else { r | 0x01 })?
            }
            Control::AnalogGain => {
                self.bus.write8(REG_GAIN_HI, ((value >> 8) & 0x03) as u8)?;
                self.bus.write8(REG_GAIN_LO, (value & 0xff) as u8)?;
            }
            // 20-bit register; the low 4 bits are fractional lines and stay zero.
            Control::Exposure => {
                self.bus.write8(REG_EXP_HI, ((value >> 12) & 0x0f) as u8)?;
                self.bus.write8(REG_EXP_MID, ((value >> 4) & 0xff) as u8)?;
                self.bus.write8(REG_EXP_LO, ((value & 0x0f) << 4) as u8)?;
            }
            Control::VBlank => {
                let vts = u16::try_from(i64::from(mode.height) + i64::from(value))
                    .map_err(|_| SensorError::ControlRejected { control, value })?;
                self.bus.write16(REG_VTS, vts)?;
            }
            // The sensor has a built-in horizontal mirror; bit 1 undoes it.
            Control::HFlip => {
                self.update8(REG_HFLIP, |r| if on { r & !0x02 } else { r | 0x02 })?;
                self.setup_format();
            }
            Control::VFlip => {
                self.update8(REG_VFLIP, |r| if on { r | 0x02 } else { r & !0x02 })?;
                self.setup_format();
            }
            _ => return Err(SensorError::ControlUnsupported(control)),
        }

        Ok(())
    }
}

impl<B: SensorBus> SensorDriver for Ov5647<B> {
    fn model(&self) -> &'static str {
        Self::MODEL
    }

    /// Picks the mode with the smallest `|dw| + |dh|`.
    fn select_mode(&mut self, width: u32, height: u32, depth: u8) -> Result<Size, SensorError> {
        let mode = MODES
            .iter()
            .min_by_key(|mode| mode.width.abs_diff(width) + mode.height.abs_diff(height))
            .ok_or(SensorError::UnsupportedMode { width, height })?;

        if depth != 10 {
            return Err(SensorError::UnsupportedDepth(depth));
        }

        self.setup_controls(mode);
        self.setup_format();
        self.mode = Some(mode);

        tracing::debug!(
            requested_width = width,
            requested_height = height,
            width = mode.width,
            height = mode.height,
            "OV5647 mode selected"
        );

        Ok(Size::new(mode.width, mode.height))
    }

    fn physical_format(&self) -> Option<FormatCode> {
        self.logical.map(|format| format.packed())
    }

    fn logical_format(&self) -> Option<FormatCode> {
        self.logical
    }

    fn crop(&self) -> Option<Rect> {
        self.mode.map(|mode| mode.crop)
    }

    fn controls(&self) -> &ControlSet {
        &self.controls
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<(), SensorError> {
        let mode = self.mode.ok_or(SensorError::NoMode)?;

        if control == Control::VBlank {
            let info = self.controls.info(Control::VBlank);
            if !(info.min..=info.max).contains(&value) {
                return Err(SensorError::ControlRejected { control, value });
            }
            rederive_exposure(&mut self.controls, mode.height, value, EXPOSURE_DEFAULT);
        }

        accept(&mut self.controls, control, value)?;
        self.write_control(mode, control, value)
    }

    fn start(&mut self) -> Result<(), SensorError> {
        let mode = self.mode.ok_or(SensorError::NoMode)?;
        let logical = self.logical.ok_or(SensorError::NoMode)?;

        // Virtual channel 0.
        self.update8(REG_MIPI_CTRL14, |r| r & !(0x03 << 6))?;

        let standby = self.bus.read8(REG_SW_STANDBY)?;
        if standby & 0x01 == 0 {
            self.bus.write8(REG_SW_STANDBY, 0x01)?;
        }

        let current: Vec<_> = self.controls.supported().collect();
        for (control, value) in current {
            self.write_control(mode, control, value)?;
        }

        self.bus.write8(
            REG_MIPI_CTRL00,
            MIPI_CTRL00_BUS_IDLE | MIPI_CTRL00_CLOCK_LANE_GATE | MIPI_CTRL00_LINE_SYNC_ENABLE,
        )?;
        self.bus.write8(REG_FRAME_OFF_NUMBER, 0x00)?;
        self.bus.write8(REG_PAD_OUT, 0x00)?;

        tracing::info!(
            width = mode.width,
            height = mode.height,
            format = %logical,
            "OV5647 streaming started"
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        Self::idle_outputs(&mut self.bus)?;
        tracing::debug!("OV5647 streaming stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::RegisterFile;

    fn sensor() -> Ov5647<RegisterFile> {
        let bus = RegisterFile::new(Ov5647::<RegisterFile>::ADDRESS)
            .with(&[(REG_CHIP_ID_H, 0x56), (REG_CHIP_ID_L, 0x47)]);
        Ov5647::new(bus).unwrap()
    }

    #[test]
    fn test_detect_and_idle() {
        let sensor = sensor();
        assert_eq!(sensor.bus().get(0x3002), 0xe4);
        assert_eq!(sensor.bus().get(REG_PAD_OUT), 0x01);
        assert_eq!(sensor.bus().get(REG_FRAME_OFF_NUMBER), 0x0f);
    }

    #[test]
    fn test_wrong_chip_rejected() {
        let bus = RegisterFile::new(0x36).with(&[(REG_CHIP_ID_H, 0x56), (REG_CHIP_ID_L, 0x40)]);
        assert!(matches!(
            Ov5647::new(bus),
            Err(SensorError::ChipMismatch { found: 0x5640, .. })
        ));
    }

    #[test]
    fn test_best_fit_mode() {
        let mut sensor = sensor();
        assert_eq!(sensor.select_mode(1280, 960, 10), Ok(Size::new(1296, 972)));
        assert_eq!(sensor.select_mode(4000, 3000, 10), Ok(Size::new(2592, 1944)));
        assert_eq!(sensor.select_mode(1, 1, 10), Ok(Size::new(640, 480)));
        assert_eq!(
            sensor.crop(),
            Some(Rect::new(32, 6, 2560, 1920))
        );
    }

    #[test]
    fn test_only_ten_bit() {
        let mut sensor = sensor();
        assert_eq!(
            sensor.select_mode(640, 480, 8),
            Err(SensorError::UnsupportedDepth(8))
        );
        assert!(sensor.logical_format().is_none());
    }

    #[test]
    fn test_formats_follow_flips() {
        let mut sensor = sensor();
        sensor.select_mode(1920, 1080, 10).unwrap();
        assert_eq!(sensor.logical_format(), Some(FormatCode::SGBRG10));
        assert_eq!(sensor.physical_format(), Some(FormatCode::SGBRG10P));

        sensor.set_control(Control::HFlip, 1).unwrap();
        assert_eq!(sensor.logical_format(), Some(FormatCode::SBGGR10));

        sensor.set_control(Control::VFlip, 1).unwrap();
        assert_eq!(sensor.logical_format(), Some(FormatCode::SGRBG10));
        assert_eq!(sensor.bus().get(REG_VFLIP) & 0x02, 0x02);
        assert_eq!(sensor.bus().get(REG_HFLIP) & 0x02, 0x00);
    }

    #[test]
    fn test_exposure_register_split() {
        let mut sensor = sensor();
        sensor.select_mode(2592, 1944, 10).unwrap();

        sensor.set_control(Control::Exposure, 0x123).unwrap();
        assert_eq!(sensor.bus().get(REG_EXP_HI), 0x0);
        assert_eq!(sensor.bus().get(REG_EXP_MID), 0x12);
        assert_eq!(sensor.bus().get(REG_EXP_LO), 0x30);
    }

    #[test]
    fn test_auto_controls_share_register() {
        let mut sensor = sensor();
        sensor.select_mode(640, 480, 10).unwrap();

        sensor.set_control(Control::AutoGain, 0).unwrap();
        sensor.set_control(Control::AutoExposure, 0).unwrap();
        assert_eq!(sensor.bus().get(REG_AEC_AGC), 0x03);

        sensor.set_control(Control::AutoGain, 1).unwrap();
        assert_eq!(sensor.bus().get(REG_AEC_AGC), 0x01);

        sensor.set_control(Control::AutoWhiteBalance, 1).unwrap();
        assert_eq!(sensor.bus().get(REG_AWB), 1);
    }

    #[test]
    fn test_vblank_rederives_exposure_and_vts() {
        let mut sensor = sensor();
        sensor.select_mode(640, 480, 10).unwrap();
        assert_eq!(sensor.control_info(Control::Exposure).max, 0x1f8 - 4);

        sensor.set_control(Control::VBlank, 1000).unwrap();
        let exposure = sensor.control_info(Control::Exposure);
        assert_eq!(exposure.max, 480 + 1000 - 4);
        assert_eq!(exposure.default, 1000);
        assert_eq!(sensor.bus().get16(REG_VTS), 1480);
    }

    #[test]
    fn test_test_pattern_unsupported() {
        let mut sensor = sensor();
        sensor.select_mode(640, 480, 10).unwrap();
        assert_eq!(
            sensor.set_control(Control::TestPattern, 1),
            Err(SensorError::ControlUnsupported(Control::TestPattern))
        );
    }

    #[test]
    fn test_start_and_stop_toggle_outputs() {
        let mut sensor = sensor();
        sensor.select_mode(1296, 972, 10).unwrap();
        sensor.bus.set(REG_MIPI_CTRL14, 0xff);

        sensor.start().unwrap();
        assert_eq!(sensor.bus().get(REG_MIPI_CTRL14), 0x3f);
        assert_eq!(sensor.bus().get(REG_SW_STANDBY), 0x01);
        assert_eq!(sensor.bus().get(REG_PAD_OUT), 0x00);
        assert_eq!(sensor.bus().get16(REG_GAIN_HI), 32);

        sensor.stop().unwrap();
        assert_eq!(sensor.bus().get(REG_PAD_OUT), 0x01);
    }
}
