//! Sony IMX219 (8MP camera module).

use super::bus::SensorBus;
use super::driver::{accept, flip_index, rederive_exposure, SensorDriver, SensorError, Size};
use crate::control::{Control, ControlSet};
use crate::format::{FormatCode, Rect};

const REG_MODE_SELECT: u16 = 0x0100;
const MODE_STANDBY: u8 = 0x00;
const MODE_STREAMING: u8 = 0x01;

const REG_CHIP_ID: u16 = 0x0000;
const CHIP_ID: u16 = 0x0219;

const REG_VTS: u16 = 0x0160;
const VTS_15FPS: u32 = 0x0dc6;
const VTS_30FPS: u32 = 0x06e3;
const VTS_MAX: i32 = 0xffff;
const VBLANK_MIN: i32 = 32;

const REG_HTS: u16 = 0x0162;
const PPL_MIN: i32 = 3448;
const PPL_MAX: i32 = 0x7ff0;

const REG_EXPOSURE: u16 = 0x015a;
const EXPOSURE_MIN: i32 = 4;
const EXPOSURE_DEFAULT: i32 = 0x640;

const REG_ANALOG_GAIN: u16 = 0x0157;
const ANALOG_GAIN_MAX: i32 = 232;

const REG_DIGITAL_GAIN: u16 = 0x0158;
const DIGITAL_GAIN_MIN: i32 = 0x0100;
const DIGITAL_GAIN_MAX: i32 = 0x0fff;

const REG_ORIENTATION: u16 = 0x0172;

const REG_TEST_PATTERN: u16 = 0x0600;
const TEST_PATTERN_PN9: i32 = 4;

const REG_TESTP_RED: u16 = 0x0602;
const REG_TESTP_GREENR: u16 = 0x0604;
const REG_TESTP_BLUE: u16 = 0x0606;
const REG_TESTP_GREENB: u16 = 0x0608;
const TESTP_COLOUR_MAX: i32 = 0x03ff;

const PIXEL_ARRAY_LEFT: u32 = 8;
const PIXEL_ARRAY_TOP: u32 = 8;

#[derive(Debug)]
struct Mode {
    width: u32,
    height: u32,
    crop: Rect,
    vts_default: u32,
    /// Internal pixel clock multiplier of the binning mode.
    rate_factor: u32,
}

static MODES: [Mode; 4] = [
    Mode {
        width: 3280,
        height: 2464,
        crop: Rect::new(PIXEL_ARRAY_LEFT, PIXEL_ARRAY_TOP, 3280, 2464),
        vts_default: VTS_15FPS,
        rate_factor: 1,
    },
    Mode {
        width: 1920,
        height: 1080,
        crop: Rect::new(688, 700, 1920, 1080),
        vts_default: VTS_30FPS,
        rate_factor: 1,
    },
    Mode {
        width: 1640,
        height: 1232,
        crop: Rect::new(PIXEL_ARRAY_LEFT, PIXEL_ARRAY_TOP, 3280, 2464),
        vts_default: VTS_30FPS,
        rate_factor: 1,
    },
    Mode {
        width: 640,
        height: 480,
        crop: Rect::new(1008, 760, 1280, 960),
        vts_default: VTS_30FPS,
        rate_factor: 2,
    },
];

/// Formats by flip index (none, h, v, both) for 8-bit, 10-bit and packed
/// 10-bit output.
const FORMATS: [[FormatCode; 4]; 3] = [
    [
        FormatCode::SRGGB8,
        FormatCode::SGRBG8,
        FormatCode::SGBRG8,
        FormatCode::SBGGR8,
    ],
    [
        FormatCode::SRGGB10,
        FormatCode::SGRBG10,
        FormatCode::SGBRG10,
        FormatCode::SBGGR10,
    ],
    [
        FormatCode::SRGGB10P,
        FormatCode::SGRBG10P,
        FormatCode::SGBRG10P,
        FormatCode::SBGGR10P,
    ],
];

/// IMX219 driver over a register bus.
#[derive(Debug)]
pub struct Imx219<B> {
    bus: B,
    mode: Option<&'static Mode>,
    depth: u8,
    physical: Option<FormatCode>,
    logical: Option<FormatCode>,
    controls: ControlSet,
}

impl<B: SensorBus> Imx219<B> {
    /// 7-bit bus address.
    pub const ADDRESS: u8 = 0x10;

    /// Model name reported to the application.
    pub const MODEL: &'static str = "imx219";

    /// Checks the chip identity without touching any other register.
    pub fn detect(bus: &mut B) -> Result<(), SensorError> {
        let found = bus.read16(REG_CHIP_ID)?;
        if found != CHIP_ID {
            return Err(SensorError::ChipMismatch {
                expected: CHIP_ID,
                found,
            });
        }
        Ok(())
    }

    /// Verifies the chip and puts it into standby.
    pub fn new(mut bus: B) -> Result<Self, SensorError> {
        Self::detect(&mut bus)?;

        // Standby cannot be entered directly after power-up.
        bus.write8(REG_MODE_SELECT, MODE_STREAMING)?;
        bus.delay_us(100);
        bus.write8(REG_MODE_SELECT, MODE_STANDBY)?;
        bus.delay_us(100);

        tracing::info!(model = Self::MODEL, "Sensor initialized");

        Ok(Self {
            bus,
            mode: None,
            depth: 0,
            physical: None,
            logical: None,
            controls: ControlSet::new(),
        })
    }

    /// The register bus, for inspection.
    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn setup_controls(&mut self, mode: &Mode) {
        let height = mode.height as i32;
        let width = mode.width as i32;
        let c = &mut self.controls;

        c.get_mut(Control::VBlank).setup(
            VBLANK_MIN,
            VTS_MAX - height,
            1,
            mode.vts_default as i32 - height,
        );

        let hblank = PPL_MIN - width;
        c.get_mut(Control::HBlank)
            .setup(hblank, PPL_MAX - width, 1, hblank);

        let exposure_max = mode.vts_default as i32 - 4;
        c.get_mut(Control::Exposure).setup(
            EXPOSURE_MIN,
            exposure_max,
            1,
            exposure_max.min(EXPOSURE_DEFAULT),
        );

        c.get_mut(Control::AnalogGain)
            .setup(0, ANALOG_GAIN_MAX, 1, 0);
        c.get_mut(Control::DigitalGain).setup(
            DIGITAL_GAIN_MIN,
            DIGITAL_GAIN_MAX,
            1,
            DIGITAL_GAIN_MIN,
        );

        c.get_mut(Control::VFlip).setup(0, 1, 1, 0);
        c.get_mut(Control::HFlip).setup(0, 1, 1, 0);

        c.get_mut(Control::TestPattern)
            .setup(0, TEST_PATTERN_PN9, 1, 0);
        c.get_mut(Control::TestPatternRed)
            .setup(0, TESTP_COLOUR_MAX, 1, TESTP_COLOUR_MAX);
        for control in [
            Control::TestPatternGreenR,
            Control::TestPatternGreenB,
            Control::TestPatternBlue,
        ] {
            c.get_mut(control).setup(0, TESTP_COLOUR_MAX, 1, 0);
        }
    }

    fn setup_format(&mut self, depth: u8) -> Result<(), SensorError> {
        let index = flip_index(&self.controls);
        let (physical, logical) = match depth {
            8 => (FORMATS[0][index], FORMATS[0][index]),
            10 => (FORMATS[2][index], FORMATS[1][index]),
            other => return Err(SensorError::UnsupportedDepth(other)),
        };

        self.depth = depth;
        self.physical = Some(physical);
        self.logical = Some(logical);
        Ok(())
    }

    /// Programs the chip register behind `control` with `value`.
    fn write_control(&mut self, mode: &Mode, control: Control, value: i32) -> Result<(), SensorError> {
        let word = |raw: i64| {
            u16::try_from(raw).map_err(|_| SensorError::ControlRejected { control, value })
        };

        match control {
            Control::VBlank => {
                let vts = (i64::from(mode.height) + i64::from(value)) / i64::from(mode.rate_factor);
                self.bus.write16(REG_VTS, word(vts)?)?;
            }
            Control::HBlank => {
                let hts = i64::from(mode.width) + i64::from(value);
                self.bus.write16(REG_HTS, word(hts)?)?;
            }
            Control::VFlip | Control::HFlip => {
                let orientation = (self.controls.value(Control::VFlip) << 1)
                    | self.controls.value(Control::HFlip);
                self.bus.write8(REG_ORIENTATION, orientation as u8)?;
                self.setup_format(self.depth)?;
            }
            Control::Exposure => {
                let lines = i64::from(value) / i64::from(mode.rate_factor);
                self.bus.write16(REG_EXPOSURE, word(lines)?)?;
            }
            Control::AnalogGain => {
                let gain = u8::try_from(value)
                    .map_err(|_| SensorError::ControlRejected { control, value })?;
                self.bus.write8(REG_ANALOG_GAIN, gain)?;
            }
            Control::DigitalGain => self.bus.write16(REG_DIGITAL_GAIN, word(value.into())?)?,
            Control::TestPattern => self.bus.write16(REG_TEST_PATTERN, word(value.into())?)?,
            Control::TestPatternRed => self.bus.write16(REG_TESTP_RED, word(value.into())?)?,
            Control::TestPatternGreenR => {
                self.bus.write16(REG_TESTP_GREENR, word(value.into())?)?
            }
            Control::TestPatternGreenB => {
                self.bus.write16(REG_TESTP_GREENB, word(value.into())?)?
            }
            Control::TestPatternBlue => self.bus.write16(REG_TESTP_BLUE, word(value.into())?)?,
            Control::AutoExposure | Control::AutoGain | Control::AutoWhiteBalance => {
                return Err(SensorError::ControlUnsupported(control));
            }
        }

        Ok(())
    }
}

impl<B: SensorBus> SensorDriver for Imx219<B> {
    fn model(&self) -> &'static str {
        Self::MODEL
    }

    /// Requires an exact match with one of the chip's modes.
    fn select_mode(&mut self, width: u32, height: u32, depth: u8) -> Result<Size, SensorError> {
        let mode = MODES
            .iter()
            .find(|mode| mode.width == width && mode.height == height)
            .ok_or(SensorError::UnsupportedMode { width, height })?;

        if depth != 8 && depth != 10 {
            return Err(SensorError::UnsupportedDepth(depth));
        }

        self.setup_controls(mode);
        self.setup_format(depth)?;
        self.mode = Some(mode);

        tracing::debug!(width, height, depth, "IMX219 mode selected");

        Ok(Size::new(mode.width, mode.height))
    }

    fn physical_format(&self) -> Option<FormatCode> {
        self.physical
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

        let current: Vec<_> = self.controls.supported().collect();
        for (control, value) in current {
            self.write_control(mode, control, value)?;
        }

        self.bus.write8(REG_MODE_SELECT, MODE_STREAMING)?;

        tracing::info!(
            width = mode.width,
            height = mode.height,
            format = %logical,
            "IMX219 streaming started"
        );
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SensorError> {
        self.bus.write8(REG_MODE_SELECT, MODE_STANDBY)?;
        tracing::debug!("IMX219 streaming stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::RegisterFile;

    fn sensor() -> Imx219<RegisterFile> {
        let bus = RegisterFile::new(Imx219::<RegisterFile>::ADDRESS)
            .with(&[(0x0000, 0x02), (0x0001, 0x19)]);
        Imx219::new(bus).unwrap()
    }

    #[test]
    fn test_detect_rejects_other_chip() {
        let mut bus = RegisterFile::new(0x10).with(&[(0x0000, 0x56), (0x0001, 0x47)]);
        assert_eq!(
            Imx219::detect(&mut bus),
            Err(SensorError::ChipMismatch {
                expected: 0x0219,
                found: 0x5647
            })
        );
    }

    #[test]
    fn test_new_leaves_chip_in_standby() {
        let sensor = sensor();
        assert_eq!(sensor.bus().get(REG_MODE_SELECT), MODE_STANDBY);
        assert!(sensor.logical_format().is_none());
    }

    #[test]
    fn test_exact_mode_required() {
        let mut sensor = sensor();
        assert_eq!(
            sensor.select_mode(800, 600, 10),
            Err(SensorError::UnsupportedMode {
                width: 800,
                height: 600
            })
        );
        assert_eq!(sensor.select_mode(640, 480, 10), Ok(Size::new(640, 480)));
    }

    #[test]
    fn test_depth_selects_formats() {
        let mut sensor = sensor();

        sensor.select_mode(1920, 1080, 8).unwrap();
        assert_eq!(sensor.physical_format(), Some(FormatCode::SRGGB8));
        assert_eq!(sensor.logical_format(), Some(FormatCode::SRGGB8));

        sensor.select_mode(1920, 1080, 10).unwrap();
        assert_eq!(sensor.physical_format(), Some(FormatCode::SRGGB10P));
        assert_eq!(sensor.logical_format(), Some(FormatCode::SRGGB10));

        assert_eq!(
            sensor.select_mode(1920, 1080, 12),
            Err(SensorError::UnsupportedDepth(12))
        );
        assert_eq!(sensor.logical_format(), Some(FormatCode::SRGGB10));
    }

    #[test]
    fn test_flips_rederive_format() {
        let mut sensor = sensor();
        sensor.select_mode(3280, 2464, 10).unwrap();

        sensor.set_control(Control::HFlip, 1).unwrap();
        assert_eq!(sensor.logical_format(), Some(FormatCode::SGRBG10));

        sensor.set_control(Control::VFlip, 1).unwrap();
        assert_eq!(sensor.logical_format(), Some(FormatCode::SBGGR10));
        assert_eq!(sensor.physical_format(), Some(FormatCode::SBGGR10P));
        assert_eq!(sensor.bus().get(REG_ORIENTATION), 0b11);
    }

    #[test]
    fn test_mode_control_defaults() {
        let mut sensor = sensor();
        sensor.select_mode(3280, 2464, 10).unwrap();

        let vblank = sensor.control_info(Control::VBlank);
        assert_eq!(vblank.min, 32);
        assert_eq!(vblank.max, 0xffff - 2464);
        assert_eq!(vblank.default, 0x0dc6 - 2464);

        let exposure = sensor.control_info(Control::Exposure);
        assert_eq!(exposure.max, 0x0dc6 - 4);
        assert_eq!(exposure.default, 0x640);

        assert_eq!(sensor.control_info(Control::HBlank).min, 3448 - 3280);
        assert!(!sensor.is_control_supported(Control::AutoGain));
    }

    #[test]
    fn test_vblank_rederives_exposure() {
        let mut sensor = sensor();
        sensor.select_mode(1920, 1080, 10).unwrap();

        sensor.set_control(Control::VBlank, 100).unwrap();
        let exposure = sensor.control_info(Control::Exposure);
        assert_eq!(exposure.max, 1080 + 100 - 4);
        assert_eq!(exposure.default, 1080 + 100 - 4);
        assert_eq!(sensor.bus().get16(REG_VTS), 1180);
    }

    #[test]
    fn test_rejected_vblank_keeps_exposure_range() {
        let mut sensor = sensor();
        sensor.select_mode(1920, 1080, 10).unwrap();
        let before = sensor.control_info(Control::Exposure);

        assert!(sensor.set_control(Control::VBlank, 1).is_err());
        assert_eq!(sensor.control_info(Control::Exposure), before);
    }

    #[test]
    fn test_binned_mode_halves_timing_registers() {
        let mut sensor = sensor();
        sensor.select_mode(640, 480, 8).unwrap();

        sensor.set_control(Control::Exposure, 1000).unwrap();
        assert_eq!(sensor.bus().get16(REG_EXPOSURE), 500);
    }

    #[test]
    fn test_percent_maps_into_range() {
        let mut sensor = sensor();
        sensor.select_mode(1640, 1232, 10).unwrap();

        sensor.set_control_percent(Control::AnalogGain, 50).unwrap();
        assert_eq!(sensor.control_value(Control::AnalogGain), 116);
        assert_eq!(sensor.bus().get(REG_ANALOG_GAIN), 116);

        assert!(matches!(
            sensor.set_control_percent(Control::AnalogGain, 101),
            Err(SensorError::ControlRejected { .. })
        ));
        assert_eq!(
            sensor.set_control_percent(Control::AutoWhiteBalance, 10),
            Err(SensorError::ControlUnsupported(Control::AutoWhiteBalance))
        );
    }

    #[test]
    fn test_control_needs_mode() {
        let mut sensor = sensor();
        assert_eq!(
            sensor.set_control(Control::Exposure, 100),
            Err(SensorError::NoMode)
        );
    }

    #[test]
    fn test_start_applies_controls_and_streams() {
        let mut sensor = sensor();
        sensor.select_mode(3280, 2464, 10).unwrap();
        sensor.set_control(Control::DigitalGain, 0x200).unwrap();
        sensor.bus.set(REG_DIGITAL_GAIN, 0);
        sensor.bus.set(REG_DIGITAL_GAIN + 1, 0);

        sensor.start().unwrap();
        assert_eq!(sensor.bus().get16(REG_DIGITAL_GAIN), 0x200);
        assert_eq!(sensor.bus().get16(REG_TESTP_RED), 0x3ff);
        assert_eq!(sensor.bus().get(REG_MODE_SELECT), MODE_STREAMING);

        sensor.stop().unwrap();
        assert_eq!(sensor.bus().get(REG_MODE_SELECT), MODE_STANDBY);
    }
}
