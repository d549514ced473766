//! Interrupt-driven capture state machine.
//!
//! The engine owns the receiver, the sensor driver and the producer end of
//! the buffer ring. Task-context calls (`set_format`, `allocate_buffers`,
//! `start`, `stop`, controls) and the interrupt entry point
//! [`CaptureEngine::handle_interrupt`] both take `&mut self`; on a target
//! the caller masks the receiver interrupt around task-context calls, so
//! the two never overlap.
//!
//! Each interrupt is handled in two phases:
//!
//! ```text
//! frame end (FEI or PI0)  -> stamp + publish the attached buffer, sequence += 1
//! frame start (FSI)       -> attach a free buffer and point DMA at it,
//!                            or point DMA at the scratch area and drop the frame
//! ```

use super::hardware::{DmaWindow, HardwareError, ReceiverHardware};
use super::regs;
use crate::control::{Control, ControlInfo};
use crate::format::{FormatInfo, FrameLayout};
use crate::ring::{BufferRing, Consumer, FreeBuffer, Producer, ReadyHandler, RingError};
use crate::sensor::{SensorDriver, SensorError};
use thiserror::Error;

/// Size of the scratch area that absorbs frames nobody has a buffer for.
pub const SCRATCH_SIZE: usize = 4096;

/// Receiver clock rate requested at bring-up.
pub const RECEIVER_CLOCK_HZ: u32 = 100_000_000;

/// Errors from task-context engine operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The engine is streaming.
    #[error("operation not allowed while streaming")]
    Busy,
    /// `set_format` has not succeeded yet.
    #[error("no format has been set")]
    NoFormat,
    /// The buffer ring has not been allocated.
    #[error("no buffers allocated")]
    NoBuffers,
    /// The buffer ring must be freed first.
    #[error("buffers are already allocated")]
    BuffersAllocated,
    /// Receiver power or clock failure.
    #[error("receiver hardware: {0}")]
    Hardware(#[from] HardwareError),
    /// The sensor driver failed.
    #[error("sensor: {0}")]
    Sensor(#[from] SensorError),
    /// Buffer allocation failed.
    #[error("buffer ring: {0}")]
    Ring(#[from] RingError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Disabled,
    Streaming,
}

/// Where DMA was pointed at frame start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTarget {
    /// A ring buffer is attached and receives the frame.
    Buffer,
    /// The ring was exhausted; the frame goes to scratch and is dropped.
    Scratch,
}

/// What one interrupt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InterruptReport {
    /// Raw receiver status as read.
    pub status: u32,
    /// Raw image status as read.
    pub image_status: u32,
    /// Nothing was done: not streaming or no receiver condition pending.
    pub ignored: bool,
    /// Sequence number of the frame published at this boundary.
    pub published: Option<u32>,
    /// A frame boundary passed with no buffer attached.
    pub dropped: bool,
    /// DMA target programmed at frame start.
    pub frame_start: Option<DmaTarget>,
}

/// Running counters kept by the interrupt path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureStats {
    /// Frames handed to the consumer.
    pub frames_published: u64,
    /// Frame boundaries passed with no buffer attached.
    pub frames_dropped: u64,
    /// Interrupts taken while streaming with no receiver condition.
    pub spurious_interrupts: u64,
    /// Sequence number the next frame boundary will carry.
    pub next_sequence: u32,
}

/// CSI-2 capture engine.
pub struct CaptureEngine<H: ReceiverHardware, S: SensorDriver> {
    hardware: H,
    sensor: S,
    state: State,
    powered: bool,
    layout: Option<FrameLayout>,
    producer: Option<Producer>,
    attached: Option<FreeBuffer>,
    sequence: u32,
    scratch: Box<[u8]>,
    stats: CaptureStats,
}

impl<H: ReceiverHardware, S: SensorDriver> CaptureEngine<H, S> {
    /// Wraps the receiver and sensor. Nothing is powered until
    /// [`initialize`](Self::initialize).
    pub fn new(hardware: H, sensor: S) -> Self {
        Self {
            hardware,
            sensor,
            state: State::Disabled,
            powered: false,
            layout: None,
            producer: None,
            attached: None,
            sequence: 0,
            scratch: vec![0; SCRATCH_SIZE].into_boxed_slice(),
            stats: CaptureStats::default(),
        }
    }

    /// Powers up the receiver domain.
    pub fn initialize(&mut self) -> Result<(), CaptureError> {
        self.hardware.set_power(true).map_err(|e| {
            tracing::error!(error = %e, "Cannot enable receiver power");
            e
        })?;
        self.powered = true;
        Ok(())
    }

    /// Negotiates a mode with the sensor and derives the buffer layout.
    pub fn set_format(&mut self, width: u32, height: u32, depth: u8) -> Result<FormatInfo, CaptureError> {
        if self.is_streaming() {
            return Err(CaptureError::Busy);
        }
        if self.producer.is_some() {
            return Err(CaptureError::BuffersAllocated);
        }

        let size = self.sensor.select_mode(width, height, depth)?;
        let format = self.sensor.logical_format().ok_or(CaptureError::NoFormat)?;
        let layout = FrameLayout::negotiate(size.width, size.height, format);
        self.layout = Some(layout);

        tracing::debug!(
            width = layout.width,
            height = layout.height,
            bytes_per_line = layout.bytes_per_line,
            image_size = layout.image_size(),
            format = %format,
            "Format set"
        );

        self.format_info().ok_or(CaptureError::NoFormat)
    }

    /// Current logical format, once a format has been set.
    pub fn format_info(&self) -> Option<FormatInfo> {
        let layout = self.layout?;
        Some(FormatInfo::new(&layout, self.sensor.crop().unwrap_or_default()))
    }

    /// In-memory layout of the current format.
    pub fn layout(&self) -> Option<&FrameLayout> {
        self.layout.as_ref()
    }

    /// Allocates the buffer pool and hands back the consumer end.
    ///
    /// `count` is clamped to the ring limits.
    pub fn allocate_buffers(&mut self, count: usize) -> Result<Consumer, CaptureError> {
        if self.is_streaming() {
            return Err(CaptureError::Busy);
        }
        if self.producer.is_some() {
            return Err(CaptureError::BuffersAllocated);
        }
        let layout = self.layout.ok_or(CaptureError::NoFormat)?;

        let (producer, consumer) = BufferRing::allocate(count, &layout).map_err(|e| {
            tracing::error!(error = %e, "Buffer allocation failed");
            e
        })?;
        self.producer = Some(producer);
        Ok(consumer)
    }

    /// Drops the producer end of the pool.
    ///
    /// The memory is released once the consumer end is dropped as well.
    pub fn free_buffers(&mut self) -> Result<(), CaptureError> {
        if self.is_streaming() {
            return Err(CaptureError::Busy);
        }
        self.producer = None;
        Ok(())
    }

    /// Registers the callback run for every published frame.
    pub fn set_ready_handler(&mut self, handler: Option<ReadyHandler>) -> Result<(), CaptureError> {
        let producer = self.producer.as_mut().ok_or(CaptureError::NoBuffers)?;
        producer.set_ready_handler(handler);
        Ok(())
    }

    /// Brings up the receiver and starts the sensor.
    ///
    /// Any failure leaves the engine disabled with the receiver torn down.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.is_streaming() {
            return Err(CaptureError::Busy);
        }
        let layout = self.layout.ok_or(CaptureError::NoFormat)?;
        if self.producer.is_none() {
            return Err(CaptureError::NoBuffers);
        }
        let depth = self
            .sensor
            .physical_format()
            .ok_or(CaptureError::NoFormat)?
            .depth();

        self.sequence = 0;
        self.stats.next_sequence = 0;

        if let Err(e) = self.enable_receiver(&layout, depth) {
            tracing::warn!(error = %e, "Cannot enable CSI receiver");
            return Err(e.into());
        }

        if let Err(e) = self.sensor.start() {
            tracing::warn!(error = %e, "Cannot start sensor");
            self.disable_receiver();
            return Err(e.into());
        }

        self.state = State::Streaming;
        tracing::info!(
            model = self.sensor.model(),
            width = layout.width,
            height = layout.height,
            format = %layout.format,
            "Streaming started"
        );
        Ok(())
    }

    /// Stops the sensor and quiesces the receiver.
    ///
    /// The receiver is always torn down, even if the sensor fails to enter
    /// standby; that failure is returned afterwards.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.is_streaming() {
            return Ok(());
        }

        let sensor_result = self.sensor.stop();
        if let Err(e) = &sensor_result {
            tracing::warn!(error = %e, "Cannot stop sensor streaming");
        }

        self.disable_receiver();
        self.state = State::Disabled;

        tracing::info!(
            published = self.stats.frames_published,
            dropped = self.stats.frames_dropped,
            "Streaming stopped"
        );

        sensor_result.map_err(CaptureError::from)
    }

    /// True between a successful `start` and `stop`.
    pub fn is_streaming(&self) -> bool {
        self.state == State::Streaming
    }

    /// Receiver interrupt entry point.
    ///
    /// Never blocks and never fails.
    pub fn handle_interrupt(&mut self) -> InterruptReport {
        self.hardware.bus_enter();

        // Write the values back to clear the latched bits.
        let status = self.hardware.read(regs::STA);
        self.hardware.write(regs::STA, status);
        let image_status = self.hardware.read(regs::ISTA);
        self.hardware.write(regs::ISTA, image_status);

        let mut report = InterruptReport {
            status,
            image_status,
            ..InterruptReport::default()
        };

        if !self.is_streaming() || status & (regs::STA_IS | regs::STA_PI0) == 0 {
            if self.is_streaming() {
                self.stats.spurious_interrupts += 1;
            }
            report.ignored = true;
            self.hardware.bus_exit();
            return report;
        }

        if image_status & regs::ISTA_FEI != 0 || status & regs::STA_PI0 != 0 {
            self.frame_end(&mut report);
        }

        if image_status & regs::ISTA_FSI != 0 {
            self.frame_start(&mut report);
        }

        self.hardware.bus_exit();
        report
    }

    fn frame_end(&mut self, report: &mut InterruptReport) {
        let sequence = self.sequence;

        match (self.attached.take(), self.producer.as_mut(), self.layout.as_ref()) {
            (Some(mut buffer), Some(producer), Some(layout)) => {
                let size = layout.image_size().min(buffer.len());
                self.hardware
                    .complete_dma(layout, &mut buffer.as_bytes_mut()[..size]);
                buffer.stamp(sequence, layout);
                match producer.publish(buffer) {
                    Ok(_) => {
                        self.stats.frames_published += 1;
                        report.published = Some(sequence);
                        tracing::trace!(sequence, "Frame published");
                    }
                    Err(buffer) => {
                        self.attached = Some(buffer);
                        self.stats.frames_dropped += 1;
                        report.dropped = true;
                    }
                }
            }
            (attached, _, _) => {
                self.attached = attached;
                self.stats.frames_dropped += 1;
                report.dropped = true;
                tracing::trace!(sequence, "Frame dropped");
            }
        }

        self.sequence = self.sequence.wrapping_add(1);
        self.stats.next_sequence = self.sequence;
    }

    fn frame_start(&mut self, report: &mut InterruptReport) {
        if self.attached.is_none() {
            self.attached = self.producer.as_mut().and_then(Producer::try_acquire_free);
        }

        let layout = self.layout;
        match (self.attached.as_mut(), layout) {
            (Some(buffer), Some(layout)) => {
                buffer.set_timestamp(self.hardware.clock_ticks());
                let window = DmaWindow::frame(buffer.dma_address(), &layout);
                self.hardware.clean_and_invalidate(window.start, buffer.len());
                self.hardware.program_dma(window);
                report.frame_start = Some(DmaTarget::Buffer);
            }
            _ => {
                self.hardware
                    .program_dma(DmaWindow::scratch(self.scratch.as_ptr() as usize));
                report.frame_start = Some(DmaTarget::Scratch);
            }
        }
    }

    fn enable_receiver(&mut self, layout: &FrameLayout, depth: u8) -> Result<(), HardwareError> {
        debug_assert!(depth == 8 || depth == 10);

        self.hardware.start_clock(RECEIVER_CLOCK_HZ)?;

        let hw = &mut self.hardware;
        hw.gate_lane_clocks(regs::LANE_CLOCKS_2);

        hw.bus_enter();

        hw.write(regs::CTRL, regs::CTRL_MEM);

        // Analogue control on, held in reset.
        let mut value = regs::ANA_AR;
        regs::set_field(&mut value, 7, regs::ANA_CTATADJ_MASK);
        regs::set_field(&mut value, 7, regs::ANA_PTATADJ_MASK);
        hw.write(regs::ANA, value);
        hw.delay_us(1000);
        hw.write_field(regs::ANA, 0, regs::ANA_AR);

        // Peripheral reset.
        hw.write_field(regs::CTRL, 1, regs::CTRL_CPR);
        hw.write_field(regs::CTRL, 0, regs::CTRL_CPR);
        hw.write_field(regs::CTRL, 0, regs::CTRL_CPE);

        // CSI-2 D-PHY, packet framer timeout.
        let mut value = hw.read(regs::CTRL);
        regs::set_field(&mut value, regs::CTRL_CPM_CSI2, regs::CTRL_CPM_MASK);
        regs::set_field(&mut value, regs::CTRL_DCM_STROBE, regs::CTRL_DCM_MASK);
        regs::set_field(&mut value, 0xf, regs::CTRL_PFT_MASK);
        regs::set_field(&mut value, 128, regs::CTRL_OET_MASK);
        hw.write(regs::CTRL, value);

        hw.write(regs::IHWIN, 0);
        hw.write(regs::IVWIN, 0);

        // AXI bus QoS.
        let mut value = hw.read(regs::PRI);
        regs::set_field(&mut value, 0, regs::PRI_BL_MASK);
        regs::set_field(&mut value, 0, regs::PRI_BS_MASK);
        regs::set_field(&mut value, 0xe, regs::PRI_PP_MASK);
        regs::set_field(&mut value, 8, regs::PRI_NP_MASK);
        regs::set_field(&mut value, 2, regs::PRI_PT_MASK);
        regs::set_field(&mut value, 1, regs::PRI_PE);
        hw.write(regs::PRI, value);

        hw.write_field(regs::ANA, 0, regs::ANA_DDL);

        let line_interval = (layout.height >> 2).max(128);
        let mut value = regs::ICTL_FSIE | regs::ICTL_FEIE | regs::ICTL_IBOB;
        regs::set_field(&mut value, line_interval, regs::ICTL_LCIE_MASK);
        hw.write(regs::ICTL, value);
        hw.write(regs::STA, regs::STA_MASK_ALL);
        hw.write(regs::ISTA, regs::ISTA_MASK_ALL);

        // Lane terminations and settle times.
        hw.write_field(regs::CLT, 2, regs::CLT1_MASK);
        hw.write_field(regs::CLT, 6, regs::CLT2_MASK);
        hw.write_field(regs::DLT, 2, regs::DLT1_MASK);
        hw.write_field(regs::DLT, 6, regs::DLT2_MASK);
        hw.write_field(regs::DLT, 0, regs::DLT3_MASK);

        hw.write_field(regs::CTRL, 0, regs::CTRL_SOE);

        // Packet compare, needed to catch every frame end.
        hw.write(
            regs::CMP0,
            regs::CMP_PCE | regs::CMP_GI | regs::CMP_CPH | regs::field(1, regs::CMP_PCDT_MASK),
        );

        hw.write(regs::CLK, regs::CLK_CLE | regs::CLK_CLLPE);
        let lane = regs::DAT_DLE | regs::DAT_DLLPE;
        hw.write(regs::DAT0, lane);
        hw.write(regs::DAT1, lane);

        hw.write(regs::IBLS, layout.bytes_per_line);

        hw.program_dma(DmaWindow::scratch(self.scratch.as_ptr() as usize));

        let (unpack, pack, data_type) = if depth == 10 {
            (regs::IPIPE_PUM_UNPACK10, regs::IPIPE_PPM_PACK16, regs::DATA_TYPE_RAW10)
        } else {
            (regs::IPIPE_PUM_NONE, regs::IPIPE_PPM_NONE, regs::DATA_TYPE_RAW8)
        };
        hw.write(
            regs::IPIPE,
            regs::field(unpack, regs::IPIPE_PUM_MASK) | regs::field(pack, regs::IPIPE_PPM_MASK),
        );
        // Virtual channel 0.
        hw.write(regs::IDI0, data_type);

        let mut value = hw.read(regs::MISC);
        value |= regs::MISC_FL0 | regs::MISC_FL1;
        hw.write(regs::MISC, value);

        hw.write(regs::DCS, 0);

        hw.write_field(regs::CTRL, 1, regs::CTRL_CPE);
        hw.write_field(regs::ICTL, 1, regs::ICTL_LIP_MASK);

        hw.bus_exit();

        tracing::debug!(depth, bytes_per_line = layout.bytes_per_line, "Receiver enabled");
        Ok(())
    }

    fn disable_receiver(&mut self) {
        let hw = &mut self.hardware;
        hw.bus_enter();

        hw.write_field(regs::ANA, 1, regs::ANA_DDL);
        // Stop the output engine before resetting.
        hw.write_field(regs::CTRL, 1, regs::CTRL_SOE);
        hw.write(regs::DAT0, 0);
        hw.write(regs::DAT1, 0);

        hw.write_field(regs::CTRL, 1, regs::CTRL_CPR);
        hw.delay_us(50);
        hw.write_field(regs::CTRL, 0, regs::CTRL_CPR);
        hw.write_field(regs::CTRL, 0, regs::CTRL_CPE);

        hw.bus_exit();

        hw.gate_lane_clocks(0);
        hw.stop_clock();

        if let (Some(buffer), Some(producer)) = (self.attached.take(), self.producer.as_mut()) {
            if let Err(buffer) = producer.restore(buffer) {
                tracing::warn!(slot = buffer.slot(), "Attached buffer does not fit the ring");
            }
        }
    }

    /// Validates and programs a sensor control.
    ///
    /// Flips change the Bayer order and are rejected while streaming.
    pub fn set_control(&mut self, control: Control, value: i32) -> Result<(), CaptureError> {
        if control.affects_format() && self.is_streaming() {
            return Err(CaptureError::Busy);
        }
        self.sensor.set_control(control, value)?;
        self.refresh_format();
        Ok(())
    }

    /// Sets a control to `percent` of its range.
    pub fn set_control_percent(&mut self, control: Control, percent: u32) -> Result<(), CaptureError> {
        if control.affects_format() && self.is_streaming() {
            return Err(CaptureError::Busy);
        }
        self.sensor.set_control_percent(control, percent)?;
        self.refresh_format();
        Ok(())
    }

    /// Whether the attached sensor implements `control`.
    pub fn is_control_supported(&self, control: Control) -> bool {
        self.sensor.is_control_supported(control)
    }

    /// Current value of `control`.
    pub fn control_value(&self, control: Control) -> i32 {
        self.sensor.control_value(control)
    }

    /// Range and default of `control`.
    pub fn control_info(&self, control: Control) -> ControlInfo {
        self.sensor.control_info(control)
    }

    /// Picks up a Bayer order change after a flip.
    fn refresh_format(&mut self) {
        if let (Some(layout), Some(format)) = (self.layout.as_mut(), self.sensor.logical_format()) {
            layout.format = format;
        }
    }

    /// Interrupt-path counters.
    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// Frames waiting for the consumer.
    pub fn ready_count(&self) -> usize {
        self.producer.as_ref().map_or(0, Producer::ready_count)
    }

    /// Usable ring slots, zero before allocation.
    pub fn ring_capacity(&self) -> usize {
        self.producer.as_ref().map_or(0, |p| p.slots() - 1)
    }

    /// The attached sensor driver.
    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    /// The receiver hardware.
    pub fn hardware(&self) -> &H {
        &self.hardware
    }

    /// Mutable access to the receiver hardware.
    pub fn hardware_mut(&mut self) -> &mut H {
        &mut self.hardware
    }
}

impl<H: ReceiverHardware, S: SensorDriver> Drop for CaptureEngine<H, S> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Stop during teardown failed");
        }
        if self.powered {
            if let Err(e) = self.hardware.set_power(false) {
                tracing::warn!(error = %e, "Cannot disable receiver power");
            }
        }
    }
}

impl<H: ReceiverHardware, S: SensorDriver> std::fmt::Debug for CaptureEngine<H, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEngine")
            .field("state", &self.state)
            .field("layout", &self.layout)
            .field("attached", &self.attached.is_some())
            .field("sequence", &self.sequence)
            .field("stats", &self.stats)
            .finish()
    }
}
