//! Software stand-in for the receiver.
//!
//! Registers live in a map; STA and ISTA are write-one-to-clear like the
//! silicon. Frames are "received" by painting a flat Bayer scene into the
//! window the engine programmed, in [`complete_dma`](ReceiverHardware::complete_dma).

use super::hardware::{low_bits, DmaWindow, HardwareError, ReceiverHardware};
use super::regs;
use crate::format::{ColorComponent, FrameLayout};
use std::collections::HashMap;

/// Receiver simulation with failure injection.
#[derive(Debug, Clone)]
pub struct SimulatedReceiver {
    registers: HashMap<u32, u32>,
    powered: bool,
    clock_running: bool,
    lane_clocks: u32,
    fail_power: bool,
    fail_clock: bool,
    ticks: u64,
    delayed_us: u64,
    scene: [u16; 3],
    dma_log: Vec<DmaWindow>,
    cache_log: Vec<CacheEvent>,
}

/// One entry of the simulated receiver's DMA history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    /// Cache maintenance over `len` bytes at `start`.
    Cleaned {
        /// First byte of the range.
        start: usize,
        /// Length of the range in bytes.
        len: usize,
    },
    /// DMA pointed at a window starting at this address.
    Programmed(usize),
}

impl Default for SimulatedReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedReceiver {
    /// Unpowered receiver with a mid-grey scene.
    pub fn new() -> Self {
        Self {
            registers: HashMap::new(),
            powered: false,
            clock_running: false,
            lane_clocks: 0,
            fail_power: false,
            fail_clock: false,
            ticks: 0,
            delayed_us: 0,
            scene: [512, 512, 512],
            dma_log: Vec::new(),
            cache_log: Vec::new(),
        }
    }

    /// Colour (R, G, B) painted into every received frame, in 10-bit
    /// units. 8-bit formats receive the top eight bits.
    pub fn with_scene(mut self, scene: [u16; 3]) -> Self {
        self.scene = scene;
        self
    }

    /// Changes the painted colour between frames.
    pub fn set_scene(&mut self, scene: [u16; 3]) {
        self.scene = scene;
    }

    /// Makes the next power-up fail.
    pub fn fail_power(&mut self) {
        self.fail_power = true;
    }

    /// Makes the next clock start fail.
    pub fn fail_clock(&mut self) {
        self.fail_clock = true;
    }

    /// Latches a frame start.
    pub fn raise_frame_start(&mut self) {
        self.latch(regs::STA_IS, regs::ISTA_FSI);
    }

    /// Latches a frame end.
    pub fn raise_frame_end(&mut self) {
        self.latch(regs::STA_IS, regs::ISTA_FEI);
    }

    /// Latches a frame end followed by the next frame start, as the
    /// hardware reports back-to-back frames in one interrupt.
    pub fn raise_frame_boundary(&mut self) {
        self.latch(regs::STA_IS, regs::ISTA_FEI | regs::ISTA_FSI);
    }

    /// Latches the packet-capture condition that also marks frame end.
    pub fn raise_packet_capture(&mut self) {
        self.latch(regs::STA_PI0, 0);
    }

    /// Latches arbitrary status bits.
    pub fn latch(&mut self, status: u32, image_status: u32) {
        *self.registers.entry(regs::STA).or_insert(0) |= status;
        *self.registers.entry(regs::ISTA).or_insert(0) |= image_status;
    }

    /// Current register value, without side effects.
    pub fn register(&self, offset: u32) -> u32 {
        self.registers.get(&offset).copied().unwrap_or(0)
    }

    /// Whether the power domain is on.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Whether the receiver clock is running.
    pub fn is_clock_running(&self) -> bool {
        self.clock_running
    }

    /// Last value written to the lane clock gate.
    pub fn lane_clocks(&self) -> u32 {
        self.lane_clocks
    }

    /// Every DMA window programmed so far, oldest first.
    pub fn dma_log(&self) -> &[DmaWindow] {
        &self.dma_log
    }

    /// Cache maintenance and DMA programming in call order.
    pub fn cache_log(&self) -> &[CacheEvent] {
        &self.cache_log
    }

    /// Total busy-wait time requested.
    pub fn delayed_us(&self) -> u64 {
        self.delayed_us
    }
}

impl ReceiverHardware for SimulatedReceiver {
    fn read(&mut self, offset: u32) -> u32 {
        self.register(offset)
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            regs::STA | regs::ISTA => {
                let latched = self.registers.entry(offset).or_insert(0);
                *latched &= !value;
            }
            _ => {
                self.registers.insert(offset, value);
            }
        }
    }

    fn set_power(&mut self, on: bool) -> Result<(), HardwareError> {
        if on && std::mem::take(&mut self.fail_power) {
            return Err(HardwareError::Power);
        }
        self.powered = on;
        Ok(())
    }

    fn start_clock(&mut self, rate_hz: u32) -> Result<(), HardwareError> {
        if std::mem::take(&mut self.fail_clock) {
            return Err(HardwareError::Clock { rate_hz });
        }
        if !self.powered {
            return Err(HardwareError::Receiver("power domain is off".into()));
        }
        self.clock_running = true;
        Ok(())
    }

    fn stop_clock(&mut self) {
        self.clock_running = false;
    }

    fn gate_lane_clocks(&mut self, value: u32) {
        self.lane_clocks = value;
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us += u64::from(us);
        self.ticks += u64::from(us);
    }

    fn clock_ticks(&mut self) -> u64 {
        self.ticks += 1;
        self.ticks
    }

    fn clean_and_invalidate(&mut self, start: usize, len: usize) {
        self.cache_log.push(CacheEvent::Cleaned { start, len });
    }

    /// Host heap addresses do not fit the register file; keep the low word
    /// there. [`dma_log`](SimulatedReceiver::dma_log) has the full window.
    fn bus_address(&self, address: usize) -> u32 {
        low_bits(address)
    }

    fn program_dma(&mut self, window: DmaWindow) {
        self.dma_log.push(window);
        self.cache_log.push(CacheEvent::Programmed(window.start));
        let start = self.bus_address(window.start);
        let end = self.bus_address(window.end);
        self.write(regs::IBSA0, start);
        self.write(regs::IBEA0, end);
    }

    fn complete_dma(&mut self, layout: &FrameLayout, target: &mut [u8]) {
        let format = layout.format;
        let stride = layout.bytes_per_line as usize;
        let wide = format.depth() > 8;
        let [r, g, b] = self.scene;

        for (y, row) in target.chunks_mut(stride).take(layout.height as usize).enumerate() {
            for x in 0..layout.width {
                let value = match format.color_at(x, y as u32) {
                    ColorComponent::Red => r,
                    ColorComponent::GreenRed | ColorComponent::GreenBlue => g,
                    ColorComponent::Blue => b,
                };
                let x = x as usize;
                if wide {
                    if let Some(pair) = row.get_mut(2 * x..2 * x + 2) {
                        pair.copy_from_slice(&value.to_le_bytes());
                    }
                } else if let Some(byte) = row.get_mut(x) {
                    *byte = (value >> 2) as u8;
                }
            }
        }
    }
}
