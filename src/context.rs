//! Camera session handle.
//!
//! A [`CameraContext`] is created once per receiver/sensor pair and passed
//! explicitly to whatever drives capture. It owns the [`CaptureEngine`];
//! the platform's interrupt glue reaches the engine through
//! [`CameraContext::handle_interrupt`].

use crate::capture::{
    CaptureEngine, CaptureError, CaptureStats, InterruptReport, ReceiverHardware,
};
use crate::control::{Control, ControlInfo};
use crate::format::FormatInfo;
use crate::ring::{Consumer, ReadyHandler};
use crate::sensor::{Sensor, SensorBus, SensorDriver};

/// An initialized receiver with its attached sensor.
#[derive(Debug)]
pub struct CameraContext<H: ReceiverHardware, S: SensorDriver> {
    engine: CaptureEngine<H, S>,
}

impl<H: ReceiverHardware, S: SensorDriver> CameraContext<H, S> {
    /// Powers up the receiver around an already detected sensor.
    pub fn new(hardware: H, sensor: S) -> Result<Self, CaptureError> {
        let mut engine = CaptureEngine::new(hardware, sensor);
        engine.initialize()?;
        tracing::info!(model = engine.sensor().model(), "Camera ready");
        Ok(Self { engine })
    }

    /// Sensor model name.
    pub fn model(&self) -> &'static str {
        self.engine.sensor().model()
    }

    /// Negotiates a frame format with the sensor.
    pub fn set_format(&mut self, width: u32, height: u32, depth: u8) -> Result<FormatInfo, CaptureError> {
        self.engine.set_format(width, height, depth)
    }

    /// Current logical format, once set.
    pub fn format_info(&self) -> Option<FormatInfo> {
        self.engine.format_info()
    }

    /// Allocates the buffer ring and returns its consumer end.
    pub fn allocate_buffers(&mut self, count: usize) -> Result<Consumer, CaptureError> {
        self.engine.allocate_buffers(count)
    }

    /// Releases the buffer ring.
    pub fn free_buffers(&mut self) -> Result<(), CaptureError> {
        self.engine.free_buffers()
    }

    /// Registers the per-frame callback.
    pub fn set_ready_handler(&mut self, handler: Option<ReadyHandler>) -> Result<(), CaptureError> {
        self.engine.set_ready_handler(handler)
    }

    /// Starts streaming.
    pub fn start(&mut self) -> Result<(), CaptureError> {
        self.engine.start()
    }

    /// Stops streaming.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        self.engine.stop()
    }

    /// True while streaming.
    pub fn is_streaming(&self) -> bool {
        self.engine.is_streaming()
    }

    /// Sets a sensor control to a raw value.
    pub fn set_control(&mut self, control: Control, value: i32) -> Result<(), CaptureError> {
        self.engine.set_control(control, value)
    }

    /// Sets a sensor control as a percentage of its range.
    pub fn set_control_percent(&mut self, control: Control, percent: u32) -> Result<(), CaptureError> {
        self.engine.set_control_percent(control, percent)
    }

    /// Whether the sensor has `control`.
    pub fn is_control_supported(&self, control: Control) -> bool {
        self.engine.is_control_supported(control)
    }

    /// Current raw value of `control`.
    pub fn control_value(&self, control: Control) -> i32 {
        self.engine.control_value(control)
    }

    /// Range and default of `control`.
    pub fn control_info(&self, control: Control) -> ControlInfo {
        self.engine.control_info(control)
    }

    /// Receiver interrupt entry point.
    pub fn handle_interrupt(&mut self) -> InterruptReport {
        self.engine.handle_interrupt()
    }

    /// Interrupt-path counters.
    pub fn stats(&self) -> CaptureStats {
        self.engine.stats()
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &CaptureEngine<H, S> {
        &self.engine
    }

    /// Mutable access to the wrapped engine.
    pub fn engine_mut(&mut self) -> &mut CaptureEngine<H, S> {
        &mut self.engine
    }
}

impl<H: ReceiverHardware, B: SensorBus> CameraContext<H, Sensor<B>> {
    /// Probes for a supported sensor and powers up the receiver.
    ///
    /// `open` returns a bus for the given 7-bit device address.
    pub fn probe(hardware: H, open: impl FnMut(u8) -> B) -> Result<Self, CaptureError> {
        let sensor = Sensor::probe(open)?;
        Self::new(hardware, sensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DmaTarget, SimulatedReceiver};
    use crate::format::FormatCode;
    use crate::sensor::RegisterFile;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn open_ov5647(address: u8) -> RegisterFile {
        if address == 0x36 {
            RegisterFile::new(address).with(&[(0x300a, 0x56), (0x300b, 0x47)])
        } else {
            RegisterFile::disconnected(address)
        }
    }

    fn capture_one(context: &mut CameraContext<SimulatedReceiver, Sensor<RegisterFile>>) {
        context.engine_mut().hardware_mut().raise_frame_start();
        context.handle_interrupt();
        context.engine_mut().hardware_mut().raise_frame_end();
        context.handle_interrupt();
    }

    #[test]
    fn test_probe_and_stream_end_to_end() {
        let hardware = SimulatedReceiver::new().with_scene([800, 400, 200]);
        let mut context = CameraContext::probe(hardware, open_ov5647).unwrap();
        assert_eq!(context.model(), "ov5647");

        let info = context.set_format(1280, 960, 10).unwrap();
        assert_eq!((info.width, info.height), (1296, 972));
        assert_eq!(info.code, FormatCode::SGBRG10);

        let mut consumer = context.allocate_buffers(3).unwrap();
        let seen = Arc::new(AtomicU32::new(u32::MAX));
        let observer = Arc::clone(&seen);
        context
            .set_ready_handler(Some(Box::new(move |sequence: u32| {
                observer.store(sequence, Ordering::SeqCst);
            })))
            .unwrap();

        context.start().unwrap();
        capture_one(&mut context);
        capture_one(&mut context);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        let frame = consumer.try_acquire_ready().unwrap();
        assert_eq!(frame.sequence(), 0);
        let pixel = frame.pixel(101, 101);
        assert_eq!((pixel.r, pixel.g, pixel.b), (800, 400, 200));
        assert!(consumer.release());

        context.stop().unwrap();
        assert!(!context.engine().hardware().is_clock_running());
        assert_eq!(context.stats().frames_published, 2);
    }

    #[test]
    fn test_exhausted_ring_drops_into_scratch() {
        let mut context = CameraContext::probe(SimulatedReceiver::new(), open_ov5647).unwrap();
        context.set_format(640, 480, 10).unwrap();
        let mut consumer = context.allocate_buffers(3).unwrap();
        context.start().unwrap();

        capture_one(&mut context);
        capture_one(&mut context);

        context.engine_mut().hardware_mut().raise_frame_start();
        let report = context.handle_interrupt();
        assert_eq!(report.frame_start, Some(DmaTarget::Scratch));
        context.engine_mut().hardware_mut().raise_frame_end();
        let report = context.handle_interrupt();
        assert!(report.dropped);

        assert_eq!(consumer.drain(), 2);
        let stats = context.stats();
        assert_eq!(stats.frames_dropped, 1);
        assert_eq!(stats.next_sequence, 3);
    }

    #[test]
    fn test_probe_without_sensor() {
        let err = CameraContext::probe(SimulatedReceiver::new(), RegisterFile::disconnected)
            .unwrap_err();
        assert!(matches!(err, CaptureError::Sensor(_)));
    }
}
