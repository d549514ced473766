//! Bayer Capture CLI
//!
//! Drives the full capture pipeline against a simulated receiver and
//! sensor: probe, configure, stream, demosaic on a consumer thread.

use bayer_capture::{
    capture::{FileConfig, SimulatedReceiver},
    context::CameraContext,
    metrics::{MetricsRegistry, MetricsSnapshot},
    sensor::RegisterFile,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SensorModel {
    Ov5647,
    Imx219,
}

impl SensorModel {
    /// Bus address and chip-id registers of the simulated chip.
    fn identity(self) -> (u8, [(u16, u8); 2]) {
        match self {
            SensorModel::Ov5647 => (0x36, [(0x300a, 0x56), (0x300b, 0x47)]),
            SensorModel::Imx219 => (0x10, [(0x0000, 0x02), (0x0001, 0x19)]),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "bayer-capture", version, about = "Simulated CSI-2 Bayer capture pipeline")]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which chip the simulated bus answers as.
    #[arg(long, value_enum, default_value_t = SensorModel::Ov5647)]
    sensor: SensorModel,

    /// Frames to capture; overrides the configuration file.
    #[arg(short = 'n', long)]
    frames: Option<u32>,

    /// Capture until interrupted.
    #[arg(long)]
    continuous: bool,

    /// Time between simulated frames.
    #[arg(long, default_value_t = 33)]
    frame_interval_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Bayer Capture v{}", bayer_capture::VERSION);

    if let Err(e) = run(args) {
        error!(error = %e, "Capture failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => FileConfig::from_file(path)?,
        None => FileConfig::default(),
    };
    if let Some(frames) = args.frames {
        config.output.frame_count = frames;
    }
    config.output.continuous |= args.continuous;
    config.capture.validate()?;

    let (address, identity) = args.sensor.identity();
    let open = move |bus_address: u8| {
        if bus_address == address {
            RegisterFile::new(bus_address).with(&identity)
        } else {
            RegisterFile::disconnected(bus_address)
        }
    };

    let hardware = SimulatedReceiver::new().with_scene([640, 512, 384]);
    let mut camera = CameraContext::probe(hardware, open)?;
    info!(model = camera.model(), "Camera detected");

    let mut consumer = config.capture.apply(&mut camera)?;
    let info = camera.format_info().ok_or("format not set")?;
    info!(
        width = info.width,
        height = info.height,
        format = %info.code,
        buffers = consumer.capacity(),
        "Capture configured"
    );

    let (ready_tx, ready_rx) = mpsc::channel::<u32>();
    camera.set_ready_handler(Some(Box::new(move |sequence: u32| {
        // The worker may already have exited.
        let _ = ready_tx.send(sequence);
    })))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let (report_tx, report_rx) = mpsc::channel::<(u32, [u32; 3])>();
    let white_balance = config.white_balance.clone();
    let pixel_count = info.width as usize * info.height as usize;

    let worker = thread::spawn(move || {
        let mut rgb565 = vec![0u16; pixel_count];
        loop {
            match ready_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(_) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            while let Some(frame) = consumer.try_acquire_ready() {
                if white_balance.enabled {
                    frame.white_balance(white_balance.samples, white_balance.rounds);
                }
                match frame.convert_to_rgb565(&mut rgb565) {
                    Ok(()) => debug!(
                        sequence = frame.sequence(),
                        centre = rgb565[pixel_count / 2],
                        "Frame converted"
                    ),
                    Err(e) => warn!(sequence = frame.sequence(), error = %e, "Conversion failed"),
                }
                let _ = report_tx.send((frame.sequence(), frame.gains()));
                consumer.release();
            }
        }
        consumer.drain()
    });

    let metrics = MetricsSink::new(config.output.metrics_port)?;
    camera.start()?;
    metrics.set_streaming(true);

    let interval = Duration::from_millis(args.frame_interval_ms);
    let target = u64::from(config.output.frame_count);

    camera.engine_mut().hardware_mut().raise_frame_start();
    camera.handle_interrupt();

    let mut last_frame = None;
    while running.load(Ordering::SeqCst)
        && (config.output.continuous || camera.stats().frames_published < target)
    {
        thread::sleep(interval);
        camera.engine_mut().hardware_mut().raise_frame_boundary();
        camera.handle_interrupt();

        if let Some(report) = report_rx.try_iter().last() {
            last_frame = Some(report);
        }

        let engine = camera.engine();
        let mut snapshot = MetricsSnapshot::from_stats(&engine.stats())
            .with_ring(engine.ready_count(), engine.ring_capacity());
        if let Some((sequence, gains)) = last_frame {
            snapshot = snapshot.with_frame(sequence, gains);
        }
        metrics.update(&snapshot);
    }

    camera.stop()?;
    metrics.set_streaming(false);
    // Dropping the producer closes the ready channel and ends the worker.
    camera.free_buffers()?;

    let leftover = worker.join().map_err(|_| "consumer thread panicked")?;
    let stats = camera.stats();
    info!(
        published = stats.frames_published,
        dropped = stats.frames_dropped,
        unconsumed = leftover,
        "Done"
    );
    metrics.finish();
    Ok(())
}

/// Where metric snapshots go: a local registry, or the HTTP exporter.
enum MetricsSink {
    Local(MetricsRegistry),
    #[cfg(feature = "metrics")]
    Served(Arc<tokio::sync::RwLock<bayer_capture::metrics::MetricsState>>),
}

impl MetricsSink {
    #[cfg(feature = "metrics")]
    fn new(port: u16) -> Result<Self, Box<dyn std::error::Error>> {
        use bayer_capture::metrics::{MetricsServer, MetricsServerConfig};

        let registry = MetricsRegistry::new()?;
        if port == 0 {
            return Ok(MetricsSink::Local(registry));
        }

        let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
        let state = server.state();
        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "Cannot start metrics runtime");
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run()) {
                warn!(error = %e, "Metrics server stopped");
            }
        });
        Ok(MetricsSink::Served(state))
    }

    #[cfg(not(feature = "metrics"))]
    fn new(port: u16) -> Result<Self, Box<dyn std::error::Error>> {
        if port != 0 {
            debug!(port, "Built without the metrics feature; not serving");
        }
        Ok(MetricsSink::Local(MetricsRegistry::new()?))
    }

    fn update(&self, snapshot: &MetricsSnapshot) {
        match self {
            MetricsSink::Local(registry) => registry.update(snapshot),
            #[cfg(feature = "metrics")]
            MetricsSink::Served(state) => state.blocking_read().update(snapshot),
        }
    }

    fn set_streaming(&self, _streaming: bool) {
        #[cfg(feature = "metrics")]
        if let MetricsSink::Served(state) = self {
            state.blocking_write().set_streaming(_streaming);
        }
    }

    fn finish(&self) {
        match self {
            MetricsSink::Local(registry) => match registry.encode() {
                Ok(text) => debug!("Final metrics:\n{}", text),
                Err(e) => warn!(error = %e, "Cannot encode metrics"),
            },
            #[cfg(feature = "metrics")]
            MetricsSink::Served(_) => {}
        }
    }
}
