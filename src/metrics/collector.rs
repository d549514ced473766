//! Metrics collection and registry.

use crate::buffer::UNITY_GAIN;
use crate::capture::CaptureStats;
use prometheus::{Encoder, GaugeVec, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Capture state copied out in task context for a metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Frames handed to the consumer.
    pub frames_published: u64,
    /// Frame boundaries with no buffer attached.
    pub frames_dropped: u64,
    /// Receiver interrupts with nothing to do.
    pub spurious_interrupts: u64,
    /// Sequence number of the most recently consumed frame.
    pub last_sequence: Option<u32>,
    /// Frames waiting for the consumer.
    pub ring_ready: usize,
    /// Usable ring slots.
    pub ring_capacity: usize,
    /// White-balance gains (R, G, B) as multipliers.
    pub wb_gains: Option<[f64; 3]>,
}

/// Prometheus metrics registry for capture monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    frames_published: IntCounter,
    frames_dropped: IntCounter,
    spurious_interrupts: IntCounter,
    last_sequence: IntGauge,

    ring_ready: IntGauge,
    ring_capacity: IntGauge,

    wb_gain: GaugeVec,
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let frames_published = IntCounter::new(
            "bayer_capture_frames_published_total",
            "Frames delivered to the consumer",
        )?;
        let frames_dropped = IntCounter::new(
            "bayer_capture_frames_dropped_total",
            "Frames captured into scratch because the ring was full",
        )?;
        let spurious_interrupts = IntCounter::new(
            "bayer_capture_spurious_interrupts_total",
            "Receiver interrupts with no pending condition",
        )?;
        let last_sequence = IntGauge::new(
            "bayer_capture_last_sequence",
            "Sequence number of the last consumed frame",
        )?;

        let ring_ready = IntGauge::new(
            "bayer_capture_ring_ready",
            "Frames waiting for the consumer",
        )?;
        let ring_capacity = IntGauge::new(
            "bayer_capture_ring_capacity",
            "Usable ring slots",
        )?;

        let wb_gain = GaugeVec::new(
            Opts::new("bayer_capture_wb_gain", "White-balance gain per channel"),
            &["channel"],
        )?;

        registry.register(Box::new(frames_published.clone()))?;
        registry.register(Box::new(frames_dropped.clone()))?;
        registry.register(Box::new(spurious_interrupts.clone()))?;
        registry.register(Box::new(last_sequence.clone()))?;
        registry.register(Box::new(ring_ready.clone()))?;
        registry.register(Box::new(ring_capacity.clone()))?;
        registry.register(Box::new(wb_gain.clone()))?;

        Ok(Self {
            registry,
            frames_published,
            frames_dropped,
            spurious_interrupts,
            last_sequence,
            ring_ready,
            ring_capacity,
            wb_gain,
        })
    }

    /// Updates all metrics from a snapshot.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        // Counters only move forward by the difference.
        advance(&self.frames_published, snapshot.frames_published);
        advance(&self.frames_dropped, snapshot.frames_dropped);
        advance(&self.spurious_interrupts, snapshot.spurious_interrupts);

        if let Some(sequence) = snapshot.last_sequence {
            self.last_sequence.set(i64::from(sequence));
        }

        self.ring_ready.set(snapshot.ring_ready as i64);
        self.ring_capacity.set(snapshot.ring_capacity as i64);

        if let Some(gains) = snapshot.wb_gains {
            for (channel, gain) in ["r", "g", "b"].into_iter().zip(gains) {
                self.wb_gain.with_label_values(&[channel]).set(gain);
            }
        }
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsSnapshot {
    /// Starts a snapshot from the engine counters.
    pub fn from_stats(stats: &CaptureStats) -> Self {
        Self {
            frames_published: stats.frames_published,
            frames_dropped: stats.frames_dropped,
            spurious_interrupts: stats.spurious_interrupts,
            ..Self::default()
        }
    }

    /// Adds ring occupancy.
    pub fn with_ring(mut self, ready: usize, capacity: usize) -> Self {
        self.ring_ready = ready;
        self.ring_capacity = capacity;
        self
    }

    /// Records the last consumed frame and its Q16 white-balance gains.
    pub fn with_frame(mut self, sequence: u32, gains: [u32; 3]) -> Self {
        let unity = f64::from(UNITY_GAIN);
        self.last_sequence = Some(sequence);
        self.wb_gains = Some(gains.map(|gain| f64::from(gain) / unity));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        let registry = MetricsRegistry::new();
        assert!(registry.is_ok());
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            frames_published: 12,
            frames_dropped: 3,
            spurious_interrupts: 1,
            last_sequence: Some(14),
            ring_ready: 2,
            ring_capacity: 3,
            wb_gains: Some([1.5, 1.0, 2.0]),
        };

        registry.update(&snapshot);

        let output = registry.encode().unwrap();
        assert!(output.contains("bayer_capture_frames_published_total 12"));
        assert!(output.contains("bayer_capture_frames_dropped_total 3"));
        assert!(output.contains("bayer_capture_last_sequence 14"));
        assert!(output.contains("bayer_capture_ring_capacity 3"));
        assert!(output.contains("bayer_capture_wb_gain{channel=\"r\"} 1.5"));
    }

    #[test]
    fn test_snapshot_builder() {
        let stats = CaptureStats {
            frames_published: 7,
            frames_dropped: 1,
            spurious_interrupts: 0,
            next_sequence: 8,
        };
        let snapshot = MetricsSnapshot::from_stats(&stats)
            .with_ring(1, 3)
            .with_frame(6, [UNITY_GAIN * 2, UNITY_GAIN, UNITY_GAIN / 2]);

        assert_eq!(snapshot.frames_published, 7);
        assert_eq!(snapshot.ring_capacity, 3);
        assert_eq!(snapshot.last_sequence, Some(6));
        assert_eq!(snapshot.wb_gains, Some([2.0, 1.0, 0.5]));
    }

    #[test]
    fn test_counters_never_rewind() {
        let registry = MetricsRegistry::new().unwrap();
        registry.update(&MetricsSnapshot {
            frames_published: 10,
            ..Default::default()
        });
        registry.update(&MetricsSnapshot {
            frames_published: 4,
            ..Default::default()
        });

        let output = registry.encode().unwrap();
        assert!(output.contains("bayer_capture_frames_published_total 10"));
    }

    #[test]
    fn test_metrics_encode() {
        let registry = MetricsRegistry::new().unwrap();
        let output = registry.encode().unwrap();

        assert!(output.contains("bayer_capture_frames_published_total"));
        assert!(output.contains("bayer_capture_ring_ready"));
        assert!(output.contains("bayer_capture_spurious_interrupts_total"));
    }
}
