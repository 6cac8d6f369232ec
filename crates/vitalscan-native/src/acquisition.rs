//! Optical pulse acquisition session
//!
//! [`PulseSession`] drives a [`FrameSource`] through the core PPG stages:
//! presence gate, calibration warm-up, peak detection, BPM estimation, and
//! output smoothing. The session is self-throttling; callers may tick it as
//! fast as they like and it consumes frames at the configured sampling rate.
//!
//! Observers subscribe to a [`watch`] channel of [`PulseSnapshot`] values;
//! the latest snapshot is always available without blocking the sampling
//! path.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};

use vitalscan_core::ppg::{finger_present, PeakConfig, PeakDetector, PresenceConfig};
use vitalscan_core::smoothing::MeanSmoother;
use vitalscan_core::types::{CalibrationWindow, SampleBuffer};
use vitalscan_core::{estimate_bpm, SignalSample};

use crate::capture::{CaptureError, FrameSource};

/// Number of recent intensity values exposed for waveform display.
pub const VIS_SIGNAL_LEN: usize = 100;

/// Errors from starting an acquisition session.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// The session is already running.
    #[error("acquisition session already running")]
    AlreadyRunning,

    /// The capture device could not be acquired.
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for an optical pulse session.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct PulseConfig {
    /// Sampling rate in Hz
    pub sample_rate_hz: u32,
    /// Finger-presence thresholds
    pub presence: PresenceConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 30,
            presence: PresenceConfig::default(),
        }
    }
}

impl PulseConfig {
    /// Sample buffer capacity (ten seconds of signal).
    #[must_use]
    pub fn buffer_capacity(&self) -> usize {
        self.sample_rate_hz as usize * 10
    }

    /// Calibration warm-up length (three seconds of signal).
    #[must_use]
    pub fn calibration_samples(&self) -> u32 {
        self.sample_rate_hz * 3
    }

    /// Minimum wall-clock spacing between consumed frames.
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.sample_rate_hz))
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Observable state of the pulse pipeline.
///
/// Published on every consumed frame. `bpm` is `None` until calibration
/// finishes and a confident estimate exists.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PulseSnapshot {
    /// Smoothed heart-rate estimate, if one is available
    pub bpm: Option<u16>,
    /// Recent red-channel intensities for waveform display
    pub signal: Vec<f32>,
    /// Whether the session is running
    pub is_reading: bool,
    /// Whether the calibration warm-up is still in progress
    pub is_calibrating: bool,
    /// Whether a finger is currently coupled to the sensor
    pub finger_detected: bool,
    /// Last error message, if the session failed to start
    pub error: Option<String>,
}

// ============================================================================
// Session
// ============================================================================

/// Drives one optical capture source through the PPG pipeline.
pub struct PulseSession<S> {
    config: PulseConfig,
    source: S,
    detector: PeakDetector,
    buffer: SampleBuffer,
    calibration: CalibrationWindow,
    smoother: MeanSmoother,
    last_bpm: Option<u16>,
    last_sample_at: Option<Instant>,
    running: bool,
    snapshot_tx: watch::Sender<PulseSnapshot>,
}

impl<S: FrameSource> PulseSession<S> {
    /// Create a session over the given frame source.
    #[must_use]
    pub fn new(source: S, config: PulseConfig) -> Self {
        let (snapshot_tx, _) = watch::channel(PulseSnapshot::default());
        Self {
            source,
            detector: PeakDetector::new(PeakConfig::new(config.sample_rate_hz)),
            buffer: SampleBuffer::new(config.buffer_capacity()),
            calibration: CalibrationWindow::new(config.calibration_samples()),
            smoother: MeanSmoother::new(),
            last_bpm: None,
            last_sample_at: None,
            running: false,
            snapshot_tx,
            config,
        }
    }

    /// Subscribe to pipeline snapshots.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PulseSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Whether the session is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Open the capture source and begin acquiring.
    ///
    /// # Errors
    ///
    /// Returns [`AcquisitionError::AlreadyRunning`] if called while running,
    /// or the capture error if the source cannot be opened. Capture failures
    /// are also surfaced on the snapshot channel.
    pub async fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.running {
            return Err(AcquisitionError::AlreadyRunning);
        }

        if let Err(e) = self.source.open().await {
            self.snapshot_tx.send_replace(PulseSnapshot {
                error: Some(e.to_string()),
                ..PulseSnapshot::default()
            });
            return Err(e.into());
        }

        self.running = true;
        info!(rate_hz = self.config.sample_rate_hz, "pulse acquisition started");

        self.snapshot_tx.send_replace(PulseSnapshot {
            is_reading: true,
            is_calibrating: true,
            ..PulseSnapshot::default()
        });

        Ok(())
    }

    /// Advance the pipeline by at most one frame.
    ///
    /// Frames arriving faster than the configured sampling rate are left in
    /// the source; `now` is taken as a parameter so schedulers and tests
    /// control time explicitly.
    pub fn tick(&mut self, now: Instant) {
        if !self.running {
            return;
        }

        if let Some(last) = self.last_sample_at {
            if now.duration_since(last) < self.config.sample_interval() {
                return;
            }
        }

        let Some(sample) = self.source.read() else {
            return;
        };
        self.last_sample_at = Some(now);

        self.process(sample);
    }

    fn process(&mut self, sample: SignalSample) {
        let present = finger_present(sample.red, sample.green, &self.config.presence);

        // Every consumed frame is buffered and counts toward calibration;
        // presence gates only the rate computation
        self.buffer.push(sample);
        self.calibration.record();

        if !present {
            // The displayed value clears, but the smoothing history survives
            // a brief lift-off so re-placement settles quickly
            self.last_bpm = None;
            self.publish(false);
            return;
        }

        if self.calibration.is_calibrating() {
            self.publish(true);
            return;
        }

        let series = self.buffer.red_series();
        let peaks = self.detector.detect(&series);
        if let Some(bpm) = estimate_bpm(&peaks, self.config.sample_rate_hz) {
            let smoothed = self.smoother.push(bpm);
            if self.last_bpm != Some(smoothed) {
                debug!(bpm = smoothed, "pulse estimate updated");
            }
            self.last_bpm = Some(smoothed);
        }

        self.publish(true);
    }

    fn publish(&self, finger_detected: bool) {
        self.snapshot_tx.send_replace(PulseSnapshot {
            bpm: self.last_bpm,
            signal: self.buffer.recent_red(VIS_SIGNAL_LEN),
            is_reading: self.running,
            is_calibrating: self.calibration.is_calibrating(),
            finger_detected,
            error: None,
        });
    }

    /// Stop acquiring and release the capture source.
    ///
    /// All pipeline state is discarded; a later `start` begins from a fresh
    /// calibration. Calling `stop` on a stopped session is a no-op.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }

        self.source.close().await;
        self.running = false;
        self.buffer.clear();
        self.calibration.reset();
        self.smoother.reset();
        self.last_bpm = None;
        self.last_sample_at = None;

        info!("pulse acquisition stopped");
        self.snapshot_tx.send_replace(PulseSnapshot::default());
    }
}

// ============================================================================
// Tests
// ============================================================================
