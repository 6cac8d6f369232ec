//! Optical frame sources
//!
//! The pulse pipeline consumes averaged channel intensities; where those
//! intensities come from is behind the [`FrameSource`] trait. The shipped
//! implementation is a simulated source for development and the CLI demo;
//! camera capture plugs in through the same trait.

use async_trait::async_trait;
use thiserror::Error;

use vitalscan_core::types::SignalSample;

/// Errors from opening or operating a capture device.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The platform refused access to the capture device.
    #[error("capture permission denied")]
    PermissionDenied,

    /// The capture device is missing or failed to initialize.
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
}

/// A source of averaged-intensity optical samples.
///
/// `open` may perform async device setup (permission prompts, pipeline
/// warm-up); `read` must be cheap and non-blocking, returning `None` when no
/// new frame is ready. Implementations release the device in `close` and
/// must tolerate `close` without a prior `open`.
#[async_trait]
pub trait FrameSource: Send {
    /// Acquire the capture device.
    async fn open(&mut self) -> Result<(), CaptureError>;

    /// Pull the next sample if one is ready.
    fn read(&mut self) -> Option<SignalSample>;

    /// Release the capture device.
    async fn close(&mut self);
}

/// Simulated fingertip source producing a clean pulse waveform.
///
/// Generates red-channel intensities oscillating around a bright baseline,
/// the same shape a finger over a torch-lit camera produces, at a fixed
/// simulated heart rate.
#[derive(Clone, Debug)]
pub struct SimulatedPulseSource {
    sample_rate_hz: u32,
    bpm: f32,
    index: u64,
    open: bool,
}

impl SimulatedPulseSource {
    /// Create a source that simulates `bpm` beats per minute at the given
    /// sampling rate.
    #[must_use]
    pub fn new(sample_rate_hz: u32, bpm: f32) -> Self {
        Self {
            sample_rate_hz,
            bpm,
            index: 0,
            open: false,
        }
    }
}

#[async_trait]
impl FrameSource for SimulatedPulseSource {
    async fn open(&mut self) -> Result<(), CaptureError> {
        self.open = true;
        self.index = 0;
        Ok(())
    }

    fn read(&mut self) -> Option<SignalSample> {
        if !self.open {
            return None;
        }

        let t = self.index as f32 / self.sample_rate_hz as f32;
        let freq_hz = self.bpm / 60.0;
        // Pulse waveform plus slow baseline wander, as a real fingertip shows
        let pulse = 20.0 * (2.0 * std::f32::consts::PI * freq_hz * t).sin();
        let wander = 3.0 * (2.0 * std::f32::consts::PI * 0.1 * t).sin();
        let red = 150.0 + pulse + wander;
        let green = 60.0;

        let timestamp_us = self.index * 1_000_000 / u64::from(self.sample_rate_hz);
        self.index += 1;

        Some(SignalSample::new(timestamp_us, red, green))
    }

    async fn close(&mut self) {
        self.open = false;
    }
}
