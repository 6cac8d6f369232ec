//! Core data types for the Vitalscan pipelines
//!
//! This module defines the sample and reading types shared by the optical
//! pulse pipeline and the BLE oximeter pipeline, together with the
//! physiological bounds every emitted reading must satisfy.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ============================================================================
// Physiological Bounds
// ============================================================================

/// Minimum plausible SpO2 percentage. Anything below is a decode artifact.
pub const SPO2_MIN: u8 = 50;
/// Maximum SpO2 percentage.
pub const SPO2_MAX: u8 = 100;
/// Minimum plausible pulse rate from an oximeter, in beats per minute.
pub const PULSE_RATE_MIN: u16 = 30;
/// Maximum plausible pulse rate from an oximeter, in beats per minute.
pub const PULSE_RATE_MAX: u16 = 250;
/// Minimum heart rate the optical pipeline will report.
pub const BPM_MIN: u16 = 40;
/// Maximum heart rate the optical pipeline will report.
pub const BPM_MAX: u16 = 200;

/// Check a decoded SpO2 candidate against physiological bounds.
///
/// Non-finite values (SFLOAT NaN/infinity codes) are always rejected.
#[must_use]
pub fn spo2_in_range(value: f32) -> bool {
    value.is_finite() && value >= f32::from(SPO2_MIN) && value <= f32::from(SPO2_MAX)
}

/// Check a decoded pulse-rate candidate against physiological bounds.
#[must_use]
pub fn pulse_rate_in_range(value: f32) -> bool {
    value.is_finite() && value >= f32::from(PULSE_RATE_MIN) && value <= f32::from(PULSE_RATE_MAX)
}

/// Check an optically estimated heart rate against the reportable range.
#[must_use]
pub fn bpm_in_range(bpm: u16) -> bool {
    (BPM_MIN..=BPM_MAX).contains(&bpm)
}

// ============================================================================
// Optical Samples
// ============================================================================

/// One averaged-intensity sample from the optical capture device.
///
/// `red` and `green` are the mean channel intensities over the captured
/// frame (0..255 scale). Samples are immutable once recorded.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalSample {
    /// Capture timestamp in microseconds since session start
    pub timestamp_us: u64,
    /// Mean red-channel intensity
    pub red: f32,
    /// Mean green-channel intensity
    pub green: f32,
}

impl SignalSample {
    /// Create a new sample.
    #[must_use]
    pub const fn new(timestamp_us: u64, red: f32, green: f32) -> Self {
        Self { timestamp_us, red, green }
    }
}

/// Fixed-capacity sliding window of optical samples.
///
/// Appending to a full buffer evicts the oldest sample (O(1) amortized).
/// The buffer owns its samples exclusively; callers get copies, never
/// mutable aliases. Samples are totally ordered by timestamp; out-of-order
/// delivery is a precondition violation, not something this type repairs.
#[derive(Clone, Debug)]
pub struct SampleBuffer {
    samples: VecDeque<SignalSample>,
    capacity: usize,
}

impl SampleBuffer {
    /// Create a buffer holding at most `capacity` samples.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest if the buffer is full.
    pub fn push(&mut self, sample: SignalSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Number of samples currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples the buffer will hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The red-channel intensities in arrival order.
    ///
    /// This is the series the peak detector operates on.
    #[must_use]
    pub fn red_series(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.red).collect()
    }

    /// The last `n` red-channel intensities, for visualization.
    #[must_use]
    pub fn recent_red(&self, n: usize) -> Vec<f32> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip).map(|s| s.red).collect()
    }

    /// Discard all buffered samples. Capacity is unchanged.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

// ============================================================================
// Calibration
// ============================================================================

/// Warm-up counter that suppresses readings until the signal stabilizes.
///
/// The optical pipeline reports nothing until `required` samples have been
/// seen; the first seconds after the finger lands on the sensor are noise.
#[derive(Copy, Clone, Debug)]
pub struct CalibrationWindow {
    samples_seen: u32,
    required: u32,
}

impl CalibrationWindow {
    /// Create a window requiring `required` samples before readings flow.
    #[must_use]
    pub const fn new(required: u32) -> Self {
        Self { samples_seen: 0, required }
    }

    /// Record one accepted sample.
    pub fn record(&mut self) {
        self.samples_seen = self.samples_seen.saturating_add(1);
    }

    /// Whether readings are still suppressed.
    #[must_use]
    pub fn is_calibrating(&self) -> bool {
        self.samples_seen < self.required
    }

    /// Number of samples recorded so far.
    #[must_use]
    pub fn samples_seen(&self) -> u32 {
        self.samples_seen
    }

    /// Restart the warm-up from zero.
    pub fn reset(&mut self) {
        self.samples_seen = 0;
    }
}

// ============================================================================
// Oximeter Readings
// ============================================================================

/// Which wire format produced a reading.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolId {
    /// Standard Bluetooth SIG Pulse Oximeter profile (SFLOAT payloads)
    Plx,
    /// BerryMed BM1000-family 5-byte proprietary packets
    BerryMed,
    /// Serial-over-BLE stream framed with an 0xAA 0x55 sync word
    SerialFramed,
    /// Positional byte-scan fallback for generic HM-10 modules.
    ///
    /// Approximate by construction: arbitrary payload bytes can land in the
    /// physiological ranges, so consumers should discount readings carrying
    /// this tag.
    Heuristic,
}

impl ProtocolId {
    /// Human-readable protocol name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Plx => "PLX",
            Self::BerryMed => "BerryMed",
            Self::SerialFramed => "serial-framed",
            Self::Heuristic => "heuristic",
        }
    }
}

/// A validated blood-oxygen reading from the oximeter pipeline.
///
/// Instances only exist for values that passed the physiological bounds
/// check; out-of-range candidates are discarded at decode time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OximeterReading {
    /// Blood-oxygen saturation percentage, within [`SPO2_MIN`], [`SPO2_MAX`]
    pub spo2: u8,
    /// Pulse rate in beats per minute, within the pulse-rate bounds
    pub pulse_rate: u16,
    /// Wire format that produced this reading
    pub protocol: ProtocolId,
    /// Time of decode in microseconds since session start
    pub timestamp_us: u64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_evicts_oldest() {
        let mut buf = SampleBuffer::new(3);
        for i in 0..5u64 {
            buf.push(SignalSample::new(i, i as f32, 0.0));
        }

        assert_eq!(buf.len(), 3);
        assert_eq!(buf.red_series(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buf = SampleBuffer::new(10);
        for i in 0..1000u64 {
            buf.push(SignalSample::new(i, 0.0, 0.0));
            assert!(buf.len() <= buf.capacity());
        }
    }

    #[test]
    fn test_recent_red_shorter_than_window() {
        let mut buf = SampleBuffer::new(10);
        buf.push(SignalSample::new(0, 1.0, 0.0));
        buf.push(SignalSample::new(1, 2.0, 0.0));

        assert_eq!(buf.recent_red(100), vec![1.0, 2.0]);
        assert_eq!(buf.recent_red(1), vec![2.0]);
    }

    #[test]
    fn test_calibration_window() {
        let mut cal = CalibrationWindow::new(3);
        assert!(cal.is_calibrating());

        cal.record();
        cal.record();
        assert!(cal.is_calibrating());

        cal.record();
        assert!(!cal.is_calibrating());

        cal.reset();
        assert!(cal.is_calibrating());
    }

    #[test]
    fn test_spo2_bounds() {
        assert!(spo2_in_range(98.0));
        assert!(spo2_in_range(50.0));
        assert!(!spo2_in_range(45.0));
        assert!(!spo2_in_range(101.0));
        assert!(!spo2_in_range(f32::NAN));
        assert!(!spo2_in_range(f32::INFINITY));
    }

    #[test]
    fn test_pulse_rate_bounds() {
        assert!(pulse_rate_in_range(72.0));
        assert!(!pulse_rate_in_range(300.0));
        assert!(!pulse_rate_in_range(25.0));
        assert!(!pulse_rate_in_range(f32::NEG_INFINITY));
    }

    #[test]
    fn test_bpm_bounds() {
        assert!(bpm_in_range(40));
        assert!(bpm_in_range(200));
        assert!(!bpm_in_range(39));
        assert!(!bpm_in_range(201));
    }
}
