//! Optical pulse (PPG) signal analysis
//!
//! The optical pipeline turns a stream of reflectance intensities (a
//! fingertip pressed against the camera with the torch on) into a heart
//! rate. This module holds the three pure stages:
//!
//! - [`finger_present`]: is a finger actually coupled to the sensor?
//! - [`PeakDetector`]: smoothed, adaptively thresholded heartbeat peaks
//! - [`estimate_bpm`]: outlier-robust beats-per-minute from peak timing
//!
//! All three are synchronous, allocation-light, and deterministic for a
//! given input, so they run on the hot sampling path and are testable
//! against literal values.

use serde::{Deserialize, Serialize};

use crate::types::bpm_in_range;

// ============================================================================
// Presence Detection
// ============================================================================

/// Thresholds for the finger-presence gate.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Minimum mean red intensity; a covered lens with the torch on
    /// saturates the red channel
    pub red_threshold: f32,
    /// Red must exceed green by this factor; skin transmits red far more
    /// than green, an uncovered lens does not
    pub red_green_ratio: f32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            red_threshold: 80.0,
            red_green_ratio: 1.2,
        }
    }
}

/// Classify whether a finger is coupled to the sensor right now.
///
/// Stateless: each sample is judged on its own channel averages.
#[must_use]
pub fn finger_present(red: f32, green: f32, config: &PresenceConfig) -> bool {
    red > config.red_threshold && red > green * config.red_green_ratio
}

// ============================================================================
// Peak Detection
// ============================================================================

/// Configuration for heartbeat peak detection.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
pub struct PeakConfig {
    /// Sampling rate of the intensity series in Hz
    pub sample_rate_hz: u32,
    /// Radius of the centered moving-average smoother
    pub smoothing_radius: usize,
    /// Threshold offset above the mean, in standard deviations
    pub threshold_sigma: f32,
}

impl PeakConfig {
    /// Default detection parameters for the given sampling rate.
    #[must_use]
    pub const fn new(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            smoothing_radius: 5,
            threshold_sigma: 0.3,
        }
    }

    /// Minimum index distance between accepted peaks.
    ///
    /// `floor(rate × 0.35)` caps the detectable rate near 170 BPM, which
    /// stops the second harmonic of a strong pulse from double-counting.
    #[must_use]
    pub fn min_peak_distance(&self) -> usize {
        (self.sample_rate_hz as f32 * 0.35) as usize
    }

    /// Minimum series length worth analysing (four seconds of signal).
    #[must_use]
    pub fn min_samples(&self) -> usize {
        self.sample_rate_hz as usize * 4
    }
}

/// Smoothing + adaptive-threshold heartbeat peak extractor.
#[derive(Copy, Clone, Debug)]
pub struct PeakDetector {
    config: PeakConfig,
}

impl PeakDetector {
    /// Create a detector with the given configuration.
    #[must_use]
    pub const fn new(config: PeakConfig) -> Self {
        Self { config }
    }

    /// Extract heartbeat peak indices from an intensity series.
    ///
    /// Returns an ordered list of indices into `series`. A short series
    /// yields no peaks; insufficient data is not an error. Output is
    /// deterministic for identical input.
    #[must_use]
    pub fn detect(&self, series: &[f32]) -> Vec<usize> {
        if series.len() < self.config.min_samples() {
            return Vec::new();
        }

        let smoothed = moving_average(series, self.config.smoothing_radius);

        let mu = mean(&smoothed);
        let sigma = std_dev(&smoothed, mu);
        let threshold = mu + sigma * self.config.threshold_sigma;

        let min_distance = self.config.min_peak_distance();
        let mut peaks = Vec::new();

        for i in 2..smoothed.len() - 2 {
            let v = smoothed[i];
            let is_peak = v > threshold
                && v > smoothed[i - 1]
                && v > smoothed[i - 2]
                && v >= smoothed[i + 1]
                && v >= smoothed[i + 2];

            if is_peak {
                match peaks.last() {
                    Some(&last) if i - last < min_distance => {}
                    _ => peaks.push(i),
                }
            }
        }

        peaks
    }
}

/// Centered moving average with the window clipped at the series edges.
fn moving_average(series: &[f32], radius: usize) -> Vec<f32> {
    let n = series.len();
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(n - 1);
        let window = &series[lo..=hi];
        let sum: f32 = window.iter().sum();
        out.push(sum / window.len() as f32);
    }

    out
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f32>() / values.len() as f32
}

fn std_dev(values: &[f32], mu: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mu) * (v - mu)).sum::<f32>() / values.len() as f32;
    var.sqrt()
}

// ============================================================================
// Rate Estimation
// ============================================================================

/// Estimate beats per minute from heartbeat peak indices.
///
/// Needs at least three peaks; intervals deviating more than 30% from the
/// median (motion artifacts, missed beats) are discarded, and at least two
/// must survive. Returns `None` rather than an implausible value; the
/// result is always within the reportable BPM range.
#[must_use]
pub fn estimate_bpm(peaks: &[usize], sample_rate_hz: u32) -> Option<u16> {
    if peaks.len() < 3 {
        return None;
    }

    let mut intervals: Vec<usize> = peaks.windows(2).map(|w| w[1] - w[0]).collect();
    intervals.sort_unstable();
    let median = intervals[intervals.len() / 2] as f32;

    let surviving: Vec<f32> = intervals
        .iter()
        .map(|&iv| iv as f32)
        .filter(|&iv| iv > median * 0.7 && iv < median * 1.3)
        .collect();

    if surviving.len() < 2 {
        return None;
    }

    let avg_interval = surviving.iter().sum::<f32>() / surviving.len() as f32;
    let bpm = (sample_rate_hz as f32 / avg_interval * 60.0).round() as u16;

    bpm_in_range(bpm).then_some(bpm)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 30;

    /// Clean sinusoidal pulse at `freq_hz`, `seconds` long, on a 128 baseline.
    fn sine_signal(freq_hz: f32, seconds: u32) -> Vec<f32> {
        (0..RATE * seconds)
            .map(|i| {
                let t = i as f32 / RATE as f32;
                128.0 + 20.0 * (2.0 * std::f32::consts::PI * freq_hz * t).sin()
            })
            .collect()
    }

    #[test]
    fn test_finger_present_table() {
        let cfg = PresenceConfig::default();

        // At the red threshold exactly: not present
        assert!(!finger_present(80.0, 10.0, &cfg));
        // Bright red, ratio 1.5 > 1.2: present
        assert!(finger_present(150.0, 100.0, &cfg));
        // Bright enough but ratio 1.11 < 1.2: not present
        assert!(!finger_present(100.0, 90.0, &cfg));
    }

    #[test]
    fn test_detect_insufficient_data() {
        let detector = PeakDetector::new(PeakConfig::new(RATE));
        let short = sine_signal(1.2, 3); // 3s < 4s minimum

        assert!(detector.detect(&short).is_empty());
    }

    #[test]
    fn test_detect_is_deterministic() {
        let detector = PeakDetector::new(PeakConfig::new(RATE));
        let signal = sine_signal(1.2, 10);

        assert_eq!(detector.detect(&signal), detector.detect(&signal));
    }

    #[test]
    fn test_detect_respects_min_distance() {
        let detector = PeakDetector::new(PeakConfig::new(RATE));
        // Fundamental plus a strong second harmonic that would double-count
        let signal: Vec<f32> = (0..RATE * 10)
            .map(|i| {
                let t = i as f32 / RATE as f32;
                let w = 2.0 * std::f32::consts::PI * 1.2 * t;
                128.0 + 20.0 * w.sin() + 12.0 * (2.0 * w).sin()
            })
            .collect();

        let peaks = detector.detect(&signal);
        let min_distance = PeakConfig::new(RATE).min_peak_distance();
        for pair in peaks.windows(2) {
            assert!(pair[1] - pair[0] >= min_distance);
        }
    }

    #[test]
    fn test_sine_converges_to_expected_bpm() {
        let detector = PeakDetector::new(PeakConfig::new(RATE));

        for (freq_hz, expected_bpm) in [(1.0f32, 60i32), (1.2, 72), (2.0, 120)] {
            let signal = sine_signal(freq_hz, 10);
            let peaks = detector.detect(&signal);
            let bpm = estimate_bpm(&peaks, RATE).expect("clean sine should estimate");

            assert!(
                (i32::from(bpm) - expected_bpm).abs() <= 2,
                "freq {freq_hz} Hz: got {bpm}, expected ~{expected_bpm}"
            );
        }
    }

    #[test]
    fn test_estimate_requires_three_peaks() {
        assert_eq!(estimate_bpm(&[], RATE), None);
        assert_eq!(estimate_bpm(&[10], RATE), None);
        assert_eq!(estimate_bpm(&[10, 35], RATE), None);
    }

    #[test]
    fn test_estimate_rejects_outlier_interval() {
        // Intervals 10, 10, 3, 10: the 3 is arrhythmic noise
        let peaks = [0, 10, 20, 23, 33];
        assert_eq!(estimate_bpm(&peaks, RATE), Some(180));
    }

    #[test]
    fn test_estimate_requires_two_surviving_intervals() {
        // Intervals 3 and 20: median 20, only one interval survives the band
        let peaks = [0, 3, 23];
        assert_eq!(estimate_bpm(&peaks, RATE), None);
    }

    #[test]
    fn test_estimate_rejects_out_of_range_bpm() {
        // Interval 5 at 30 Hz is 360 BPM
        let peaks = [0, 5, 10, 15];
        assert_eq!(estimate_bpm(&peaks, RATE), None);

        // Interval 50 at 30 Hz is 36 BPM, below the floor
        let peaks = [0, 50, 100, 150];
        assert_eq!(estimate_bpm(&peaks, RATE), None);
    }
}
