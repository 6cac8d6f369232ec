//! Vitalscan Core - pure signal analysis and wire decoding
//!
//! This crate holds the deterministic parts of the Vitalscan biometric
//! pipelines: PPG signal analysis for the optical pulse path and wire-format
//! decoding for the BLE oximeter path. Everything here is synchronous and
//! free of I/O, so it is testable against literal byte arrays and sample
//! series. The async sessions that drive these algorithms live in
//! `vitalscan-native`.
//!
//! # Modules
//!
//! - [`types`]: Samples, buffers, readings, and physiological bounds
//! - [`ppg`]: Finger presence, peak detection, and BPM estimation
//! - [`smoothing`]: Rolling mean/median smoothers for published readings
//! - [`wire`]: Oximeter wire-format decoders and the probe priority table
//!
//! # Example
//!
//! ```rust
//! use vitalscan_core::ppg::{estimate_bpm, PeakConfig, PeakDetector};
//!
//! let detector = PeakDetector::new(PeakConfig::new(30));
//! let signal: Vec<f32> = (0..300)
//!     .map(|i| {
//!         let t = i as f32 / 30.0;
//!         128.0 + 20.0 * (2.0 * std::f32::consts::PI * 1.2 * t).sin()
//!     })
//!     .collect();
//!
//! let peaks = detector.detect(&signal);
//! let bpm = estimate_bpm(&peaks, 30).unwrap();
//! assert!((70..=74).contains(&bpm));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]

pub mod ppg;
pub mod smoothing;
pub mod types;
pub mod wire;

// Re-export commonly used types at crate root
pub use ppg::{estimate_bpm, finger_present, PeakConfig, PeakDetector, PresenceConfig};
pub use smoothing::{MeanSmoother, MedianSmoother, SMOOTHING_WINDOW};
pub use types::{
    CalibrationWindow, OximeterReading, ProtocolId, SampleBuffer, SignalSample, BPM_MAX, BPM_MIN,
    PULSE_RATE_MAX, PULSE_RATE_MIN, SPO2_MAX, SPO2_MIN,
};
pub use wire::{ProbeTarget, RawVitals, PROBE_ORDER};
