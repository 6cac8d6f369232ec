//! Vitalscan Native - async acquisition sessions
//!
//! This crate drives the pure algorithms in `vitalscan-core` against real
//! I/O: an optical frame source for the pulse pipeline and a BLE link for
//! the oximeter pipeline. Both pipelines publish their observable state on
//! tokio `watch` channels, so UIs and the CLI read the latest snapshot
//! without touching the acquisition path.
//!
//! # Modules
//!
//! - [`capture`]: Optical frame sources (simulated source included)
//! - [`acquisition`]: The optical pulse session
//! - [`oximeter`]: The BLE oximeter session and transport trait
//! - [`ble`]: btleplug transport (requires the `ble` feature)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod acquisition;
pub mod capture;
pub mod oximeter;

/// BLE transport module (requires the `ble` feature)
#[cfg(feature = "ble")]
pub mod ble;

// Re-export key types
pub use acquisition::{AcquisitionError, PulseConfig, PulseSession, PulseSnapshot};
pub use capture::{CaptureError, FrameSource, SimulatedPulseSource};
pub use oximeter::{
    ConnectionError, ConnectionState, OximeterSession, OximeterSnapshot, OximeterTransport,
};
