//! Rolling smoothers for published readings
//!
//! Both pipelines smooth their output over the last few accepted values,
//! but with different policies, and the difference is deliberate:
//!
//! - the optical pulse stream uses a **rolling mean**; estimates arrive
//!   already bounds-checked and a mean tracks gradual rate changes closely;
//! - the oximeter stream uses a **rolling median**; a single corrupted
//!   packet from a cheap device must not show up in the displayed value.
//!
//! Keep the two policies separate; merging them changes the displayed
//! behavior of one pipeline or the other and needs product sign-off.

use std::collections::VecDeque;

/// Number of recent values each smoother retains.
pub const SMOOTHING_WINDOW: usize = 5;

// ============================================================================
// Rolling Mean (optical pulse)
// ============================================================================

/// Rolling arithmetic mean over the last [`SMOOTHING_WINDOW`] values.
#[derive(Clone, Debug, Default)]
pub struct MeanSmoother {
    history: VecDeque<u16>,
}

impl MeanSmoother {
    /// Create an empty smoother.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a value and return the rounded mean of the current window.
    pub fn push(&mut self, value: u16) -> u16 {
        if self.history.len() == SMOOTHING_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(value);

        let sum: u32 = self.history.iter().map(|&v| u32::from(v)).sum();
        let mean = sum as f32 / self.history.len() as f32;
        mean.round() as u16
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Whether any values have been accepted since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

// ============================================================================
// Rolling Median (oximeter)
// ============================================================================

/// Rolling median over the last [`SMOOTHING_WINDOW`] values.
#[derive(Clone, Debug, Default)]
pub struct MedianSmoother {
    history: VecDeque<u16>,
}

impl MedianSmoother {
    /// Create an empty smoother.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a value and return the median of the current window.
    pub fn push(&mut self, value: u16) -> u16 {
        if self.history.len() == SMOOTHING_WINDOW {
            self.history.pop_front();
        }
        self.history.push_back(value);

        let mut sorted: Vec<u16> = self.history.iter().copied().collect();
        sorted.sort_unstable();
        sorted[sorted.len() / 2]
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.history.clear();
    }

    /// Whether any values have been accepted since the last reset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_tracks_average() {
        let mut s = MeanSmoother::new();
        assert_eq!(s.push(60), 60);
        assert_eq!(s.push(70), 65);
        assert_eq!(s.push(80), 70);
    }

    #[test]
    fn test_mean_window_evicts_oldest() {
        let mut s = MeanSmoother::new();
        for v in [10, 10, 10, 10, 10] {
            s.push(v);
        }
        // The first 10 falls out; window is [10,10,10,10,60]
        assert_eq!(s.push(60), 20);
    }

    #[test]
    fn test_median_ignores_single_spike() {
        let mut s = MedianSmoother::new();
        s.push(98);
        s.push(97);
        s.push(98);
        // One corrupted packet decoded as a plausible-but-wrong value
        assert_eq!(s.push(55), 97);
        // Stream self-heals on the next valid value
        assert_eq!(s.push(98), 98);
    }

    #[test]
    fn test_mean_does_not_ignore_spike() {
        // The policies are genuinely different: a mean shifts on the spike
        let mut mean = MeanSmoother::new();
        mean.push(98);
        mean.push(98);
        mean.push(98);
        assert!(mean.push(55) < 95);
    }

    #[test]
    fn test_reset_forgets_history() {
        let mut s = MedianSmoother::new();
        s.push(90);
        s.push(91);
        assert!(!s.is_empty());

        s.reset();
        assert!(s.is_empty());
        assert_eq!(s.push(70), 70);
    }
}
