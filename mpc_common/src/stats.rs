//! Fixed-capacity rolling statistics.
//!
//! `RingStats<N>` keeps the last `N` samples (solve durations, tick periods,
//! law ages) and overwrites the oldest entry once full. Storage is inline, so
//! pushing a sample never allocates and is safe to call from the RT loop.

use heapless::HistoryBuffer;

/// Rolling window of the last `N` samples.
pub struct RingStats<const N: usize> {
    samples: HistoryBuffer<f64, N>,
    /// Total samples ever pushed (not bounded by `N`).
    total: u64,
}

impl<const N: usize> RingStats<N> {
    /// Create an empty window.
    pub const fn new() -> Self {
        Self {
            samples: HistoryBuffer::new(),
            total: 0,
        }
    }

    /// Insert a sample, evicting the oldest one when full.
    #[inline]
    pub fn push(&mut self, sample: f64) {
        self.samples.write(sample);
        self.total += 1;
    }

    /// Number of samples currently held (`<= N`).
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when no sample has been pushed yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.len() == 0
    }

    /// True once `N` samples have been pushed.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.samples.len() == N
    }

    /// Window capacity.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Total samples pushed since creation.
    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Arithmetic mean of the held samples.
    pub fn mean(&self) -> Option<f64> {
        let held = self.samples.as_slice();
        if held.is_empty() {
            return None;
        }
        Some(held.iter().sum::<f64>() / held.len() as f64)
    }

    /// Largest held sample.
    pub fn max(&self) -> Option<f64> {
        self.samples.as_slice().iter().copied().reduce(f64::max)
    }

    /// Most recently pushed sample.
    #[inline]
    pub fn last(&self) -> Option<f64> {
        self.samples.recent().copied()
    }

    /// Rate in Hz when the samples are periods in seconds.
    pub fn rate_hz(&self) -> Option<f64> {
        self.mean().filter(|m| *m > 0.0).map(|m| 1.0 / m)
    }

    /// Drop all held samples.
    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl<const N: usize> std::fmt::Debug for RingStats<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingStats")
            .field("len", &self.len())
            .field("capacity", &N)
            .field("mean", &self.mean())
            .field("total", &self.total)
            .finish()
    }
}

impl<const N: usize> Default for RingStats<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_window_has_no_mean() {
        let stats = RingStats::<4>::new();
        assert!(stats.is_empty());
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.last(), None);
        assert_eq!(stats.rate_hz(), None);
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let mut stats = RingStats::<3>::new();
        for s in [1.0, 2.0, 3.0, 10.0] {
            stats.push(s);
        }
        assert!(stats.is_full());
        assert_eq!(stats.len(), 3);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.last(), Some(10.0));
        assert!((stats.mean().unwrap() - 5.0).abs() < 1e-12);
        assert_eq!(stats.max(), Some(10.0));
    }

    #[test]
    fn rate_from_periods() {
        let mut stats = RingStats::<4>::new();
        stats.push(0.001);
        stats.push(0.001);
        assert!((stats.rate_hz().unwrap() - 1000.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn mean_of_partial_window(samples in prop::collection::vec(-1.0e3f64..1.0e3, 1..=20)) {
            let mut stats = RingStats::<20>::new();
            for s in &samples {
                stats.push(*s);
            }
            let expected = samples.iter().sum::<f64>() / samples.len() as f64;
            prop_assert!((stats.mean().unwrap() - expected).abs() < 1e-9);
        }

        #[test]
        fn mean_of_most_recent_n(samples in prop::collection::vec(-1.0e3f64..1.0e3, 21..80)) {
            let mut stats = RingStats::<20>::new();
            for s in &samples {
                stats.push(*s);
            }
            let recent = &samples[samples.len() - 20..];
            let expected = recent.iter().sum::<f64>() / 20.0;
            prop_assert_eq!(stats.len(), 20);
            prop_assert!((stats.mean().unwrap() - expected).abs() < 1e-9);
        }
    }
}
