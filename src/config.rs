//! Configuration for the overlay filesystem and its archive cache.

use std::time::Duration;

/// Default number of archives kept open.
pub const DEFAULT_CAPACITY: usize = 20;

/// Default interval between idle sweeps (60 seconds).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Runtime configuration for [`OverlayFs`](crate::OverlayFs).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use zipfolder::OverlayConfig;
///
/// let config = OverlayConfig::default()
///     .with_capacity(8)
///     .with_sweep_interval(Duration::from_secs(5));
/// assert_eq!(config.capacity, 8);
/// ```
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Maximum number of open archive handles (at least 1).
    pub capacity: usize,
    /// Interval of the background sweep that closes unused archives.
    pub sweep_interval: Duration,
    /// Serialize all reads within one archive: a second `open` waits until
    /// the previous entry reader is closed.
    pub exclusive_reads: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            exclusive_reads: false,
        }
    }
}

impl OverlayConfig {
    /// Sets the cache capacity; values below 1 are raised to 1.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the idle sweep interval; a zero interval is raised to 1ms.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Enables one-reader-at-a-time access per archive.
    pub fn exclusive_reads(mut self, exclusive: bool) -> Self {
        self.exclusive_reads = exclusive;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OverlayConfig::default();
        assert_eq!(config.capacity, 20);
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert!(!config.exclusive_reads);
    }

    #[test]
    fn test_builder_clamps() {
        let config = OverlayConfig::default()
            .with_capacity(0)
            .with_sweep_interval(Duration::ZERO)
            .exclusive_reads(true);
        assert_eq!(config.capacity, 1);
        assert_eq!(config.sweep_interval, Duration::from_millis(1));
        assert!(config.exclusive_reads);
    }
}
