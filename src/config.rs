/// Configuration for a multiple-reader ring buffer.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Buffer capacity in bytes. Any value >= 1; capacities are not
    /// required to be powers of two.
    pub capacity: usize,
    /// Enable metrics collection (slight overhead on the write path).
    pub enable_metrics: bool,
}

/// Upper bound on readers per ring; the publish path tracks pending
/// notifications in a single machine word.
pub const MAX_READERS: usize = 64;

impl Config {
    /// Creates a new configuration with the given capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub const fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "capacity must be at least 1");
        Self {
            capacity,
            enable_metrics: false,
        }
    }

    /// Enables or disables metrics collection.
    #[must_use]
    pub const fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 4096,
            enable_metrics: false,
        }
    }
}

/// Small ring suited to line-buffered console retargeting.
pub const CONSOLE_CONFIG: Config = Config::new(1024);

/// Larger ring for bursty writers feeding slow drains.
pub const BULK_CONFIG: Config = Config::new(64 * 1024);
