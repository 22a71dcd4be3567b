use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for observing ring buffer activity.
///
/// Uses atomic counters with `Relaxed` ordering since these are purely
/// statistical - no control flow depends on exact values, and eventual
/// visibility is acceptable for observability.
#[derive(Debug, Default)]
pub struct Metrics {
    writes: AtomicU64,
    bytes_written: AtomicU64,
    bytes_truncated: AtomicU64,
    publications: AtomicU64,
    notifications: AtomicU64,
    overrun_clears: AtomicU64,
    aborts_signaled: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed write call: bytes accepted and bytes dropped
    /// by truncation.
    #[inline]
    pub fn record_write(&self, written: u64, truncated: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(written, Ordering::Relaxed);
        self.bytes_truncated.fetch_add(truncated, Ordering::Relaxed);
    }

    /// Record a publication (the last writer of a concurrent batch).
    #[inline]
    pub fn record_publication(&self, notified_readers: u64) {
        self.publications.fetch_add(1, Ordering::Relaxed);
        self.notifications
            .fetch_add(notified_readers, Ordering::Relaxed);
    }

    /// Record a reader re-notification outside a publication.
    #[inline]
    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one overrun-clearing pass over a reader.
    #[inline]
    pub fn record_overrun_clear(&self) {
        self.overrun_clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an abort callback being scheduled.
    #[inline]
    pub fn record_abort(&self) {
        self.aborts_signaled.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of current metrics values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            bytes_truncated: self.bytes_truncated.load(Ordering::Relaxed),
            publications: self.publications.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            overrun_clears: self.overrun_clears.load(Ordering::Relaxed),
            aborts_signaled: self.aborts_signaled.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of metrics values.
///
/// Plain data (Copy, Clone) for easy aggregation and display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub writes: u64,
    pub bytes_written: u64,
    pub bytes_truncated: u64,
    pub publications: u64,
    pub notifications: u64,
    pub overrun_clears: u64,
    pub aborts_signaled: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_accumulate() {
        let m = Metrics::new();
        m.record_write(10, 0);
        m.record_write(5, 3);
        m.record_publication(2);
        m.record_notification();
        m.record_abort();

        let snap = m.snapshot();
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.bytes_written, 15);
        assert_eq!(snap.bytes_truncated, 3);
        assert_eq!(snap.publications, 1);
        assert_eq!(snap.notifications, 3);
        assert_eq!(snap.aborts_signaled, 1);
    }
}
