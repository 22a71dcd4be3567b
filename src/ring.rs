//! Multiple-reader ring buffer core.
//!
//! One contiguous byte buffer, any number of concurrent writers, a fixed
//! set of readers that each independently drain the same stream. Writes go
//! through three phases:
//!
//! 1. **Reservation** (under the port lock): truncate to the space every
//!    enabled reader can spare (clearing overrun readers per policy),
//!    claim a slice by advancing `reservation_ptr`, bump `ongoing_writes`.
//! 2. **Copy** (lockless): memcpy into the claimed slice, wrapping at the
//!    buffer end. Readers cannot observe these bytes yet because they
//!    never consult `reservation_ptr`.
//! 3. **Publication** (under the lock): the last writer of a concurrent
//!    batch advances `write_ptr` and collects which readers to notify.
//!    Callbacks run strictly after the lock is released; they may reenter
//!    the ring synchronously.
//!
//! A byte is reclaimed only once every enabled reader that was shown it has
//! completed it, unless a reader's overrun policy explicitly permits
//! skipping.

use crate::config::{Config, MAX_READERS};
use crate::error::MrrbError;
use crate::invariants::{
    debug_assert_cursor_in_range, debug_assert_notify_span, debug_assert_space_bounded,
    debug_assert_writer_accounted,
};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::port::{HostedPort, Port};
use crate::reader::{MrrbControl, OverrunPolicy, Reader, ReaderId, ReaderState};
use std::cell::UnsafeCell;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Multiple-reader ring buffer.
///
/// All public operations take `&self`; mutation is serialized by the port's
/// critical section, and callbacks always run outside it.
pub struct Mrrb<P: Port = HostedPort> {
    port: P,
    config: Config,
    buffer: UnsafeCell<Box<[u8]>>,
    readers: Box<[Reader]>,
    /// First byte not yet published to readers. Trails `reservation_ptr`.
    write_ptr: AtomicUsize,
    /// First byte not yet reserved by any in-flight write.
    reservation_ptr: AtomicUsize,
    /// Writers currently between reservation and publication. The last one
    /// to retire publishes for the whole batch.
    ongoing_writes: AtomicUsize,
    metrics: Metrics,
}

impl<P: Port> std::fmt::Debug for Mrrb<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mrrb")
            .field("config", &self.config)
            .field("readers", &self.readers.len())
            .finish()
    }
}

// SAFETY: every mutable field is an atomic or is only touched according to
// the reservation protocol: the buffer region `[start, start + m)` is
// written by exactly one writer between its reservation and the batch
// publication, and is only handed to readers as shared slices afterwards.
unsafe impl<P: Port> Send for Mrrb<P> {}
unsafe impl<P: Port> Sync for Mrrb<P> {}

impl<P: Port> Mrrb<P> {
    /// Creates a ring buffer over `readers`.
    ///
    /// Readers are seated at the start of an empty buffer in the `Idle`
    /// state. The reader set is fixed for the lifetime of the ring;
    /// individual readers are turned on and off with
    /// [`reader_enable`](Self::reader_enable) /
    /// [`reader_disable`](Self::reader_disable).
    pub fn new(config: Config, readers: Vec<Reader>) -> Result<Self, MrrbError> {
        if config.capacity == 0 {
            return Err(MrrbError::ZeroCapacity);
        }
        if readers.is_empty() {
            return Err(MrrbError::NoReaders);
        }
        if readers.len() > MAX_READERS {
            return Err(MrrbError::TooManyReaders { max: MAX_READERS });
        }
        for (i, reader) in readers.iter().enumerate() {
            if readers[..i].iter().any(|other| other.id == reader.id) {
                return Err(MrrbError::DuplicateReader(reader.id));
            }
        }

        let port = P::init()?;
        for reader in &readers {
            reader.seat(0);
        }

        Ok(Self {
            port,
            config,
            buffer: UnsafeCell::new(vec![0u8; config.capacity].into_boxed_slice()),
            readers: readers.into_boxed_slice(),
            write_ptr: AtomicUsize::new(0),
            reservation_ptr: AtomicUsize::new(0),
            ongoing_writes: AtomicUsize::new(0),
            metrics: Metrics::new(),
        })
    }

    /// Tears the ring down, propagating port destruction failures.
    ///
    /// Dropping the ring without calling this is fine; drop ignores port
    /// teardown errors.
    pub fn deinit(mut self) -> Result<(), MrrbError> {
        self.port.destroy().map_err(Into::into)
    }

    /// Buffer capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Metrics snapshot, all zeros unless `Config::enable_metrics` was set.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Current state of the reader registered under `id`, if any. Advisory
    /// under concurrent activity, like the space queries.
    pub fn reader_state(&self, id: ReaderId) -> Option<ReaderState> {
        self.reader_index(id).map(|index| self.readers[index].state())
    }

    // ---------------------------------------------------------------------
    // WRITER API
    // ---------------------------------------------------------------------

    /// Appends up to `data.len()` bytes and returns the count actually
    /// accepted.
    ///
    /// The write is truncated to what fits around every enabled
    /// [`Blocking`](OverrunPolicy::Blocking) reader; `Disable` and `Skip`
    /// readers that cannot keep up are cleared according to their policy
    /// first. Zero-length writes return `Ok(0)` untouched, as do writes
    /// from interrupt context unless the `isr-write` feature is enabled.
    pub fn write(&self, data: &[u8]) -> Result<usize, MrrbError> {
        if data.is_empty() {
            return Ok(0);
        }
        if !cfg!(feature = "isr-write") && self.port.interrupt_active() {
            return Ok(0);
        }

        // Phase 1: reservation.
        let guard = self.port.lock()?;

        let mut remaining = self.remaining_space();
        let requested = data.len().min(self.config.capacity);
        let mut abort_mask = 0u64;
        if requested > remaining {
            abort_mask = self.clear_overruns(requested);
            remaining = self.remaining_space();
        }

        let write_len = data.len().min(remaining);
        if write_len == 0 {
            // Fully crowded out by blocking readers. Reserving zero bytes
            // and publishing would hand idle readers a stale span, so bail
            // before touching the cursors.
            self.port.unlock(guard)?;
            self.fire_aborts(abort_mask);
            if self.config.enable_metrics {
                self.metrics.record_write(0, data.len() as u64);
            }
            return Ok(0);
        }

        let start = self.reservation_ptr.load(Ordering::Relaxed);
        let new_reservation = self.wrap_add(start, write_len);
        self.reservation_ptr.store(new_reservation, Ordering::Relaxed);
        for reader in self.readers.iter() {
            if !reader.state().is_enabled() {
                continue;
            }
            let rcp = reader.read_complete_ptr.load(Ordering::Relaxed);
            reader.is_full.store(new_reservation == rcp, Ordering::Relaxed);
        }
        self.ongoing_writes.fetch_add(1, Ordering::Relaxed);

        self.port.unlock(guard)?;
        self.fire_aborts(abort_mask);

        // Phase 2: copy outside the lock.
        //
        // SAFETY: `[start, start + write_len)` (mod capacity) was reserved
        // above and belongs exclusively to this writer until publication.
        unsafe {
            self.copy_into(start, &data[..write_len]);
        }

        // Phase 3: publication by the last writer of the batch.
        let guard = self.port.lock()?;
        let ongoing = self.ongoing_writes.load(Ordering::Relaxed);
        debug_assert_writer_accounted!(ongoing);
        self.ongoing_writes.store(ongoing - 1, Ordering::Relaxed);

        if ongoing == 1 {
            let published = self.reservation_ptr.load(Ordering::Relaxed);
            let mut pending = 0u64;
            let mut spans = [(0usize, 0usize); MAX_READERS];

            for (i, reader) in self.readers.iter().enumerate() {
                if !matches!(reader.state(), ReaderState::Idle | ReaderState::Aborted) {
                    continue;
                }
                let rcp = reader.read_complete_ptr.load(Ordering::Relaxed);
                let span = self.continuous_span(rcp, published, reader.saturated());
                if span == 0 {
                    continue;
                }
                debug_assert_notify_span!(span, self.config.capacity);
                reader.read_ptr.store(self.wrap_add(rcp, span), Ordering::Relaxed);
                reader.set_state(ReaderState::Active);
                spans[i] = (rcp, span);
                pending |= 1 << i;
            }

            self.port.fence();
            self.write_ptr.store(published, Ordering::Release);
            self.port.unlock(guard)?;

            if self.config.enable_metrics {
                self.metrics.record_publication(u64::from(pending.count_ones()));
            }
            for (i, reader) in self.readers.iter().enumerate() {
                if pending & (1 << i) == 0 {
                    continue;
                }
                let (span_start, span_len) = spans[i];
                // SAFETY: the span was carved out of this reader's owed
                // region under the lock; writers cannot reclaim it until
                // the reader completes.
                let bytes = unsafe { self.readable_slice(span_start, span_len) };
                (reader.notify)(self, reader.id, bytes);
            }
        } else {
            self.port.unlock(guard)?;
        }

        if self.config.enable_metrics {
            self.metrics
                .record_write(write_len as u64, (data.len() - write_len) as u64);
        }
        Ok(write_len)
    }

    // ---------------------------------------------------------------------
    // READER COMPLETION API
    // ---------------------------------------------------------------------

    /// Signals that the reader has consumed the slice from its most recent
    /// notify.
    ///
    /// If more published bytes are pending the reader is re-notified
    /// synchronously; otherwise it returns to `Idle`. Ignored for unknown
    /// ids and for readers in any state other than `Active` (including
    /// stale completions racing a disable or an abort).
    pub fn read_complete(&self, id: ReaderId) {
        let Some(index) = self.reader_index(id) else {
            return;
        };
        let Ok(guard) = self.port.lock() else {
            return;
        };

        let reader = &self.readers[index];
        let mut renotify = None;
        if reader.state() == ReaderState::Active {
            reader.is_full.store(false, Ordering::Relaxed);
            let read_ptr = reader.read_ptr.load(Ordering::Relaxed);
            reader.read_complete_ptr.store(read_ptr, Ordering::Relaxed);

            let write_ptr = self.write_ptr.load(Ordering::Acquire);
            let span = if read_ptr > write_ptr {
                // Published data wraps; deliver the stretch to the buffer
                // end first.
                self.config.capacity - read_ptr
            } else {
                write_ptr - read_ptr
            };
            if span > 0 {
                debug_assert_notify_span!(span, self.config.capacity);
                reader.read_ptr.store(self.wrap_add(read_ptr, span), Ordering::Relaxed);
                renotify = Some((read_ptr, span));
            } else {
                reader.set_state(ReaderState::Idle);
            }
        }

        if self.port.unlock(guard).is_err() {
            return;
        }
        if let Some((span_start, span_len)) = renotify {
            if self.config.enable_metrics {
                self.metrics.record_notification();
            }
            // SAFETY: carved from the reader's owed region under the lock.
            let bytes = unsafe { self.readable_slice(span_start, span_len) };
            (reader.notify)(self, reader.id, bytes);
        }
    }

    /// Acknowledges an abort signal.
    ///
    /// `Disabling` readers settle into `Disabled`. `Aborting` readers
    /// resume immediately when published data is pending and no write is in
    /// flight; otherwise they park in `Aborted` until the next publication.
    /// Ignored for unknown ids and other states.
    pub fn abort_complete(&self, id: ReaderId) {
        let Some(index) = self.reader_index(id) else {
            return;
        };
        let Ok(guard) = self.port.lock() else {
            return;
        };

        let reader = &self.readers[index];
        let mut renotify = None;
        match reader.state() {
            ReaderState::Disabling => reader.set_state(ReaderState::Disabled),
            ReaderState::Aborting => {
                if self.ongoing_writes.load(Ordering::Relaxed) == 0 {
                    let rcp = reader.read_complete_ptr.load(Ordering::Relaxed);
                    let write_ptr = self.write_ptr.load(Ordering::Acquire);
                    let span = self.continuous_span(rcp, write_ptr, reader.saturated());
                    if span > 0 {
                        debug_assert_notify_span!(span, self.config.capacity);
                        reader.read_ptr.store(self.wrap_add(rcp, span), Ordering::Relaxed);
                        reader.set_state(ReaderState::Active);
                        renotify = Some((rcp, span));
                    } else {
                        reader.set_state(ReaderState::Aborted);
                    }
                } else {
                    // A writer is mid-flight; let its publication restart
                    // this reader so the notify merges with the new bytes.
                    reader.set_state(ReaderState::Aborted);
                }
            }
            _ => {}
        }

        if self.port.unlock(guard).is_err() {
            return;
        }
        if let Some((span_start, span_len)) = renotify {
            if self.config.enable_metrics {
                self.metrics.record_notification();
            }
            // SAFETY: carved from the reader's owed region under the lock.
            let bytes = unsafe { self.readable_slice(span_start, span_len) };
            (reader.notify)(self, reader.id, bytes);
        }
    }

    // ---------------------------------------------------------------------
    // READER LIFECYCLE
    // ---------------------------------------------------------------------

    /// Enables a reader, seating its cursors on the current reservation
    /// cursor. Bytes written while the reader was disabled are never
    /// delivered to it. Re-enabling an enabled reader re-seats it the same
    /// way.
    pub fn reader_enable(&self, id: ReaderId) -> Result<(), MrrbError> {
        let index = self.reader_index(id).ok_or(MrrbError::UnknownReader(id))?;
        let guard = self.port.lock()?;
        let position = self.reservation_ptr.load(Ordering::Relaxed);
        self.readers[index].seat(position);
        self.port.unlock(guard)?;
        Ok(())
    }

    /// Disables a reader. It immediately stops constraining writers.
    ///
    /// If a notify is in flight and the reader has an abort callback, the
    /// reader passes through `Disabling` and the abort is signaled so the
    /// consumer can stop referencing the slice; otherwise it drops straight
    /// to `Disabled`.
    pub fn reader_disable(&self, id: ReaderId) -> Result<(), MrrbError> {
        let index = self.reader_index(id).ok_or(MrrbError::UnknownReader(id))?;
        let guard = self.port.lock()?;

        let reader = &self.readers[index];
        let mut fire_abort = false;
        match reader.state() {
            ReaderState::Active => {
                if reader.has_abort() {
                    reader.set_state(ReaderState::Disabling);
                    fire_abort = true;
                } else {
                    reader.set_state(ReaderState::Disabled);
                }
            }
            // An abort is already outstanding; it resolves to Disabled
            // through abort_complete.
            ReaderState::Aborting => reader.set_state(ReaderState::Disabling),
            ReaderState::Disabling => {}
            _ => reader.set_state(ReaderState::Disabled),
        }

        self.port.unlock(guard)?;
        if fire_abort {
            if self.config.enable_metrics {
                self.metrics.record_abort();
            }
            if let Some(abort) = &reader.abort {
                abort(self, reader.id);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // SPACE QUERIES (advisory under concurrent activity)
    // ---------------------------------------------------------------------

    /// Bytes a write could append right now without any policy firing:
    /// the minimum space over all readers.
    pub fn remaining_space(&self) -> usize {
        let mut remaining = self.config.capacity;
        for reader in self.readers.iter() {
            remaining = remaining.min(self.reader_space(reader));
        }
        remaining
    }

    /// Bytes a write could append if every `Disable`/`Skip` reader were
    /// cleared: only `Blocking` readers constrain this bound.
    pub fn overwritable_space(&self) -> usize {
        let mut overwritable = self.config.capacity;
        for reader in self.readers.iter() {
            if reader.policy == OverrunPolicy::Blocking && reader.state().is_enabled() {
                overwritable = overwritable.min(self.reader_space(reader));
            }
        }
        overwritable
    }

    /// True when no enabled reader holds any byte.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining_space() == self.config.capacity
    }

    /// True when some enabled reader owes the entire buffer.
    pub fn is_full(&self) -> bool {
        self.readers
            .iter()
            .any(|reader| reader.state().is_enabled() && reader.saturated())
    }

    // ---------------------------------------------------------------------
    // INTERNALS
    // ---------------------------------------------------------------------

    /// Advances `index` by `delta` modulo the capacity. `delta` never
    /// exceeds the capacity, so one conditional subtraction suffices.
    #[inline]
    fn wrap_add(&self, index: usize, delta: usize) -> usize {
        debug_assert!(delta <= self.config.capacity);
        let sum = index + delta;
        let wrapped = if sum >= self.config.capacity {
            sum - self.config.capacity
        } else {
            sum
        };
        debug_assert_cursor_in_range!("cursor", wrapped, self.config.capacity);
        wrapped
    }

    /// Space one reader can spare: forward distance from the reservation
    /// cursor to the reader's completion cursor. Disabled readers spare the
    /// whole buffer; saturated readers spare nothing.
    fn reader_space(&self, reader: &Reader) -> usize {
        if !reader.state().is_enabled() {
            return self.config.capacity;
        }
        if reader.saturated() {
            return 0;
        }
        let rcp = reader.read_complete_ptr.load(Ordering::Relaxed);
        let reservation = self.reservation_ptr.load(Ordering::Relaxed);
        let space = if rcp > reservation {
            rcp - reservation
        } else {
            self.config.capacity - (reservation - rcp)
        };
        debug_assert_space_bounded!(space, self.config.capacity);
        space
    }

    /// Largest prefix of `[from, until)` that does not wrap: clamped at the
    /// buffer end. `saturated` disambiguates equal cursors as
    /// everything-pending rather than nothing-pending.
    fn continuous_span(&self, from: usize, until: usize, saturated: bool) -> usize {
        if until > from {
            until - from
        } else if until < from || saturated {
            self.config.capacity - from
        } else {
            0
        }
    }

    /// Applies overrun policies to every enabled non-blocking reader whose
    /// space falls short of `requested`. Returns the set of readers whose
    /// abort callback must be fired after unlock.
    ///
    /// Runs under the port lock during reservation.
    fn clear_overruns(&self, requested: usize) -> u64 {
        let mut abort_mask = 0u64;
        for (i, reader) in self.readers.iter().enumerate() {
            let state = reader.state();
            if !state.is_enabled() {
                continue;
            }
            if self.reader_space(reader) >= requested {
                continue;
            }
            if reader.policy != OverrunPolicy::Blocking && self.config.enable_metrics {
                self.metrics.record_overrun_clear();
            }
            match reader.policy {
                // Blocking readers are never cleared; the writer truncates
                // around them instead.
                OverrunPolicy::Blocking => continue,
                OverrunPolicy::Disable => {
                    if reader.has_abort() && matches!(state, ReaderState::Active) {
                        reader.set_state(ReaderState::Disabling);
                        abort_mask |= 1 << i;
                    } else if matches!(state, ReaderState::Aborting) {
                        // An abort is already in flight; reuse it.
                        reader.set_state(ReaderState::Disabling);
                    } else {
                        reader.set_state(ReaderState::Disabled);
                    }
                }
                OverrunPolicy::Skip => {
                    if state == ReaderState::Active {
                        // The reader may finish the slice it was shown;
                        // everything up to read_ptr is forfeited to the
                        // writer.
                        reader.set_state(ReaderState::Aborting);
                        let read_ptr = reader.read_ptr.load(Ordering::Relaxed);
                        reader.read_complete_ptr.store(read_ptr, Ordering::Relaxed);
                        reader.is_full.store(false, Ordering::Relaxed);
                        abort_mask |= 1 << i;
                    }
                    let space = self.reader_space(reader);
                    if space < requested {
                        let deficit = requested - space;
                        let rcp = reader.read_complete_ptr.load(Ordering::Relaxed);
                        reader
                            .read_complete_ptr
                            .store(self.wrap_add(rcp, deficit), Ordering::Relaxed);
                        reader.is_full.store(false, Ordering::Relaxed);
                    }
                }
            }
        }
        abort_mask
    }

    /// Invokes the abort callbacks scheduled by an overrun-clearing pass.
    /// Must be called without the lock held.
    fn fire_aborts(&self, abort_mask: u64) {
        if abort_mask == 0 {
            return;
        }
        for (i, reader) in self.readers.iter().enumerate() {
            if abort_mask & (1 << i) == 0 {
                continue;
            }
            if self.config.enable_metrics {
                self.metrics.record_abort();
            }
            if let Some(abort) = &reader.abort {
                abort(self, reader.id);
            }
        }
    }

    fn reader_index(&self, id: ReaderId) -> Option<usize> {
        // Linear scan; reader counts are small and fixed.
        self.readers.iter().position(|reader| reader.id == id)
    }

    /// Copies `data` into the buffer starting at `start`, wrapping once at
    /// the buffer end.
    ///
    /// # Safety
    ///
    /// The destination region must be reserved to the caller: no reader may
    /// own any byte of `[start, start + data.len())` (mod capacity) and no
    /// other writer may have it reserved.
    unsafe fn copy_into(&self, start: usize, data: &[u8]) {
        let base = (*self.buffer.get()).as_mut_ptr();
        let first = data.len().min(self.config.capacity - start);
        ptr::copy_nonoverlapping(data.as_ptr(), base.add(start), first);
        let spill = data.len() - first;
        if spill > 0 {
            ptr::copy_nonoverlapping(data.as_ptr().add(first), base, spill);
        }
    }

    /// Borrows a contiguous published region as a slice.
    ///
    /// # Safety
    ///
    /// `[start, start + len)` must not wrap and must lie inside a region
    /// owed to a reader; writers never mutate owed bytes, so the shared
    /// borrow cannot alias a concurrent write.
    unsafe fn readable_slice(&self, start: usize, len: usize) -> &[u8] {
        debug_assert!(start + len <= self.config.capacity);
        let base = (*self.buffer.get()).as_ptr();
        slice::from_raw_parts(base.add(start), len)
    }
}

impl<P: Port> MrrbControl for Mrrb<P> {
    fn read_complete(&self, id: ReaderId) {
        Mrrb::read_complete(self, id);
    }

    fn abort_complete(&self, id: ReaderId) {
        Mrrb::abort_complete(self, id);
    }

    fn remaining_space(&self) -> usize {
        Mrrb::remaining_space(self)
    }

    fn overwritable_space(&self) -> usize {
        Mrrb::overwritable_space(self)
    }

    fn is_empty(&self) -> bool {
        Mrrb::is_empty(self)
    }

    fn is_full(&self) -> bool {
        Mrrb::is_full(self)
    }
}
