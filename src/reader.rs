//! Reader: one consumer of the shared byte stream.
//!
//! A reader is a value object handed to [`Mrrb::new`](crate::Mrrb::new). It
//! carries the consumer's identity, its overrun policy, its notify/abort
//! callbacks, and the per-reader cursors the ring uses to track which bytes
//! the consumer still owes. All mutable fields are atomics: they are only
//! written inside the ring's critical section, but the advisory space
//! queries read them without taking the lock.

use crate::error::MrrbError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};

/// Opaque, caller-chosen reader identity. Must be unique within one ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReaderId(pub u64);

/// What happens to a reader when a write needs bytes the reader still owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrunPolicy {
    /// Never lose bytes: the write is truncated to what fits around this
    /// reader.
    Blocking,
    /// The reader is disabled and stops constraining writers; it loses all
    /// bytes it has not completed.
    Disable,
    /// The reader's in-flight notify is aborted and just enough of its
    /// oldest owed bytes are skipped to make room. Requires an abort
    /// callback.
    Skip,
}

/// Reader lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderState {
    /// Not participating; contributes no reclamation constraint.
    Disabled = 0,
    /// Enabled, nothing outstanding.
    Idle = 1,
    /// A notify is outstanding with the consumer.
    Active = 2,
    /// An overrun cancelled the outstanding notify; waiting for
    /// `abort_complete`.
    Aborting = 3,
    /// Abort acknowledged while a write was still in flight; the next
    /// publication reactivates the reader.
    Aborted = 4,
    /// Disabled while a callback was in flight; waiting for
    /// `abort_complete` before settling into `Disabled`.
    Disabling = 5,
}

impl ReaderState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Disabled,
            1 => Self::Idle,
            2 => Self::Active,
            3 => Self::Aborting,
            4 => Self::Aborted,
            5 => Self::Disabling,
            _ => {
                debug_assert!(false, "invalid reader state encoding: {value}");
                Self::Disabled
            }
        }
    }

    /// `Disabled` and `Disabling` readers neither constrain reclamation nor
    /// receive notifications.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled | Self::Disabling)
    }
}

/// Control surface callbacks use to reenter the ring.
///
/// Passed into every notify/abort invocation so consumers can complete,
/// abort, or query without naming the concrete port type. Implemented by
/// [`Mrrb`](crate::Mrrb) for every port.
pub trait MrrbControl: Send + Sync {
    /// Signal that the slice from the most recent notify has been consumed.
    fn read_complete(&self, id: ReaderId);
    /// Acknowledge an abort signal.
    fn abort_complete(&self, id: ReaderId);
    /// Bytes a writer could currently append without any policy firing.
    fn remaining_space(&self) -> usize;
    /// Bytes a writer could append if every non-blocking reader is cleared.
    fn overwritable_space(&self) -> usize;
    /// True if no enabled reader holds any byte.
    fn is_empty(&self) -> bool;
    /// True if some enabled reader owes the entire buffer.
    fn is_full(&self) -> bool;
}

/// New-data callback: `(ring, reader id, slice into the shared buffer)`.
///
/// The slice stays owned by the consumer until it calls
/// [`MrrbControl::read_complete`] (or the reader is disabled). Callbacks
/// run outside the ring's critical section and may reenter it.
pub type NotifyFn = Box<dyn Fn(&dyn MrrbControl, ReaderId, &[u8]) + Send + Sync>;

/// Abort callback: the outstanding notify is cancelled; the consumer must
/// eventually call [`MrrbControl::abort_complete`].
pub type AbortFn = Box<dyn Fn(&dyn MrrbControl, ReaderId) + Send + Sync>;

/// One consumer of the ring's byte stream.
pub struct Reader {
    pub(crate) id: ReaderId,
    pub(crate) policy: OverrunPolicy,
    pub(crate) notify: NotifyFn,
    pub(crate) abort: Option<AbortFn>,
    pub(crate) state: AtomicU8,
    /// End of the slice most recently handed to the callback.
    pub(crate) read_ptr: AtomicUsize,
    /// First byte the reader still owes to complete.
    pub(crate) read_complete_ptr: AtomicUsize,
    /// Disambiguates `read_complete_ptr == reservation_ptr`: equal cursors
    /// mean "owes everything" when set, "owes nothing" when clear.
    pub(crate) is_full: AtomicBool,
}

impl Reader {
    /// Creates a reader without an abort callback.
    ///
    /// Fails for [`OverrunPolicy::Skip`], which cannot cancel an in-flight
    /// notify without one; use [`Reader::with_abort`] instead.
    pub fn new(id: ReaderId, policy: OverrunPolicy, notify: NotifyFn) -> Result<Self, MrrbError> {
        if policy == OverrunPolicy::Skip {
            return Err(MrrbError::SkipRequiresAbort);
        }
        Ok(Self::build(id, policy, notify, None))
    }

    /// Creates a reader with an abort callback. Valid for every policy.
    pub fn with_abort(
        id: ReaderId,
        policy: OverrunPolicy,
        notify: NotifyFn,
        abort: AbortFn,
    ) -> Self {
        Self::build(id, policy, notify, Some(abort))
    }

    fn build(id: ReaderId, policy: OverrunPolicy, notify: NotifyFn, abort: Option<AbortFn>) -> Self {
        Self {
            id,
            policy,
            notify,
            abort,
            state: AtomicU8::new(ReaderState::Idle as u8),
            read_ptr: AtomicUsize::new(0),
            read_complete_ptr: AtomicUsize::new(0),
            is_full: AtomicBool::new(false),
        }
    }

    /// The reader's identity.
    #[inline]
    pub fn id(&self) -> ReaderId {
        self.id
    }

    /// The reader's overrun policy.
    #[inline]
    pub fn policy(&self) -> OverrunPolicy {
        self.policy
    }

    /// Current lifecycle state (advisory under concurrent activity).
    #[inline]
    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_state(&self, state: ReaderState) {
        self.state.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub(crate) fn saturated(&self) -> bool {
        self.is_full.load(Ordering::Relaxed)
    }

    pub(crate) fn has_abort(&self) -> bool {
        self.abort.is_some()
    }

    /// Seat both cursors on `position` and clear saturation. Runs when the
    /// reader is (re-)enabled.
    pub(crate) fn seat(&self, position: usize) {
        self.read_ptr.store(position, Ordering::Relaxed);
        self.read_complete_ptr.store(position, Ordering::Relaxed);
        self.is_full.store(false, Ordering::Relaxed);
        self.set_state(ReaderState::Idle);
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("state", &self.state())
            .field("read_ptr", &self.read_ptr.load(Ordering::Relaxed))
            .field(
                "read_complete_ptr",
                &self.read_complete_ptr.load(Ordering::Relaxed),
            )
            .field("is_full", &self.saturated())
            .field("has_abort", &self.abort.is_some())
            .finish()
    }
}
