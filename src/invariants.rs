//! Debug assertion macros for ring buffer invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is
//! zero overhead in release builds.

/// Assert that a cursor is a valid buffer index.
///
/// **Invariant**: `0 <= cursor < capacity`
///
/// Used after every modular cursor advance.
macro_rules! debug_assert_cursor_in_range {
    ($name:literal, $cursor:expr, $capacity:expr) => {
        debug_assert!(
            $cursor < $capacity,
            "cursor invariant violated: {} = {} out of range for capacity {}",
            $name,
            $cursor,
            $capacity
        )
    };
}

/// Assert that a per-reader space computation is bounded by capacity.
///
/// **Invariant**: `space(r) <= capacity`
macro_rules! debug_assert_space_bounded {
    ($space:expr, $capacity:expr) => {
        debug_assert!(
            $space <= $capacity,
            "space invariant violated: {} exceeds capacity {}",
            $space,
            $capacity
        )
    };
}

/// Assert that a notification span is non-empty and fits the buffer.
///
/// **Invariant**: `1 <= span <= capacity`; readers are never notified with
/// zero bytes.
macro_rules! debug_assert_notify_span {
    ($span:expr, $capacity:expr) => {
        debug_assert!(
            $span >= 1 && $span <= $capacity,
            "notify span invariant violated: span {} for capacity {}",
            $span,
            $capacity
        )
    };
}

/// Assert that the ongoing-writes counter is positive before a writer
/// retires its reservation.
///
/// **Invariant**: every publish-phase decrement is matched by a
/// reservation-phase increment.
macro_rules! debug_assert_writer_accounted {
    ($ongoing:expr) => {
        debug_assert!(
            $ongoing > 0,
            "writer accounting violated: publish without reservation (ongoing_writes = {})",
            $ongoing
        )
    };
}

pub(crate) use debug_assert_cursor_in_range;
pub(crate) use debug_assert_notify_span;
pub(crate) use debug_assert_space_bounded;
pub(crate) use debug_assert_writer_accounted;
