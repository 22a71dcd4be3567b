//! Overrun policy semantics: blocking truncation, disable demotion, and
//! skip deficit arithmetic, alone and mixed on one ring.

use mrrb_rs::{
    Config, Mrrb, NotifyFn, OverrunPolicy, Reader, ReaderId, ReaderState,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Reader harness that records every notify and abort but completes only
/// when the test says so.
#[derive(Default)]
struct Harness {
    received: Mutex<Vec<Vec<u8>>>,
    aborts: AtomicUsize,
    /// Acknowledge aborts from inside the abort callback.
    ack_aborts: bool,
}

impl Harness {
    fn manual() -> Arc<Self> {
        Arc::new(Self {
            ack_aborts: true,
            ..Self::default()
        })
    }

    fn with_deferred_abort() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn notify_fn(state: &Arc<Self>) -> NotifyFn {
        let state = Arc::clone(state);
        Box::new(move |_, _, bytes| {
            state.received.lock().unwrap().push(bytes.to_vec());
        })
    }

    fn reader(state: &Arc<Self>, id: ReaderId, policy: OverrunPolicy) -> Reader {
        let abort_state = Arc::clone(state);
        Reader::with_abort(
            id,
            policy,
            Self::notify_fn(state),
            Box::new(move |ring, id| {
                abort_state.aborts.fetch_add(1, Ordering::SeqCst);
                if abort_state.ack_aborts {
                    ring.abort_complete(id);
                }
            }),
        )
    }

    fn aborts(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    fn flat_received(&self) -> Vec<u8> {
        self.received.lock().unwrap().concat()
    }

    fn chunks(&self) -> usize {
        self.received.lock().unwrap().len()
    }
}

fn bytes(range: std::ops::Range<u32>) -> Vec<u8> {
    range.map(|i| (i % 256) as u8).collect()
}

#[test]
fn test_mixed_policies_single_overrun() {
    let blocking = Harness::manual();
    let disable = Harness::manual();
    let skip = Harness::manual();

    let mrrb: Mrrb = Mrrb::new(
        Config::new(128),
        vec![
            Harness::reader(&blocking, ReaderId(0), OverrunPolicy::Blocking),
            Harness::reader(&disable, ReaderId(1), OverrunPolicy::Disable),
            Harness::reader(&skip, ReaderId(2), OverrunPolicy::Skip),
        ],
    )
    .unwrap();

    // First write fits; every reader is handed all 118 bytes and none
    // completes.
    assert_eq!(mrrb.write(&bytes(0..118)).unwrap(), 118);
    assert_eq!(mrrb.remaining_space(), 10);

    // Second write does not fit. The blocking reader truncates it to 10;
    // the other two are cleared by policy.
    assert_eq!(mrrb.write(&bytes(118..138)).unwrap(), 10);

    // Blocking: untouched, still owed everything, ring saturated for it.
    assert_eq!(mrrb.reader_state(ReaderId(0)), Some(ReaderState::Active));
    assert_eq!(blocking.aborts(), 0);
    assert!(mrrb.is_full());

    // Disable (abort acknowledged in the callback): demoted and inert.
    assert_eq!(mrrb.reader_state(ReaderId(1)), Some(ReaderState::Disabled));
    assert_eq!(disable.aborts(), 1);

    // Skip: aborted, then immediately re-activated by the publication with
    // the 10 accepted bytes. It was allowed to finish the 118 it was shown,
    // so nothing was actually skipped.
    assert_eq!(mrrb.reader_state(ReaderId(2)), Some(ReaderState::Active));
    assert_eq!(skip.aborts(), 1);
    assert_eq!(skip.flat_received(), bytes(0..128));

    // The blocking reader drains everything that was accepted: completing
    // the first slice re-notifies the wrapped remainder.
    mrrb.read_complete(ReaderId(0));
    mrrb.read_complete(ReaderId(0));
    assert_eq!(blocking.flat_received(), bytes(0..128));
    assert_eq!(mrrb.reader_state(ReaderId(0)), Some(ReaderState::Idle));
}

#[test]
fn test_disable_without_abort_goes_straight_to_disabled() {
    let watcher = Harness::manual();
    let disable_sink = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&disable_sink);
    let plain = Reader::new(
        ReaderId(1),
        OverrunPolicy::Disable,
        Box::new(move |_, _, bytes| sink.lock().unwrap().push(bytes.to_vec())),
    )
    .unwrap();

    let mrrb: Mrrb = Mrrb::new(
        Config::new(64),
        vec![Harness::reader(&watcher, ReaderId(0), OverrunPolicy::Blocking), plain],
    )
    .unwrap();

    assert_eq!(mrrb.write(&bytes(0..60)).unwrap(), 60);
    assert_eq!(mrrb.write(&bytes(60..80)).unwrap(), 4);
    assert_eq!(mrrb.reader_state(ReaderId(1)), Some(ReaderState::Disabled));
    // Disabled readers stop constraining space entirely.
    assert_eq!(mrrb.overwritable_space(), 0);
}

#[test]
fn test_disable_with_deferred_abort_parks_in_disabling() {
    let blocking = Harness::manual();
    let deferred = Harness::with_deferred_abort();

    let mrrb: Mrrb = Mrrb::new(
        Config::new(64),
        vec![
            Harness::reader(&blocking, ReaderId(0), OverrunPolicy::Blocking),
            Harness::reader(&deferred, ReaderId(1), OverrunPolicy::Disable),
        ],
    )
    .unwrap();

    assert_eq!(mrrb.write(&bytes(0..60)).unwrap(), 60);
    assert_eq!(mrrb.write(&bytes(60..80)).unwrap(), 4);

    // The abort is signaled but not yet acknowledged.
    assert_eq!(mrrb.reader_state(ReaderId(1)), Some(ReaderState::Disabling));
    assert_eq!(deferred.aborts(), 1);

    // Acknowledging settles the reader into Disabled.
    mrrb.abort_complete(ReaderId(1));
    assert_eq!(mrrb.reader_state(ReaderId(1)), Some(ReaderState::Disabled));

    // A completion racing the teardown is ignored.
    mrrb.read_complete(ReaderId(1));
    assert_eq!(mrrb.reader_state(ReaderId(1)), Some(ReaderState::Disabled));
}

#[test]
fn test_skip_deficit_skips_oldest_unhanded_bytes() {
    let skip = Harness::manual();
    let mrrb: Mrrb = Mrrb::new(
        Config::new(16),
        vec![Harness::reader(&skip, ReaderId(0), OverrunPolicy::Skip)],
    )
    .unwrap();

    // Handed [0, 8): the reader holds it without completing.
    assert_eq!(mrrb.write(&bytes(0..8)).unwrap(), 8);
    // Published but not handed: the reader now owes [0, 12).
    assert_eq!(mrrb.write(&bytes(8..12)).unwrap(), 4);
    assert_eq!(skip.chunks(), 1);

    // 14 more bytes need 14 free, but only 4 remain. Finishing the handed
    // slice frees 8; the 2-byte deficit is skipped from the oldest
    // unhanded bytes (values 8 and 9).
    assert_eq!(mrrb.write(&bytes(12..26)).unwrap(), 14);
    assert_eq!(skip.aborts(), 1);
    assert_eq!(mrrb.reader_state(ReaderId(0)), Some(ReaderState::Active));

    // Drain: everything except the two skipped bytes arrives, in order.
    mrrb.read_complete(ReaderId(0));
    mrrb.read_complete(ReaderId(0));
    let mut expected = bytes(0..8);
    expected.extend_from_slice(&bytes(10..26));
    assert_eq!(skip.flat_received(), expected);
    assert!(mrrb.is_empty());
    assert_eq!(mrrb.reader_state(ReaderId(0)), Some(ReaderState::Idle));
}

#[test]
fn test_skip_with_full_buffer_request() {
    let skip = Harness::manual();
    let mrrb: Mrrb = Mrrb::new(
        Config::new(16),
        vec![Harness::reader(&skip, ReaderId(0), OverrunPolicy::Skip)],
    )
    .unwrap();

    // Saturate: the reader owes the entire buffer.
    assert_eq!(mrrb.write(&bytes(0..16)).unwrap(), 16);
    assert!(mrrb.is_full());
    assert_eq!(mrrb.remaining_space(), 0);

    // A full-buffer write while saturated: the old content is forfeited
    // wholesale and the write lands intact.
    assert_eq!(mrrb.write(&bytes(16..32)).unwrap(), 16);
    assert_eq!(skip.aborts(), 1);
    assert!(mrrb.is_full());

    mrrb.read_complete(ReaderId(0));
    let received = skip.flat_received();
    assert_eq!(&received[received.len() - 16..], bytes(16..32).as_slice());
}

#[test]
fn test_blocking_is_never_cleared() {
    let blocking = Harness::manual();
    let mrrb: Mrrb = Mrrb::new(
        Config::new(16),
        vec![Harness::reader(&blocking, ReaderId(0), OverrunPolicy::Blocking)],
    )
    .unwrap();

    assert_eq!(mrrb.write(&bytes(0..16)).unwrap(), 16);
    // Truncated to nothing; the reader keeps every byte it is owed.
    assert_eq!(mrrb.write(&bytes(16..32)).unwrap(), 0);
    assert_eq!(blocking.aborts(), 0);
    assert_eq!(mrrb.reader_state(ReaderId(0)), Some(ReaderState::Active));

    mrrb.read_complete(ReaderId(0));
    assert_eq!(blocking.flat_received(), bytes(0..16));
}

#[test]
fn test_overwritable_space_ignores_non_blocking_readers() {
    let blocking = Harness::manual();
    let skip = Harness::manual();
    let mrrb: Mrrb = Mrrb::new(
        Config::new(32),
        vec![
            Harness::reader(&blocking, ReaderId(0), OverrunPolicy::Blocking),
            Harness::reader(&skip, ReaderId(1), OverrunPolicy::Skip),
        ],
    )
    .unwrap();

    assert_eq!(mrrb.write(&bytes(0..20)).unwrap(), 20);
    // Both readers owe 20 bytes, but only the blocking one bounds the
    // overwritable estimate.
    assert_eq!(mrrb.remaining_space(), 12);
    assert_eq!(mrrb.overwritable_space(), 12);

    mrrb.read_complete(ReaderId(0));
    assert_eq!(mrrb.remaining_space(), 12);
    assert_eq!(mrrb.overwritable_space(), 32);
}
