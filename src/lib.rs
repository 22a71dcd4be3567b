//! MRRB - Multiple-Reader Ring Buffer
//!
//! A single in-memory byte ring into which any number of producers append,
//! and from which a fixed set of named readers each independently drain the
//! same stream. Readers are push-driven: the ring hands each reader a slice
//! of the shared buffer through a notify callback, and the reader signals
//! completion when it is done with it. A byte is not reclaimed until every
//! enabled reader that was shown it has completed it, unless a reader's
//! overrun policy says otherwise.
//!
//! This is the classic stdout-fanout problem on embedded targets (one
//! `printf` stream mirrored to a UART, a trace port, and a UDP socket with
//! wildly different latencies), rebuilt as a portable crate.
//!
//! # Key Features
//!
//! - Two-phase reservation/commit writes: concurrent writers reserve under
//!   a short critical section, copy locklessly, and the last writer of a
//!   batch publishes for everyone
//! - Per-reader overrun policy: block the writer, drop the reader, or skip
//!   the reader's oldest bytes
//! - Callbacks always run outside the critical section and may reenter
//! - Pluggable [`Port`] for the critical section: OS mutex on hosted
//!   targets, PRIMASK masking on Cortex-M (`port-cortex-m` feature)
//!
//! # Example
//!
//! ```
//! use mrrb_rs::{Config, Mrrb, OverrunPolicy, Reader, ReaderId};
//! use std::sync::{Arc, Mutex};
//!
//! let received = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&received);
//!
//! // A reader that consumes every slice as soon as it is notified.
//! let reader = Reader::new(
//!     ReaderId(0),
//!     OverrunPolicy::Blocking,
//!     Box::new(move |ring, id, bytes| {
//!         sink.lock().unwrap().extend_from_slice(bytes);
//!         ring.read_complete(id);
//!     }),
//! )
//! .unwrap();
//!
//! let mrrb: Mrrb = Mrrb::new(Config::new(128), vec![reader]).unwrap();
//! assert_eq!(mrrb.write(b"hello").unwrap(), 5);
//! assert_eq!(received.lock().unwrap().as_slice(), b"hello");
//! assert!(mrrb.is_empty());
//! ```

mod config;
mod error;
mod invariants;
mod metrics;
mod port;
mod reader;
mod ring;

pub use config::{Config, BULK_CONFIG, CONSOLE_CONFIG, MAX_READERS};
pub use error::{MrrbError, PortError};
pub use metrics::{Metrics, MetricsSnapshot};
pub use port::{HostedPort, Port};
pub use reader::{
    AbortFn, MrrbControl, NotifyFn, OverrunPolicy, Reader, ReaderId, ReaderState,
};
pub use ring::Mrrb;

#[cfg(feature = "port-cortex-m")]
pub use port::CortexMPort;
