use crate::reader::ReaderId;
use thiserror::Error;

/// Errors surfaced by the port layer (critical section, fences, ISR checks).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PortError {
    /// The critical-section primitive could not be created.
    #[error("port lock initialization failed")]
    LockInit,

    /// The critical section could not be entered.
    #[error("port lock acquisition failed")]
    Lock,

    /// The critical section could not be released.
    #[error("port lock release failed")]
    Unlock,

    /// The critical-section primitive could not be torn down.
    #[error("port lock destruction failed")]
    Destroy,
}

/// Errors that can occur in ring buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MrrbError {
    /// The ring was configured with a zero-length buffer.
    #[error("buffer capacity must be at least 1")]
    ZeroCapacity,

    /// No readers were supplied at construction.
    #[error("a ring buffer requires at least one reader")]
    NoReaders,

    /// More readers than the notify bitmap can track.
    #[error("too many readers (max: {max})")]
    TooManyReaders {
        /// Hard limit on readers per ring.
        max: usize,
    },

    /// Two readers were registered under the same id.
    #[error("duplicate reader id {0:?}")]
    DuplicateReader(ReaderId),

    /// The skip policy needs an abort callback to cancel in-flight reads.
    #[error("skip policy requires an abort callback")]
    SkipRequiresAbort,

    /// An enable/disable call named a reader this ring does not own.
    #[error("unknown reader id {0:?}")]
    UnknownReader(ReaderId),

    /// The port layer failed; the operation was aborted.
    #[error("port failure: {0}")]
    Port(#[from] PortError),
}

impl MrrbError {
    /// Returns `true` if this error came from the execution environment
    /// rather than from the caller's arguments.
    #[inline]
    pub fn is_port_failure(&self) -> bool {
        matches!(self, Self::Port(_))
    }
}
