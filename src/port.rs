//! Execution-environment abstraction for the ring buffer.
//!
//! The core serializes all state mutation through a single critical section
//! per ring, but what a "critical section" is depends on where the code
//! runs: a mutex on a hosted OS, global interrupt masking on bare metal.
//! The [`Port`] trait captures that seam, together with the two other
//! environment queries the core needs: whether the caller is currently in
//! interrupt context, and a full memory fence for publication.
//!
//! Lock and unlock are fallible even where the underlying primitive cannot
//! fail; the core propagates port failures to its callers, and test ports
//! use the failure channel to exercise those paths.

use crate::error::PortError;
use std::sync::atomic::{fence, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Pluggable critical-section provider.
///
/// `Guard` is the witness that the critical section is held; dropping it
/// without `unlock` releases the section on ports where that is possible,
/// but the core always pairs `lock` with an explicit `unlock` so that
/// release failures can be observed.
pub trait Port: Send + Sync + Sized {
    /// Proof of an entered critical section.
    type Guard<'a>
    where
        Self: 'a;

    /// Creates the port's lock primitive.
    fn init() -> Result<Self, PortError>;

    /// Tears the lock primitive down. Called once from `Mrrb::deinit`.
    fn destroy(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    /// Enters the critical section.
    fn lock(&self) -> Result<Self::Guard<'_>, PortError>;

    /// Leaves the critical section.
    fn unlock(&self, guard: Self::Guard<'_>) -> Result<(), PortError>;

    /// Returns `true` if the caller is executing in interrupt context.
    fn interrupt_active(&self) -> bool;

    /// Full memory fence, ordering buffer writes before cursor publication.
    fn fence(&self);
}

/// Hosted port: critical section backed by an OS mutex.
///
/// `interrupt_active` is always false on hosted systems; a poisoned mutex
/// (a callback panicked while a different thread held the lock) surfaces
/// as [`PortError::Lock`].
#[derive(Debug, Default)]
pub struct HostedPort {
    mutex: Mutex<()>,
}

impl Port for HostedPort {
    type Guard<'a>
        = MutexGuard<'a, ()>
    where
        Self: 'a;

    fn init() -> Result<Self, PortError> {
        Ok(Self::default())
    }

    #[inline]
    fn lock(&self) -> Result<Self::Guard<'_>, PortError> {
        self.mutex.lock().map_err(|_| PortError::Lock)
    }

    #[inline]
    fn unlock(&self, guard: Self::Guard<'_>) -> Result<(), PortError> {
        drop(guard);
        Ok(())
    }

    #[inline]
    fn interrupt_active(&self) -> bool {
        false
    }

    #[inline]
    fn fence(&self) {
        fence(Ordering::SeqCst);
    }
}

/// Bare-metal Cortex-M port: critical section backed by PRIMASK masking.
///
/// Only meaningful on `thumbv*` targets. The guard records whether
/// interrupts were enabled on entry and restores exactly that state on
/// unlock, so nested sections do not re-enable prematurely. Restoring
/// PRIMASK cannot fail; `unlock` reports success unconditionally.
#[cfg(feature = "port-cortex-m")]
pub mod cortex_m_port {
    use super::{Port, PortError};
    use cortex_m::peripheral::scb::VectActive;
    use cortex_m::{asm, interrupt, peripheral::SCB, register};

    /// Interrupt-masking critical section for Cortex-M cores.
    #[derive(Debug, Default)]
    pub struct CortexMPort;

    /// Saved PRIMASK state, restored on unlock.
    #[derive(Debug)]
    pub struct PrimaskGuard {
        interrupts_were_enabled: bool,
    }

    impl Port for CortexMPort {
        type Guard<'a>
            = PrimaskGuard
        where
            Self: 'a;

        fn init() -> Result<Self, PortError> {
            Ok(Self)
        }

        #[inline]
        fn lock(&self) -> Result<Self::Guard<'_>, PortError> {
            let primask = register::primask::read();
            interrupt::disable();
            asm::dsb();
            asm::isb();
            Ok(PrimaskGuard {
                interrupts_were_enabled: primask.is_active(),
            })
        }

        #[inline]
        fn unlock(&self, guard: Self::Guard<'_>) -> Result<(), PortError> {
            asm::dsb();
            asm::isb();
            if guard.interrupts_were_enabled {
                // SAFETY: interrupts were enabled when this section was
                // entered; restoring that state cannot break a containing
                // critical section.
                unsafe { interrupt::enable() }
            }
            Ok(())
        }

        #[inline]
        fn interrupt_active(&self) -> bool {
            SCB::vect_active() != VectActive::ThreadMode
        }

        #[inline]
        fn fence(&self) {
            asm::dsb();
            asm::isb();
        }
    }
}

#[cfg(feature = "port-cortex-m")]
pub use cortex_m_port::CortexMPort;
