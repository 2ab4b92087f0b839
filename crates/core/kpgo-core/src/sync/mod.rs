//! Synchronization primitives.
//!
//! The exporter needs exactly one kind of lock: a short, non-sleeping
//! critical section that may be entered from instrumentation probes running
//! in interrupt context. [`IrqSpinLock`] provides that, with the
//! architecture-specific interrupt save/restore supplied at runtime through
//! [`set_irq_hooks`].

mod irq_spinlock;

pub use irq_spinlock::{IrqSpinLock, IrqSpinLockGuard, set_irq_hooks};
