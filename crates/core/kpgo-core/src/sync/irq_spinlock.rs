//! Interrupt-safe spin lock.
//!
//! Saves and disables local interrupts before acquiring the inner spinlock
//! and restores the previous interrupt state on release, so a probe firing
//! in an interrupt handler can never spin on a lock held by the code it
//! interrupted.
//!
//! The lock is not reentrant. Acquiring it again on the same CPU while a
//! guard is alive deadlocks.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

// ---------------------------------------------------------------------------
// Interrupt state hooks
// ---------------------------------------------------------------------------

/// Saves the interrupt state and disables interrupts.
type SaveFn = fn() -> u64;
/// Restores a state previously returned by a [`SaveFn`].
type RestoreFn = fn(u64);

static SAVE_FN: AtomicPtr<()> = AtomicPtr::new(arch_save_and_disable as *mut ());
static RESTORE_FN: AtomicPtr<()> = AtomicPtr::new(arch_restore as *mut ());

/// Overrides the interrupt save/restore pair.
///
/// The defaults mask interrupts directly on bare-metal x86_64 and aarch64
/// and do nothing on hosted builds. Platforms that track interrupt state
/// themselves (paravirtualized guests, nested-disable counters) install
/// their own pair here.
///
/// # Safety
///
/// Both functions must be callable from any context and must not acquire
/// any lock. `save` must leave interrupts disabled on the calling CPU, and
/// `restore` must accept every value `save` can return.
pub unsafe fn set_irq_hooks(save: SaveFn, restore: RestoreFn) {
    SAVE_FN.store(save as *mut (), Ordering::Release);
    RESTORE_FN.store(restore as *mut (), Ordering::Release);
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
fn arch_save_and_disable() -> u64 {
    let flags: u64;
    // SAFETY: Reading RFLAGS and disabling interrupts is safe in kernel mode.
    unsafe {
        core::arch::asm!(
            "pushfq",
            "pop {}",
            "cli",
            out(reg) flags,
            options(nomem),
        );
    }
    flags
}

#[cfg(all(target_os = "none", target_arch = "x86_64"))]
fn arch_restore(flags: u64) {
    // Only the IF bit is restored.
    if flags & (1 << 9) != 0 {
        // SAFETY: Interrupts were enabled when the state was saved.
        unsafe {
            core::arch::asm!("sti", options(nomem, nostack, preserves_flags));
        }
    }
}

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
fn arch_save_and_disable() -> u64 {
    let flags: u64;
    // SAFETY: Reading DAIF and masking interrupts is safe in kernel mode.
    unsafe {
        core::arch::asm!(
            "mrs {}, DAIF",
            "msr DAIFSet, #0xf",
            out(reg) flags,
            options(nomem),
        );
    }
    flags
}

#[cfg(all(target_os = "none", target_arch = "aarch64"))]
fn arch_restore(flags: u64) {
    // SAFETY: Writes back a DAIF value read by `arch_save_and_disable`.
    unsafe {
        core::arch::asm!(
            "msr DAIF, {}",
            in(reg) flags,
            options(nomem, nostack, preserves_flags),
        );
    }
}

#[cfg(all(
    target_os = "none",
    not(any(target_arch = "x86_64", target_arch = "aarch64"))
))]
compile_error!("IrqSpinLock has no interrupt masking for this architecture");

#[cfg(not(target_os = "none"))]
fn arch_save_and_disable() -> u64 {
    0
}

#[cfg(not(target_os = "none"))]
fn arch_restore(_flags: u64) {}

#[inline]
fn save_flags_and_disable() -> u64 {
    let ptr = SAVE_FN.load(Ordering::Acquire);
    // SAFETY: Only valid `SaveFn` pointers are ever stored into SAVE_FN.
    let save = unsafe { core::mem::transmute::<*mut (), SaveFn>(ptr) };
    save()
}

#[inline]
fn restore_flags(flags: u64) {
    let ptr = RESTORE_FN.load(Ordering::Acquire);
    // SAFETY: Only valid `RestoreFn` pointers are ever stored into RESTORE_FN.
    let restore = unsafe { core::mem::transmute::<*mut (), RestoreFn>(ptr) };
    restore(flags);
}

// ---------------------------------------------------------------------------
// IrqSpinLock
// ---------------------------------------------------------------------------

/// A spin lock that disables interrupts while held.
///
/// Uses test-and-test-and-set (TTAS) to reduce cache-line contention.
/// Const-constructable so it can be placed in `static` items.
pub struct IrqSpinLock<T> {
    locked: AtomicBool,
    name: &'static str,
    data: UnsafeCell<T>,
}

// SAFETY: The lock ensures exclusive access to `T` via atomic operations.
// `T: Send` is required because the data may be accessed from different CPUs.
unsafe impl<T: Send> Send for IrqSpinLock<T> {}
unsafe impl<T: Send> Sync for IrqSpinLock<T> {}

impl<T> IrqSpinLock<T> {
    /// Creates a new unlocked `IrqSpinLock`.
    pub const fn new(value: T) -> Self {
        Self::named("<unnamed>", value)
    }

    /// Creates a new unlocked `IrqSpinLock` with a name for diagnostics.
    pub const fn named(name: &'static str, value: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            name,
            data: UnsafeCell::new(value),
        }
    }

    /// Returns the diagnostic name given at construction.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, disabling interrupts first.
    pub fn lock(&self) -> IrqSpinLockGuard<'_, T> {
        let saved_flags = save_flags_and_disable();

        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return IrqSpinLockGuard {
                    lock: self,
                    saved_flags,
                    _not_send: PhantomData,
                };
            }

            // TTAS: spin on a read (shared cache line) until it looks free.
            while self.locked.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
    }

    /// Attempts to acquire the lock without spinning.
    ///
    /// On failure the interrupt state is restored before returning `None`.
    pub fn try_lock(&self) -> Option<IrqSpinLockGuard<'_, T>> {
        let saved_flags = save_flags_and_disable();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(IrqSpinLockGuard {
                lock: self,
                saved_flags,
                _not_send: PhantomData,
            })
        } else {
            restore_flags(saved_flags);
            None
        }
    }

    /// Returns whether the lock is currently held by anyone.
    ///
    /// Only meaningful for assertions; the answer may be stale by the time
    /// the caller looks at it.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// RAII guard that releases the lock and restores interrupt state on drop.
///
/// Not `Send`: the saved interrupt state belongs to the CPU that took the
/// lock.
pub struct IrqSpinLockGuard<'a, T> {
    lock: &'a IrqSpinLock<T>,
    saved_flags: u64,
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for IrqSpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for IrqSpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: The lock is held, so we have exclusive access to the data.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for IrqSpinLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        restore_flags(self.saved_flags);
    }
}
