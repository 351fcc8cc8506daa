//! # Synchronization Primitives
//!
//! BASEPRI-based critical sections for the Cortex-M4.
//!
//! Unlike a PRIMASK critical section, raising BASEPRI to [`KERNEL_BASEPRI`]
//! masks only the scheduler's own exceptions (SysTick and PendSV). SVCall and
//! the fault handlers keep running, so a fault inside kernel code is still
//! captured.
//!
//! Critical sections do **not** nest: leaving one always writes `BASEPRI = 0`.
//! Callers must not enter a critical section while already inside one.
//!
//! On the host (unit tests) the guard compiles to nothing.

use core::cell::UnsafeCell;
use core::marker::PhantomData;

#[cfg(all(target_arch = "arm", target_os = "none"))]
use crate::config::KERNEL_BASEPRI;

/// Proof that scheduler interrupts are masked. Exiting happens on drop.
pub struct CriticalSection {
    // BASEPRI is per-core state; the guard must stay where it was created.
    _not_send: PhantomData<*mut ()>,
}

impl CriticalSection {
    /// Mask the tick and context-switch interrupts.
    #[inline]
    pub fn enter() -> Self {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        {
            // Safety: raising BASEPRI only masks interrupts, it cannot break
            // any memory-safety invariant.
            unsafe { cortex_m::register::basepri::write(KERNEL_BASEPRI) };
            cortex_m::asm::isb();
        }
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for CriticalSection {
    #[inline]
    fn drop(&mut self) {
        #[cfg(all(target_arch = "arm", target_os = "none"))]
        {
            // Safety: the guard is going away, nothing borrowed through it
            // outlives this point.
            unsafe { cortex_m::register::basepri::write(0) };
            cortex_m::asm::isb();
        }
    }
}

/// Execute a closure within a critical section.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     let kernel = KERNEL.borrow_mut(cs);
///     // ...
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&mut CriticalSection) -> R,
{
    let mut cs = CriticalSection::enter();
    f(&mut cs)
}

/// Interior-mutable holder for state shared between task and interrupt
/// context. The contents can only be reached through a live
/// [`CriticalSection`], and the borrow cannot outlive it.
pub struct KernelCell<T> {
    inner: UnsafeCell<T>,
}

// Safety: single core, and every access goes through `borrow_mut`, which
// requires a critical section masking all other kernel-side accessors.
unsafe impl<T> Sync for KernelCell<T> {}

impl<T> KernelCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: UnsafeCell::new(value),
        }
    }

    /// Borrow the contents for the lifetime of the critical section.
    ///
    /// Taking the guard by `&mut` means a second borrow through the same
    /// guard is rejected at compile time.
    #[inline]
    pub fn borrow_mut<'cs>(&'cs self, _cs: &'cs mut CriticalSection) -> &'cs mut T {
        // Safety: see the `Sync` impl above.
        unsafe { &mut *self.inner.get() }
    }
}
