//! Mutex that disables interrupts while held, for paths that could
//! otherwise deadlock against the interrupt handler.
//!
//! Modeled on `kernel/src/sync.rs`'s `IrqSafeMutex`, generalized to take
//! the [`Clock`](crate::hal::Clock)'s IRQ hooks instead of calling
//! `crate::arch::interrupts` directly, since this crate is built
//! standalone from the kernel that embeds it.

use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};

use crate::hal::Clock;

pub struct IrqSafeMutex<T> {
    inner: Mutex<T>,
}

pub struct IrqSafeGuard<'a, C: Clock, T> {
    clock: &'a C,
    irq_was_enabled: bool,
    guard: MutexGuard<'a, T>,
}

impl<T> IrqSafeMutex<T> {
    pub const fn new(value: T) -> Self {
        Self { inner: Mutex::new(value) }
    }

    pub fn lock<'a, C: Clock>(&'a self, clock: &'a C) -> IrqSafeGuard<'a, C, T> {
        let irq_was_enabled = clock.disable_irq();
        let guard = self.inner.lock();
        IrqSafeGuard { clock, irq_was_enabled, guard }
    }
}

impl<'a, C: Clock, T> Deref for IrqSafeGuard<'a, C, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<'a, C: Clock, T> DerefMut for IrqSafeGuard<'a, C, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<'a, C: Clock, T> Drop for IrqSafeGuard<'a, C, T> {
    fn drop(&mut self) {
        self.clock.restore_irq(self.irq_was_enabled);
    }
}
