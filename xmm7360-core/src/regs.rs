//! MMIO register window: two independent 32-bit register banks
//! mapped from BAR0 and BAR2. Access pattern lifted from
//! `drivers/vmware/vmxnet3.rs`'s `read_reg`/`write_reg`: a raw pointer to
//! the mapped bar, `read_volatile`/`write_volatile` per access, fences to
//! forbid the compiler reordering across doorbell writes.

use core::ptr::{read_volatile, write_volatile};
use core::sync::atomic::{fence, Ordering};

pub mod bar0 {
    pub const MODE: usize = 0x0c;
    pub const DOORBELL: usize = 0x04;
    pub const WAKEUP: usize = 0x14;
}

pub mod bar2 {
    pub const STATUS: usize = 0x00;
    pub const MODE: usize = 0x18;
    pub const CONTROL: usize = 0x19;
    pub const CONTROLH: usize = 0x1a;
    pub const BLANK0: usize = 0x1b;
    pub const BLANK1: usize = 0x1c;
    pub const BLANK2: usize = 0x1d;
    pub const BLANK3: usize = 0x1e;
}

pub const DOORBELL_TD: u32 = 0;
pub const DOORBELL_CMD: u32 = 1;

pub const STATUS_READY: u32 = 0x600d_f00d;
pub const STATUS_CRASHED: u32 = 0xbadc_0ded;
pub const STATUS_BOOTING: u32 = 0xfeed_b007;

/// A mapped bank of 32-bit registers, addressed by word offset.
///
/// # Safety
/// `base` must point at a live MMIO mapping of at least
/// `max_offset_used + 1` words for the lifetime of the `Bar`.
#[derive(Clone, Copy)]
pub struct Bar {
    base: *mut u32,
}

unsafe impl Send for Bar {}
unsafe impl Sync for Bar {}

impl Bar {
    /// # Safety
    /// See struct docs.
    pub unsafe fn new(base: *mut u32) -> Self {
        Self { base }
    }

    #[inline]
    pub fn read(&self, word_offset: usize) -> u32 {
        unsafe { read_volatile(self.base.add(word_offset)) }
    }

    #[inline]
    pub fn write(&self, word_offset: usize, value: u32) {
        unsafe { write_volatile(self.base.add(word_offset), value) };
        fence(Ordering::SeqCst);
    }
}
