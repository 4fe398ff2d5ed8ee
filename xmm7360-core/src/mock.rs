//! Test-only harness playing the device side of the protocol, so the
//! rest of the crate can be exercised without real hardware.
//!
//! `MockClock` advances a virtual microsecond counter instead of
//! sleeping, so timeout tests run instantly. `MockDmaAllocator` leaks
//! `Vec<u8>` backing storage and reports `phys = ptr as usize as u64`,
//! matching the identity-mapping convention `kernel/src/mm/mod.rs` uses
//! for early boot allocations. `MockModem` wires both up behind a
//! `ControlPage` and two fake register banks, and knows how to play the
//! device's half of the command-ring handshake.

extern crate std;

use core::cell::Cell;
use core::ptr::NonNull;
use core::sync::atomic::AtomicBool;

use std::boxed::Box;
use std::cell::RefCell;
use std::sync::Mutex;
use std::vec::Vec;

use crate::cmd_ring::CommandRing;
use crate::control_page::ControlPage;
use crate::hal::{Clock, DmaAllocator, DmaRegion};
use crate::logging::Logger;
use crate::regs::{self, Bar};

pub struct MockClock {
    now: Cell<u64>,
    irq_enabled: Cell<bool>,
    /// Run on every `delay_us`, standing in for "the device made
    /// progress while the host was waiting" in tests that exercise a
    /// full blocking call without a real modem on the other end.
    tick_hook: RefCell<Option<Box<dyn FnMut()>>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self { now: Cell::new(0), irq_enabled: Cell::new(true), tick_hook: RefCell::new(None) }
    }

    pub fn set(&self, us: u64) {
        self.now.set(us);
    }

    pub fn set_tick_hook(&self, hook: impl FnMut() + 'static) {
        *self.tick_hook.borrow_mut() = Some(Box::new(hook));
    }
}

impl Clock for MockClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }

    fn delay_us(&self, us: u64) {
        self.now.set(self.now.get() + us);
        if let Some(hook) = self.tick_hook.borrow_mut().as_mut() {
            hook();
        }
    }

    fn disable_irq(&self) -> bool {
        let was = self.irq_enabled.get();
        self.irq_enabled.set(false);
        was
    }

    fn restore_irq(&self, was_enabled: bool) {
        self.irq_enabled.set(was_enabled);
    }
}

pub struct MockDmaAllocator {
    live: Mutex<Vec<(u64, usize)>>,
}

impl MockDmaAllocator {
    pub fn new() -> Self {
        Self { live: Mutex::new(Vec::new()) }
    }
}

impl DmaAllocator for MockDmaAllocator {
    fn alloc(&self, len: usize, _align: usize) -> DmaRegion {
        let buf = std::vec![0u8; len].into_boxed_slice();
        let ptr = Box::into_raw(buf) as *mut u8;
        self.live.lock().unwrap().push((ptr as u64, len));
        DmaRegion { virt: NonNull::new(ptr).unwrap(), phys: ptr as u64, len }
    }

    fn free(&self, region: DmaRegion) {
        let mut live = self.live.lock().unwrap();
        if let Some(idx) = live.iter().position(|&(phys, len)| phys == region.phys && len == region.len) {
            live.remove(idx);
            unsafe {
                let slice_ptr = core::slice::from_raw_parts_mut(region.virt.as_ptr(), region.len);
                drop(Box::from_raw(slice_ptr as *mut [u8]));
            }
        }
    }
}

pub struct CapturingLogger {
    lines: Mutex<Vec<std::string::String>>,
}

impl CapturingLogger {
    pub fn new() -> Self {
        Self { lines: Mutex::new(Vec::new()) }
    }

    pub fn lines(&self) -> Vec<std::string::String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Logger for CapturingLogger {
    fn log(&self, args: core::fmt::Arguments) {
        self.lines.lock().unwrap().push(std::format!("{args}"));
    }
}

fn leak_register_bank(words: usize) -> *mut u32 {
    let buf = std::vec![0u32; words].into_boxed_slice();
    Box::into_raw(buf) as *mut u32
}

pub struct MockModem {
    pub cp: ControlPage,
    pub bar0: Bar,
    pub bar2: Bar,
    pub clock: MockClock,
    pub alloc: MockDmaAllocator,
    pub logger: CapturingLogger,
    pub error: AtomicBool,
    cp_region: DmaRegion,
}

impl MockModem {
    pub fn new() -> Self {
        let alloc = MockDmaAllocator::new();
        let cp_region = alloc.alloc(ControlPage::SIZE, 8);
        let cp = unsafe { ControlPage::new(cp_region) };

        let bar0 = unsafe { Bar::new(leak_register_bank(64)) };
        let bar2 = unsafe { Bar::new(leak_register_bank(64)) };
        bar2.write(regs::bar2::STATUS, regs::STATUS_READY);

        Self {
            cp,
            bar0,
            bar2,
            clock: MockClock::new(),
            alloc,
            logger: CapturingLogger::new(),
            error: AtomicBool::new(false),
            cp_region,
        }
    }

    pub fn command_ring(&self) -> CommandRing<'_> {
        CommandRing { cp: self.cp, bar0: self.bar0, bar2: self.bar2, error: &self.error }
    }

    /// Simulates the device instantly draining every ready command.
    pub fn advance_command_ring(&self) {
        self.cp.test_set_c_rptr(self.cp.c_wptr());
    }

    /// Simulates a firmware crash: the status word flips to the crash
    /// sentinel, as `xmm7360_poll` checks for.
    pub fn crash(&self) {
        self.cp.test_set_status_code(regs::STATUS_CRASHED);
        self.bar2.write(regs::bar2::STATUS, 0);
    }

    pub fn control_page_region(&self) -> DmaRegion {
        self.cp_region
    }
}

impl Default for MockModem {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_advances_only_on_delay() {
        let clock = MockClock::new();
        assert_eq!(clock.now_us(), 0);
        clock.delay_us(100);
        assert_eq!(clock.now_us(), 100);
    }

    #[test]
    fn dma_allocator_round_trips_phys_as_virt_identity() {
        let alloc = MockDmaAllocator::new();
        let region = alloc.alloc(128, 8);
        assert_eq!(region.phys, region.virt.as_ptr() as u64);
        alloc.free(region);
    }

    #[test]
    fn fresh_modem_status_register_reads_ready() {
        let modem = MockModem::new();
        assert_eq!(modem.bar2.read(regs::bar2::STATUS), regs::STATUS_READY);
    }
}
