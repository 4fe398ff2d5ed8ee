//! Transfer-descriptor ring: one of sixteen per-direction
//! descriptor rings with backing DMA pages. Even ring ids are written by
//! the host (TX); odd ring ids are read by the host (RX, refilled after
//! each consumed slot).
//!
//! The device-visible `wptr`/`rptr` pair lives in the control page
//! (`ControlPage::s_wptr`/`s_rptr`) and needs no host-side lock: the host
//! is the sole writer of `s_wptr` and sole reader of the device-written
//! `s_rptr`, per its single-producer/single-consumer discipline. The
//! `storage` mutex here exists only to protect the backing-page `Vec`
//! itself against a concurrent create/destroy race, which the reference
//! driver leaves to caller discipline (queue-pair open/close already
//! serializes this in practice, but closing a Rust `Vec` out from under
//! a live pointer is UB, not just a logic bug, so it is worth the extra
//! spinlock acquisition on the hot path).

use core::sync::atomic::{AtomicU32, Ordering};

use alloc::vec::Vec;
use spin::Mutex;

use crate::control_page::{ControlPage, TdRingEntry};
use crate::error::{DriverError, DriverResult};
use crate::hal::{DmaAllocator, DmaRegion};

struct TdRingStorage {
    depth: u32,
    page_size: u32,
    descs: DmaRegion,
    pages: Vec<DmaRegion>,
}

pub struct TdRing {
    ring_id: u8,
    storage: Mutex<Option<TdRingStorage>>,
    last_handled: AtomicU32,
}

impl TdRing {
    pub const fn new(ring_id: u8) -> Self {
        Self {
            ring_id,
            storage: Mutex::new(None),
            last_handled: AtomicU32::new(0),
        }
    }

    pub fn is_open(&self) -> bool {
        self.storage.lock().is_some()
    }

    pub fn depth(&self) -> u32 {
        self.storage.lock().as_ref().map(|s| s.depth).unwrap_or(0)
    }

    pub fn page_size(&self) -> u32 {
        self.storage.lock().as_ref().map(|s| s.page_size).unwrap_or(0)
    }

    fn is_write_ring(&self) -> bool {
        self.ring_id % 2 == 0
    }

    /// Allocates the descriptor array and `depth` backing pages, wires
    /// each descriptor's address to its page's physical address, and
    /// returns the descriptor array's physical address for the
    /// `RING_OPEN` command. Caller still has to issue that command; this
    /// function only prepares host-side state.
    pub fn prepare<A: DmaAllocator>(&self, depth: u32, page_size: u32, alloc: &A) -> u64 {
        debug_assert!(depth.is_power_of_two(), "TD ring depth must be a power of two");
        debug_assert!(self.storage.lock().is_none(), "TD ring already open");

        let entry_size = core::mem::size_of::<TdRingEntry>();
        let descs = alloc.alloc(depth as usize * entry_size, 8);
        let mut pages = Vec::with_capacity(depth as usize);
        for i in 0..depth {
            let page = alloc.alloc(page_size as usize, 4096);
            unsafe {
                let entry_ptr = (descs.virt.as_ptr() as *mut TdRingEntry).add(i as usize);
                core::ptr::write_volatile(&mut (*entry_ptr).addr, page.phys);
                core::ptr::write_volatile(&mut (*entry_ptr).length, 0);
                core::ptr::write_volatile(&mut (*entry_ptr).flags, 0);
                core::ptr::write_volatile(&mut (*entry_ptr).unk, 0);
            }
            pages.push(page);
        }

        let descs_phys = descs.phys;
        *self.storage.lock() = Some(TdRingStorage { depth, page_size, descs, pages });
        self.last_handled.store(0, Ordering::Relaxed);
        descs_phys
    }

    /// Frees backing pages and the descriptor array. Caller is
    /// responsible for having already issued `RING_CLOSE`.
    pub fn teardown<A: DmaAllocator>(&self, alloc: &A) {
        if let Some(storage) = self.storage.lock().take() {
            for page in storage.pages {
                alloc.free(page);
            }
            alloc.free(storage.descs);
        }
    }

    /// Host write-side op (even rings): copy `bytes` into the page at
    /// the current host `wptr`, publish the descriptor, advance `wptr`.
    pub fn write(&self, cp: &ControlPage, bytes: &[u8]) -> DriverResult<()> {
        debug_assert!(self.is_write_ring(), "write() called on an RX ring");
        let guard = self.storage.lock();
        let storage = guard.as_ref().ok_or(DriverError::NotOpen)?;
        debug_assert!(bytes.len() <= storage.page_size as usize, "write exceeds page_size");

        let wptr = cp.s_wptr(self.ring_id as usize);
        let new_wptr = (wptr + 1) % storage.depth;
        if new_wptr == cp.s_rptr(self.ring_id as usize) {
            return Err(DriverError::Busy);
        }

        unsafe {
            let page = storage.pages[wptr as usize];
            let dst = core::slice::from_raw_parts_mut(page.virt.as_ptr(), bytes.len());
            dst.copy_from_slice(bytes);

            let entry_ptr = (storage.descs.virt.as_ptr() as *mut TdRingEntry).add(wptr as usize);
            core::ptr::write_volatile(&mut (*entry_ptr).length, bytes.len() as u16);
            core::ptr::write_volatile(&mut (*entry_ptr).flags, 0);
        }

        cp.set_s_wptr(self.ring_id as usize, new_wptr);
        Ok(())
    }

    /// `(wptr + 1) mod depth == device_rptr`
    pub fn is_full(&self, cp: &ControlPage) -> bool {
        let guard = self.storage.lock();
        let Some(storage) = guard.as_ref() else { return true };
        let wptr = cp.s_wptr(self.ring_id as usize);
        let new_wptr = (wptr + 1) % storage.depth;
        new_wptr == cp.s_rptr(self.ring_id as usize)
    }

    /// Host read-side op (odd rings): publish a fresh empty descriptor
    /// at `wptr` so the device knows another slot is available, then
    /// advance `wptr`.
    pub fn publish_empty(&self, cp: &ControlPage) -> DriverResult<()> {
        debug_assert!(!self.is_write_ring(), "publish_empty() called on a TX ring");
        let guard = self.storage.lock();
        let storage = guard.as_ref().ok_or(DriverError::NotOpen)?;

        let wptr = cp.s_wptr(self.ring_id as usize);
        let new_wptr = (wptr + 1) % storage.depth;
        if new_wptr == cp.s_rptr(self.ring_id as usize) {
            return Err(DriverError::Busy);
        }

        unsafe {
            let entry_ptr = (storage.descs.virt.as_ptr() as *mut TdRingEntry).add(wptr as usize);
            core::ptr::write_volatile(&mut (*entry_ptr).length, storage.page_size as u16);
            core::ptr::write_volatile(&mut (*entry_ptr).flags, 0);
        }
        cp.set_s_wptr(self.ring_id as usize, new_wptr);
        Ok(())
    }

    /// Prefills the entire RX ring with empty descriptors, as
    /// `xmm7360_qp_start` does before ringing the TD doorbell.
    pub fn prefill(&self, cp: &ControlPage) {
        while !self.is_full(cp) {
            let _ = self.publish_empty(cp);
        }
    }

    pub fn has_data(&self, cp: &ControlPage) -> bool {
        cp.s_rptr(self.ring_id as usize) != self.last_handled.load(Ordering::Acquire)
    }

    /// Copies the completed descriptor's payload (truncated to `out`),
    /// refills the slot, and advances `last_handled`. Returns the number
    /// of bytes copied.
    pub fn read(&self, cp: &ControlPage, out: &mut [u8]) -> DriverResult<usize> {
        if !self.has_data(cp) {
            return Ok(0);
        }
        let idx = self.last_handled.load(Ordering::Acquire);
        let guard = self.storage.lock();
        let storage = guard.as_ref().ok_or(DriverError::NotOpen)?;

        let length = unsafe {
            let entry_ptr = (storage.descs.virt.as_ptr() as *const TdRingEntry).add(idx as usize);
            core::ptr::read_volatile(&(*entry_ptr).length) as usize
        };
        let n = length.min(out.len());
        unsafe {
            let page = storage.pages[idx as usize];
            let src = core::slice::from_raw_parts(page.virt.as_ptr(), n);
            out[..n].copy_from_slice(src);
        }
        drop(guard);

        self.publish_empty(cp)?;
        let new_last_handled = (idx + 1) % self.depth();
        self.last_handled.store(new_last_handled, Ordering::Release);
        Ok(n)
    }

    #[cfg(test)]
    pub fn test_write_device_side(&self, cp: &ControlPage, bytes: &[u8]) {
        let guard = self.storage.lock();
        let storage = guard.as_ref().expect("ring not open");
        let slot = cp.s_rptr(self.ring_id as usize);
        unsafe {
            let page = storage.pages[slot as usize];
            let dst = core::slice::from_raw_parts_mut(page.virt.as_ptr(), bytes.len());
            dst.copy_from_slice(bytes);
            let entry_ptr = (storage.descs.virt.as_ptr() as *mut TdRingEntry).add(slot as usize);
            core::ptr::write_volatile(&mut (*entry_ptr).length, bytes.len() as u16);
        }
        let new_rptr = (slot + 1) % storage.depth;
        drop(guard);
        cp.test_set_s_rptr(self.ring_id as usize, new_rptr);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use crate::mock::MockModem;

    #[test]
    fn fullness_after_depth_minus_one_writes() {
        let modem = MockModem::new();
        let ring = TdRing::new(0);
        let descs_phys = ring.prepare(8, 4096, &modem.alloc);
        assert_ne!(descs_phys, 0);
        modem.cp.reset_ring_pointers(0);

        for _ in 0..7 {
            ring.write(&modem.cp, b"x").unwrap();
        }
        assert!(ring.is_full(&modem.cp));

        // Device drains one slot.
        modem.cp.test_set_s_rptr(0, 1);
        assert!(!ring.is_full(&modem.cp));
    }

    #[test]
    fn write_over_page_size_is_a_contract_violation_in_debug() {
        let modem = MockModem::new();
        let ring = TdRing::new(0);
        ring.prepare(8, 4, &modem.alloc);
        modem.cp.reset_ring_pointers(0);
        let oversized = [0u8; 5];
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = ring.write(&modem.cp, &oversized);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn rx_ring_reports_pushed_data() {
        let modem = MockModem::new();
        let ring = TdRing::new(1);
        ring.prepare(8, 64, &modem.alloc);
        modem.cp.reset_ring_pointers(1);
        ring.prefill(&modem.cp);

        assert!(!ring.has_data(&modem.cp));
        ring.test_write_device_side(&modem.cp, b"hello");
        assert!(ring.has_data(&modem.cp));

        let mut buf = [0u8; 64];
        let n = ring.read(&modem.cp, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert!(!ring.has_data(&modem.cp));
    }
}
