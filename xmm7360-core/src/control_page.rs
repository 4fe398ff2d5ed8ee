//! Control page: the single DMA-coherent region shared with
//! the device. Field layout mirrors `struct control_page` in
//! `examples/original_source/xmm7360.c` field-for-field; every
//! device-written field is read through `read_volatile` and every
//! host-written field is written through `write_volatile` followed by
//! the fence the doorbell write provides, per the "volatile shared
//! memory" discipline required of device-visible fields.

use core::ptr::{addr_of, addr_of_mut, read_volatile, write_volatile, NonNull};

use crate::hal::DmaRegion;

pub const CMD_RING_SIZE: usize = 128;
pub const NUM_TD_RINGS: usize = 16;

pub const CMD_FLAG_DONE: u32 = 1;
pub const CMD_FLAG_READY: u32 = 2;

pub const CMD_RING_OPEN: u8 = 1;
pub const CMD_RING_CLOSE: u8 = 2;
pub const CMD_RING_FLUSH: u8 = 3;
pub const CMD_WAKEUP: u8 = 4;

pub const RING_OPEN_MAGIC: u32 = 0x60;

pub const TD_FLAG_COMPLETE: u16 = 0x200;

/// One slot of the command ring. Device sets `DONE` on completion; host
/// sets `READY` on submission.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct CmdRingEntry {
    pub ptr: u64,
    pub len: u16,
    pub parm: u8,
    pub cmd: u8,
    pub extra: u32,
    pub unk: u32,
    pub flags: u32,
}

/// One slot of a TD ring: address of a backing page plus its length/flags.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct TdRingEntry {
    pub addr: u64,
    pub length: u16,
    pub flags: u16,
    pub unk: u32,
}

#[repr(C)]
struct Root {
    status: u64,
    s_wptr: u64,
    s_rptr: u64,
    c_wptr: u64,
    c_rptr: u64,
    c_ring: u64,
    c_ring_size: u16,
    unk: u16,
}

#[repr(C)]
struct Status {
    code: u32,
    mode: u32,
    asleep: u32,
    pad: u32,
}

#[repr(C)]
struct ControlPageLayout {
    root: Root,
    status: Status,
    s_wptr: [u32; NUM_TD_RINGS],
    s_rptr: [u32; NUM_TD_RINGS],
    c_wptr: u32,
    c_rptr: u32,
    c_ring: [CmdRingEntry; CMD_RING_SIZE],
}

/// Handle to a live control page allocation. Doesn't own the backing
/// [`DmaRegion`] (the device keeps that for teardown); this is a thin,
/// `Copy` view over the raw pointer, matching how `xmm->cp` is used as a
/// bare pointer throughout the original driver.
#[derive(Clone, Copy)]
pub struct ControlPage {
    ptr: NonNull<ControlPageLayout>,
    phys: u64,
}

unsafe impl Send for ControlPage {}
unsafe impl Sync for ControlPage {}

fn field_offset<T, F>(container: *const T, field: *const F) -> u64 {
    (field as usize - container as usize) as u64
}

impl ControlPage {
    pub const SIZE: usize = core::mem::size_of::<ControlPageLayout>();

    /// # Safety
    /// `region` must be a zeroed, coherent allocation at least
    /// [`ControlPage::SIZE`] bytes long, exclusively owned by the caller.
    pub unsafe fn new(region: DmaRegion) -> Self {
        debug_assert!(region.len >= Self::SIZE);
        let ptr = NonNull::new_unchecked(region.virt.as_ptr() as *mut ControlPageLayout);
        let cp = Self { ptr, phys: region.phys };
        cp.init_root();
        cp
    }

    fn layout_ptr(&self) -> *mut ControlPageLayout {
        self.ptr.as_ptr()
    }

    pub fn phys(&self) -> u64 {
        self.phys
    }

    /// Fills the root block with physical offsets of every other field,
    /// exactly as `xmm7360_cmd_ring_init` does via `offsetof`.
    fn init_root(&self) {
        unsafe {
            let base = self.layout_ptr();
            let root = addr_of_mut!((*base).root);
            write_volatile(addr_of_mut!((*root).status), self.phys + field_offset(base, addr_of!((*base).status)));
            write_volatile(addr_of_mut!((*root).s_wptr), self.phys + field_offset(base, addr_of!((*base).s_wptr)));
            write_volatile(addr_of_mut!((*root).s_rptr), self.phys + field_offset(base, addr_of!((*base).s_rptr)));
            write_volatile(addr_of_mut!((*root).c_wptr), self.phys + field_offset(base, addr_of!((*base).c_wptr)));
            write_volatile(addr_of_mut!((*root).c_rptr), self.phys + field_offset(base, addr_of!((*base).c_rptr)));
            write_volatile(addr_of_mut!((*root).c_ring), self.phys + field_offset(base, addr_of!((*base).c_ring)));
            write_volatile(addr_of_mut!((*root).c_ring_size), CMD_RING_SIZE as u16);
        }
    }

    // --- status block (device-written) ---

    pub fn status_code(&self) -> u32 {
        unsafe { read_volatile(addr_of!((*self.layout_ptr()).status.code)) }
    }

    pub fn status_asleep(&self) -> bool {
        unsafe { read_volatile(addr_of!((*self.layout_ptr()).status.asleep)) != 0 }
    }

    // --- slave (TD ring) pointers ---

    pub fn s_wptr(&self, ring: usize) -> u32 {
        unsafe { read_volatile(addr_of!((*self.layout_ptr()).s_wptr[ring])) }
    }

    pub fn set_s_wptr(&self, ring: usize, value: u32) {
        unsafe { write_volatile(addr_of_mut!((*self.layout_ptr()).s_wptr[ring]), value) }
    }

    /// Device-written; host must treat as volatile.
    pub fn s_rptr(&self, ring: usize) -> u32 {
        unsafe { read_volatile(addr_of!((*self.layout_ptr()).s_rptr[ring])) }
    }

    pub fn reset_ring_pointers(&self, ring: usize) {
        self.set_s_wptr(ring, 0);
        unsafe { write_volatile(addr_of_mut!((*self.layout_ptr()).s_rptr[ring]), 0) };
    }

    // --- command ring pointers ---

    pub fn c_wptr(&self) -> u32 {
        unsafe { read_volatile(addr_of!((*self.layout_ptr()).c_wptr)) }
    }

    pub fn set_c_wptr(&self, value: u32) {
        unsafe { write_volatile(addr_of_mut!((*self.layout_ptr()).c_wptr), value) }
    }

    /// Device-written; host must treat as volatile.
    pub fn c_rptr(&self) -> u32 {
        unsafe { read_volatile(addr_of!((*self.layout_ptr()).c_rptr)) }
    }

    // --- test-only device-side pokes, used by `mock::MockModem` to play
    // the device's half of the protocol. Never called from production
    // driver code, which only ever reads these fields. ---

    #[cfg(test)]
    pub fn test_set_status_code(&self, code: u32) {
        unsafe { write_volatile(addr_of_mut!((*self.layout_ptr()).status.code), code) }
    }

    #[cfg(test)]
    pub fn test_set_status_asleep(&self, asleep: bool) {
        unsafe { write_volatile(addr_of_mut!((*self.layout_ptr()).status.asleep), asleep as u32) }
    }

    #[cfg(test)]
    pub fn test_set_c_rptr(&self, value: u32) {
        unsafe { write_volatile(addr_of_mut!((*self.layout_ptr()).c_rptr), value) }
    }

    #[cfg(test)]
    pub fn test_cmd_entry_cmd(&self, slot: usize) -> u8 {
        unsafe { read_volatile(addr_of!((*self.layout_ptr()).c_ring[slot].cmd)) }
    }

    #[cfg(test)]
    pub fn test_set_s_rptr(&self, ring: usize, value: u32) {
        unsafe { write_volatile(addr_of_mut!((*self.layout_ptr()).s_rptr[ring]), value) }
    }

    pub fn write_cmd_entry(&self, slot: usize, entry: CmdRingEntry) {
        unsafe {
            let e = addr_of_mut!((*self.layout_ptr()).c_ring[slot]);
            write_volatile(addr_of_mut!((*e).ptr), entry.ptr);
            write_volatile(addr_of_mut!((*e).len), entry.len);
            write_volatile(addr_of_mut!((*e).parm), entry.parm);
            write_volatile(addr_of_mut!((*e).cmd), entry.cmd);
            write_volatile(addr_of_mut!((*e).extra), entry.extra);
            write_volatile(addr_of_mut!((*e).unk), entry.unk);
            // flags written last: it's the field that tells the device
            // the slot is ready.
            write_volatile(addr_of_mut!((*e).flags), entry.flags);
        }
    }
}
