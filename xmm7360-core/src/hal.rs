//! Hardware access seam.
//!
//! The core never reaches into kernel code directly (it is a standalone
//! crate); instead it is generalized over two small traits. MMIO register
//! access is *not* behind a trait: it is raw volatile pointer access, the
//! same way `drivers/vmware/vmxnet3.rs` touches its own register bank,
//! since a mapped BAR behaves identically regardless of which kernel
//! mapped it.

use core::ptr::NonNull;

/// A single DMA-coherent allocation: a host-dereferenceable pointer and
/// the physical address the device should be told about.
///
/// Grounded on `mm::alloc_frame`/`mm::phys_to_virt` for the real kernel
/// allocator, and on `nathan237-TrustOS`'s `virtio.rs` identity-mapping
/// convention (`let phys_addr = ptr as u64;`) for the test mock.
#[derive(Clone, Copy)]
pub struct DmaRegion {
    pub virt: NonNull<u8>,
    pub phys: u64,
    pub len: usize,
}

impl DmaRegion {
    /// # Safety
    /// Caller must ensure `len` bytes starting at `virt` are valid for
    /// reads and writes for the lifetime of the region.
    pub unsafe fn as_slice(&self) -> &[u8] {
        core::slice::from_raw_parts(self.virt.as_ptr(), self.len)
    }

    /// # Safety
    /// See [`DmaRegion::as_slice`].
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u8] {
        core::slice::from_raw_parts_mut(self.virt.as_ptr(), self.len)
    }
}

/// Coherent memory allocator. One allocation per control page, per TD
/// descriptor array, and per TD backing page.
pub trait DmaAllocator {
    fn alloc(&self, len: usize, align: usize) -> DmaRegion;
    fn free(&self, region: DmaRegion);
}

/// Monotonic microsecond clock plus the IRQ-disable hook that
/// `kernel/src/sync.rs`'s `IrqSafeMutex` wraps around `crate::arch::interrupts`.
/// Grounded on `kernel/src/arch/x86_64_arch/tsc.rs`'s `now_us`/`delay_us`.
pub trait Clock {
    fn now_us(&self) -> u64;
    fn delay_us(&self, us: u64);
    fn disable_irq(&self) -> bool;
    fn restore_irq(&self, was_enabled: bool);
}

/// Where decoded IP packets go once the mux decoder has pulled
/// them out of an ingress frame. Packet allocation and interface
/// registration are out of scope for the core; this is the single
/// seam the embedder hooks to receive them.
pub trait IpSink {
    fn deliver(&self, ip_version: u8, payload: &[u8]);
}

/// Discards everything. Useful before a real network stack is wired up.
pub struct NullIpSink;

impl IpSink for NullIpSink {
    fn deliver(&self, _ip_version: u8, _payload: &[u8]) {}
}
