//! Glue between the standalone `xmm7360-core` transport crate and this
//! kernel: PCI discovery, BAR mapping, MSI wiring, and the
//! Clock/DmaAllocator/Logger trait impls the core is generalized over.
//!
//! Network delivery is left at [`xmm7360_core::NullIpSink`]; handing
//! decoded packets to `net::` is a separate integration the transport
//! core doesn't need to know about.

use core::ptr::NonNull;

use spin::Once;
use x86_64::structures::paging::{PhysFrame, Size4KiB};
use x86_64::PhysAddr;

use xmm7360_core::regs::Bar;
use xmm7360_core::{Clock, DmaAllocator, DmaRegion, DriverError, Logger, NullIpSink, XmmDevice};

use crate::arch::interrupts::{self as irq_ctl};
use crate::arch::tsc;
use crate::arch::x86_64_arch::interrupts::XMM7360_VECTOR;
use crate::drivers::msi;
use crate::drivers::pci::{self, PciDevice};
use crate::mm;

const VENDOR_ID: u16 = 0x8086;
const DEVICE_ID: u16 = 0x7360;
/// Both BARs carry doorbell and status registers only; one page covers
/// either with plenty of headroom.
const BAR_MAP_SIZE: u64 = 0x1000;

struct TscClock;

impl Clock for TscClock {
    fn now_us(&self) -> u64 {
        tsc::now_us()
    }

    fn delay_us(&self, us: u64) {
        tsc::delay_us(us)
    }

    fn disable_irq(&self) -> bool {
        irq_ctl::disable()
    }

    fn restore_irq(&self, was_enabled: bool) {
        irq_ctl::restore(was_enabled)
    }
}

struct KernelDmaAllocator;

fn pages_for(len: usize) -> usize {
    ((len + 0xFFF) / 0x1000).max(1)
}

impl DmaAllocator for KernelDmaAllocator {
    fn alloc(&self, len: usize, _align: usize) -> DmaRegion {
        let pages = pages_for(len);
        let (frame, virt) = mm::alloc_contiguous_pages(pages).expect("xmm7360: out of DMA-coherent memory");
        let ptr = virt.as_mut_ptr::<u8>();
        unsafe { core::ptr::write_bytes(ptr, 0, pages * 0x1000) };
        DmaRegion {
            virt: NonNull::new(ptr).expect("mm::alloc_contiguous_pages never returns a null mapping"),
            phys: frame.start_address().as_u64(),
            len,
        }
    }

    fn free(&self, region: DmaRegion) {
        let mut frames = mm::frame_allocator_lock();
        for i in 0..pages_for(region.len) {
            let addr = PhysAddr::new(region.phys + (i as u64) * 0x1000);
            frames.deallocate(PhysFrame::<Size4KiB>::containing_address(addr));
        }
    }
}

struct KernelLogger;

impl Logger for KernelLogger {
    fn log(&self, args: core::fmt::Arguments) {
        crate::serial::print(args);
    }
}

type Device = XmmDevice<TscClock, KernelDmaAllocator, KernelLogger, NullIpSink>;

static DEVICE: Once<Device> = Once::new();

fn read_bar64(dev: &PciDevice, bar_index: u8) -> u64 {
    let offset = 0x10 + bar_index * 4;
    let low = pci::read_u32(dev.addr.bus, dev.addr.device, dev.addr.function, offset);
    let base = (low & 0xFFFF_FFF0) as u64;
    let is_64bit = (low >> 1) & 0x3 == 2;
    if is_64bit {
        let high = pci::read_u32(dev.addr.bus, dev.addr.device, dev.addr.function, offset + 4);
        base | ((high as u64) << 32)
    } else {
        base
    }
}

fn map_bar(phys: u64) -> *mut u32 {
    let _ = mm::map_mmio(phys, BAR_MAP_SIZE);
    mm::mmio_virt_addr(phys).as_mut_ptr()
}

/// Probes the PCI bus for the modem, maps its BARs, wires its MSI vector,
/// and runs the boot handshake. Logs and returns with no device installed
/// if the modem isn't present or the handshake fails — there's exactly
/// one of these per machine, so failure here just means no cellular modem
/// this boot, not a fatal kernel error.
pub fn init() {
    let Some(dev) = pci::scan().into_iter().find(|d| d.id.vendor_id == VENDOR_ID && d.id.device_id == DEVICE_ID)
    else {
        crate::kprintln!("xmm7360: device not present");
        return;
    };
    crate::kprintln!(
        "xmm7360: found at {:02x}:{:02x}.{}",
        dev.addr.bus, dev.addr.device, dev.addr.function
    );
    pci::enable_bus_mastering(&dev);

    let bar0 = unsafe { Bar::new(map_bar(read_bar64(&dev, 0))) };
    let bar2 = unsafe { Bar::new(map_bar(read_bar64(&dev, 2))) };

    let Some(msi_cap) = msi::probe_msi(&dev) else {
        crate::kprintln!("xmm7360: device has no MSI capability");
        return;
    };
    if let Err(e) = msi::configure_msi(&dev, &msi_cap, XMM7360_VECTOR, 0, 1) {
        crate::kprintln!("xmm7360: MSI configuration failed: {:?}", e);
        return;
    }

    let device = unsafe { XmmDevice::new(bar0, bar2, KernelDmaAllocator, TscClock, KernelLogger, NullIpSink) };
    if let Err(e) = device.boot() {
        crate::kprintln!("xmm7360: boot handshake failed: {:?}", e);
        return;
    }

    DEVICE.call_once(|| device);
}

/// Called from the `XMM7360_VECTOR` IDT entry. A no-op before `init` has
/// installed a device (stray interrupt during early boot, or the device
/// was never found).
pub fn on_interrupt() {
    if let Some(device) = DEVICE.get() {
        device.handle_interrupt();
    }
}

/// Queues `payload` for transmission on the network queue pair. Returns
/// [`DriverError::DeviceGone`] if the modem was never probed.
pub fn send_ip_packet(payload: &[u8]) -> Result<(), DriverError> {
    DEVICE.get().ok_or(DriverError::DeviceGone)?.net_send(payload)
}

/// Called from the periodic timer tick to flush the network scheduler's
/// coalescing deadline once it elapses. A no-op before `init` has
/// installed a device.
pub fn net_tick() {
    if let Some(device) = DEVICE.get() {
        let _ = device.net_tick();
    }
}
