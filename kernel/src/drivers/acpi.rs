//! Minimal ACPI static-table discovery: RSDP -> RSDT/XSDT -> MADT.
//!
//! Enough for [`super::super::arch::x86_64_arch::apic`] to find the Local
//! APIC base and any I/O APICs without a full ACPI/AML interpreter. DSDT/SSDT
//! evaluation (device enumeration via AML) is out of scope here — this kernel
//! finds its one PCI device by scanning config space directly instead.

#![allow(dead_code)]

use alloc::vec::Vec;
use x86_64::VirtAddr;

/// Raw on-disk ACPI "system description table" header, byte-for-byte —
/// callers overlay this directly on mapped physical memory.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub struct AcpiTableHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: [u8; 4],
    pub creator_revision: u32,
}

/// A located table: its header plus the physical address its body starts at.
pub struct AcpiTable {
    pub header: AcpiTableHeader,
    pub address: u64,
}

pub struct LocalApicEntry {
    pub processor_id: u8,
    pub apic_id: u8,
    pub flags: u32,
}

pub struct IoApicEntry {
    pub id: u8,
    pub address: u32,
    pub gsi_base: u32,
}

pub struct MadtInfo {
    pub local_apic_address: u32,
    pub local_apics: Vec<LocalApicEntry>,
    pub io_apics: Vec<IoApicEntry>,
}

struct RootTable {
    /// Physical addresses of each top-level SDT, widened to u64 whether the
    /// firmware handed us an RSDT (32-bit entries) or an XSDT (64-bit).
    entries: Vec<u64>,
}

fn phys_to_virt(addr: u64) -> VirtAddr {
    crate::mm::physical_memory_offset() + addr
}

unsafe fn read_header(phys: u64) -> AcpiTableHeader {
    core::ptr::read_unaligned(phys_to_virt(phys).as_ptr::<AcpiTableHeader>())
}

fn checksum_ok(phys: u64, len: usize) -> bool {
    let base = phys_to_virt(phys).as_ptr::<u8>();
    let mut sum: u8 = 0;
    for i in 0..len {
        sum = sum.wrapping_add(unsafe { core::ptr::read(base.add(i)) });
    }
    sum == 0
}

/// Scans the EBDA and the BIOS read-only area for the "RSD PTR " signature.
fn find_rsdp() -> Option<u64> {
    const SIG: &[u8; 8] = b"RSD PTR ";

    let scan = |start: u64, end: u64| -> Option<u64> {
        let mut addr = start;
        while addr < end {
            let ptr = phys_to_virt(addr).as_ptr::<[u8; 8]>();
            if unsafe { core::ptr::read_unaligned(ptr) } == *SIG {
                return Some(addr);
            }
            addr += 16;
        }
        None
    };

    let ebda_segment = unsafe { core::ptr::read_unaligned(phys_to_virt(0x40E).as_ptr::<u16>()) };
    let ebda = (ebda_segment as u64) << 4;
    if ebda != 0 {
        if let Some(a) = scan(ebda, ebda + 1024) {
            return Some(a);
        }
    }
    scan(0xE_0000, 0x10_0000)
}

fn load_root_table() -> Option<RootTable> {
    let rsdp_phys = find_rsdp()?;

    #[repr(C, packed)]
    struct RsdpV1 {
        signature: [u8; 8],
        checksum: u8,
        oem_id: [u8; 6],
        revision: u8,
        rsdt_address: u32,
    }
    #[repr(C, packed)]
    struct RsdpV2Extra {
        length: u32,
        xsdt_address: u64,
        extended_checksum: u8,
        reserved: [u8; 3],
    }

    let v1 = unsafe { core::ptr::read_unaligned(phys_to_virt(rsdp_phys).as_ptr::<RsdpV1>()) };
    if !checksum_ok(rsdp_phys, core::mem::size_of::<RsdpV1>()) {
        return None;
    }

    let (table_phys, entry_width) = if v1.revision >= 2 {
        let extra = unsafe {
            core::ptr::read_unaligned(
                phys_to_virt(rsdp_phys + core::mem::size_of::<RsdpV1>() as u64).as_ptr::<RsdpV2Extra>(),
            )
        };
        (extra.xsdt_address, 8u64)
    } else {
        (v1.rsdt_address as u64, 4u64)
    };

    let header = unsafe { read_header(table_phys) };
    let body_len = header.length as usize - core::mem::size_of::<AcpiTableHeader>();
    let entry_count = body_len / entry_width as usize;
    let body_start = table_phys + core::mem::size_of::<AcpiTableHeader>() as u64;

    let mut entries = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let entry_addr = body_start + i as u64 * entry_width;
        let phys = if entry_width == 8 {
            unsafe { core::ptr::read_unaligned(phys_to_virt(entry_addr).as_ptr::<u64>()) }
        } else {
            unsafe { core::ptr::read_unaligned(phys_to_virt(entry_addr).as_ptr::<u32>()) as u64 }
        };
        entries.push(phys);
    }

    Some(RootTable { entries })
}

/// Finds the first top-level table whose signature matches `sig` (e.g. `b"APIC"` for the MADT).
pub fn find_table(sig: &[u8; 4]) -> Option<AcpiTable> {
    let root = load_root_table()?;
    for &addr in &root.entries {
        let header = unsafe { read_header(addr) };
        if &header.signature == sig {
            return Some(AcpiTable { header, address: addr });
        }
    }
    None
}

/// Walks the MADT's variable-length entry list, collecting Local APIC
/// (type 0) and I/O APIC (type 1) entries.
pub fn parse_madt() -> Option<MadtInfo> {
    let madt = find_table(b"APIC")?;

    #[repr(C, packed)]
    struct MadtBody {
        local_apic_address: u32,
        flags: u32,
    }
    #[repr(C, packed)]
    struct EntryHeader {
        entry_type: u8,
        length: u8,
    }
    #[repr(C, packed)]
    struct LocalApicRaw {
        header: EntryHeader,
        processor_id: u8,
        apic_id: u8,
        flags: u32,
    }
    #[repr(C, packed)]
    struct IoApicRaw {
        header: EntryHeader,
        id: u8,
        reserved: u8,
        address: u32,
        gsi_base: u32,
    }

    let body_phys = madt.address + core::mem::size_of::<AcpiTableHeader>() as u64;
    let body = unsafe { core::ptr::read_unaligned(phys_to_virt(body_phys).as_ptr::<MadtBody>()) };

    let mut local_apics = Vec::new();
    let mut io_apics = Vec::new();

    let entries_start = body_phys + core::mem::size_of::<MadtBody>() as u64;
    let entries_len = madt.header.length as u64
        - core::mem::size_of::<AcpiTableHeader>() as u64
        - core::mem::size_of::<MadtBody>() as u64;

    let mut offset = 0u64;
    while offset < entries_len {
        let entry_addr = entries_start + offset;
        let entry = unsafe { core::ptr::read_unaligned(phys_to_virt(entry_addr).as_ptr::<EntryHeader>()) };
        if entry.length == 0 {
            break;
        }

        match entry.entry_type {
            0 => {
                let raw = unsafe { core::ptr::read_unaligned(phys_to_virt(entry_addr).as_ptr::<LocalApicRaw>()) };
                local_apics.push(LocalApicEntry {
                    processor_id: raw.processor_id,
                    apic_id: raw.apic_id,
                    flags: raw.flags,
                });
            }
            1 => {
                let raw = unsafe { core::ptr::read_unaligned(phys_to_virt(entry_addr).as_ptr::<IoApicRaw>()) };
                io_apics.push(IoApicEntry {
                    id: raw.id,
                    address: raw.address,
                    gsi_base: raw.gsi_base,
                });
            }
            _ => {}
        }

        offset += entry.length as u64;
    }

    Some(MadtInfo {
        local_apic_address: body.local_apic_address,
        local_apics,
        io_apics,
    })
}

pub fn init() {
    match find_table(b"APIC") {
        Some(_) => crate::kprintln!("acpi: MADT found"),
        None => crate::kprintln!("acpi: MADT not found, falling back to legacy PIC"),
    }
}

/// DSDT/SSDT parsing (AML evaluation) isn't needed by anything this kernel
/// drives — its one device is found by PCI config-space scan, not ACPI.
pub fn init_dsdt() {}
