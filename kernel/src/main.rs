#![no_std]
#![no_main]
#![feature(alloc_error_handler)]
#![feature(abi_x86_interrupt)]

extern crate alloc;

mod arch;
mod drivers;
mod mm;
mod serial;
mod sync;
mod util;

use bootloader_api::config::{BootloaderConfig, Mapping};
use bootloader_api::{entry_point, BootInfo};

pub static BOOTLOADER_CONFIG: BootloaderConfig = {
    let mut config = BootloaderConfig::new_default();
    // Precisamos do mapeamento de memória física para:
    // - ler page tables ativas via CR3
    // - mapear MMIO (PCI BARs do xmm7360)
    config.mappings.physical_memory = Some(Mapping::Dynamic);
    config.kernel_stack_size = 256 * 1024;
    config
};

entry_point!(kernel_main, config = &BOOTLOADER_CONFIG);

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    serial::init();
    util::banner();

    util::kprintln!("boot: inicializando arch/x86_64...");
    arch::init();

    util::kprintln!("boot: inicializando memória...");
    mm::init(boot_info);
    mm::vma::init();

    // ACPI deve ser inicializado antes do APIC para que o MADT seja usado
    util::kprintln!("boot: detectando ACPI...");
    drivers::acpi::init();

    // Tenta migrar para APIC (requer mm inicializado + ACPI para MADT);
    // o MSI do xmm7360 é entregue ao Local APIC, não ao PIC 8259.
    arch::init_late();

    util::kprintln!("boot: inicializando TSC...");
    if arch::tsc::init() {
        util::kprintln!("boot: TSC disponível");
    } else {
        util::kprintln!("boot: TSC não disponível");
    }

    util::kprintln!("boot: sondando modem xmm7360...");
    drivers::xmm7360::init();

    util::kprintln!("boot: habilitando interrupções...");
    arch::enable_interrupts();

    arch::halt_loop();
}

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    util::kprintln!("\n\n!!! KERNEL PANIC !!!");
    util::kprintln!("mensagem: {}", info.message());
    if let Some(loc) = info.location() {
        util::kprintln!("local: {}:{}:{}", loc.file(), loc.line(), loc.column());
    }
    util::kprintln!("halt.");
    arch::halt_loop();
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    util::kprintln!("ERRO: alocação falhou: {:?}", layout);
    arch::halt_loop();
}
