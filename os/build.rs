use bootloader::{BootConfig, UefiBoot};
use std::path::PathBuf;

fn main() {
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());

    // Caminho do kernel - tenta artifact dependency primeiro, senão usa caminho direto
    let kernel_path = std::env::var("CARGO_BIN_FILE_XMM7360_KERNEL_xmm7360_kernel")
        .or_else(|_| std::env::var("CARGO_BIN_FILE_XMM7360_KERNEL"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            // Fallback: usa caminho direto do target
            let profile = std::env::var("PROFILE").unwrap_or_else(|_| "debug".to_string());
            let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
            let target_dir = manifest_dir.parent().unwrap().join(format!("target/x86_64-unknown-none/{}/xmm7360_kernel", profile));
            println!("cargo:rerun-if-changed={}", target_dir.display());
            target_dir
        });

    let config = BootConfig::default();
    let bios = out_dir.join("xmm7360-bios.img");
    let uefi = out_dir.join("xmm7360-uefi.img");

    bootloader::BiosBoot::new(&kernel_path)
        .set_boot_config(&config)
        .create_disk_image(&bios)
        .expect("criar BIOS image");

    UefiBoot::new(&kernel_path)
        .set_boot_config(&config)
        .create_disk_image(&uefi)
        .expect("criar UEFI image");

    println!("cargo:rustc-env=XMM7360_BIOS_IMG={}", bios.display());
    println!("cargo:rustc-env=XMM7360_UEFI_IMG={}", uefi.display());
}
