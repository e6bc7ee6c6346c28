//! Build script - copies each binary's linker script into its own
//! directory under the output directory so that the linker finds the
//! right `memory.x` for the firmware and for the boot stage.

use std::env;
use std::fs;
use std::path::PathBuf;

/// (binary, memory script in the crate root)
const BINARIES: [(&str, &str); 2] = [("macropad", "memory.x"), ("macropad-boot", "boot-memory.x")];

fn main() {
    // Host builds (tests) do not link against memory.x.
    if env::var_os("CARGO_FEATURE_EMBEDDED").is_none() {
        println!("cargo:rerun-if-changed=build.rs");
        return;
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    for (bin, script) in BINARIES {
        let dir = out_dir.join(bin);
        fs::create_dir_all(&dir).expect("OUT_DIR is writable");
        fs::copy(script, dir.join("memory.x")).expect("memory script is readable");
        println!("cargo:rustc-link-arg-bin={}=-L{}", bin, dir.display());
        println!("cargo:rerun-if-changed={}", script);
    }

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    println!("cargo:rerun-if-changed=build.rs");
}
