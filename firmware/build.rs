//! Build script for the fan controller firmware
//!
//! Handles:
//! - Linker scripts for the embedded binary (cortex-m-rt and defmt)
//! - Memory layout configuration (`memory.x`, which reserves the config page)

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=memory.x");

    // Host builds (tests, tooling) link normally.
    if env::var_os("CARGO_FEATURE_EMBEDDED").is_none() {
        return;
    }

    // Put the linker script somewhere the linker can find it
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::copy("memory.x", out.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
}
