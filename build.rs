use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    // Host builds (library + tests) need no linker setup
    if env::var_os("CARGO_FEATURE_EMBEDDED").is_none() {
        return;
    }

    // Put memory.x where the linker can find it
    let out = PathBuf::from(env::var_os("OUT_DIR").unwrap());
    fs::copy("memory.x", out.join("memory.x")).unwrap();
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    // Only re-run the build script when memory.x is changed
    println!("cargo:rerun-if-changed=memory.x");
}
