//! Build script for hwspoof-inception-layer
//!
//! Compiles the C bodies of the variadic exec wrappers; stable Rust can
//! call variadic functions but cannot define them.

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "linux" {
        println!("cargo:rerun-if-changed=src/c/variadic_exec.c");

        cc::Build::new()
            .file("src/c/variadic_exec.c")
            .opt_level(2)
            .compile("variadic_exec");
    }
}
