//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `skyuat_core` linkage and
//!   database bootstrap.
//! - Keep output deterministic for quick local sanity checks.

use skyuat_core::{AppContext, ContextConfig};

fn main() {
    println!("skyuat_core version={}", skyuat_core::core_version());

    let mut context = AppContext::new(ContextConfig::test_mode());
    match context.initialize() {
        Ok(()) => println!("skyuat_core bootstrap=ok"),
        Err(err) => {
            eprintln!("skyuat_core bootstrap=error {err}");
            std::process::exit(1);
        }
    }
    context.shutdown();
}
