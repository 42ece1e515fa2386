//! # Build Script
//!
//! Embeds the Windows Application Manifest (`app.manifest`) into the executable.
//!
//! The manifest controls:
//! - DPI Awareness, so the confirmation dialogs are not blurry on scaled displays.
//! - Common Controls v6, which gives `MessageBoxW` the themed look.
//! - `asInvoker`: pip installs into the user's interpreter, no UAC prompt wanted.

fn main() {
    println!("cargo:rerun-if-changed=app.manifest");
    // On non-Windows targets this is a no-op. A failed embed still leaves a working binary.
    let _ = embed_resource::compile("app.manifest", embed_resource::NONE);
}
