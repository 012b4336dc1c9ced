// build.rs for libgs-auto
//
// Handles the optional `bundled` feature: when active, copies the libgs
// shared library named by `GS_BUNDLE_LIB` into Cargo's output directory and
// generates a small Rust source file that embeds the bytes with
// `include_bytes!`.

use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=GS_BUNDLE_LIB");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_BUNDLED");

    if std::env::var("CARGO_FEATURE_BUNDLED").is_err() {
        return;
    }

    // ── Locate the source library ─────────────────────────────────────────
    let lib_src = match std::env::var("GS_BUNDLE_LIB") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => {
            panic!(
                "\n\
                 ┌─────────────────────────────────────────────────────────┐\n\
                 │  libgs-auto: `bundled` feature activated but            │\n\
                 │  `GS_BUNDLE_LIB` is not set.                            │\n\
                 │                                                         │\n\
                 │  Set it to the path of the Ghostscript shared library:  │\n\
                 │                                                         │\n\
                 │  macOS  : path/to/libgs.10.dylib                        │\n\
                 │  Linux  : path/to/libgs.so.10                           │\n\
                 │  Windows: path\\to\\gsdll64.dll                           │\n\
                 └─────────────────────────────────────────────────────────┘\n"
            )
        }
    };

    if !lib_src.exists() {
        panic!(
            "libgs-auto: GS_BUNDLE_LIB points to a file that does not exist: {}",
            lib_src.display()
        );
    }

    // ── Copy into OUT_DIR with a fixed, platform-neutral name ─────────────
    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set"));
    let lib_dest = out_dir.join("bundled_libgs");

    std::fs::copy(&lib_src, &lib_dest).unwrap_or_else(|e| {
        panic!(
            "libgs-auto: failed to copy {} → {}: {}",
            lib_src.display(),
            lib_dest.display(),
            e
        )
    });

    // `include_bytes!` needs a literal path at the expansion site, so the
    // invocation lives in a generated file pulled in with `include!()`.
    let bundled_rs = out_dir.join("bundled.rs");
    let code = r#"
/// The libgs shared library embedded at compile time.
pub static LIBGS_BYTES: &[u8] = include_bytes!("bundled_libgs");
"#;
    std::fs::write(&bundled_rs, code).unwrap_or_else(|e| {
        panic!(
            "libgs-auto: failed to write {}: {}",
            bundled_rs.display(),
            e
        )
    });

    println!("cargo:rerun-if-changed={}", lib_dest.display());
}
