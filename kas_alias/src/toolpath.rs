//! Environment discovery: locating `addr2line` when the caller didn't pass
//! `--addr2line` explicitly. Out of scope for `kas_alias_core` per spec.md
//! §1 — this is exactly the kind of build-system glue the core treats as an
//! external collaborator.

use std::path::PathBuf;

/// Looks for a cross-prefixed `addr2line` first (honoring `CROSS_COMPILE`,
/// the same environment variable the kernel build system uses to select a
/// cross toolchain), then falls back to a plain `addr2line` on `PATH`.
pub fn discover_addr2line() -> Option<PathBuf> {
    if let Ok(cross_compile) = std::env::var("CROSS_COMPILE") {
        if !cross_compile.is_empty() {
            let candidate = format!("{cross_compile}addr2line");
            if let Ok(path) = which::which(&candidate) {
                return Some(path);
            }
        }
    }

    which::which("addr2line").ok()
}
