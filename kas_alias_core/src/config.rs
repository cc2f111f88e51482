//! Configuration adapter
//!
//! The options the external CLI layer is responsible for collecting
//! (argument parsing, environment discovery, tool-path resolution — all out
//! of scope for this crate per spec.md §1). This struct is the seam: the
//! binary builds one and hands it to [`crate::engine::AliasEngine`].

use std::path::PathBuf;

/// Run configuration, enumerated in spec.md §6.
#[derive(Debug, Clone)]
pub struct Options {
    /// Path to the `nm -n` listing to read.
    pub input_path: PathBuf,
    /// Path to the ELF image passed to `addr2line`.
    pub image_path: PathBuf,
    /// Path to the `addr2line` binary (possibly cross-prefixed).
    pub tool_path: PathBuf,
    /// Path to write the augmented listing to.
    pub output_path: PathBuf,
    /// Allow aliasing of data symbols (`b/B/d/D/r/R`).
    pub alias_data: bool,
    /// Suppress the expanded filter list, keeping only the two baseline
    /// patterns that always apply.
    pub alias_data_all: bool,
    /// Emit progress diagnostics.
    pub verbose: bool,
}
