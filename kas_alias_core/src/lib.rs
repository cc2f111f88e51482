//! Core engine for `kas_alias`.
//!
//! Rewrites an `nm -n`-format symbol listing of a compiled kernel image so
//! that every symbol name colliding with another (same name, different
//! address) gains a synthetic alias, making otherwise-indistinguishable
//! symbols individually addressable through the kernel's `kallsyms`
//! interfaces.
//!
//! This crate is the core only: command-line parsing, environment
//! discovery, and kernel build-system integration live in the `kas_alias`
//! binary crate, which drives this library.
//!
//! # References
//! * <https://www.kernel.org/doc/html/latest/trace/kprobetrace.html>

#![forbid(unused_must_use)]
#![warn(missing_docs)]

pub mod addr2line;
pub mod classify;
pub mod config;
pub mod emit;
pub mod engine;
pub mod store;

pub use addr2line::{AddressResolver, Addr2LineSession};
pub use config::Options;
pub use engine::AliasEngine;
pub use store::{SortKey, SymbolRecord, SymbolStore};
