//! Name classifier
//!
//! Decides whether a duplicated symbol name is eligible for aliasing at all
//! (the "never alias" filter list) and whether its one-character `nm` type
//! code is aliasable under the active configuration.
//!
//! Regexes are compiled exactly once, at construction, and reused for every
//! candidate in the run. Compiling per-candidate was observed to leak in one
//! upstream revision of the tool this is modeled on, and is a correctness
//! requirement here, not merely an optimization (see spec.md §9).

use anyhow::Context;
use regex::Regex;

use crate::addr2line::remove_prefix;

/// Patterns that always veto aliasing, regardless of configuration.
const ALWAYS_FILTERED: &[&str] = &[r"^__cfi_.*$", r"^__pfx_.*$"];

/// Patterns that veto aliasing unless `alias_data_all` is set.
const EXPANDED_FILTERED: &[&str] = &[
    r"^_*TRACE_SYSTEM.*$",
    r"^__already_done\.[0-9]+$",
    r"^___tp_str\.[0-9]+$",
    r"^___done\.[0-9]+$",
    r"^__print_once\.[0-9]+$",
    r"^_rs\.[0-9]+$",
    r"^__compound_literal\.[0-9]+$",
    r"^___once_key\.[0-9]+$",
    r"^__func__\.[0-9]+$",
    r"^__msg\.[0-9]+$",
    r"^CSWTCH\.[0-9]+$",
    r"^__flags\.[0-9]+$",
    r"^__wkey.*$",
    r"^__mkey.*$",
    r"^__key.*$",
];

/// Compiled, run-scoped filter list. Build once per [`crate::engine::AliasEngine`].
pub struct NameClassifier {
    filters: Vec<Regex>,
}

impl NameClassifier {
    /// Compiles the baseline filter list. When `alias_data_all` is set, only
    /// the two always-applied CFI/NOP-prefix patterns are compiled; the
    /// expanded list that guards compiler-generated artifacts is skipped.
    pub fn new(alias_data_all: bool) -> anyhow::Result<Self> {
        let mut patterns: Vec<&str> = ALWAYS_FILTERED.to_vec();
        if !alias_data_all {
            patterns.extend_from_slice(EXPANDED_FILTERED);
        }

        let filters = patterns
            .into_iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid filter regex {p:?}")))
            .collect::<anyhow::Result<Vec<_>>>()
            .context("compiling name classifier filter list")?;

        Ok(Self { filters })
    }

    /// Returns `true` if `name` matches any "never alias" pattern.
    pub fn is_filtered(&self, name: &str) -> bool {
        self.filters.iter().any(|re| re.is_match(name))
    }
}

/// Whether a symbol of the given one-character `nm` type code is aliasable.
///
/// Text symbols (`t`, `T`) are always aliasable. Data symbols
/// (`b`, `B`, `d`, `D`, `r`, `R`) are aliasable only when `alias_data` is set.
/// Every other type code is never aliasable.
pub fn is_aliasable_type(sym_type: char, alias_data: bool) -> bool {
    match sym_type {
        't' | 'T' => true,
        'b' | 'B' | 'd' | 'D' | 'r' | 'R' => alias_data,
        _ => false,
    }
}

/// Builds the file-based alias form `<name>@<relpath>`, where `relpath` is
/// `source_path` made relative to `root`. Returns `None` if `source_path`
/// does not start with `root` (the fallback serial form should be used
/// instead).
///
/// The result has every byte that is not alphanumeric or `@` replaced with
/// `_`, so downstream kallsyms consumers see a single identifier.
pub fn file_based_alias(name: &str, source_path: &str, root: &str) -> Option<String> {
    let relpath = remove_prefix(root, source_path)?;
    Some(sanitize_alias(&format!("{name}@{relpath}")))
}

/// Builds the fallback alias form `<name>__alias__<serial>`, used when
/// addr2line has no location for the candidate's address.
pub fn serial_alias(name: &str, serial: u64) -> String {
    format!("{name}__alias__{serial}")
}

/// Replaces every byte that is not ASCII-alphanumeric or `@` with `_`.
pub fn sanitize_alias(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '@' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_cfi_and_pfx_regardless_of_flag() {
        let c = NameClassifier::new(false).unwrap();
        assert!(c.is_filtered("__cfi_foo"));
        assert!(c.is_filtered("__pfx_foo"));

        let c_all = NameClassifier::new(true).unwrap();
        assert!(c_all.is_filtered("__cfi_foo"));
        assert!(c_all.is_filtered("__pfx_foo"));
    }

    #[test]
    fn expanded_filters_suppressed_by_alias_data_all() {
        let c = NameClassifier::new(false).unwrap();
        assert!(c.is_filtered("CSWTCH.12"));
        assert!(c.is_filtered("__key_foo"));

        let c_all = NameClassifier::new(true).unwrap();
        assert!(!c_all.is_filtered("CSWTCH.12"));
        assert!(!c_all.is_filtered("__key_foo"));
    }

    #[test]
    fn ordinary_names_pass() {
        let c = NameClassifier::new(false).unwrap();
        assert!(!c.is_filtered("device_show"));
    }

    #[test]
    fn type_classifier_rules() {
        assert!(is_aliasable_type('t', false));
        assert!(is_aliasable_type('T', true));
        assert!(!is_aliasable_type('D', false));
        assert!(is_aliasable_type('D', true));
        assert!(is_aliasable_type('r', true));
        assert!(!is_aliasable_type('u', true));
    }

    #[test]
    fn file_based_alias_sanitizes_path_bytes() {
        let alias = file_based_alias("device_show", "/src/drivers/foo.c", "/src").unwrap();
        assert_eq!(alias, "device_show@_drivers_foo_c");
    }

    #[test]
    fn file_based_alias_keeps_line_number_suffix() {
        // addr2line hands the bridge `<path>:<line>`; the line rides along
        // through sanitization (spec.md §8 scenario 1).
        let alias = file_based_alias("device_show", "/src/drivers/foo.c:10", "/src").unwrap();
        assert_eq!(alias, "device_show@_drivers_foo_c_10");
    }

    #[test]
    fn file_based_alias_none_when_root_does_not_match() {
        assert!(file_based_alias("device_show", "/other/foo.c", "/src").is_none());
    }

    #[test]
    fn serial_alias_form() {
        assert_eq!(serial_alias("device_show", 0), "device_show__alias__0");
        assert_eq!(serial_alias("device_show", 1), "device_show__alias__1");
    }
}
