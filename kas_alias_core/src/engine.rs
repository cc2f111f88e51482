//! Alias engine
//!
//! Drives the pipeline once a [`SymbolStore`] has been populated:
//! detect-already-processed (done by the caller during ingest) → sort by
//! name → classify and enumerate duplicates → synthesize and insert aliases
//! → sort by address. Emission is the caller's job (see [`crate::emit`]).
//!
//! Holds the two pieces of state spec.md §9 calls out as the source's only
//! module-level globals — the suffix serial and the addr2line session — as
//! plain fields threaded through this value, never as `static`/`thread_local`.

use anyhow::{bail, Context};
use tracing::{debug, info};

use crate::addr2line::AddressResolver;
use crate::classify::{self, NameClassifier};
use crate::config::Options;
use crate::store::{SortKey, SymbolRecord, SymbolStore};

/// Owns the name classifier, the optional addr2line bridge, and the
/// run-scoped suffix serial. One instance per pass.
pub struct AliasEngine {
    classifier: NameClassifier,
    bridge: Option<Box<dyn AddressResolver>>,
    alias_data: bool,
    /// Monotonically increasing, shared across every fallback alias name
    /// synthesized in this pass (spec.md §3 "Alias engine scratch state").
    serial: u64,
}

impl AliasEngine {
    /// `bridge`'s own root (the image's directory, see
    /// [`AddressResolver::root`]) is used to rebase any path it returns;
    /// there is nothing to rebase against when there is no bridge. `bridge`
    /// is boxed as a trait object so tests can drive this engine with a
    /// fake resolver instead of a real `addr2line` child process.
    pub fn new(
        alias_data: bool,
        alias_data_all: bool,
        bridge: Option<Box<dyn AddressResolver>>,
    ) -> anyhow::Result<Self> {
        let classifier = NameClassifier::new(alias_data_all)
            .context("building name classifier for this run")?;
        Ok(Self {
            classifier,
            bridge,
            alias_data,
            serial: 0,
        })
    }

    /// Builds an engine from the run's [`Options`] (the config adapter the
    /// binary crate populates from argv) plus an already-initialized bridge.
    /// `options.input_path`/`image_path`/`tool_path`/`output_path`/`verbose`
    /// are the binary's concern (opening files, starting the bridge,
    /// configuring logging); only the two alias-policy flags are the
    /// engine's.
    pub fn from_options(
        options: &Options,
        bridge: Option<Box<dyn AddressResolver>>,
    ) -> anyhow::Result<Self> {
        Self::new(options.alias_data, options.alias_data_all, bridge)
    }

    /// Runs steps 3–6 of the pipeline (spec.md §4.2) against `store`.
    ///
    /// `already_processed` must be the flag computed while ingesting the
    /// input (see [`crate::emit::ingest`]); when set, this is a no-op,
    /// implementing the idempotence short-circuit.
    pub fn run_pass(&mut self, store: &mut SymbolStore, already_processed: bool) -> anyhow::Result<()> {
        if already_processed {
            info!("input already carries alias markers, skipping synthesis");
            return Ok(());
        }

        store.sort(SortKey::ByName);

        // Every occurrence of a duplicated name is a candidate, not only the
        // second and later ones (spec.md §9 open question, resolved as "k
        // aliases for k occurrences"). Snapshot them before mutating the
        // store, since insertion shifts positions.
        let candidates: Vec<SymbolRecord> = store
            .iter()
            .filter(|r| store.multiplicity(&r.name) > 1)
            .cloned()
            .collect();

        if candidates.is_empty() {
            debug!("no duplicate symbol names found");
            store.sort(SortKey::ByAddress);
            return Ok(());
        }

        debug!(count = candidates.len(), "duplicate symbol occurrences found");
        store.build_alphabet_index();

        for candidate in candidates {
            if self.classifier.is_filtered(&candidate.name) {
                continue;
            }
            if !classify::is_aliasable_type(candidate.sym_type, self.alias_data) {
                continue;
            }

            let alias_name = self.synthesize_alias_name(&candidate.name, candidate.address, store);

            let inserted = store.insert_after(
                candidate.address,
                alias_name.clone(),
                candidate.address,
                candidate.sym_type,
            );
            if !inserted {
                bail!(
                    "InsertAfter found no anchor at address {:#x} for alias {:?}: symbol store invariant broken",
                    candidate.address,
                    alias_name
                );
            }
        }

        store.sort(SortKey::ByAddress);
        #[cfg(debug_assertions)]
        store.assert_sorted_by_address();
        Ok(())
    }

    /// Releases the addr2line child process, if one was started. Explicit
    /// for symmetry with [`SymbolStore`]'s teardown; the bridge's `Drop`
    /// impl would do the same thing if this were never called.
    pub fn teardown(self) {
        drop(self.bridge);
    }

    /// Produces the alias name for `name`/`address`: the file-based form
    /// when the bridge resolves a location, the serial fallback otherwise.
    ///
    /// If a file-based alias would collide character-for-character with a
    /// name already present in the store (aggressive inlining can put two
    /// distinct addresses at the same source location), a secondary serial
    /// is appended to disambiguate, per spec.md §9's allowance.
    fn synthesize_alias_name(&mut self, name: &str, address: u64, store: &SymbolStore) -> String {
        if let Some(bridge) = self.bridge.as_mut() {
            let root = bridge.root().to_string();
            if let Some(path) = bridge.resolve(address) {
                if let Some(alias) = classify::file_based_alias(name, &path, &root) {
                    if store.multiplicity(&alias) == 0 {
                        return alias;
                    }
                    let disambiguated = classify::sanitize_alias(&format!("{alias}_{}", self.serial));
                    self.serial += 1;
                    return disambiguated;
                }
            }
        }

        let fallback = classify::serial_alias(name, self.serial);
        self.serial += 1;
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::{emit, ingest};
    use std::io::Cursor;

    fn engine_without_bridge(alias_data: bool) -> AliasEngine {
        AliasEngine::new(alias_data, false, None).unwrap()
    }

    #[test]
    fn pure_duplicate_text_gets_serial_aliases() {
        let mut store = SymbolStore::new();
        let mut input = Cursor::new(
            "ffffffff000001a0 t device_show\nffffffff000002b0 t device_show\n",
        );
        let already = ingest(&mut input, &mut store).unwrap();
        assert!(!already);

        let mut engine = engine_without_bridge(false);
        engine.run_pass(&mut store, already).unwrap();

        let names: Vec<_> = store.iter().map(|r| r.name.clone()).collect();
        assert_eq!(
            names,
            vec![
                "device_show".to_string(),
                "device_show__alias__0".to_string(),
                "device_show".to_string(),
                "device_show__alias__1".to_string(),
            ]
        );
    }

    #[test]
    fn filtered_prefix_gets_no_alias() {
        let mut store = SymbolStore::new();
        let mut input = Cursor::new(
            "ffffffff00000100 t __pfx_x\nffffffff00000200 t __pfx_x\n",
        );
        let already = ingest(&mut input, &mut store).unwrap();

        let mut engine = engine_without_bridge(false);
        engine.run_pass(&mut store, already).unwrap();

        assert_eq!(store.len(), 2);
        let names: Vec<_> = store.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["__pfx_x", "__pfx_x"]);
    }

    #[test]
    fn data_symbols_need_alias_data_flag() {
        let make_store = || {
            let mut store = SymbolStore::new();
            let mut input = Cursor::new(
                "ffffffff00000100 D shared_table\nffffffff00000200 D shared_table\n",
            );
            ingest(&mut input, &mut store).unwrap();
            store
        };

        let mut store = make_store();
        let mut engine = engine_without_bridge(false);
        engine.run_pass(&mut store, false).unwrap();
        assert_eq!(store.len(), 2);

        let mut store = make_store();
        let mut engine = engine_without_bridge(true);
        engine.run_pass(&mut store, false).unwrap();
        assert_eq!(store.len(), 4);
        let types: Vec<_> = store.iter().map(|r| r.sym_type).collect();
        assert!(types.iter().all(|&t| t == 'D'));
    }

    #[test]
    fn idempotent_on_its_own_output() {
        let mut store = SymbolStore::new();
        let mut input = Cursor::new(
            "ffffffff000001a0 t device_show\nffffffff000002b0 t device_show\n",
        );
        let already = ingest(&mut input, &mut store).unwrap();
        let mut engine = engine_without_bridge(false);
        engine.run_pass(&mut store, already).unwrap();

        let mut first_output = Vec::new();
        emit(&store, &mut first_output).unwrap();

        let mut second_store = SymbolStore::new();
        let mut second_input = Cursor::new(first_output.clone());
        let already2 = ingest(&mut second_input, &mut second_store).unwrap();
        assert!(already2);
        let mut engine2 = engine_without_bridge(false);
        engine2.run_pass(&mut second_store, already2).unwrap();

        let mut second_output = Vec::new();
        emit(&second_store, &mut second_output).unwrap();

        assert_eq!(first_output, second_output);
    }
}
