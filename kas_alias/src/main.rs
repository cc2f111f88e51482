#![forbid(unused_must_use)]

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use kas_alias_core::addr2line::{AddressResolver, Addr2LineSession};
use kas_alias_core::config::Options;
use kas_alias_core::emit::{emit, ingest};
use kas_alias_core::engine::AliasEngine;
use kas_alias_core::store::SymbolStore;

mod toolpath;

/// Rewrites an `nm -n` kernel symbol listing so that every name colliding
/// with another symbol gains a distinguishing alias, addressable through
/// kallsyms.
#[derive(clap::Parser)]
struct Cli {
    /// Path to the `nm -n` listing to read.
    #[arg(long)]
    input: PathBuf,

    /// Path to the ELF kernel image passed to addr2line.
    #[arg(long)]
    image: PathBuf,

    /// Path to write the augmented listing to.
    #[arg(long)]
    output: PathBuf,

    /// Path to the `addr2line` binary. When omitted, searched for on `PATH`,
    /// honoring `CROSS_COMPILE` as a prefix.
    #[arg(long)]
    addr2line: Option<PathBuf>,

    /// Allow aliasing of data symbols (`b/B/d/D/r/R`), not just text symbols.
    #[arg(long)]
    alias_data: bool,

    /// Suppress the expanded compiler-artifact filter list, keeping only the
    /// always-applied CFI/NOP-prefix patterns.
    #[arg(long)]
    alias_data_all: bool,

    /// Emit progress diagnostics to standard error.
    #[arg(long)]
    verbose: bool,

    /// Reduce logging to warnings and errors only.
    #[arg(long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing(&cli);

    if let Err(err) = run(&cli) {
        eprintln!("kas_alias: {err:#}");
        std::process::exit(1);
    }

    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    let options = build_options(cli)?;

    let input_file = File::open(&options.input_path)
        .with_context(|| format!("opening input {}", options.input_path.display()))?;
    let mut reader = BufReader::new(input_file);

    let mut store = SymbolStore::new();
    let already_processed = ingest(&mut reader, &mut store).context("reading nm listing")?;
    info!(symbols = store.len(), already_processed, "ingested nm listing");

    let bridge = resolve_bridge(cli, &options)?;
    let mut engine =
        AliasEngine::from_options(&options, bridge).context("initializing alias engine")?;

    engine
        .run_pass(&mut store, already_processed)
        .context("running alias pass")?;
    engine.teardown();

    let output_file = File::create(&options.output_path)
        .with_context(|| format!("creating output {}", options.output_path.display()))?;
    let mut writer = BufWriter::new(output_file);
    emit(&store, &mut writer).context("writing augmented listing")?;

    Ok(())
}

/// Builds the [`Options`] the core is driven by. `kas_alias_core` never
/// touches argv; this is the one place that translates the parsed `Cli` into
/// the plain config struct the core's constructors take.
fn build_options(cli: &Cli) -> Result<Options> {
    let tool_path = match &cli.addr2line {
        Some(explicit) => explicit.clone(),
        None => toolpath::discover_addr2line().unwrap_or_default(),
    };

    Ok(Options {
        input_path: cli.input.clone(),
        image_path: cli.image.clone(),
        tool_path,
        output_path: cli.output.clone(),
        alias_data: cli.alias_data,
        alias_data_all: cli.alias_data_all,
        verbose: cli.verbose,
    })
}

/// Starts the addr2line bridge. When the tool path was given explicitly,
/// failure to start it is fatal (file-based suffixes were required by the
/// caller). When we had to discover it ourselves (or discovery failed, in
/// which case `options.tool_path` is empty), failure just means falling back
/// to serial suffixes for the whole run.
fn resolve_bridge(cli: &Cli, options: &Options) -> Result<Option<Box<dyn AddressResolver>>> {
    if cli.addr2line.is_some() {
        let session = Addr2LineSession::initialize(&options.tool_path, &options.image_path)
            .with_context(|| {
                format!(
                    "initializing addr2line bridge at {} (explicitly requested)",
                    options.tool_path.display()
                )
            })?;
        return Ok(Some(Box::new(session)));
    }

    if options.tool_path.as_os_str().is_empty() {
        warn!("no addr2line tool found on PATH, falling back to serial suffixes");
        return Ok(None);
    }

    match Addr2LineSession::initialize(&options.tool_path, &options.image_path) {
        Ok(session) => Ok(Some(Box::new(session))),
        Err(err) => {
            warn!(error = %err, "addr2line unavailable, falling back to serial suffixes");
            Ok(None)
        }
    }
}

fn configure_tracing(cli: &Cli) {
    use tracing_subscriber::filter::LevelFilter;

    let max_level = if cli.quiet {
        LevelFilter::WARN
    } else if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .init();
}
