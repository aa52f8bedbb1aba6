//! lstmap CLI.
//!
//! Converts LST list-mode files into per-detector map histograms.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::needless_pass_by_value
)]

use clap::{Parser, Subcommand, ValueEnum};

use lstmap_core::DetectorTable;
use lstmap_io::{
    convert_file, convert_files, expand_inputs, ConversionOutput, FileReport, HistogramSink,
    LoadConfig, LoadStrategy,
};
use lstmap_lst::LstConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    LstmapIo(#[from] lstmap_io::Error),

    #[error("configuration error: {0}")]
    Lst(#[from] lstmap_lst::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{0}")]
    Unsupported(String),

    #[error("no .lst files found in the given inputs")]
    NoInput,

    #[error("{failed} of {total} file(s) failed")]
    Failed { failed: usize, total: usize },
}

/// How input files are read.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Load {
    /// Map files that fit the memory budget, stream the rest
    Auto,
    /// Always memory-map
    Mapped,
    /// Always use a buffered reader
    Streamed,
}

impl From<Load> for LoadStrategy {
    fn from(load: Load) -> Self {
        match load {
            Load::Auto => LoadStrategy::Auto,
            Load::Mapped => LoadStrategy::Mapped,
            Load::Streamed => LoadStrategy::Streamed,
        }
    }
}

/// List-mode (LST) map converter.
#[derive(Parser)]
#[command(name = "lstmap")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert LST files into per-detector histograms
    Convert {
        /// Input LST file(s) or directories searched recursively
        #[arg(required = true)]
        input: Vec<PathBuf>,

        /// Output directory for `<stem>.hdf5` files; omit for a dry run
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Detector layout JSON (defaults to the AGLAE layout)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Load strategy
        #[arg(long, value_enum, default_value = "auto")]
        load: Load,

        /// Fraction of available memory files may be mapped into
        #[arg(long, default_value = "0.5")]
        memory_fraction: f64,

        /// Explicit memory budget in bytes (overrides --memory-fraction)
        #[arg(long)]
        memory_budget: Option<usize>,

        /// Worker threads (defaults to one per core)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Show header, detector counts and decode statistics of an LST file
    Info {
        /// Input LST file
        input: PathBuf,

        /// Detector layout JSON (defaults to the AGLAE layout)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Sink for dry runs: outputs are dropped after being counted.
struct DiscardSink;

impl HistogramSink for DiscardSink {
    fn write(&mut self, _output: ConversionOutput) -> lstmap_io::Result<()> {
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Convert {
            input,
            output,
            config,
            load,
            memory_fraction,
            memory_budget,
            threads,
        } => {
            let input = expand_inputs(input.as_slice())?;
            if input.is_empty() {
                return Err(CliError::NoInput);
            }
            let table = load_table(config.as_deref())?;

            let mut load_config = LoadConfig::default()
                .with_strategy(load.into())
                .with_memory_fraction(memory_fraction);
            if let Some(bytes) = memory_budget {
                load_config = load_config.with_memory_budget_bytes(bytes);
            }

            if let Some(threads) = threads {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build_global()?;
            }

            let start = Instant::now();
            let reports = match &output {
                Some(dir) => convert_to_dir(input.as_slice(), &table, &load_config, dir)?,
                None => convert_files(input.as_slice(), &table, &load_config, &mut DiscardSink),
            };
            let elapsed = start.elapsed();

            let mut failed = 0usize;
            let mut total_events = 0u64;
            for report in &reports {
                match &report.result {
                    Ok(summary) => {
                        total_events += summary.total_events;
                        println!(
                            "{}: {} events, {} histograms, {} computed",
                            report.path.display(),
                            summary.total_events,
                            summary.histograms,
                            summary.computed
                        );
                    }
                    Err(err) => {
                        failed += 1;
                        eprintln!("{}: {}", report.path.display(), err);
                    }
                }
            }

            println!(
                "Converted {} of {} files in {:.2}s",
                reports.len() - failed,
                reports.len(),
                elapsed.as_secs_f64()
            );
            println!("Total events: {}", total_events);
            if let Some(dir) = &output {
                println!("Output: {}", dir.display());
            }

            if failed > 0 {
                return Err(CliError::Failed {
                    failed,
                    total: reports.len(),
                });
            }
        }

        Commands::Info {
            input,
            config,
            json,
        } => {
            let table = load_table(config.as_deref())?;
            let output = convert_file(&input, &table, &LoadConfig::default())?;
            let size = std::fs::metadata(&input)?.len();

            if json {
                println!("{}", serde_json::to_string_pretty(&info_json(&output, size))?);
            } else {
                print_info(&output, size);
            }
        }
    }

    Ok(())
}

fn load_table(config: Option<&Path>) -> Result<Arc<DetectorTable>> {
    let config = match config {
        Some(path) => LstConfig::from_file(path)?,
        None => LstConfig::aglae_defaults(),
    };
    Ok(Arc::new(config.to_table()?))
}

#[cfg(feature = "hdf5")]
fn convert_to_dir(
    input: &[PathBuf],
    table: &Arc<DetectorTable>,
    load: &LoadConfig,
    dir: &Path,
) -> Result<Vec<FileReport>> {
    use lstmap_io::{Hdf5Sink, HistogramWriteOptions};

    let mut sink = Hdf5Sink::create(dir, HistogramWriteOptions::default())?;
    Ok(convert_files(input, table, load, &mut sink))
}

#[cfg(not(feature = "hdf5"))]
fn convert_to_dir(
    _input: &[PathBuf],
    _table: &Arc<DetectorTable>,
    _load: &LoadConfig,
    _dir: &Path,
) -> Result<Vec<FileReport>> {
    Err(CliError::Unsupported(
        "writing histograms requires building with the `hdf5` feature".to_string(),
    ))
}

fn info_json(output: &ConversionOutput, size: u64) -> serde_json::Value {
    let event_counts: serde_json::Map<String, serde_json::Value> = output
        .event_counts
        .iter()
        .map(|(name, count)| (name.clone(), serde_json::Value::from(*count)))
        .collect();
    let computed: Vec<serde_json::Value> = output
        .computed
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.histogram.name,
                "sources": c.sources,
                "total": c.histogram.total(),
            })
        })
        .collect();

    serde_json::json!({
        "file": output.source.display().to_string(),
        "size_bytes": size,
        "attributes": output.attributes,
        "event_counts": event_counts,
        "computed": computed,
        "stats": output.stats,
    })
}

fn print_info(output: &ConversionOutput, size: u64) {
    println!("File: {}", output.source.display());
    println!("Size: {} bytes ({:.2} MB)", size, size as f64 / 1_000_000.0);

    for (key, value) in &output.attributes {
        println!("{}: {}", key, value);
    }

    println!("Detectors:");
    for (name, count) in &output.event_counts {
        println!("  {:<10} {}", name, count);
    }
    for computed in &output.computed {
        println!(
            "  {:<10} {} ({})",
            computed.histogram.name,
            computed.histogram.total(),
            computed.sources.join("+")
        );
    }

    let stats = &output.stats;
    println!("Words: {}", stats.words);
    println!("Event words: {}", stats.event_words);
    println!("Positioned events: {}", stats.positioned);
    println!("Unpositioned events: {}", stats.unpositioned);
    println!("Dropped fields: {}", stats.dropped_fields);
    println!("Ignored words: {}", stats.ignored_words);
    println!("Markers: {}", stats.markers);
    if stats.truncated {
        println!("Truncated: last event incomplete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_convert() {
        let cli = Cli::try_parse_from([
            "lstmap",
            "-v",
            "convert",
            "a.lst",
            "b.lst",
            "--load",
            "streamed",
            "-j",
            "2",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Convert {
                input,
                output,
                load,
                threads,
                ..
            } => {
                assert_eq!(input.len(), 2);
                assert!(output.is_none());
                assert!(matches!(
                    LoadStrategy::from(load),
                    LoadStrategy::Streamed
                ));
                assert_eq!(threads, Some(2));
            }
            Commands::Info { .. } => panic!("expected convert"),
        }
    }

    #[test]
    fn test_convert_requires_input() {
        assert!(Cli::try_parse_from(["lstmap", "convert"]).is_err());
    }
}
