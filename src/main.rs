//! gxcompiler CLI Entry Point
//!
//! Provides command-line access to workflow lowering and collection rebuilding.
//!
//! # Usage
//!
//! ```bash
//! # Lower a Format 2 workflow to the native format
//! gxcompiler convert pipeline.gxwf.yml
//!
//! # Resolve @import paths against another directory, write to a file
//! gxcompiler convert pipeline.gxwf.yml --workflow-dir ./tools --output pipeline.ga
//!
//! # Run a rule document against its test data
//! gxcompiler rules rules.yml --compact
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::{debug, info};
use serde::Serialize;

use gxcompiler::format2::{load_document, ConversionOptions, Converter, NoToolCatalog};
use gxcompiler::rules::RuleDocument;
use gxcompiler::{convert_path, APP_NAME, VERSION};

/// Lowers Galaxy Format 2 workflows and rebuilds collections from rules
#[derive(Parser, Debug)]
#[command(name = "gxcompiler", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a Format 2 workflow to the native step graph
    Convert {
        /// Path to the Format 2 workflow (YAML or JSON)
        workflow: PathBuf,

        /// Directory `@import` paths resolve against (default: the workflow's directory)
        #[arg(long)]
        workflow_dir: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Rebuild the test collection of a rule document
    Rules {
        /// Path to the rule document
        document: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Write the result to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Emit compact JSON
    #[arg(long)]
    compact: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .target(env_logger::Target::Stderr)
        .init();
}

/// Serializes a result and writes it to the requested destination.
fn emit<T: Serialize>(value: &T, output: &OutputArgs) -> Result<(), Box<dyn std::error::Error>> {
    let json = if output.compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };

    match &output.output {
        Some(path) => {
            fs::write(path, json)?;
            info!("Written to: {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn convert_workflow(
    workflow: &Path,
    workflow_dir: Option<PathBuf>,
    output: &OutputArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let native = match workflow_dir {
        Some(directory) => {
            debug!("Resolving imports against {}", directory.display());
            let options = ConversionOptions::default().with_workflow_directory(directory);
            Converter::new(options, &NoToolCatalog).convert(load_document(workflow)?)?
        }
        None => convert_path(workflow, &NoToolCatalog)?,
    };

    info!(
        "{} '{}' lowered to {} steps",
        "Converted".green(),
        native.name,
        native.len()
    );
    emit(&native, output)
}

fn rebuild(document: &Path, output: &OutputArgs) -> Result<(), Box<dyn std::error::Error>> {
    let collection = RuleDocument::load(document)?.run()?;
    info!(
        "{} '{}' collection with {} elements",
        "Rebuilt".green(),
        collection.collection_type,
        collection.element_count()
    );
    emit(&collection, output)
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    debug!("{} v{}", APP_NAME, VERSION);

    match cli.command {
        Command::Convert {
            workflow,
            workflow_dir,
            output,
        } => convert_workflow(&workflow, workflow_dir, &output),
        Command::Rules { document, output } => rebuild(&document, &output),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
