//! cli commands for cairn.

use anyhow::{Context, Result};
use cairn_engine::{
    deployment_parameters, load_defaults, load_parameters, pipeline_to_result, transform_document,
    validate_document, Kind, OverrideDefaults,
};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CAIRN_LOG";

/// top-level cli definition.
#[derive(Parser)]
#[command(name = "cairn")]
#[command(about = "Merge, validate and transform building-block settings into deployment parameters")]
pub(crate) struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// cli subcommands.
#[derive(Subcommand)]
enum Command {
    /// merge and validate every settings block of a parameters file.
    Validate {
        #[arg(short = 'f', long)]
        file: PathBuf,
        #[arg(long)]
        defaults: Option<PathBuf>,
    },
    /// produce the deployment parameters document.
    Transform {
        #[arg(short = 'f', long)]
        file: PathBuf,
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
        #[arg(long)]
        defaults: Option<PathBuf>,
    },
    /// list the supported settings keys.
    Kinds,
}

/// stderr logging filtered by `CAIRN_LOG`, warnings by default.
pub(crate) fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub(crate) fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Validate { file, defaults } => {
            let document = load_parameters(&file)?;
            let defaults = load_defaults_optional(defaults.as_deref())?;
            pipeline_to_result(validate_document(&document, &defaults))?;
            println!("ok");
        }
        Command::Transform {
            file,
            output,
            defaults,
        } => {
            let document = load_parameters(&file)?;
            let defaults = load_defaults_optional(defaults.as_deref())?;
            let accumulator = pipeline_to_result(transform_document(&document, &defaults))?;
            let rendered = deployment_parameters(&accumulator);
            match output {
                Some(path) => {
                    write_output(&path, &rendered)?;
                    println!("parameters written to {}", path.display());
                }
                None => println!("{}", render(&rendered)?),
            }
        }
        Command::Kinds => {
            for kind in Kind::ALL {
                println!("{kind}");
            }
        }
    }
    Ok(())
}

fn load_defaults_optional(path: Option<&Path>) -> Result<OverrideDefaults> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading override defaults");
            load_defaults(path)
        }
        None => Ok(OverrideDefaults::new()),
    }
}

fn render(document: &Value) -> Result<String> {
    serde_json::to_string_pretty(document).context("render parameters")
}

/// write the parameters document to disk.
fn write_output(path: &Path, document: &Value) -> Result<()> {
    let raw = render(document)?;
    fs::write(path, raw).with_context(|| format!("write parameters: {}", path.display()))
}
