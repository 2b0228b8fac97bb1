//! cli entrypoint for cairn.

mod app;

use anyhow::Result;
use clap::Parser;

/// main entrypoint for the cli.
fn main() -> Result<()> {
    app::init_logging();
    let cli = app::Cli::parse();
    app::run(cli)
}
