//! datapipe CLI: enrich JSON records through a configured node pipeline.
//!
//! Nodes are declared in `~/.datapipe/datapipe.toml`; `datapipe run` pipes
//! records through them and prints the enriched result.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli)
}
