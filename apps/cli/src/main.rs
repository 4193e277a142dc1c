//! policytag CLI: page reconstruction and clause tagging for insurance policies.
//!
//! Turns a parsed policy document into per-page files and tagged chunk JSON
//! ready for embedding.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
