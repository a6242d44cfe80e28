//! SowScribe CLI: harvest wiki contract pages and chat with them.
//!
//! `harvest` turns every child page of a wiki page into a summary file;
//! `chat` opens an assistant session over those files.

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
