//! ICP qualifier CLI: find companies that match an ideal customer profile.
//!
//! Generates target profiles from a local knowledge base, discovers
//! candidates through site-scoped web search, and keeps the ones that are
//! relevant and large enough.

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
