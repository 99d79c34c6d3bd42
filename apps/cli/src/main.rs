//! siren-enrich CLI — batch company data enrichment.
//!
//! Reads SIREN/SIRET identifiers from a CSV or JSON-lines file, fetches each
//! company's public registry page, and writes one CSV row per company found.

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
