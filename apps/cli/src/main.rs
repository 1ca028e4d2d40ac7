//! rulefeed CLI — rule-set feed aggregator.
//!
//! Fetches ad-block lists and geosite/geoip rule sets, merges them per
//! category, compiles them with sing-box and commits the result.

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
