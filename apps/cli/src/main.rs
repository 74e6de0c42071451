//! StoryGraph CLI: shelves, journal and book updates from the terminal.
//!
//! Logs in with the stored credentials, runs one command, and writes the
//! session cookie back so the next run can skip the sign-in form.

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
