//! SalesMind CLI entry point.

mod account;
mod capture;
mod chat;
mod cli;
mod talk;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Talk(args) => talk::run(args).await,
        Commands::Chat(args) => chat::run(args).await,
    }
}
