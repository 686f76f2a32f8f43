use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod env;
mod ui;

use cli::app::{App, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let app = App::parse();
    init_tracing(app.verbose);

    env::init(&app.config)?;
    match app.cmd {
        Commands::Get(arg) => cli::get::run(arg).await,
        Commands::Call(arg) => cli::call::run(arg).await,
        Commands::Download(arg) => cli::download::run(arg).await,
        Commands::Cache(cmd) => cli::cache::run(cmd),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
