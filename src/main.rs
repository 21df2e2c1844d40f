use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use fsindex::{IndexFacade, Settings, logging};

mod cli;

use cli::commands::{index, init, search, watch};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::load().context("loading settings")?,
    };
    logging::init_with_config(&settings.logging, cli.verbose);

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&settings),
        Commands::Roots => init::run_roots(&settings),
        Commands::Index => index::run_index(&open(settings)?),
        Commands::Clear => index::run_clear(&open(settings)?),
        Commands::Search { text, limit, json } => {
            search::run_search(&open(settings)?, &text, limit, json)
        }
        Commands::Watch { no_crawl } => watch::run_watch(Arc::new(open(settings)?), no_crawl).await,
    }
}

fn open(settings: Settings) -> Result<IndexFacade> {
    let index_path = settings.index_path.clone();
    IndexFacade::new(Arc::new(settings))
        .with_context(|| format!("opening index at {}", index_path.display()))
}
