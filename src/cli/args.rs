//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Live filesystem name index
#[derive(Parser, Debug)]
#[command(
    name = "fsindex",
    version = env!("CARGO_PKG_VERSION"),
    about = "Index file and directory names, keep the index live, search it fuzzily",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  fsindex init\n  fsindex index\n  fsindex search quarterly report --limit 20\n  fsindex watch"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true, env = "FSINDEX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log progress at info level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .fsindex directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Rebuild the index from every root
    #[command(about = "Crawl all roots into a fresh index")]
    Index,

    /// Remove every document from the index
    #[command(about = "Empty the index")]
    Clear,

    /// Search the index
    #[command(
        about = "Fuzzy search names, paths and modification dates",
        after_help = "Every term must match. Terms tolerate small typos:\n  fsindex search buidl log\n  fsindex search 2024-03 invoice --json"
    )]
    Search {
        /// Search terms
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Maximum number of results (overrides config)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Keep the index in sync until interrupted
    #[command(about = "Watch all roots and apply changes until Ctrl-C")]
    Watch {
        /// Start watching without rebuilding the index first
        #[arg(long)]
        no_crawl: bool,
    },

    /// List the roots that would be crawled and watched
    #[command(about = "Show configured or discovered roots")]
    Roots,

    /// Show current configuration settings
    #[command(about = "Display effective settings")]
    Config,
}
