//! Init, Config and Roots commands.

use anyhow::{Context, Result, anyhow};

use fsindex::config::Settings;
use fsindex::indexing::root_source_for;

/// Run init command - create configuration file.
pub fn run_init(force: bool) -> Result<()> {
    let path = Settings::init_config_file(force).map_err(|e| anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> Result<()> {
    let rendered = toml::to_string_pretty(config).context("rendering settings")?;
    println!("{rendered}");
    Ok(())
}

/// Run roots command - list what would be crawled and watched.
pub fn run_roots(config: &Settings) -> Result<()> {
    let source = root_source_for(&config.indexing.roots);
    let roots = source.roots();
    if roots.is_empty() {
        eprintln!("No eligible roots found");
        return Ok(());
    }
    for root in roots {
        println!("{}", root.display());
    }
    for excluded in source.excluded() {
        println!("  excluded: {}", excluded.display());
    }
    Ok(())
}
