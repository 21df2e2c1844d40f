//! Index and Clear commands.

use std::time::Instant;

use anyhow::Result;

use fsindex::indexing::IndexFacade;

/// Run index command - rebuild the index from every root.
pub fn run_index(facade: &IndexFacade) -> Result<()> {
    let roots = facade.roots();
    if roots.is_empty() {
        eprintln!("No eligible roots found, the index will be empty");
    }

    let started = Instant::now();
    let stats = facade.create_index()?;

    println!(
        "Indexed {} directories and {} files from {} root(s) in {:.1}s",
        stats.directories,
        stats.files,
        stats.roots,
        started.elapsed().as_secs_f64()
    );
    if stats.errors > 0 {
        println!("{} entries could not be read (see logs with --verbose)", stats.errors);
    }
    Ok(())
}

/// Run clear command - drop every document.
pub fn run_clear(facade: &IndexFacade) -> Result<()> {
    let before = facade.document_count();
    facade.clear_index()?;
    println!("Removed {before} documents");
    Ok(())
}
