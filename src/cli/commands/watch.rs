//! Watch command.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast::error::RecvError;

use fsindex::indexing::IndexFacade;
use fsindex::notifications::IndexEvent;

/// Run watch command - keep the index in sync until Ctrl-C.
pub async fn run_watch(facade: Arc<IndexFacade>, no_crawl: bool) -> Result<()> {
    let mut events = facade.subscribe();

    let crawl = if no_crawl {
        let watched = facade.watch()?;
        eprintln!("Watching {watched} root(s). Press Ctrl-C to stop.");
        None
    } else {
        eprintln!("Watching and rebuilding the index. Press Ctrl-C to stop.");
        Some(facade.start_background()?)
    };

    let crawl_done = async move {
        match crawl {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(crawl_done);
    let mut crawl_reported = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            done = &mut crawl_done, if !crawl_reported => {
                crawl_reported = true;
                match done {
                    Ok(Ok(stats)) => eprintln!(
                        "Initial crawl done: {} directories, {} files",
                        stats.directories, stats.files
                    ),
                    Ok(Err(e)) => eprintln!("Initial crawl failed: {e}"),
                    Err(e) => eprintln!("Initial crawl aborted: {e}"),
                }
            }

            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("({missed} notifications skipped)");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    facade.unwatch();
    eprintln!("Stopped watching");
    Ok(())
}

fn print_event(event: &IndexEvent) {
    match event {
        IndexEvent::DocumentAdded { path } => println!("+ {path}"),
        IndexEvent::DocumentRemoved { path } => println!("- {path}"),
        IndexEvent::Rebuilt => println!("* index rebuilt"),
        IndexEvent::Cleared => println!("* index cleared"),
    }
}
