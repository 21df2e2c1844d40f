//! Search command.

use anyhow::Result;

use fsindex::indexing::IndexFacade;
use fsindex::query::is_searchable;
use fsindex::types::SearchResult;

/// Run search command - print ranked hits for the joined terms.
pub fn run_search(
    facade: &IndexFacade,
    terms: &[String],
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let text = terms.join(" ");
    let results = if is_searchable(&text) {
        match limit {
            Some(limit) => facade.search_with_limit(&text, limit)?,
            None => facade.search(&text)?,
        }
    } else {
        eprintln!("Query must not be blank or start with a wildcard");
        Vec::new()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_table(&results);
    }
    Ok(())
}

fn print_table(results: &[SearchResult]) {
    if results.is_empty() {
        println!("No matches");
        return;
    }
    for result in results {
        let marker = if result.is_directory { "/" } else { "" };
        println!(
            "{:>8.3}  {}  {}{marker}",
            result.score,
            result.modified.format("%Y-%m-%d %H:%M"),
            result.full_path
        );
    }
}
