use anyhow::{Context, Result};

use ada_recall::config::AdaConfig;
use ada_recall::memory::search::{hybrid_search, SearchOptions};
use ada_recall::store;

/// Run a hybrid search from the terminal.
pub async fn search(config: &AdaConfig, query: &str, top_k: Option<usize>) -> Result<()> {
    let store = store::open_store(&config.store).context("failed to open store")?;

    let mut options = SearchOptions::from_config(&config.search, config.store.scan_count);
    if let Some(top_k) = top_k {
        options = options.with_top_k(top_k);
    }

    let hits = hybrid_search(store.as_ref(), query, &config.search.namespaces, &options)
        .await
        .context("search failed")?;

    if hits.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", hits.len());

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. [{}] {} (score: {:.2}{})",
            i + 1,
            hit.match_type,
            hit.key,
            hit.score,
            if hit.has_sparse { "" } else { ", unindexed" },
        );
        if !hit.content.is_empty() {
            println!("     {}", hit.content);
        }
        println!();
    }

    Ok(())
}
