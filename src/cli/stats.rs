use anyhow::{Context, Result};

use ada_recall::config::AdaConfig;
use ada_recall::memory::hygiene::namespace_stats;
use ada_recall::store;

/// Display per-namespace document counts and sparse coverage.
pub async fn stats(config: &AdaConfig) -> Result<()> {
    let store = store::open_store(&config.store).context("failed to open store")?;
    let rows = namespace_stats(store.as_ref(), &config.search.namespaces, config.store.scan_count)
        .await
        .context("failed to collect namespace stats")?;

    println!("Namespace Statistics");
    println!("{}", "=".repeat(40));
    println!("  {:<20} {:>8} {:>10}", "pattern", "total", "unindexed");
    for row in &rows {
        println!("  {:<20} {:>8} {:>10}", row.pattern, row.total, row.missing_sparse);
    }
    let total: usize = rows.iter().map(|r| r.total).sum();
    let missing: usize = rows.iter().map(|r| r.missing_sparse).sum();
    println!();
    println!("  Documents:           {total}");
    println!("  Missing sparse:      {missing}");
    if missing > 0 {
        println!("  Run `ada-recall backfill` to index them.");
    }

    Ok(())
}
