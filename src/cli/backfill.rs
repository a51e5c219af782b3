use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use ada_recall::config::AdaConfig;
use ada_recall::memory::hygiene::backfill_sparse;
use ada_recall::store;

/// Write sparse vectors for every document under `patterns` that lacks one.
pub async fn backfill(config: &AdaConfig, patterns: Vec<String>) -> Result<()> {
    let store = store::open_store(&config.store).context("failed to open store")?;
    let patterns = if patterns.is_empty() {
        config.search.namespaces.clone()
    } else {
        patterns
    };

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg} ({elapsed})")
            .context("invalid progress template")?,
    );
    pb.set_message(format!("backfilling {} pattern(s)", patterns.len()));
    pb.enable_steady_tick(Duration::from_millis(120));

    let report = backfill_sparse(store.as_ref(), &patterns, config.store.scan_count).await;
    pb.finish_and_clear();
    let report = report.context("backfill failed")?;

    println!("Sparse Backfill");
    println!("{}", "=".repeat(40));
    println!("  Scanned:     {}", report.scanned);
    println!("  Fixed:       {}", report.fixed);
    println!("  Already OK:  {}", report.already_ok);
    println!("  No content:  {}", report.no_content);
    println!("  Errors:      {}", report.errors);
    for key in &report.failed_keys {
        println!("    failed: {key}");
    }

    Ok(())
}
