//! CLI `doctor` command: check the store connection and print a config summary.

use anyhow::Result;
use std::time::Instant;

use ada_recall::config::{default_config_path, AdaConfig};
use ada_recall::store;

/// Ping the configured store and print a health report.
pub async fn doctor(config: &AdaConfig) -> Result<()> {
    let config_path = default_config_path();

    println!("Ada Health Report");
    println!("=================");
    println!();
    println!(
        "Config file:       {} ({})",
        config_path.display(),
        if config_path.exists() { "found" } else { "defaults" }
    );
    println!();
    println!("Store:");
    if config.store.url.is_empty() {
        println!("  Backend:         in-process (nothing persists across runs)");
        println!("  Set ADA_STORE_URL / UPSTASH_REDIS_REST_URL to use a hosted cache.");
    } else {
        println!("  Backend:         {}", config.store.url);
        println!("  Token:           {}", if config.store.token.is_empty() { "(not set)" } else { "set" });
        println!("  Timeout:         {}s", config.store.timeout_secs);
    }

    match store::open_store(&config.store) {
        Ok(store) => {
            let started = Instant::now();
            match store.ping().await {
                Ok(()) => println!("  Ping:            OK ({} ms)", started.elapsed().as_millis()),
                Err(e) if e.is_transient() => println!("  Ping:            UNREACHABLE ({e})"),
                Err(e) => println!("  Ping:            FAILED ({e})"),
            }
        }
        Err(e) => println!("  Client:          FAILED ({e})"),
    }

    println!();
    println!("Search namespaces: {}", config.search.namespaces.join(", "));
    println!(
        "Tracker domains:   {}",
        config.tracker.domains.keys().cloned().collect::<Vec<_>>().join(", ")
    );
    println!("Grammar key:       {}", config.tracker.grammar_key);
    println!(
        "Queue:             {}",
        if config.dispatch.token.is_empty() { "not configured" } else { "configured" }
    );

    Ok(())
}
