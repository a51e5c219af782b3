//! MCP server initialization for stdio and streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire up the
//! store, awareness context, promotion tracker, and MCP tool handler into a
//! running server.

use crate::tools::AdaTools;
use ada_recall::analysis::TextAnalyzer;
use ada_recall::awareness::promotion::{Notifier, PromotionTracker};
use ada_recall::awareness::AwarenessContext;
use ada_recall::config::AdaConfig;
use ada_recall::dispatch::RestDispatcher;
use ada_recall::error::DispatchError;
use ada_recall::store::{self, KvStore};
use anyhow::{Context, Result};
use rmcp::ServiceExt;
use std::sync::Arc;

struct SharedState {
    store: Arc<dyn KvStore>,
    awareness: Arc<AwarenessContext>,
    promotion: Arc<PromotionTracker>,
    analyzer: Option<Arc<dyn TextAnalyzer>>,
    config: Arc<AdaConfig>,
}

impl SharedState {
    fn tools(&self) -> AdaTools {
        AdaTools::new(
            self.store.clone(),
            self.awareness.clone(),
            self.promotion.clone(),
            self.analyzer.clone(),
            self.config.clone(),
        )
    }
}

/// Shared setup: open the store, build the awareness context and the
/// promotion tracker (with queue notifications when a token is configured).
async fn setup_shared_state(config: AdaConfig) -> Result<SharedState> {
    let store = store::open_store(&config.store).context("failed to open store")?;
    if let Err(e) = store.ping().await {
        tracing::warn!(error = %e, "store did not answer ping, continuing");
    }

    let awareness = Arc::new(AwarenessContext::new(store.clone(), &config));

    let mut promotion = PromotionTracker::new(store.clone(), config.promotion.clone());
    match RestDispatcher::new(&config.dispatch) {
        Ok(dispatcher) if !config.dispatch.callback_url.is_empty() => {
            promotion = promotion.with_notifier(Notifier {
                dispatcher: Arc::new(dispatcher),
                destination: config.dispatch.callback_url.clone(),
            });
            tracing::info!(callback = %config.dispatch.callback_url, "candidate notifications enabled");
        }
        Ok(_) => tracing::info!("no callback url configured, candidate notifications off"),
        Err(DispatchError::NotConfigured) => {
            tracing::info!("no queue token configured, candidate notifications off")
        }
        Err(e) => return Err(e).context("failed to build dispatcher"),
    }

    Ok(SharedState {
        store,
        awareness,
        promotion: Arc::new(promotion),
        // no in-tree analyzer: documents are stored with sparse vectors only
        analyzer: None,
        config: Arc::new(config),
    })
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: AdaConfig) -> Result<()> {
    tracing::info!("starting Ada MCP server on stdio");

    let state = setup_shared_state(config).await?;

    let transport = rmcp::transport::stdio();
    let server = state.tools().serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP transport.
pub async fn serve_http(config: AdaConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting Ada MCP server on HTTP");

    let state = Arc::new(setup_shared_state(config).await?);

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(state.tools()),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}
