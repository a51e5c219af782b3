pub mod backfill_sparse;
pub mod observe_pattern;
pub mod propose_update;
pub mod recall;
pub mod remember;
pub mod tracker_status;

use backfill_sparse::BackfillSparseParams;
use observe_pattern::ObservePatternParams;
use propose_update::ProposeUpdateParams;
use recall::RecallParams;
use remember::RememberParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use std::sync::Arc;
use std::time::Duration;
use tracker_status::TrackerStatusParams;

use ada_recall::analysis::TextAnalyzer;
use ada_recall::awareness::arbiter::Proposal;
use ada_recall::awareness::bframe::{pattern_hash, BFrame};
use ada_recall::awareness::promotion::PromotionTracker;
use ada_recall::awareness::{AwarenessContext, ClockDomain};
use ada_recall::config::AdaConfig;
use ada_recall::memory::hygiene::{backfill_sparse, namespace_stats};
use ada_recall::memory::persist::persist_document;
use ada_recall::memory::search::{hybrid_search, SearchOptions};
use ada_recall::store::KvStore;

/// The Ada MCP tool handler. Holds the shared store, awareness context,
/// promotion tracker and config, and exposes the tools via `#[tool_router]`.
#[derive(Clone)]
pub struct AdaTools {
    tool_router: ToolRouter<Self>,
    store: Arc<dyn KvStore>,
    awareness: Arc<AwarenessContext>,
    promotion: Arc<PromotionTracker>,
    analyzer: Option<Arc<dyn TextAnalyzer>>,
    config: Arc<AdaConfig>,
}

fn parse_origin(origin: Option<&str>) -> Result<ClockDomain, String> {
    match origin.unwrap_or("hot") {
        "hot" => Ok(ClockDomain::Hot),
        "cold" => Ok(ClockDomain::Cold),
        "stream" => Ok(ClockDomain::Stream),
        other => Err(format!("unknown origin '{other}': expected hot, cold or stream")),
    }
}

#[tool_router]
impl AdaTools {
    pub fn new(
        store: Arc<dyn KvStore>,
        awareness: Arc<AwarenessContext>,
        promotion: Arc<PromotionTracker>,
        analyzer: Option<Arc<dyn TextAnalyzer>>,
        config: Arc<AdaConfig>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            store,
            awareness,
            promotion,
            analyzer,
            config,
        }
    }

    /// Hybrid sparse + substring search over stored documents.
    #[tool(description = "Search stored memories. Sparse term overlap ranks first; documents without a sparse index are matched by substring at a discounted score.")]
    async fn recall(
        &self,
        Parameters(params): Parameters<RecallParams>,
    ) -> Result<String, String> {
        if params.query.trim().is_empty() {
            return Err("query must not be empty".into());
        }
        let patterns = params
            .namespaces
            .unwrap_or_else(|| self.config.search.namespaces.clone());
        let mut options = SearchOptions::from_config(&self.config.search, self.config.store.scan_count);
        if let Some(top_k) = params.top_k {
            options = options.with_top_k(top_k.clamp(1, 100));
        }

        tracing::info!(query = %params.query, patterns = patterns.len(), "recall called");

        let hits = hybrid_search(self.store.as_ref(), &params.query, &patterns, &options)
            .await
            .map_err(|e| format!("search failed: {e}"))?;

        serde_json::to_string(&serde_json::json!({
            "results": hits,
            "total": hits.len(),
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Store a document with a sparse index and, when available, a dense vector.
    #[tool(description = "Store a memory document. It is indexed for recall immediately and expires after the configured TTL.")]
    async fn remember(
        &self,
        Parameters(params): Parameters<RememberParams>,
    ) -> Result<String, String> {
        if params.content.is_empty() {
            return Err("content must not be empty".into());
        }
        let namespace = params.namespace.as_deref().unwrap_or("memory");
        if namespace.is_empty() || namespace.contains(['*', '?', '[']) {
            return Err("namespace must be a plain key segment".into());
        }

        tracing::info!(content_len = params.content.len(), namespace = %namespace, "remember called");

        let receipt = persist_document(
            self.store.as_ref(),
            self.analyzer.as_deref(),
            namespace,
            params.id,
            &params.content,
            params.metadata,
            &self.config.persist,
        )
        .await
        .map_err(|e| format!("store failed: {e}"))?;

        serde_json::to_string(&receipt).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Gate and apply a grammar delta.
    #[tool(description = "Propose a grammar update. Returns accepted (with new version and diff id), rejected or deferred (with reason and evidence), or conflict (retry against the current version). Proposals are deferred once the 'now' domain is older than arbiter.max_staleness_secs (30 s by default), so an idle server defers until 'now' is refreshed with tracker_status{observe: \"now\"}.")]
    async fn propose_update(
        &self,
        Parameters(params): Parameters<ProposeUpdateParams>,
    ) -> Result<String, String> {
        let delta = match params.domain_deltas {
            Some(deltas) if !params.delta.is_empty() && !deltas.is_empty() => {
                return Err("pass either delta or domain_deltas, not both".into())
            }
            Some(deltas) if !deltas.is_empty() => self.awareness.merge_deltas(&deltas).await,
            _ => params.delta,
        };

        let proposal = Proposal {
            delta,
            base_version: params.base_version,
            origin: parse_origin(params.origin.as_deref())?,
            source_version: params.source_version,
        };

        tracing::info!(
            keys = proposal.delta.len(),
            base_version = proposal.base_version,
            origin = %proposal.origin,
            "propose_update called"
        );

        if params.dry_run.unwrap_or(false) {
            let decision = self.awareness.evaluate(&proposal).await;
            return serde_json::to_string(&decision)
                .map_err(|e| format!("serialization failed: {e}"));
        }

        let outcome = self
            .awareness
            .submit(proposal)
            .await
            .map_err(|e| format!("update failed: {e}"))?;
        serde_json::to_string(&outcome).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Record one observation of a content pattern.
    #[tool(description = "Record an observation of a content pattern from a session and model. Promotes the pattern to CANDIDATE once it is corroborated across sessions and models. With pattern_type, the content is also queued as a background frame.")]
    async fn observe_pattern(
        &self,
        Parameters(params): Parameters<ObservePatternParams>,
    ) -> Result<String, String> {
        if params.session_id.is_empty() {
            return Err("session_id must not be empty".into());
        }
        let model = params.model_source.as_deref().unwrap_or("unknown");

        let frame = match (&params.pattern_type, &params.content) {
            (Some(kind), Some(content)) if !kind.is_empty() => {
                let version = self.awareness.grammar_version().await;
                let frame = BFrame::new(&params.session_id, version, kind, content.clone(), model)
                    .with_thinking_atoms(params.thinking_atoms.unwrap_or_default());
                Some(frame)
            }
            (Some(_), None) => return Err("pattern_type requires content".into()),
            _ => None,
        };

        let hash = match (&frame, &params.pattern_hash, &params.content) {
            (Some(frame), _, _) => frame.pattern_hash.clone(),
            (None, Some(hash), _) if !hash.is_empty() => hash.clone(),
            (None, _, Some(content)) => pattern_hash(content),
            _ => return Err("either pattern_hash or content is required".into()),
        };

        tracing::info!(pattern = %hash, session = %params.session_id, model = %model, "observe_pattern called");

        let outcome = self
            .promotion
            .record(&hash, &params.session_id, model, params.content)
            .await
            .map_err(|e| format!("observation failed: {e}"))?;

        let mut response =
            serde_json::to_value(&outcome).map_err(|e| format!("serialization failed: {e}"))?;
        if let (Some(frame), Some(body)) = (&frame, response.as_object_mut()) {
            let delay = Duration::from_secs(self.config.dispatch.default_delay_secs);
            let emission = self.promotion.emit_frame(frame, delay).await;
            body.insert(
                "frame".into(),
                serde_json::to_value(&emission).map_err(|e| format!("serialization failed: {e}"))?,
            );
        }
        serde_json::to_string(&response).map_err(|e| format!("serialization failed: {e}"))
    }

    /// Report tracker state, optionally after recording an observation.
    #[tool(description = "Report grammar version, per-domain staleness, uncertainty and merge weights, and optionally recent arbiter rejections.")]
    async fn tracker_status(
        &self,
        Parameters(params): Parameters<TrackerStatusParams>,
    ) -> Result<String, String> {
        if let Some(domain) = &params.observe {
            self.awareness
                .observe_domain(domain, params.uncertainty)
                .await
                .map_err(|e| e.to_string())?;
        }
        let status = self.awareness.status().await;

        let rejections = match params.rejections.unwrap_or(0) {
            0 => Vec::new(),
            n => self
                .awareness
                .recent_rejections(n.min(100))
                .await
                .map_err(|e| format!("failed to read rejections: {e}"))?,
        };

        serde_json::to_string(&serde_json::json!({
            "status": status,
            "rejections": rejections,
        }))
        .map_err(|e| format!("serialization failed: {e}"))
    }

    /// Index documents that were stored without a sparse vector.
    #[tool(description = "Backfill sparse vectors for documents missing one, or with stats_only=true report per-pattern coverage.")]
    async fn backfill_sparse(
        &self,
        Parameters(params): Parameters<BackfillSparseParams>,
    ) -> Result<String, String> {
        let patterns = params
            .patterns
            .unwrap_or_else(|| self.config.search.namespaces.clone());
        let scan_count = self.config.store.scan_count;

        tracing::info!(patterns = patterns.len(), "backfill_sparse called");

        if params.stats_only.unwrap_or(false) {
            let stats = namespace_stats(self.store.as_ref(), &patterns, scan_count)
                .await
                .map_err(|e| format!("stats failed: {e}"))?;
            return serde_json::to_string(&stats).map_err(|e| format!("serialization failed: {e}"));
        }

        let report = backfill_sparse(self.store.as_ref(), &patterns, scan_count)
            .await
            .map_err(|e| format!("backfill failed: {e}"))?;
        serde_json::to_string(&report).map_err(|e| format!("serialization failed: {e}"))
    }
}

#[tool_handler]
impl ServerHandler for AdaTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Ada memory server. Use recall to search, remember to store, \
                 propose_update to change shared grammar through the arbiter, and \
                 observe_pattern to corroborate background patterns."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
