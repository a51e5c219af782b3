//! MCP `propose_update` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters for the `propose_update` MCP tool.
///
/// A proposal passes the arbiter gates, then the version check, before the
/// delta is overlaid onto the stored grammar.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProposeUpdateParams {
    #[schemars(description = "Keys to overlay onto the grammar")]
    #[serde(default)]
    pub delta: serde_json::Map<String, serde_json::Value>,

    #[schemars(
        description = "Per-domain deltas keyed by domain name ('now', 'self', 'projected'). They are merged by tracker confidence into the delta. Use instead of delta."
    )]
    pub domain_deltas: Option<BTreeMap<String, serde_json::Map<String, serde_json::Value>>>,

    #[schemars(
        description = "Grammar version the delta was computed against. A stale version returns a conflict with the current version."
    )]
    pub base_version: u64,

    #[schemars(description = "Clock domain of the proposer: 'hot' (default), 'cold', or 'stream'")]
    pub origin: Option<String>,

    #[schemars(
        description = "For cold-path proposals: the grammar version the background frame observed. Defaults to base_version."
    )]
    pub source_version: Option<u64>,

    #[schemars(
        description = "If true, only run the gates and report the decision without writing anything"
    )]
    pub dry_run: Option<bool>,
}
