//! MCP `recall` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `recall` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RecallParams {
    #[schemars(description = "Free-text query. Words of three or more letters are matched.")]
    pub query: String,

    /// Key patterns to scan, e.g. `ada:self:*`. Defaults to the configured namespaces.
    #[schemars(
        description = "Key glob patterns to search, e.g. 'ada:self:*'. Defaults to the configured namespaces."
    )]
    pub namespaces: Option<Vec<String>>,

    #[schemars(description = "Maximum number of results to return. Defaults to 10.")]
    pub top_k: Option<usize>,
}
