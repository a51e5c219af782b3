use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct BackfillSparseParams {
    #[schemars(
        description = "Key glob patterns to backfill. Defaults to the configured search namespaces."
    )]
    pub patterns: Option<Vec<String>>,

    #[schemars(description = "If true, only report per-pattern coverage without writing")]
    pub stats_only: Option<bool>,
}
