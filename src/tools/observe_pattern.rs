use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ObservePatternParams {
    #[schemars(
        description = "Pattern content. Its hash identifies the pattern unless pattern_hash is given."
    )]
    pub content: Option<serde_json::Value>,

    #[schemars(description = "Precomputed 16-hex-char pattern hash")]
    pub pattern_hash: Option<String>,

    #[schemars(description = "Session that observed the pattern")]
    pub session_id: String,

    #[schemars(description = "Model that produced the pattern, e.g. 'claude'. Defaults to 'unknown'.")]
    pub model_source: Option<String>,

    #[schemars(
        description = "When set (e.g. 'self_reference', 'contradiction', 'drift'), the content is also queued as a background frame for cold-path review. Requires content."
    )]
    pub pattern_type: Option<String>,

    #[schemars(description = "Reasoning fragments to attach to the queued frame")]
    pub thinking_atoms: Option<Vec<serde_json::Value>>,
}
