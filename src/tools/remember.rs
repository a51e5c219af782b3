use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RememberParams {
    #[schemars(description = "Text of the memory")]
    pub content: String,

    #[schemars(
        description = "Namespace segment of the key: the document is stored at 'ada:{namespace}:{id}'. Defaults to 'memory'."
    )]
    pub namespace: Option<String>,

    #[schemars(description = "Document id. A time-ordered UUID is generated when omitted.")]
    pub id: Option<String>,

    #[schemars(description = "Optional JSON object stored alongside the content")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}
