//! MCP `tracker_status` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `tracker_status` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TrackerStatusParams {
    /// Domain to mark as freshly observed before reporting.
    #[schemars(
        description = "Optional domain ('now', 'self', 'projected') to record an observation on before reporting"
    )]
    pub observe: Option<String>,

    #[schemars(description = "Explicit new uncertainty for the observed domain")]
    pub uncertainty: Option<f64>,

    #[schemars(description = "Number of recent arbiter rejections to include. Defaults to 0.")]
    pub rejections: Option<usize>,
}
