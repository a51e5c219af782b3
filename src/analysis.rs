//! The text-analysis collaborator (critique, compression, embedding).
//!
//! Implementations live outside the core. Every caller treats a failure as
//! "no enrichment": a document is still written, just without a dense vector.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Analysis {
    #[serde(default)]
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub summary: Option<String>,
}

#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str, context: Option<&str>) -> Result<Analysis, AnalyzerError>;
}
