//! Retriever trait: the retrieval capability.
//!
//! Given a jurisdiction, the transaction-type terms of a run, and the
//! section's query text, a retriever returns ranked regulatory fragments.
//! "No results" is an empty vector, never an error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::RetrievalError;

/// A retrieval request built by one section node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalQuery {
    /// Natural-language query text (section-specific)
    pub text: String,

    /// Jurisdiction the fragments must apply to
    pub jurisdiction: String,

    /// Distinct transaction types of the run (e.g. "services", "IP")
    #[serde(default)]
    pub type_terms: Vec<String>,

    /// Maximum number of fragments to return
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    10
}

/// A ranked regulatory text fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegulatoryFragment {
    pub text: String,
    pub source_id: String,
    #[serde(default)]
    pub score: f32,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Backend name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Fetch up to `query.top_k` fragments, best first.
    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> std::result::Result<Vec<RegulatoryFragment>, RetrievalError>;
}

/// A retriever with no corpus. Every query yields no fragments.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyRetriever;

#[async_trait]
impl Retriever for EmptyRetriever {
    fn name(&self) -> &str {
        "empty"
    }

    async fn retrieve(
        &self,
        _query: &RetrievalQuery,
    ) -> std::result::Result<Vec<RegulatoryFragment>, RetrievalError> {
        Ok(Vec::new())
    }
}
