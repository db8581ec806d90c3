//! The knowledge base: an in-process chunk index implementing `Retriever`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tpforge_core::error::RetrievalError;
use tpforge_core::provider::{EmbeddingRequest, Provider};
use tpforge_core::retrieval::{RegulatoryFragment, RetrievalQuery, Retriever};
use tracing::{debug, info, warn};

use crate::chunk::{KnowledgeChunk, dedup_ids, load_dir};
use crate::keyword;
use crate::vector::{rank_by_similarity, reciprocal_rank_fusion};

const RRF_K: u32 = 60;
const EMBED_BATCH: usize = 32;

/// How retrieval ranks chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    #[default]
    Keyword,
    /// Keyword and embedding rankings fused with RRF
    Hybrid,
}

struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
}

/// Regulatory chunks held in memory.
///
/// Cheap to share behind an `Arc`; concurrent retrievals only take a read lock.
pub struct KnowledgeBase {
    chunks: Arc<RwLock<Vec<KnowledgeChunk>>>,
    mode: SearchMode,
    min_score: f32,
    embedder: Option<Embedder>,
}

impl KnowledgeBase {
    /// Chunks reusing an earlier chunk's id are dropped.
    pub fn new(chunks: Vec<KnowledgeChunk>) -> Self {
        Self {
            chunks: Arc::new(RwLock::new(dedup_ids(chunks))),
            mode: SearchMode::Keyword,
            min_score: 0.0,
            embedder: None,
        }
    }

    /// Load every chunk under `dir` (see [`crate::chunk`] for the layout).
    pub fn load_dir(dir: &Path) -> Result<Self, RetrievalError> {
        Ok(Self::new(load_dir(dir)?))
    }

    /// Use `provider` for embeddings and switch to hybrid ranking.
    pub fn with_embedder(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.embedder = Some(Embedder {
            provider,
            model: model.into(),
        });
        self.mode = SearchMode::Hybrid;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }

    /// Insert `chunk`, replacing any chunk with the same id.
    pub async fn add(&self, chunk: KnowledgeChunk) {
        let mut chunks = self.chunks.write().await;
        match chunks.iter_mut().find(|c| c.id == chunk.id) {
            Some(existing) => *existing = chunk,
            None => chunks.push(chunk),
        }
    }

    /// Chunk counts per jurisdiction (`"*"` for agnostic chunks).
    pub async fn stats(&self) -> Vec<(String, usize)> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for chunk in self.chunks.read().await.iter() {
            let key = chunk.jurisdiction.clone().unwrap_or_else(|| "*".into());
            *counts.entry(key).or_default() += 1;
        }
        let mut stats: Vec<_> = counts.into_iter().collect();
        stats.sort();
        stats
    }

    /// Embed every chunk that has no embedding yet, in batches.
    ///
    /// Returns the number of chunks embedded. A no-op without an embedder.
    pub async fn embed_missing(&self) -> Result<usize, RetrievalError> {
        let Some(embedder) = &self.embedder else {
            return Ok(0);
        };

        // Chunks are only appended or replaced in place; a replaced chunk
        // no longer matches its pending text and is left for the next pass.
        let pending: Vec<(usize, String)> = self
            .chunks
            .read()
            .await
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.is_none())
            .map(|(i, c)| (i, c.text.clone()))
            .collect();

        let mut embedded: Vec<(&(usize, String), Vec<f32>)> = Vec::with_capacity(pending.len());
        for batch in pending.chunks(EMBED_BATCH) {
            let response = embedder
                .provider
                .embed(EmbeddingRequest {
                    model: embedder.model.clone(),
                    inputs: batch.iter().map(|(_, text)| text.clone()).collect(),
                })
                .await
                .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

            if response.embeddings.len() != batch.len() {
                return Err(RetrievalError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                )));
            }
            embedded.extend(batch.iter().zip(response.embeddings));
        }

        let mut chunks = self.chunks.write().await;
        let mut count = 0;
        for ((i, text), emb) in embedded {
            let target = chunks
                .get_mut(*i)
                .filter(|c| c.embedding.is_none() && c.text == *text);
            if let Some(chunk) = target {
                chunk.embedding = Some(emb);
                count += 1;
            }
        }
        info!(count, model = %embedder.model, "Embedded knowledge chunks");
        Ok(count)
    }

    async fn embed_query(&self, text: &str) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        let result = embedder
            .provider
            .embed(EmbeddingRequest {
                model: embedder.model.clone(),
                inputs: vec![text.to_string()],
            })
            .await;
        match result {
            Ok(resp) => resp.embeddings.into_iter().next(),
            Err(e) => {
                warn!(error = %e, "Query embedding failed, falling back to keyword ranking");
                None
            }
        }
    }
}

#[async_trait]
impl Retriever for KnowledgeBase {
    fn name(&self) -> &str {
        "knowledge_base"
    }

    async fn retrieve(
        &self,
        query: &RetrievalQuery,
    ) -> Result<Vec<RegulatoryFragment>, RetrievalError> {
        let search_text = if query.type_terms.is_empty() {
            query.text.clone()
        } else {
            format!("{} {}", query.text, query.type_terms.join(" "))
        };
        let terms = keyword::query_terms(&search_text);

        let query_embedding = match self.mode {
            SearchMode::Hybrid => self.embed_query(&query.text).await,
            SearchMode::Keyword => None,
        };

        let chunks = self.chunks.read().await;
        let eligible: Vec<&KnowledgeChunk> = chunks
            .iter()
            .filter(|c| c.applies_to(&query.jurisdiction))
            .collect();

        let mut keyword_ranked: Vec<(&KnowledgeChunk, f32)> = eligible
            .iter()
            .map(|c| (*c, keyword::score(&c.text, &terms)))
            .filter(|(_, s)| *s > 0.0 && *s >= self.min_score)
            .collect();
        keyword_ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let by_id: HashMap<&str, &KnowledgeChunk> =
            eligible.iter().map(|c| (c.id.as_str(), *c)).collect();

        let ranked: Vec<(&KnowledgeChunk, f32)> = match query_embedding {
            Some(q) => {
                let vector_ranked = rank_by_similarity(
                    eligible
                        .iter()
                        .filter_map(|c| c.embedding.as_deref().map(|e| (c.id.as_str(), e))),
                    &q,
                    self.min_score,
                );
                let kw_ids: Vec<&str> = keyword_ranked.iter().map(|(c, _)| c.id.as_str()).collect();
                let vec_ids: Vec<&str> = vector_ranked.iter().map(|(id, _)| *id).collect();
                reciprocal_rank_fusion(&kw_ids, &vec_ids, RRF_K, query.top_k)
                    .into_iter()
                    .filter_map(|(id, s)| by_id.get(id.as_str()).map(|c| (*c, s)))
                    .collect()
            }
            None => keyword_ranked,
        };

        let fragments: Vec<RegulatoryFragment> = ranked
            .into_iter()
            .take(query.top_k)
            .map(|(c, score)| RegulatoryFragment {
                text: c.text.clone(),
                source_id: c.id.clone(),
                score,
            })
            .collect();

        debug!(
            jurisdiction = %query.jurisdiction,
            eligible = eligible.len(),
            returned = fragments.len(),
            "Knowledge base retrieval"
        );
        Ok(fragments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpforge_core::error::ProviderError;
    use tpforge_core::message::Message;
    use tpforge_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    /// Embeds by counting two marker words, so similarity is predictable.
    struct MarkerEmbedder {
        fail: bool,
    }

    #[async_trait]
    impl Provider for MarkerEmbedder {
        fn name(&self) -> &str {
            "marker"
        }

        async fn complete(&self, _r: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                message: Message::assistant(""),
                usage: None,
                model: "m".into(),
            })
        }

        async fn embed(&self, r: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            if self.fail {
                return Err(ProviderError::Network("connection refused".into()));
            }
            let embeddings = r
                .inputs
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![t.matches("margin").count() as f32, t.matches("deadline").count() as f32]
                })
                .collect();
            Ok(EmbeddingResponse {
                embeddings,
                model: r.model,
            })
        }
    }

    fn corpus() -> Vec<KnowledgeChunk> {
        vec![
            KnowledgeChunk::new("in_safe_harbour", Some("India"), "Safe harbour margins for IT services under Rule 10TD."),
            KnowledgeChunk::new("in_10d", Some("India"), "Rule 10D documentation and filing deadline for the local file."),
            KnowledgeChunk::new("us_482", Some("US"), "Section 482 services regulations and margins."),
            KnowledgeChunk::new("oecd_ch2", None, "OECD chapter II: TNMM net margin method for services."),
        ]
    }

    fn query(text: &str, jurisdiction: &str) -> RetrievalQuery {
        RetrievalQuery {
            text: text.into(),
            jurisdiction: jurisdiction.into(),
            type_terms: vec!["services".into()],
            top_k: 10,
        }
    }

    #[tokio::test]
    async fn filters_by_jurisdiction_and_keeps_agnostic() {
        let kb = KnowledgeBase::new(corpus());
        let results = kb.retrieve(&query("margins", "India")).await.unwrap();
        let ids: Vec<_> = results.iter().map(|f| f.source_id.as_str()).collect();
        assert!(ids.contains(&"in_safe_harbour"));
        assert!(ids.contains(&"oecd_ch2"));
        assert!(!ids.contains(&"us_482"));
    }

    #[tokio::test]
    async fn keyword_ranking_best_first_and_truncated() {
        let kb = KnowledgeBase::new(corpus());
        let mut q = query("safe harbour margins", "India");
        q.top_k = 1;
        let results = kb.retrieve(&q).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_id, "in_safe_harbour");
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn empty_corpus_is_not_an_error() {
        let kb = KnowledgeBase::new(Vec::new());
        assert!(kb.retrieve(&query("anything", "US")).await.unwrap().is_empty());
        assert!(kb.is_empty().await);
    }

    #[tokio::test]
    async fn hybrid_fuses_vector_ranking() {
        let kb = KnowledgeBase::new(corpus()).with_embedder(Arc::new(MarkerEmbedder { fail: false }), "nomic-embed-text");
        assert_eq!(kb.mode(), SearchMode::Hybrid);
        assert_eq!(kb.embed_missing().await.unwrap(), 4);
        assert_eq!(kb.embed_missing().await.unwrap(), 0);

        let results = kb.retrieve(&query("filing deadline", "India")).await.unwrap();
        assert_eq!(results[0].source_id, "in_10d");
        assert!(results.iter().all(|f| f.source_id != "us_482"));
    }

    #[tokio::test]
    async fn hybrid_degrades_to_keyword_when_embedding_fails() {
        let kb = KnowledgeBase::new(corpus()).with_embedder(Arc::new(MarkerEmbedder { fail: true }), "nomic-embed-text");
        assert!(kb.embed_missing().await.is_err());
        let results = kb.retrieve(&query("safe harbour", "India")).await.unwrap();
        assert_eq!(results[0].source_id, "in_safe_harbour");
    }

    #[tokio::test]
    async fn stats_group_by_jurisdiction() {
        let kb = KnowledgeBase::new(corpus());
        kb.add(KnowledgeChunk::new("us_cbcr", Some("US"), "CbCR")).await;
        assert_eq!(
            kb.stats().await,
            vec![("*".into(), 1), ("India".into(), 2), ("US".into(), 2)]
        );
    }

    #[tokio::test]
    async fn loads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("US")).unwrap();
        std::fs::write(dir.path().join("US/cbcr.txt"), "Country-by-country reporting thresholds").unwrap();
        let kb = KnowledgeBase::load_dir(dir.path()).unwrap();
        let results = kb.retrieve(&query("country-by-country reporting", "US")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_id, "US/cbcr");
    }

    #[tokio::test]
    async fn same_named_files_embed_separately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("India")).unwrap();
        std::fs::create_dir_all(dir.path().join("US")).unwrap();
        std::fs::write(dir.path().join("India/documentation.txt"), "Margin records under Rule 10D").unwrap();
        std::fs::write(dir.path().join("US/documentation.txt"), "Filing deadline for Form 5472").unwrap();

        let kb = KnowledgeBase::load_dir(dir.path())
            .unwrap()
            .with_embedder(Arc::new(MarkerEmbedder { fail: false }), "nomic-embed-text");
        assert_eq!(kb.embed_missing().await.unwrap(), 2);

        let chunks = kb.chunks.read().await;
        let india = chunks.iter().find(|c| c.id == "India/documentation").unwrap();
        let us = chunks.iter().find(|c| c.id == "US/documentation").unwrap();
        assert_eq!(india.embedding.as_deref(), Some(&[1.0, 0.0][..]));
        assert_eq!(us.embedding.as_deref(), Some(&[0.0, 1.0][..]));
    }

    #[tokio::test]
    async fn duplicate_ids_are_not_double_counted() {
        let mut chunks = corpus();
        chunks.push(KnowledgeChunk::new("in_10d", Some("India"), "shadow copy"));
        let kb = KnowledgeBase::new(chunks);
        assert_eq!(kb.len().await, 4);

        kb.add(KnowledgeChunk::new("us_482", Some("US"), "Section 482 revised")).await;
        assert_eq!(kb.len().await, 4);
        let results = kb.retrieve(&query("section 482 revised", "US")).await.unwrap();
        assert_eq!(results[0].source_id, "us_482");
        assert_eq!(results[0].text, "Section 482 revised");
    }
}
