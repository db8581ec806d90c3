//! Wire the pipeline's capabilities from an [`AppConfig`].
//!
//! Capabilities are built once and shared behind `Arc`s by the
//! orchestrator, the policy service and the gateway.

use std::sync::Arc;
use std::time::Duration;
use tpforge_config::{AppConfig, RetrievalMode, StoreBackend};
use tpforge_core::error::{ProviderError, RetrievalError, StoreError};
use tpforge_core::provider::Provider;
use tpforge_core::store::Store;
use tpforge_knowledge::KnowledgeBase;
use tpforge_providers::{ProviderRouter, build_from_config};
use tpforge_store::{InMemoryStore, SqliteStore};
use tracing::info;

use crate::node::{GenerationSettings, SectionRunner};
use crate::orchestrator::Orchestrator;
use crate::service::PolicyService;
use crate::template::{BuiltinTemplates, FileTemplateStore, TemplateStore};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("knowledge base setup failed: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("store setup failed: {0}")]
    Store(#[from] StoreError),

    #[error("cannot create {path}: {reason}")]
    Io { path: String, reason: String },
}

pub async fn build_store(config: &AppConfig) -> Result<Arc<dyn Store>, BootstrapError> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Sqlite => {
            let path = config.store_path();
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| BootstrapError::Io {
                    path: parent.display().to_string(),
                    reason: e.to_string(),
                })?;
            }
            let store = SqliteStore::new(&format!("sqlite://{}", path.display())).await?;
            info!(path = %path.display(), "SQLite store ready");
            Ok(Arc::new(store))
        }
    }
}

/// Load the knowledge base; in hybrid mode, attach the embedding provider
/// and embed any chunks that arrived without vectors.
pub async fn build_retriever(
    config: &AppConfig,
    router: &ProviderRouter,
) -> Result<Arc<KnowledgeBase>, BootstrapError> {
    let dir = config.chunks_dir();
    let mut kb = KnowledgeBase::load_dir(&dir)?.with_min_score(config.retrieval.min_score);

    if config.retrieval.mode == RetrievalMode::Hybrid {
        let embedder = router.require(config.retrieval.embedding_provider.as_deref())?;
        kb = kb.with_embedder(embedder, config.retrieval.embedding_model.clone());
        match kb.embed_missing().await {
            Ok(n) if n > 0 => info!(embedded = n, "Embedded knowledge chunks"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Embedding failed, ranking stays keyword-only for unembedded chunks"),
        }
    }

    info!(path = %dir.display(), chunks = kb.len().await, mode = ?kb.mode(), "Knowledge base loaded");
    Ok(Arc::new(kb))
}

pub fn build_templates(config: &AppConfig) -> Arc<dyn TemplateStore> {
    match &config.generation.templates_dir {
        Some(dir) => Arc::new(FileTemplateStore::new(dir)),
        None => Arc::new(BuiltinTemplates),
    }
}

pub fn generation_settings(config: &AppConfig) -> GenerationSettings {
    GenerationSettings {
        model: config.default_model.clone(),
        temperature: config.default_temperature,
        max_tokens: Some(config.default_max_tokens),
        system_prompt: config.generation.system_prompt.clone(),
        timeout: Duration::from_secs(config.generation.timeout_secs),
        top_k: config.retrieval.top_k,
    }
}

pub async fn build_orchestrator(config: &AppConfig) -> Result<Arc<Orchestrator>, BootstrapError> {
    let router = build_from_config(config);
    let provider: Arc<dyn Provider> = router.require(None)?;
    let retriever = build_retriever(config, &router).await?;
    let runner = SectionRunner::new(
        provider,
        retriever,
        build_templates(config),
        generation_settings(config),
    );
    Ok(Arc::new(Orchestrator::new(runner)))
}

pub async fn build_service(config: &AppConfig) -> Result<Arc<PolicyService>, BootstrapError> {
    let store = build_store(config).await?;
    let orchestrator = build_orchestrator(config).await?;
    Ok(Arc::new(PolicyService::new(store, orchestrator)))
}
