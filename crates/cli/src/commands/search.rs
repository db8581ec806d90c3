//! `tpforge search`: Query the regulatory knowledge base.

use tpforge_config::AppConfig;
use tpforge_core::retrieval::{RetrievalQuery, Retriever};
use tpforge_pipeline::bootstrap;
use tpforge_providers::build_from_config;

pub async fn run(
    jurisdiction: &str,
    types: Vec<String>,
    top_k: Option<usize>,
    query: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let router = build_from_config(&config);
    let kb = bootstrap::build_retriever(&config, &router).await?;

    println!("🔍 Searching {} ({:?} mode) for: \"{query}\"", config.chunks_dir().display(), kb.mode());
    println!();

    let fragments = kb
        .retrieve(&RetrievalQuery {
            text: query.to_string(),
            jurisdiction: jurisdiction.to_string(),
            type_terms: types,
            top_k: top_k.unwrap_or(config.retrieval.top_k),
        })
        .await?;

    if fragments.is_empty() {
        println!("   No fragments found for {jurisdiction}.");
        return Ok(());
    }
    for (i, f) in fragments.iter().enumerate() {
        let preview: String = f.text.chars().take(100).collect();
        println!("  {:>2}. [score: {:.3}] {}", i + 1, f.score, f.source_id);
        println!("      {}", preview.replace('\n', " "));
    }

    Ok(())
}
