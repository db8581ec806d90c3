//! `tpforge generate`: One-shot policy generation.
//!
//! Reads a company, its transactions and a fiscal year from JSON, runs the
//! pipeline against an in-memory store and prints the result.

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tpforge_config::AppConfig;
use tpforge_core::company::NewCompany;
use tpforge_core::policy::GeneratePolicyRequest;
use tpforge_core::store::Store;
use tpforge_core::transaction::NewTransaction;
use tpforge_pipeline::{PolicyService, bootstrap, render_markdown};
use tpforge_store::InMemoryStore;

use crate::OutputFormat;

/// Transactions may omit `company_id`; they are attached to `company`.
#[derive(Debug, Deserialize)]
pub struct GenerateInput {
    pub company: NewCompany,
    pub transactions: Vec<NewTransaction>,
    pub fiscal_year: String,
}

pub fn load_input(path: &Path) -> Result<GenerateInput, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let input: GenerateInput = serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid input file {}: {e}", path.display()))?;
    if input.transactions.is_empty() {
        return Err("Input needs at least one transaction".into());
    }
    Ok(input)
}

pub async fn run(
    input_path: &Path,
    format: OutputFormat,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let input = load_input(input_path)?;

    let store = Arc::new(InMemoryStore::new());
    input.company.validate()?;
    let company = store.create_company(input.company).await?;
    let mut transaction_ids = Vec::with_capacity(input.transactions.len());
    for mut tx in input.transactions {
        tx.company_id = company.id;
        tx.validate()?;
        transaction_ids.push(store.create_transaction(tx).await?.id);
    }

    let orchestrator = bootstrap::build_orchestrator(&config).await?;
    let service = PolicyService::new(store, orchestrator);
    eprintln!(
        "  Generating 7 sections for {} with {} ({})...",
        company.name, config.default_provider, config.default_model
    );
    let policy = service
        .generate_policy(&GeneratePolicyRequest {
            company_id: company.id,
            transaction_ids,
            fiscal_year: input.fiscal_year,
        })
        .await?;

    let rendered = match format {
        OutputFormat::Markdown => render_markdown(&policy, Some(&company)),
        OutputFormat::Json => serde_json::to_string_pretty(&policy)?,
    };

    match output {
        Some(path) => {
            std::fs::write(path, &rendered)?;
            eprintln!("  Written to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    if policy.needs_attention() {
        eprintln!("  ⚠️  Failed sections:");
        for err in &policy.errors {
            eprintln!("     - {err}");
        }
    } else {
        eprintln!("  ✅ All sections generated");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transactions_may_omit_company_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(
            &path,
            r#"{
                "company": {
                    "name": "Acme IN",
                    "jurisdiction": "India",
                    "tax_id": "AAACA1234A",
                    "entity_type": "service_provider"
                },
                "transactions": [{
                    "transaction_type": "services",
                    "description": "Software development services",
                    "related_party_name": "Acme US Inc",
                    "related_party_jurisdiction": "US",
                    "functional_profile": {
                        "functions": ["dev"],
                        "assets": ["workforce"],
                        "risks": ["low"],
                        "risk_level": "low"
                    }
                }],
                "fiscal_year": "2023-24"
            }"#,
        )
        .unwrap();

        let input = load_input(&path).unwrap();
        assert_eq!(input.company.name, "Acme IN");
        assert_eq!(input.transactions[0].company_id, 0);
        assert_eq!(input.transactions[0].currency, "USD");
    }

    #[test]
    fn empty_transactions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(
            &path,
            r#"{"company": {"name": "A", "jurisdiction": "US", "tax_id": "1", "entity_type": "distributor"},
                "transactions": [], "fiscal_year": "2023-24"}"#,
        )
        .unwrap();
        assert!(load_input(&path).is_err());
    }
}
