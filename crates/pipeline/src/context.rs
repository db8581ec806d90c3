//! Template variables shared by every section.

use tpforge_core::retrieval::RegulatoryFragment;
use tpforge_core::transaction::Transaction;

use crate::state::PipelineState;
use crate::template::TemplateVars;

/// Shown in place of regulatory context when retrieval found nothing.
pub const NO_CONTEXT_NOTICE: &str = "No regulatory sources were retrieved for this section. \
Rely on general transfer pricing principles and state any assumptions explicitly.";

/// Sorted, distinct transaction types of the run.
pub fn type_terms(items: &[Transaction]) -> Vec<String> {
    let mut types: Vec<_> = items.iter().map(|t| t.transaction_type).collect();
    types.sort();
    types.dedup();
    types.into_iter().map(|t| t.as_str().to_string()).collect()
}

/// Sorted, distinct related-party jurisdictions.
pub fn related_jurisdictions(items: &[Transaction]) -> Vec<String> {
    let mut j: Vec<String> = items
        .iter()
        .map(|t| t.related_party_jurisdiction.clone())
        .collect();
    j.sort();
    j.dedup();
    j
}

pub fn format_regulatory_context(fragments: &[RegulatoryFragment]) -> String {
    if fragments.is_empty() {
        return NO_CONTEXT_NOTICE.to_string();
    }
    fragments
        .iter()
        .enumerate()
        .map(|(i, f)| format!("REGULATORY SOURCE {} ({}):\n{}", i + 1, f.source_id, f.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// `1234567.5` → `1,234,567.50`.
pub fn format_amount(amount: f64) -> String {
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

pub fn format_transactions(items: &[Transaction]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let amount = t
                .amount
                .map(|a| format!("{} {}", t.currency, format_amount(a)))
                .unwrap_or_else(|| "Not specified".to_string());
            let profile = &t.functional_profile;
            format!(
                "Transaction {}:\n\
                 - Type: {}\n\
                 - Description: {}\n\
                 - Related Party: {} ({})\n\
                 - Amount: {}\n\
                 - Functions: {}\n\
                 - Assets: {}\n\
                 - Risks: {}\n\
                 - Risk Level: {}",
                i + 1,
                t.transaction_type,
                t.description,
                t.related_party_name,
                t.related_party_jurisdiction,
                amount,
                profile.functions.join(", "),
                profile.assets.join(", "),
                profile.risks.join(", "),
                profile.risk_level.as_str(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Variables every section template may use.
pub fn common_variables(state: &PipelineState, fragments: &[RegulatoryFragment]) -> TemplateVars {
    let subject = state.subject();
    let items = state.items();
    let jurisdictions = related_jurisdictions(items).join(", ");

    let mut vars = TemplateVars::new();
    vars.insert("regulatory_context".into(), format_regulatory_context(fragments));
    vars.insert("company_name".into(), subject.name.clone());
    vars.insert("jurisdiction".into(), subject.jurisdiction.to_string());
    vars.insert("tax_id".into(), subject.tax_id.clone());
    vars.insert("entity_type".into(), subject.entity_type.to_string());
    vars.insert(
        "industry".into(),
        subject
            .industry
            .clone()
            .unwrap_or_else(|| "Not specified".to_string()),
    );
    vars.insert("fiscal_year".into(), state.fiscal_year().to_string());
    vars.insert("transactions_detail".into(), format_transactions(items));
    vars.insert(
        "transaction_summary".into(),
        format!("{} transactions with entities in {}", items.len(), jurisdictions),
    );
    vars.insert("related_jurisdictions".into(), jurisdictions);
    vars
}
