//! Markdown rendering of a policy record.

use std::fmt::Write;
use tpforge_core::company::Company;
use tpforge_core::policy::Policy;
use tpforge_core::section::SectionName;

const NOT_GENERATED: &str = "_This section has not been generated._";

pub fn render_markdown(policy: &Policy, company: Option<&Company>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Transfer Pricing Policy\n");

    match company {
        Some(c) => {
            let _ = writeln!(out, "**Company:** {} ({})  ", c.name, c.jurisdiction);
            let _ = writeln!(out, "**Tax ID:** {}  ", c.tax_id);
        }
        None => {
            let _ = writeln!(out, "**Company:** #{}  ", policy.company_id);
        }
    }
    let _ = writeln!(out, "**Fiscal Year:** {}  ", policy.fiscal_year);
    let _ = writeln!(out, "**Status:** {}  ", policy.status);
    let _ = writeln!(out, "**Version:** {}", policy.version);

    if let (Some(by), Some(at)) = (&policy.approved_by, policy.approved_at) {
        let _ = writeln!(out, "\n**Approved by:** {} on {}", by, at.format("%Y-%m-%d"));
    }
    if policy.needs_attention() {
        let failed: Vec<&str> = policy.failed_sections.iter().map(|n| n.as_str()).collect();
        let _ = writeln!(out, "\n> Needs attention: {} failed to generate.", failed.join(", "));
    }

    for (i, name) in SectionName::ALL.iter().enumerate() {
        let entry = policy.sections.get(*name);
        let _ = writeln!(out, "\n## {}. {}\n", i + 1, name.title());
        if entry.status.has_content() && !entry.content.trim().is_empty() {
            let _ = writeln!(out, "{}", entry.content.trim_end());
        } else {
            let _ = writeln!(out, "{NOT_GENERATED}");
        }
        if !entry.citations.is_empty() {
            let _ = writeln!(out, "\n**Sources:** {}", entry.citations.join(", "));
        }
    }
    out
}
