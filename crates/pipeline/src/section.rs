//! The section table.
//!
//! Every section kind is data: a retrieval-query builder, the sections it
//! depends on, and the extra template variables it contributes. The table is
//! indexed by [`SectionName::index`], so lookups are total.

use tpforge_core::company::Company;
use tpforge_core::section::SectionName;

/// The method assumed for comparability, method selection and benchmarking.
pub const SELECTED_METHOD: &str = "TNMM";

/// Profit level indicator used for benchmarking.
pub const PROFIT_LEVEL_INDICATOR: &str = "Operating Margin on Operating Costs";

/// Inputs available to a query builder.
pub struct QueryInputs<'a> {
    pub jurisdiction: &'a str,
    /// Sorted, distinct transaction types joined by `", "`
    pub types: &'a str,
}

/// Static description of one section.
pub struct SectionKind {
    pub name: SectionName,
    pub query: fn(&QueryInputs<'_>) -> String,
    /// Earlier sections whose content this section's template consumes.
    pub depends_on: &'static [SectionName],
    pub extra_vars: fn(&Company) -> Vec<(&'static str, String)>,
}

impl SectionKind {
    pub fn query_for(&self, inputs: &QueryInputs<'_>) -> String {
        (self.query)(inputs)
    }

    /// Template variable under which a dependency's content is exposed.
    pub fn dependency_var(dependency: SectionName) -> String {
        format!("{}_summary", dependency.as_str())
    }
}

fn no_extra_vars(_: &Company) -> Vec<(&'static str, String)> {
    Vec::new()
}

fn method_vars(_: &Company) -> Vec<(&'static str, String)> {
    vec![("selected_method", SELECTED_METHOD.to_string())]
}

fn benchmarking_vars(company: &Company) -> Vec<(&'static str, String)> {
    vec![
        ("selected_method", SELECTED_METHOD.to_string()),
        ("tested_party", company.name.clone()),
        ("pli", PROFIT_LEVEL_INDICATOR.to_string()),
    ]
}

static TABLE: [SectionKind; SectionName::COUNT] = [
    SectionKind {
        name: SectionName::ExecutiveSummary,
        query: |q| {
            format!(
                "executive summary requirements for transfer pricing documentation in {}",
                q.jurisdiction
            )
        },
        depends_on: &[],
        extra_vars: no_extra_vars,
    },
    SectionKind {
        name: SectionName::RelatedParties,
        query: |q| {
            format!(
                "related party definition and identification requirements in {}",
                q.jurisdiction
            )
        },
        depends_on: &[],
        extra_vars: no_extra_vars,
    },
    SectionKind {
        name: SectionName::FunctionalAnalysis,
        query: |q| {
            format!(
                "functional analysis FAR framework and requirements for {} in {}",
                q.types, q.jurisdiction
            )
        },
        depends_on: &[],
        extra_vars: no_extra_vars,
    },
    SectionKind {
        name: SectionName::ComparabilityAnalysis,
        query: |q| format!("comparability analysis five factors OECD guidelines {}", q.jurisdiction),
        depends_on: &[SectionName::FunctionalAnalysis],
        extra_vars: method_vars,
    },
    SectionKind {
        name: SectionName::MethodSelection,
        query: |q| {
            format!(
                "transfer pricing methods selection TNMM cost plus for {} {}",
                q.types, q.jurisdiction
            )
        },
        depends_on: &[SectionName::FunctionalAnalysis],
        extra_vars: method_vars,
    },
    SectionKind {
        name: SectionName::Benchmarking,
        query: |q| {
            format!(
                "arm's length range benchmarking safe harbour provisions {} IT services margins",
                q.jurisdiction
            )
        },
        depends_on: &[],
        extra_vars: benchmarking_vars,
    },
    SectionKind {
        name: SectionName::DocumentationRequirements,
        query: |q| {
            format!(
                "transfer pricing documentation filing deadlines master file local file CbCR {}",
                q.jurisdiction
            )
        },
        depends_on: &[],
        extra_vars: no_extra_vars,
    },
];

/// The kind for `name`.
pub fn kind(name: SectionName) -> &'static SectionKind {
    &TABLE[name.index()]
}
