//! Policy sections.
//!
//! A policy is made of exactly seven sections in a fixed order. That order is
//! both the generation order and the dependency order: a section may only
//! build on sections declared before it.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The canonical section names, in generation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    ExecutiveSummary,
    RelatedParties,
    FunctionalAnalysis,
    ComparabilityAnalysis,
    MethodSelection,
    Benchmarking,
    DocumentationRequirements,
}

impl SectionName {
    pub const COUNT: usize = 7;

    pub const ALL: [SectionName; Self::COUNT] = [
        Self::ExecutiveSummary,
        Self::RelatedParties,
        Self::FunctionalAnalysis,
        Self::ComparabilityAnalysis,
        Self::MethodSelection,
        Self::Benchmarking,
        Self::DocumentationRequirements,
    ];

    /// Zero-based position in generation order.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "executive_summary",
            Self::RelatedParties => "related_parties",
            Self::FunctionalAnalysis => "functional_analysis",
            Self::ComparabilityAnalysis => "comparability_analysis",
            Self::MethodSelection => "method_selection",
            Self::Benchmarking => "benchmarking",
            Self::DocumentationRequirements => "documentation_requirements",
        }
    }

    /// Heading used in exported documents.
    pub fn title(&self) -> &'static str {
        match self {
            Self::ExecutiveSummary => "Executive Summary",
            Self::RelatedParties => "Related Parties",
            Self::FunctionalAnalysis => "Functional Analysis",
            Self::ComparabilityAnalysis => "Comparability Analysis",
            Self::MethodSelection => "Transfer Pricing Method Selection",
            Self::Benchmarking => "Benchmarking Analysis",
            Self::DocumentationRequirements => "Documentation Requirements",
        }
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| format!("unknown section '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionStatus {
    #[default]
    Pending,
    Generated,
    /// Content replaced by a human reviewer.
    Edited,
    Failed,
}

impl SectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generated => "generated",
            Self::Edited => "edited",
            Self::Failed => "failed",
        }
    }

    /// Whether the section holds content later sections may build on.
    pub fn has_content(&self) -> bool {
        matches!(self, Self::Generated | Self::Edited)
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One section's content and provenance.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SectionResult {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: SectionStatus,
    /// Source ids of the regulatory fragments backing the content
    #[serde(default)]
    pub citations: Vec<String>,
}

impl SectionResult {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn generated(content: impl Into<String>, citations: Vec<String>) -> Self {
        Self {
            content: content.into(),
            status: SectionStatus::Generated,
            citations,
        }
    }
}

/// All seven sections, keyed by name.
///
/// Backed by a fixed-size array, so the key set always equals
/// [`SectionName::ALL`]. Serializes as a JSON object in generation order;
/// deserializing rejects objects with missing or unknown keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionMap([SectionResult; SectionName::COUNT]);

impl SectionMap {
    /// Every section `pending` with no content.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: SectionName) -> &SectionResult {
        &self.0[name.index()]
    }

    pub fn get_mut(&mut self, name: SectionName) -> &mut SectionResult {
        &mut self.0[name.index()]
    }

    /// Replace one entry, returning the previous value.
    pub fn set(&mut self, name: SectionName, result: SectionResult) -> SectionResult {
        std::mem::replace(&mut self.0[name.index()], result)
    }

    /// Entries in generation order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionName, &SectionResult)> {
        SectionName::ALL.into_iter().zip(self.0.iter())
    }

    pub fn count_with(&self, status: SectionStatus) -> usize {
        self.0.iter().filter(|r| r.status == status).count()
    }
}

impl Serialize for SectionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SectionName::COUNT))?;
        for (name, result) in self.iter() {
            map.serialize_entry(name.as_str(), result)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SectionMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut raw = BTreeMap::<SectionName, SectionResult>::deserialize(deserializer)?;
        let missing: Vec<&str> = SectionName::ALL
            .iter()
            .filter(|n| !raw.contains_key(n))
            .map(|n| n.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(D::Error::custom(format!(
                "sections missing: {}",
                missing.join(", ")
            )));
        }
        let mut map = SectionMap::new();
        for name in SectionName::ALL {
            if let Some(result) = raw.remove(&name) {
                map.set(name, result);
            }
        }
        Ok(map)
    }
}
