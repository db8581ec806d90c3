//! The persisted policy document and its review workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;
use crate::section::{SectionMap, SectionName};
use crate::validation::{check_len, is_fiscal_year};

/// Review workflow status of a policy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyStatus {
    #[default]
    Generating,
    Review,
    Approved,
    /// Run-level integrity failure; section failures alone never set this.
    Failed,
}

impl PolicyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PolicyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PolicyStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generating" => Ok(Self::Generating),
            "review" => Ok(Self::Review),
            "approved" => Ok(Self::Approved),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown policy status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogEvent {
    Initialization,
    Section,
    Finalization,
    Regeneration,
}

/// One timestamped entry of a policy's generation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationLogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: LogEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<SectionName>,
    /// e.g. `started`, `generated`, `failed`, `completed`, `partial`
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GenerationLogEntry {
    pub fn new(event: LogEvent, status: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
            section: None,
            status: status.into(),
            progress: None,
            error: None,
        }
    }

    pub fn for_section(mut self, section: SectionName) -> Self {
        self.section = Some(section);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Share of the seven sections that completed, as a whole percentage.
pub fn progress_percent(completed: usize) -> u8 {
    let pct = completed.min(SectionName::COUNT) * 100 / SectionName::COUNT;
    pct as u8
}

/// A policy document record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub id: i64,
    pub company_id: i64,
    pub transaction_ids: Vec<i64>,
    pub fiscal_year: String,
    pub status: PolicyStatus,
    pub version: u32,
    pub sections: SectionMap,
    #[serde(default)]
    pub completed_sections: Vec<SectionName>,
    #[serde(default)]
    pub failed_sections: Vec<SectionName>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub generation_progress: u8,
    #[serde(default)]
    pub generation_log: Vec<GenerationLogEntry>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_comments: Option<String>,
    #[serde(default)]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Policy {
    /// Any section failed, so a reviewer should look before approving.
    pub fn needs_attention(&self) -> bool {
        !self.failed_sections.is_empty()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Fields for creating a policy record before generation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPolicy {
    pub company_id: i64,
    pub transaction_ids: Vec<i64>,
    pub fiscal_year: String,
}

impl NewPolicy {
    pub fn into_policy(self, id: i64) -> Policy {
        let now = Utc::now();
        Policy {
            id,
            company_id: self.company_id,
            transaction_ids: self.transaction_ids,
            fiscal_year: self.fiscal_year,
            status: PolicyStatus::Generating,
            version: 1,
            sections: SectionMap::new(),
            completed_sections: Vec::new(),
            failed_sections: Vec::new(),
            errors: Vec::new(),
            generation_progress: 0,
            generation_log: Vec::new(),
            reviewed_by: None,
            reviewed_at: None,
            review_comments: None,
            approved_by: None,
            approved_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing view of a policy, without section bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    pub id: i64,
    pub company_id: i64,
    pub transaction_ids: Vec<i64>,
    pub fiscal_year: String,
    pub status: PolicyStatus,
    pub version: u32,
    pub generation_progress: u8,
    pub completed_sections: Vec<SectionName>,
    pub failed_sections: Vec<SectionName>,
    pub needs_attention: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Policy> for PolicySummary {
    fn from(p: &Policy) -> Self {
        Self {
            id: p.id,
            company_id: p.company_id,
            transaction_ids: p.transaction_ids.clone(),
            fiscal_year: p.fiscal_year.clone(),
            status: p.status,
            version: p.version,
            generation_progress: p.generation_progress,
            completed_sections: p.completed_sections.clone(),
            failed_sections: p.failed_sections.clone(),
            needs_attention: p.needs_attention(),
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Request to generate a new policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratePolicyRequest {
    pub company_id: i64,
    pub transaction_ids: Vec<i64>,
    pub fiscal_year: String,
}

impl GeneratePolicyRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        if self.company_id <= 0 {
            errors.push("company_id", "must be a positive id");
        }
        if self.transaction_ids.is_empty() {
            errors.push("transaction_ids", "at least one transaction is required");
        }
        if !is_fiscal_year(&self.fiscal_year) {
            errors.push("fiscal_year", "must look like 2023-24");
        }
        errors.into_result()
    }
}

/// A reviewer's decision on a policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub reviewed_by: String,
    #[serde(default)]
    pub review_comments: Option<String>,
    #[serde(default)]
    pub approved: bool,
}

impl ReviewRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        check_len(&mut errors, "reviewed_by", &self.reviewed_by, 1, 255);
        errors.into_result()
    }
}
