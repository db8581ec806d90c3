//! Pipeline state: the single record threaded through one generation run.
//!
//! The orchestrator owns a `PipelineState` by value and lends it to one
//! section node at a time. Nodes only read it; the orchestrator folds each
//! node's result back in through [`PipelineState::record_success`] and
//! [`PipelineState::record_failure`].

use chrono::{DateTime, Utc};
use std::fmt;
use tpforge_core::company::Company;
use tpforge_core::policy::{GenerationLogEntry, LogEvent, Policy, progress_percent};
use tpforge_core::section::{SectionMap, SectionName, SectionResult, SectionStatus};
use tpforge_core::transaction::Transaction;
use uuid::Uuid;

use crate::node::{SectionError, SectionOutput};
use crate::orchestrator::RunPhase;

/// Why a section's content cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// The section is not strictly before the reader in generation order.
    NotEarlier,
    /// The section failed in this run or its last regeneration.
    Failed,
    /// The section has not produced content yet.
    NotGenerated,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotEarlier => "is not generated before this section",
            Self::Failed => "failed",
            Self::NotGenerated => "has not been generated",
        })
    }
}

/// Result of reading another section's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionLookup<'a> {
    Available(&'a str),
    Unavailable(Unavailable),
}

#[derive(Debug, Clone)]
pub struct PipelineState {
    pub(crate) run_id: Uuid,
    pub(crate) phase: RunPhase,
    subject: Company,
    items: Vec<Transaction>,
    fiscal_year: String,
    pub(crate) sections: SectionMap,
    pub(crate) completed: Vec<SectionName>,
    pub(crate) failed: Vec<SectionName>,
    pub(crate) errors: Vec<String>,
    pub(crate) log: Vec<GenerationLogEntry>,
    started_at: DateTime<Utc>,
}

impl PipelineState {
    /// A fresh state with every section pending.
    pub fn new(subject: Company, items: Vec<Transaction>, fiscal_year: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            phase: RunPhase::NotStarted,
            subject,
            items,
            fiscal_year: fiscal_year.into(),
            sections: SectionMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            errors: Vec::new(),
            log: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Rebuild a finished run's state from a stored policy, ready for
    /// single-section regeneration.
    ///
    /// A section listed in `failed_sections` stays failed even when it still
    /// holds content from before a failed regeneration. Other sections with
    /// content (generated or edited) count as completed. Earlier log entries
    /// stay on the policy.
    pub fn restore(policy: &Policy, subject: Company, items: Vec<Transaction>) -> Self {
        let mut state = Self::new(subject, items, policy.fiscal_year.clone());
        state.phase = RunPhase::Completed;
        state.sections = policy.sections.clone();
        for (name, result) in policy.sections.iter() {
            if policy.failed_sections.contains(&name) {
                state.failed.push(name);
                continue;
            }
            match result.status {
                SectionStatus::Generated | SectionStatus::Edited => state.completed.push(name),
                SectionStatus::Failed => state.failed.push(name),
                SectionStatus::Pending => {}
            }
        }
        state.errors = policy
            .errors
            .iter()
            .filter(|e| state.failed.iter().any(|n| is_error_for(e, *n)))
            .cloned()
            .collect();
        state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn subject(&self) -> &Company {
        &self.subject
    }

    pub fn items(&self) -> &[Transaction] {
        &self.items
    }

    pub fn fiscal_year(&self) -> &str {
        &self.fiscal_year
    }

    pub fn sections(&self) -> &SectionMap {
        &self.sections
    }

    pub fn completed_sections(&self) -> &[SectionName] {
        &self.completed
    }

    pub fn failed_sections(&self) -> &[SectionName] {
        &self.failed
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn generation_log(&self) -> &[GenerationLogEntry] {
        &self.log
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn progress(&self) -> u8 {
        progress_percent(self.completed.len())
    }

    pub fn needs_attention(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Read `dependency`'s content on behalf of `reader`.
    ///
    /// Only sections strictly earlier than `reader` are readable, and only
    /// when they hold content that has not since failed.
    pub fn prior_content(&self, reader: SectionName, dependency: SectionName) -> SectionLookup<'_> {
        if dependency >= reader {
            return SectionLookup::Unavailable(Unavailable::NotEarlier);
        }
        if self.failed.contains(&dependency) {
            return SectionLookup::Unavailable(Unavailable::Failed);
        }
        let entry = self.sections.get(dependency);
        match entry.status {
            status if status.has_content() => SectionLookup::Available(&entry.content),
            SectionStatus::Failed => SectionLookup::Unavailable(Unavailable::Failed),
            _ => SectionLookup::Unavailable(Unavailable::NotGenerated),
        }
    }

    pub(crate) fn record_success(&mut self, name: SectionName, output: SectionOutput) {
        self.sections
            .set(name, SectionResult::generated(output.content, output.citations));
        self.failed.retain(|n| *n != name);
        if !self.completed.contains(&name) {
            self.completed.push(name);
        }
        let progress = self.progress();
        self.log.push(
            GenerationLogEntry::new(LogEvent::Section, "completed")
                .for_section(name)
                .with_progress(progress),
        );
    }

    /// Record a section failure. The section's existing entry is left as is.
    pub(crate) fn record_failure(&mut self, name: SectionName, error: &SectionError) {
        self.completed.retain(|n| *n != name);
        if !self.failed.contains(&name) {
            self.failed.push(name);
        }
        self.errors.push(format!("{name}: {error}"));
        self.log.push(
            GenerationLogEntry::new(LogEvent::Section, "failed")
                .for_section(name)
                .with_error(error.to_string()),
        );
    }

    /// Drop `name` from the tracking lists and its error messages.
    pub(crate) fn clear_tracking(&mut self, name: SectionName) {
        self.completed.retain(|n| *n != name);
        self.failed.retain(|n| *n != name);
        self.errors.retain(|e| !is_error_for(e, name));
    }

    pub(crate) fn push_log(&mut self, entry: GenerationLogEntry) {
        self.log.push(entry);
    }

    /// Copy this run's results onto `policy`, appending its log entries.
    pub fn apply_to(&self, policy: &mut Policy) {
        policy.sections = self.sections.clone();
        policy.completed_sections = self.completed.clone();
        policy.failed_sections = self.failed.clone();
        policy.errors = self.errors.clone();
        policy.generation_progress = self.progress();
        policy.generation_log.extend(self.log.iter().cloned());
    }
}

/// Error messages are tagged `"{section}: {message}"`.
pub(crate) fn is_error_for(message: &str, name: SectionName) -> bool {
    message
        .strip_prefix(name.as_str())
        .is_some_and(|rest| rest.starts_with(": "))
}
