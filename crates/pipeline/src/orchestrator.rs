//! The pipeline driver.
//!
//! A run moves through
//! `NotStarted → Initializing → RunningSection(each, in order) → Finalizing → Completed`.
//! Section failures are recorded and the run moves on; the only errors the
//! orchestrator returns are run-level ([`RunError`]).

use std::collections::HashSet;
use std::fmt;
use tpforge_core::company::Company;
use tpforge_core::policy::{GenerationLogEntry, LogEvent};
use tpforge_core::section::{SectionName, SectionStatus};
use tpforge_core::transaction::Transaction;
use tracing::{error, info, warn};

use crate::node::SectionRunner;
use crate::state::PipelineState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Initializing,
    RunningSection(SectionName),
    Finalizing,
    Completed,
    /// Single-section regeneration of a completed run.
    Regenerating(SectionName),
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not_started"),
            Self::Initializing => f.write_str("initializing"),
            Self::RunningSection(name) => write!(f, "running_section[{name}]"),
            Self::Finalizing => f.write_str("finalizing"),
            Self::Completed => f.write_str("completed"),
            Self::Regenerating(name) => write!(f, "regenerating[{name}]"),
        }
    }
}

impl RunPhase {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        let first = SectionName::ALL[0];
        let last = SectionName::ALL[SectionName::COUNT - 1];
        match (self, next) {
            (NotStarted, Initializing) => true,
            (Initializing, RunningSection(s)) => s == first,
            (RunningSection(a), RunningSection(b)) => b.index() == a.index() + 1,
            (RunningSection(a), Finalizing) => a == last,
            (Finalizing, Completed) => true,
            (Completed, Regenerating(_)) => true,
            (Regenerating(_), Completed) => true,
            _ => false,
        }
    }
}

/// Run-level failure. Section failures never produce one.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RunError {
    #[error("pipeline integrity check failed: {0}")]
    Integrity(String),

    #[error("invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: RunPhase, to: RunPhase },
}

fn advance(state: &mut PipelineState, next: RunPhase) -> Result<(), RunError> {
    if !state.phase.can_advance_to(next) {
        return Err(RunError::InvalidTransition {
            from: state.phase,
            to: next,
        });
    }
    state.phase = next;
    Ok(())
}

/// Drives section nodes over a [`PipelineState`].
///
/// Holds no per-run data, so one orchestrator serves concurrent runs.
pub struct Orchestrator {
    runner: SectionRunner,
}

impl Orchestrator {
    pub fn new(runner: SectionRunner) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &SectionRunner {
        &self.runner
    }

    /// Build the initial state: every section pending, nothing tracked.
    pub fn initialize(
        &self,
        subject: Company,
        items: Vec<Transaction>,
        fiscal_year: impl Into<String>,
    ) -> Result<PipelineState, RunError> {
        let mut state = PipelineState::new(subject, items, fiscal_year);
        advance(&mut state, RunPhase::Initializing)?;
        state.push_log(GenerationLogEntry::new(LogEvent::Initialization, "started").with_progress(0));
        info!(
            run_id = %state.run_id(),
            company = %state.subject().name,
            transactions = state.items().len(),
            fiscal_year = %state.fiscal_year(),
            "Generation run initialized"
        );
        Ok(state)
    }

    /// Execute every section in fixed order.
    pub async fn run(&self, mut state: PipelineState) -> Result<PipelineState, RunError> {
        for name in SectionName::ALL {
            advance(&mut state, RunPhase::RunningSection(name))?;
            match self.runner.execute(name, &state).await {
                Ok(output) => state.record_success(name, output),
                Err(e) => {
                    warn!(run_id = %state.run_id(), section = %name, error = %e, "Section failed");
                    state.record_failure(name, &e);
                }
            }
        }
        Ok(state)
    }

    /// Check run integrity and mark the run complete.
    pub fn finalize(&self, mut state: PipelineState) -> Result<PipelineState, RunError> {
        advance(&mut state, RunPhase::Finalizing)?;
        if let Err(e) = check_integrity(&state) {
            error!(run_id = %state.run_id(), error = %e, "Run integrity check failed");
            return Err(e);
        }

        for name in state.failed.clone() {
            let entry = state.sections.get_mut(name);
            if entry.status == SectionStatus::Pending {
                entry.status = SectionStatus::Failed;
            }
        }

        let outcome = if state.needs_attention() {
            "partial"
        } else {
            "completed"
        };
        let progress = state.progress();
        state.push_log(GenerationLogEntry::new(LogEvent::Finalization, outcome).with_progress(progress));
        advance(&mut state, RunPhase::Completed)?;

        info!(
            run_id = %state.run_id(),
            completed = state.completed_sections().len(),
            failed = state.failed_sections().len(),
            outcome,
            "Generation run finalized"
        );
        Ok(state)
    }

    /// `initialize` + `run` + `finalize`.
    pub async fn generate(
        &self,
        subject: Company,
        items: Vec<Transaction>,
        fiscal_year: impl Into<String>,
    ) -> Result<PipelineState, RunError> {
        let state = self.initialize(subject, items, fiscal_year)?;
        let state = self.run(state).await?;
        self.finalize(state)
    }

    /// Re-run exactly one section of a completed run.
    ///
    /// On success only `name`'s entry changes. On failure the previous entry
    /// stays and the failure is tracked.
    pub async fn regenerate_one(
        &self,
        mut state: PipelineState,
        name: SectionName,
    ) -> Result<PipelineState, RunError> {
        advance(&mut state, RunPhase::Regenerating(name))?;
        state.clear_tracking(name);

        match self.runner.execute(name, &state).await {
            Ok(output) => {
                state.record_success(name, output);
                state.push_log(
                    GenerationLogEntry::new(LogEvent::Regeneration, "completed")
                        .for_section(name)
                        .with_progress(state.progress()),
                );
                info!(run_id = %state.run_id(), section = %name, "Section regenerated");
            }
            Err(e) => {
                warn!(run_id = %state.run_id(), section = %name, error = %e, "Section regeneration failed");
                state.record_failure(name, &e);
                let entry = state.sections.get_mut(name);
                if entry.status == SectionStatus::Pending {
                    entry.status = SectionStatus::Failed;
                }
                state.push_log(
                    GenerationLogEntry::new(LogEvent::Regeneration, "failed")
                        .for_section(name)
                        .with_error(e.to_string()),
                );
            }
        }

        advance(&mut state, RunPhase::Completed)?;
        Ok(state)
    }
}

/// Completed and failed sections partition the canonical set, and
/// `generated` status matches completion.
fn check_integrity(state: &PipelineState) -> Result<(), RunError> {
    let completed: HashSet<_> = state.completed.iter().copied().collect();
    let failed: HashSet<_> = state.failed.iter().copied().collect();

    if completed.len() != state.completed.len() || failed.len() != state.failed.len() {
        return Err(RunError::Integrity("duplicate entries in tracking lists".into()));
    }
    if let Some(both) = completed.intersection(&failed).next() {
        return Err(RunError::Integrity(format!(
            "{both} is both completed and failed"
        )));
    }
    let missing: Vec<&str> = SectionName::ALL
        .iter()
        .filter(|n| !completed.contains(n) && !failed.contains(n))
        .map(|n| n.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(RunError::Integrity(format!(
            "sections never ran: {}",
            missing.join(", ")
        )));
    }
    for (name, entry) in state.sections.iter() {
        let generated = entry.status == SectionStatus::Generated;
        if generated != completed.contains(&name) {
            return Err(RunError::Integrity(format!(
                "{name} has status {} but {} completed",
                entry.status.as_str(),
                if generated { "is not" } else { "is" }
            )));
        }
    }
    Ok(())
}
