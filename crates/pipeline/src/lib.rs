//! Section-generation pipeline for tpforge.
//!
//! A policy is drafted as seven sections in a fixed order. Each section
//! node retrieves regulatory context, fills its prompt template, calls the
//! generation provider and folds the outcome into [`PipelineState`]. Later
//! sections read earlier sections' content; a failed section never stops
//! the run.
//!
//! [`PolicyService`] wraps the orchestrator with persistence and the
//! review workflow; [`bootstrap`] wires everything from configuration.

pub mod bootstrap;
pub mod citations;
pub mod context;
pub mod export;
pub mod node;
pub mod orchestrator;
pub mod section;
pub mod service;
pub mod state;
pub mod template;

#[cfg(test)]
mod test_helpers;

pub use bootstrap::BootstrapError;
pub use export::render_markdown;
pub use node::{GenerationSettings, SectionError, SectionOutput, SectionRunner};
pub use orchestrator::{Orchestrator, RunError, RunPhase};
pub use service::{PolicyService, ServiceError};
pub use state::{PipelineState, SectionLookup, Unavailable};
pub use template::{BuiltinTemplates, FileTemplateStore, TemplateStore, TemplateVars};
