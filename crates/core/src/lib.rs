//! # tpforge Core
//!
//! Domain types, capability traits and error definitions for tpforge, a
//! transfer-pricing policy generator. This crate has **no framework
//! dependencies**: it defines the model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Each external capability is a trait here (`Provider` for generation,
//! `Retriever` for regulatory context, `Store` for persistence).
//! Implementations live in their own crates, so pipelines can be tested
//! against stubs and backends swapped through configuration.

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod company;
pub mod transaction;
pub mod section;
pub mod policy;
pub mod store;
pub mod validation;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use retrieval::{RegulatoryFragment, RetrievalQuery, Retriever};
pub use company::{Company, EntityType, Jurisdiction, NewCompany};
pub use transaction::{FunctionalProfile, NewTransaction, RiskLevel, Transaction, TransactionType};
pub use section::{SectionMap, SectionName, SectionResult, SectionStatus};
pub use policy::{GenerationLogEntry, LogEvent, NewPolicy, Policy, PolicyStatus, PolicySummary};
pub use store::Store;
