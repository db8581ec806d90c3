//! Policy workflow on top of the store and the orchestrator.
//!
//! Owns the review status around a run: records start as `generating`,
//! become `review` once the pipeline finalizes (whatever the section
//! failures), and only move to `approved` through [`PolicyService::submit_review`].

use chrono::Utc;
use std::sync::Arc;
use tpforge_core::company::Company;
use tpforge_core::error::{StoreError, ValidationError};
use tpforge_core::policy::{
    GeneratePolicyRequest, GenerationLogEntry, LogEvent, NewPolicy, Policy, PolicyStatus,
    ReviewRequest, progress_percent,
};
use tpforge_core::section::{SectionName, SectionResult, SectionStatus};
use tpforge_core::store::Store;
use tpforge_core::transaction::Transaction;
use tracing::{debug, info, warn};

use crate::export::render_markdown;
use crate::orchestrator::{Orchestrator, RunError};
use crate::state::{PipelineState, is_error_for};

/// Re-reads after a lost version race before giving up with `Conflict`.
const MAX_MERGE_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error(transparent)]
    Run(#[from] RunError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            conflict @ StoreError::Conflict { .. } => Self::Conflict(conflict.to_string()),
            other => Self::Store(other),
        }
    }
}

pub struct PolicyService {
    store: Arc<dyn Store>,
    orchestrator: Arc<Orchestrator>,
}

impl PolicyService {
    pub fn new(store: Arc<dyn Store>, orchestrator: Arc<Orchestrator>) -> Self {
        Self { store, orchestrator }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub async fn get_policy(&self, id: i64) -> Result<Policy, ServiceError> {
        self.store
            .get_policy(id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Policy", id })
    }

    async fn load_company(&self, id: i64) -> Result<Company, ServiceError> {
        self.store
            .get_company(id)
            .await?
            .ok_or(ServiceError::NotFound { entity: "Company", id })
    }

    /// Load `ids` in order; each must exist and belong to `company_id`.
    async fn load_transactions(
        &self,
        company_id: i64,
        ids: &[i64],
    ) -> Result<Vec<Transaction>, ServiceError> {
        let mut items = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.store.get_transaction(id).await? {
                Some(tx) if tx.company_id == company_id => items.push(tx),
                _ => return Err(ServiceError::NotFound { entity: "Transaction", id }),
            }
        }
        Ok(items)
    }

    /// Create a policy record and run the full pipeline for it.
    pub async fn generate_policy(&self, request: &GeneratePolicyRequest) -> Result<Policy, ServiceError> {
        request.validate()?;
        let company = self.load_company(request.company_id).await?;
        let items = self
            .load_transactions(request.company_id, &request.transaction_ids)
            .await?;

        let mut policy = self
            .store
            .create_policy(NewPolicy {
                company_id: request.company_id,
                transaction_ids: request.transaction_ids.clone(),
                fiscal_year: request.fiscal_year.clone(),
            })
            .await?;
        info!(policy_id = policy.id, company = %company.name, "Policy generation started");

        match self
            .orchestrator
            .generate(company, items, request.fiscal_year.clone())
            .await
        {
            Ok(state) => {
                state.apply_to(&mut policy);
                policy.status = PolicyStatus::Review;
                self.store.save_policy(&policy).await?;
                info!(
                    policy_id = policy.id,
                    completed = policy.completed_sections.len(),
                    failed = policy.failed_sections.len(),
                    "Policy ready for review"
                );
                Ok(policy)
            }
            Err(e) => {
                warn!(policy_id = policy.id, error = %e, "Policy generation failed");
                policy.status = PolicyStatus::Failed;
                policy.errors.push(e.to_string());
                policy.generation_log.push(
                    GenerationLogEntry::new(LogEvent::Finalization, "failed").with_error(e.to_string()),
                );
                self.store.save_policy(&policy).await?;
                Err(e.into())
            }
        }
    }

    /// Regenerate one section of a stored policy.
    ///
    /// Generation runs against a snapshot; the result is then merged into the
    /// latest stored record, so concurrent changes to other sections survive.
    pub async fn regenerate_section(&self, policy_id: i64, name: SectionName) -> Result<Policy, ServiceError> {
        let snapshot = self.get_policy(policy_id).await?;
        ensure_regenerable(&snapshot)?;

        let company = self.load_company(snapshot.company_id).await?;
        let items = self
            .load_transactions(snapshot.company_id, &snapshot.transaction_ids)
            .await?;

        let state = PipelineState::restore(&snapshot, company, items);
        let state = self.orchestrator.regenerate_one(state, name).await?;

        let mut attempt = 0;
        loop {
            let mut policy = self.get_policy(policy_id).await?;
            ensure_regenerable(&policy)?;
            if policy.sections.get(name) != snapshot.sections.get(name) {
                return Err(ServiceError::Conflict(format!(
                    "section {name} was changed while it was being regenerated"
                )));
            }

            let expected = policy.version;
            policy.sections.set(name, state.sections().get(name).clone());
            sync_tracking(&mut policy, name, &state);
            policy.generation_log.extend(state.generation_log().iter().cloned());
            policy.version = expected + 1;

            match self.store.save_policy_if_version(&policy, expected).await {
                Ok(()) => {
                    info!(policy_id, section = %name, version = policy.version, "Section regenerated");
                    return Ok(policy);
                }
                Err(StoreError::Conflict { .. }) if attempt < MAX_MERGE_ATTEMPTS => {
                    attempt += 1;
                    debug!(policy_id, section = %name, attempt, "Policy changed during regeneration, merging again");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Replace a section's content by hand.
    pub async fn update_section(
        &self,
        policy_id: i64,
        name: SectionName,
        content: &str,
    ) -> Result<Policy, ServiceError> {
        let mut policy = self.get_policy(policy_id).await?;
        if policy.status == PolicyStatus::Approved {
            return Err(ServiceError::Forbidden("cannot edit an approved policy".into()));
        }
        if content.trim().is_empty() {
            let mut errors = ValidationError::new();
            errors.push("content", "must not be empty");
            return Err(errors.into());
        }

        policy.sections.set(
            name,
            SectionResult {
                content: content.to_string(),
                status: SectionStatus::Edited,
                citations: Vec::new(),
            },
        );
        policy.failed_sections.retain(|n| *n != name);
        policy.errors.retain(|e| !is_error_for(e, name));
        if !policy.completed_sections.contains(&name) {
            policy.completed_sections.push(name);
        }
        policy.generation_progress = progress_percent(policy.completed_sections.len());
        let expected = policy.version;
        policy.version += 1;
        self.store.save_policy_if_version(&policy, expected).await?;
        info!(policy_id, section = %name, "Section edited");
        Ok(policy)
    }

    pub async fn submit_review(&self, policy_id: i64, review: &ReviewRequest) -> Result<Policy, ServiceError> {
        review.validate()?;
        let mut policy = self.get_policy(policy_id).await?;
        if policy.status == PolicyStatus::Generating {
            return Err(ServiceError::Conflict("policy is still generating".into()));
        }

        let now = Utc::now();
        policy.reviewed_by = Some(review.reviewed_by.clone());
        policy.reviewed_at = Some(now);
        policy.review_comments = review.review_comments.clone();
        if review.approved {
            policy.status = PolicyStatus::Approved;
            policy.approved_by = Some(review.reviewed_by.clone());
            policy.approved_at = Some(now);
        } else {
            policy.status = PolicyStatus::Review;
            policy.approved_by = None;
            policy.approved_at = None;
        }
        self.store.save_policy_if_version(&policy, policy.version).await?;
        info!(policy_id, status = %policy.status, reviewer = %review.reviewed_by, "Review recorded");
        Ok(policy)
    }

    pub async fn delete_policy(&self, policy_id: i64) -> Result<(), ServiceError> {
        let policy = self.get_policy(policy_id).await?;
        if policy.status == PolicyStatus::Approved {
            return Err(ServiceError::Forbidden("cannot delete an approved policy".into()));
        }
        self.store.delete_policy(policy_id).await?;
        Ok(())
    }

    pub async fn export_markdown(&self, policy_id: i64) -> Result<String, ServiceError> {
        let policy = self.get_policy(policy_id).await?;
        let company = self.store.get_company(policy.company_id).await?;
        Ok(render_markdown(&policy, company.as_ref()))
    }
}

fn ensure_regenerable(policy: &Policy) -> Result<(), ServiceError> {
    match policy.status {
        PolicyStatus::Approved => Err(ServiceError::Forbidden(
            "cannot regenerate a section of an approved policy".into(),
        )),
        PolicyStatus::Generating => Err(ServiceError::Conflict("policy is still generating".into())),
        PolicyStatus::Review | PolicyStatus::Failed => Ok(()),
    }
}

/// Fold one regenerated section's tracking back into the stored lists,
/// leaving other sections' entries and errors alone.
fn sync_tracking(policy: &mut Policy, name: SectionName, state: &PipelineState) {
    policy.completed_sections.retain(|n| *n != name);
    policy.failed_sections.retain(|n| *n != name);
    policy.errors.retain(|e| !is_error_for(e, name));

    if state.completed_sections().contains(&name) {
        policy.completed_sections.push(name);
    }
    if state.failed_sections().contains(&name) {
        policy.failed_sections.push(name);
        policy
            .errors
            .extend(state.errors().iter().filter(|e| is_error_for(e, name)).cloned());
    }
    policy.generation_progress = progress_percent(policy.completed_sections.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{GenerationSettings, SectionRunner};
    use crate::template::BuiltinTemplates;
    use crate::test_helpers::{
        EchoProvider, FailingOnCallProvider, ScriptedProvider, SlowProvider, StaticRetriever,
    };
    use std::time::Duration;
    use tpforge_core::company::{EntityType, Jurisdiction, NewCompany};
    use tpforge_core::provider::Provider;
    use tpforge_core::transaction::{FunctionalProfile, NewTransaction, RiskLevel, TransactionType};
    use tpforge_store::InMemoryStore;

    fn service_with(store: Arc<InMemoryStore>, provider: Arc<dyn Provider>) -> PolicyService {
        let runner = SectionRunner::new(
            provider,
            Arc::new(StaticRetriever::with_sources(&["india_rule_10b"])),
            Arc::new(BuiltinTemplates),
            GenerationSettings::default(),
        );
        PolicyService::new(store, Arc::new(Orchestrator::new(runner)))
    }

    async fn seed(store: &InMemoryStore) -> (i64, i64) {
        let company = store
            .create_company(NewCompany {
                name: "Acme IN".into(),
                jurisdiction: Jurisdiction::India,
                tax_id: "AAACA1234A".into(),
                entity_type: EntityType::ServiceProvider,
                address: None,
                industry: Some("IT services".into()),
                fiscal_year_end: Some("31-Mar".into()),
            })
            .await
            .unwrap();
        let tx = store
            .create_transaction(NewTransaction {
                company_id: company.id,
                transaction_type: TransactionType::Services,
                description: "Software development services".into(),
                related_party_name: "Acme US Inc".into(),
                related_party_jurisdiction: "US".into(),
                amount: Some(2_500_000.0),
                currency: "USD".into(),
                fiscal_year: Some("2023-24".into()),
                functional_profile: FunctionalProfile {
                    functions: vec!["dev".into()],
                    assets: vec!["workforce".into()],
                    risks: vec!["low".into()],
                    risk_level: RiskLevel::Low,
                },
            })
            .await
            .unwrap();
        (company.id, tx.id)
    }

    fn request(company_id: i64, tx_id: i64) -> GeneratePolicyRequest {
        GeneratePolicyRequest {
            company_id,
            transaction_ids: vec![tx_id],
            fiscal_year: "2023-24".into(),
        }
    }

    #[tokio::test]
    async fn generate_persists_review_status() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let service = service_with(store.clone(), Arc::new(ScriptedProvider::repeating("text")));

        let policy = service.generate_policy(&request(c, t)).await.unwrap();
        assert_eq!(policy.status, PolicyStatus::Review);
        assert_eq!(policy.generation_progress, 100);
        assert!(!policy.needs_attention());

        let stored = store.get_policy(policy.id).await.unwrap().unwrap();
        assert_eq!(stored.sections, policy.sections);
        assert_eq!(stored.sections.get(SectionName::Benchmarking).citations, vec!["india_rule_10b"]);
    }

    #[tokio::test]
    async fn section_failures_still_reach_review() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let service = service_with(store, Arc::new(FailingOnCallProvider::new(&[2])));

        let policy = service.generate_policy(&request(c, t)).await.unwrap();
        assert_eq!(policy.status, PolicyStatus::Review);
        assert!(policy.needs_attention());
        assert_eq!(policy.failed_sections, vec![SectionName::RelatedParties]);
        assert_eq!(policy.generation_progress, 85);
    }

    #[tokio::test]
    async fn generate_rejects_foreign_or_missing_transactions() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let (other_company, _) = seed(&store).await;
        let service = service_with(store, Arc::new(ScriptedProvider::repeating("x")));

        let err = service.generate_policy(&request(other_company, t)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Transaction", .. }));

        let err = service.generate_policy(&request(c, 999)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Transaction", id: 999 }));

        let err = service.generate_policy(&request(999, t)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { entity: "Company", .. }));

        let mut bad = request(c, t);
        bad.fiscal_year = "2023".into();
        assert!(matches!(
            service.generate_policy(&bad).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn regenerate_bumps_version_and_keeps_others() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let first = service_with(store.clone(), Arc::new(ScriptedProvider::repeating("v1")))
            .generate_policy(&request(c, t))
            .await
            .unwrap();

        let service = service_with(store, Arc::new(ScriptedProvider::repeating("v2")));
        let updated = service
            .regenerate_section(first.id, SectionName::Benchmarking)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.sections.get(SectionName::Benchmarking).content, "v2");
        for (name, entry) in updated.sections.iter() {
            if name != SectionName::Benchmarking {
                assert_eq!(entry, first.sections.get(name));
            }
        }
        assert!(
            updated
                .generation_log
                .iter()
                .any(|e| e.event == LogEvent::Regeneration)
        );
    }

    #[tokio::test]
    async fn regenerate_clears_prior_failure() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let first = service_with(store.clone(), Arc::new(FailingOnCallProvider::new(&[2])))
            .generate_policy(&request(c, t))
            .await
            .unwrap();
        assert_eq!(first.errors.len(), 1);

        let service = service_with(store, Arc::new(ScriptedProvider::repeating("fixed")));
        let updated = service
            .regenerate_section(first.id, SectionName::RelatedParties)
            .await
            .unwrap();
        assert!(updated.failed_sections.is_empty());
        assert!(updated.errors.is_empty());
        assert_eq!(updated.generation_progress, 100);
        assert_eq!(
            updated.sections.get(SectionName::RelatedParties).status,
            SectionStatus::Generated
        );
    }

    #[tokio::test]
    async fn approved_policies_are_locked() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let service = service_with(store, Arc::new(ScriptedProvider::repeating("x")));
        let policy = service.generate_policy(&request(c, t)).await.unwrap();

        let approved = service
            .submit_review(
                policy.id,
                &ReviewRequest {
                    reviewed_by: "Priya".into(),
                    review_comments: Some("Looks right".into()),
                    approved: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(approved.status, PolicyStatus::Approved);
        assert_eq!(approved.approved_by.as_deref(), Some("Priya"));
        assert!(approved.approved_at.is_some());

        assert!(matches!(
            service.regenerate_section(policy.id, SectionName::Benchmarking).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.update_section(policy.id, SectionName::Benchmarking, "new").await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.delete_policy(policy.id).await,
            Err(ServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn rejection_returns_to_review() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let service = service_with(store, Arc::new(ScriptedProvider::repeating("x")));
        let policy = service.generate_policy(&request(c, t)).await.unwrap();

        let reviewed = service
            .submit_review(
                policy.id,
                &ReviewRequest {
                    reviewed_by: "Sam".into(),
                    review_comments: Some("Rework benchmarking".into()),
                    approved: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(reviewed.status, PolicyStatus::Review);
        assert_eq!(reviewed.reviewed_by.as_deref(), Some("Sam"));
        assert!(reviewed.approved_by.is_none());
    }

    #[tokio::test]
    async fn generating_policies_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let pending = store
            .create_policy(NewPolicy {
                company_id: c,
                transaction_ids: vec![t],
                fiscal_year: "2023-24".into(),
            })
            .await
            .unwrap();
        let service = service_with(store, Arc::new(ScriptedProvider::repeating("x")));

        assert!(matches!(
            service.regenerate_section(pending.id, SectionName::Benchmarking).await,
            Err(ServiceError::Conflict(_))
        ));
        let review = ReviewRequest {
            reviewed_by: "Sam".into(),
            review_comments: None,
            approved: true,
        };
        assert!(matches!(
            service.submit_review(pending.id, &review).await,
            Err(ServiceError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn manual_edit_marks_section_edited() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let service = service_with(store, Arc::new(FailingOnCallProvider::new(&[3])));
        let policy = service.generate_policy(&request(c, t)).await.unwrap();
        assert_eq!(policy.failed_sections.len(), 3);

        let edited = service
            .update_section(policy.id, SectionName::FunctionalAnalysis, "Hand-written FAR")
            .await
            .unwrap();
        let entry = edited.sections.get(SectionName::FunctionalAnalysis);
        assert_eq!(entry.status, SectionStatus::Edited);
        assert!(entry.citations.is_empty());
        assert!(!edited.failed_sections.contains(&SectionName::FunctionalAnalysis));
        assert_eq!(edited.errors.len(), 2);
        assert_eq!(edited.version, 2);

        assert!(matches!(
            service.update_section(policy.id, SectionName::Benchmarking, "  ").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn edited_dependency_unblocks_regeneration() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let policy = service_with(store.clone(), Arc::new(FailingOnCallProvider::new(&[3])))
            .generate_policy(&request(c, t))
            .await
            .unwrap();

        let service = service_with(store, Arc::new(EchoProvider));
        service
            .update_section(policy.id, SectionName::FunctionalAnalysis, "REVIEWED-FAR")
            .await
            .unwrap();
        let updated = service
            .regenerate_section(policy.id, SectionName::ComparabilityAnalysis)
            .await
            .unwrap();
        let entry = updated.sections.get(SectionName::ComparabilityAnalysis);
        assert_eq!(entry.status, SectionStatus::Generated);
        assert!(entry.content.contains("REVIEWED-FAR"));
        assert_eq!(updated.failed_sections, vec![SectionName::MethodSelection]);
    }

    #[tokio::test]
    async fn failed_regeneration_blocks_dependents() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let policy = service_with(store.clone(), Arc::new(ScriptedProvider::repeating("FA-v1")))
            .generate_policy(&request(c, t))
            .await
            .unwrap();

        let failed = service_with(store.clone(), Arc::new(FailingOnCallProvider::new(&[1])))
            .regenerate_section(policy.id, SectionName::FunctionalAnalysis)
            .await
            .unwrap();
        assert_eq!(failed.failed_sections, vec![SectionName::FunctionalAnalysis]);
        assert_eq!(
            failed.sections.get(SectionName::FunctionalAnalysis).content,
            "FA-v1"
        );

        let echo = service_with(store, Arc::new(EchoProvider));
        let updated = echo
            .regenerate_section(policy.id, SectionName::ComparabilityAnalysis)
            .await
            .unwrap();
        let entry = updated.sections.get(SectionName::ComparabilityAnalysis);
        assert_eq!(entry.content, "FA-v1");
        assert!(!entry.content.contains("FUNCTIONAL ANALYSIS (already drafted)"));
        assert_eq!(
            updated.failed_sections,
            vec![SectionName::FunctionalAnalysis, SectionName::ComparabilityAnalysis]
        );
        assert!(updated.errors.contains(
            &"comparability_analysis: missing prerequisite: functional_analysis failed".to_string()
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_regenerations_keep_both_sections() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let policy = service_with(store.clone(), Arc::new(ScriptedProvider::repeating("v1")))
            .generate_policy(&request(c, t))
            .await
            .unwrap();

        let slow = service_with(store.clone(), Arc::new(SlowProvider::new(Duration::from_secs(5))));
        let (summary, bench) = tokio::join!(
            slow.regenerate_section(policy.id, SectionName::ExecutiveSummary),
            slow.regenerate_section(policy.id, SectionName::Benchmarking),
        );
        summary.unwrap();
        bench.unwrap();

        let stored = store.get_policy(policy.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 3);
        assert_eq!(stored.sections.get(SectionName::ExecutiveSummary).content, "late");
        assert_eq!(stored.sections.get(SectionName::Benchmarking).content, "late");
        assert_eq!(stored.sections.get(SectionName::RelatedParties).content, "v1");
        assert_eq!(
            stored
                .generation_log
                .iter()
                .filter(|e| e.event == LogEvent::Regeneration)
                .count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_regeneration_wins() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let policy = service_with(store.clone(), Arc::new(ScriptedProvider::repeating("v1")))
            .generate_policy(&request(c, t))
            .await
            .unwrap();

        let service = service_with(store.clone(), Arc::new(SlowProvider::new(Duration::from_secs(5))));
        let (regenerated, edited) = tokio::join!(
            service.regenerate_section(policy.id, SectionName::Benchmarking),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                service
                    .update_section(policy.id, SectionName::Benchmarking, "Hand-tuned range")
                    .await
            },
        );
        edited.unwrap();
        assert!(matches!(regenerated, Err(ServiceError::Conflict(_))));

        let stored = store.get_policy(policy.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        let entry = stored.sections.get(SectionName::Benchmarking);
        assert_eq!(entry.content, "Hand-tuned range");
        assert_eq!(entry.status, SectionStatus::Edited);
    }

    #[tokio::test]
    async fn store_version_conflict_maps_to_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let service = service_with(store.clone(), Arc::new(ScriptedProvider::repeating("v1")));
        let policy = service.generate_policy(&request(c, t)).await.unwrap();

        let mut newer = store.get_policy(policy.id).await.unwrap().unwrap();
        newer.version = 2;
        store.save_policy_if_version(&newer, 1).await.unwrap();

        let mut stale = policy.clone();
        stale.version = 2;
        assert!(matches!(
            ServiceError::from(store.save_policy_if_version(&stale, 1).await.unwrap_err()),
            ServiceError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn export_and_delete() {
        let store = Arc::new(InMemoryStore::new());
        let (c, t) = seed(&store).await;
        let service = service_with(store.clone(), Arc::new(ScriptedProvider::repeating("Body text")));
        let policy = service.generate_policy(&request(c, t)).await.unwrap();

        let md = service.export_markdown(policy.id).await.unwrap();
        assert!(md.contains("Acme IN"));
        assert!(md.contains("## 6. Benchmarking Analysis"));

        service.delete_policy(policy.id).await.unwrap();
        assert!(matches!(
            service.get_policy(policy.id).await,
            Err(ServiceError::NotFound { entity: "Policy", .. })
        ));
    }
}
