//! Behaviour every `Store` backend must share.

use tpforge_core::company::{EntityType, Jurisdiction, NewCompany};
use tpforge_core::error::StoreError;
use tpforge_core::policy::{GenerationLogEntry, LogEvent, NewPolicy, PolicyStatus};
use tpforge_core::section::{SectionName, SectionResult, SectionStatus};
use tpforge_core::store::Store;
use tpforge_core::transaction::{FunctionalProfile, NewTransaction, RiskLevel, TransactionType};

pub fn company(name: &str) -> NewCompany {
    NewCompany {
        name: name.into(),
        jurisdiction: Jurisdiction::India,
        tax_id: "AAACT1234A".into(),
        entity_type: EntityType::ServiceProvider,
        address: None,
        industry: Some("Information Technology".into()),
        fiscal_year_end: Some("31-Mar".into()),
    }
}

pub fn transaction(company_id: i64) -> NewTransaction {
    NewTransaction {
        company_id,
        transaction_type: TransactionType::Services,
        description: "Software development services".into(),
        related_party_name: "TechCorp Inc".into(),
        related_party_jurisdiction: "US".into(),
        amount: Some(1_250_000.5),
        currency: "USD".into(),
        fiscal_year: Some("2023-24".into()),
        functional_profile: FunctionalProfile {
            functions: vec!["development".into(), "testing".into()],
            assets: vec!["workforce".into()],
            risks: vec!["service risk".into()],
            risk_level: RiskLevel::Low,
        },
    }
}

pub async fn run_all(store: &dyn Store) {
    company_crud(store).await;
    transaction_crud(store).await;
    policy_round_trip(store).await;
    versioned_save_rejects_stale_writes(store).await;
    cascade_delete(store).await;
}

async fn company_crud(store: &dyn Store) {
    let created = store.create_company(company("Acme IN")).await.unwrap();
    assert!(created.id > 0);

    let fetched = store.get_company(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.name, "Acme IN");
    assert_eq!(fetched.fiscal_year_end.as_deref(), Some("31-Mar"));

    let mut changes = company("Acme India Pvt Ltd");
    changes.jurisdiction = Jurisdiction::US;
    let updated = store.update_company(created.id, changes).await.unwrap();
    assert_eq!(updated.id, created.id);
    assert_eq!(updated.jurisdiction, Jurisdiction::US);

    let missing = store.update_company(9_999, company("x")).await.unwrap_err();
    assert!(matches!(missing, StoreError::NotFound { entity: "Company", .. }));

    assert!(store.get_company(9_999).await.unwrap().is_none());
    assert!(store.delete_company(created.id).await.unwrap());
    assert!(!store.delete_company(created.id).await.unwrap());
}

async fn transaction_crud(store: &dyn Store) {
    let c = store.create_company(company("Tx Co")).await.unwrap();
    let other = store.create_company(company("Other Co")).await.unwrap();

    let tx = store.create_transaction(transaction(c.id)).await.unwrap();
    store.create_transaction(transaction(other.id)).await.unwrap();

    let fetched = store.get_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(fetched.functional_profile.functions, vec!["development", "testing"]);
    assert_eq!(fetched.amount, Some(1_250_000.5));
    assert_eq!(fetched.transaction_type, TransactionType::Services);

    assert_eq!(store.list_transactions(Some(c.id)).await.unwrap().len(), 1);
    assert!(store.list_transactions(None).await.unwrap().len() >= 2);

    let mut changes = transaction(c.id);
    changes.transaction_type = TransactionType::Ip;
    changes.amount = None;
    let updated = store.update_transaction(tx.id, changes).await.unwrap();
    assert_eq!(updated.transaction_type, TransactionType::Ip);
    assert_eq!(updated.amount, None);

    let orphan = store.create_transaction(transaction(9_999)).await.unwrap_err();
    assert!(matches!(orphan, StoreError::NotFound { entity: "Company", id: 9_999 }));

    assert!(store.delete_transaction(tx.id).await.unwrap());
    assert!(store.get_transaction(tx.id).await.unwrap().is_none());
}

async fn policy_round_trip(store: &dyn Store) {
    let c = store.create_company(company("Policy Co")).await.unwrap();
    let tx = store.create_transaction(transaction(c.id)).await.unwrap();

    let mut policy = store
        .create_policy(NewPolicy {
            company_id: c.id,
            transaction_ids: vec![tx.id],
            fiscal_year: "2023-24".into(),
        })
        .await
        .unwrap();
    assert_eq!(policy.status, PolicyStatus::Generating);
    assert_eq!(policy.sections.count_with(SectionStatus::Pending), 7);

    policy.sections.set(
        SectionName::Benchmarking,
        SectionResult::generated("Arm's length range", vec!["rule_10ca".into()]),
    );
    policy.completed_sections = vec![SectionName::Benchmarking];
    policy.failed_sections = vec![SectionName::RelatedParties];
    policy.errors = vec!["related_parties: timed out".into()];
    policy.generation_log = vec![
        GenerationLogEntry::new(LogEvent::Finalization, "partial").with_progress(14),
    ];
    policy.status = PolicyStatus::Review;
    policy.generation_progress = 14;
    store.save_policy(&policy).await.unwrap();

    let loaded = store.get_policy(policy.id).await.unwrap().unwrap();
    assert_eq!(loaded.sections, policy.sections);
    assert_eq!(loaded.completed_sections, policy.completed_sections);
    assert_eq!(loaded.failed_sections, policy.failed_sections);
    assert_eq!(loaded.errors, policy.errors);
    assert_eq!(loaded.generation_log.len(), 1);
    assert_eq!(loaded.status, PolicyStatus::Review);
    assert_eq!(loaded.transaction_ids, vec![tx.id]);
    assert!(loaded.needs_attention());

    assert_eq!(store.list_policies(Some(c.id)).await.unwrap().len(), 1);

    let mut ghost = loaded.clone();
    ghost.id = 9_999;
    assert!(matches!(
        store.save_policy(&ghost).await,
        Err(StoreError::NotFound { entity: "Policy", .. })
    ));

    assert!(store.delete_policy(policy.id).await.unwrap());
    assert!(store.get_policy(policy.id).await.unwrap().is_none());
}

async fn versioned_save_rejects_stale_writes(store: &dyn Store) {
    let c = store.create_company(company("Versioned Co")).await.unwrap();
    let tx = store.create_transaction(transaction(c.id)).await.unwrap();
    let base = store
        .create_policy(NewPolicy {
            company_id: c.id,
            transaction_ids: vec![tx.id],
            fiscal_year: "2023-24".into(),
        })
        .await
        .unwrap();

    let mut first = base.clone();
    first.version = 2;
    first.sections.set(SectionName::ExecutiveSummary, SectionResult::generated("first", vec![]));
    store.save_policy_if_version(&first, 1).await.unwrap();

    let mut stale = base.clone();
    stale.version = 2;
    stale.sections.set(SectionName::Benchmarking, SectionResult::generated("stale", vec![]));
    assert!(matches!(
        store.save_policy_if_version(&stale, 1).await,
        Err(StoreError::Conflict { entity: "Policy", .. })
    ));

    let loaded = store.get_policy(base.id).await.unwrap().unwrap();
    assert_eq!(loaded.version, 2);
    assert_eq!(loaded.sections.get(SectionName::ExecutiveSummary).content, "first");
    assert_eq!(loaded.sections.get(SectionName::Benchmarking).status, SectionStatus::Pending);

    let mut ghost = loaded.clone();
    ghost.id = 9_998;
    assert!(matches!(
        store.save_policy_if_version(&ghost, 2).await,
        Err(StoreError::NotFound { entity: "Policy", .. })
    ));
}

async fn cascade_delete(store: &dyn Store) {
    let c = store.create_company(company("Doomed Co")).await.unwrap();
    let tx = store.create_transaction(transaction(c.id)).await.unwrap();
    let p = store
        .create_policy(NewPolicy {
            company_id: c.id,
            transaction_ids: vec![tx.id],
            fiscal_year: "2024-25".into(),
        })
        .await
        .unwrap();

    assert!(store.delete_company(c.id).await.unwrap());
    assert!(store.get_transaction(tx.id).await.unwrap().is_none());
    assert!(store.get_policy(p.id).await.unwrap().is_none());
}
