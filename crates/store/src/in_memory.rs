//! In-memory store: used by one-shot CLI runs and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tpforge_core::company::{Company, NewCompany};
use tpforge_core::error::StoreError;
use tpforge_core::policy::{NewPolicy, Policy};
use tpforge_core::store::Store;
use tpforge_core::transaction::{NewTransaction, Transaction};

#[derive(Default)]
struct Tables {
    companies: BTreeMap<i64, Company>,
    transactions: BTreeMap<i64, Transaction>,
    policies: BTreeMap<i64, Policy>,
    last_company_id: i64,
    last_transaction_id: i64,
    last_policy_id: i64,
}

/// A store that keeps every table in maps behind one lock.
/// Nothing survives the process.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn write_policy(&self, policy: &Policy, expected_version: Option<u32>) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        let slot = t.policies.get_mut(&policy.id).ok_or(StoreError::NotFound {
            entity: "Policy",
            id: policy.id,
        })?;
        if expected_version.is_some_and(|v| v != slot.version) {
            return Err(StoreError::Conflict {
                entity: "Policy",
                id: policy.id,
            });
        }
        let mut saved = policy.clone();
        saved.updated_at = Utc::now();
        *slot = saved;
        Ok(())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create_company(&self, input: NewCompany) -> Result<Company, StoreError> {
        let mut t = self.tables.write().await;
        t.last_company_id += 1;
        let company = input.into_company(t.last_company_id);
        t.companies.insert(company.id, company.clone());
        Ok(company)
    }

    async fn get_company(&self, id: i64) -> Result<Option<Company>, StoreError> {
        Ok(self.tables.read().await.companies.get(&id).cloned())
    }

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        Ok(self.tables.read().await.companies.values().cloned().collect())
    }

    async fn update_company(&self, id: i64, input: NewCompany) -> Result<Company, StoreError> {
        let mut t = self.tables.write().await;
        let existing = t
            .companies
            .get(&id)
            .ok_or(StoreError::NotFound { entity: "Company", id })?;
        let updated = input.apply_to(existing);
        t.companies.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_company(&self, id: i64) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        if t.companies.remove(&id).is_none() {
            return Ok(false);
        }
        t.transactions.retain(|_, tx| tx.company_id != id);
        t.policies.retain(|_, p| p.company_id != id);
        Ok(true)
    }

    async fn create_transaction(&self, input: NewTransaction) -> Result<Transaction, StoreError> {
        let mut t = self.tables.write().await;
        if !t.companies.contains_key(&input.company_id) {
            return Err(StoreError::NotFound {
                entity: "Company",
                id: input.company_id,
            });
        }
        t.last_transaction_id += 1;
        let tx = input.into_transaction(t.last_transaction_id);
        t.transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>, StoreError> {
        Ok(self.tables.read().await.transactions.get(&id).cloned())
    }

    async fn list_transactions(&self, company_id: Option<i64>) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .transactions
            .values()
            .filter(|tx| company_id.is_none_or(|c| tx.company_id == c))
            .cloned()
            .collect())
    }

    async fn update_transaction(
        &self,
        id: i64,
        input: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        let mut t = self.tables.write().await;
        if !t.companies.contains_key(&input.company_id) {
            return Err(StoreError::NotFound {
                entity: "Company",
                id: input.company_id,
            });
        }
        let existing = t
            .transactions
            .get(&id)
            .ok_or(StoreError::NotFound { entity: "Transaction", id })?;
        let updated = input.apply_to(existing);
        t.transactions.insert(id, updated.clone());
        Ok(updated)
    }

    async fn delete_transaction(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.transactions.remove(&id).is_some())
    }

    async fn create_policy(&self, input: NewPolicy) -> Result<Policy, StoreError> {
        let mut t = self.tables.write().await;
        if !t.companies.contains_key(&input.company_id) {
            return Err(StoreError::NotFound {
                entity: "Company",
                id: input.company_id,
            });
        }
        t.last_policy_id += 1;
        let policy = input.into_policy(t.last_policy_id);
        t.policies.insert(policy.id, policy.clone());
        Ok(policy)
    }

    async fn get_policy(&self, id: i64) -> Result<Option<Policy>, StoreError> {
        Ok(self.tables.read().await.policies.get(&id).cloned())
    }

    async fn list_policies(&self, company_id: Option<i64>) -> Result<Vec<Policy>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .policies
            .values()
            .filter(|p| company_id.is_none_or(|c| p.company_id == c))
            .cloned()
            .collect())
    }

    async fn save_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.write_policy(policy, None).await
    }

    async fn save_policy_if_version(
        &self,
        policy: &Policy,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        self.write_policy(policy, Some(expected_version)).await
    }

    async fn delete_policy(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.policies.remove(&id).is_some())
    }
}
