//! Store trait: persistence of companies, transactions and policy records.
//!
//! Implementations: SQLite (default), in-memory (tests, one-shot runs).
//! Ids are assigned by the store. Deleting a company removes its
//! transactions and policies.

use async_trait::async_trait;

use crate::company::{Company, NewCompany};
use crate::error::StoreError;
use crate::policy::{NewPolicy, Policy};
use crate::transaction::{NewTransaction, Transaction};

type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    // --- Companies ---

    async fn create_company(&self, input: NewCompany) -> StoreResult<Company>;

    async fn get_company(&self, id: i64) -> StoreResult<Option<Company>>;

    async fn list_companies(&self) -> StoreResult<Vec<Company>>;

    /// Fails with `NotFound` if the company does not exist.
    async fn update_company(&self, id: i64, input: NewCompany) -> StoreResult<Company>;

    /// Returns whether a company was removed.
    async fn delete_company(&self, id: i64) -> StoreResult<bool>;

    // --- Transactions ---

    /// Fails with `NotFound` if `input.company_id` does not exist.
    async fn create_transaction(&self, input: NewTransaction) -> StoreResult<Transaction>;

    async fn get_transaction(&self, id: i64) -> StoreResult<Option<Transaction>>;

    /// All transactions, or only those of one company.
    async fn list_transactions(&self, company_id: Option<i64>) -> StoreResult<Vec<Transaction>>;

    async fn update_transaction(&self, id: i64, input: NewTransaction)
    -> StoreResult<Transaction>;

    async fn delete_transaction(&self, id: i64) -> StoreResult<bool>;

    // --- Policies ---

    /// Creates a record in `generating` status with all sections pending.
    async fn create_policy(&self, input: NewPolicy) -> StoreResult<Policy>;

    async fn get_policy(&self, id: i64) -> StoreResult<Option<Policy>>;

    async fn list_policies(&self, company_id: Option<i64>) -> StoreResult<Vec<Policy>>;

    /// Overwrite a policy record. Fails with `NotFound` if it does not exist.
    async fn save_policy(&self, policy: &Policy) -> StoreResult<()>;

    /// Overwrite a policy only while its stored `version` still equals
    /// `expected_version`; otherwise fails with `Conflict`.
    async fn save_policy_if_version(&self, policy: &Policy, expected_version: u32) -> StoreResult<()>;

    async fn delete_policy(&self, id: i64) -> StoreResult<bool>;
}
