//! SQLite backend.
//!
//! One database file with three tables:
//! - `companies`
//! - `transactions` (cascade on company delete)
//! - `policies` (cascade on company delete)
//!
//! List-valued and nested fields are stored as JSON text, timestamps as
//! RFC 3339 strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tpforge_core::company::{Company, NewCompany};
use tpforge_core::error::StoreError;
use tpforge_core::policy::{NewPolicy, Policy};
use tpforge_core::store::Store;
use tpforge_core::transaction::{NewTransaction, Transaction};
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS companies (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL,
                jurisdiction    TEXT NOT NULL,
                tax_id          TEXT NOT NULL,
                entity_type     TEXT NOT NULL,
                address         TEXT,
                industry        TEXT,
                fiscal_year_end TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("companies table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS transactions (
                id                         INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id                 INTEGER NOT NULL
                                           REFERENCES companies(id) ON DELETE CASCADE,
                transaction_type           TEXT NOT NULL,
                description                TEXT NOT NULL,
                related_party_name         TEXT NOT NULL,
                related_party_jurisdiction TEXT NOT NULL,
                amount                     REAL,
                currency                   TEXT NOT NULL,
                fiscal_year                TEXT,
                functional_profile         TEXT NOT NULL,
                created_at                 TEXT NOT NULL,
                updated_at                 TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("transactions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS policies (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                company_id          INTEGER NOT NULL
                                    REFERENCES companies(id) ON DELETE CASCADE,
                transaction_ids     TEXT NOT NULL,
                fiscal_year         TEXT NOT NULL,
                status              TEXT NOT NULL,
                version             INTEGER NOT NULL,
                sections            TEXT NOT NULL,
                completed_sections  TEXT NOT NULL,
                failed_sections     TEXT NOT NULL,
                errors              TEXT NOT NULL,
                generation_progress INTEGER NOT NULL,
                generation_log      TEXT NOT NULL,
                reviewed_by         TEXT,
                reviewed_at         TEXT,
                review_comments     TEXT,
                approved_by         TEXT,
                approved_at         TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("policies table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_transactions_company ON transactions(company_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("transactions index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_policies_company ON policies(company_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("policies index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn company_exists(&self, id: i64) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM companies WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("company lookup: {e}")))?;
        Ok(row.is_some())
    }

    async fn require_company(&self, id: i64) -> Result<(), StoreError> {
        if self.company_exists(id).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound { entity: "Company", id })
        }
    }

    async fn insert_company(&self, c: &Company) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO companies
                (name, jurisdiction, tax_id, entity_type, address, industry,
                 fiscal_year_end, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&c.name)
        .bind(c.jurisdiction.as_str())
        .bind(&c.tax_id)
        .bind(c.entity_type.as_str())
        .bind(&c.address)
        .bind(&c.industry)
        .bind(&c.fiscal_year_end)
        .bind(c.created_at.to_rfc3339())
        .bind(c.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT company failed: {e}")))?;
        Ok(result.last_insert_rowid())
    }

    /// `UPDATE` a policy row; with `expected_version` the row must still carry it.
    async fn update_policy(&self, policy: &Policy, expected_version: Option<u32>) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE policies SET
                transaction_ids = ?1, fiscal_year = ?2, status = ?3, version = ?4,
                sections = ?5, completed_sections = ?6, failed_sections = ?7, errors = ?8,
                generation_progress = ?9, generation_log = ?10, reviewed_by = ?11,
                reviewed_at = ?12, review_comments = ?13, approved_by = ?14,
                approved_at = ?15, updated_at = ?16
            WHERE id = ?17 AND (?18 IS NULL OR version = ?18)
            "#,
        )
        .bind(to_json(&policy.transaction_ids)?)
        .bind(&policy.fiscal_year)
        .bind(policy.status.as_str())
        .bind(i64::from(policy.version))
        .bind(to_json(&policy.sections)?)
        .bind(to_json(&policy.completed_sections)?)
        .bind(to_json(&policy.failed_sections)?)
        .bind(to_json(&policy.errors)?)
        .bind(i64::from(policy.generation_progress))
        .bind(to_json(&policy.generation_log)?)
        .bind(&policy.reviewed_by)
        .bind(policy.reviewed_at.map(|t| t.to_rfc3339()))
        .bind(&policy.review_comments)
        .bind(&policy.approved_by)
        .bind(policy.approved_at.map(|t| t.to_rfc3339()))
        .bind(Utc::now().to_rfc3339())
        .bind(policy.id)
        .bind(expected_version.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE policy failed: {e}")))?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM policies WHERE id = ?1")
                .bind(policy.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("policy lookup: {e}")))?
                .is_some();
            return Err(if exists {
                StoreError::Conflict { entity: "Policy", id: policy.id }
            } else {
                StoreError::NotFound { entity: "Policy", id: policy.id }
            });
        }
        Ok(())
    }

    fn row_to_company(row: &SqliteRow) -> Result<Company, StoreError> {
        Ok(Company {
            id: column(row, "id")?,
            name: column(row, "name")?,
            jurisdiction: text_to_enum(&column::<String>(row, "jurisdiction")?)?,
            tax_id: column(row, "tax_id")?,
            entity_type: text_to_enum(&column::<String>(row, "entity_type")?)?,
            address: column(row, "address")?,
            industry: column(row, "industry")?,
            fiscal_year_end: column(row, "fiscal_year_end")?,
            created_at: parse_time(&column::<String>(row, "created_at")?)?,
            updated_at: parse_time(&column::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction, StoreError> {
        Ok(Transaction {
            id: column(row, "id")?,
            company_id: column(row, "company_id")?,
            transaction_type: text_to_enum(&column::<String>(row, "transaction_type")?)?,
            description: column(row, "description")?,
            related_party_name: column(row, "related_party_name")?,
            related_party_jurisdiction: column(row, "related_party_jurisdiction")?,
            amount: column(row, "amount")?,
            currency: column(row, "currency")?,
            fiscal_year: column(row, "fiscal_year")?,
            functional_profile: from_json(&column::<String>(row, "functional_profile")?)?,
            created_at: parse_time(&column::<String>(row, "created_at")?)?,
            updated_at: parse_time(&column::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_policy(row: &SqliteRow) -> Result<Policy, StoreError> {
        let version: i64 = column(row, "version")?;
        let progress: i64 = column(row, "generation_progress")?;
        Ok(Policy {
            id: column(row, "id")?,
            company_id: column(row, "company_id")?,
            transaction_ids: from_json(&column::<String>(row, "transaction_ids")?)?,
            fiscal_year: column(row, "fiscal_year")?,
            status: text_to_enum(&column::<String>(row, "status")?)?,
            version: u32::try_from(version)
                .map_err(|_| StoreError::Corrupted(format!("version {version}")))?,
            sections: from_json(&column::<String>(row, "sections")?)?,
            completed_sections: from_json(&column::<String>(row, "completed_sections")?)?,
            failed_sections: from_json(&column::<String>(row, "failed_sections")?)?,
            errors: from_json(&column::<String>(row, "errors")?)?,
            generation_progress: u8::try_from(progress)
                .map_err(|_| StoreError::Corrupted(format!("generation_progress {progress}")))?,
            generation_log: from_json(&column::<String>(row, "generation_log")?)?,
            reviewed_by: column(row, "reviewed_by")?,
            reviewed_at: parse_optional_time(column(row, "reviewed_at")?)?,
            review_comments: column(row, "review_comments")?,
            approved_by: column(row, "approved_by")?,
            approved_at: parse_optional_time(column(row, "approved_at")?)?,
            created_at: parse_time(&column::<String>(row, "created_at")?)?,
            updated_at: parse_time(&column::<String>(row, "updated_at")?)?,
        })
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage(format!("serialization: {e}")))
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_str(text).map_err(|e| StoreError::Corrupted(e.to_string()))
}

/// Enums are stored under their serde names.
fn text_to_enum<T: DeserializeOwned>(text: &str) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|e| StoreError::Corrupted(format!("{text:?}: {e}")))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupted(format!("timestamp {text:?}: {e}")))
}

fn parse_optional_time(text: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    text.as_deref().map(parse_time).transpose()
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_company(&self, input: NewCompany) -> Result<Company, StoreError> {
        let mut company = input.into_company(0);
        company.id = self.insert_company(&company).await?;
        debug!(id = company.id, "Stored company");
        Ok(company)
    }

    async fn get_company(&self, id: i64) -> Result<Option<Company>, StoreError> {
        let row = sqlx::query("SELECT * FROM companies WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get company: {e}")))?;
        row.as_ref().map(Self::row_to_company).transpose()
    }

    async fn list_companies(&self) -> Result<Vec<Company>, StoreError> {
        let rows = sqlx::query("SELECT * FROM companies ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list companies: {e}")))?;
        rows.iter().map(Self::row_to_company).collect()
    }

    async fn update_company(&self, id: i64, input: NewCompany) -> Result<Company, StoreError> {
        let existing = self
            .get_company(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "Company", id })?;
        let c = input.apply_to(&existing);
        sqlx::query(
            r#"
            UPDATE companies SET
                name = ?1, jurisdiction = ?2, tax_id = ?3, entity_type = ?4,
                address = ?5, industry = ?6, fiscal_year_end = ?7, updated_at = ?8
            WHERE id = ?9
            "#,
        )
        .bind(&c.name)
        .bind(c.jurisdiction.as_str())
        .bind(&c.tax_id)
        .bind(c.entity_type.as_str())
        .bind(&c.address)
        .bind(&c.industry)
        .bind(&c.fiscal_year_end)
        .bind(c.updated_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE company failed: {e}")))?;
        Ok(c)
    }

    async fn delete_company(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM companies WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE company failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_transaction(&self, input: NewTransaction) -> Result<Transaction, StoreError> {
        self.require_company(input.company_id).await?;
        let mut tx = input.into_transaction(0);
        let result = sqlx::query(
            r#"
            INSERT INTO transactions
                (company_id, transaction_type, description, related_party_name,
                 related_party_jurisdiction, amount, currency, fiscal_year,
                 functional_profile, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(tx.company_id)
        .bind(tx.transaction_type.as_str())
        .bind(&tx.description)
        .bind(&tx.related_party_name)
        .bind(&tx.related_party_jurisdiction)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(&tx.fiscal_year)
        .bind(to_json(&tx.functional_profile)?)
        .bind(tx.created_at.to_rfc3339())
        .bind(tx.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT transaction failed: {e}")))?;
        tx.id = result.last_insert_rowid();
        debug!(id = tx.id, company_id = tx.company_id, "Stored transaction");
        Ok(tx)
    }

    async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query("SELECT * FROM transactions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get transaction: {e}")))?;
        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    async fn list_transactions(&self, company_id: Option<i64>) -> Result<Vec<Transaction>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM transactions WHERE ?1 IS NULL OR company_id = ?1 ORDER BY id",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list transactions: {e}")))?;
        rows.iter().map(Self::row_to_transaction).collect()
    }

    async fn update_transaction(
        &self,
        id: i64,
        input: NewTransaction,
    ) -> Result<Transaction, StoreError> {
        self.require_company(input.company_id).await?;
        let existing = self
            .get_transaction(id)
            .await?
            .ok_or(StoreError::NotFound { entity: "Transaction", id })?;
        let tx = input.apply_to(&existing);
        sqlx::query(
            r#"
            UPDATE transactions SET
                company_id = ?1, transaction_type = ?2, description = ?3,
                related_party_name = ?4, related_party_jurisdiction = ?5, amount = ?6,
                currency = ?7, fiscal_year = ?8, functional_profile = ?9, updated_at = ?10
            WHERE id = ?11
            "#,
        )
        .bind(tx.company_id)
        .bind(tx.transaction_type.as_str())
        .bind(&tx.description)
        .bind(&tx.related_party_name)
        .bind(&tx.related_party_jurisdiction)
        .bind(tx.amount)
        .bind(&tx.currency)
        .bind(&tx.fiscal_year)
        .bind(to_json(&tx.functional_profile)?)
        .bind(tx.updated_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE transaction failed: {e}")))?;
        Ok(tx)
    }

    async fn delete_transaction(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM transactions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE transaction failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_policy(&self, input: NewPolicy) -> Result<Policy, StoreError> {
        self.require_company(input.company_id).await?;
        let mut policy = input.into_policy(0);
        let result = sqlx::query(
            r#"
            INSERT INTO policies
                (company_id, transaction_ids, fiscal_year, status, version, sections,
                 completed_sections, failed_sections, errors, generation_progress,
                 generation_log, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(policy.company_id)
        .bind(to_json(&policy.transaction_ids)?)
        .bind(&policy.fiscal_year)
        .bind(policy.status.as_str())
        .bind(i64::from(policy.version))
        .bind(to_json(&policy.sections)?)
        .bind(to_json(&policy.completed_sections)?)
        .bind(to_json(&policy.failed_sections)?)
        .bind(to_json(&policy.errors)?)
        .bind(i64::from(policy.generation_progress))
        .bind(to_json(&policy.generation_log)?)
        .bind(policy.created_at.to_rfc3339())
        .bind(policy.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT policy failed: {e}")))?;
        policy.id = result.last_insert_rowid();
        debug!(id = policy.id, company_id = policy.company_id, "Stored policy");
        Ok(policy)
    }

    async fn get_policy(&self, id: i64) -> Result<Option<Policy>, StoreError> {
        let row = sqlx::query("SELECT * FROM policies WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get policy: {e}")))?;
        row.as_ref().map(Self::row_to_policy).transpose()
    }

    async fn list_policies(&self, company_id: Option<i64>) -> Result<Vec<Policy>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM policies WHERE ?1 IS NULL OR company_id = ?1 ORDER BY id")
                .bind(company_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("list policies: {e}")))?;
        rows.iter().map(Self::row_to_policy).collect()
    }

    async fn save_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.update_policy(policy, None).await
    }

    async fn save_policy_if_version(
        &self,
        policy: &Policy,
        expected_version: u32,
    ) -> Result<(), StoreError> {
        self.update_policy(policy, Some(expected_version)).await
    }

    async fn delete_policy(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM policies WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE policy failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
