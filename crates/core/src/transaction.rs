//! Intercompany transactions: the line items a policy covers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::company::Jurisdiction;
use crate::error::ValidationError;
use crate::validation::{check_len, check_non_empty_list, is_currency_code, is_fiscal_year};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    #[serde(rename = "services")]
    Services,
    #[serde(rename = "goods")]
    Goods,
    #[serde(rename = "loans")]
    Loans,
    #[serde(rename = "guarantees")]
    Guarantees,
    #[serde(rename = "IP")]
    Ip,
    #[serde(rename = "cost_sharing")]
    CostSharing,
}

impl TransactionType {
    pub const ALL: [TransactionType; 6] = [
        Self::Services,
        Self::Goods,
        Self::Loans,
        Self::Guarantees,
        Self::Ip,
        Self::CostSharing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Services => "services",
            Self::Goods => "goods",
            Self::Loans => "loans",
            Self::Guarantees => "guarantees",
            Self::Ip => "IP",
            Self::CostSharing => "cost_sharing",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown transaction type '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Functions performed, assets employed and risks assumed (the FAR profile).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionalProfile {
    pub functions: Vec<String>,
    pub assets: Vec<String>,
    pub risks: Vec<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
}

impl FunctionalProfile {
    fn validate_into(&self, errors: &mut ValidationError) {
        check_non_empty_list(errors, "functional_profile.functions", &self.functions);
        check_non_empty_list(errors, "functional_profile.assets", &self.assets);
        check_non_empty_list(errors, "functional_profile.risks", &self.risks);
    }
}

/// A persisted transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub company_id: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    pub related_party_name: String,
    pub related_party_jurisdiction: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub fiscal_year: Option<String>,
    pub functional_profile: FunctionalProfile,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_currency() -> String {
    "USD".into()
}

/// Transaction fields accepted on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    /// Zero when omitted; rejected by `validate`
    #[serde(default)]
    pub company_id: i64,
    pub transaction_type: TransactionType,
    pub description: String,
    pub related_party_name: String,
    pub related_party_jurisdiction: String,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub fiscal_year: Option<String>,
    pub functional_profile: FunctionalProfile,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        if self.company_id <= 0 {
            errors.push("company_id", "must be a positive id");
        }
        check_len(&mut errors, "description", &self.description, 10, 1000);
        check_len(&mut errors, "related_party_name", &self.related_party_name, 1, 255);
        check_len(
            &mut errors,
            "related_party_jurisdiction",
            &self.related_party_jurisdiction,
            1,
            100,
        );
        if let Some(amount) = self.amount {
            if !(amount > 0.0 && amount.is_finite()) {
                errors.push("amount", "must be greater than 0");
            }
        }
        if !is_currency_code(&self.currency) {
            errors.push("currency", "must be a 3-letter uppercase code");
        }
        if let Some(fy) = &self.fiscal_year {
            if !is_fiscal_year(fy) {
                errors.push("fiscal_year", "must look like 2023-24");
            }
        }
        self.functional_profile.validate_into(&mut errors);
        errors.into_result()
    }

    pub fn into_transaction(self, id: i64) -> Transaction {
        let now = Utc::now();
        Transaction {
            id,
            company_id: self.company_id,
            transaction_type: self.transaction_type,
            description: self.description,
            related_party_name: self.related_party_name,
            related_party_jurisdiction: self.related_party_jurisdiction,
            amount: self.amount,
            currency: self.currency,
            fiscal_year: self.fiscal_year,
            functional_profile: self.functional_profile,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply_to(self, existing: &Transaction) -> Transaction {
        let mut updated = self.into_transaction(existing.id);
        updated.created_at = existing.created_at;
        updated
    }
}

/// Convenience for building in-memory transactions (CLI one-shot runs, tests).
impl Transaction {
    pub fn draft(
        transaction_type: TransactionType,
        related_party_name: impl Into<String>,
        related_party_jurisdiction: Jurisdiction,
        functional_profile: FunctionalProfile,
    ) -> Self {
        NewTransaction {
            company_id: 0,
            transaction_type,
            description: format!("Intercompany {transaction_type} transaction"),
            related_party_name: related_party_name.into(),
            related_party_jurisdiction: related_party_jurisdiction.to_string(),
            amount: None,
            currency: default_currency(),
            fiscal_year: None,
            functional_profile,
        }
        .into_transaction(0)
    }
}
