//! The subject of a policy: the tested company.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::validation::{check_len, is_fiscal_year_end};

/// Tax jurisdictions with regulatory coverage in the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Jurisdiction {
    India,
    US,
}

impl Jurisdiction {
    pub const ALL: [Jurisdiction; 2] = [Jurisdiction::India, Jurisdiction::US];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::India => "India",
            Self::US => "US",
        }
    }
}

impl fmt::Display for Jurisdiction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Jurisdiction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|j| j.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown jurisdiction '{s}' (expected India or US)"))
    }
}

/// Functional characterisation of the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Manufacturer,
    Distributor,
    ServiceProvider,
    RAndD,
    ContractManufacturer,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manufacturer => "manufacturer",
            Self::Distributor => "distributor",
            Self::ServiceProvider => "service_provider",
            Self::RAndD => "r_and_d",
            Self::ContractManufacturer => "contract_manufacturer",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub jurisdiction: Jurisdiction,
    pub tax_id: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    /// e.g. `31-Mar`
    #[serde(default)]
    pub fiscal_year_end: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Company {
    /// An unsaved company with only the attributes generation needs.
    pub fn draft(
        name: impl Into<String>,
        jurisdiction: Jurisdiction,
        tax_id: impl Into<String>,
        entity_type: EntityType,
    ) -> Self {
        NewCompany {
            name: name.into(),
            jurisdiction,
            tax_id: tax_id.into(),
            entity_type,
            address: None,
            industry: None,
            fiscal_year_end: None,
        }
        .into_company(0)
    }
}

/// Company fields accepted on create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCompany {
    pub name: String,
    pub jurisdiction: Jurisdiction,
    pub tax_id: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub fiscal_year_end: Option<String>,
}

impl NewCompany {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::new();
        check_len(&mut errors, "name", &self.name, 1, 255);
        check_len(&mut errors, "tax_id", &self.tax_id, 1, 100);
        if let Some(industry) = &self.industry {
            if industry.chars().count() > 100 {
                errors.push("industry", "must be at most 100 characters");
            }
        }
        if let Some(fye) = &self.fiscal_year_end {
            if !is_fiscal_year_end(fye) {
                errors.push("fiscal_year_end", "must look like 31-Mar");
            }
        }
        errors.into_result()
    }

    /// Materialize with an id and fresh timestamps.
    pub fn into_company(self, id: i64) -> Company {
        let now = Utc::now();
        Company {
            id,
            name: self.name,
            jurisdiction: self.jurisdiction,
            tax_id: self.tax_id,
            entity_type: self.entity_type,
            address: self.address,
            industry: self.industry,
            fiscal_year_end: self.fiscal_year_end,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply these fields to an existing company, keeping id and creation time.
    pub fn apply_to(self, existing: &Company) -> Company {
        let mut updated = self.into_company(existing.id);
        updated.created_at = existing.created_at;
        updated
    }
}
