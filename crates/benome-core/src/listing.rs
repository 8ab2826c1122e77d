use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingCategory {
    RealEstate,
    Automobile,
    Services,
    Goods,
}

impl ListingCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ListingCategory::RealEstate => "real_estate",
            ListingCategory::Automobile => "automobile",
            ListingCategory::Services => "services",
            ListingCategory::Goods => "goods",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "real_estate" => Ok(Self::RealEstate),
            "automobile" => Ok(Self::Automobile),
            "services" => Ok(Self::Services),
            "goods" => Ok(Self::Goods),
            other => Err(anyhow!(
                "invalid category '{other}': expected real_estate, automobile, services or goods"
            )),
        }
    }
}

/// Local mirror of a marketplace listing: just enough to authorize boost
/// purchases and search boosts by title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub category: ListingCategory,
    pub created_at: DateTime<Utc>,
}
