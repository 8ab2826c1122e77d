use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BoostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    #[default]
    Low,
    Medium,
    High,
    Top,
}

impl PriorityLevel {
    /// Multiplier applied to a listing's base ranking score.
    pub fn rank_factor(self) -> f64 {
        match self {
            PriorityLevel::Low => 1.25,
            PriorityLevel::Medium => 1.5,
            PriorityLevel::High => 2.0,
            PriorityLevel::Top => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeKind {
    #[default]
    None,
    Boosted,
    Premium,
    Vip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportLevel {
    #[default]
    Standard,
    Priority,
}

/// Feature set granted by a package.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostFeatures {
    pub priority: PriorityLevel,
    pub badge: BadgeKind,
    pub featured: bool,
    pub analytics: bool,
    pub support: SupportLevel,
}

impl BoostFeatures {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| anyhow!("malformed package features: {e}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostPackage {
    pub id: String,
    pub name: String,
    /// Whole XOF.
    pub price: i64,
    pub duration_days: u32,
    pub features: BoostFeatures,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub price: i64,
    pub duration_days: u32,
    #[serde(default)]
    pub features: BoostFeatures,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageUpdate {
    pub name: Option<String>,
    pub price: Option<i64>,
    pub duration_days: Option<u32>,
    pub features: Option<BoostFeatures>,
    pub active: Option<bool>,
}

/// Longest boost a package may sell, roughly ten years.
pub const MAX_DURATION_DAYS: u32 = 3650;

fn validate_terms(name: Option<&str>, price: Option<i64>, duration_days: Option<u32>) -> Result<(), BoostError> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(BoostError::Validation("package name is required".to_string()));
    }
    if price.is_some_and(|p| p <= 0) {
        return Err(BoostError::Validation(
            "package price must be a positive amount of XOF".to_string(),
        ));
    }
    if duration_days == Some(0) {
        return Err(BoostError::Validation(
            "package duration must be at least one day".to_string(),
        ));
    }
    if duration_days.is_some_and(|d| d > MAX_DURATION_DAYS) {
        return Err(BoostError::Validation(format!(
            "package duration must be at most {MAX_DURATION_DAYS} days"
        )));
    }
    Ok(())
}

impl NewPackage {
    pub fn validate(&self) -> Result<(), BoostError> {
        validate_terms(Some(&self.name), Some(self.price), Some(self.duration_days))
    }
}

impl PackageUpdate {
    pub fn validate(&self) -> Result<(), BoostError> {
        validate_terms(self.name.as_deref(), self.price, self.duration_days)
    }

    /// `true` when the update changes what a buyer pays for.
    ///
    /// Price, duration and features are frozen once a boost references the
    /// package; name and visibility remain editable.
    pub fn changes_terms(&self, current: &BoostPackage) -> bool {
        self.price.is_some_and(|p| p != current.price)
            || self.duration_days.is_some_and(|d| d != current.duration_days)
            || self.features.as_ref().is_some_and(|f| f != &current.features)
    }

    pub fn apply(self, mut package: BoostPackage, now: DateTime<Utc>) -> BoostPackage {
        if let Some(name) = self.name {
            package.name = name.trim().to_string();
        }
        if let Some(price) = self.price {
            package.price = price;
        }
        if let Some(duration_days) = self.duration_days {
            package.duration_days = duration_days;
        }
        if let Some(features) = self.features {
            package.features = features;
        }
        if let Some(active) = self.active {
            package.active = active;
        }
        package.updated_at = now;
        package
    }
}
