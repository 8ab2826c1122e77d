use std::fmt;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(anyhow!("invalid payment status: {other}")),
        }
    }

    /// Map a status string reported by a payment gateway.
    ///
    /// Accepts FedaPay's vocabulary as well as the sandbox's; unknown values
    /// map to `None` and are left for the next verification.
    pub fn from_gateway(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "approved" | "transferred" | "completed" | "success" | "succeeded" => {
                Some(Self::Completed)
            }
            "declined" | "canceled" | "cancelled" | "failed" | "expired" | "refunded" => {
                Some(Self::Failed)
            }
            "processing" => Some(Self::Processing),
            "pending" | "created" => Some(Self::Pending),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    /// Payment statuses only move forward.
    pub fn can_advance_to(self, next: PaymentStatus) -> bool {
        match (self, next) {
            (PaymentStatus::Pending, PaymentStatus::Processing) => true,
            (PaymentStatus::Pending | PaymentStatus::Processing, to) => to.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Fedapay,
    Sandbox,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Fedapay => "fedapay",
            PaymentMethod::Sandbox => "sandbox",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "fedapay" => Ok(Self::Fedapay),
            "sandbox" => Ok(Self::Sandbox),
            other => Err(anyhow!("invalid payment method: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostPurchaseMetadata {
    pub boost_id: String,
    pub listing_id: String,
    pub package_id: String,
    pub package_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingFeeMetadata {
    pub listing_id: String,
}

/// What a payment pays for.
///
/// Stored as JSON next to the payment row and validated whenever it crosses
/// the storage or gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "purpose", rename_all = "snake_case")]
pub enum PaymentMetadata {
    BoostPurchase(BoostPurchaseMetadata),
    ListingFee(ListingFeeMetadata),
}

impl PaymentMetadata {
    pub fn boost_id(&self) -> Option<&str> {
        match self {
            PaymentMetadata::BoostPurchase(meta) => Some(meta.boost_id.as_str()),
            PaymentMetadata::ListingFee(_) => None,
        }
    }

    pub fn listing_id(&self) -> &str {
        match self {
            PaymentMetadata::BoostPurchase(meta) => &meta.listing_id,
            PaymentMetadata::ListingFee(meta) => &meta.listing_id,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let metadata: PaymentMetadata = serde_json::from_str(raw)
            .map_err(|e| anyhow!("malformed payment metadata: {e}"))?;
        metadata.validate()?;
        Ok(metadata)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            PaymentMetadata::BoostPurchase(meta) => {
                if meta.boost_id.is_empty() || meta.listing_id.is_empty() {
                    return Err(anyhow!("boost purchase metadata requires boost_id and listing_id"));
                }
                if meta.package_id.is_empty() {
                    return Err(anyhow!("boost purchase metadata requires package_id"));
                }
            }
            PaymentMetadata::ListingFee(meta) => {
                if meta.listing_id.is_empty() {
                    return Err(anyhow!("listing fee metadata requires listing_id"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub metadata: PaymentMetadata,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boost_metadata() -> PaymentMetadata {
        PaymentMetadata::BoostPurchase(BoostPurchaseMetadata {
            boost_id: "bst_1".to_string(),
            listing_id: "lst_1".to_string(),
            package_id: "pkg_1".to_string(),
            package_name: "Boost 7 jours".to_string(),
        })
    }

    #[test]
    fn metadata_is_tagged_by_purpose() {
        let json = boost_metadata().to_json().expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("value");
        assert_eq!(value["purpose"], "boost_purchase");
        assert_eq!(value["boost_id"], "bst_1");
        assert_eq!(PaymentMetadata::from_json(&json).expect("parse"), boost_metadata());
    }

    #[test]
    fn untagged_or_incomplete_metadata_is_rejected() {
        assert!(PaymentMetadata::from_json(r#"{"boost_id":"bst_1"}"#).is_err());
        assert!(PaymentMetadata::from_json(
            r#"{"purpose":"boost_purchase","boost_id":"","listing_id":"l","package_id":"p","package_name":"n"}"#
        )
        .is_err());
    }

    #[test]
    fn listing_fee_has_no_boost() {
        let meta = PaymentMetadata::ListingFee(ListingFeeMetadata {
            listing_id: "lst_9".to_string(),
        });
        assert_eq!(meta.boost_id(), None);
        assert_eq!(meta.listing_id(), "lst_9");
    }

    #[test]
    fn statuses_only_move_forward() {
        use PaymentStatus::*;
        assert!(Pending.can_advance_to(Processing));
        assert!(Pending.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Failed));
        assert!(!Processing.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Completed));
    }

    #[test]
    fn gateway_vocabulary_is_normalised() {
        assert_eq!(
            PaymentStatus::from_gateway("approved"),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            PaymentStatus::from_gateway("SUCCESS"),
            Some(PaymentStatus::Completed)
        );
        assert_eq!(
            PaymentStatus::from_gateway("declined"),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(PaymentStatus::from_gateway("mystery"), None);
    }

    #[test]
    fn only_wired_gateways_are_valid_methods() {
        for method in [PaymentMethod::Fedapay, PaymentMethod::Sandbox] {
            assert_eq!(PaymentMethod::parse(method.as_str()).expect("parse"), method);
        }
        assert!(PaymentMethod::parse("kkiapay").is_err());
    }
}
