//! Persistence boundary for packages, listings, payments and boosts.
//!
//! Status changes are expressed as conditional writes that report whether
//! they applied. Callers never read-modify-write a status: the storage layer
//! decides atomically, and a `false` means another writer got there first.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    boost::{Boost, BoostStatus},
    listing::Listing,
    package::BoostPackage,
    payment::{Payment, PaymentMetadata, PaymentMethod, PaymentStatus},
};

#[derive(Debug, Clone)]
pub struct NewBoost {
    pub id: String,
    pub listing_id: String,
    pub package_id: String,
    pub user_id: String,
    pub payment_id: String,
    pub renewed_from: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub metadata: PaymentMetadata,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of the conditional purchase insert.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created { boost: Boost, payment: Payment },
    /// The listing already holds a pending or active boost; nothing was written.
    Conflict { existing_boost_id: String },
}

#[derive(Debug, Clone, Default)]
pub struct BoostFilter {
    pub status: Option<BoostStatus>,
    /// Case-insensitive substring of the listing title.
    pub title: Option<String>,
    pub user_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Boost row joined with the display fields the admin surface needs.
#[derive(Debug, Clone, Serialize)]
pub struct BoostSummary {
    #[serde(flatten)]
    pub boost: Boost,
    pub listing_title: Option<String>,
    pub package_name: Option<String>,
}

#[async_trait]
pub trait PackageStore: Send + Sync + 'static {
    /// Packages ordered by ascending price, then name.
    async fn list_packages(&self, include_inactive: bool) -> Result<Vec<BoostPackage>>;
    async fn get_package(&self, id: &str) -> Result<Option<BoostPackage>>;
    async fn insert_package(&self, package: &BoostPackage) -> Result<()>;
    async fn update_package(&self, package: &BoostPackage) -> Result<bool>;
    async fn is_package_referenced(&self, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ListingDirectory: Send + Sync + 'static {
    async fn get_listing(&self, id: &str) -> Result<Option<Listing>>;
    async fn upsert_listing(&self, listing: &Listing) -> Result<()>;

    async fn get_listing_owner(&self, id: &str) -> Result<Option<String>> {
        Ok(self.get_listing(id).await?.map(|listing| listing.user_id))
    }
}

#[async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    async fn get_payment(&self, id: &str) -> Result<Option<Payment>>;
    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>>;

    /// Attach the gateway reference; only applies while none is set.
    async fn set_transaction_id(
        &self,
        payment_id: &str,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Move the payment to `to` if its current status is one of `from`.
    async fn advance_payment_status(
        &self,
        payment_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Pending or processing payments whose `expires_at` is before `now`.
    async fn list_stale_payments(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Payment>>;
}

#[async_trait]
pub trait BoostLedger: Send + Sync + 'static {
    /// Insert the payment and the pending boost in one transaction, unless the
    /// listing already has an open boost. An active boost whose end date is
    /// already behind `boost.created_at` is expired first and does not block.
    async fn create_purchase(&self, boost: NewBoost, payment: NewPayment) -> Result<CreateOutcome>;

    async fn get_boost(&self, id: &str) -> Result<Option<Boost>>;
    async fn find_active_boost(&self, listing_id: &str) -> Result<Option<Boost>>;
    /// The pending or active boost of a listing, if any.
    async fn find_open_boost(&self, listing_id: &str) -> Result<Option<Boost>>;

    /// `UPDATE ... WHERE status = 'pending'`.
    async fn activate_if_pending(
        &self,
        id: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// `UPDATE ... WHERE status IN ('pending', 'active')`.
    async fn cancel_if_open(&self, id: &str, cancelled_by: &str, now: DateTime<Utc>) -> Result<bool>;

    /// `UPDATE ... WHERE status = 'pending'`; used when the funding payment fails.
    async fn cancel_if_pending(&self, id: &str, cancelled_by: &str, now: DateTime<Utc>)
        -> Result<bool>;

    /// `UPDATE ... WHERE status = 'active' AND end_date < now`.
    async fn expire_if_due(&self, id: &str, now: DateTime<Utc>) -> Result<bool>;

    async fn list_due_boosts(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Boost>>;

    /// Filtered page of boosts, newest first, with the total match count.
    async fn list_boosts(&self, filter: &BoostFilter) -> Result<(Vec<BoostSummary>, i64)>;

    async fn open_boosts_for_listings(&self, listing_ids: &[String]) -> Result<Vec<Boost>>;
}

/// Everything the lifecycle engine needs from storage.
pub trait Ledger: PackageStore + ListingDirectory + PaymentStore + BoostLedger {}

impl<T> Ledger for T where T: PackageStore + ListingDirectory + PaymentStore + BoostLedger {}
