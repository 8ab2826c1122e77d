//! Boost lifecycle engine.
//!
//! Drives boosts through `pending -> active -> expired` with the side exit
//! `pending|active -> cancelled`. Each status change goes through the
//! [`BoostStatus::transition`] table first and is then written with a
//! conditional update, so duplicate gateway callbacks, double clicks and
//! overlapping sweeps settle on exactly one winner.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    boost::{activation_window, Boost, BoostEvent, BoostStatus, BoostStatusView},
    caller::{Caller, SYSTEM_ACTOR},
    catalog::PackageCatalog,
    clock::Clock,
    error::{BoostError, BoostResult},
    gateway::{PaymentGateway, PaymentIntent},
    ids,
    ledger::{BoostFilter, BoostSummary, CreateOutcome, Ledger, NewBoost, NewPayment},
    listing::{Listing, ListingCategory},
    package::BoostPackage,
    payment::{BoostPurchaseMetadata, Payment, PaymentMetadata, PaymentStatus},
    visibility::{self, Visibility},
};

const OPEN_PAYMENT: &[PaymentStatus] = &[PaymentStatus::Pending, PaymentStatus::Processing];

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub currency: String,
    pub payment_ttl: Duration,
    pub callback_url: String,
    /// Maximum rows a single sweep pass examines.
    pub sweep_batch_size: i64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            currency: "XOF".to_string(),
            payment_ttl: Duration::minutes(30),
            callback_url: "http://localhost:3000/api/payments/callback".to_string(),
            sweep_batch_size: 500,
        }
    }
}

/// Returned by `purchase` and `renew`: the caller redirects the buyer to
/// `payment_url`.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseReceipt {
    pub boost: Boost,
    pub payment: Payment,
    pub payment_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallbackOutcome {
    Activated { boost: Boost },
    /// The payment already reached a final status earlier.
    AlreadyProcessed { payment_status: PaymentStatus },
    /// The gateway has not settled the transaction yet.
    Pending { payment_status: PaymentStatus },
    PaymentFailed { boost_cancelled: bool },
    /// Completed payment whose purpose is not a boost.
    Completed,
}

pub struct BoostEngine {
    ledger: Arc<dyn Ledger>,
    catalog: Arc<PackageCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
}

impl BoostEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        catalog: Arc<PackageCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            ledger,
            catalog,
            gateway,
            clock,
            settings,
        }
    }

    pub fn catalog(&self) -> &Arc<PackageCatalog> {
        &self.catalog
    }

    /// Start a boost purchase for `listing_id`.
    ///
    /// Only the listing owner may buy. The payment and the pending boost are
    /// written together; a listing that already holds a pending or active
    /// boost yields [`BoostError::Conflict`] and nothing is written.
    pub async fn purchase(
        &self,
        listing_id: &str,
        package_id: &str,
        caller: &Caller,
    ) -> BoostResult<PurchaseReceipt> {
        let package = self.purchasable_package(package_id).await?;
        let owner = self.listing_owner(listing_id).await?;
        if owner != caller.user_id {
            return Err(BoostError::Authorization(
                "only the listing owner can boost this listing".to_string(),
            ));
        }
        self.open_purchase(listing_id, &package, &owner, None).await
    }

    /// Activate a pending boost after its payment completed.
    ///
    /// Called from the gateway callback path only. Repeated calls on a boost
    /// that is already active return it unchanged.
    pub async fn confirm_activation(&self, boost_id: &str) -> BoostResult<Boost> {
        let boost = self.load_boost(boost_id).await?;
        let payment = self
            .ledger
            .get_payment(&boost.payment_id)
            .await?
            .ok_or_else(|| BoostError::not_found("payment", &boost.payment_id))?;

        if payment.status != PaymentStatus::Completed {
            return Err(BoostError::Precondition(format!(
                "payment {} is {}; boost {} cannot be activated",
                payment.id, payment.status, boost.id
            )));
        }

        if boost.status == BoostStatus::Active {
            debug!(boost_id, "Boost already active; activation is a no-op");
            return Ok(boost);
        }
        boost.status.transition(BoostEvent::PaymentCompleted)?;

        let package = self.catalog.get_package(&boost.package_id).await?;
        let now = self.clock.now();
        let (start, end) = activation_window(now, package.duration_days)?;

        let applied = self
            .ledger
            .activate_if_pending(&boost.id, start, end, now)
            .await?;
        let current = self.load_boost(boost_id).await?;

        if applied {
            info!(
                boost_id,
                listing_id = %current.listing_id,
                payment_id = %payment.id,
                end_date = %end,
                "Boost activated"
            );
            return Ok(current);
        }
        match current.status {
            BoostStatus::Active => {
                debug!(boost_id, "Concurrent activation already applied");
                Ok(current)
            }
            other => Err(BoostError::InvalidState(format!(
                "cannot activate a boost that is {other}"
            ))),
        }
    }

    /// Renew a boost by opening a brand-new purchase for the same listing
    /// and package. The renewed boost is left untouched.
    pub async fn renew(&self, boost_id: &str, caller: &Caller) -> BoostResult<PurchaseReceipt> {
        let boost = self.load_boost(boost_id).await?;
        let owner = self.listing_owner(&boost.listing_id).await?;
        caller.require_owner_or_admin(&owner)?;

        if !boost.status.can_renew() {
            return Err(BoostError::InvalidState(format!(
                "cannot renew a boost that is {}",
                boost.status
            )));
        }

        let package = self.purchasable_package(&boost.package_id).await?;
        let receipt = self
            .open_purchase(&boost.listing_id, &package, &owner, Some(&boost.id))
            .await?;
        info!(
            renewed_from = %boost.id,
            boost_id = %receipt.boost.id,
            by = %caller.user_id,
            "Boost renewal opened"
        );
        Ok(receipt)
    }

    /// Cancel a pending or active boost. No refund is issued.
    pub async fn cancel(&self, boost_id: &str, caller: &Caller) -> BoostResult<Boost> {
        let boost = self.load_boost(boost_id).await?;
        caller.require_owner_or_admin(&boost.user_id)?;
        boost.status.transition(BoostEvent::Cancel)?;

        let now = self.clock.now();
        let applied = self
            .ledger
            .cancel_if_open(&boost.id, &caller.user_id, now)
            .await?;
        let current = self.load_boost(boost_id).await?;
        if !applied {
            return Err(BoostError::InvalidState(format!(
                "cannot cancel a boost that is {}",
                current.status
            )));
        }

        info!(
            boost_id,
            listing_id = %current.listing_id,
            by = %caller.user_id,
            admin = caller.is_admin(),
            "Boost cancelled"
        );
        Ok(current)
    }

    /// Sweep: expire active boosts whose end date has passed.
    ///
    /// Rows are independent; a failing row is logged and skipped. Safe to run
    /// concurrently with itself and with `cancel`.
    pub async fn expire_due_boosts(&self) -> BoostResult<usize> {
        let now = self.clock.now();
        let due = self
            .ledger
            .list_due_boosts(now, self.settings.sweep_batch_size)
            .await?;

        let mut expired = 0usize;
        for boost in due {
            if let Err(err) = boost.status.transition(BoostEvent::EndDatePassed) {
                warn!(boost_id = %boost.id, error = %err, "Skipping boost in expiry sweep");
                continue;
            }
            match self.ledger.expire_if_due(&boost.id, now).await {
                Ok(true) => {
                    expired += 1;
                    info!(boost_id = %boost.id, listing_id = %boost.listing_id, "Boost expired");
                }
                Ok(false) => {
                    debug!(boost_id = %boost.id, "Boost changed status before expiry; skipped");
                }
                Err(err) => {
                    error!(boost_id = %boost.id, error = %err, "Failed to expire boost");
                }
            }
        }
        Ok(expired)
    }

    /// Sweep: fail open payments past their expiry and cancel the pending
    /// boosts they were funding, so a late callback can never activate them.
    pub async fn fail_stale_payments(&self) -> BoostResult<usize> {
        let now = self.clock.now();
        let stale = self
            .ledger
            .list_stale_payments(now, self.settings.sweep_batch_size)
            .await?;

        let mut failed = 0usize;
        for payment in stale {
            match self
                .ledger
                .advance_payment_status(&payment.id, OPEN_PAYMENT, PaymentStatus::Failed, now)
                .await
            {
                Ok(true) => {
                    failed += 1;
                    info!(payment_id = %payment.id, "Stale payment marked failed");
                    self.cancel_funded_boost(&payment).await;
                }
                Ok(false) => {
                    debug!(payment_id = %payment.id, "Payment settled before stale sweep");
                }
                Err(err) => {
                    error!(payment_id = %payment.id, error = %err, "Failed to expire payment");
                }
            }
        }
        Ok(failed)
    }

    /// Settle a payment reported by the gateway callback.
    ///
    /// The reported status is only a hint: the gateway is asked again and
    /// its answer is applied with conditional updates. Duplicate deliveries
    /// are no-ops.
    pub async fn handle_gateway_callback(
        &self,
        transaction_id: &str,
        reported_status: Option<&str>,
    ) -> BoostResult<CallbackOutcome> {
        let payment = self
            .ledger
            .find_payment_by_transaction(transaction_id)
            .await?
            .ok_or_else(|| BoostError::not_found("transaction", transaction_id))?;

        if payment.status.is_terminal() {
            if payment.status == PaymentStatus::Completed {
                if let Some(boost_id) = payment.metadata.boost_id() {
                    // Re-drive activation in case an earlier delivery stopped
                    // between the payment update and the boost update.
                    if let Err(err) = self.confirm_activation(boost_id).await {
                        debug!(transaction_id, boost_id, error = %err, "Boost not activatable on repeated callback");
                    }
                }
            }
            return Ok(CallbackOutcome::AlreadyProcessed {
                payment_status: payment.status,
            });
        }

        let verification = self
            .gateway
            .verify_payment(transaction_id)
            .await
            .map_err(|e| BoostError::Gateway(e.to_string()))?;

        if let Some(reported) = reported_status.and_then(PaymentStatus::from_gateway) {
            if reported != verification.status {
                warn!(
                    transaction_id,
                    reported = %reported,
                    verified = %verification.status,
                    "Callback status disagrees with gateway verification"
                );
            }
        }

        if let Some(amount) = verification.amount {
            if amount != payment.amount {
                error!(
                    transaction_id,
                    expected = payment.amount,
                    received = amount,
                    "Payment amount mismatch"
                );
                return Err(BoostError::Precondition(format!(
                    "transaction {transaction_id} amount {amount} does not match payment amount {}",
                    payment.amount
                )));
            }
        }

        let now = self.clock.now();
        let settling = matches!(
            verification.status,
            PaymentStatus::Processing | PaymentStatus::Completed
        );
        if settling && payment.is_stale_at(now) {
            // The checkout window closed before the sweep reached this row.
            let moved = self
                .ledger
                .advance_payment_status(&payment.id, OPEN_PAYMENT, PaymentStatus::Failed, now)
                .await?;
            if !moved {
                return Ok(CallbackOutcome::AlreadyProcessed {
                    payment_status: self.payment_status(&payment.id).await?,
                });
            }
            warn!(
                transaction_id,
                payment_id = %payment.id,
                verified = %verification.status,
                expires_at = %payment.expires_at,
                "Payment settled after its checkout window; marked failed"
            );
            let boost_cancelled = self.cancel_funded_boost(&payment).await;
            return Ok(CallbackOutcome::PaymentFailed { boost_cancelled });
        }

        match verification.status {
            PaymentStatus::Pending => Ok(CallbackOutcome::Pending {
                payment_status: payment.status,
            }),
            PaymentStatus::Processing => {
                self.ledger
                    .advance_payment_status(
                        &payment.id,
                        &[PaymentStatus::Pending],
                        PaymentStatus::Processing,
                        now,
                    )
                    .await?;
                Ok(CallbackOutcome::Pending {
                    payment_status: PaymentStatus::Processing,
                })
            }
            PaymentStatus::Failed => {
                let moved = self
                    .ledger
                    .advance_payment_status(&payment.id, OPEN_PAYMENT, PaymentStatus::Failed, now)
                    .await?;
                if !moved {
                    return Ok(CallbackOutcome::AlreadyProcessed {
                        payment_status: self.payment_status(&payment.id).await?,
                    });
                }
                warn!(transaction_id, payment_id = %payment.id, "Payment failed at gateway");
                let boost_cancelled = self.cancel_funded_boost(&payment).await;
                Ok(CallbackOutcome::PaymentFailed { boost_cancelled })
            }
            PaymentStatus::Completed => {
                let moved = self
                    .ledger
                    .advance_payment_status(
                        &payment.id,
                        OPEN_PAYMENT,
                        PaymentStatus::Completed,
                        now,
                    )
                    .await?;
                if !moved {
                    let current = self.payment_status(&payment.id).await?;
                    if current != PaymentStatus::Completed {
                        return Ok(CallbackOutcome::AlreadyProcessed {
                            payment_status: current,
                        });
                    }
                }
                info!(transaction_id, payment_id = %payment.id, "Payment completed");

                let Some(boost_id) = payment.metadata.boost_id() else {
                    return Ok(CallbackOutcome::Completed);
                };
                match self.confirm_activation(boost_id).await {
                    Ok(boost) => Ok(CallbackOutcome::Activated { boost }),
                    Err(err) => {
                        error!(
                            transaction_id,
                            boost_id,
                            error = %err,
                            "Boost activation failed after completed payment"
                        );
                        Err(err)
                    }
                }
            }
        }
    }

    /// Current boost state of a listing. Pure read.
    pub async fn get_status(&self, listing_id: &str) -> BoostResult<BoostStatusView> {
        let current = match self.ledger.find_active_boost(listing_id).await? {
            Some(active) => Some(active),
            None => self.ledger.find_open_boost(listing_id).await?,
        };
        Ok(self.status_view(listing_id, current))
    }

    /// Ranking inputs for a set of listings, highest boost first.
    pub async fn project_visibility(&self, listing_ids: &[String]) -> BoostResult<Vec<Visibility>> {
        let open = self.ledger.open_boosts_for_listings(listing_ids).await?;
        let mut by_listing: HashMap<String, Boost> = HashMap::new();
        for boost in open {
            let prefer = by_listing
                .get(&boost.listing_id)
                .map_or(true, |seen| seen.status != BoostStatus::Active);
            if prefer {
                by_listing.insert(boost.listing_id.clone(), boost);
            }
        }

        let now = self.clock.now();
        let mut projected = Vec::with_capacity(listing_ids.len());
        for listing_id in listing_ids {
            let view = self.status_view(listing_id, by_listing.get(listing_id).cloned());
            let package = match &view.current_boost {
                Some(boost) if view.has_active_boost => {
                    Some(self.catalog.get_package(&boost.package_id).await?)
                }
                _ => None,
            };
            projected.push(visibility::project(&view, package.as_ref(), now));
        }
        visibility::rank(&mut projected);
        Ok(projected)
    }

    /// Mirror a marketplace listing so its owner can boost it. Re-registering
    /// keeps the original `created_at`.
    pub async fn register_listing(
        &self,
        caller: &Caller,
        listing_id: &str,
        owner: &str,
        title: &str,
        category: ListingCategory,
    ) -> BoostResult<Listing> {
        caller.require_admin()?;
        if listing_id.trim().is_empty() || owner.trim().is_empty() {
            return Err(BoostError::Validation(
                "listing id and owner are required".to_string(),
            ));
        }
        let listing = Listing {
            id: listing_id.trim().to_string(),
            user_id: owner.trim().to_string(),
            title: title.trim().to_string(),
            category,
            created_at: self.clock.now(),
        };
        self.ledger.upsert_listing(&listing).await?;
        let stored = self
            .ledger
            .get_listing(&listing.id)
            .await?
            .ok_or_else(|| BoostError::not_found("listing", &listing.id))?;
        info!(listing_id = %stored.id, owner = %stored.user_id, "Listing registered");
        Ok(stored)
    }

    /// Administrative search over all boosts.
    pub async fn list_boosts(
        &self,
        caller: &Caller,
        filter: &BoostFilter,
    ) -> BoostResult<(Vec<BoostSummary>, i64)> {
        caller.require_admin()?;
        Ok(self.ledger.list_boosts(filter).await?)
    }

    pub async fn get_boost(&self, boost_id: &str, caller: &Caller) -> BoostResult<Boost> {
        let boost = self.load_boost(boost_id).await?;
        caller.require_owner_or_admin(&boost.user_id)?;
        Ok(boost)
    }

    async fn open_purchase(
        &self,
        listing_id: &str,
        package: &BoostPackage,
        owner: &str,
        renewed_from: Option<&str>,
    ) -> BoostResult<PurchaseReceipt> {
        let now = self.clock.now();
        let boost_id = ids::boost_id();
        let payment_id = ids::payment_id();
        let metadata = PaymentMetadata::BoostPurchase(BoostPurchaseMetadata {
            boost_id: boost_id.clone(),
            listing_id: listing_id.to_string(),
            package_id: package.id.clone(),
            package_name: package.name.clone(),
        });

        let outcome = self
            .ledger
            .create_purchase(
                NewBoost {
                    id: boost_id.clone(),
                    listing_id: listing_id.to_string(),
                    package_id: package.id.clone(),
                    user_id: owner.to_string(),
                    payment_id: payment_id.clone(),
                    renewed_from: renewed_from.map(str::to_string),
                    created_at: now,
                },
                NewPayment {
                    id: payment_id.clone(),
                    user_id: owner.to_string(),
                    amount: package.price,
                    currency: self.settings.currency.clone(),
                    payment_method: self.gateway.method(),
                    metadata: metadata.clone(),
                    expires_at: now + self.settings.payment_ttl,
                    created_at: now,
                },
            )
            .await?;

        let (boost, mut payment) = match outcome {
            CreateOutcome::Created { boost, payment } => (boost, payment),
            CreateOutcome::Conflict { existing_boost_id } => {
                warn!(listing_id, existing_boost_id = %existing_boost_id, "Purchase rejected: listing already boosted");
                return Err(BoostError::Conflict {
                    listing_id: listing_id.to_string(),
                });
            }
        };

        let intent = PaymentIntent {
            payment_id: payment_id.clone(),
            amount: package.price,
            currency: self.settings.currency.clone(),
            description: format!("{} - annonce {}", package.name, listing_id),
            callback_url: self.settings.callback_url.clone(),
            metadata,
        };

        let checkout = match self.gateway.initialize_payment(&intent).await {
            Ok(checkout) => checkout,
            Err(err) => {
                error!(payment_id = %payment_id, boost_id = %boost_id, error = %err, "Payment initialization failed");
                self.abandon_purchase(&payment_id, &boost_id).await;
                return Err(BoostError::Gateway(err.to_string()));
            }
        };

        if let Err(err) = self
            .ledger
            .set_transaction_id(&payment_id, &checkout.transaction_id, now)
            .await
        {
            error!(
                payment_id = %payment_id,
                transaction_id = %checkout.transaction_id,
                error = %err,
                "Failed to record transaction id"
            );
            self.abandon_purchase(&payment_id, &boost_id).await;
            return Err(BoostError::Storage(err));
        }
        payment.transaction_id = Some(checkout.transaction_id.clone());

        info!(
            boost_id = %boost.id,
            listing_id,
            payment_id = %payment.id,
            transaction_id = %checkout.transaction_id,
            amount = payment.amount,
            "Boost purchase opened"
        );
        Ok(PurchaseReceipt {
            boost,
            payment,
            payment_url: checkout.payment_url,
        })
    }

    /// Release the listing slot after a checkout could not be opened or
    /// recorded.
    async fn abandon_purchase(&self, payment_id: &str, boost_id: &str) {
        let now = self.clock.now();
        if let Err(err) = self
            .ledger
            .advance_payment_status(payment_id, OPEN_PAYMENT, PaymentStatus::Failed, now)
            .await
        {
            error!(payment_id, error = %err, "Failed to mark abandoned payment failed");
        }
        if let Err(err) = self.ledger.cancel_if_pending(boost_id, SYSTEM_ACTOR, now).await {
            error!(boost_id, error = %err, "Failed to cancel abandoned boost");
        }
    }

    /// Cancel the pending boost funded by a failed payment. Returns whether a
    /// boost was cancelled.
    async fn cancel_funded_boost(&self, payment: &Payment) -> bool {
        let Some(boost_id) = payment.metadata.boost_id() else {
            return false;
        };
        match self
            .ledger
            .cancel_if_pending(boost_id, SYSTEM_ACTOR, self.clock.now())
            .await
        {
            Ok(cancelled) => {
                if cancelled {
                    info!(boost_id, payment_id = %payment.id, "Pending boost cancelled after payment failure");
                }
                cancelled
            }
            Err(err) => {
                error!(boost_id, payment_id = %payment.id, error = %err, "Failed to cancel boost of failed payment");
                false
            }
        }
    }

    async fn payment_status(&self, payment_id: &str) -> BoostResult<PaymentStatus> {
        let current = self
            .ledger
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| BoostError::not_found("payment", payment_id))?;
        Ok(current.status)
    }

    fn status_view(&self, listing_id: &str, current: Option<Boost>) -> BoostStatusView {
        let now = self.clock.now();
        BoostStatusView {
            listing_id: listing_id.to_string(),
            has_active_boost: current.as_ref().is_some_and(|b| b.is_live_at(now)),
            current_boost: current,
        }
    }

    async fn purchasable_package(&self, package_id: &str) -> BoostResult<BoostPackage> {
        let package = self.catalog.get_package(package_id).await?;
        if !package.active {
            return Err(BoostError::Validation(format!(
                "package {} is no longer offered",
                package.name
            )));
        }
        Ok(package)
    }

    async fn listing_owner(&self, listing_id: &str) -> BoostResult<String> {
        self.ledger
            .get_listing_owner(listing_id)
            .await?
            .ok_or_else(|| BoostError::not_found("listing", listing_id))
    }

    async fn load_boost(&self, boost_id: &str) -> BoostResult<Boost> {
        self.ledger
            .get_boost(boost_id)
            .await?
            .ok_or_else(|| BoostError::not_found("boost", boost_id))
    }
}
