use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, SubsecRound, Utc};

use benome_core::{
    boost::BoostStatus,
    caller::Caller,
    catalog::PackageCatalog,
    clock::{Clock, ManualClock},
    engine::{BoostEngine, CallbackOutcome, EngineSettings, PurchaseReceipt},
    gateway::{
        GatewayCheckout, GatewayVerification, PaymentGateway, PaymentIntent, SandboxGateway,
    },
    ledger::{BoostFilter, BoostLedger, ListingDirectory, PaymentStore},
    listing::{Listing, ListingCategory},
    package::{BadgeKind, PackageUpdate},
    payment::{PaymentMethod, PaymentStatus},
    BoostError,
};
use benome_duckdb::DuckDbBackend;

struct Harness {
    db: Arc<DuckDbBackend>,
    clock: Arc<ManualClock>,
    gateway: Arc<SandboxGateway>,
    engine: Arc<BoostEngine>,
}

async fn harness() -> Harness {
    let db = Arc::new(DuckDbBackend::open_in_memory().expect("in-memory DuckDB"));
    let clock = Arc::new(ManualClock::new(Utc::now().trunc_subsecs(6)));
    let gateway = Arc::new(SandboxGateway::new("http://localhost:3000"));
    let catalog = Arc::new(PackageCatalog::new(
        db.clone(),
        clock.clone(),
        StdDuration::from_secs(300),
    ));
    let engine = Arc::new(BoostEngine::new(
        db.clone(),
        catalog,
        gateway.clone(),
        clock.clone(),
        EngineSettings::default(),
    ));

    for (id, owner, title) in [
        ("lst_villa", "usr_ama", "Villa 4 pièces à Cotonou"),
        ("lst_corolla", "usr_kofi", "Toyota Corolla 2015"),
    ] {
        db.upsert_listing(&Listing {
            id: id.to_string(),
            user_id: owner.to_string(),
            title: title.to_string(),
            category: ListingCategory::RealEstate,
            created_at: clock.now(),
        })
        .await
        .expect("seed listing");
    }

    Harness {
        db,
        clock,
        gateway,
        engine,
    }
}

fn transaction_id(receipt: &PurchaseReceipt) -> String {
    receipt
        .payment
        .transaction_id
        .clone()
        .expect("transaction id attached")
}

/// Purchase and settle a boost, returning the receipt.
async fn buy_and_pay(h: &Harness, listing_id: &str, package_id: &str, owner: &str) -> PurchaseReceipt {
    let receipt = h
        .engine
        .purchase(listing_id, package_id, &Caller::user(owner))
        .await
        .expect("purchase");
    let tx = transaction_id(&receipt);
    h.gateway
        .settle(&tx, PaymentStatus::Completed)
        .await
        .expect("settle");
    let outcome = h
        .engine
        .handle_gateway_callback(&tx, Some("approved"))
        .await
        .expect("callback");
    assert!(matches!(outcome, CallbackOutcome::Activated { .. }));
    receipt
}

#[tokio::test]
async fn purchase_opens_pending_boost_and_checkout() {
    let h = harness().await;
    let receipt = h
        .engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase");

    assert_eq!(receipt.boost.status, BoostStatus::Pending);
    assert_eq!(receipt.payment.amount, 5000);
    assert_eq!(receipt.payment.currency, "XOF");
    assert!(receipt.payment_url.contains("/sandbox/checkout/"));

    let view = h.engine.get_status("lst_villa").await.expect("status");
    assert!(!view.has_active_boost);
    assert_eq!(
        view.current_boost.map(|b| b.id),
        Some(receipt.boost.id.clone())
    );
}

#[tokio::test]
async fn only_the_owner_can_purchase() {
    let h = harness().await;
    let err = h
        .engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_kofi"))
        .await
        .expect_err("not owner");
    assert!(matches!(err, BoostError::Authorization(_)));

    let err = h
        .engine
        .purchase("lst_missing", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect_err("unknown listing");
    assert!(matches!(err, BoostError::NotFound(_)));
}

#[tokio::test]
async fn completed_payment_activates_for_package_duration() {
    let h = harness().await;
    let receipt = buy_and_pay(&h, "lst_villa", "pkg_boost7", "usr_ama").await;

    let boost = h
        .db
        .get_boost(&receipt.boost.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(boost.status, BoostStatus::Active);
    let start = boost.start_date.expect("start");
    assert_eq!(boost.end_date, Some(start + Duration::days(7)));

    let payment = h
        .db
        .get_payment(&receipt.payment.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert!(payment.completed_at.is_some());

    let view = h.engine.get_status("lst_villa").await.expect("status");
    assert!(view.has_active_boost);
}

#[tokio::test]
async fn duplicate_callbacks_do_not_move_the_window() {
    let h = harness().await;
    let receipt = buy_and_pay(&h, "lst_villa", "pkg_boost7", "usr_ama").await;
    let first = h
        .db
        .get_boost(&receipt.boost.id)
        .await
        .expect("get")
        .expect("row");

    h.clock.advance(Duration::hours(2));
    let tx = transaction_id(&receipt);
    for _ in 0..3 {
        let outcome = h
            .engine
            .handle_gateway_callback(&tx, Some("approved"))
            .await
            .expect("callback");
        assert!(matches!(
            outcome,
            CallbackOutcome::AlreadyProcessed {
                payment_status: PaymentStatus::Completed
            }
        ));
    }

    let again = h
        .engine
        .confirm_activation(&receipt.boost.id)
        .await
        .expect("idempotent activation");
    assert_eq!(again.start_date, first.start_date);
    assert_eq!(again.end_date, first.end_date);
}

#[tokio::test]
async fn activation_requires_completed_payment() {
    let h = harness().await;
    let receipt = h
        .engine
        .purchase("lst_villa", "pkg_boost3", &Caller::user("usr_ama"))
        .await
        .expect("purchase");
    let err = h
        .engine
        .confirm_activation(&receipt.boost.id)
        .await
        .expect_err("unpaid");
    assert!(matches!(err, BoostError::Precondition(_)));

    let outcome = h
        .engine
        .handle_gateway_callback(&transaction_id(&receipt), Some("pending"))
        .await
        .expect("callback");
    assert!(matches!(outcome, CallbackOutcome::Pending { .. }));
}

#[tokio::test]
async fn concurrent_purchases_leave_one_open_boost() {
    let h = harness().await;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move {
            engine
                .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
                .await
        }));
    }

    let mut created = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.expect("join") {
            Ok(_) => created += 1,
            Err(BoostError::Conflict { listing_id }) => {
                assert_eq!(listing_id, "lst_villa");
                conflicts += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(conflicts, 7);

    let open = h
        .db
        .open_boosts_for_listings(&["lst_villa".to_string()])
        .await
        .expect("open");
    assert_eq!(open.len(), 1);
}

#[tokio::test]
async fn active_boost_blocks_a_second_purchase() {
    let h = harness().await;
    buy_and_pay(&h, "lst_villa", "pkg_boost7", "usr_ama").await;
    let err = h
        .engine
        .purchase("lst_villa", "pkg_boost30", &Caller::user("usr_ama"))
        .await
        .expect_err("already boosted");
    assert!(matches!(err, BoostError::Conflict { .. }));
}

#[tokio::test]
async fn seven_day_boost_expires_once() {
    let h = harness().await;
    let receipt = buy_and_pay(&h, "lst_villa", "pkg_boost7", "usr_ama").await;

    h.clock.advance(Duration::days(6));
    assert_eq!(h.engine.expire_due_boosts().await.expect("sweep"), 0);
    assert!(h.engine.get_status("lst_villa").await.expect("status").has_active_boost);

    h.clock.advance(Duration::days(1) + Duration::seconds(1));
    assert!(!h.engine.get_status("lst_villa").await.expect("status").has_active_boost);

    let (first, second) = tokio::join!(h.engine.expire_due_boosts(), h.engine.expire_due_boosts());
    assert_eq!(first.expect("sweep") + second.expect("sweep"), 1);
    assert_eq!(h.engine.expire_due_boosts().await.expect("sweep"), 0);

    let boost = h
        .db
        .get_boost(&receipt.boost.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(boost.status, BoostStatus::Expired);

    let view = h.engine.get_status("lst_villa").await.expect("status");
    assert!(!view.has_active_boost);
    assert!(view.current_boost.is_none());
}

#[tokio::test]
async fn cancel_rules() {
    let h = harness().await;
    let receipt = h
        .engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase");

    let err = h
        .engine
        .cancel(&receipt.boost.id, &Caller::user("usr_kofi"))
        .await
        .expect_err("stranger");
    assert!(matches!(err, BoostError::Authorization(_)));

    let cancelled = h
        .engine
        .cancel(&receipt.boost.id, &Caller::admin("usr_admin"))
        .await
        .expect("admin cancel");
    assert_eq!(cancelled.status, BoostStatus::Cancelled);
    assert_eq!(cancelled.cancelled_by.as_deref(), Some("usr_admin"));

    let err = h
        .engine
        .cancel(&receipt.boost.id, &Caller::user("usr_ama"))
        .await
        .expect_err("terminal");
    assert!(matches!(err, BoostError::InvalidState(_)));

    h.gateway
        .settle(&transaction_id(&receipt), PaymentStatus::Completed)
        .await
        .expect("settle");
    let late = h
        .engine
        .handle_gateway_callback(&transaction_id(&receipt), None)
        .await;
    assert!(matches!(late, Err(BoostError::InvalidState(_))));
    let boost = h
        .db
        .get_boost(&receipt.boost.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(boost.status, BoostStatus::Cancelled);
}

#[tokio::test]
async fn renewing_an_expired_boost_opens_a_new_purchase() {
    let h = harness().await;
    let first = buy_and_pay(&h, "lst_villa", "pkg_boost3", "usr_ama").await;

    let err = h
        .engine
        .renew(&first.boost.id, &Caller::user("usr_ama"))
        .await
        .expect_err("still active");
    assert!(matches!(err, BoostError::Conflict { .. }));

    h.clock.advance(Duration::days(4));
    h.engine.expire_due_boosts().await.expect("sweep");

    let renewal = h
        .engine
        .renew(&first.boost.id, &Caller::user("usr_ama"))
        .await
        .expect("renew");
    assert_ne!(renewal.boost.id, first.boost.id);
    assert_eq!(renewal.boost.status, BoostStatus::Pending);
    assert_eq!(renewal.boost.renewed_from.as_deref(), Some(first.boost.id.as_str()));
    assert_eq!(renewal.payment.amount, 2000);

    let original = h
        .db
        .get_boost(&first.boost.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(original.status, BoostStatus::Expired);

    let err = h
        .engine
        .renew(&renewal.boost.id, &Caller::user("usr_ama"))
        .await
        .expect_err("pending cannot renew");
    assert!(matches!(err, BoostError::InvalidState(_)));
}

#[tokio::test]
async fn stale_payment_sweep_cancels_pending_boost() {
    let h = harness().await;
    let receipt = h
        .engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase");

    h.clock.advance(Duration::minutes(29));
    assert_eq!(h.engine.fail_stale_payments().await.expect("sweep"), 0);

    h.clock.advance(Duration::minutes(2));
    assert_eq!(h.engine.fail_stale_payments().await.expect("sweep"), 1);
    assert_eq!(h.engine.fail_stale_payments().await.expect("sweep"), 0);

    let boost = h
        .db
        .get_boost(&receipt.boost.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(boost.status, BoostStatus::Cancelled);
    assert_eq!(boost.cancelled_by.as_deref(), Some("system"));

    // A payment that clears after the sweep never revives the boost.
    let tx = transaction_id(&receipt);
    h.gateway
        .settle(&tx, PaymentStatus::Completed)
        .await
        .expect("settle");
    let outcome = h
        .engine
        .handle_gateway_callback(&tx, Some("approved"))
        .await
        .expect("callback");
    assert!(matches!(
        outcome,
        CallbackOutcome::AlreadyProcessed {
            payment_status: PaymentStatus::Failed
        }
    ));

    // The listing slot is free again.
    h.engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase after sweep");
}

#[tokio::test]
async fn failed_payment_cancels_pending_boost() {
    let h = harness().await;
    let receipt = h
        .engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase");
    let tx = transaction_id(&receipt);
    h.gateway
        .settle(&tx, PaymentStatus::Failed)
        .await
        .expect("settle");

    let outcome = h
        .engine
        .handle_gateway_callback(&tx, Some("declined"))
        .await
        .expect("callback");
    assert!(matches!(
        outcome,
        CallbackOutcome::PaymentFailed {
            boost_cancelled: true
        }
    ));
    let again = h
        .engine
        .handle_gateway_callback(&tx, Some("declined"))
        .await
        .expect("callback");
    assert!(matches!(again, CallbackOutcome::AlreadyProcessed { .. }));
}

#[tokio::test]
async fn unknown_transaction_is_not_found() {
    let h = harness().await;
    let err = h
        .engine
        .handle_gateway_callback("sbx_nope", Some("approved"))
        .await
        .expect_err("unknown");
    assert!(matches!(err, BoostError::NotFound(_)));
}

#[tokio::test]
async fn gateway_outage_releases_the_listing() {
    let h = harness().await;
    h.gateway.set_unavailable(true);
    let err = h
        .engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect_err("outage");
    assert!(matches!(err, BoostError::Gateway(_)));
    assert!(h
        .db
        .find_open_boost("lst_villa")
        .await
        .expect("find")
        .is_none());

    h.gateway.set_unavailable(false);
    h.engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase after outage");
}

#[tokio::test]
async fn referenced_package_terms_are_frozen() {
    let h = harness().await;
    h.engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase");

    let catalog = h.engine.catalog();
    let err = catalog
        .update_package(
            "pkg_boost7",
            PackageUpdate {
                price: Some(6000),
                ..PackageUpdate::default()
            },
        )
        .await
        .expect_err("frozen");
    assert!(matches!(err, BoostError::InvalidState(_)));

    let renamed = catalog
        .update_package(
            "pkg_boost7",
            PackageUpdate {
                name: Some("Boost semaine".to_string()),
                ..PackageUpdate::default()
            },
        )
        .await
        .expect("rename");
    assert_eq!(renamed.name, "Boost semaine");
    assert_eq!(renamed.price, 5000);
}

#[tokio::test]
async fn visibility_ranks_boosted_listings_first() {
    let h = harness().await;
    buy_and_pay(&h, "lst_corolla", "pkg_boost30", "usr_kofi").await;
    h.engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("pending purchase");

    let ids = vec![
        "lst_villa".to_string(),
        "lst_unknown".to_string(),
        "lst_corolla".to_string(),
    ];
    let projected = h.engine.project_visibility(&ids).await.expect("visibility");
    assert_eq!(projected.len(), 3);
    assert_eq!(projected[0].listing_id, "lst_corolla");
    assert_eq!(projected[0].rank_factor, 3.0);
    assert_eq!(projected[0].badge, BadgeKind::Vip);
    assert!(projected[0].featured);
    assert_eq!(projected[1].listing_id, "lst_villa");
    assert_eq!(projected[1].badge, BadgeKind::None);
}

#[tokio::test]
async fn completed_callback_after_checkout_window_does_not_activate() {
    let h = harness().await;
    let receipt = h
        .engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("purchase");
    let tx = transaction_id(&receipt);

    // The sweep has not run yet; the callback arrives first.
    h.clock.advance(Duration::hours(5));
    h.gateway
        .settle(&tx, PaymentStatus::Completed)
        .await
        .expect("settle");
    let outcome = h
        .engine
        .handle_gateway_callback(&tx, Some("approved"))
        .await
        .expect("callback");
    assert!(matches!(
        outcome,
        CallbackOutcome::PaymentFailed {
            boost_cancelled: true
        }
    ));

    let boost = h
        .db
        .get_boost(&receipt.boost.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(boost.status, BoostStatus::Cancelled);
    assert!(boost.start_date.is_none());
    let payment = h
        .db
        .get_payment(&receipt.payment.id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(!h.engine.get_status("lst_villa").await.expect("status").has_active_boost);

    let again = h
        .engine
        .handle_gateway_callback(&tx, Some("approved"))
        .await
        .expect("callback");
    assert!(matches!(
        again,
        CallbackOutcome::AlreadyProcessed {
            payment_status: PaymentStatus::Failed
        }
    ));
}

#[tokio::test]
async fn processing_callback_after_checkout_window_fails_the_payment() {
    let h = harness().await;
    let receipt = h
        .engine
        .purchase("lst_corolla", "pkg_boost3", &Caller::user("usr_kofi"))
        .await
        .expect("purchase");
    let tx = transaction_id(&receipt);

    h.clock.advance(Duration::minutes(31));
    h.gateway
        .settle(&tx, PaymentStatus::Processing)
        .await
        .expect("settle");
    let outcome = h
        .engine
        .handle_gateway_callback(&tx, None)
        .await
        .expect("callback");
    assert!(matches!(outcome, CallbackOutcome::PaymentFailed { .. }));
    assert!(h
        .db
        .find_open_boost("lst_corolla")
        .await
        .expect("find")
        .is_none());
}

#[tokio::test]
async fn repeated_listing_ids_project_the_same_boost() {
    let h = harness().await;
    buy_and_pay(&h, "lst_corolla", "pkg_boost30", "usr_kofi").await;

    let ids = vec!["lst_corolla".to_string(), "lst_corolla".to_string()];
    let projected = h.engine.project_visibility(&ids).await.expect("visibility");
    assert_eq!(projected.len(), 2);
    for entry in &projected {
        assert_eq!(entry.listing_id, "lst_corolla");
        assert_eq!(entry.badge, BadgeKind::Vip);
        assert_eq!(entry.rank_factor, 3.0);
    }
}

/// Hands every checkout the same gateway reference, so the second purchase
/// collides with the unique transaction id of the first.
struct ReusedReferenceGateway;

#[async_trait]
impl PaymentGateway for ReusedReferenceGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Sandbox
    }

    async fn initialize_payment(&self, _intent: &PaymentIntent) -> Result<GatewayCheckout> {
        Ok(GatewayCheckout {
            payment_url: "http://localhost:3000/sandbox/checkout/sbx_same".to_string(),
            transaction_id: "sbx_same".to_string(),
        })
    }

    async fn verify_payment(&self, _transaction_id: &str) -> Result<GatewayVerification> {
        Ok(GatewayVerification {
            status: PaymentStatus::Pending,
            amount: None,
            raw: Default::default(),
        })
    }
}

#[tokio::test]
async fn unrecorded_transaction_id_releases_the_listing() {
    let h = harness().await;
    let engine = BoostEngine::new(
        h.db.clone(),
        Arc::new(PackageCatalog::new(
            h.db.clone(),
            h.clock.clone(),
            StdDuration::from_secs(300),
        )),
        Arc::new(ReusedReferenceGateway),
        h.clock.clone(),
        EngineSettings::default(),
    );

    engine
        .purchase("lst_villa", "pkg_boost7", &Caller::user("usr_ama"))
        .await
        .expect("first purchase");
    let err = engine
        .purchase("lst_corolla", "pkg_boost7", &Caller::user("usr_kofi"))
        .await
        .expect_err("duplicate reference");
    assert!(matches!(err, BoostError::Storage(_)));

    assert!(h
        .db
        .find_open_boost("lst_corolla")
        .await
        .expect("find")
        .is_none());
    let (rows, total) = h
        .db
        .list_boosts(&BoostFilter {
            user_id: Some("usr_kofi".to_string()),
            limit: 10,
            ..BoostFilter::default()
        })
        .await
        .expect("list");
    assert_eq!(total, 1);
    let abandoned = &rows[0].boost;
    assert_eq!(abandoned.status, BoostStatus::Cancelled);
    let payment = h
        .db
        .get_payment(&abandoned.payment_id)
        .await
        .expect("get")
        .expect("row");
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert!(payment.transaction_id.is_none());
}
