//! Listing visibility projection.
//!
//! Pure functions from boost state to ranking inputs; nothing here touches
//! storage.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    boost::BoostStatusView,
    package::{BadgeKind, BoostPackage},
};

pub const BASE_RANK_FACTOR: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visibility {
    pub listing_id: String,
    pub rank_factor: f64,
    pub badge: BadgeKind,
    pub featured: bool,
    pub boost_id: Option<String>,
    pub boosted_until: Option<DateTime<Utc>>,
}

impl Visibility {
    pub fn unboosted(listing_id: &str) -> Self {
        Self {
            listing_id: listing_id.to_string(),
            rank_factor: BASE_RANK_FACTOR,
            badge: BadgeKind::None,
            featured: false,
            boost_id: None,
            boosted_until: None,
        }
    }
}

/// Project a listing's boost status onto ranking inputs.
///
/// Only a live boost counts; `package` must be the one the boost was bought
/// with. Without it the listing is shown unboosted.
pub fn project(
    view: &BoostStatusView,
    package: Option<&BoostPackage>,
    now: DateTime<Utc>,
) -> Visibility {
    let live = view
        .current_boost
        .as_ref()
        .filter(|boost| view.has_active_boost && boost.is_live_at(now));

    match (live, package) {
        (Some(boost), Some(package)) if package.id == boost.package_id => Visibility {
            listing_id: view.listing_id.clone(),
            rank_factor: package.features.priority.rank_factor(),
            badge: package.features.badge,
            featured: package.features.featured,
            boost_id: Some(boost.id.clone()),
            boosted_until: boost.end_date,
        },
        _ => Visibility::unboosted(&view.listing_id),
    }
}

/// Order projections by rank factor, highest first; ties keep input order.
pub fn rank(items: &mut [Visibility]) {
    items.sort_by(|a, b| b.rank_factor.total_cmp(&a.rank_factor));
}
