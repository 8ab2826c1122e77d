//! Package catalog: cached reads for buyers, checked edits for administrators.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::{
    cache::TtlCache,
    clock::Clock,
    error::{BoostError, BoostResult},
    ids,
    ledger::PackageStore,
    package::{BoostPackage, NewPackage, PackageUpdate},
};

const ACTIVE_PACKAGES_KEY: &str = "active";

pub struct PackageCatalog {
    store: Arc<dyn PackageStore>,
    clock: Arc<dyn Clock>,
    listing: TtlCache<&'static str, Vec<BoostPackage>>,
    packages: TtlCache<String, BoostPackage>,
}

impl PackageCatalog {
    pub fn new(store: Arc<dyn PackageStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            listing: TtlCache::new(ttl, 1),
            packages: TtlCache::new(ttl, 256),
        }
    }

    /// Purchasable packages, cheapest first.
    pub async fn list_packages(&self) -> BoostResult<Vec<BoostPackage>> {
        let store = Arc::clone(&self.store);
        let packages = self
            .listing
            .get_or_try_insert_with(ACTIVE_PACKAGES_KEY, || async move {
                let mut packages = store.list_packages(false).await?;
                sort_by_price(&mut packages);
                Ok::<_, anyhow::Error>(packages)
            })
            .await?;
        Ok(packages)
    }

    /// Every package, including inactive ones. Never cached.
    pub async fn list_all_packages(&self) -> BoostResult<Vec<BoostPackage>> {
        let mut packages = self.store.list_packages(true).await?;
        sort_by_price(&mut packages);
        Ok(packages)
    }

    pub async fn get_package(&self, id: &str) -> BoostResult<BoostPackage> {
        if let Some(hit) = self.packages.get(&id.to_string()).await {
            return Ok(hit);
        }
        let package = self
            .store
            .get_package(id)
            .await?
            .ok_or_else(|| BoostError::not_found("package", id))?;
        self.packages.insert(id.to_string(), package.clone()).await;
        Ok(package)
    }

    pub async fn create_package(&self, new: NewPackage) -> BoostResult<BoostPackage> {
        new.validate()?;
        let now = self.clock.now();
        let package = BoostPackage {
            id: ids::package_id(),
            name: new.name.trim().to_string(),
            price: new.price,
            duration_days: new.duration_days,
            features: new.features,
            active: new.active,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_package(&package).await?;
        self.listing.invalidate_all().await;
        info!(package_id = %package.id, price = package.price, "Boost package created");
        Ok(package)
    }

    /// Edit a package. Price, duration and features are frozen once any
    /// boost references the package.
    pub async fn update_package(&self, id: &str, update: PackageUpdate) -> BoostResult<BoostPackage> {
        update.validate()?;
        let current = self
            .store
            .get_package(id)
            .await?
            .ok_or_else(|| BoostError::not_found("package", id))?;

        if update.changes_terms(&current) && self.store.is_package_referenced(id).await? {
            return Err(BoostError::InvalidState(format!(
                "package {id} is referenced by existing boosts; its price, duration and features can no longer change"
            )));
        }

        let updated = update.apply(current, self.clock.now());
        if !self.store.update_package(&updated).await? {
            return Err(BoostError::not_found("package", id));
        }
        self.invalidate(id).await;
        info!(package_id = %id, "Boost package updated");
        Ok(updated)
    }

    /// Drop cached entries touching `id` and the catalog listing.
    pub async fn invalidate(&self, id: &str) {
        self.packages.invalidate(&id.to_string()).await;
        self.listing.invalidate_all().await;
    }
}

fn sort_by_price(packages: &mut [BoostPackage]) {
    packages.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
}
