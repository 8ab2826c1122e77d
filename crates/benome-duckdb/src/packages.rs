use anyhow::{anyhow, Result};
use async_trait::async_trait;

use benome_core::{
    ledger::PackageStore,
    package::{BoostFeatures, BoostPackage},
};

use crate::{
    backend::{parse_ts, ts},
    DuckDbBackend,
};

const PACKAGE_COLUMNS: &str = "id, name, price, duration_days, features, active, \
     strftime(created_at, '%Y-%m-%d %H:%M:%S.%f'), strftime(updated_at, '%Y-%m-%d %H:%M:%S.%f')";

struct PackageRow {
    id: String,
    name: String,
    price: i64,
    duration_days: i32,
    features: String,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl PackageRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            price: row.get(2)?,
            duration_days: row.get(3)?,
            features: row.get(4)?,
            active: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_package(self) -> Result<BoostPackage> {
        Ok(BoostPackage {
            duration_days: u32::try_from(self.duration_days)
                .map_err(|_| anyhow!("package {} has negative duration", self.id))?,
            features: BoostFeatures::from_json(&self.features)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            id: self.id,
            name: self.name,
            price: self.price,
            active: self.active,
        })
    }
}

#[async_trait]
impl PackageStore for DuckDbBackend {
    async fn list_packages(&self, include_inactive: bool) -> Result<Vec<BoostPackage>> {
        let conn = self.conn.lock().await;
        let sql = if include_inactive {
            format!("SELECT {PACKAGE_COLUMNS} FROM boost_packages ORDER BY price ASC, name ASC")
        } else {
            format!(
                "SELECT {PACKAGE_COLUMNS} FROM boost_packages WHERE active = TRUE \
                 ORDER BY price ASC, name ASC"
            )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], PackageRow::from_row)?;

        let mut packages = Vec::new();
        for row in rows {
            packages.push(row?.into_package()?);
        }
        Ok(packages)
    }

    async fn get_package(&self, id: &str) -> Result<Option<BoostPackage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PACKAGE_COLUMNS} FROM boost_packages WHERE id = ?1"
        ))?;
        match stmt.query_row(duckdb::params![id], PackageRow::from_row) {
            Ok(row) => Ok(Some(row.into_package()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!(e)),
        }
    }

    async fn insert_package(&self, package: &BoostPackage) -> Result<()> {
        let conn = self.conn.lock().await;
        let duration_days = i32::try_from(package.duration_days)
            .map_err(|_| anyhow!("package duration out of range"))?;
        conn.execute(
            r#"INSERT INTO boost_packages
                   (id, name, price, duration_days, features, active, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, CAST(?7 AS TIMESTAMP), CAST(?8 AS TIMESTAMP))"#,
            duckdb::params![
                package.id,
                package.name,
                package.price,
                duration_days,
                package.features.to_json()?,
                package.active,
                ts(&package.created_at),
                ts(&package.updated_at),
            ],
        )?;
        Ok(())
    }

    async fn update_package(&self, package: &BoostPackage) -> Result<bool> {
        let conn = self.conn.lock().await;
        let duration_days = i32::try_from(package.duration_days)
            .map_err(|_| anyhow!("package duration out of range"))?;
        let affected = conn.execute(
            r#"UPDATE boost_packages
               SET name = ?2, price = ?3, duration_days = ?4, features = ?5, active = ?6,
                   updated_at = CAST(?7 AS TIMESTAMP)
               WHERE id = ?1"#,
            duckdb::params![
                package.id,
                package.name,
                package.price,
                duration_days,
                package.features.to_json()?,
                package.active,
                ts(&package.updated_at),
            ],
        )?;
        Ok(affected > 0)
    }

    async fn is_package_referenced(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .prepare("SELECT COUNT(*) FROM boosts WHERE package_id = ?1")?
            .query_row(duckdb::params![id], |row| row.get(0))?;
        Ok(count > 0)
    }
}
