use anyhow::{anyhow, Result};
use async_trait::async_trait;

use benome_core::{
    ledger::ListingDirectory,
    listing::{Listing, ListingCategory},
};

use crate::{
    backend::{parse_ts, ts},
    DuckDbBackend,
};

#[async_trait]
impl ListingDirectory for DuckDbBackend {
    async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, title, category, strftime(created_at, '%Y-%m-%d %H:%M:%S.%f') \
             FROM listings WHERE id = ?1",
        )?;
        let row = stmt.query_row(duckdb::params![id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        });
        match row {
            Ok((id, user_id, title, category, created_at)) => Ok(Some(Listing {
                id,
                user_id,
                title,
                category: ListingCategory::parse(&category)?,
                created_at: parse_ts(&created_at)?,
            })),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!(e)),
        }
    }

    /// Insert or refresh the mirrored listing. `created_at` is kept from the
    /// first sync.
    async fn upsert_listing(&self, listing: &Listing) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO listings (id, user_id, title, category, created_at)
               VALUES (?1, ?2, ?3, ?4, CAST(?5 AS TIMESTAMP))
               ON CONFLICT (id) DO UPDATE SET
                   user_id = excluded.user_id,
                   title = excluded.title,
                   category = excluded.category"#,
            duckdb::params![
                listing.id,
                listing.user_id,
                listing.title,
                listing.category.as_str(),
                ts(&listing.created_at),
            ],
        )?;
        Ok(())
    }
}
