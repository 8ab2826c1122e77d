use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::{Connection, OptionalExt};

use benome_core::{
    boost::{Boost, BoostStatus},
    ledger::{BoostFilter, BoostLedger, BoostSummary, CreateOutcome, NewBoost, NewPayment},
    payment::PaymentStatus,
};

use crate::{
    backend::{parse_opt_ts, parse_ts, ts},
    payments::read_payment,
    DuckDbBackend,
};

const BOOST_COLUMNS: &str = "b.id, b.listing_id, b.package_id, b.user_id, b.status, \
     strftime(b.start_date, '%Y-%m-%d %H:%M:%S.%f'), \
     strftime(b.end_date, '%Y-%m-%d %H:%M:%S.%f'), \
     b.payment_id, b.renewed_from, b.cancelled_by, \
     strftime(b.created_at, '%Y-%m-%d %H:%M:%S.%f'), \
     strftime(b.updated_at, '%Y-%m-%d %H:%M:%S.%f')";

/// Maximum page size for the admin search.
const MAX_PAGE: i64 = 200;

struct BoostRow {
    id: String,
    listing_id: String,
    package_id: String,
    user_id: String,
    status: String,
    start_date: Option<String>,
    end_date: Option<String>,
    payment_id: String,
    renewed_from: Option<String>,
    cancelled_by: Option<String>,
    created_at: String,
    updated_at: String,
}

impl BoostRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            listing_id: row.get(1)?,
            package_id: row.get(2)?,
            user_id: row.get(3)?,
            status: row.get(4)?,
            start_date: row.get(5)?,
            end_date: row.get(6)?,
            payment_id: row.get(7)?,
            renewed_from: row.get(8)?,
            cancelled_by: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_boost(self) -> Result<Boost> {
        Ok(Boost {
            status: BoostStatus::parse(&self.status)?,
            start_date: parse_opt_ts(self.start_date)?,
            end_date: parse_opt_ts(self.end_date)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            id: self.id,
            listing_id: self.listing_id,
            package_id: self.package_id,
            user_id: self.user_id,
            payment_id: self.payment_id,
            renewed_from: self.renewed_from,
            cancelled_by: self.cancelled_by,
        })
    }
}

fn read_boost(conn: &Connection, id: &str) -> Result<Option<Boost>> {
    let mut stmt = conn.prepare(&format!("SELECT {BOOST_COLUMNS} FROM boosts b WHERE b.id = ?1"))?;
    match stmt.query_row(duckdb::params![id], BoostRow::from_row) {
        Ok(row) => Ok(Some(row.into_boost()?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(anyhow!(e)),
    }
}

fn query_boosts(
    conn: &Connection,
    sql: &str,
    params: &[&dyn duckdb::types::ToSql],
) -> Result<Vec<Boost>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, BoostRow::from_row)?;
    let mut boosts = Vec::new();
    for row in rows {
        boosts.push(row?.into_boost()?);
    }
    Ok(boosts)
}

#[async_trait]
impl BoostLedger for DuckDbBackend {
    async fn create_purchase(&self, boost: NewBoost, payment: NewPayment) -> Result<CreateOutcome> {
        payment.metadata.validate()?;
        let metadata = payment.metadata.to_json()?;
        let created_at = ts(&boost.created_at);

        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let lapsed = tx.execute(
            "UPDATE boosts SET status = 'expired', updated_at = CAST(?2 AS TIMESTAMP) \
             WHERE listing_id = ?1 AND status = 'active' AND end_date < CAST(?2 AS TIMESTAMP)",
            duckdb::params![boost.listing_id, created_at],
        )?;
        if lapsed > 0 {
            tracing::info!(listing_id = %boost.listing_id, "Expired lapsed boost before new purchase");
        }

        let existing: Option<String> = tx
            .query_row(
                "SELECT id FROM boosts WHERE listing_id = ?1 AND status IN ('pending', 'active') \
                 ORDER BY created_at DESC LIMIT 1",
                duckdb::params![boost.listing_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing_boost_id) = existing {
            tx.commit()?;
            return Ok(CreateOutcome::Conflict { existing_boost_id });
        }

        tx.execute(
            r#"INSERT INTO payments (id, user_id, amount, currency, payment_method, status,
                   transaction_id, metadata, expires_at, created_at, updated_at, completed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, CAST(?8 AS TIMESTAMP),
                   CAST(?9 AS TIMESTAMP), CAST(?9 AS TIMESTAMP), NULL)"#,
            duckdb::params![
                payment.id,
                payment.user_id,
                payment.amount,
                payment.currency,
                payment.payment_method.as_str(),
                PaymentStatus::Pending.as_str(),
                metadata,
                ts(&payment.expires_at),
                ts(&payment.created_at),
            ],
        )?;
        tx.execute(
            r#"INSERT INTO boosts (id, listing_id, package_id, user_id, status, start_date,
                   end_date, payment_id, renewed_from, cancelled_by, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, ?7, NULL,
                   CAST(?8 AS TIMESTAMP), CAST(?8 AS TIMESTAMP))"#,
            duckdb::params![
                boost.id,
                boost.listing_id,
                boost.package_id,
                boost.user_id,
                BoostStatus::Pending.as_str(),
                boost.payment_id,
                boost.renewed_from,
                created_at,
            ],
        )?;

        let stored_boost = read_boost(&tx, &boost.id)?
            .ok_or_else(|| anyhow!("boost {} missing after insert", boost.id))?;
        let stored_payment = read_payment(&tx, &payment.id)?
            .ok_or_else(|| anyhow!("payment {} missing after insert", payment.id))?;
        tx.commit()?;

        Ok(CreateOutcome::Created {
            boost: stored_boost,
            payment: stored_payment,
        })
    }

    async fn get_boost(&self, id: &str) -> Result<Option<Boost>> {
        let conn = self.conn.lock().await;
        read_boost(&conn, id)
    }

    async fn find_active_boost(&self, listing_id: &str) -> Result<Option<Boost>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {BOOST_COLUMNS} FROM boosts b \
             WHERE b.listing_id = ?1 AND b.status = 'active' \
             ORDER BY b.created_at DESC LIMIT 1"
        );
        Ok(query_boosts(&conn, &sql, duckdb::params![listing_id])?.pop())
    }

    async fn find_open_boost(&self, listing_id: &str) -> Result<Option<Boost>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {BOOST_COLUMNS} FROM boosts b \
             WHERE b.listing_id = ?1 AND b.status IN ('pending', 'active') \
             ORDER BY (b.status = 'active') DESC, b.created_at DESC LIMIT 1"
        );
        Ok(query_boosts(&conn, &sql, duckdb::params![listing_id])?.pop())
    }

    async fn activate_if_pending(
        &self,
        id: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE boosts SET status = 'active', start_date = CAST(?2 AS TIMESTAMP), \
             end_date = CAST(?3 AS TIMESTAMP), updated_at = CAST(?4 AS TIMESTAMP) \
             WHERE id = ?1 AND status = 'pending'",
            duckdb::params![id, ts(&start_date), ts(&end_date), ts(&now)],
        )?;
        Ok(affected > 0)
    }

    async fn cancel_if_open(&self, id: &str, cancelled_by: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE boosts SET status = 'cancelled', cancelled_by = ?2, \
             updated_at = CAST(?3 AS TIMESTAMP) \
             WHERE id = ?1 AND status IN ('pending', 'active')",
            duckdb::params![id, cancelled_by, ts(&now)],
        )?;
        Ok(affected > 0)
    }

    async fn cancel_if_pending(
        &self,
        id: &str,
        cancelled_by: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE boosts SET status = 'cancelled', cancelled_by = ?2, \
             updated_at = CAST(?3 AS TIMESTAMP) \
             WHERE id = ?1 AND status = 'pending'",
            duckdb::params![id, cancelled_by, ts(&now)],
        )?;
        Ok(affected > 0)
    }

    async fn expire_if_due(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE boosts SET status = 'expired', updated_at = CAST(?2 AS TIMESTAMP) \
             WHERE id = ?1 AND status = 'active' AND end_date < CAST(?2 AS TIMESTAMP)",
            duckdb::params![id, ts(&now)],
        )?;
        Ok(affected > 0)
    }

    async fn list_due_boosts(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Boost>> {
        let conn = self.conn.lock().await;
        let sql = format!(
            "SELECT {BOOST_COLUMNS} FROM boosts b \
             WHERE b.status = 'active' AND b.end_date < CAST(?1 AS TIMESTAMP) \
             ORDER BY b.end_date ASC LIMIT ?2"
        );
        query_boosts(&conn, &sql, duckdb::params![ts(&now), limit])
    }

    async fn list_boosts(&self, filter: &BoostFilter) -> Result<(Vec<BoostSummary>, i64)> {
        let conn = self.conn.lock().await;

        let mut where_sql = String::from("WHERE 1 = 1");
        let mut params: Vec<Box<dyn duckdb::types::ToSql>> = Vec::new();
        let mut param_idx = 1;

        if let Some(status) = filter.status {
            where_sql.push_str(&format!(" AND b.status = ?{param_idx}"));
            params.push(Box::new(status.as_str().to_string()));
            param_idx += 1;
        }
        if let Some(title) = filter.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            where_sql.push_str(&format!(" AND l.title ILIKE ?{param_idx}"));
            params.push(Box::new(format!("%{title}%")));
            param_idx += 1;
        }
        if let Some(ref user_id) = filter.user_id {
            where_sql.push_str(&format!(" AND b.user_id = ?{param_idx}"));
            params.push(Box::new(user_id.clone()));
            param_idx += 1;
        }

        let from_sql = "FROM boosts b \
             LEFT JOIN listings l ON l.id = b.listing_id \
             LEFT JOIN boost_packages p ON p.id = b.package_id";

        let total: i64 = {
            let param_refs: Vec<&dyn duckdb::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            conn.prepare(&format!("SELECT COUNT(*) {from_sql} {where_sql}"))?
                .query_row(param_refs.as_slice(), |row| row.get(0))?
        };

        let limit = filter.limit.clamp(1, MAX_PAGE);
        let offset = filter.offset.max(0);
        let sql = format!(
            "SELECT {BOOST_COLUMNS}, l.title, p.name {from_sql} {where_sql} \
             ORDER BY b.created_at DESC, b.id ASC LIMIT ?{} OFFSET ?{}",
            param_idx,
            param_idx + 1
        );
        params.push(Box::new(limit));
        params.push(Box::new(offset));

        let param_refs: Vec<&dyn duckdb::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(param_refs.as_slice(), |row| {
            Ok((
                BoostRow::from_row(row)?,
                row.get::<_, Option<String>>(12)?,
                row.get::<_, Option<String>>(13)?,
            ))
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            let (boost, listing_title, package_name) = row?;
            summaries.push(BoostSummary {
                boost: boost.into_boost()?,
                listing_title,
                package_name,
            });
        }
        Ok((summaries, total))
    }

    async fn open_boosts_for_listings(&self, listing_ids: &[String]) -> Result<Vec<Boost>> {
        if listing_ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().await;
        let placeholders: Vec<String> = (1..=listing_ids.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT {BOOST_COLUMNS} FROM boosts b \
             WHERE b.status IN ('pending', 'active') AND b.listing_id IN ({}) \
             ORDER BY b.created_at ASC",
            placeholders.join(", ")
        );
        let param_refs: Vec<&dyn duckdb::types::ToSql> = listing_ids
            .iter()
            .map(|id| id as &dyn duckdb::types::ToSql)
            .collect();
        query_boosts(&conn, &sql, param_refs.as_slice())
    }
}
