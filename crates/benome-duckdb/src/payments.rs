use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::Connection;

use benome_core::{
    ledger::PaymentStore,
    payment::{Payment, PaymentMetadata, PaymentMethod, PaymentStatus},
};

use crate::{
    backend::{parse_opt_ts, parse_ts, ts},
    DuckDbBackend,
};

pub(crate) const PAYMENT_COLUMNS: &str = "id, user_id, amount, currency, payment_method, status, \
     transaction_id, metadata, \
     strftime(expires_at, '%Y-%m-%d %H:%M:%S.%f'), \
     strftime(created_at, '%Y-%m-%d %H:%M:%S.%f'), \
     strftime(updated_at, '%Y-%m-%d %H:%M:%S.%f'), \
     strftime(completed_at, '%Y-%m-%d %H:%M:%S.%f')";

/// Raw payment columns; converted outside the row closure so parse errors
/// surface as `anyhow` errors rather than DuckDB conversion failures.
pub(crate) struct PaymentRow {
    id: String,
    user_id: String,
    amount: i64,
    currency: String,
    payment_method: String,
    status: String,
    transaction_id: Option<String>,
    metadata: String,
    expires_at: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl PaymentRow {
    pub(crate) fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            currency: row.get(3)?,
            payment_method: row.get(4)?,
            status: row.get(5)?,
            transaction_id: row.get(6)?,
            metadata: row.get(7)?,
            expires_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
            completed_at: row.get(11)?,
        })
    }

    pub(crate) fn into_payment(self) -> Result<Payment> {
        Ok(Payment {
            payment_method: PaymentMethod::parse(&self.payment_method)?,
            status: PaymentStatus::parse(&self.status)?,
            metadata: PaymentMetadata::from_json(&self.metadata)
                .map_err(|e| anyhow!("payment {}: {e}", self.id))?,
            expires_at: parse_ts(&self.expires_at)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            completed_at: parse_opt_ts(self.completed_at)?,
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            transaction_id: self.transaction_id,
        })
    }
}

pub(crate) fn read_payment(conn: &Connection, id: &str) -> Result<Option<Payment>> {
    let mut stmt = conn.prepare(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1"))?;
    match stmt.query_row(duckdb::params![id], PaymentRow::from_row) {
        Ok(row) => Ok(Some(row.into_payment()?)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(anyhow!(e)),
    }
}

#[async_trait]
impl PaymentStore for DuckDbBackend {
    async fn get_payment(&self, id: &str) -> Result<Option<Payment>> {
        let conn = self.conn.lock().await;
        read_payment(&conn, id)
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> Result<Option<Payment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = ?1"
        ))?;
        match stmt.query_row(duckdb::params![transaction_id], PaymentRow::from_row) {
            Ok(row) => Ok(Some(row.into_payment()?)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!(e)),
        }
    }

    async fn set_transaction_id(
        &self,
        payment_id: &str,
        transaction_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE payments SET transaction_id = ?2, updated_at = CAST(?3 AS TIMESTAMP) \
             WHERE id = ?1 AND transaction_id IS NULL",
            duckdb::params![payment_id, transaction_id, ts(&now)],
        )?;
        Ok(affected > 0)
    }

    async fn advance_payment_status(
        &self,
        payment_id: &str,
        from: &[PaymentStatus],
        to: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let from: Vec<PaymentStatus> = from
            .iter()
            .copied()
            .filter(|status| status.can_advance_to(to))
            .collect();
        if from.is_empty() {
            return Ok(false);
        }

        let conn = self.conn.lock().await;
        let completed_sql = if to == PaymentStatus::Completed {
            ", completed_at = CAST(?3 AS TIMESTAMP)"
        } else {
            ""
        };
        let mut params: Vec<Box<dyn duckdb::types::ToSql>> = vec![
            Box::new(payment_id.to_string()),
            Box::new(to.as_str().to_string()),
            Box::new(ts(&now)),
        ];
        let mut placeholders = Vec::with_capacity(from.len());
        for (i, status) in from.iter().enumerate() {
            placeholders.push(format!("?{}", i + 4));
            params.push(Box::new(status.as_str().to_string()));
        }
        let sql = format!(
            "UPDATE payments SET status = ?2, updated_at = CAST(?3 AS TIMESTAMP){completed_sql} \
             WHERE id = ?1 AND status IN ({})",
            placeholders.join(", ")
        );

        let param_refs: Vec<&dyn duckdb::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let affected = conn.execute(&sql, param_refs.as_slice())?;
        Ok(affected > 0)
    }

    async fn list_stale_payments(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<Payment>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE status IN ('pending', 'processing') AND expires_at < CAST(?1 AS TIMESTAMP) \
             ORDER BY expires_at ASC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(duckdb::params![ts(&now), limit], PaymentRow::from_row)?;

        let mut payments = Vec::new();
        for row in rows {
            payments.push(row?.into_payment()?);
        }
        Ok(payments)
    }
}
