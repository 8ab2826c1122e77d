use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use duckdb::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::schema::{init_sql, DEFAULT_PACKAGES};

/// Generate a cryptographically random hex string of `n` bytes (2n hex chars).
pub(crate) fn rand_hex(n: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Format of every stored timestamp. Columns are `TIMESTAMP` holding UTC.
pub(crate) const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Render a timestamp for `CAST(?n AS TIMESTAMP)`.
pub(crate) fn ts(at: &DateTime<Utc>) -> String {
    at.format(TS_FORMAT).to_string()
}

/// Parse a column read through `strftime(col, '%Y-%m-%d %H:%M:%S.%f')`.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| anyhow!("invalid stored timestamp '{raw}': {e}"))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

/// A DuckDB-backed ledger for boosts, payments, packages and listings.
///
/// DuckDB is single-writer. The connection sits behind
/// `Arc<tokio::sync::Mutex<_>>`, so every statement (and every multi-statement
/// transaction) runs alone. The conditional inserts and updates in this crate
/// rely on that serialization for their check-and-write atomicity.
pub struct DuckDbBackend {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl DuckDbBackend {
    /// Open (or create) a DuckDB database file at `path`.
    ///
    /// `memory_limit` is a DuckDB size string such as `"1GB"` or `"512MB"`.
    /// Creates all tables if missing and seeds the default packages.
    pub fn open(path: &str, memory_limit: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(&init_sql(memory_limit))?;
        Self::seed_sync(&conn)?;
        info!(
            "DuckDB opened at {} with memory_limit={}, threads=2",
            path, memory_limit
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an **in-memory** DuckDB database.
    ///
    /// Intended for tests: data is discarded when the struct is dropped.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(&init_sql("1GB"))?;
        Self::seed_sync(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Seed settings and default packages. `INSERT OR IGNORE` keeps re-runs
    /// on every startup harmless.
    fn seed_sync(conn: &Connection) -> Result<()> {
        let install_id = rand_hex(8);
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES ('version', ?1)",
            duckdb::params!["1"],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES ('install_id', ?1)",
            duckdb::params![install_id],
        )?;

        let now = ts(&Utc::now());
        for (id, name, price, duration_days, features) in DEFAULT_PACKAGES {
            conn.execute(
                r#"INSERT OR IGNORE INTO boost_packages
                       (id, name, price, duration_days, features, active, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, TRUE, CAST(?6 AS TIMESTAMP), CAST(?6 AS TIMESTAMP))"#,
                duckdb::params![id, name, price, duration_days, features, now],
            )?;
        }
        Ok(())
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        match conn
            .prepare("SELECT value FROM settings WHERE key = ?1")?
            .query_row(duckdb::params![key], |row| row.get::<_, String>(0))
        {
            Ok(v) => Ok(Some(v)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(anyhow!(e)),
        }
    }

    /// Execute `SELECT 1` as a lightweight liveness check.
    ///
    /// Called by the `/health` endpoint.
    pub async fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    /// Acquire the DuckDB connection lock for direct queries.
    ///
    /// Intended for integration tests that need to verify stored data.
    /// Production code should use the typed methods.
    pub async fn conn_for_test(&self) -> tokio::sync::MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}
