/// DuckDB initialization SQL.
///
/// Executed once at database open time via `Connection::execute_batch`.
/// All statements use `IF NOT EXISTS` so they are safe to re-run on every
/// startup.
///
/// `memory_limit` is passed at runtime from `Config.duckdb_memory_limit`
/// (env `BENOME_DUCKDB_MEMORY`, default `"1GB"`).
///
/// Status columns carry no index: DuckDB rewrites updates of indexed
/// columns as delete + insert, and statuses change on every transition.
/// Tables are small enough that `listing_id` lookups plus a scan of the
/// handful of matching rows is all the lifecycle queries need.
pub fn init_sql(memory_limit: &str) -> String {
    format!(
        r#"SET memory_limit = '{memory_limit}';
SET threads = 2;

-- ===========================================
-- SETTINGS
-- ===========================================
-- Keys: 'version', 'install_id'
CREATE TABLE IF NOT EXISTS settings (
    key             VARCHAR PRIMARY KEY,
    value           VARCHAR NOT NULL
);

-- ===========================================
-- LISTINGS (mirror of the marketplace listing registry)
-- ===========================================
CREATE TABLE IF NOT EXISTS listings (
    id              VARCHAR PRIMARY KEY,
    user_id         VARCHAR NOT NULL,              -- listing owner
    title           VARCHAR NOT NULL,
    category        VARCHAR NOT NULL,              -- 'real_estate' | 'automobile' | 'services' | 'goods'
    created_at      TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_listings_user ON listings(user_id);

-- ===========================================
-- BOOST PACKAGES
-- ===========================================
CREATE TABLE IF NOT EXISTS boost_packages (
    id              VARCHAR PRIMARY KEY,           -- 'pkg_' + 12 alnum
    name            VARCHAR NOT NULL,
    price           BIGINT NOT NULL,               -- whole XOF
    duration_days   INTEGER NOT NULL,
    features        VARCHAR NOT NULL,              -- JSON BoostFeatures
    active          BOOLEAN NOT NULL DEFAULT TRUE,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL,
    CHECK (price > 0),
    CHECK (duration_days > 0)
);

-- ===========================================
-- PAYMENTS
-- ===========================================
CREATE TABLE IF NOT EXISTS payments (
    id              VARCHAR PRIMARY KEY,           -- 'pay_' + 21 alnum
    user_id         VARCHAR NOT NULL,
    amount          BIGINT NOT NULL,
    currency        VARCHAR(3) NOT NULL,
    payment_method  VARCHAR NOT NULL,              -- 'fedapay' | 'sandbox'
    status          VARCHAR NOT NULL,              -- 'pending' | 'processing' | 'completed' | 'failed'
    transaction_id  VARCHAR UNIQUE,                -- gateway reference; callback idempotency key
    metadata        VARCHAR NOT NULL,              -- JSON PaymentMetadata, tagged by 'purpose'
    expires_at      TIMESTAMP NOT NULL,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL,
    completed_at    TIMESTAMP
);

-- ===========================================
-- BOOSTS
-- ===========================================
-- At most one row per listing_id may be 'pending' or 'active'. Enforced by
-- the conditional insert in boosts.rs, which runs inside a transaction on
-- the single serialized connection.
CREATE TABLE IF NOT EXISTS boosts (
    id              VARCHAR PRIMARY KEY,           -- 'bst_' + 21 alnum
    listing_id      VARCHAR NOT NULL,
    package_id      VARCHAR NOT NULL,
    user_id         VARCHAR NOT NULL,              -- purchaser == listing owner at creation
    status          VARCHAR NOT NULL,              -- 'pending' | 'active' | 'expired' | 'cancelled'
    start_date      TIMESTAMP,                     -- NULL until activated
    end_date        TIMESTAMP,
    payment_id      VARCHAR NOT NULL,
    renewed_from    VARCHAR,
    cancelled_by    VARCHAR,
    created_at      TIMESTAMP NOT NULL,
    updated_at      TIMESTAMP NOT NULL,
    CHECK (end_date IS NULL OR start_date IS NULL OR end_date >= start_date)
);
CREATE INDEX IF NOT EXISTS idx_boosts_listing ON boosts(listing_id);
CREATE INDEX IF NOT EXISTS idx_boosts_payment ON boosts(payment_id);
"#
    )
}

/// Packages available on a fresh database.
///
/// `(id, name, price, duration_days, features JSON)`; seeded with
/// `INSERT OR IGNORE` so admin edits survive restarts.
pub const DEFAULT_PACKAGES: &[(&str, &str, i64, i32, &str)] = &[
    (
        "pkg_boost3",
        "Boost 3 jours",
        2000,
        3,
        r#"{"priority":"low","badge":"boosted","featured":false,"analytics":false,"support":"standard"}"#,
    ),
    (
        "pkg_boost7",
        "Boost 7 jours",
        5000,
        7,
        r#"{"priority":"medium","badge":"premium","featured":false,"analytics":true,"support":"standard"}"#,
    ),
    (
        "pkg_boost30",
        "Boost 30 jours",
        15000,
        30,
        r#"{"priority":"top","badge":"vip","featured":true,"analytics":true,"support":"priority"}"#,
    ),
];
