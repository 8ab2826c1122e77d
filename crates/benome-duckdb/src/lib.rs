pub mod backend;
pub mod boosts;
pub mod listings;
pub mod packages;
pub mod payments;
pub mod schema;

pub use backend::DuckDbBackend;

/// Re-export the `duckdb` crate so consumers (especially tests) can use
/// `benome_duckdb::duckdb::params!` without an extra dependency.
pub use duckdb;
