//! Domain model and lifecycle engine for Benome listing boosts.

pub mod boost;
pub mod cache;
pub mod caller;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod ids;
pub mod ledger;
pub mod listing;
pub mod package;
pub mod payment;
pub mod visibility;

pub use error::{BoostError, BoostResult};
