pub mod admin;
pub mod boosts;
pub mod health;
pub mod packages;
pub mod payments;
pub mod sandbox;
pub mod visibility;
