/// Re-export `Config` from `benome-core` for use within this crate.
///
/// All environment-variable parsing lives in `benome-core` so integration
/// tests can build a `Config` without going through the environment.
pub use benome_core::config::{AuthMode, Config, GatewayMode};
