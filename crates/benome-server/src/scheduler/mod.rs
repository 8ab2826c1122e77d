use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info};

use benome_core::BoostResult;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_boosts: usize,
    pub failed_payments: usize,
}

/// One pass of both sweeps. Stale payments go first so their boosts are
/// cancelled before the expiry scan. A failing sweep does not stop the
/// other; each failure is logged and the first one is returned.
pub async fn process_once(state: &Arc<AppState>) -> BoostResult<SweepReport> {
    let failed_payments = state.engine.fail_stale_payments().await;
    if let Err(err) = &failed_payments {
        error!(error = %err, "Stale payment sweep failed");
    }
    let expired_boosts = state.engine.expire_due_boosts().await;
    if let Err(err) = &expired_boosts {
        error!(error = %err, "Boost expiry sweep failed");
    }
    Ok(SweepReport {
        failed_payments: failed_payments?,
        expired_boosts: expired_boosts?,
    })
}

pub async fn run_sweep_loop(state: Arc<AppState>) {
    let tick = state.config.sweep_interval();
    info!(tick_seconds = tick.as_secs(), "Boost sweeper started");
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match process_once(&state).await {
            Ok(report) if report != SweepReport::default() => {
                info!(
                    expired_boosts = report.expired_boosts,
                    failed_payments = report.failed_payments,
                    "Sweep pass applied changes"
                );
            }
            Ok(_) => {}
            Err(err) => debug!(error = %err, "Sweep pass incomplete"),
        }
    }
}
