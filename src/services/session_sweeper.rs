use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::state::SharedState;

/// Periodically evict idle sessions along with their idempotency records and connections.
///
/// Runs until the task is aborted.
pub async fn run(state: SharedState) {
    let period = state.config().session_sweep_interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    info!(
        interval_secs = period.as_secs(),
        idle_timeout_secs = state.config().session_idle_timeout().as_secs(),
        "session sweeper started"
    );

    loop {
        ticker.tick().await;
        let evicted = state.sweep_idle_sessions();
        if evicted.is_empty() {
            debug!(live = state.session_count(), "no idle session to evict");
        } else {
            info!(
                evicted = evicted.len(),
                live = state.session_count(),
                sessions = ?evicted,
                "evicted idle sessions"
            );
        }
    }
}
