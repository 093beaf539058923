//! Background tasks owned by a running session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use hitline_core::bus::{CoordinationBus, REQUEST_STOP};
use hitline_core::session::StopReason;

use crate::coordinator::SessionCommand;

/// Send a `Tick` to the coordinator every `period` until cancelled or the
/// coordinator goes away. The first tick is one full period after spawn.
pub fn spawn_duration_ticker(
    period: Duration,
    generation: u64,
    tx: WeakUnboundedSender<SessionCommand>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // interval() completes its first tick immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    let Some(tx) = tx.upgrade() else { break };
                    if tx.send(SessionCommand::Tick { generation }).is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(generation, "Duration ticker stopped");
    })
}

/// Ask for a stop through the bus after `delay`, unless `token` is
/// cancelled first.
pub fn spawn_delayed_stop(
    bus: Arc<CoordinationBus>,
    reason: StopReason,
    delay: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!(%reason, "Scheduled stop cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        if bus.call(&REQUEST_STOP, reason) != Some(true) {
            tracing::warn!(%reason, "Stop request was not delivered");
        }
    })
}
