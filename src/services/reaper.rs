//! Periodic cleanup of closed and idle rooms.

use std::time::{Duration, SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    dao::{room_store::RoomStore, storage::StorageResult},
    state::{
        RoomHub, SharedState,
        room::RoomStatus,
    },
};

/// Rooms touched by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Closed rooms removed from the store.
    pub deleted: usize,
    /// Idle waiting rooms closed.
    pub abandoned: usize,
}

/// Sweep the room store every `reaper_interval` while a store is installed.
pub async fn run(state: SharedState) {
    let config = state.config().clone();
    let mut ticker = interval(config.reaper_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Ok(store) = state.require_room_store().await else {
            debug!("room store unavailable; skipping sweep");
            continue;
        };

        match sweep(
            store.as_ref(),
            state.hub(),
            config.room_retention,
            SystemTime::now(),
        )
        .await
        {
            Ok(report) if report != SweepReport::default() => {
                info!(
                    deleted = report.deleted,
                    abandoned = report.abandoned,
                    "room sweep finished"
                );
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "room sweep failed"),
        }
    }
}

/// Delete closed rooms and abandon waiting rooms last written more than `retention` before `now`.
pub async fn sweep(
    store: &dyn RoomStore,
    hub: &RoomHub,
    retention: Duration,
    now: SystemTime,
) -> StorageResult<SweepReport> {
    let cutoff = now
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let mut report = SweepReport::default();

    for room in store.list_closed_before(cutoff).await? {
        if store.delete(room.id).await? {
            hub.close(room.id);
            report.deleted += 1;
        }
    }

    for mut room in store.list_waiting_before(cutoff).await? {
        if room.advance(RoomStatus::Abandoned).is_err() {
            continue;
        }
        room.updated_at = now;
        match store.update(room.clone()).await {
            Ok(_) => {
                debug!(room_id = %room.id, "abandoned idle room");
                report.abandoned += 1;
            }
            // Someone wrote in the meantime, so the room is not idle.
            Err(err) if err.is_conflict() => {}
            Err(err) => return Err(err),
        }
    }

    Ok(report)
}
