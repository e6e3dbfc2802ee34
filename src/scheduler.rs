//! Background cadences: a daily boundary pass at a fixed UTC hour, a weekly
//! full sweep, and a per-dormitory WAL compactor. These only call the
//! service's public contract; the on-demand CLI goes through the same calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::{DAY_MS, Ms, now_ms};
use crate::service::RoomStatusService;

const WEEK_MS: Ms = 7 * DAY_MS;

/// Milliseconds until the next `hour_utc:00` strictly after `now`.
pub fn ms_until_next_daily(now: Ms, hour_utc: u32) -> Ms {
    let target_in_day = Ms::from(hour_utc) * 3_600_000;
    let day_start = now - now.rem_euclid(DAY_MS);
    let mut next = day_start + target_in_day;
    if next <= now {
        next += DAY_MS;
    }
    next - now
}

/// Daily pass: archive stays ending today, recompute rooms with a boundary
/// crossing, report check-ins/check-outs.
pub async fn run_daily_sync(service: RoomStatusService, hour_utc: u32, show_stats: bool) {
    loop {
        let wait = ms_until_next_daily(now_ms(), hour_utc);
        tokio::time::sleep(Duration::from_millis(wait as u64)).await;

        let report = service.daily_status_changes_now(None).await;
        info!(
            check_ins = report.check_ins.len(),
            check_outs = report.check_outs.len(),
            "daily status sync done"
        );
        if show_stats {
            log_all_stats(&service).await;
        }
    }
}

/// Weekly full sweep, with one pass right at startup to correct whatever
/// drift accumulated while the process was down.
pub async fn run_weekly_sweep(service: RoomStatusService, show_stats: bool) {
    let mut interval = tokio::time::interval(Duration::from_millis(WEEK_MS as u64));
    loop {
        interval.tick().await;
        let changed = service.update_all_rooms().await;
        let corrected: usize = changed.values().map(Vec::len).sum();
        info!(
            dorms = changed.len(),
            corrected, "weekly full sweep done"
        );
        if show_stats {
            log_all_stats(&service).await;
        }
    }
}

async fn log_all_stats(service: &RoomStatusService) {
    for (dorm, room) in service.incorrectly_occupied_rooms(None).await {
        tracing::warn!(%dorm, room = %room.id, "drift remains after sync");
    }
    for dorm in service.dorms() {
        let stats = service.occupancy_stats(&dorm).await;
        info!(
            %dorm,
            total = stats.total_rooms,
            available = stats.available,
            occupied = stats.occupied,
            maintenance = stats.maintenance,
            rate = stats.occupancy_rate,
            "occupancy"
        );
    }
}

/// Compact a dormitory's WAL once enough appends accumulated. Spawned per
/// engine by the tenant manager.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.tick().await; // skip the immediate first tick
    loop {
        interval.tick().await;
        if engine.wal_appends_since_compact().await < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("WAL compacted"),
            Err(e) => tracing::debug!("compaction skipped: {e}"),
        }
    }
}
