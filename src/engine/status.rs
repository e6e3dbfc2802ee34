//! Status derivation and drift correction. The stored status is a derived
//! cache over the booking set; everything here is safe to re-run.

use ulid::Ulid;

use crate::model::*;
use crate::notify::StatusChange;

use super::{Engine, EngineError};

impl Engine {
    /// Recompute one room's status from its bookings. The caller holds the
    /// write guard, so the read-count-write sequence is atomic per room.
    ///
    /// Returns whether the stored status changed. Maintenance is sticky:
    /// the room is left untouched. A WAL failure is logged and reported as
    /// "no change" — this never raises to the caller, the next sweep will
    /// retry.
    pub(super) async fn recompute_status(&self, rs: &mut RoomState) -> bool {
        let Some(desired) = rs.derived_status() else {
            return false;
        };
        if rs.status == desired {
            return false;
        }
        let from = rs.status;
        let event = Event::RoomStatusSet {
            id: rs.id,
            status: desired,
        };
        match self.persist_and_apply(rs, &event).await {
            Ok(()) => {
                metrics::counter!(
                    crate::observability::STATUS_CHANGES_TOTAL,
                    "to" => desired.as_str()
                )
                .increment(1);
                self.feed.send(StatusChange {
                    room_id: rs.id,
                    from,
                    to: desired,
                    at: now_ms(),
                });
                true
            }
            Err(e) => {
                tracing::warn!(
                    room = %rs.id,
                    status = from.as_str(),
                    "room status update failed: {e}"
                );
                false
            }
        }
    }

    /// Recompute a single room by id. `false` when the room is unknown.
    pub async fn update_room_status(&self, room_id: Ulid) -> bool {
        let Some(rs) = self.get_room(&room_id) else {
            return false;
        };
        let mut guard = rs.write().await;
        self.recompute_status(&mut guard).await
    }

    /// Full sweep over this dormitory's active rooms. Returns the ids whose
    /// status changed, sorted. Per-room failures are logged inside
    /// `recompute_status` and skipped; the sweep always completes.
    pub async fn sweep(&self) -> Vec<Ulid> {
        let ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        let mut changed = Vec::new();
        for id in ids {
            let Some(rs) = self.get_room(&id) else {
                continue; // deleted mid-sweep
            };
            let mut guard = rs.write().await;
            if !guard.is_active() {
                continue;
            }
            if self.recompute_status(&mut guard).await {
                changed.push(id);
            }
        }
        changed.sort();
        changed
    }

    /// Daily boundary pass. Stays are measured in semesters, so the stay
    /// window is derived: `[moved_in_at, moved_in_at + semesters * SEMESTER_MS)`.
    ///
    /// An active booking whose window has run out by the end of the UTC day
    /// of `now` is archived here (the stay is over). That includes stays
    /// that ended on a day no pass covered, so downtime over the daily hour
    /// delays a check-out instead of losing it. Rooms with a window
    /// starting today are recomputed as well. A room that flips to occupied
    /// is reported as a check-in, one that flips to available as a
    /// check-out.
    pub async fn daily_status_changes(&self, now: Ms) -> DailyReport {
        let (day_start, day_end) = day_window(now);
        let ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        let mut report = DailyReport::default();

        for id in ids {
            let Some(rs) = self.get_room(&id) else {
                continue;
            };
            let mut guard = rs.write().await;
            if !guard.is_active() {
                continue;
            }

            let ended: Vec<Ulid> = guard
                .bookings
                .iter()
                .filter(|b| b.is_active() && b.ended_before(day_end))
                .map(|b| b.id)
                .collect();
            let starts_today = guard
                .bookings
                .iter()
                .any(|b| b.is_active() && b.starts_within(day_start, day_end));
            if ended.is_empty() && !starts_today {
                continue;
            }

            for booking_id in ended {
                let event = Event::BookingArchived {
                    id: booking_id,
                    room_id: id,
                    at: now,
                };
                if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
                    tracing::warn!(room = %id, booking = %booking_id, "auto check-out failed: {e}");
                }
            }

            if self.recompute_status(&mut guard).await {
                match guard.status {
                    RoomStatus::Occupied => report.check_ins.push(id),
                    RoomStatus::Available => report.check_outs.push(id),
                    RoomStatus::Maintenance => {}
                }
            }
        }

        report.check_ins.sort();
        report.check_outs.sort();
        report
    }

    /// Audit: active rooms flagged occupied whose occupancy no longer
    /// warrants it. Read-only; maintenance rooms are not drift.
    pub async fn incorrectly_occupied(&self) -> Vec<RoomInfo> {
        self.drifted(|rs| rs.status == RoomStatus::Occupied && !rs.is_at_capacity())
            .await
    }

    /// Audit: active rooms flagged available that are actually at capacity.
    pub async fn incorrectly_available(&self) -> Vec<RoomInfo> {
        self.drifted(|rs| rs.status == RoomStatus::Available && rs.is_at_capacity())
            .await
    }

    async fn drifted(&self, pred: impl Fn(&RoomState) -> bool) -> Vec<RoomInfo> {
        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for rs in rooms {
            let guard = rs.read().await;
            if guard.is_active() && pred(&guard) {
                out.push(RoomInfo::of(&guard));
            }
        }
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Status breakdown over active rooms.
    pub async fn occupancy_stats(&self) -> OccupancyStats {
        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        let (mut available, mut occupied, mut maintenance) = (0u32, 0u32, 0u32);
        for rs in rooms {
            let guard = rs.read().await;
            if !guard.is_active() {
                continue;
            }
            match guard.status {
                RoomStatus::Available => available += 1,
                RoomStatus::Occupied => occupied += 1,
                RoomStatus::Maintenance => maintenance += 1,
            }
        }
        OccupancyStats::compute(available, occupied, maintenance)
    }

    /// Error-returning variant of `update_room_status` for callers that need
    /// to distinguish "unknown room" from "no change".
    pub async fn try_update_room_status(&self, room_id: Ulid) -> Result<bool, EngineError> {
        let rs = self
            .get_room(&room_id)
            .ok_or(EngineError::RoomNotFound(room_id))?;
        let mut guard = rs.write().await;
        Ok(self.recompute_status(&mut guard).await)
    }
}
