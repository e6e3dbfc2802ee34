//! Stateless façade over the per-room recompute, batched across rooms and
//! dormitories. Both scheduler cadences and the CLI call in here.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use ulid::Ulid;

use crate::engine::Engine;
use crate::model::{DailyReport, Ms, OccupancyStats, RoomInfo, now_ms};
use crate::tenant::{DormId, TenantManager};

#[derive(Clone)]
pub struct RoomStatusService {
    tenants: Arc<TenantManager>,
}

impl RoomStatusService {
    pub fn new(tenants: Arc<TenantManager>) -> Self {
        Self { tenants }
    }

    /// Recompute one room. `false` when the dormitory or room is unknown,
    /// or when nothing changed.
    pub async fn update_room_status(&self, dorm: &DormId, room_id: Ulid) -> bool {
        match self.tenants.get_or_create(dorm) {
            Ok(engine) => engine.update_room_status(room_id).await,
            Err(e) => {
                tracing::warn!(%dorm, "cannot load dormitory: {e}");
                false
            }
        }
    }

    /// Full resync of one dormitory. Returns the ids of rooms whose status
    /// changed.
    pub async fn update_all_rooms_for_tenant(&self, dorm: &DormId) -> Vec<Ulid> {
        match self.tenants.get_or_create(dorm) {
            Ok(engine) => {
                let start = std::time::Instant::now();
                let changed = engine.sweep().await;
                metrics::histogram!(crate::observability::SWEEP_DURATION_SECONDS)
                    .record(start.elapsed().as_secs_f64());
                if !changed.is_empty() {
                    info!(%dorm, corrected = changed.len(), "sweep corrected drift");
                }
                changed
            }
            Err(e) => {
                tracing::warn!(%dorm, "cannot load dormitory: {e}");
                Vec::new()
            }
        }
    }

    /// Global sweep: every dormitory present in the data dir, loaded on
    /// demand. A failing dormitory is skipped, never aborts the sweep.
    pub async fn update_all_rooms(&self) -> HashMap<DormId, Vec<Ulid>> {
        let mut out = HashMap::new();
        for dorm in self.tenants.known_dorms() {
            let changed = self.update_all_rooms_for_tenant(&dorm).await;
            out.insert(dorm, changed);
        }
        out
    }

    /// Drift audit: rooms flagged occupied that their occupancy no longer
    /// warrants. `None` scans every dormitory.
    pub async fn incorrectly_occupied_rooms(
        &self,
        dorm: Option<&DormId>,
    ) -> Vec<(DormId, RoomInfo)> {
        let mut out = Vec::new();
        for d in self.scope(dorm) {
            let Ok(engine) = self.tenants.get_or_create(&d) else {
                continue;
            };
            for info in engine.incorrectly_occupied().await {
                out.push((d.clone(), info));
            }
        }
        out
    }

    /// Drift audit: rooms flagged available that are actually at capacity.
    pub async fn incorrectly_available_rooms(
        &self,
        dorm: Option<&DormId>,
    ) -> Vec<(DormId, RoomInfo)> {
        let mut out = Vec::new();
        for d in self.scope(dorm) {
            let Ok(engine) = self.tenants.get_or_create(&d) else {
                continue;
            };
            for info in engine.incorrectly_available().await {
                out.push((d.clone(), info));
            }
        }
        out
    }

    /// Every dormitory in scope: loaded engines plus WAL files on disk.
    pub fn dorms(&self) -> Vec<DormId> {
        self.tenants.known_dorms()
    }

    /// Direct engine access for the booking-persistence layer.
    pub fn engine(&self, dorm: &DormId) -> std::io::Result<Arc<Engine>> {
        self.tenants.get_or_create(dorm)
    }

    fn scope(&self, dorm: Option<&DormId>) -> Vec<DormId> {
        match dorm {
            Some(d) => vec![d.clone()],
            None => self.tenants.known_dorms(),
        }
    }

    /// Status breakdown for one dormitory. An unknown dormitory reads as
    /// empty rather than an error.
    pub async fn occupancy_stats(&self, dorm: &DormId) -> OccupancyStats {
        match self.tenants.get_or_create(dorm) {
            Ok(engine) => engine.occupancy_stats().await,
            Err(_) => OccupancyStats::compute(0, 0, 0),
        }
    }

    /// Daily boundary pass over one dormitory (or all of them), using the
    /// caller's clock so the job and its tests agree on what "today" is.
    pub async fn daily_status_changes(&self, dorm: Option<&DormId>, now: Ms) -> DailyReport {
        let mut report = DailyReport::default();
        for d in self.scope(dorm) {
            let Ok(engine) = self.tenants.get_or_create(&d) else {
                continue;
            };
            let partial = engine.daily_status_changes(now).await;
            report.check_ins.extend(partial.check_ins);
            report.check_outs.extend(partial.check_outs);
        }
        report
    }

    /// Convenience for the scheduler: daily pass at the current time.
    pub async fn daily_status_changes_now(&self, dorm: Option<&DormId>) -> DailyReport {
        self.daily_status_changes(dorm, now_ms()).await
    }
}
