//! End-to-end service tests: several dormitories, drift correction across
//! process restarts, and the daily boundary pass driven through the
//! RoomStatusService contract the scheduler uses.

use std::path::PathBuf;
use std::sync::Arc;

use ulid::Ulid;

use dormat::model::{DAY_MS, RoomStatus, SEMESTER_MS};
use dormat::service::RoomStatusService;
use dormat::tenant::{DormId, TenantManager};

fn test_data_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("dormat_int_test").join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn service(dir: PathBuf) -> RoomStatusService {
    RoomStatusService::new(Arc::new(TenantManager::new(dir, 10_000)))
}

#[tokio::test]
async fn global_sweep_corrects_drift_across_dorms() {
    let dir = test_data_dir("global_sweep");
    let svc = service(dir);

    let north = DormId::new("north").unwrap();
    let south = DormId::new("south").unwrap();

    let tenants = [(&north, Ulid::new()), (&south, Ulid::new())];
    for (dorm, rid) in &tenants {
        let engine = svc_engine(&svc, dorm);
        engine.create_room(*rid, "1".into(), 1).await.unwrap();
        engine
            .set_room_status(*rid, RoomStatus::Occupied)
            .await
            .unwrap();
    }

    let drifted = svc.incorrectly_occupied_rooms(None).await;
    assert_eq!(drifted.len(), 2);

    let changed = svc.update_all_rooms().await;
    assert_eq!(changed.len(), 2);
    assert_eq!(changed[&north], vec![tenants[0].1]);
    assert_eq!(changed[&south], vec![tenants[1].1]);
    assert!(svc.incorrectly_occupied_rooms(None).await.is_empty());
}

#[tokio::test]
async fn sweep_covers_dorms_from_previous_process_life() {
    let dir = test_data_dir("restart");
    let dorm = DormId::new("haus1").unwrap();
    let rid = Ulid::new();

    // First life: leave a drifted room behind in the WAL.
    {
        let svc = service(dir.clone());
        let engine = svc_engine(&svc, &dorm);
        engine.create_room(rid, "1".into(), 2).await.unwrap();
        engine
            .create_booking(Ulid::new(), rid, Ulid::new(), 0, 1)
            .await
            .unwrap();
        engine
            .set_room_status(rid, RoomStatus::Occupied)
            .await
            .unwrap();
    }

    // Second life: nothing loaded yet, the sweep still finds the dorm.
    let svc = service(dir);
    let changed = svc.update_all_rooms().await;
    assert_eq!(changed[&dorm], vec![rid]);
    assert!(!svc.update_room_status(&dorm, rid).await);

    let stats = svc.occupancy_stats(&dorm).await;
    assert_eq!(stats.total_rooms, 1);
    assert_eq!(stats.available, 1);
    assert_eq!(stats.occupancy_rate, 0.0);
}

#[tokio::test]
async fn daily_pass_through_service() {
    let dir = test_data_dir("daily");
    let svc = service(dir);
    let dorm = DormId::new("haus1").unwrap();
    let engine = svc_engine(&svc, &dorm);

    let now = 200 * DAY_MS + 1_000;
    let (ending, fresh) = (Ulid::new(), Ulid::new());
    engine.create_room(ending, "1".into(), 1).await.unwrap();
    engine.create_room(fresh, "2".into(), 1).await.unwrap();

    // One stay ends today, one started long ago and keeps running.
    engine
        .create_booking(Ulid::new(), ending, Ulid::new(), now - SEMESTER_MS, 1)
        .await
        .unwrap();
    engine
        .create_booking(Ulid::new(), fresh, Ulid::new(), now - DAY_MS, 2)
        .await
        .unwrap();

    let report = svc.daily_status_changes(Some(&dorm), now).await;
    assert_eq!(report.check_outs, vec![ending]);
    assert!(report.check_ins.is_empty());

    let stats = svc.occupancy_stats(&dorm).await;
    assert_eq!(stats.occupied, 1);
    assert_eq!(stats.available, 1);
    assert_eq!(stats.occupancy_rate, 50.0);

    // Re-running the pass is a no-op: the booking is already archived.
    let again = svc.daily_status_changes(Some(&dorm), now).await;
    assert!(again.check_outs.is_empty() && again.check_ins.is_empty());
}

#[tokio::test]
async fn unknown_room_and_empty_dorm_read_as_negative() {
    let dir = test_data_dir("unknown");
    let svc = service(dir);
    let dorm = DormId::new("empty").unwrap();

    assert!(!svc.update_room_status(&dorm, Ulid::new()).await);
    let stats = svc.occupancy_stats(&dorm).await;
    assert_eq!(stats.total_rooms, 0);
    assert_eq!(stats.occupancy_rate, 0.0);
    assert!(svc.update_all_rooms_for_tenant(&dorm).await.is_empty());
}

fn svc_engine(
    svc: &RoomStatusService,
    dorm: &DormId,
) -> Arc<dormat::engine::Engine> {
    // The service owns the tenant manager; tests reach the engine the same
    // way the surrounding CRUD layer would.
    svc.engine(dorm).unwrap()
}
