use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::engine::Engine;
use crate::limits::*;
use crate::notify::StatusFeed;
use crate::scheduler;

/// Dormitory identity: a validated, typed value object threaded through
/// every service call. Also the WAL file stem, so the charset is strict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DormId(String);

impl DormId {
    pub fn new(name: &str) -> io::Result<Self> {
        if name.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "empty dormitory name",
            ));
        }
        if name.len() > MAX_TENANT_NAME_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "dormitory name too long",
            ));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "dormitory name must be alphanumeric, '_' or '-'",
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Manages per-dormitory engines. Each dormitory gets its own Engine, WAL
/// file and compactor task, created lazily on first use.
pub struct TenantManager {
    engines: DashMap<DormId, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
}

impl TenantManager {
    pub fn new(data_dir: PathBuf, compact_threshold: u64) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
        }
    }

    /// Get or lazily create the engine for a dormitory.
    pub fn get_or_create(&self, dorm: &DormId) -> io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(dorm) {
            return Ok(engine.value().clone());
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(io::Error::other("too many dormitories"));
        }

        let wal_path = self.data_dir.join(format!("{dorm}.wal"));
        let feed = Arc::new(StatusFeed::new());
        let engine = Arc::new(Engine::new(wal_path, feed)?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            scheduler::run_compactor(compactor_engine, threshold).await;
        });

        self.engines.insert(dorm.clone(), engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        Ok(engine)
    }

    /// Engine for a dormitory, without creating one.
    pub fn get(&self, dorm: &DormId) -> Option<Arc<Engine>> {
        self.engines.get(dorm).map(|e| e.value().clone())
    }

    /// Every dormitory known to this manager: loaded engines plus WAL files
    /// on disk not yet loaded. Sweeps use this so a restart doesn't shrink
    /// their coverage to whichever dorms happened to be touched first.
    pub fn known_dorms(&self) -> Vec<DormId> {
        let mut dorms: Vec<DormId> = self.engines.iter().map(|e| e.key().clone()).collect();
        if let Ok(entries) = std::fs::read_dir(&self.data_dir) {
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                let Some(stem) = name.strip_suffix(".wal") else {
                    continue;
                };
                if let Ok(dorm) = DormId::new(stem)
                    && !dorms.contains(&dorm)
                {
                    dorms.push(dorm);
                }
            }
        }
        dorms.sort();
        dorms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("dormat_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn dorm_id_validation() {
        assert!(DormId::new("haus-nord_2").is_ok());
        assert!(DormId::new("").is_err());
        assert!(DormId::new("../evil").is_err());
        assert!(DormId::new("a b").is_err());
        assert!(DormId::new(&"x".repeat(MAX_TENANT_NAME_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let dir = test_data_dir("isolation");
        let tm = TenantManager::new(dir, 1000);

        let a = DormId::new("dorm_a").unwrap();
        let b = DormId::new("dorm_b").unwrap();
        let eng_a = tm.get_or_create(&a).unwrap();
        let eng_b = tm.get_or_create(&b).unwrap();

        // Same room id in both dormitories; bookings stay apart.
        let rid = Ulid::new();
        eng_a.create_room(rid, "101".into(), 1).await.unwrap();
        eng_b.create_room(rid, "101".into(), 1).await.unwrap();
        eng_a
            .create_booking(Ulid::new(), rid, Ulid::new(), 0, 1)
            .await
            .unwrap();

        assert_eq!(eng_a.room_info(rid).await.unwrap().occupancy, 1);
        assert_eq!(eng_b.room_info(rid).await.unwrap().occupancy, 0);
    }

    #[tokio::test]
    async fn tenant_lazy_creation_and_reuse() {
        let dir = test_data_dir("lazy");
        let tm = TenantManager::new(dir.clone(), 1000);

        assert!(fs::read_dir(&dir).unwrap().next().is_none());

        let dorm = DormId::new("haus1").unwrap();
        let eng1 = tm.get_or_create(&dorm).unwrap();
        assert!(dir.join("haus1.wal").exists());

        let eng2 = tm.get_or_create(&dorm).unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn known_dorms_sees_unloaded_wal_files() {
        let dir = test_data_dir("known");
        let tm = TenantManager::new(dir.clone(), 1000);

        let dorm = DormId::new("haus1").unwrap();
        tm.get_or_create(&dorm).unwrap();
        // A dorm from a previous process life: WAL on disk, engine not loaded.
        fs::write(dir.join("haus2.wal"), b"").unwrap();
        fs::write(dir.join("notes.txt"), b"ignored").unwrap();

        let dorms = tm.known_dorms();
        assert_eq!(
            dorms,
            vec![DormId::new("haus1").unwrap(), DormId::new("haus2").unwrap()]
        );
    }
}
