use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::core::fsutil::write_json_atomic;
use crate::core::{Clock, Error, Result};

use super::criteria::MetaFilter;
use super::model::{Meta, MetaId, MetaProperties, Status};

/// The catalog of logical streams.
///
/// Owns the id allocator: ids are minted under the catalog lock, so
/// concurrent `create` calls observe a single increasing sequence. When
/// opened with a path, every mutation is written through to a JSON snapshot
/// before it becomes visible to other callers.
pub struct MetaService {
    clock: Arc<dyn Clock>,
    path: Option<PathBuf>,
    state: Mutex<CatalogState>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    next_id: MetaId,
    metas: BTreeMap<MetaId, Meta>,
}

#[derive(Serialize, Deserialize)]
struct CatalogSnapshot {
    next_id: MetaId,
    metas: Vec<Meta>,
}

impl MetaService {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            path: None,
            state: Mutex::new(CatalogState {
                next_id: 1,
                metas: BTreeMap::new(),
            }),
        }
    }

    /// Opens (or starts) a catalog persisted at `path`.
    pub fn open(path: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.into();
        let state = match std::fs::read(&path) {
            Ok(bytes) => {
                let snapshot: CatalogSnapshot = serde_json::from_slice(&bytes)?;
                let highest = snapshot.metas.iter().map(|meta| meta.id).max().unwrap_or(0);
                let metas = snapshot
                    .metas
                    .into_iter()
                    .map(|meta| (meta.id, meta))
                    .collect();
                CatalogState {
                    next_id: snapshot.next_id.max(highest + 1),
                    metas,
                }
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CatalogState {
                next_id: 1,
                metas: BTreeMap::new(),
            },
            Err(err) => return Err(Error::at(&path)(err)),
        };
        log::debug!(
            "opened catalog {} with {} metas",
            path.display(),
            state.metas.len()
        );
        Ok(Self {
            clock,
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Mints a new LOCKED Meta.
    ///
    /// With a parent, the effective time is inherited from the parent (its
    /// effective time, else its creation time). Otherwise it is the supplied
    /// effective time, else the creation time.
    pub fn create(&self, properties: MetaProperties) -> Result<Meta> {
        let mut state = self.lock();
        let created_at_ms = properties
            .created_at_ms
            .unwrap_or_else(|| self.clock.now_ms());
        let effective_at_ms = match properties.parent_meta_id {
            Some(parent_id) => {
                let parent = state
                    .metas
                    .get(&parent_id)
                    .ok_or_else(|| Error::NotFound(format!("parent meta {parent_id}")))?;
                parent.effective_or_created_ms()
            }
            None => properties.effective_at_ms.unwrap_or(created_at_ms),
        };

        let id = state.next_id;
        state.next_id += 1;
        let meta = Meta {
            id,
            feed_name: properties.feed_name,
            type_name: properties.type_name,
            parent_meta_id: properties.parent_meta_id,
            processor_id: properties.processor_id,
            processor_task_id: properties.processor_task_id,
            pipeline_id: properties.pipeline_id,
            created_at_ms,
            effective_at_ms: Some(effective_at_ms),
            status_changed_at_ms: created_at_ms,
            status: Status::Locked,
        };
        state.metas.insert(id, meta.clone());
        if let Err(err) = self.persist(&state) {
            state.metas.remove(&id);
            return Err(err);
        }
        log::debug!("created meta {id} feed={} type={}", meta.feed_name, meta.type_name);
        Ok(meta)
    }

    pub fn get(&self, id: MetaId) -> Result<Meta> {
        self.lock()
            .metas
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("meta {id}")))
    }

    /// Every Meta selected by `filter`, in id order.
    pub fn find<F: MetaFilter + ?Sized>(&self, filter: &F) -> Vec<Meta> {
        self.lock()
            .metas
            .values()
            .filter(|meta| filter.matches(meta))
            .cloned()
            .collect()
    }

    pub fn count<F: MetaFilter + ?Sized>(&self, filter: &F) -> usize {
        self.lock()
            .metas
            .values()
            .filter(|meta| filter.matches(meta))
            .count()
    }

    /// Moves `meta` from `expected` to `new_status`.
    ///
    /// Fails with `StatusConflict` when the stored status is not `expected`
    /// at the time the change is applied.
    pub fn update_status(&self, meta: &Meta, expected: Status, new_status: Status) -> Result<Meta> {
        let mut state = self.lock();
        let now = self.clock.now_ms();
        let current = state
            .metas
            .get(&meta.id)
            .ok_or_else(|| Error::NotFound(format!("meta {}", meta.id)))?
            .clone();
        if current.status != expected {
            return Err(Error::StatusConflict {
                id: meta.id,
                expected,
                actual: current.status,
            });
        }
        if !expected.can_transition_to(new_status) {
            return Err(Error::InvalidTransition {
                id: meta.id,
                from: expected,
                to: new_status,
            });
        }
        let mut updated = current.clone();
        updated.status = new_status;
        updated.status_changed_at_ms = now;
        state.metas.insert(meta.id, updated.clone());
        if let Err(err) = self.persist(&state) {
            state.metas.insert(meta.id, current);
            return Err(err);
        }
        log::debug!("meta {} {} -> {}", meta.id, expected, new_status);
        Ok(updated)
    }

    /// Logically deletes `id`. Returns the number of Metas affected: 0 when
    /// already deleted, or when LOCKED and `require_unlocked` is set.
    pub fn soft_delete(&self, id: MetaId, require_unlocked: bool) -> Result<usize> {
        let mut state = self.lock();
        let now = self.clock.now_ms();
        let previous = state
            .metas
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("meta {id}")))?
            .clone();
        if !Self::deletable(&previous, require_unlocked) {
            return Ok(0);
        }
        let mut deleted = previous.clone();
        deleted.status = Status::Deleted;
        deleted.status_changed_at_ms = now;
        state.metas.insert(id, deleted);
        if let Err(err) = self.persist(&state) {
            state.metas.insert(id, previous);
            return Err(err);
        }
        Ok(1)
    }

    /// Logically deletes every Meta selected by `filter`, under one lock and
    /// one catalog write.
    pub fn soft_delete_matching<F: MetaFilter + ?Sized>(
        &self,
        filter: &F,
        require_unlocked: bool,
    ) -> Result<usize> {
        let mut state = self.lock();
        let now = self.clock.now_ms();
        let targets: Vec<Meta> = state
            .metas
            .values()
            .filter(|meta| filter.matches(meta) && Self::deletable(meta, require_unlocked))
            .cloned()
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }
        for meta in &targets {
            if let Some(entry) = state.metas.get_mut(&meta.id) {
                entry.status = Status::Deleted;
                entry.status_changed_at_ms = now;
            }
        }
        if let Err(err) = self.persist(&state) {
            for meta in targets {
                state.metas.insert(meta.id, meta);
            }
            return Err(err);
        }
        Ok(targets.len())
    }

    fn deletable(meta: &Meta, require_unlocked: bool) -> bool {
        match meta.status {
            Status::Deleted => false,
            Status::Locked => !require_unlocked,
            Status::Unlocked => true,
        }
    }

    fn lock(&self) -> MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, state: &CatalogState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = CatalogSnapshot {
            next_id: state.next_id,
            metas: state.metas.values().cloned().collect(),
        };
        write_json_atomic(path, &snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManualClock;
    use crate::meta::Criteria;
    use tempfile::tempdir;

    fn service() -> (Arc<ManualClock>, MetaService) {
        let clock = Arc::new(ManualClock::new(10_000));
        let service = MetaService::in_memory(clock.clone());
        (clock, service)
    }

    #[test]
    fn create_assigns_increasing_ids_and_locks() {
        let (_, service) = service();
        let a = service.create(MetaProperties::new("F", "Raw Events")).expect("a");
        let b = service.create(MetaProperties::new("F", "Raw Events")).expect("b");
        assert!(b.id > a.id);
        assert_eq!(a.status, Status::Locked);
        assert_eq!(a.effective_at_ms, Some(a.created_at_ms));
    }

    #[test]
    fn child_inherits_parent_effective_time() {
        let (clock, service) = service();
        let parent = service
            .create(MetaProperties::new("F", "Raw Events").effective_at(5))
            .expect("parent");
        clock.advance(1_000);
        let child = service
            .create(MetaProperties::new("F", "Context").parent(parent.id).effective_at(99))
            .expect("child");
        assert_eq!(child.effective_at_ms, Some(5));
        assert_eq!(child.created_at_ms, 11_000);
        assert_eq!(child.parent_meta_id, Some(parent.id));

        let missing = service.create(MetaProperties::new("F", "Context").parent(999));
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[test]
    fn status_guard_rejects_stale_expectation() {
        let (clock, service) = service();
        let meta = service.create(MetaProperties::new("F", "Raw Events")).expect("create");
        clock.advance(7);
        let unlocked = service
            .update_status(&meta, Status::Locked, Status::Unlocked)
            .expect("unlock");
        assert_eq!(unlocked.status, Status::Unlocked);
        assert_eq!(unlocked.status_changed_at_ms, 10_007);

        let again = service.update_status(&meta, Status::Locked, Status::Unlocked);
        assert!(matches!(
            again,
            Err(Error::StatusConflict {
                expected: Status::Locked,
                actual: Status::Unlocked,
                ..
            })
        ));
        let backwards = service.update_status(&meta, Status::Unlocked, Status::Locked);
        assert!(matches!(backwards, Err(Error::InvalidTransition { .. })));
    }

    #[test]
    fn soft_delete_respects_lock() {
        let (_, service) = service();
        let meta = service.create(MetaProperties::new("F", "Raw Events")).expect("create");
        assert_eq!(service.soft_delete(meta.id, true).expect("locked"), 0);
        assert_eq!(service.soft_delete(meta.id, false).expect("forced"), 1);
        assert_eq!(service.get(meta.id).expect("get").status, Status::Deleted);
        assert_eq!(service.soft_delete(meta.id, false).expect("again"), 0);
        assert!(service.soft_delete(404, false).is_err());
    }

    #[test]
    fn bulk_delete_only_touches_matches() {
        let (_, service) = service();
        for feed in ["F", "F", "G"] {
            let meta = service.create(MetaProperties::new(feed, "Raw Events")).expect("create");
            service
                .update_status(&meta, Status::Locked, Status::Unlocked)
                .expect("unlock");
        }
        let deleted = service
            .soft_delete_matching(&Criteria::feed("F"), true)
            .expect("delete");
        assert_eq!(deleted, 2);
        assert_eq!(service.count(&Criteria::status(Status::Deleted)), 2);
        assert_eq!(service.find(&Criteria::feed("G"))[0].status, Status::Unlocked);
    }

    #[test]
    fn persisted_catalog_resumes_allocator() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1));
        let first_id = {
            let service = MetaService::open(&path, clock.clone()).expect("open");
            let meta = service.create(MetaProperties::new("F", "Raw Events")).expect("create");
            service
                .update_status(&meta, Status::Locked, Status::Unlocked)
                .expect("unlock");
            meta.id
        };

        let service = MetaService::open(&path, clock).expect("reopen");
        assert_eq!(service.get(first_id).expect("get").status, Status::Unlocked);
        let next = service.create(MetaProperties::new("F", "Raw Events")).expect("create");
        assert!(next.id > first_id);
    }

    #[test]
    fn concurrent_creates_never_share_an_id() {
        let (_, service) = service();
        let service = Arc::new(service);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            service
                                .create(MetaProperties::new("F", "Raw Events"))
                                .expect("create")
                                .id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut ids: Vec<MetaId> = handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("join"))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
    }
}
