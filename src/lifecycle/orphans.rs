use std::time::Instant;

use crate::core::{Error, Result};
use crate::meta::{Meta, MetaId, MetaService, Status};

use super::stats::ReconcileStats;

/// Which LOCKED Metas count as orphaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrphanPolicy {
    /// Minimum age since creation, in milliseconds.
    pub min_age_ms: u64,
}

impl OrphanPolicy {
    pub fn older_than_ms(min_age_ms: u64) -> Self {
        Self { min_age_ms }
    }

    fn cutoff_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.min_age_ms)
    }
}

/// LOCKED Metas created at or before `now - policy.min_age_ms`, in id order.
pub fn find_orphans(service: &MetaService, policy: &OrphanPolicy) -> Vec<Meta> {
    let cutoff = policy.cutoff_ms(service.clock().now_ms());
    service.find(&|meta: &Meta| meta.status == Status::Locked && meta.created_at_ms <= cutoff)
}

/// Moves orphan `id` from LOCKED to DELETED.
pub fn abandon_orphan(service: &MetaService, id: MetaId) -> Result<Meta> {
    let meta = service.get(id)?;
    let meta = service.update_status(&meta, Status::Locked, Status::Deleted)?;
    log::warn!(
        "abandoned orphaned meta {} ({}/{})",
        meta.id,
        meta.feed_name,
        meta.type_name
    );
    Ok(meta)
}

/// Abandons every orphan selected by `policy`.
///
/// A Meta that leaves LOCKED between the scan and its update (its Target
/// closed late) is skipped. Other per-Meta failures are collected in the
/// returned stats.
pub fn reconcile(service: &MetaService, policy: &OrphanPolicy) -> Result<ReconcileStats> {
    let start = Instant::now();
    let mut stats = ReconcileStats::new();
    let orphans = find_orphans(service, policy);
    stats.scanned_count = orphans.len();
    for meta in orphans {
        match abandon_orphan(service, meta.id) {
            Ok(meta) => stats.record_abandoned(meta.id),
            Err(Error::StatusConflict { .. }) => stats.skipped_count += 1,
            Err(err) => stats.record_error(format!("meta {}: {err}", meta.id)),
        }
    }
    stats.duration = start.elapsed();
    log::info!("orphan reconcile: {}", stats.summary());
    Ok(stats)
}
