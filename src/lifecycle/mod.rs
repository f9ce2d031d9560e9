//! Reconciliation of orphaned Metas.
//!
//! A Target that is dropped or fails before `close` leaves its Meta LOCKED
//! for good; nothing in the store retries it. This module gives an operator
//! the primitives to list such Metas and retire them.
//!
//! # Example
//!
//! ```rust,ignore
//! use feedstore::lifecycle::{reconcile, OrphanPolicy};
//!
//! // Retire anything still LOCKED an hour after creation.
//! let stats = reconcile(store.meta_service(), &OrphanPolicy::older_than_ms(3_600_000))?;
//! println!("{}", stats.summary());
//! ```

mod orphans;
mod stats;

pub use orphans::{abandon_orphan, find_orphans, reconcile, OrphanPolicy};
pub use stats::ReconcileStats;
