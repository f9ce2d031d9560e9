//! The Meta catalog: identity, lineage and lifecycle status of every
//! logical stream.
//!
//! ```text
//! create ──> LOCKED ──(target close)──> UNLOCKED ──(delete)──> DELETED
//!               └──────────(abort)──────────────────────────────┘
//! ```

mod criteria;
mod model;
mod service;

pub use criteria::{Condition, Criteria, MetaField, MetaFilter, TermValue};
pub use model::{Meta, MetaId, MetaProperties, Status};
pub use service::MetaService;
