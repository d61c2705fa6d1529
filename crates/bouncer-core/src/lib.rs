//! Join request reconciliation for the bouncer daemon.
//!
//! - **Cursor**: update stream position, never moves backwards
//! - **Queue**: pending join requests keyed by (group, identity)
//! - **Snapshot**: verified identity snapshot with stale fallback
//! - **Reconciler**: one pull, merge and evaluate cycle over the queue
//! - **Revocation**: remove an identity from every monitored group
//! - **Scheduler**: periodic, non-overlapping cycle triggering
pub mod cursor;
pub mod queue;
pub mod reconciler;
pub mod revocation;
pub mod scheduler;
pub mod snapshot;

pub use reconciler::{CycleReport, Reconciler, ReconcilerConfig};
pub use revocation::{RevocationFailure, RevocationHandler, RevocationReport};
pub use scheduler::{CycleScheduler, TriggerOutcome};
