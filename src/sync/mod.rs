//! Reconciliation engine: matching, diffing and change application.
//!
//! The reconcilers ([`cluster`], [`vm`], [`interface`]) are pure functions
//! over inventory snapshots that emit [`Decision`]s. [`ChangeApplicator`]
//! executes them and [`SyncEngine`] ties one run together.

pub mod applicator;
pub mod change;
pub mod cluster;
pub mod decision;
pub mod engine;
pub mod interface;
pub mod resolver;
pub mod vm;

pub use applicator::{ChangeApplicator, SyncStats};
pub use change::ChangeDetection;
pub use cluster::reconcile_clusters;
pub use decision::Decision;
pub use engine::{SyncEngine, SyncSettings};
pub use interface::reconcile_interfaces;
pub use resolver::IdentityResolver;
pub use vm::reconcile_vms;
