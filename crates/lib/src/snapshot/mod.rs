//! Persistence of applied plans.
//!
//! After an apply the nodes that are present on their targets are written
//! to a [`Snapshot`]. The next `plan`/`apply` diffs against it, and `destroy`
//! walks it in reverse to run each node's delete text.

mod storage;
mod types;

pub use storage::SnapshotStore;
pub use types::{Snapshot, SnapshotError};
