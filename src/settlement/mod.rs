pub mod engine;
pub mod snapshot;

pub use engine::{settle, SettleOutcome};
pub use snapshot::{capture_snapshot, SnapshotOutcome};
