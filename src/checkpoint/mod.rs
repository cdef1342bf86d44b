// ABOUTME: Point-in-time snapshots of tracked component state.
// ABOUTME: Staged atomically, checksummed per component, verified before any rollback uses them.

mod digest;
mod error;
mod manager;
mod manifest;

pub use digest::{digest_path, sha256_bytes, sha256_dir, sha256_file};
pub use error::{CheckpointError, CheckpointErrorKind};
pub use manager::{CheckpointManager, DriftReport, PruneReport};
pub use manifest::{CheckpointMeta, ComponentCheck, ComponentRecord, ComponentSource, VerificationReport};
