// ABOUTME: Seam between health monitoring and rollback.
// ABOUTME: The monitor only needs "roll back now"; tests substitute a counting fake.

use async_trait::async_trait;

use super::error::RollbackError;

#[async_trait]
pub trait RollbackTrigger: Send + Sync {
    /// Roll back to the newest verified checkpoint.
    async fn trigger_rollback(&self, reason: &str) -> Result<(), RollbackError>;
}
