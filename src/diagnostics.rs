// ABOUTME: Diagnostics accumulator for non-fatal warnings during control plane commands.
// ABOUTME: Collects warnings that shouldn't fail a command but should be shown to users.

/// Collects non-fatal warnings during an operation.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// A non-fatal warning collected during an operation.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// A checkpoint whose stored payloads fail verification.
    pub fn corrupt_checkpoint(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CorruptCheckpoint,
            message: message.into(),
        }
    }

    /// Leftover staging directories from an interrupted checkpoint.
    pub fn stale_staging(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StaleStaging,
            message: message.into(),
        }
    }

    /// An automatic rollback that was attempted and failed.
    pub fn rollback_failed(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::RollbackFailed,
            message: message.into(),
        }
    }
}

/// Categories of warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Checkpoint excluded from rollback selection.
    CorruptCheckpoint,
    /// Partial checkpoint directory was found and removed.
    StaleStaging,
    /// Health-triggered rollback did not complete.
    RollbackFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_starts_empty() {
        let diag = Diagnostics::default();
        assert!(!diag.has_warnings());
        assert!(diag.warnings().is_empty());
    }

    #[test]
    fn diagnostics_collects_warnings() {
        let mut diag = Diagnostics::default();

        diag.warn(Warning::corrupt_checkpoint("pre-deploy-1 failed verification"));
        diag.warn(Warning::stale_staging("removed 1 partial checkpoint"));

        assert!(diag.has_warnings());
        assert_eq!(diag.warnings().len(), 2);
    }

    #[test]
    fn warning_constructors_set_correct_kind() {
        assert_eq!(
            Warning::corrupt_checkpoint("x").kind,
            WarningKind::CorruptCheckpoint
        );
        assert_eq!(Warning::stale_staging("x").kind, WarningKind::StaleStaging);
        assert_eq!(
            Warning::rollback_failed("x").kind,
            WarningKind::RollbackFailed
        );
    }
}
