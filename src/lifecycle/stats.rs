//! Statistics for orphan reconciliation.

use std::time::Duration;

use crate::meta::MetaId;

/// Statistics from one reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileStats {
    /// LOCKED Metas old enough to be considered.
    pub scanned_count: usize,

    /// Metas moved to DELETED.
    pub abandoned: Vec<MetaId>,

    /// Metas that changed status under us and were left alone.
    pub skipped_count: usize,

    /// Errors encountered during the run.
    pub errors: Vec<String>,

    /// Time taken for the run.
    pub duration: Duration,
}

impl ReconcileStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_abandoned(&mut self, id: MetaId) {
        self.abandoned.push(id);
    }

    pub fn record_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Scanned: {}, Abandoned: {}, Skipped: {}, Errors: {}, Duration: {:?}",
            self.scanned_count,
            self.abandoned.len(),
            self.skipped_count,
            self.errors.len(),
            self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let mut stats = ReconcileStats::new();
        stats.scanned_count = 3;
        stats.record_abandoned(7);
        stats.record_error("meta 9: catalog write failed".to_string());
        assert!(stats.has_errors());

        let summary = stats.summary();
        assert!(summary.contains("Scanned: 3"));
        assert!(summary.contains("Abandoned: 1"));
        assert!(summary.contains("Errors: 1"));
    }
}
