use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing pipeline and query activity.
#[derive(Default)]
pub struct PipelineMetrics {
    documents_extracted: AtomicU64,
    chunks_stored: AtomicU64,
    queries_answered: AtomicU64,
}

impl PipelineMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successfully extracted document.
    pub fn record_extraction(&self) {
        self.documents_extracted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record chunks persisted for one policy.
    pub fn record_chunks(&self, chunk_count: u64) {
        self.chunks_stored.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record one answered query.
    pub fn record_query(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_extracted: self.documents_extracted.load(Ordering::Relaxed),
            chunks_stored: self.chunks_stored.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of pipeline counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents successfully extracted since startup.
    pub documents_extracted: u64,
    /// Total chunk count persisted across all policies.
    pub chunks_stored: u64,
    /// Number of queries answered since startup.
    pub queries_answered: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_documents_and_chunks() {
        let metrics = PipelineMetrics::new();
        metrics.record_extraction();
        metrics.record_extraction();
        metrics.record_chunks(5);
        metrics.record_query();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_extracted, 2);
        assert_eq!(snapshot.chunks_stored, 5);
        assert_eq!(snapshot.queries_answered, 1);
    }

    #[test]
    fn snapshot_starts_at_zero() {
        let metrics = PipelineMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_extracted, 0);
        assert_eq!(snapshot.chunks_stored, 0);
        assert_eq!(snapshot.queries_answered, 0);
    }
}
