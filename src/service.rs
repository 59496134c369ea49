//! Service facade coordinating the pipeline, store, and retrieval engine.
//!
//! The service owns long-lived handles to the store, the embedding store,
//! the task tracker, and the metrics registry so the HTTP surface and any
//! embedding caller share the same components. Construct it once near
//! process start and share it through an `Arc`.

use crate::advisory::DefaultAdvisor;
use crate::config::get_config;
use crate::embedding::EmbeddingStore;
use crate::extract::get_extractor;
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::pipeline::{Orchestrator, PipelineContext, StartedChain};
use crate::retrieval::{PolicyAnswer, QueryError, RetrievalService};
use crate::store::{PolicySummary, StoreError, StoreService};
use crate::tasks::{TaskSnapshot, TaskTracker};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Abstraction over the processing service used by external surfaces.
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Register and dispatch a processing chain over the given documents.
    fn start_chain(
        &self,
        documents: Vec<PathBuf>,
        invoice_map: HashMap<String, PathBuf>,
    ) -> StartedChain;

    /// Current snapshot of a pipeline task, if it exists.
    fn task_status(&self, task_id: &str) -> Option<TaskSnapshot>;

    /// Answer a free-text question scoped to one policy.
    async fn query(&self, query: &str, policy_number: &str) -> Result<PolicyAnswer, QueryError>;

    /// Compact summaries of all stored policies.
    async fn list_policies(&self) -> Vec<PolicySummary>;

    /// Remove a policy and its chunks.
    async fn delete_policy(&self, policy_number: &str) -> Result<(), StoreError>;

    /// Maintenance: drop all of a policy's chunks ahead of re-ingestion.
    async fn clear_policy_chunks(&self, policy_number: &str) -> Result<usize, StoreError>;

    /// Maintenance: drop duplicate chunks left behind by partial re-runs.
    async fn remove_duplicate_chunks(&self, policy_number: &str) -> Result<usize, StoreError>;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Concrete service wiring the default collaborators together.
pub struct PolicyService {
    store: StoreService,
    retrieval: RetrievalService,
    orchestrator: Orchestrator,
    tracker: Arc<TaskTracker>,
    metrics: Arc<PipelineMetrics>,
}

impl PolicyService {
    /// Build the service from the process configuration.
    pub fn new() -> Self {
        let config = get_config();
        let store = StoreService::new();
        let embeddings = Arc::new(EmbeddingStore::new(config.vocab_max_features));
        let metrics = Arc::new(PipelineMetrics::default());
        let tracker = Arc::new(TaskTracker::new());

        let ctx = Arc::new(PipelineContext {
            store: store.clone(),
            embeddings: Arc::clone(&embeddings),
            extractor: get_extractor(),
            advisor: Box::new(DefaultAdvisor::new()),
            metrics: Arc::clone(&metrics),
            raw_chunk_size: config.raw_text_chunk_size,
        });
        let orchestrator = Orchestrator::new(ctx, Arc::clone(&tracker));
        let retrieval = RetrievalService::new(store.clone(), embeddings);

        Self {
            store,
            retrieval,
            orchestrator,
            tracker,
            metrics,
        }
    }
}

impl Default for PolicyService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PolicyApi for PolicyService {
    fn start_chain(
        &self,
        documents: Vec<PathBuf>,
        invoice_map: HashMap<String, PathBuf>,
    ) -> StartedChain {
        self.orchestrator.start(documents, invoice_map)
    }

    fn task_status(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tracker.get(task_id)
    }

    async fn query(&self, query: &str, policy_number: &str) -> Result<PolicyAnswer, QueryError> {
        self.metrics.record_query();
        self.retrieval.answer(query, policy_number).await
    }

    async fn list_policies(&self) -> Vec<PolicySummary> {
        self.store
            .list_policies()
            .await
            .iter()
            .map(PolicySummary::from)
            .collect()
    }

    async fn delete_policy(&self, policy_number: &str) -> Result<(), StoreError> {
        self.store.delete_policy(policy_number).await
    }

    async fn clear_policy_chunks(&self, policy_number: &str) -> Result<usize, StoreError> {
        self.store.clear_policy_chunks(policy_number).await
    }

    async fn remove_duplicate_chunks(&self, policy_number: &str) -> Result<usize, StoreError> {
        self.store.remove_duplicate_chunks(policy_number).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
