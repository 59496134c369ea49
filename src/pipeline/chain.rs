//! Chain orchestration and dispatch.
//!
//! A chain runs the four stages strictly in order. Between stages, only the
//! identifiers of successful items are handed forward; failed items never
//! reach a later stage. Overall task progress treats each stage as an equal
//! quarter of the work.
//!
//! Dispatch prefers the ambient async runtime. When none exists the chain
//! runs synchronously on a one-off runtime in the calling thread, producing
//! the same task record shape; callers can only tell the modes apart by the
//! fallback having already completed when the call returns.

use crate::pipeline::stages::{
    PipelineContext, StageKind, contextualize_stage, embed_stage, extract_stage, store_stage,
};
use crate::tasks::{TaskId, TaskTracker};
use serde_json::json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use walkdir::WalkDir;

/// Task category recorded for pipeline runs.
const TASK_TYPE: &str = "document_processing";

/// Progress units per stage; the chain total is four stages' worth.
const STAGE_UNITS: usize = 100;

/// Handle returned by [`Orchestrator::start`].
#[derive(Debug, Clone)]
pub struct StartedChain {
    /// Task id to poll for progress and results.
    pub task_id: TaskId,
    /// Whether the chain was dispatched to the async runtime. `false` means
    /// the synchronous fallback ran and the task is already terminal.
    pub dispatched: bool,
}

/// Drives chains end to end and records their state.
#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<PipelineContext>,
    tracker: Arc<TaskTracker>,
}

impl Orchestrator {
    /// Build an orchestrator over shared collaborators and a task tracker.
    pub fn new(ctx: Arc<PipelineContext>, tracker: Arc<TaskTracker>) -> Self {
        Self { ctx, tracker }
    }

    /// Register a task and run the chain over the given documents.
    ///
    /// Directory paths are expanded to their contained files before stage 1.
    /// `invoice_map` associates policy numbers with roofing invoice paths for
    /// the contextualize stage.
    pub fn start(
        &self,
        documents: Vec<PathBuf>,
        invoice_map: HashMap<String, PathBuf>,
    ) -> StartedChain {
        let task_id = self.tracker.start(TASK_TYPE);
        let documents = expand_documents(&documents);
        tracing::info!(
            task_id = %task_id,
            documents = documents.len(),
            "Starting processing chain"
        );

        let ctx = Arc::clone(&self.ctx);
        let tracker = Arc::clone(&self.tracker);
        let chain_task_id = task_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    execute_chain(ctx, tracker, chain_task_id, documents, invoice_map).await;
                });
                StartedChain {
                    task_id,
                    dispatched: true,
                }
            }
            Err(_) => {
                tracing::warn!(
                    task_id = %task_id,
                    "No async runtime available; running chain synchronously"
                );
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => {
                        runtime.block_on(execute_chain(
                            ctx,
                            tracker,
                            chain_task_id,
                            documents,
                            invoice_map,
                        ));
                    }
                    Err(error) => {
                        tracker.fail(&chain_task_id, format!("could not build runtime: {error}"));
                    }
                }
                StartedChain {
                    task_id,
                    dispatched: false,
                }
            }
        }
    }

    /// The tracker backing this orchestrator's tasks.
    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }
}

/// Expand directory inputs into their contained files, in path order.
pub fn expand_documents(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut documents = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut contained: Vec<PathBuf> = WalkDir::new(input)
                .sort_by_file_name()
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect();
            tracing::debug!(dir = %input.display(), files = contained.len(), "Expanded directory");
            documents.append(&mut contained);
        } else {
            documents.push(input.clone());
        }
    }
    documents
}

/// Run all four stages, recording progress and the final result.
pub async fn execute_chain(
    ctx: Arc<PipelineContext>,
    tracker: Arc<TaskTracker>,
    task_id: TaskId,
    documents: Vec<PathBuf>,
    invoice_map: HashMap<String, PathBuf>,
) {
    let chain_units = StageKind::ALL.len() * STAGE_UNITS;
    let mut identifiers: Vec<String> = Vec::new();
    let mut stage_reports = serde_json::Map::new();

    for (index, stage) in StageKind::ALL.into_iter().enumerate() {
        let base = index * STAGE_UNITS;
        tracker.record_progress(&task_id, base, chain_units);
        let progress = |current: usize, total: usize| {
            let within = if total == 0 {
                STAGE_UNITS
            } else {
                (current * STAGE_UNITS) / total
            };
            tracker.record_progress(&task_id, base + within, chain_units);
        };

        let report = match stage {
            StageKind::Extract => extract_stage(&ctx, &documents, &progress).await,
            StageKind::Embed => embed_stage(&ctx, &identifiers, &progress).await,
            StageKind::Store => store_stage(&ctx, &identifiers, &progress).await,
            StageKind::Contextualize => {
                contextualize_stage(&ctx, &identifiers, &invoice_map, &progress).await
            }
        };
        tracker.record_progress(&task_id, base + STAGE_UNITS, chain_units);
        tracing::debug!(
            task_id = %task_id,
            stage = stage.name(),
            successful = report.successful_count,
            total = report.total_count,
            "Stage finished"
        );

        identifiers = report.successful_identifiers();
        let value = serde_json::to_value(&report).unwrap_or(serde_json::Value::Null);
        stage_reports.insert(stage.name().to_string(), value);
    }

    tracker.complete(
        &task_id,
        json!({
            "status": "completed",
            "stages": serde_json::Value::Object(stage_reports),
        }),
    );
}
