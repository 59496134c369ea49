//! The four pipeline stages and their result shapes.
//!
//! Each stage is a sequential loop over a batch. Per-item failures are
//! recorded in the stage report and never unwind the loop; a stage handed
//! zero inputs still returns a well-formed empty report. Item order in the
//! report always matches input order.

use crate::advisory::Advisor;
use crate::chunking::chunk_policy;
use crate::embedding::EmbeddingStore;
use crate::extract::DocumentExtractor;
use crate::metrics::PipelineMetrics;
use crate::store::StoreService;
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The four stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Read documents and extract structured fields.
    Extract,
    /// Chunk new policies and refit the vocabulary.
    Embed,
    /// Re-chunk, embed, and persist chunks.
    Store,
    /// Derive and apply contextual metadata.
    Contextualize,
}

impl StageKind {
    /// All stages in execution order.
    pub const ALL: [Self; 4] = [Self::Extract, Self::Embed, Self::Store, Self::Contextualize];

    /// Stable stage name used in reports and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Embed => "embed",
            Self::Store => "store",
            Self::Contextualize => "contextualize",
        }
    }
}

/// Outcome of one item within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Item processed fully.
    Success,
    /// Item failed; the rest of the batch continued.
    Error,
}

/// Per-item entry in a stage report.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    /// Policy number for successes, input path for extraction failures.
    pub identifier: String,
    /// Item outcome.
    pub status: ItemStatus,
    /// Stage-specific payload for successes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    /// Failure description for errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemResult {
    fn success(identifier: impl Into<String>, detail: serde_json::Value) -> Self {
        Self {
            identifier: identifier.into(),
            status: ItemStatus::Success,
            detail: Some(detail),
            error: None,
        }
    }

    fn error(identifier: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            status: ItemStatus::Error,
            detail: None,
            error: Some(error.into()),
        }
    }
}

/// Result of one stage over a batch.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    /// `completed` even with per-item failures; stages only abort on errors
    /// affecting the whole batch.
    pub status: String,
    /// One entry per input item, in input order.
    pub results: Vec<ItemResult>,
    /// Number of entries with success status.
    pub successful_count: usize,
    /// Number of input items.
    pub total_count: usize,
}

impl StageReport {
    fn from_results(results: Vec<ItemResult>) -> Self {
        let successful_count = results
            .iter()
            .filter(|item| item.status == ItemStatus::Success)
            .count();
        Self {
            status: "completed".to_string(),
            successful_count,
            total_count: results.len(),
            results,
        }
    }

    /// Identifiers of successful items, preserving report order. This is the
    /// only data handed to the next stage.
    pub fn successful_identifiers(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|item| item.status == ItemStatus::Success)
            .map(|item| item.identifier.clone())
            .collect()
    }
}

/// Shared collaborators handed to every stage.
pub struct PipelineContext {
    /// Policy and chunk persistence.
    pub store: StoreService,
    /// Vocabulary and embedding state.
    pub embeddings: Arc<EmbeddingStore>,
    /// Extraction collaborator.
    pub extractor: Box<dyn DocumentExtractor>,
    /// Advisory collaborator for the contextualize stage.
    pub advisor: Box<dyn Advisor>,
    /// Pipeline counters.
    pub metrics: Arc<PipelineMetrics>,
    /// Raw-text segment length in characters.
    pub raw_chunk_size: usize,
}

/// Progress callback invoked as `(processed, total)` while a stage iterates.
pub type ProgressFn<'a> = &'a (dyn Fn(usize, usize) + Send + Sync);

/// Stage 1: read each document, extract fields, and upsert the policy.
///
/// An item succeeds only when extraction yields a policy number; the policy
/// number becomes the item identifier for the rest of the chain. Failed items
/// are identified by their input path.
pub async fn extract_stage(
    ctx: &PipelineContext,
    documents: &[PathBuf],
    progress: ProgressFn<'_>,
) -> StageReport {
    let total = documents.len();
    let mut results = Vec::with_capacity(total);
    for (index, path) in documents.iter().enumerate() {
        results.push(extract_one(ctx, path).await);
        progress(index + 1, total);
    }
    let report = StageReport::from_results(results);
    tracing::info!(
        successful = report.successful_count,
        total = report.total_count,
        "Extract stage finished"
    );
    report
}

async fn extract_one(ctx: &PipelineContext, path: &Path) -> ItemResult {
    let display_path = path.display().to_string();
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| display_path.clone());

    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(path = %display_path, %error, "Could not read document");
            return ItemResult::error(display_path, format!("read failed: {error}"));
        }
    };
    let fields = match ctx.extractor.process_document(&bytes, &filename).await {
        Ok(fields) => fields,
        Err(error) => {
            tracing::warn!(path = %display_path, %error, "Extraction failed");
            return ItemResult::error(display_path, error.to_string());
        }
    };
    let Some(policy_number) = fields
        .policy_number
        .clone()
        .filter(|number| !number.trim().is_empty())
    else {
        return ItemResult::error(display_path, "extraction returned no policy number");
    };

    let raw_text = fields.effective_raw_text();
    let record = ctx
        .store
        .upsert_policy(&policy_number, &filename, fields, raw_text)
        .await;
    ctx.metrics.record_extraction();
    ItemResult::success(policy_number, json!({"policy_id": record.id}))
}

/// Stage 2: chunk each policy and refit the vocabulary over all chunk texts,
/// stored and new, so every embedding in stage 3 shares one term space.
pub async fn embed_stage(
    ctx: &PipelineContext,
    identifiers: &[String],
    progress: ProgressFn<'_>,
) -> StageReport {
    let total = identifiers.len();
    let mut results = Vec::with_capacity(total);
    let mut new_texts: Vec<String> = Vec::new();

    for (index, policy_number) in identifiers.iter().enumerate() {
        match ctx.store.policy_by_number(policy_number).await {
            Ok(policy) => {
                let drafts = chunk_policy(
                    &policy.fields,
                    Some(&policy.raw_text),
                    policy.id,
                    &policy.source_filename,
                    ctx.raw_chunk_size,
                );
                new_texts.extend(drafts.iter().map(|draft| draft.chunk_text.clone()));
                results.push(ItemResult::success(
                    policy_number.clone(),
                    json!({"chunk_count": drafts.len()}),
                ));
            }
            Err(error) => results.push(ItemResult::error(policy_number.clone(), error.to_string())),
        }
        progress(index + 1, total);
    }

    if !new_texts.is_empty() {
        let mut corpus = ctx.store.chunk_texts().await;
        corpus.extend(new_texts);
        ctx.embeddings.fit(&corpus);
    }
    StageReport::from_results(results)
}

/// Stage 3: re-chunk, embed under the current vocabulary, and persist.
///
/// Chunks commit one at a time; a failure partway through an item leaves its
/// earlier chunks stored, which re-ingestion tolerates.
pub async fn store_stage(
    ctx: &PipelineContext,
    identifiers: &[String],
    progress: ProgressFn<'_>,
) -> StageReport {
    let total = identifiers.len();
    let mut results = Vec::with_capacity(total);
    for (index, policy_number) in identifiers.iter().enumerate() {
        match ctx.store.policy_by_number(policy_number).await {
            Ok(policy) => {
                let drafts = chunk_policy(
                    &policy.fields,
                    Some(&policy.raw_text),
                    policy.id,
                    &policy.source_filename,
                    ctx.raw_chunk_size,
                );
                let stored = drafts.len();
                for draft in drafts {
                    let embedding = ctx.embeddings.embed(&draft.chunk_text);
                    ctx.store.insert_chunk(draft, embedding).await;
                }
                ctx.metrics.record_chunks(stored as u64);
                results.push(ItemResult::success(
                    policy_number.clone(),
                    json!({"chunks_stored": stored}),
                ));
            }
            Err(error) => results.push(ItemResult::error(policy_number.clone(), error.to_string())),
        }
        progress(index + 1, total);
    }
    StageReport::from_results(results)
}

/// Stage 4: derive contextual metadata and apply it to each policy.
pub async fn contextualize_stage(
    ctx: &PipelineContext,
    identifiers: &[String],
    invoice_map: &HashMap<String, PathBuf>,
    progress: ProgressFn<'_>,
) -> StageReport {
    let total = identifiers.len();
    let mut results = Vec::with_capacity(total);
    for (index, policy_number) in identifiers.iter().enumerate() {
        let outcome = match ctx.store.policy_by_number(policy_number).await {
            Ok(policy) => {
                let invoice = invoice_map.get(policy_number).map(PathBuf::as_path);
                let update = ctx.advisor.derive_context(&policy, invoice).await;
                let detail = json!({
                    "renewal_date": update.renewal_date,
                    "roof_age_years": update.roof_age_years,
                });
                match ctx.store.update_context(policy_number, update).await {
                    Ok(_) => ItemResult::success(policy_number.clone(), detail),
                    Err(error) => ItemResult::error(policy_number.clone(), error.to_string()),
                }
            }
            Err(error) => ItemResult::error(policy_number.clone(), error.to_string()),
        };
        results.push(outcome);
        progress(index + 1, total);
    }
    StageReport::from_results(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::DefaultAdvisor;
    use crate::extract::LocalExtractor;

    fn context() -> PipelineContext {
        PipelineContext {
            store: StoreService::new(),
            embeddings: Arc::new(EmbeddingStore::new(1000)),
            extractor: Box::new(LocalExtractor::new()),
            advisor: Box::new(DefaultAdvisor::new()),
            metrics: Arc::new(PipelineMetrics::default()),
            raw_chunk_size: 1000,
        }
    }

    #[tokio::test]
    async fn zero_input_stage_returns_empty_report() {
        let ctx = context();
        let report = extract_stage(&ctx, &[], &|_, _| {}).await;
        assert_eq!(report.status, "completed");
        assert_eq!(report.total_count, 0);
        assert_eq!(report.successful_count, 0);
        assert!(report.results.is_empty());
        assert!(report.successful_identifiers().is_empty());
    }

    #[tokio::test]
    async fn unreadable_document_fails_only_its_item() {
        let dir = tempfile::tempdir().expect("tempdir");
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "policy text").expect("write");
        let missing = dir.path().join("missing.txt");

        let ctx = context();
        let report = extract_stage(&ctx, &[missing.clone(), good], &|_, _| {}).await;
        assert_eq!(report.total_count, 2);
        assert_eq!(report.successful_count, 1);
        assert_eq!(report.results[0].status, ItemStatus::Error);
        assert_eq!(report.results[0].identifier, missing.display().to_string());
        assert_eq!(report.results[1].status, ItemStatus::Success);
        assert_eq!(report.successful_identifiers(), vec!["LOCAL-good"]);
    }

    #[tokio::test]
    async fn embed_stage_fits_vocabulary_over_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = dir.path().join("policy.txt");
        std::fs::write(&doc, "dwelling coverage limit applies per occurrence").expect("write");

        let ctx = context();
        let extracted = extract_stage(&ctx, &[doc], &|_, _| {}).await;
        let identifiers = extracted.successful_identifiers();
        let report = embed_stage(&ctx, &identifiers, &|_, _| {}).await;
        assert_eq!(report.successful_count, 1);
        assert!(ctx.embeddings.vocab_size() > 0);
    }

    #[tokio::test]
    async fn store_stage_persists_embedded_chunks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let doc = dir.path().join("policy.txt");
        std::fs::write(&doc, "dwelling coverage limit applies per occurrence").expect("write");

        let ctx = context();
        let identifiers = extract_stage(&ctx, &[doc], &|_, _| {})
            .await
            .successful_identifiers();
        embed_stage(&ctx, &identifiers, &|_, _| {}).await;
        let report = store_stage(&ctx, &identifiers, &|_, _| {}).await;
        assert_eq!(report.successful_count, 1);

        let policy = ctx
            .store
            .policy_by_number(&identifiers[0])
            .await
            .expect("policy");
        let chunks = ctx.store.chunks_for_policy(policy.id).await;
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|chunk| !chunk.embedding.is_empty()));
    }

    #[tokio::test]
    async fn unknown_identifier_is_an_item_error_not_a_stage_error() {
        let ctx = context();
        let report = store_stage(&ctx, &["GHOST".to_string()], &|_, _| {}).await;
        assert_eq!(report.status, "completed");
        assert_eq!(report.successful_count, 0);
        assert_eq!(report.results[0].status, ItemStatus::Error);
    }

    #[tokio::test]
    async fn contextualize_stage_applies_advisor_output() {
        let ctx = context();
        let fields = crate::extract::PolicyFields {
            policy_number: Some("P1".into()),
            expiration_date: Some("2026-03-01".into()),
            ..Default::default()
        };
        ctx.store
            .upsert_policy("P1", "p1.pdf", fields, String::new())
            .await;

        let report =
            contextualize_stage(&ctx, &["P1".to_string()], &HashMap::new(), &|_, _| {}).await;
        assert_eq!(report.successful_count, 1);
        let policy = ctx.store.policy_by_number("P1").await.expect("policy");
        assert_eq!(policy.context.renewal_date.as_deref(), Some("2026-03-01"));
        assert_eq!(policy.context.features, vec!["monitored_alarm".to_string()]);
    }

    #[tokio::test]
    async fn progress_reports_every_item() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, "text a").expect("write");
        std::fs::write(&b, "text b").expect("write");

        let ctx = context();
        let seen = std::sync::Mutex::new(Vec::new());
        extract_stage(&ctx, &[a, b], &|current, total| {
            seen.lock().expect("lock").push((current, total));
        })
        .await;
        assert_eq!(*seen.lock().expect("lock"), vec![(1, 2), (2, 2)]);
    }
}
