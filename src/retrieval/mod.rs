//! Query answering over stored chunks.
//!
//! `search` ranks one policy's chunks by cosine similarity against the query
//! embedding; `answer` layers the deterministic matcher chain on top of the
//! search results. Retrieval holds no state of its own: each call binds to
//! the current vocabulary snapshot and chunk store, so results are
//! reproducible for equal store and vocabulary states.

mod intents;
mod matchers;
mod tables;

pub use intents::QueryIntent;
pub use matchers::{MatchContext, MatchOutcome, run_matchers};
pub use tables::{scan_coverage_table, scan_deductibles};

use crate::config::get_config;
use crate::embedding::{EmbeddingStore, reconcile};
use crate::store::{ChunkRecord, StoreError, StoreService};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Query norms below this are treated as unrankable.
const ZERO_NORM_THRESHOLD: f32 = 1e-10;

/// Number of top chunks consulted by the answer matcher chain.
const ANSWER_TOP_K: usize = 5;

/// Errors raised while answering a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The scoped policy does not exist.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One ranked chunk with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The stored chunk.
    pub chunk: ChunkRecord,
    /// Cosine similarity against the query, in `[-1, 1]`.
    pub score: f32,
}

/// Outcome of an answer extraction.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyAnswer {
    /// Extracted answer text; absent when no matcher fired.
    pub answer: Option<String>,
    /// Citations of the form `Policy <number> - <source filename>`.
    pub sources: Vec<String>,
    /// Confidence of the path that produced the answer; `0.0` when absent.
    pub confidence: f32,
}

/// Stateless query engine bound to the store and embedding snapshot.
#[derive(Clone)]
pub struct RetrievalService {
    store: StoreService,
    embeddings: Arc<EmbeddingStore>,
}

impl RetrievalService {
    /// Build a retrieval engine over the given store and embeddings.
    pub fn new(store: StoreService, embeddings: Arc<EmbeddingStore>) -> Self {
        Self { store, embeddings }
    }

    /// Rank the scoped policy's chunks by similarity to `query`.
    ///
    /// Scoping is strict: only chunks owned by `policy_number` participate.
    /// `top_k` defaults to the configured value and is clamped to the
    /// configured maximum. A query that embeds to an effectively-zero vector
    /// returns no results.
    pub async fn search(
        &self,
        query: &str,
        policy_number: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>, QueryError> {
        let config = get_config();
        let top_k = top_k
            .unwrap_or(config.search_default_top_k)
            .min(config.search_max_top_k);

        let policy = self.store.policy_by_number(policy_number).await?;
        let chunks = self.store.chunks_for_policy(policy.id).await;

        let query_vector = self.embeddings.embed(query);
        let Some(query_unit) = normalize(&query_vector) else {
            tracing::debug!(policy_number, "Query embedded to a zero vector");
            return Ok(Vec::new());
        };
        let dimension = query_vector.len();

        let mut scored: Vec<ScoredChunk> = chunks
            .into_iter()
            .filter_map(|chunk| {
                let reconciled = reconcile(chunk.embedding.clone(), dimension);
                let chunk_unit = normalize(&reconciled)?;
                let score = dot(&query_unit, &chunk_unit);
                Some(ScoredChunk { chunk, score })
            })
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Answer a free-text question scoped to one policy.
    ///
    /// Runs similarity search, then the matcher chain over the top chunks and
    /// the policy's full raw text. When no matcher fires the answer is absent
    /// with zero confidence and no sources.
    pub async fn answer(&self, query: &str, policy_number: &str) -> Result<PolicyAnswer, QueryError> {
        let policy = self.store.policy_by_number(policy_number).await?;
        let top = self.search(query, policy_number, Some(ANSWER_TOP_K)).await?;
        let chunk_texts: Vec<String> = top
            .iter()
            .map(|scored| scored.chunk.chunk_text.clone())
            .collect();

        let ctx = MatchContext {
            query,
            intent: QueryIntent::detect(query),
            chunk_texts: &chunk_texts,
            raw_text: &policy.raw_text,
        };
        match run_matchers(&ctx) {
            Some(outcome) => {
                tracing::debug!(
                    policy_number,
                    confidence = outcome.confidence,
                    "Answer extracted"
                );
                Ok(PolicyAnswer {
                    answer: Some(outcome.answer),
                    sources: vec![format!(
                        "Policy {} - {}",
                        policy.policy_number, policy.source_filename
                    )],
                    confidence: outcome.confidence,
                })
            }
            None => Ok(PolicyAnswer {
                answer: None,
                sources: Vec::new(),
                confidence: 0.0,
            }),
        }
    }
}

/// L2-normalize, or `None` when the norm is effectively zero.
fn normalize(vector: &[f32]) -> Option<Vec<f32>> {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm < ZERO_NORM_THRESHOLD {
        return None;
    }
    Some(vector.iter().map(|value| value / norm).collect())
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{ChunkDraft, chunk_policy};
    use crate::extract::{CoverageDetail, PolicyFields};

    async fn seed(store: &StoreService, embeddings: &EmbeddingStore) {
        let fields = PolicyFields {
            policy_number: Some("P1".into()),
            total_premium: Some("1710.00".into()),
            coverage_details: vec![CoverageDetail {
                coverage_type: Some("Coverage A - Dwelling".into()),
                limit: Some("250000.00".into()),
            }],
            ..Default::default()
        };
        let raw = fields.effective_raw_text();
        let policy = store.upsert_policy("P1", "p1.pdf", fields.clone(), raw.clone()).await;
        let other = PolicyFields {
            policy_number: Some("P2".into()),
            insurer_name: Some("Other Mutual".into()),
            ..Default::default()
        };
        let other_raw = other.effective_raw_text();
        let policy2 = store
            .upsert_policy("P2", "p2.pdf", other.clone(), other_raw.clone())
            .await;

        let mut corpus: Vec<String> = Vec::new();
        let mut drafts: Vec<ChunkDraft> = Vec::new();
        for (record, fields, raw) in [(&policy, &fields, &raw), (&policy2, &other, &other_raw)] {
            for draft in chunk_policy(fields, Some(raw), record.id, &record.source_filename, 1000) {
                corpus.push(draft.chunk_text.clone());
                drafts.push(draft);
            }
        }
        embeddings.fit(&corpus);
        for draft in drafts {
            let embedding = embeddings.embed(&draft.chunk_text);
            store.insert_chunk(draft, embedding).await;
        }
    }

    #[tokio::test]
    async fn search_never_leaks_across_policies() {
        let store = StoreService::new();
        let embeddings = Arc::new(EmbeddingStore::new(1000));
        seed(&store, &embeddings).await;
        let engine = RetrievalService::new(store.clone(), embeddings);

        let results = engine
            .search("coverage limit", "P1", Some(10))
            .await
            .expect("search");
        assert!(!results.is_empty());
        let p1 = store.policy_by_number("P1").await.expect("policy");
        assert!(results.iter().all(|scored| scored.chunk.policy_id == p1.id));
    }

    #[tokio::test]
    async fn scores_descend_and_respect_top_k() {
        let store = StoreService::new();
        let embeddings = Arc::new(EmbeddingStore::new(1000));
        seed(&store, &embeddings).await;
        let engine = RetrievalService::new(store, embeddings);

        let results = engine
            .search("dwelling coverage limit", "P1", Some(2))
            .await
            .expect("search");
        assert!(results.len() <= 2);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn empty_query_returns_no_results() {
        let store = StoreService::new();
        let embeddings = Arc::new(EmbeddingStore::new(1000));
        seed(&store, &embeddings).await;
        let engine = RetrievalService::new(store, embeddings);

        let results = engine.search("", "P1", None).await.expect("search");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn unknown_policy_is_an_error() {
        let engine = RetrievalService::new(StoreService::new(), Arc::new(EmbeddingStore::new(10)));
        let error = engine.search("anything", "NOPE", None).await.expect_err("missing");
        assert!(matches!(error, QueryError::Store(StoreError::PolicyNotFound(_))));
    }

    #[tokio::test]
    async fn coverage_table_answer_has_field_confidence() {
        let store = StoreService::new();
        let embeddings = Arc::new(EmbeddingStore::new(1000));
        let fields = PolicyFields {
            policy_number: Some("P1".into()),
            ..Default::default()
        };
        let raw = "Coverage Type\nLimit\nCoverage A\n$250,000.00".to_string();
        let policy = store.upsert_policy("P1", "p1.pdf", fields.clone(), raw.clone()).await;
        let mut corpus = Vec::new();
        for draft in chunk_policy(&fields, Some(&raw), policy.id, "p1.pdf", 1000) {
            corpus.push(draft.chunk_text.clone());
            store.insert_chunk(draft, Vec::new()).await;
        }
        embeddings.fit(&corpus);
        let engine = RetrievalService::new(store, embeddings);

        let answer = engine.answer("coverage limits", "P1").await.expect("answer");
        assert_eq!(answer.confidence, 0.9);
        assert!(answer.answer.expect("text").contains("Coverage A: $250,000.00"));
        assert_eq!(answer.sources, vec!["Policy P1 - p1.pdf".to_string()]);
    }

    #[tokio::test]
    async fn unanswerable_query_yields_empty_answer() {
        let store = StoreService::new();
        let embeddings = Arc::new(EmbeddingStore::new(1000));
        seed(&store, &embeddings).await;
        let engine = RetrievalService::new(store, embeddings);

        let answer = engine
            .answer("quantum chromodynamics", "P2")
            .await
            .expect("answer");
        assert!(answer.answer.is_none());
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources.is_empty());
    }
}
