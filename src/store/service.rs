//! In-process policy and chunk storage.
//!
//! The store keeps policies and chunks behind a single async lock and commits
//! one record per operation; a failed stage can therefore leave a partially
//! stored policy behind, which re-ingestion tolerates (the result is a chunk
//! superset unless [`StoreService::clear_policy_chunks`] or
//! [`StoreService::remove_duplicate_chunks`] runs first).

use crate::chunking::ChunkDraft;
use crate::extract::PolicyFields;
use crate::store::types::{
    ChunkRecord, ContextUpdate, PolicyRecord, StoreError, compute_chunk_hash,
    current_timestamp_rfc3339,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct StoreInner {
    policies: Vec<PolicyRecord>,
    chunks: Vec<ChunkRecord>,
    next_policy_id: u64,
    next_chunk_id: u64,
}

/// Shared handle to the policy/chunk store.
///
/// Cloning is cheap; all clones observe the same data. Chunk insertion order
/// is preserved so that similarity ties resolve deterministically.
#[derive(Clone, Default)]
pub struct StoreService {
    inner: Arc<RwLock<StoreInner>>,
}

impl StoreService {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a policy, or update the existing record with the same policy
    /// number. Context fields survive an update.
    pub async fn upsert_policy(
        &self,
        policy_number: &str,
        source_filename: &str,
        fields: PolicyFields,
        raw_text: String,
    ) -> PolicyRecord {
        let mut inner = self.inner.write().await;
        let now = current_timestamp_rfc3339();

        if let Some(existing) = inner
            .policies
            .iter_mut()
            .find(|policy| policy.policy_number == policy_number)
        {
            existing.source_filename = source_filename.to_string();
            existing.fields = fields;
            existing.raw_text = raw_text;
            existing.updated_at = now;
            tracing::debug!(policy_number, "Updated existing policy record");
            return existing.clone();
        }

        inner.next_policy_id += 1;
        let record = PolicyRecord {
            id: inner.next_policy_id,
            policy_number: policy_number.to_string(),
            source_filename: source_filename.to_string(),
            fields,
            raw_text,
            context: Default::default(),
            created_at: now.clone(),
            updated_at: now,
        };
        inner.policies.push(record.clone());
        tracing::debug!(policy_number, id = record.id, "Inserted policy record");
        record
    }

    /// Look up a policy by its stable policy number.
    pub async fn policy_by_number(&self, policy_number: &str) -> Result<PolicyRecord, StoreError> {
        let inner = self.inner.read().await;
        inner
            .policies
            .iter()
            .find(|policy| policy.policy_number == policy_number)
            .cloned()
            .ok_or_else(|| StoreError::PolicyNotFound(policy_number.to_string()))
    }

    /// Enumerate all stored policies in insertion order.
    pub async fn list_policies(&self) -> Vec<PolicyRecord> {
        self.inner.read().await.policies.clone()
    }

    /// Remove a policy and every chunk it owns.
    pub async fn delete_policy(&self, policy_number: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let position = inner
            .policies
            .iter()
            .position(|policy| policy.policy_number == policy_number)
            .ok_or_else(|| StoreError::PolicyNotFound(policy_number.to_string()))?;
        let removed = inner.policies.remove(position);
        let before = inner.chunks.len();
        inner.chunks.retain(|chunk| chunk.policy_id != removed.id);
        tracing::info!(
            policy_number,
            chunks_removed = before - inner.chunks.len(),
            "Deleted policy and owned chunks"
        );
        Ok(())
    }

    /// Apply a context update to the policy with the given number.
    pub async fn update_context(
        &self,
        policy_number: &str,
        update: ContextUpdate,
    ) -> Result<PolicyRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let policy = inner
            .policies
            .iter_mut()
            .find(|policy| policy.policy_number == policy_number)
            .ok_or_else(|| StoreError::PolicyNotFound(policy_number.to_string()))?;

        if let Some(renewal) = update.renewal_date {
            policy.context.renewal_date = Some(renewal);
        }
        if let Some(age) = update.roof_age_years {
            policy.context.roof_age_years = Some(age);
        }
        if let Some(features) = update.features {
            policy.context.features = features;
        }
        policy.updated_at = current_timestamp_rfc3339();
        Ok(policy.clone())
    }

    /// Persist one chunk with its embedding. One commit per chunk.
    pub async fn insert_chunk(&self, draft: ChunkDraft, embedding: Vec<f32>) -> ChunkRecord {
        let mut inner = self.inner.write().await;
        inner.next_chunk_id += 1;
        let now = current_timestamp_rfc3339();
        let record = ChunkRecord {
            id: inner.next_chunk_id,
            policy_id: draft.policy_id,
            chunk_hash: compute_chunk_hash(&draft.chunk_text),
            document_source_filename: draft.document_source_filename,
            section_type: draft.section_type,
            chunk_text: draft.chunk_text,
            embedding,
            created_at: now.clone(),
            updated_at: now,
        };
        inner.chunks.push(record.clone());
        record
    }

    /// All chunks owned by the given policy, in insertion order.
    pub async fn chunks_for_policy(&self, policy_id: u64) -> Vec<ChunkRecord> {
        let inner = self.inner.read().await;
        inner
            .chunks
            .iter()
            .filter(|chunk| chunk.policy_id == policy_id)
            .cloned()
            .collect()
    }

    /// Every stored chunk text, in insertion order. Used for vocabulary refits.
    pub async fn chunk_texts(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .chunks
            .iter()
            .map(|chunk| chunk.chunk_text.clone())
            .collect()
    }

    /// Maintenance: remove all chunks owned by a policy ahead of re-ingestion.
    pub async fn clear_policy_chunks(&self, policy_number: &str) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let policy_id = inner
            .policies
            .iter()
            .find(|policy| policy.policy_number == policy_number)
            .map(|policy| policy.id)
            .ok_or_else(|| StoreError::PolicyNotFound(policy_number.to_string()))?;
        let before = inner.chunks.len();
        inner.chunks.retain(|chunk| chunk.policy_id != policy_id);
        let removed = before - inner.chunks.len();
        tracing::info!(policy_number, removed, "Cleared policy chunks");
        Ok(removed)
    }

    /// Maintenance: remove later chunks whose text hash duplicates an earlier
    /// chunk of the same policy.
    pub async fn remove_duplicate_chunks(&self, policy_number: &str) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;
        let policy_id = inner
            .policies
            .iter()
            .find(|policy| policy.policy_number == policy_number)
            .map(|policy| policy.id)
            .ok_or_else(|| StoreError::PolicyNotFound(policy_number.to_string()))?;

        let mut seen: HashMap<String, ()> = HashMap::new();
        let before = inner.chunks.len();
        inner.chunks.retain(|chunk| {
            if chunk.policy_id != policy_id {
                return true;
            }
            seen.insert(chunk.chunk_hash.clone(), ()).is_none()
        });
        let removed = before - inner.chunks.len();
        if removed > 0 {
            tracing::info!(policy_number, removed, "Removed duplicate chunks");
        }
        Ok(removed)
    }
}
