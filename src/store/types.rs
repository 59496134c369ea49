//! Record types and errors for the policy/chunk store.

use crate::extract::PolicyFields;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use time::OffsetDateTime;

/// Errors emitted by the policy/chunk store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Requested policy does not exist.
    #[error("Policy not found: {0}")]
    PolicyNotFound(String),
}

/// One processed policy document.
#[derive(Debug, Clone, Serialize)]
pub struct PolicyRecord {
    /// Internal identifier, assigned on insert.
    pub id: u64,
    /// Stable policy number used for cross-stage references.
    pub policy_number: String,
    /// Filename of the source document.
    pub source_filename: String,
    /// Structured fields produced by the extraction collaborator.
    pub fields: PolicyFields,
    /// Raw extracted text, possibly synthesized from the structured fields.
    pub raw_text: String,
    /// Context fields maintained by the contextualize stage.
    pub context: PolicyContext,
    /// Creation timestamp (RFC3339).
    pub created_at: String,
    /// Last-update timestamp (RFC3339).
    pub updated_at: String,
}

/// Post-hoc context attached to a policy by the contextualize stage.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PolicyContext {
    /// Upcoming renewal date (RFC3339 date), derived from the expiration date.
    pub renewal_date: Option<String>,
    /// Roof age in whole years, derived from a roofing invoice when available.
    pub roof_age_years: Option<u32>,
    /// Property feature tags.
    pub features: Vec<String>,
}

/// Requested context changes applied by [`super::StoreService::update_context`].
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    /// New renewal date, when derived.
    pub renewal_date: Option<String>,
    /// New roof age, when derived.
    pub roof_age_years: Option<u32>,
    /// Replacement feature tags, when provided.
    pub features: Option<Vec<String>>,
}

/// One stored section of a policy's text with its embedding.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkRecord {
    /// Internal identifier, assigned on insert.
    pub id: u64,
    /// Owning policy's internal identifier. A chunk belongs to exactly one
    /// policy and is removed with it.
    pub policy_id: u64,
    /// Filename of the source document.
    pub document_source_filename: String,
    /// Section label (`policy_details`, `coverage_<n>`, `raw_text_<n>`).
    pub section_type: String,
    /// Verbatim chunk text.
    pub chunk_text: String,
    /// Term-weight embedding vector. Length reflects the vocabulary the chunk
    /// was embedded under; readers reconcile it to the current size.
    pub embedding: Vec<f32>,
    /// Stable digest of the chunk text, used by duplicate cleanup.
    pub chunk_hash: String,
    /// Creation timestamp (RFC3339).
    pub created_at: String,
    /// Last-update timestamp (RFC3339).
    pub updated_at: String,
}

/// Compact policy view returned by listing endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    /// Internal identifier.
    pub id: u64,
    /// Policy number.
    pub policy_number: String,
    /// Insurer name, when extracted.
    pub insurer_name: Option<String>,
    /// Policyholder name, when extracted.
    pub policyholder_name: Option<String>,
    /// Property address, when extracted.
    pub property_address: Option<String>,
    /// Policy effective date, when extracted.
    pub effective_date: Option<String>,
    /// Policy expiration date, when extracted.
    pub expiration_date: Option<String>,
    /// Total premium, when extracted.
    pub total_premium: Option<String>,
    /// Creation timestamp (RFC3339).
    pub created_at: String,
}

impl From<&PolicyRecord> for PolicySummary {
    fn from(record: &PolicyRecord) -> Self {
        Self {
            id: record.id,
            policy_number: record.policy_number.clone(),
            insurer_name: record.fields.insurer_name.clone(),
            policyholder_name: record.fields.policyholder_name.clone(),
            property_address: record.fields.property_address.clone(),
            effective_date: record.fields.effective_date.clone(),
            expiration_date: record.fields.expiration_date.clone(),
            total_premium: record.fields.total_premium.clone(),
            created_at: record.created_at.clone(),
        }
    }
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_chunk_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    hex::encode(digest)
}

/// Current timestamp formatted for record storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
