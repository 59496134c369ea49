//! Policy chunking engine.
//!
//! Splits one policy's structured fields and raw text into labeled chunks:
//!
//! - at most one `policy_details` chunk holding the scalar fields,
//! - one `coverage_<n>` chunk per usable coverage entry,
//! - `raw_text_<n>` segments of a fixed character length.
//!
//! Ordering is a contract: `policy_details` first when present, then coverage
//! chunks in source order, then raw-text segments in character order.
//! Retrieval relies on the `policy_details` chunk being unique and first.
//! Chunking is deterministic; identical input yields identical chunk text and
//! labels on every call.

use crate::extract::PolicyFields;

/// A chunk produced by the engine, not yet embedded or persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    /// Owning policy's internal identifier.
    pub policy_id: u64,
    /// Filename of the source document.
    pub document_source_filename: String,
    /// Section label.
    pub section_type: String,
    /// Verbatim chunk text.
    pub chunk_text: String,
}

/// Split a policy into ordered, labeled chunks.
///
/// `raw_text` segments are exactly `raw_chunk_size` characters (the final
/// segment may be shorter); segmentation preserves character order and never
/// respects word boundaries, so concatenating the segments reconstructs the
/// input exactly. A policy with no usable fields yields zero chunks.
pub fn chunk_policy(
    fields: &PolicyFields,
    raw_text: Option<&str>,
    policy_id: u64,
    source_filename: &str,
    raw_chunk_size: usize,
) -> Vec<ChunkDraft> {
    let mut chunks = Vec::new();
    let make = |section_type: String, chunk_text: String| ChunkDraft {
        policy_id,
        document_source_filename: source_filename.to_string(),
        section_type,
        chunk_text,
    };

    let scalars = fields.scalar_entries();
    if !scalars.is_empty() {
        let text = scalars
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n");
        chunks.push(make("policy_details".to_string(), text));
    }

    // Label numbering follows the running count of emitted coverage chunks,
    // not the source array index; unusable entries do not consume a number.
    let mut coverage_count = 0usize;
    for coverage in &fields.coverage_details {
        let mut lines = Vec::new();
        if let Some(coverage_type) = coverage
            .coverage_type
            .as_ref()
            .filter(|value| !value.trim().is_empty())
        {
            lines.push(format!("coverage_type: {coverage_type}"));
        }
        if let Some(limit) = coverage
            .limit
            .as_ref()
            .filter(|value| !value.trim().is_empty())
        {
            lines.push(format!("limit: {limit}"));
        }
        if lines.is_empty() {
            continue;
        }
        coverage_count += 1;
        chunks.push(make(format!("coverage_{coverage_count}"), lines.join("\n")));
    }

    if let Some(raw) = raw_text.filter(|raw| !raw.is_empty()) {
        for (index, segment) in split_fixed_segments(raw, raw_chunk_size)
            .into_iter()
            .enumerate()
        {
            chunks.push(make(format!("raw_text_{}", index + 1), segment));
        }
    }

    chunks
}

/// Split text into segments of `size` characters, preserving order.
fn split_fixed_segments(text: &str, size: usize) -> Vec<String> {
    debug_assert!(size > 0);
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            segments.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}
