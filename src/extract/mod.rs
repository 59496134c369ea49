//! Document extraction collaborator abstraction and adapters.
//!
//! The generative extraction service lives outside this process; the pipeline
//! only depends on [`DocumentExtractor`]. Two adapters are provided:
//!
//! - [`RemoteExtractor`] posts document bytes to the configured service and
//!   parses its `{status, data}` response.
//! - [`LocalExtractor`] is a deterministic development fallback that derives
//!   placeholder fields from the filename and document bytes.

mod fields;

pub use fields::{CoverageDetail, Deductible, PolicyFields};

use crate::config::get_config;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::macros::format_description;

/// Errors raised by extraction adapters.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Collaborator returned an error status for this document.
    #[error("Extraction failed: {0}")]
    Failed(String),
    /// Collaborator response could not be parsed into the expected shape.
    #[error("Malformed extraction response: {0}")]
    MalformedResponse(String),
    /// Transport-level failure reaching the collaborator.
    #[error("Extraction request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Interface implemented by extraction backends.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// Produce structured policy fields for one document.
    async fn process_document(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<PolicyFields, ExtractionError>;
}

/// HTTP adapter for the generative extraction service.
pub struct RemoteExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteExtractor {
    /// Build an adapter targeting the given service base URL.
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn parse_response(body: Value) -> Result<PolicyFields, ExtractionError> {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ExtractionError::MalformedResponse("missing status".into()))?;
        match status {
            "success" => {
                let data = body
                    .get("data")
                    .cloned()
                    .ok_or_else(|| ExtractionError::MalformedResponse("missing data".into()))?;
                serde_json::from_value(data)
                    .map_err(|err| ExtractionError::MalformedResponse(err.to_string()))
            }
            "error" => {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified extraction error");
                Err(ExtractionError::Failed(message.to_string()))
            }
            other => Err(ExtractionError::MalformedResponse(format!(
                "unexpected status '{other}'"
            ))),
        }
    }
}

#[async_trait]
impl DocumentExtractor for RemoteExtractor {
    async fn process_document(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<PolicyFields, ExtractionError> {
        let url = format!("{}/extract", self.base_url.trim_end_matches('/'));
        tracing::debug!(filename, url = %url, size = bytes.len(), "Requesting extraction");
        let response = self
            .client
            .post(&url)
            .query(&[("filename", filename)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;
        let body: Value = response
            .json()
            .await
            .map_err(|err| ExtractionError::MalformedResponse(err.to_string()))?;
        Self::parse_response(body)
    }
}

/// Deterministic extraction fallback for environments without the service.
///
/// Mirrors what the service would return well enough for the rest of the
/// pipeline to run: a synthetic policy number from the filename stem, a
/// placeholder coverage entry, and the document bytes as raw text when they
/// decode as UTF-8.
pub struct LocalExtractor;

impl LocalExtractor {
    /// Construct the local fallback adapter.
    pub const fn new() -> Self {
        Self
    }

    fn today() -> String {
        let format = format_description!("[year]-[month]-[day]");
        OffsetDateTime::now_utc()
            .date()
            .format(&format)
            .unwrap_or_else(|_| "1970-01-01".to_string())
    }
}

impl Default for LocalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentExtractor for LocalExtractor {
    async fn process_document(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<PolicyFields, ExtractionError> {
        let stem = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
        let raw_text = match std::str::from_utf8(bytes) {
            Ok(text) if !text.trim().is_empty() => text.to_string(),
            _ => format!("File {filename} processed locally (no text extraction)"),
        };
        let today = Self::today();
        tracing::info!(filename, "Processed document with local extractor");
        Ok(PolicyFields {
            policy_number: Some(format!("LOCAL-{stem}")),
            insurer_name: Some("Local Processing".into()),
            policyholder_name: Some("Processed Locally".into()),
            property_address: Some("Local Development".into()),
            effective_date: Some(today.clone()),
            expiration_date: Some(today),
            total_premium: Some("0.00".into()),
            coverage_details: vec![CoverageDetail {
                coverage_type: Some("Local Processing".into()),
                limit: Some("0.00".into()),
            }],
            deductibles: vec![Deductible {
                coverage_type: Some("Local Processing".into()),
                amount: Some("0.00".into()),
                kind: Some("local".into()),
            }],
            raw_text: Some(raw_text),
            extra: Default::default(),
        })
    }
}

/// Build an extraction adapter suitable for the current configuration.
pub fn get_extractor() -> Box<dyn DocumentExtractor> {
    let config = get_config();
    match &config.extractor_url {
        Some(url) => {
            tracing::info!(url = %url, "Using remote extraction service");
            Box::new(RemoteExtractor::new(url.clone()))
        }
        None => {
            tracing::warn!("EXTRACTOR_URL not set; using local extraction fallback");
            Box::new(LocalExtractor::new())
        }
    }
}
