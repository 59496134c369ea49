//! Structured fields returned by the extraction collaborator.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Structured data extracted from one policy document.
///
/// Recognized fields are named and optional; anything else the collaborator
/// returns lands in `extra` and is carried through unmodified.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyFields {
    /// Policy number or identifier.
    pub policy_number: Option<String>,
    /// Name of the insurance company.
    pub insurer_name: Option<String>,
    /// Name of the person or entity holding the policy.
    pub policyholder_name: Option<String>,
    /// Address of the insured property.
    pub property_address: Option<String>,
    /// Policy start date (YYYY-MM-DD).
    pub effective_date: Option<String>,
    /// Policy end date (YYYY-MM-DD).
    pub expiration_date: Option<String>,
    /// Total premium amount.
    pub total_premium: Option<String>,
    /// Per-coverage limits.
    #[serde(default)]
    pub coverage_details: Vec<CoverageDetail>,
    /// Per-coverage deductibles.
    #[serde(default)]
    pub deductibles: Vec<Deductible>,
    /// Raw document text, when the collaborator provides it.
    pub raw_text: Option<String>,
    /// Unrecognized fields, passed through for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One coverage entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageDetail {
    /// Type of coverage (e.g. "Coverage A - Dwelling").
    pub coverage_type: Option<String>,
    /// Coverage limit amount.
    pub limit: Option<String>,
}

/// One deductible entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deductible {
    /// Coverage type this deductible applies to.
    pub coverage_type: Option<String>,
    /// Deductible amount.
    pub amount: Option<String>,
    /// Deductible kind (e.g. "per_occurrence").
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl PolicyFields {
    /// Scalar fields in serialization order, skipping absent values.
    ///
    /// Unrecognized extras follow the named fields, sorted by key; only
    /// scalar JSON values participate.
    pub fn scalar_entries(&self) -> Vec<(String, String)> {
        let named: [(&str, &Option<String>); 7] = [
            ("policy_number", &self.policy_number),
            ("insurer_name", &self.insurer_name),
            ("policyholder_name", &self.policyholder_name),
            ("property_address", &self.property_address),
            ("effective_date", &self.effective_date),
            ("expiration_date", &self.expiration_date),
            ("total_premium", &self.total_premium),
        ];
        let mut entries: Vec<(String, String)> = named
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|value| (key.to_string(), value.clone()))
            })
            .collect();

        for (key, value) in &self.extra {
            let rendered = match value {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                Value::Bool(flag) => Some(flag.to_string()),
                _ => None,
            };
            if let Some(rendered) = rendered {
                entries.push((key.clone(), rendered));
            }
        }
        entries
    }

    /// Raw text for chunking: the collaborator's text when present and
    /// non-blank, otherwise a synthesis from the structured fields.
    pub fn effective_raw_text(&self) -> String {
        if let Some(text) = self
            .raw_text
            .as_ref()
            .filter(|text| !text.trim().is_empty())
        {
            return text.clone();
        }

        let mut parts: Vec<String> = Vec::new();
        let scalars: Vec<String> = self
            .scalar_entries()
            .into_iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect();
        if !scalars.is_empty() {
            parts.push(scalars.join("\n"));
        }
        for coverage in &self.coverage_details {
            let mut lines = Vec::new();
            if let Some(coverage_type) = &coverage.coverage_type {
                lines.push(format!("coverage_type: {coverage_type}"));
            }
            if let Some(limit) = &coverage.limit {
                lines.push(format!("limit: {limit}"));
            }
            if !lines.is_empty() {
                parts.push(lines.join("\n"));
            }
        }
        parts.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unrecognized_fields_land_in_extra() {
        let fields: PolicyFields = serde_json::from_value(json!({
            "policy_number": "P1",
            "underwriter_notes": "windstorm rider",
            "coverage_details": [{"coverage_type": "Coverage A", "limit": "250000.00"}]
        }))
        .expect("deserialize");
        assert_eq!(fields.policy_number.as_deref(), Some("P1"));
        assert_eq!(
            fields.extra.get("underwriter_notes"),
            Some(&json!("windstorm rider"))
        );
    }

    #[test]
    fn scalar_entries_keep_field_order_and_skip_absent() {
        let fields = PolicyFields {
            policy_number: Some("P1".into()),
            total_premium: Some("1710.00".into()),
            ..Default::default()
        };
        let entries = fields.scalar_entries();
        assert_eq!(
            entries,
            vec![
                ("policy_number".to_string(), "P1".to_string()),
                ("total_premium".to_string(), "1710.00".to_string()),
            ]
        );
    }

    #[test]
    fn effective_raw_text_prefers_collaborator_text() {
        let fields = PolicyFields {
            policy_number: Some("P1".into()),
            raw_text: Some("verbatim".into()),
            ..Default::default()
        };
        assert_eq!(fields.effective_raw_text(), "verbatim");
    }

    #[test]
    fn effective_raw_text_synthesizes_from_fields() {
        let fields = PolicyFields {
            policy_number: Some("P1".into()),
            coverage_details: vec![CoverageDetail {
                coverage_type: Some("Coverage A".into()),
                limit: Some("250000.00".into()),
            }],
            ..Default::default()
        };
        let text = fields.effective_raw_text();
        assert!(text.starts_with("policy_number: P1"));
        assert!(text.contains("coverage_type: Coverage A\nlimit: 250000.00"));
    }
}
