//! Contextual metadata derivation.
//!
//! The contextualize stage asks an [`Advisor`] for post-hoc policy context:
//! the upcoming renewal date (taken from the policy's expiration date), the
//! roof age (derived from a roofing invoice's installation date when an
//! invoice is supplied), and default property feature tags. The default
//! advisor works from local files; the trait exists so a remote advisory
//! collaborator can slot in without touching the pipeline.

use crate::store::{ContextUpdate, PolicyRecord};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use time::macros::format_description;
use time::{Date, Month, OffsetDateTime};

/// Feature tags applied when a policy has none recorded.
const DEFAULT_FEATURES: &[&str] = &["monitored_alarm"];

/// Invoice date labels in preference order; the first one present wins.
const PREFERRED_LABELS: &[&str] = &[
    "installation date",
    "work date",
    "service date",
    "completion date",
    "project completion date",
    "date of issue",
    "invoice date",
];

/// Derives contextual metadata for one policy.
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Compute the context update for `policy`, consulting the roofing
    /// invoice at `invoice_path` when one was supplied.
    async fn derive_context(
        &self,
        policy: &PolicyRecord,
        invoice_path: Option<&Path>,
    ) -> ContextUpdate;
}

/// File-based advisor used when no remote advisory collaborator exists.
#[derive(Default)]
pub struct DefaultAdvisor;

impl DefaultAdvisor {
    /// Construct the default advisor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Advisor for DefaultAdvisor {
    async fn derive_context(
        &self,
        policy: &PolicyRecord,
        invoice_path: Option<&Path>,
    ) -> ContextUpdate {
        let renewal_date = policy
            .fields
            .expiration_date
            .as_deref()
            .and_then(parse_iso_date)
            .map(format_iso_date);
        if let Some(renewal) = &renewal_date {
            tracing::info!(
                policy_number = %policy.policy_number,
                renewal_date = %renewal,
                "Renewal date taken from expiration date"
            );
        }

        let mut roof_age_years = None;
        if let Some(path) = invoice_path {
            match tokio::fs::read_to_string(path).await {
                Ok(text) => {
                    roof_age_years = extract_installation_date(&text)
                        .and_then(|date| roof_age_from(date, OffsetDateTime::now_utc().date()));
                    if let Some(age) = roof_age_years {
                        tracing::info!(
                            policy_number = %policy.policy_number,
                            roof_age_years = age,
                            "Roof age derived from invoice"
                        );
                    } else {
                        tracing::warn!(path = %path.display(), "No usable date found in invoice");
                    }
                }
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "Could not read invoice");
                }
            }
        }

        let features = if policy.context.features.is_empty() {
            Some(DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect())
        } else {
            None
        };

        ContextUpdate {
            renewal_date,
            roof_age_years,
            features,
        }
    }
}

fn labeled_date_regex() -> &'static Regex {
    static LABELED: OnceLock<Regex> = OnceLock::new();
    LABELED.get_or_init(|| {
        // Longer labels first so "project completion date" is not consumed
        // as "completion date".
        Regex::new(
            r"(?i)(project completion date|installation date|completion date|date of issue|invoice date|service date|issue date|work date|due date)\s*:?\**\s*([A-Za-z]+ \d{1,2}, \d{4}|\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}[/-]\d{2,4})",
        )
        .expect("valid labeled-date pattern")
    })
}

/// Extract the most relevant installation date from invoice text.
///
/// Dates are collected per label; the first label present in the preference
/// order wins, with the earliest date overall as a fallback.
pub fn extract_installation_date(text: &str) -> Option<Date> {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut labeled: Vec<(String, Date)> = Vec::new();
    for captures in labeled_date_regex().captures_iter(&flattened) {
        let label = captures[1].to_lowercase();
        if let Some(date) = parse_flexible_date(&captures[2]) {
            labeled.retain(|(existing, _)| existing != &label);
            labeled.push((label, date));
        }
    }
    if labeled.is_empty() {
        return None;
    }
    for preferred in PREFERRED_LABELS {
        if let Some((_, date)) = labeled.iter().find(|(label, _)| label == preferred) {
            return Some(*date);
        }
    }
    labeled.iter().map(|(_, date)| *date).min()
}

/// Whole years elapsed between the installation date and `today`.
pub fn roof_age_from(installed: Date, today: Date) -> Option<u32> {
    let mut years = today.year() - installed.year();
    if (today.month() as u8, today.day()) < (installed.month() as u8, installed.day()) {
        years -= 1;
    }
    u32::try_from(years.max(0)).ok()
}

fn parse_iso_date(text: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    Date::parse(text.trim(), &format).ok()
}

fn format_iso_date(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).unwrap_or_else(|_| date.to_string())
}

/// Parse `YYYY-MM-DD`, `Month D, YYYY`, or `M/D/YYYY` (also `-` separated).
fn parse_flexible_date(text: &str) -> Option<Date> {
    let text = text.trim();
    if let Some(date) = parse_iso_date(text) {
        return Some(date);
    }

    let long_format =
        format_description!("[month repr:long case_sensitive:false] [day padding:none], [year]");
    if let Ok(date) = Date::parse(text, &long_format) {
        return Some(date);
    }

    let parts: Vec<&str> = text.split(['/', '-']).collect();
    if parts.len() == 3 {
        let month: u8 = parts[0].parse().ok()?;
        let day: u8 = parts[1].parse().ok()?;
        let mut year: i32 = parts[2].parse().ok()?;
        if year < 100 {
            year += 2000;
        }
        return Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn preferred_label_wins_over_invoice_date() {
        let text = "**Invoice Date:** January 5, 2024\n**Installation Date:** June 15, 2020";
        assert_eq!(
            extract_installation_date(text),
            Some(date!(2020 - 06 - 15))
        );
    }

    #[test]
    fn falls_back_to_earliest_date() {
        let text = "Due Date: 03/01/2024\nIssue Date: 01/15/2024";
        assert_eq!(extract_installation_date(text), Some(date!(2024 - 01 - 15)));
    }

    #[test]
    fn numeric_and_iso_formats_parse() {
        assert_eq!(parse_flexible_date("2020-06-15"), Some(date!(2020 - 06 - 15)));
        assert_eq!(parse_flexible_date("6/15/2020"), Some(date!(2020 - 06 - 15)));
        assert_eq!(parse_flexible_date("6/15/20"), Some(date!(2020 - 06 - 15)));
        assert_eq!(parse_flexible_date("June 15, 2020"), Some(date!(2020 - 06 - 15)));
        assert_eq!(parse_flexible_date("not a date"), None);
    }

    #[test]
    fn roof_age_respects_the_anniversary() {
        let installed = date!(2020 - 06 - 15);
        assert_eq!(roof_age_from(installed, date!(2025 - 06 - 14)), Some(4));
        assert_eq!(roof_age_from(installed, date!(2025 - 06 - 15)), Some(5));
        // Future installation dates clamp to zero.
        assert_eq!(roof_age_from(installed, date!(2019 - 01 - 01)), Some(0));
    }

    #[tokio::test]
    async fn advisor_derives_renewal_and_default_features() {
        let policy = PolicyRecord {
            id: 1,
            policy_number: "P1".into(),
            source_filename: "p1.pdf".into(),
            fields: crate::extract::PolicyFields {
                expiration_date: Some("2026-03-01".into()),
                ..Default::default()
            },
            raw_text: String::new(),
            context: Default::default(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let update = DefaultAdvisor::new().derive_context(&policy, None).await;
        assert_eq!(update.renewal_date.as_deref(), Some("2026-03-01"));
        assert!(update.roof_age_years.is_none());
        assert_eq!(
            update.features,
            Some(vec!["monitored_alarm".to_string()])
        );
    }

    #[tokio::test]
    async fn advisor_reads_invoice_for_roof_age() {
        let dir = tempfile::tempdir().expect("tempdir");
        let invoice = dir.path().join("invoice.txt");
        std::fs::write(&invoice, "Roof Replacement\nInstallation Date: 2018-05-01\n")
            .expect("write invoice");

        let policy = PolicyRecord {
            id: 1,
            policy_number: "P1".into(),
            source_filename: "p1.pdf".into(),
            fields: Default::default(),
            raw_text: String::new(),
            context: Default::default(),
            created_at: String::new(),
            updated_at: String::new(),
        };
        let update = DefaultAdvisor::new()
            .derive_context(&policy, Some(&invoice))
            .await;
        let age = update.roof_age_years.expect("roof age");
        assert!(age >= 7);
    }
}
