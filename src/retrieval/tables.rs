//! Structure-aware scans over a policy's raw text.
//!
//! Real policy PDFs render coverages and deductibles as tables; once
//! flattened to text these become a header line followed by alternating
//! label/amount lines. The scans here recover those pairs without assuming
//! column alignment.

use regex::Regex;
use std::sync::OnceLock;

/// Lookahead window (in lines) when pairing a coverage label with its amount.
const AMOUNT_LOOKAHEAD: usize = 5;

fn currency_regex() -> &'static Regex {
    static CURRENCY: OnceLock<Regex> = OnceLock::new();
    CURRENCY.get_or_init(|| Regex::new(r"\$[\d,]+(?:\.\d{2})?").expect("valid currency pattern"))
}

/// Scan raw policy text for a coverage table and return `label: amount` pairs.
///
/// The table region starts at a line containing "coverage type" whose next
/// line contains "limit", and ends at the first blank line or a line
/// mentioning deductibles or endorsements. Within the region, each line
/// mentioning a coverage (but not the header itself) is paired with the first
/// currency token found within the next few lines; a label with no amount is
/// kept bare. Duplicate labels are suppressed, first match wins.
pub fn scan_coverage_table(raw_text: &str) -> Vec<String> {
    let lines: Vec<&str> = raw_text.lines().collect();

    let table_start = lines.iter().enumerate().position(|(index, line)| {
        line.to_lowercase().contains("coverage type")
            && lines
                .get(index + 1)
                .is_some_and(|next| next.to_lowercase().contains("limit"))
    });
    let Some(start) = table_start else {
        return Vec::new();
    };

    let mut entries: Vec<String> = Vec::new();
    let mut seen_labels: Vec<String> = Vec::new();
    for (index, raw_line) in lines.iter().enumerate().skip(start + 1) {
        let line = raw_line.trim();
        let line_lower = line.to_lowercase();
        if line.is_empty()
            || line_lower.contains("deductibles")
            || line_lower.contains("endorsements")
        {
            break;
        }
        if !line_lower.contains("coverage ") || line_lower.contains("coverage type") {
            continue;
        }
        if seen_labels.iter().any(|label| label == &line_lower) {
            continue;
        }
        seen_labels.push(line_lower);

        let amount = lines
            .iter()
            .skip(index + 1)
            .take(AMOUNT_LOOKAHEAD)
            .find_map(|candidate| currency_regex().find(candidate).map(|m| m.as_str()));
        match amount {
            Some(amount) => entries.push(format!("{line}: {amount}")),
            None => entries.push(line.to_string()),
        }
    }
    entries
}

/// Scan raw policy text for deductible lines.
///
/// A line qualifies when it mentions a deductible together with an amount
/// marker (currency, percentage, "per occurrence", or "wind/hail"). Bare
/// header lines are skipped.
pub fn scan_deductibles(raw_text: &str) -> Vec<String> {
    let headers = [
        "deductible annual premium",
        "deductibles",
        "coverage type",
        "limit",
    ];
    raw_text
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            let lower = trimmed.to_lowercase();
            if headers.contains(&lower.as_str()) {
                return None;
            }
            let has_amount = lower.contains('$')
                || lower.contains('%')
                || lower.contains("per occurrence")
                || lower.contains("wind/hail");
            if lower.contains("deductible") && has_amount && !trimmed.is_empty() {
                Some(trimmed.to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY_TEXT: &str = "\
HOMEOWNERS POLICY DECLARATIONS

Coverage Type
Limit
Coverage A - Dwelling
$250,000.00
Coverage B - Other Structures
$25,000.00
Coverage A - Dwelling
$999,999.00

Deductibles
All Perils Deductible: $1,000 per occurrence
Wind/Hail Deductible: 1% of Coverage A";

    #[test]
    fn pairs_coverage_labels_with_amounts() {
        let entries = scan_coverage_table(POLICY_TEXT);
        assert_eq!(
            entries,
            vec![
                "Coverage A - Dwelling: $250,000.00".to_string(),
                "Coverage B - Other Structures: $25,000.00".to_string(),
            ]
        );
    }

    #[test]
    fn stops_at_deductibles_section() {
        let entries = scan_coverage_table(POLICY_TEXT);
        assert!(entries.iter().all(|entry| !entry.contains("Deductible")));
    }

    #[test]
    fn label_without_amount_is_kept_bare() {
        let text = "Coverage Type\nLimit\nCoverage C - Personal Property\nsee endorsement schedule";
        let entries = scan_coverage_table(text);
        assert_eq!(entries, vec!["Coverage C - Personal Property".to_string()]);
    }

    #[test]
    fn no_table_header_means_no_entries() {
        assert!(scan_coverage_table("Coverage A - Dwelling\n$250,000.00").is_empty());
    }

    #[test]
    fn deductible_lines_require_an_amount_marker() {
        let lines = scan_deductibles(POLICY_TEXT);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("$1,000 per occurrence"));
        assert!(lines[1].contains("Wind/Hail"));

        assert!(scan_deductibles("Deductibles\nSee section 4").is_empty());
    }
}
