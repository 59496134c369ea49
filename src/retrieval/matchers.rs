//! Answer extraction matcher chain.
//!
//! Matchers are pure functions over a [`MatchContext`], tried in a fixed
//! priority order: structure-aware table scan, labeled-field extraction,
//! keyword line containment, then fuzzy line matching. The first matcher that
//! produces an outcome wins; its confidence reflects the path taken, so equal
//! inputs always yield equal confidence.

use crate::retrieval::intents::QueryIntent;
use crate::retrieval::tables::{scan_coverage_table, scan_deductibles};

/// Confidence for a structured field or table extraction.
pub const CONFIDENCE_FIELD: f32 = 0.9;
/// Confidence for keyword line containment.
pub const CONFIDENCE_KEYWORD: f32 = 0.7;
/// Confidence for a fuzzy match against an intent keyword.
pub const CONFIDENCE_FUZZY_KEYWORD: f32 = 0.6;
/// Confidence for a fuzzy match against the whole query.
pub const CONFIDENCE_FUZZY_QUERY: f32 = 0.5;

/// Minimum similarity for a fuzzy keyword match.
const FUZZY_KEYWORD_CUTOFF: f32 = 0.6;
/// Minimum similarity for a fuzzy whole-query match.
const FUZZY_QUERY_CUTOFF: f32 = 0.5;

/// Everything a matcher may consult.
pub struct MatchContext<'a> {
    /// The free-text query, as received.
    pub query: &'a str,
    /// Detected intent, when the query matched a known category.
    pub intent: Option<QueryIntent>,
    /// Texts of the top-ranked chunks from similarity search, best first.
    pub chunk_texts: &'a [String],
    /// The policy's full raw text.
    pub raw_text: &'a str,
}

/// A successful extraction with its confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Extracted answer text.
    pub answer: String,
    /// Reproducible confidence for the path that produced the answer.
    pub confidence: f32,
}

/// Run the matcher chain, returning the first outcome.
pub fn run_matchers(ctx: &MatchContext<'_>) -> Option<MatchOutcome> {
    table_match(ctx)
        .or_else(|| field_match(ctx))
        .or_else(|| keyword_match(ctx))
        .or_else(|| fuzzy_match(ctx))
}

/// Structure-aware scan for coverage and deductible intents.
fn table_match(ctx: &MatchContext<'_>) -> Option<MatchOutcome> {
    let entries = match ctx.intent? {
        QueryIntent::CoverageLimits => scan_coverage_table(ctx.raw_text),
        QueryIntent::Deductibles => scan_deductibles(ctx.raw_text),
        _ => return None,
    };
    if entries.is_empty() {
        return None;
    }
    let label = ctx.intent?.answer_label();
    Some(MatchOutcome {
        answer: format!("{label}: {}", entries.join("; ")),
        confidence: CONFIDENCE_FIELD,
    })
}

/// Labeled-field extraction against the top chunks' serialized lines.
fn field_match(ctx: &MatchContext<'_>) -> Option<MatchOutcome> {
    let intent = ctx.intent?;

    if intent == QueryIntent::CoverageLimits {
        return coverage_entries_from_chunks(ctx.chunk_texts).map(|entries| MatchOutcome {
            answer: format!("{}: {}", intent.answer_label(), entries.join("; ")),
            confidence: CONFIDENCE_FIELD,
        });
    }

    let label = intent.field_label()?;
    let prefix = format!("{label}:");
    for chunk_text in ctx.chunk_texts {
        for line in chunk_text.lines() {
            if let Some(value) = line.strip_prefix(&prefix) {
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                let value = if intent == QueryIntent::TotalPremium && !value.starts_with('$') {
                    format!("${value}")
                } else {
                    value.to_string()
                };
                return Some(MatchOutcome {
                    answer: format!("{}: {value}", intent.answer_label()),
                    confidence: CONFIDENCE_FIELD,
                });
            }
        }
    }
    None
}

/// Pair `coverage_type`/`limit` lines from coverage chunks, deduplicated.
fn coverage_entries_from_chunks(chunk_texts: &[String]) -> Option<Vec<String>> {
    let mut entries: Vec<String> = Vec::new();
    for chunk_text in chunk_texts {
        let mut coverage_type: Option<&str> = None;
        let mut limit: Option<&str> = None;
        for line in chunk_text.lines() {
            if let Some(value) = line.strip_prefix("coverage_type:") {
                coverage_type = Some(value.trim());
            } else if let Some(value) = line.strip_prefix("limit:") {
                limit = Some(value.trim());
            }
        }
        let entry = match (coverage_type, limit) {
            (Some(coverage_type), Some(limit)) => format!("{coverage_type}: {limit}"),
            (Some(coverage_type), None) => coverage_type.to_string(),
            _ => continue,
        };
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    if entries.is_empty() { None } else { Some(entries) }
}

/// First raw-text line containing any intent keyword (or the query itself).
fn keyword_match(ctx: &MatchContext<'_>) -> Option<MatchOutcome> {
    let query_lower = ctx.query.to_lowercase();
    let keywords: Vec<String> = match ctx.intent {
        Some(intent) => intent.keywords().iter().map(|s| s.to_string()).collect(),
        None => vec![query_lower.clone()],
    };
    ctx.raw_text
        .lines()
        .find(|line| {
            let line_lower = line.to_lowercase();
            keywords.iter().any(|keyword| line_lower.contains(keyword))
        })
        .map(|line| MatchOutcome {
            answer: format!("Based on the policy documents, I found: {}", line.trim()),
            confidence: CONFIDENCE_KEYWORD,
        })
}

/// Fuzzy line matching: intent keywords first, then the whole query.
fn fuzzy_match(ctx: &MatchContext<'_>) -> Option<MatchOutcome> {
    let lines: Vec<&str> = ctx
        .raw_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }

    if let Some(intent) = ctx.intent {
        let mut candidates: Vec<String> = Vec::new();
        for keyword in intent.keywords() {
            if let Some(line) = closest_line(keyword, &lines, FUZZY_KEYWORD_CUTOFF) {
                if !candidates.contains(&line) {
                    candidates.push(line);
                }
            }
        }
        if !candidates.is_empty() {
            return Some(MatchOutcome {
                answer: format!("Closest match: {}", candidates.join("; ")),
                confidence: CONFIDENCE_FUZZY_KEYWORD,
            });
        }
    }

    closest_line(&ctx.query.to_lowercase(), &lines, FUZZY_QUERY_CUTOFF).map(|line| MatchOutcome {
        answer: format!("Closest match: {line}"),
        confidence: CONFIDENCE_FUZZY_QUERY,
    })
}

/// The line most similar to `needle`, if it clears the cutoff.
fn closest_line(needle: &str, lines: &[&str], cutoff: f32) -> Option<String> {
    let mut best: Option<(f32, &str)> = None;
    for line in lines {
        let score = similarity(needle, &line.to_lowercase());
        if score >= cutoff && best.is_none_or(|(best_score, _)| score > best_score) {
            best = Some((score, line));
        }
    }
    best.map(|(_, line)| line.to_string())
}

/// Normalized edit-distance similarity in `[0, 1]`.
fn similarity(a: &str, b: &str) -> f32 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f32) / (longest as f32)
}

/// Character-level Levenshtein distance, single-row rolling buffer.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, &ch_a) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &ch_b) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ch_a != ch_b);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(
        query: &'a str,
        chunk_texts: &'a [String],
        raw_text: &'a str,
    ) -> MatchContext<'a> {
        MatchContext {
            query,
            intent: QueryIntent::detect(query),
            chunk_texts,
            raw_text,
        }
    }

    #[test]
    fn field_match_reads_serialized_chunk_lines() {
        let chunks = vec!["policy_number: HMP-IA-001-2025\ninsurer_name: Hawkeye".to_string()];
        let outcome = run_matchers(&ctx("what is the policy number", &chunks, "")).expect("match");
        assert_eq!(outcome.answer, "Policy number: HMP-IA-001-2025");
        assert_eq!(outcome.confidence, CONFIDENCE_FIELD);
    }

    #[test]
    fn premium_values_are_dollar_prefixed() {
        let chunks = vec!["total_premium: 1710.00".to_string()];
        let outcome = run_matchers(&ctx("how much is my premium", &chunks, "")).expect("match");
        assert_eq!(outcome.answer, "Total premium: $1710.00");

        let chunks = vec!["total_premium: $1710.00".to_string()];
        let outcome = run_matchers(&ctx("how much is my premium", &chunks, "")).expect("match");
        assert_eq!(outcome.answer, "Total premium: $1710.00");
    }

    #[test]
    fn coverage_intent_prefers_the_table_scan() {
        let raw = "Coverage Type\nLimit\nCoverage A - Dwelling\n$250,000.00";
        let outcome = run_matchers(&ctx("coverage limits", &[], raw)).expect("match");
        assert!(outcome.answer.contains("Coverage A - Dwelling: $250,000.00"));
        assert_eq!(outcome.confidence, CONFIDENCE_FIELD);
    }

    #[test]
    fn coverage_intent_falls_back_to_structured_chunks() {
        let chunks = vec![
            "coverage_type: Coverage A - Dwelling\nlimit: 250000.00".to_string(),
            "coverage_type: Coverage A - Dwelling\nlimit: 250000.00".to_string(),
        ];
        let outcome = run_matchers(&ctx("coverage limits", &chunks, "no table here"))
            .expect("match");
        assert_eq!(
            outcome.answer,
            "Coverage information: Coverage A - Dwelling: 250000.00"
        );
        assert_eq!(outcome.confidence, CONFIDENCE_FIELD);
    }

    #[test]
    fn keyword_containment_is_mid_confidence() {
        let raw = "POLICYHOLDER INFORMATION\nThe insured is John Walker of Des Moines";
        let outcome = run_matchers(&ctx("who is the policyholder", &[], raw)).expect("match");
        assert_eq!(outcome.confidence, CONFIDENCE_KEYWORD);
        // First containing line wins, here the section header.
        assert!(outcome.answer.contains("POLICYHOLDER INFORMATION"));
    }

    #[test]
    fn fuzzy_query_match_is_lowest_confidence() {
        let raw = "windstorm rider schedule";
        let outcome = run_matchers(&ctx("windstorm rider schedules", &[], raw)).expect("match");
        assert_eq!(outcome.confidence, CONFIDENCE_FUZZY_QUERY);
        assert_eq!(outcome.answer, "Closest match: windstorm rider schedule");
    }

    #[test]
    fn no_matcher_fires_on_unrelated_text() {
        assert!(run_matchers(&ctx("quantum chromodynamics", &[], "Coverage A\n$100")).is_none());
    }

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("policy", "policy"), 0);
    }

    #[test]
    fn similarity_is_normalized() {
        assert_eq!(similarity("", ""), 1.0);
        assert!(similarity("deductible", "deductibles") > 0.9);
        assert!(similarity("abc", "xyz") < 0.1);
    }
}
