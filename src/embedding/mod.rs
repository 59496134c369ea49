//! Term-weight embedding store and vocabulary snapshots.
//!
//! The vector space is defined by a corpus-fitted vocabulary of unigrams and
//! bigrams with inverse-document-frequency weights. A fit produces a new
//! immutable [`Vocabulary`] snapshot that replaces the previous one
//! atomically; readers clone the `Arc` and bind to one snapshot for the
//! duration of a call, so a concurrent refit can never expose a half-built
//! term space. Stored embeddings from an earlier snapshot are reconciled at
//! read time via [`reconcile`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Document-frequency floor applied during a corpus fit.
const MIN_DOCUMENT_FREQUENCY: usize = 2;
/// Fraction of documents above which a term is considered noise.
const MAX_DOCUMENT_FRACTION: f32 = 0.95;
/// Uniform value added to an exactly-zero embedding of non-empty text so the
/// retrieval normalize step never divides by zero.
const ZERO_VECTOR_EPSILON: f32 = 1e-10;

/// Common English words excluded from the vocabulary.
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "for", "from", "had", "has",
    "have", "he", "her", "his", "if", "in", "into", "is", "it", "its", "no", "not", "of", "on",
    "or", "our", "she", "so", "such", "that", "the", "their", "them", "then", "there", "these",
    "they", "this", "to", "was", "we", "were", "which", "will", "with", "you", "your",
];

/// One immutable vocabulary epoch: terms, their positions, and IDF weights.
#[derive(Debug)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: HashMap<String, usize>,
    idf: Vec<f32>,
    document_count: usize,
}

impl Vocabulary {
    /// Fit a vocabulary over the given corpus.
    ///
    /// Terms must occur in at least `min_df` documents and at most 95% of
    /// them; when those filters would empty the vocabulary of a non-empty
    /// corpus, the unfiltered term set is used instead (logged). At most
    /// `max_features` terms are kept, selected by total corpus frequency with
    /// an alphabetical tiebreak, and indexed alphabetically so fits are
    /// reproducible.
    pub fn fit(corpus: &[String], max_features: usize, min_df: usize) -> Self {
        let document_count = corpus.len();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        let mut corpus_frequency: HashMap<String, usize> = HashMap::new();

        for document in corpus {
            let terms = extract_terms(document);
            let mut seen: HashSet<&String> = HashSet::new();
            for term in &terms {
                *corpus_frequency.entry(term.clone()).or_insert(0) += 1;
                if seen.insert(term) {
                    *document_frequency.entry(term.clone()).or_insert(0) += 1;
                }
            }
        }

        let max_df = ((document_count as f32) * MAX_DOCUMENT_FRACTION).floor() as usize;
        let mut candidates: Vec<(String, usize, usize)> = document_frequency
            .iter()
            .filter(|&(_, &df)| df >= min_df && (document_count <= 1 || df <= max_df.max(1)))
            .map(|(term, &df)| (term.clone(), df, corpus_frequency[term]))
            .collect();

        if candidates.is_empty() && !document_frequency.is_empty() {
            tracing::warn!(
                documents = document_count,
                "Document-frequency filters emptied the vocabulary; keeping unfiltered terms"
            );
            candidates = document_frequency
                .iter()
                .map(|(term, &df)| (term.clone(), df, corpus_frequency[term]))
                .collect();
        }

        candidates.sort_by(|a, b| b.2.cmp(&a.2).then_with(|| a.0.cmp(&b.0)));
        candidates.truncate(max_features);
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let terms: Vec<String> = candidates.iter().map(|(term, _, _)| term.clone()).collect();
        let index = terms
            .iter()
            .enumerate()
            .map(|(position, term)| (term.clone(), position))
            .collect();
        let idf = candidates
            .iter()
            .map(|(_, df, _)| {
                ((1.0 + document_count as f32) / (1.0 + *df as f32)).ln() + 1.0
            })
            .collect();

        Self {
            terms,
            index,
            idf,
            document_count,
        }
    }

    /// Number of terms, i.e. the embedding dimension of this epoch.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the vocabulary holds no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of documents this epoch was fitted on.
    pub fn document_count(&self) -> usize {
        self.document_count
    }

    /// Embed text against this snapshot: term frequency scaled by IDF.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.terms.len()];
        if text.trim().is_empty() {
            return vector;
        }
        for term in extract_terms(text) {
            if let Some(&position) = self.index.get(&term) {
                vector[position] += self.idf[position];
            }
        }
        if !vector.is_empty() && vector.iter().all(|&value| value == 0.0) {
            tracing::debug!("Embedding produced a zero vector; applying epsilon");
            for value in &mut vector {
                *value += ZERO_VECTOR_EPSILON;
            }
        }
        vector
    }
}

/// Lowercased unigrams and adjacent bigrams, stop words removed.
///
/// Tokens are alphanumeric runs of at least two characters; bigrams are built
/// after stop-word removal, matching how the vocabulary was originally
/// fitted.
fn extract_terms(text: &str) -> Vec<String> {
    let tokens: Vec<String> = text
        .to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| token.chars().count() >= 2)
        .filter(|token| !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect();

    let mut terms = tokens.clone();
    for pair in tokens.windows(2) {
        terms.push(format!("{} {}", pair[0], pair[1]));
    }
    terms
}

/// Pad with zeros or truncate an embedding to the target length.
///
/// Applied at read time only; the stored value is never mutated.
pub fn reconcile(mut embedding: Vec<f32>, target_len: usize) -> Vec<f32> {
    if embedding.len() != target_len {
        tracing::trace!(
            actual = embedding.len(),
            expected = target_len,
            "Reconciling embedding dimension"
        );
        embedding.resize(target_len, 0.0);
    }
    embedding
}

/// Process-wide embedding store holding the current vocabulary snapshot.
#[derive(Default)]
pub struct EmbeddingStore {
    vocabulary: RwLock<Option<Arc<Vocabulary>>>,
    max_features: usize,
}

impl EmbeddingStore {
    /// Create a store that caps fitted vocabularies at `max_features` terms.
    pub fn new(max_features: usize) -> Self {
        Self {
            vocabulary: RwLock::new(None),
            max_features,
        }
    }

    /// Fit a new vocabulary snapshot over the corpus and swap it in.
    ///
    /// An empty corpus leaves the current snapshot untouched.
    pub fn fit(&self, corpus: &[String]) {
        if corpus.is_empty() {
            tracing::debug!("Skipping vocabulary fit for empty corpus");
            return;
        }
        let min_df = if corpus.len() == 1 {
            1
        } else {
            MIN_DOCUMENT_FREQUENCY
        };
        let vocabulary = Vocabulary::fit(corpus, self.max_features, min_df);
        tracing::info!(
            documents = corpus.len(),
            vocab_size = vocabulary.len(),
            "Fitted vocabulary snapshot"
        );
        let mut slot = self
            .vocabulary
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(Arc::new(vocabulary));
    }

    /// The current snapshot, if any fit has happened.
    pub fn snapshot(&self) -> Option<Arc<Vocabulary>> {
        self.vocabulary
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current vocabulary size; zero before the first fit.
    pub fn vocab_size(&self) -> usize {
        self.snapshot().map_or(0, |vocabulary| vocabulary.len())
    }

    /// Embed text under the current snapshot.
    ///
    /// Empty or whitespace input yields an all-zero vector of the current
    /// vocabulary length. When no vocabulary exists yet and the text is
    /// non-empty, a one-document bootstrap fit is performed first; the
    /// resulting vector is usable but low quality.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(vocabulary) = self.snapshot() {
            return vocabulary.embed(text);
        }
        if text.trim().is_empty() {
            return Vec::new();
        }
        tracing::warn!("Embedding requested before any vocabulary fit; bootstrapping from input");
        self.fit(std::slice::from_ref(&text.to_string()));
        self.snapshot()
            .map(|vocabulary| vocabulary.embed(text))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "policy_number: P1\ninsurer_name: Hawkeye Insurance".to_string(),
            "coverage_type: Coverage A - Dwelling\nlimit: 250000.00".to_string(),
            "coverage_type: Coverage B - Other Structures\nlimit: 25000.00".to_string(),
            "The dwelling coverage limit applies per occurrence".to_string(),
        ]
    }

    #[test]
    fn embeddings_share_length_within_one_epoch() {
        let store = EmbeddingStore::new(1000);
        store.fit(&corpus());
        let size = store.vocab_size();
        assert!(size > 0);
        for document in corpus() {
            assert_eq!(store.embed(&document).len(), size);
        }
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let store = EmbeddingStore::new(1000);
        store.fit(&corpus());
        let vector = store.embed("");
        assert_eq!(vector.len(), store.vocab_size());
        assert!(vector.iter().all(|&value| value == 0.0));
    }

    #[test]
    fn unknown_terms_get_epsilon_not_zero() {
        let store = EmbeddingStore::new(1000);
        store.fit(&corpus());
        let vector = store.embed("zzzz qqqq xxxx");
        assert!(vector.iter().all(|&value| value > 0.0));
        assert!(vector.iter().all(|&value| value <= ZERO_VECTOR_EPSILON));
    }

    #[test]
    fn bootstrap_fit_happens_on_first_embed() {
        let store = EmbeddingStore::new(1000);
        assert_eq!(store.vocab_size(), 0);
        let vector = store.embed("dwelling coverage limit dwelling");
        assert!(store.vocab_size() > 0);
        assert_eq!(vector.len(), store.vocab_size());
        assert!(vector.iter().any(|&value| value > 0.0));
    }

    #[test]
    fn embed_before_fit_with_empty_text_returns_empty_vector() {
        let store = EmbeddingStore::new(1000);
        assert!(store.embed("   ").is_empty());
        assert_eq!(store.vocab_size(), 0);
    }

    #[test]
    fn refit_swaps_snapshot_atomically() {
        let store = EmbeddingStore::new(1000);
        store.fit(&corpus());
        let old = store.snapshot().expect("snapshot");
        store.fit(&["wind hail deductible".to_string(), "wind hail limit".to_string()]);
        let new = store.snapshot().expect("snapshot");
        assert!(!Arc::ptr_eq(&old, &new));
        // The old snapshot stays valid for readers that bound to it.
        assert_eq!(old.embed("dwelling coverage").len(), old.len());
    }

    #[test]
    fn reconcile_pads_and_truncates() {
        assert_eq!(reconcile(vec![1.0, 2.0], 4), vec![1.0, 2.0, 0.0, 0.0]);
        assert_eq!(reconcile(vec![1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        let unchanged = vec![0.5, 0.5];
        assert_eq!(reconcile(unchanged.clone(), 2), unchanged);
    }

    #[test]
    fn document_frequency_floor_prunes_singleton_terms() {
        let docs = vec![
            "dwelling coverage limit".to_string(),
            "dwelling coverage amount".to_string(),
            "unrelated singleton verbiage".to_string(),
        ];
        let vocabulary = Vocabulary::fit(&docs, 1000, 2);
        assert!(vocabulary.index.contains_key("dwelling"));
        assert!(!vocabulary.index.contains_key("singleton"));
    }

    #[test]
    fn max_features_caps_vocabulary_by_corpus_frequency() {
        let docs = vec![
            "alpha alpha alpha beta gamma".to_string(),
            "alpha beta gamma delta".to_string(),
        ];
        let vocabulary = Vocabulary::fit(&docs, 2, 2);
        assert_eq!(vocabulary.len(), 2);
        assert!(vocabulary.index.contains_key("alpha"));
    }

    #[test]
    fn bigrams_join_adjacent_tokens() {
        let terms = extract_terms("Coverage A - Dwelling");
        assert!(terms.contains(&"coverage".to_string()));
        assert!(terms.contains(&"dwelling".to_string()));
        assert!(terms.contains(&"coverage dwelling".to_string()));
    }
}
