//! Pairwise string similarity used by the reordering engine.

use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;

use similar::TextDiff;

use crate::error::{Result, SaniproError};

/// Scores how alike two token names are, from `0.0` (unrelated) to `1.0` (identical).
pub trait SimilarityStrategy: Debug + Send + Sync {
    /// Returns the similarity of `a` and `b`.
    fn calculate_similarity(&self, a: &str, b: &str) -> f64;
}

/// Character-level matching-blocks ratio, `2 * matches / (len(a) + len(b))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceMatcherSimilarity;

impl SimilarityStrategy for SequenceMatcherSimilarity {
    fn calculate_similarity(&self, a: &str, b: &str) -> f64 {
        f64::from(TextDiff::from_chars(a, b).ratio())
    }
}

/// Normalised Levenshtein similarity, `1 - distance / max(len(a), len(b))`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenshteinSimilarity;

impl SimilarityStrategy for LevenshteinSimilarity {
    fn calculate_similarity(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let longest = a.len().max(b.len());
        if longest == 0 {
            return 1.0;
        }
        1.0 - levenshtein(&a, &b) as f64 / longest as f64
    }
}

/// Named similarity strategies selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// [`SequenceMatcherSimilarity`].
    #[default]
    SequenceMatcher,
    /// [`LevenshteinSimilarity`].
    Levenshtein,
}

impl SimilarityMetric {
    /// Returns a shareable instance of the strategy.
    #[must_use]
    pub fn strategy(self) -> Arc<dyn SimilarityStrategy> {
        match self {
            Self::SequenceMatcher => Arc::new(SequenceMatcherSimilarity),
            Self::Levenshtein => Arc::new(LevenshteinSimilarity),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = SaniproError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequence" | "sequence-matcher" => Ok(Self::SequenceMatcher),
            "levenshtein" => Ok(Self::Levenshtein),
            other => Err(SaniproError::InvalidConfig(format!(
                "unknown similarity strategy {other:?}; expected sequence-matcher or levenshtein"
            ))),
        }
    }
}

/// Edit distance over chars with a single rolling row.
fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let substitution = diagonal + usize::from(ca != cb);
            row[j + 1] = substitution.min(above + 1).min(row[j] + 1);
            diagonal = above;
        }
    }
    row[b.len()]
}
