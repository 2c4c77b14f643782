//! Before/after comparison of a pipeline run.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::token::Token;

/// Summary of how a token sequence changed while passing through the filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffReport {
    /// Number of tokens before filtering.
    pub before_count: usize,
    /// Number of tokens after filtering.
    pub after_count: usize,
    /// `before_count - after_count`; negative when filters added tokens.
    pub reduced_count: isize,
    /// Names occurring more than once before filtering.
    pub duplicated: BTreeSet<String>,
}

impl DiffReport {
    /// Compares `before` with `after`.
    #[must_use]
    pub fn new(before: &[Token], after: &[Token]) -> Self {
        let mut occurrences: FxHashMap<&str, usize> = FxHashMap::default();
        for token in before {
            *occurrences.entry(token.name()).or_insert(0) += 1;
        }
        let duplicated = occurrences
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(name, _)| name.to_owned())
            .collect();
        Self {
            before_count: before.len(),
            after_count: after.len(),
            reduced_count: signed(before.len()) - signed(after.len()),
            duplicated,
        }
    }
}

fn signed(count: usize) -> isize {
    isize::try_from(count).unwrap_or(isize::MAX)
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "before: {} tokens", self.before_count)?;
        writeln!(f, "after: {} tokens", self.after_count)?;
        write!(f, "reduced: {}", self.reduced_count)?;
        if !self.duplicated.is_empty() {
            let names: Vec<&str> = self.duplicated.iter().map(String::as_str).collect();
            write!(f, "\nduplicated: {}", names.join(", "))?;
        }
        Ok(())
    }
}
