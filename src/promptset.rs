//! Set algebra over two whole prompts.
//!
//! Tokens are compared by name and weight. Results contain no duplicates and list tokens in the
//! order they are first seen, scanning the left operand before the right one.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashSet;

use crate::error::{Result, SaniproError};
use crate::token::Token;

/// A set operation between two prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    /// Tokens present in either prompt.
    Union,
    /// Tokens present in both prompts.
    Intersection,
    /// Tokens present in exactly one prompt.
    SymmetricDifference,
    /// Tokens of the first prompt missing from the second, or the other way round when reversed.
    Difference {
        /// Swap the operands.
        reverse: bool,
    },
}

impl SetOperation {
    /// Names accepted by [`SetOperation::from_str`].
    #[must_use]
    pub fn choices() -> &'static [&'static str] {
        &["union", "intersection", "symmetric-difference", "difference"]
    }

    /// Applies the operation to `a` and `b`.
    #[must_use]
    pub fn apply(&self, a: &[Token], b: &[Token]) -> Vec<Token> {
        match *self {
            Self::Union => distinct(a.iter().chain(b)),
            Self::Intersection => {
                let right: FxHashSet<&Token> = b.iter().collect();
                distinct(a.iter().filter(|token| right.contains(token)))
            }
            Self::SymmetricDifference => {
                let left: FxHashSet<&Token> = a.iter().collect();
                let right: FxHashSet<&Token> = b.iter().collect();
                distinct(
                    a.iter()
                        .filter(|token| !right.contains(token))
                        .chain(b.iter().filter(|token| !left.contains(token))),
                )
            }
            Self::Difference { reverse } => {
                let (keep, remove) = if reverse { (b, a) } else { (a, b) };
                let remove: FxHashSet<&Token> = remove.iter().collect();
                distinct(keep.iter().filter(|token| !remove.contains(token)))
            }
        }
    }
}

fn distinct<'a>(tokens: impl Iterator<Item = &'a Token>) -> Vec<Token> {
    let mut seen = FxHashSet::default();
    tokens
        .filter(|token| seen.insert(*token))
        .cloned()
        .collect()
}

impl fmt::Display for SetOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Union => f.write_str("union"),
            Self::Intersection => f.write_str("intersection"),
            Self::SymmetricDifference => f.write_str("symmetric-difference"),
            Self::Difference { reverse: false } => f.write_str("difference"),
            Self::Difference { reverse: true } => f.write_str("difference (reversed)"),
        }
    }
}

impl FromStr for SetOperation {
    type Err = SaniproError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "intersection" => Ok(Self::Intersection),
            "symmetric-difference" | "symmetric_difference" => Ok(Self::SymmetricDifference),
            "difference" => Ok(Self::Difference { reverse: false }),
            other => Err(SaniproError::InvalidConfig(format!(
                "unknown set operation {other:?}; expected one of {}",
                Self::choices().join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(names: &[&str]) -> Vec<Token> {
        names.iter().map(|&name| Token::plain(name)).collect()
    }

    #[test]
    fn union_keeps_first_seen_order() {
        let a = prompt(&["a", "b", "a"]);
        let b = prompt(&["c", "b"]);
        assert_eq!(SetOperation::Union.apply(&a, &b), prompt(&["a", "b", "c"]));
    }

    #[test]
    fn intersection_and_symmetric_difference() {
        let a = prompt(&["a", "b", "c"]);
        let b = prompt(&["d", "c", "b"]);
        assert_eq!(SetOperation::Intersection.apply(&a, &b), prompt(&["b", "c"]));
        assert_eq!(
            SetOperation::SymmetricDifference.apply(&a, &b),
            prompt(&["a", "d"])
        );
    }

    #[test]
    fn difference_respects_reverse() {
        let a = prompt(&["a", "b"]);
        let b = prompt(&["b", "c"]);
        assert_eq!(
            SetOperation::Difference { reverse: false }.apply(&a, &b),
            prompt(&["a"])
        );
        assert_eq!(
            SetOperation::Difference { reverse: true }.apply(&a, &b),
            prompt(&["c"])
        );
    }

    #[test]
    fn weights_distinguish_tokens() {
        let a = vec![Token::new("a", 1.2)];
        let b = vec![Token::plain("a")];
        assert!(SetOperation::Intersection.apply(&a, &b).is_empty());
        assert_eq!(SetOperation::Union.apply(&a, &b).len(), 2);
    }

    #[test]
    fn operation_names() {
        assert_eq!(
            "symmetric-difference".parse::<SetOperation>().unwrap(),
            SetOperation::SymmetricDifference
        );
        assert!("product".parse::<SetOperation>().is_err());
    }
}
