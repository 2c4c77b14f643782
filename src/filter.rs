//! Token sequence transformations composed by the pipeline.
//!
//! Each filter is a value of the closed [`Filter`] enum carrying its own parameters. Filters are
//! pure: `execute` consumes a sequence and returns the rewritten one without touching any other
//! state.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashMap;

use crate::error::{Result, SaniproError};
use crate::format::TokenFormatter;
use crate::reorder::Reorderer;
use crate::token::{Token, DEFAULT_WEIGHT};

/// Largest digit count accepted by [`RoundUpFilter`].
pub const MAX_ROUND_DIGITS: u32 = 15;

/// Drops tokens whose name contains any of the excluded substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcludeFilter {
    /// Substrings to look for.
    pub excludes: Vec<String>,
}

impl ExcludeFilter {
    fn matches(&self, token: &Token) -> bool {
        self.excludes
            .iter()
            .any(|needle| token.name().contains(needle.as_str()))
    }
}

/// Replaces the name of tokens containing any excluded substring, keeping the weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskFilter {
    /// Substrings to look for.
    pub excludes: Vec<String>,
    /// Replacement name.
    pub replace_to: String,
}

/// Rounds every weight to a fixed number of decimal digits, half away from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundUpFilter {
    digits: u32,
}

impl RoundUpFilter {
    /// Creates the filter, rejecting digit counts above [`MAX_ROUND_DIGITS`].
    pub fn new(digits: u32) -> Result<Self> {
        if digits > MAX_ROUND_DIGITS {
            return Err(SaniproError::InvalidConfig(format!(
                "cannot round weights to {digits} digits; the maximum is {MAX_ROUND_DIGITS}"
            )));
        }
        Ok(Self { digits })
    }

    /// Returns the digit count.
    #[must_use]
    pub fn digits(&self) -> u32 {
        self.digits
    }

    fn round(&self, weight: f64) -> f64 {
        let scale = 10f64.powi(self.digits as i32);
        let rounded = (weight * scale).round() / scale;
        if rounded.is_finite() {
            rounded
        } else {
            weight
        }
    }
}

/// Shuffles the sequence; a seed makes the permutation repeatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RandomFilter {
    /// Optional RNG seed.
    pub seed: Option<u64>,
}

/// Sets every weight to a fixed value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResetFilter {
    new_value: f64,
}

impl ResetFilter {
    /// Creates the filter, rejecting non-finite replacement weights.
    pub fn new(new_value: f64) -> Result<Self> {
        if !new_value.is_finite() {
            return Err(SaniproError::InvalidConfig(format!(
                "cannot reset weights to {new_value}; the weight must be finite"
            )));
        }
        Ok(Self { new_value })
    }

    /// Returns the replacement weight.
    #[must_use]
    pub fn new_value(&self) -> f64 {
        self.new_value
    }
}

impl Default for ResetFilter {
    fn default() -> Self {
        Self {
            new_value: DEFAULT_WEIGHT,
        }
    }
}

/// Groups tokens by name and sorts each group by weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortFilter {
    /// Sort each group by descending weight.
    pub reverse: bool,
}

/// Sort keys available to [`SortAllFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Name, compared by Unicode scalar values.
    #[default]
    Lexicographical,
    /// Number of characters in the name.
    Length,
    /// Emphasis weight.
    Weight,
    /// Sum of the code points of the name.
    OrdSum,
}

impl SortKey {
    /// Names accepted by [`SortKey::from_str`].
    #[must_use]
    pub fn choices() -> &'static [&'static str] {
        &["lexicographical", "length", "weight", "ord-sum"]
    }

    fn compare(self, a: &Token, b: &Token) -> Ordering {
        match self {
            Self::Lexicographical => a.name().cmp(b.name()),
            Self::Length => a.length().cmp(&b.length()),
            Self::Weight => a.weight().total_cmp(&b.weight()),
            Self::OrdSum => ord_sum(a).cmp(&ord_sum(b)),
        }
    }
}

fn ord_sum(token: &Token) -> u64 {
    token.name().chars().map(|ch| u64::from(u32::from(ch))).sum()
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lexicographical => "lexicographical",
            Self::Length => "length",
            Self::Weight => "weight",
            Self::OrdSum => "ord-sum",
        };
        f.write_str(name)
    }
}

impl FromStr for SortKey {
    type Err = SaniproError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexicographical" | "lexicographic" => Ok(Self::Lexicographical),
            "length" => Ok(Self::Length),
            "weight" | "strength" => Ok(Self::Weight),
            "ord-sum" => Ok(Self::OrdSum),
            other => Err(SaniproError::InvalidConfig(format!(
                "unknown sort key {other:?}; expected one of {}",
                Self::choices().join(", ")
            ))),
        }
    }
}

/// Sorts the whole sequence by one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortAllFilter {
    /// Key to sort by.
    pub key: SortKey,
    /// Sort in descending order.
    pub reverse: bool,
}

/// Keeps one token per name: the lightest, or the heaviest when reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UniqueFilter {
    /// Keep the heaviest token instead of the lightest.
    pub reverse: bool,
}

/// Reorders tokens so that similar names are adjacent.
#[derive(Debug, Clone)]
pub struct SimilarFilter {
    /// Reordering engine.
    pub reorderer: Reorderer,
    /// Reverse the final order.
    pub reverse: bool,
}

/// Marks the output dialect; the tokens themselves pass through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateFilter {
    /// Formatter used to render the result.
    pub target: TokenFormatter,
}

/// A single pipeline stage.
#[derive(Debug, Clone)]
pub enum Filter {
    /// See [`ExcludeFilter`].
    Exclude(ExcludeFilter),
    /// See [`MaskFilter`].
    Mask(MaskFilter),
    /// See [`RoundUpFilter`].
    RoundUp(RoundUpFilter),
    /// See [`RandomFilter`].
    Random(RandomFilter),
    /// See [`ResetFilter`].
    Reset(ResetFilter),
    /// See [`SortFilter`].
    Sort(SortFilter),
    /// See [`SortAllFilter`].
    SortAll(SortAllFilter),
    /// See [`UniqueFilter`].
    Unique(UniqueFilter),
    /// See [`SimilarFilter`].
    Similar(SimilarFilter),
    /// See [`TranslateFilter`].
    Translate(TranslateFilter),
}

impl Filter {
    /// Drops tokens containing any of `excludes`.
    pub fn exclude<I, S>(excludes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Exclude(ExcludeFilter {
            excludes: excludes.into_iter().map(Into::into).collect(),
        })
    }

    /// Renames tokens containing any of `excludes` to `replace_to`.
    pub fn mask<I, S>(excludes: I, replace_to: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Mask(MaskFilter {
            excludes: excludes.into_iter().map(Into::into).collect(),
            replace_to: replace_to.into(),
        })
    }

    /// Rounds weights to `digits` decimal places.
    pub fn round_up(digits: u32) -> Result<Self> {
        RoundUpFilter::new(digits).map(Self::RoundUp)
    }

    /// Stable name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Exclude(_) => "exclude",
            Self::Mask(_) => "mask",
            Self::RoundUp(_) => "roundup",
            Self::Random(_) => "random",
            Self::Reset(_) => "reset",
            Self::Sort(_) => "sort",
            Self::SortAll(_) => "sort-all",
            Self::Unique(_) => "unique",
            Self::Similar(_) => "similar",
            Self::Translate(_) => "translate",
        }
    }

    /// Applies the filter.
    #[must_use]
    pub fn execute(&self, tokens: Vec<Token>) -> Vec<Token> {
        match self {
            Self::Exclude(filter) => tokens
                .into_iter()
                .filter(|token| !filter.matches(token))
                .collect(),
            Self::Mask(filter) => tokens
                .into_iter()
                .map(|token| {
                    let masked = filter
                        .excludes
                        .iter()
                        .any(|needle| token.name().contains(needle.as_str()));
                    if masked {
                        token.with_name(filter.replace_to.as_str())
                    } else {
                        token
                    }
                })
                .collect(),
            Self::RoundUp(filter) => tokens
                .into_iter()
                .map(|token| {
                    let weight = filter.round(token.weight());
                    token.with_weight(weight)
                })
                .collect(),
            Self::Random(filter) => {
                let mut tokens = tokens;
                let mut rng = match filter.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                tokens.shuffle(&mut rng);
                tokens
            }
            Self::Reset(filter) => tokens
                .into_iter()
                .map(|token| token.with_weight(filter.new_value()))
                .collect(),
            Self::Sort(filter) => group_by_name(tokens, filter.reverse)
                .into_iter()
                .flatten()
                .collect(),
            Self::SortAll(filter) => {
                let mut tokens = tokens;
                if filter.reverse {
                    tokens.sort_by(|a, b| filter.key.compare(b, a));
                } else {
                    tokens.sort_by(|a, b| filter.key.compare(a, b));
                }
                tokens
            }
            Self::Unique(filter) => group_by_name(tokens, filter.reverse)
                .into_iter()
                .filter_map(|group| group.into_iter().next())
                .collect(),
            Self::Similar(filter) => {
                let mut reordered = filter.reorderer.find_optimal_order(&tokens);
                if filter.reverse {
                    reordered.reverse();
                }
                reordered
            }
            Self::Translate(filter) => {
                debug!("translating {} tokens for {:?}", tokens.len(), filter.target);
                tokens
            }
        }
    }
}

/// Groups tokens by name in first-seen order, each group stably sorted by weight.
fn group_by_name(tokens: Vec<Token>, descending: bool) -> Vec<Vec<Token>> {
    let mut index: FxHashMap<String, usize> = FxHashMap::default();
    let mut groups: Vec<Vec<Token>> = Vec::new();
    for token in tokens {
        match index.get(token.name()) {
            Some(&slot) => groups[slot].push(token),
            None => {
                index.insert(token.name().to_owned(), groups.len());
                groups.push(vec![token]);
            }
        }
    }
    for group in &mut groups {
        if descending {
            group.sort_by(|a, b| b.weight().total_cmp(&a.weight()));
        } else {
            group.sort_by(|a, b| a.weight().total_cmp(&b.weight()));
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reorder::{GreedyStart, ReorderMethod};

    fn tokens(items: &[(&str, f64)]) -> Vec<Token> {
        items
            .iter()
            .map(|&(name, weight)| Token::new(name, weight))
            .collect()
    }

    #[test]
    fn exclude_drops_substring_matches() {
        let filter = Filter::exclude(["hair"]);
        let out = filter.execute(tokens(&[("white hair", 1.2), ("thighhighs", 1.0)]));
        assert_eq!(out, tokens(&[("thighhighs", 1.0)]));
    }

    #[test]
    fn mask_replaces_names_only() {
        let filter = Filter::mask(["white"], "%%%");
        let out = filter.execute(tokens(&[("white hair", 1.2), ("thighhighs", 1.0)]));
        assert_eq!(out, tokens(&[("%%%", 1.2), ("thighhighs", 1.0)]));
    }

    #[test]
    fn round_up_rounds_half_away_from_zero() {
        let filter = Filter::round_up(2).unwrap();
        let out = filter.execute(tokens(&[(":d", 1.25892541179), ("a", -0.125), ("b", 1.0)]));
        assert_eq!(out, tokens(&[(":d", 1.26), ("a", -0.13), ("b", 1.0)]));
        assert!(Filter::round_up(MAX_ROUND_DIGITS + 1).is_err());
    }

    #[test]
    fn random_is_repeatable_with_seed() {
        let input = tokens(&[("a", 1.0), ("b", 1.0), ("c", 1.0), ("d", 1.0), ("e", 1.0)]);
        let filter = Filter::Random(RandomFilter { seed: Some(42) });
        let first = filter.execute(input.clone());
        assert_eq!(first, filter.execute(input.clone()));
        let mut sorted = first;
        sorted.sort_by(|a, b| a.name().cmp(b.name()));
        assert_eq!(sorted, input);
    }

    #[test]
    fn reset_sets_every_weight() {
        let out = Filter::Reset(ResetFilter::default())
            .execute(tokens(&[("a", 1.3), ("b", 0.7)]));
        assert_eq!(out, tokens(&[("a", 1.0), ("b", 1.0)]));
        let out = Filter::Reset(ResetFilter::new(0.5).unwrap()).execute(tokens(&[("a", 1.3)]));
        assert_eq!(out, tokens(&[("a", 0.5)]));
    }

    #[test]
    fn reset_rejects_non_finite_weights() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = ResetFilter::new(value).unwrap_err();
            assert!(matches!(err, SaniproError::InvalidConfig(_)), "{value}");
        }
        assert_eq!(ResetFilter::new(-0.5).unwrap().new_value(), -0.5);
    }

    #[test]
    fn sort_groups_by_first_seen_name() {
        let input = tokens(&[
            ("shirt", 1.3),
            ("happy", 1.1),
            ("shirt", 1.0),
            ("shirt", 1.2),
            ("happy", 0.9),
        ]);
        let out = Filter::Sort(SortFilter { reverse: false }).execute(input.clone());
        assert_eq!(
            out,
            tokens(&[
                ("shirt", 1.0),
                ("shirt", 1.2),
                ("shirt", 1.3),
                ("happy", 0.9),
                ("happy", 1.1),
            ])
        );
        let out = Filter::Sort(SortFilter { reverse: true }).execute(input);
        assert_eq!(
            out,
            tokens(&[
                ("shirt", 1.3),
                ("shirt", 1.2),
                ("shirt", 1.0),
                ("happy", 1.1),
                ("happy", 0.9),
            ])
        );
    }

    #[test]
    fn unique_keeps_one_token_per_name() {
        let input = tokens(&[("shirt", 1.3), ("shirt", 1.0), ("shirt", 1.2), ("happy", 1.1)]);
        let out = Filter::Unique(UniqueFilter { reverse: false }).execute(input.clone());
        assert_eq!(out, tokens(&[("shirt", 1.0), ("happy", 1.1)]));
        let out = Filter::Unique(UniqueFilter { reverse: true }).execute(input);
        assert_eq!(out, tokens(&[("shirt", 1.3), ("happy", 1.1)]));
    }

    #[test]
    fn sort_all_keys() {
        let input = tokens(&[("bb", 1.2), ("a", 1.5), ("ccc", 0.8), ("ab", 1.0)]);
        let run = |key, reverse| {
            Filter::SortAll(SortAllFilter { key, reverse })
                .execute(input.clone())
                .iter()
                .map(|t| t.name().to_owned())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(SortKey::Lexicographical, false), ["a", "ab", "bb", "ccc"]);
        assert_eq!(run(SortKey::Length, false), ["a", "bb", "ab", "ccc"]);
        assert_eq!(run(SortKey::Length, true), ["ccc", "bb", "ab", "a"]);
        assert_eq!(run(SortKey::Weight, false), ["ccc", "ab", "bb", "a"]);
        assert_eq!(run(SortKey::OrdSum, false), ["a", "ab", "bb", "ccc"]);
    }

    #[test]
    fn sort_key_names() {
        assert_eq!("strength".parse::<SortKey>().unwrap(), SortKey::Weight);
        assert_eq!("lexicographic".parse::<SortKey>().unwrap(), SortKey::Lexicographical);
        assert_eq!("ord-sum".parse::<SortKey>().unwrap(), SortKey::OrdSum);
        assert!("color".parse::<SortKey>().is_err());
        assert_eq!(SortKey::OrdSum.to_string(), "ord-sum");
    }

    #[test]
    fn similar_can_reverse() {
        let reorderer = Reorderer::with_default_strategy(ReorderMethod::Greedy)
            .greedy_start(GreedyStart::Last);
        let filter = Filter::Similar(SimilarFilter {
            reorderer,
            reverse: true,
        });
        let out = filter.execute(tokens(&[("apple", 1.0), ("kiwi", 1.0), ("maple", 1.0)]));
        let names: Vec<_> = out.iter().map(Token::name).collect();
        assert_eq!(names, ["kiwi", "apple", "maple"]);
    }

    #[test]
    fn translate_keeps_tokens() {
        let input = tokens(&[("a", 1.2)]);
        let filter = Filter::Translate(TranslateFilter {
            target: TokenFormatter::A1111,
        });
        assert_eq!(filter.execute(input.clone()), input);
        assert_eq!(filter.name(), "translate");
    }
}
