//! The weighted prompt token shared by every stage of the crate.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Neutral emphasis weight assigned to plain tags.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// An immutable `(name, weight)` pair produced by tokenizers and rewritten by filters.
///
/// Equality and hashing are structural over both fields. Weights are compared by bit pattern with
/// `-0.0` folded into `0.0`, so `Eq` and `Hash` agree for every finite weight.
#[must_use]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    name: String,
    weight: f64,
}

impl Token {
    /// Creates a token from its name and weight.
    pub fn new(name: impl Into<String>, weight: f64) -> Self {
        debug_assert!(weight.is_finite(), "token weights must be finite");
        Self {
            name: name.into(),
            weight,
        }
    }

    /// Creates a token carrying [`DEFAULT_WEIGHT`].
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_WEIGHT)
    }

    /// Returns the tag text.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the emphasis weight.
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    /// Returns the number of characters in the name.
    #[must_use]
    pub fn length(&self) -> usize {
        self.name.chars().count()
    }

    /// Returns a copy with either field substituted; `None` keeps the current value.
    pub fn replace(&self, new_name: Option<&str>, new_weight: Option<f64>) -> Self {
        Self::new(
            new_name.unwrap_or(&self.name),
            new_weight.unwrap_or(self.weight),
        )
    }

    /// Returns a copy with a different name and the same weight.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.weight)
    }

    /// Returns a copy with a different weight and the same name.
    pub fn with_weight(&self, weight: f64) -> Self {
        Self::new(self.name.clone(), weight)
    }

    /// Splits the token into its owned parts.
    #[must_use]
    pub fn into_parts(self) -> (String, f64) {
        (self.name, self.weight)
    }

    fn weight_bits(&self) -> u64 {
        if self.weight == 0.0 {
            0.0f64.to_bits()
        } else {
            self.weight.to_bits()
        }
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.weight_bits() == other.weight_bits()
    }
}

impl Eq for Token {}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.weight_bits().hash(state);
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {:?})", self.name, self.weight)
    }
}
