//! Per-token output formatting for the supported prompt dialects.

use serde::{Deserialize, Serialize};

use crate::token::{Token, DEFAULT_WEIGHT};

/// Renders tokens back into prompt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenFormatter {
    /// `name` for neutral weights, `(name:weight)` otherwise.
    A1111,
    /// `name<field_separator>weight` for every token.
    Csv {
        /// Separator placed between the name and the weight.
        field_separator: String,
    },
}

impl TokenFormatter {
    /// Formats a single token.
    #[must_use]
    pub fn format(&self, token: &Token) -> String {
        match self {
            Self::A1111 => format_a1111_token(token),
            Self::Csv { field_separator } => format_csv_token(token, field_separator),
        }
    }

    /// Formats every token and joins them with `delimiter`.
    #[must_use]
    pub fn join(&self, tokens: &[Token], delimiter: &str) -> String {
        tokens
            .iter()
            .map(|token| self.format(token))
            .collect::<Vec<_>>()
            .join(delimiter)
    }
}

/// Formats a token in A1111 emphasis syntax.
#[must_use]
pub fn format_a1111_token(token: &Token) -> String {
    if token.weight() == DEFAULT_WEIGHT {
        return token.name().to_owned();
    }
    format!("({}:{})", token.name(), format_weight(token.weight()))
}

/// Formats a token as a `name<sep>weight` record.
#[must_use]
pub fn format_csv_token(token: &Token, field_separator: &str) -> String {
    format!(
        "{}{}{}",
        token.name(),
        field_separator,
        format_weight(token.weight())
    )
}

/// Shortest round-trip representation, keeping a trailing `.0` on integral weights.
fn format_weight(weight: f64) -> String {
    format!("{weight:?}")
}
