//! Delimiter presets and the YAML configuration file describing each prompt dialect.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SaniproError};
use crate::format::TokenFormatter;

/// Prompt dialects understood by the tokenizer and the formatter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenDialect {
    /// `tag, (tag:1.2),` emphasis syntax.
    A1111,
    /// One `name<field separator>weight` record per token.
    Csv,
}

impl TokenDialect {
    /// Every dialect in declaration order.
    pub const ALL: [TokenDialect; 2] = [TokenDialect::A1111, TokenDialect::Csv];

    /// Names accepted by [`TokenDialect::from_str`].
    #[must_use]
    pub fn choices() -> Vec<&'static str> {
        Self::ALL.iter().map(|dialect| dialect.as_str()).collect()
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A1111 => "a1111",
            Self::Csv => "csv",
        }
    }
}

impl fmt::Display for TokenDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenDialect {
    type Err = SaniproError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a1111" => Ok(Self::A1111),
            "csv" => Ok(Self::Csv),
            other => Err(SaniproError::InvalidConfig(format!(
                "unsupported token type {other:?}; expected one of {}",
                Self::choices().join(", ")
            ))),
        }
    }
}

/// Token delimiters used when reading and writing a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delimiter {
    /// Separator expected between input tokens.
    pub input: String,
    /// Separator placed between rendered tokens.
    pub output: String,
}

impl Default for Delimiter {
    fn default() -> Self {
        Self {
            input: ",".into(),
            output: ", ".into(),
        }
    }
}

impl Delimiter {
    /// Creates a delimiter pair.
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }

    /// Returns the input delimiter as a single character, as the A1111 parser requires.
    pub fn input_char(&self) -> Result<char> {
        single_char(&self.input)
    }
}

fn single_char(value: &str) -> Result<char> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(ch), None) => Ok(ch),
        _ => Err(SaniproError::InvalidConfig(format!(
            "the A1111 input delimiter must be exactly one character, got {value:?}"
        ))),
    }
}

/// Separators for one direction (input or output) of a dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparatorConfig {
    /// Separator between tokens.
    pub token_separator: String,
    /// Separator between the name and weight fields of a record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_separator: Option<String>,
}

impl SeparatorConfig {
    fn new(token_separator: &str, field_separator: Option<&str>) -> Self {
        Self {
            token_separator: token_separator.into(),
            field_separator: field_separator.map(Into::into),
        }
    }
}

/// Input and output separators for one dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectConfig {
    /// Separators used when tokenizing.
    pub input: SeparatorConfig,
    /// Separators used when rendering.
    pub output: SeparatorConfig,
}

/// Contents of a sanipro YAML configuration file.
///
/// ```yaml
/// a1111:
///   input:
///     token_separator: ","
///   output:
///     token_separator: ", "
/// csv:
///   input:
///     token_separator: "\n"
///     field_separator: "\t"
///   output:
///     token_separator: "\n"
///     field_separator: "\t"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Separators for the A1111 dialect.
    pub a1111: DialectConfig,
    /// Separators for the CSV dialect.
    pub csv: DialectConfig,
}

impl Default for Config {
    fn default() -> Self {
        let delimiter = Delimiter::default();
        Self {
            a1111: DialectConfig {
                input: SeparatorConfig::new(&delimiter.input, None),
                output: SeparatorConfig::new(&delimiter.output, None),
            },
            csv: DialectConfig {
                input: SeparatorConfig::new("\n", Some("\t")),
                output: SeparatorConfig::new("\n", Some("\t")),
            },
        }
    }
}

impl Config {
    /// Parses and validates a configuration from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses, and validates a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|err| SaniproError::io(err, Some(path.into())))?;
        Self::from_yaml_str(&text)
    }

    /// Serializes the configuration back to YAML.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Checks the separator invariants of every dialect.
    pub fn validate(&self) -> Result<()> {
        for dialect in TokenDialect::ALL {
            let section = self.section(dialect);
            for (direction, separators) in [("input", &section.input), ("output", &section.output)]
            {
                if separators.token_separator.is_empty() {
                    return Err(SaniproError::InvalidConfig(format!(
                        "{dialect}.{direction}.token_separator must not be empty"
                    )));
                }
                if dialect == TokenDialect::Csv
                    && separators.field_separator.as_deref().map_or(true, str::is_empty)
                {
                    return Err(SaniproError::InvalidConfig(format!(
                        "{dialect}.{direction}.field_separator is required"
                    )));
                }
            }
        }
        single_char(&self.a1111.input.token_separator)?;
        Ok(())
    }

    /// Returns the section for `dialect`.
    #[must_use]
    pub fn section(&self, dialect: TokenDialect) -> &DialectConfig {
        match dialect {
            TokenDialect::A1111 => &self.a1111,
            TokenDialect::Csv => &self.csv,
        }
    }

    /// Returns the delimiter pair for reading `input` and writing `output`.
    #[must_use]
    pub fn delimiter(&self, input: TokenDialect, output: TokenDialect) -> Delimiter {
        Delimiter::new(
            self.section(input).input.token_separator.clone(),
            self.section(output).output.token_separator.clone(),
        )
    }

    /// Returns the field separator used when reading `dialect`, if it has one.
    #[must_use]
    pub fn input_field_separator(&self, dialect: TokenDialect) -> Option<&str> {
        self.section(dialect).input.field_separator.as_deref()
    }

    /// Returns the per-token formatter used when writing `dialect`.
    #[must_use]
    pub fn formatter(&self, dialect: TokenDialect) -> TokenFormatter {
        match dialect {
            TokenDialect::A1111 => TokenFormatter::A1111,
            TokenDialect::Csv => TokenFormatter::Csv {
                field_separator: self
                    .csv
                    .output
                    .field_separator
                    .clone()
                    .unwrap_or_else(|| "\t".into()),
            },
        }
    }
}
