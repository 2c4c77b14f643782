//! Dialect-aware entry point turning raw prompt text into tokens.

use log::debug;

use crate::config::{Config, Delimiter, TokenDialect};
use crate::error::{Result, SaniproError};
use crate::parser::{parse_weight, A1111Parser, WeightSyntax};
use crate::token::Token;

/// Tokenizer for one input dialect.
#[derive(Debug, Clone)]
pub enum Tokenizer {
    /// Character-level A1111 state machine.
    A1111(A1111Parser),
    /// Record splitter for `name<field separator>weight` lines.
    Csv {
        /// Separator between records.
        token_separator: String,
        /// Separator between the name and weight of a record.
        field_separator: String,
    },
}

impl Tokenizer {
    /// Creates an A1111 tokenizer using the input side of `delimiter`.
    pub fn a1111(delimiter: &Delimiter) -> Result<Self> {
        let delimiter = delimiter.input_char()?;
        WeightSyntax::default().validate(delimiter)?;
        Ok(Self::A1111(A1111Parser::new(delimiter)))
    }

    /// Creates a CSV tokenizer.
    pub fn csv(
        token_separator: impl Into<String>,
        field_separator: impl Into<String>,
    ) -> Result<Self> {
        let token_separator = token_separator.into();
        let field_separator = field_separator.into();
        if token_separator.is_empty() || field_separator.is_empty() {
            return Err(SaniproError::InvalidConfig(
                "csv token and field separators must not be empty".into(),
            ));
        }
        Ok(Self::Csv {
            token_separator,
            field_separator,
        })
    }

    /// Creates the tokenizer for `dialect` with separators taken from `config`.
    ///
    /// The token separator comes from `delimiter` so that command line overrides win over the file.
    pub fn for_dialect(
        dialect: TokenDialect,
        delimiter: &Delimiter,
        config: &Config,
    ) -> Result<Self> {
        match dialect {
            TokenDialect::A1111 => Self::a1111(delimiter),
            TokenDialect::Csv => {
                let field_separator = config.input_field_separator(dialect).ok_or_else(|| {
                    SaniproError::InvalidConfig("csv.input.field_separator is required".into())
                })?;
                Self::csv(delimiter.input.clone(), field_separator)
            }
        }
    }

    /// Returns the dialect this tokenizer reads.
    #[must_use]
    pub fn dialect(&self) -> TokenDialect {
        match self {
            Self::A1111(_) => TokenDialect::A1111,
            Self::Csv { .. } => TokenDialect::Csv,
        }
    }

    /// Returns the token separator as a string.
    #[must_use]
    pub fn delimiter(&self) -> String {
        match self {
            Self::A1111(parser) => parser.delimiter().to_string(),
            Self::Csv {
                token_separator, ..
            } => token_separator.clone(),
        }
    }

    /// Tokenizes `prompt`.
    pub fn tokenize(&self, prompt: &str) -> Result<Vec<Token>> {
        let tokens = match self {
            Self::A1111(parser) => parser.parse(&terminate(prompt, parser.delimiter()))?,
            Self::Csv {
                token_separator,
                field_separator,
            } => tokenize_csv(prompt, token_separator, field_separator),
        };
        debug!("{} tokenizer produced {} tokens", self.dialect(), tokens.len());
        Ok(tokens)
    }
}

/// Strips surrounding whitespace and appends `delimiter` unless the prompt already ends in an
/// unescaped one.
fn terminate(prompt: &str, delimiter: char) -> String {
    let mut prompt = prompt.trim().to_owned();
    if !ends_with_unescaped(&prompt, delimiter) {
        prompt.push(delimiter);
    }
    prompt
}

fn ends_with_unescaped(prompt: &str, delimiter: char) -> bool {
    let Some(body) = prompt.strip_suffix(delimiter) else {
        return false;
    };
    let backslashes = body.chars().rev().take_while(|&ch| ch == '\\').count();
    backslashes % 2 == 0
}

fn tokenize_csv(prompt: &str, token_separator: &str, field_separator: &str) -> Vec<Token> {
    prompt
        .split(token_separator)
        .filter(|record| !record.trim().is_empty())
        .map(|record| match record.rsplit_once(field_separator) {
            Some((name, weight)) => match parse_weight(weight) {
                Some(weight) => Token::new(name.trim(), weight),
                None => Token::plain(record.trim()),
            },
            None => Token::plain(record.trim()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a1111_appends_missing_delimiter() {
        let tokenizer = Tokenizer::a1111(&Delimiter::default()).unwrap();
        let tokens = tokenizer.tokenize("  1girl, (smile:1.2)\n").unwrap();
        assert_eq!(tokens, vec![Token::plain("1girl"), Token::new("smile", 1.2)]);
        assert_eq!(tokenizer.tokenize("1girl,").unwrap(), vec![Token::plain("1girl")]);
    }

    #[test]
    fn a1111_terminates_after_escaped_delimiter() {
        let tokenizer = Tokenizer::a1111(&Delimiter::default()).unwrap();
        assert_eq!(tokenizer.tokenize(r"a\,").unwrap(), vec![Token::plain("a,")]);
        assert_eq!(
            tokenizer.tokenize(r"cat, a\,").unwrap(),
            vec![Token::plain("cat"), Token::plain("a,")]
        );
        assert_eq!(
            tokenizer.tokenize(r"cat, a\\,").unwrap(),
            vec![Token::plain("cat"), Token::plain(r"a\")]
        );
    }

    #[test]
    fn a1111_escapes_inside_literal_recovery() {
        let tokenizer = Tokenizer::a1111(&Delimiter::default()).unwrap();
        assert_eq!(
            tokenizer.tokenize(r"(a:1.5) x\,y, b").unwrap(),
            vec![Token::plain("(a:1.5) x,y"), Token::plain("b")]
        );
    }

    #[test]
    fn csv_overflowing_weight_keeps_whole_record() {
        let tokenizer = Tokenizer::csv("\n", "\t").unwrap();
        let record = format!("a\t{}", "9".repeat(400));
        assert_eq!(tokenizer.tokenize(&record).unwrap(), vec![Token::plain(record)]);
    }

    #[test]
    fn a1111_empty_prompt_yields_one_empty_token() {
        let tokenizer = Tokenizer::a1111(&Delimiter::default()).unwrap();
        assert_eq!(tokenizer.tokenize("   ").unwrap(), vec![Token::plain("")]);
    }

    #[test]
    fn a1111_rejects_unusable_delimiters() {
        assert!(Tokenizer::a1111(&Delimiter::new(", ", ", ")).is_err());
        assert!(Tokenizer::a1111(&Delimiter::new("(", ", ")).is_err());
    }

    #[test]
    fn a1111_uses_custom_delimiter() {
        let tokenizer = Tokenizer::a1111(&Delimiter::new(";", "; ")).unwrap();
        let tokens = tokenizer.tokenize("a, b; (c:0.5)").unwrap();
        assert_eq!(tokens, vec![Token::plain("a, b"), Token::new("c", 0.5)]);
        assert_eq!(tokenizer.delimiter(), ";");
    }

    #[test]
    fn csv_reads_records() {
        let tokenizer = Tokenizer::csv("\n", "\t").unwrap();
        let tokens = tokenizer
            .tokenize("1girl\t1.0\n\nsmile\t1.2\nblue\tsky\nplain\n")
            .unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::plain("1girl"),
                Token::new("smile", 1.2),
                Token::plain("blue\tsky"),
                Token::plain("plain"),
            ]
        );
    }

    #[test]
    fn csv_splits_at_last_field_separator() {
        let tokenizer = Tokenizer::csv("\n", "@").unwrap();
        let tokens = tokenizer.tokenize("a@b@0.5").unwrap();
        assert_eq!(tokens, vec![Token::new("a@b", 0.5)]);
    }

    #[test]
    fn dialect_comes_from_config() {
        let config = Config::default();
        let csv = Tokenizer::for_dialect(TokenDialect::Csv, &Delimiter::new("\n", "\n"), &config)
            .unwrap();
        assert_eq!(csv.dialect(), TokenDialect::Csv);
        let a1111 = Tokenizer::for_dialect(TokenDialect::A1111, &Delimiter::default(), &config)
            .unwrap();
        assert_eq!(a1111.dialect(), TokenDialect::A1111);
        assert!(Tokenizer::csv("", "\t").is_err());
    }
}
