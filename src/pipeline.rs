//! Prompt processing pipeline: pre-hooks, tokenization, and an ordered fold of filters.

use log::debug;

use crate::config::{Config, Delimiter, TokenDialect};
use crate::diff::DiffReport;
use crate::error::Result;
use crate::filter::Filter;
use crate::format::TokenFormatter;
use crate::token::Token;
use crate::tokenizer::Tokenizer;

/// String-level transform applied to the raw prompt before tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreHook {
    /// Strips surrounding whitespace.
    Trim,
    /// Appends the input delimiter when the prompt does not already end with it.
    EnsureTrailingDelimiter,
    /// Replaces line breaks with the input delimiter.
    NewlinesToDelimiter,
}

impl PreHook {
    /// Applies the hook to `prompt`.
    #[must_use]
    pub fn apply(self, prompt: &str, delimiter: &str) -> String {
        match self {
            Self::Trim => prompt.trim().to_owned(),
            Self::EnsureTrailingDelimiter => {
                if delimiter.is_empty() || prompt.ends_with(delimiter) {
                    prompt.to_owned()
                } else {
                    format!("{prompt}{delimiter}")
                }
            }
            Self::NewlinesToDelimiter => prompt.replace("\r\n", "\n").replace('\n', delimiter),
        }
    }
}

/// Tokens before and after the most recent [`Pipeline::execute`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    /// Output of the tokenizer.
    pub input: Vec<Token>,
    /// Output of the last filter.
    pub output: Vec<Token>,
}

impl PipelineResult {
    /// Compares the tokenized input with the filtered output.
    #[must_use]
    pub fn report(&self) -> DiffReport {
        DiffReport::new(&self.input, &self.output)
    }
}

/// Tokenizes prompts and runs them through an ordered list of filters.
#[derive(Debug, Clone)]
pub struct Pipeline {
    tokenizer: Tokenizer,
    pre_hooks: Vec<PreHook>,
    filters: Vec<Filter>,
    formatter: TokenFormatter,
    output_delimiter: String,
    result: Option<PipelineResult>,
}

impl Pipeline {
    /// Returns a builder with default configuration.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Appends a filter after the existing ones.
    pub fn append(&mut self, filter: Filter) -> &mut Self {
        self.filters.push(filter);
        self
    }

    /// Returns the filters in execution order.
    #[must_use]
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Removes every filter.
    pub fn clear_filters(&mut self) {
        self.filters.clear();
    }

    /// Returns the tokenizer.
    #[must_use]
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Applies the pre-hooks and tokenizes `prompt` without filtering.
    pub fn tokenize(&self, prompt: &str) -> Result<Vec<Token>> {
        let delimiter = self.tokenizer.delimiter();
        let prompt = self
            .pre_hooks
            .iter()
            .fold(prompt.to_owned(), |text, hook| hook.apply(&text, &delimiter));
        self.tokenizer.tokenize(&prompt)
    }

    /// Tokenizes `prompt` and folds the filters over the tokens.
    pub fn execute(&mut self, prompt: &str) -> Result<&[Token]> {
        let input = self.tokenize(prompt)?;
        let output = self.apply(input.clone());
        let result = self.result.insert(PipelineResult { input, output });
        Ok(result.output.as_slice())
    }

    /// Folds the filters over already tokenized input.
    #[must_use]
    pub fn apply(&self, tokens: Vec<Token>) -> Vec<Token> {
        self.filters.iter().fold(tokens, |tokens, filter| {
            let before = tokens.len();
            let tokens = filter.execute(tokens);
            debug!("{}: {} -> {} tokens", filter.name(), before, tokens.len());
            tokens
        })
    }

    /// Returns the outcome of the most recent [`Pipeline::execute`].
    #[must_use]
    pub fn result(&self) -> Option<&PipelineResult> {
        self.result.as_ref()
    }

    /// Returns the formatter used for output: the last translate target, or the configured one.
    #[must_use]
    pub fn output_format(&self) -> &TokenFormatter {
        self.filters
            .iter()
            .rev()
            .find_map(|filter| match filter {
                Filter::Translate(translate) => Some(&translate.target),
                _ => None,
            })
            .unwrap_or(&self.formatter)
    }

    /// Returns the output delimiter.
    #[must_use]
    pub fn output_delimiter(&self) -> &str {
        &self.output_delimiter
    }

    /// Renders `tokens` with the output format and delimiter.
    #[must_use]
    pub fn render_tokens(&self, tokens: &[Token]) -> String {
        self.output_format().join(tokens, &self.output_delimiter)
    }

    /// Renders the output of the most recent run; empty before the first run.
    #[must_use]
    pub fn render(&self) -> String {
        self.result
            .as_ref()
            .map(|result| self.render_tokens(&result.output))
            .unwrap_or_default()
    }
}

/// Builder for [`Pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    config: Config,
    delimiter: Option<Delimiter>,
    input_dialect: TokenDialect,
    output_dialect: TokenDialect,
    pre_hooks: Vec<PreHook>,
    filters: Vec<Filter>,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            delimiter: None,
            input_dialect: TokenDialect::A1111,
            output_dialect: TokenDialect::A1111,
            pre_hooks: Vec::new(),
            filters: Vec::new(),
        }
    }
}

impl PipelineBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses separators from `config`.
    #[must_use]
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Overrides the token delimiters taken from the configuration.
    #[must_use]
    pub fn delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    /// Sets the dialect of incoming prompts.
    #[must_use]
    pub fn input_dialect(mut self, dialect: TokenDialect) -> Self {
        self.input_dialect = dialect;
        self
    }

    /// Sets the dialect used for rendering.
    #[must_use]
    pub fn output_dialect(mut self, dialect: TokenDialect) -> Self {
        self.output_dialect = dialect;
        self
    }

    /// Adds a pre-hook after the existing ones.
    #[must_use]
    pub fn pre_hook(mut self, hook: PreHook) -> Self {
        self.pre_hooks.push(hook);
        self
    }

    /// Adds a filter after the existing ones.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds several filters in order.
    #[must_use]
    pub fn filters<I>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = Filter>,
    {
        self.filters.extend(filters);
        self
    }

    /// Validates the configuration and constructs the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        self.config.validate()?;
        let delimiter = self
            .delimiter
            .unwrap_or_else(|| self.config.delimiter(self.input_dialect, self.output_dialect));
        let tokenizer = Tokenizer::for_dialect(self.input_dialect, &delimiter, &self.config)?;
        let formatter = self.config.formatter(self.output_dialect);
        debug!(
            "pipeline reads {} and writes {} with {} filters",
            self.input_dialect,
            self.output_dialect,
            self.filters.len()
        );
        Ok(Pipeline {
            tokenizer,
            pre_hooks: self.pre_hooks,
            filters: self.filters,
            formatter,
            output_delimiter: delimiter.output,
            result: None,
        })
    }
}
