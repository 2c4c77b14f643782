//! Sanitizer toolkit for weighted Stable Diffusion tag prompts.
//!
//! The crate exposes both a library API and a `sanipro` command line interface.
//! Prompts such as `1girl, (smile:1.2), (cat, (bow:1.1):1.3)` are tokenized into
//! weighted [`Token`]s, folded through an ordered list of [`Filter`]s, and rendered
//! back in the A1111 or CSV dialect.
//!
//! ```no_run
//! use sanipro::{Filter, Pipeline, UniqueFilter};
//!
//! # fn main() -> sanipro::Result<()> {
//! let mut pipeline = Pipeline::builder()
//!     .filter(Filter::round_up(2)?)
//!     .filter(Filter::Unique(UniqueFilter { reverse: true }))
//!     .build()?;
//! pipeline.execute("1girl, (smile:1.256), smile")?;
//! assert_eq!(pipeline.render(), "1girl, (smile:1.26)");
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature.  Users targeting the
//! library portion only can disable default features to avoid the CLI
//! dependencies: `sanipro = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod format;
pub mod parser;
pub mod pipeline;
pub mod promptset;
pub mod reorder;
pub mod similarity;
pub mod token;
pub mod tokenizer;

pub use config::{Config, Delimiter, TokenDialect};
pub use diff::DiffReport;
pub use error::{Result, SaniproError};
pub use filter::{
    ExcludeFilter, Filter, MaskFilter, RandomFilter, ResetFilter, RoundUpFilter, SimilarFilter,
    SortAllFilter, SortFilter, SortKey, TranslateFilter, UniqueFilter,
};
pub use format::TokenFormatter;
pub use parser::{A1111Parser, WeightSyntax};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineResult, PreHook};
pub use promptset::SetOperation;
pub use reorder::{GreedyStart, ReorderMethod, Reorderer};
pub use similarity::{
    LevenshteinSimilarity, SequenceMatcherSimilarity, SimilarityMetric, SimilarityStrategy,
};
pub use token::{Token, DEFAULT_WEIGHT};
pub use tokenizer::Tokenizer;
