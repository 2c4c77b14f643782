use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use log::{debug, error, info};
use sanipro::{
    Config, Delimiter, Filter, GreedyStart, Pipeline, RandomFilter, ReorderMethod, Reorderer,
    ResetFilter, SetOperation, SimilarFilter, SimilarityMetric, SortAllFilter, SortFilter, SortKey,
    Token, TokenDialect, UniqueFilter,
};
use serde_json::json;

const DEFAULT_MASK: &str = "%%%";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Sanitizer for weighted Stable Diffusion tag prompts",
    long_about = None
)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    /// Token separator of the input (`\n` and `\t` escapes are understood)
    #[arg(short = 'd', long, value_name = "SEP", global = true)]
    input_delimiter: Option<String>,

    /// Token separator of the output (`\n` and `\t` escapes are understood)
    #[arg(short = 's', long, value_name = "SEP", global = true)]
    output_delimiter: Option<String>,

    /// YAML file with per-dialect separators
    #[arg(short = 'c', long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Dialect of the input prompt (a1111, csv)
    #[arg(long, value_name = "TYPE", default_value = "a1111", global = true)]
    input_type: TokenDialect,

    /// Dialect of the rendered prompt (a1111, csv)
    #[arg(long, value_name = "TYPE", default_value = "a1111", global = true)]
    output_type: TokenDialect,

    /// Round weights to this many digits before any other filter
    #[arg(short = 'u', long, value_name = "DIGITS", default_value_t = 2, global = true)]
    roundup: u32,

    /// Drop tokens containing TEXT after every other filter (repeatable)
    #[arg(short = 'x', long, value_name = "TEXT", global = true)]
    exclude: Vec<String>,

    /// Process stdin line by line, reporting bad lines without stopping
    #[arg(short = 'i', long, global = true)]
    interactive: bool,

    /// Emit the tokens and the difference report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replace the names of tokens containing TEXT
    Mask(MaskArgs),
    /// Shuffle tokens
    Random(RandomArgs),
    /// Set every weight to a fixed value
    Reset(ResetArgs),
    /// Reorder tokens so similar names are adjacent
    Similar(SimilarArgs),
    /// Group tokens by name and sort each group by weight
    Sort(ReverseArgs),
    /// Sort every token by one key
    SortAll(SortAllArgs),
    /// Keep a single token per name
    Unique(ReverseArgs),
    /// Combine two prompts with a set operation
    Set(SetArgs),
}

#[derive(Args, Debug)]
struct MaskArgs {
    /// Substrings to mask
    #[arg(required = true, value_name = "TEXT")]
    excludes: Vec<String>,

    /// Replacement name
    #[arg(short = 'r', long, value_name = "TEXT", default_value = DEFAULT_MASK)]
    replace_to: String,
}

#[derive(Args, Debug)]
struct RandomArgs {
    /// Seed for a repeatable shuffle
    #[arg(short = 'b', long, value_name = "SEED")]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct ResetArgs {
    /// Replacement weight
    #[arg(short = 'n', long = "new-value", value_name = "WEIGHT", default_value_t = 1.0)]
    new_value: f64,
}

#[derive(Args, Debug)]
struct SimilarArgs {
    /// Reordering method (naive, greedy, kruskal, prim, mst)
    #[arg(short = 'm', long, value_name = "METHOD", default_value = "kruskal")]
    method: ReorderMethod,

    /// Similarity strategy (sequence-matcher, levenshtein)
    #[arg(long, value_name = "NAME", default_value = "sequence-matcher")]
    strategy: SimilarityMetric,

    /// Seed for the greedy starting token
    #[arg(short = 'b', long, value_name = "SEED")]
    seed: Option<u64>,

    /// Reverse the final order
    #[arg(short = 'r', long)]
    reverse: bool,
}

#[derive(Args, Debug)]
struct ReverseArgs {
    /// Reverse the order
    #[arg(short = 'r', long)]
    reverse: bool,
}

#[derive(Args, Debug)]
struct SortAllArgs {
    /// Sort key (lexicographical, length, weight, ord-sum)
    #[arg(short = 'k', long, value_name = "KEY", default_value = "lexicographical")]
    key: SortKey,

    /// Sort in descending order
    #[arg(short = 'r', long)]
    reverse: bool,
}

#[derive(Args, Debug)]
struct SetArgs {
    /// Operation (union, intersection, symmetric-difference, difference)
    #[arg(value_name = "OPERATION")]
    operation: SetOperation,

    /// First prompt
    #[arg(value_name = "A")]
    first: String,

    /// Second prompt
    #[arg(value_name = "B")]
    second: String,

    /// For difference, subtract A from B instead of B from A
    #[arg(short = 'r', long)]
    reverse: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut pipeline = build_pipeline(&cli)?;
    match &cli.command {
        Some(Commands::Set(args)) => run_set(&pipeline, args, cli.json),
        _ if cli.interactive => run_interactive(&mut pipeline, cli.json),
        _ => run_once(&mut pipeline, cli.json),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            0 => LevelFilter::Info,
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

/// Expands the `\n` and `\t` escapes that are awkward to type in a shell.
fn unescape(value: &str) -> String {
    value.replace("\\n", "\n").replace("\\t", "\t")
}

fn build_pipeline(cli: &Cli) -> Result<Pipeline> {
    let config = match &cli.config {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    let mut delimiter: Delimiter = config.delimiter(cli.input_type, cli.output_type);
    if let Some(input) = &cli.input_delimiter {
        delimiter.input = unescape(input);
    }
    if let Some(output) = &cli.output_delimiter {
        delimiter.output = unescape(output);
    }

    let mut builder = Pipeline::builder()
        .config(config)
        .delimiter(delimiter)
        .input_dialect(cli.input_type)
        .output_dialect(cli.output_type)
        .filter(Filter::round_up(cli.roundup)?);
    if let Some(command) = &cli.command {
        if let Some(filter) = command_filter(command)? {
            builder = builder.filter(filter);
        }
    }
    if !cli.exclude.is_empty() {
        builder = builder.filter(Filter::exclude(cli.exclude.iter().cloned()));
    }
    builder.build().context("invalid pipeline configuration")
}

fn command_filter(command: &Commands) -> Result<Option<Filter>> {
    let filter = match command {
        Commands::Mask(args) => {
            Filter::mask(args.excludes.iter().cloned(), args.replace_to.as_str())
        }
        Commands::Random(args) => Filter::Random(RandomFilter { seed: args.seed }),
        Commands::Reset(args) => {
            Filter::Reset(ResetFilter::new(args.new_value).context("invalid reset weight")?)
        }
        Commands::Similar(args) => {
            let reorderer = Reorderer::new(args.method, args.strategy.strategy())
                .greedy_start(GreedyStart::Random { seed: args.seed });
            Filter::Similar(SimilarFilter {
                reorderer,
                reverse: args.reverse,
            })
        }
        Commands::Sort(args) => Filter::Sort(SortFilter {
            reverse: args.reverse,
        }),
        Commands::SortAll(args) => Filter::SortAll(SortAllFilter {
            key: args.key,
            reverse: args.reverse,
        }),
        Commands::Unique(args) => Filter::Unique(UniqueFilter {
            reverse: args.reverse,
        }),
        Commands::Set(_) => return Ok(None),
    };
    Ok(Some(filter))
}

fn run_once(pipeline: &mut Pipeline, json: bool) -> Result<()> {
    let mut prompt = String::new();
    io::stdin()
        .read_to_string(&mut prompt)
        .context("failed to read prompt from stdin")?;
    pipeline.execute(&prompt).context("failed to process prompt")?;
    emit(pipeline, json)
}

fn run_interactive(pipeline: &mut Pipeline, json: bool) -> Result<()> {
    let stdin = io::stdin();
    let mut processed = 0usize;
    let mut rejected = 0usize;
    for line in stdin.lock().lines() {
        let line = line.context("failed to read line from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match pipeline.execute(&line) {
            Ok(_) => {
                processed += 1;
                emit(pipeline, json)?;
            }
            Err(err) if err.is_syntax() => {
                rejected += 1;
                error!("{err}");
            }
            Err(err) => return Err(err).context("failed to process prompt"),
        }
    }
    info!("processed {processed} prompts, rejected {rejected}");
    Ok(())
}

fn run_set(pipeline: &Pipeline, args: &SetArgs, json: bool) -> Result<()> {
    let first = pipeline
        .tokenize(&args.first)
        .context("failed to tokenize prompt A")?;
    let second = pipeline
        .tokenize(&args.second)
        .context("failed to tokenize prompt B")?;
    let operation = match args.operation {
        SetOperation::Difference { .. } => SetOperation::Difference {
            reverse: args.reverse,
        },
        other => other,
    };
    debug!("{operation} of {} and {} tokens", first.len(), second.len());
    let tokens = pipeline.apply(operation.apply(&first, &second));
    if json {
        print_json(&json!({ "tokens": tokens }))
    } else {
        print_line(&pipeline.render_tokens(&tokens))
    }
}

fn emit(pipeline: &Pipeline, json: bool) -> Result<()> {
    let Some(result) = pipeline.result() else {
        return Ok(());
    };
    let report = result.report();
    debug!("{}", report);
    if json {
        let tokens: &[Token] = &result.output;
        print_json(&json!({ "tokens": tokens, "report": report }))
    } else {
        print_line(&pipeline.render())
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    let text = serde_json::to_string(value).context("failed to serialise output")?;
    print_line(&text)
}

fn print_line(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{text}").context("failed to write to stdout")?;
    stdout.flush().context("failed to flush stdout")
}
