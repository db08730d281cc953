//! CLI entry point for the misinformation claim matcher.
//!
//! Embeddings are computed upstream and passed in as JSON. The CLI opens the
//! engine under the configured data directory, runs one command, and exits
//! with a code scripts can branch on (see `misinfo_matcher::io::ExitCode`).

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{
    Args, Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use misinfo_matcher::display::{create_match_table, create_sentence_table, create_status_table};
use misinfo_matcher::io::input::{read_sentences, read_vectors};
use misinfo_matcher::io::{ExitCode, OutputFormat, OutputManager};
use misinfo_matcher::{MatchError, MatchResult, MatchingEngine, NewClaim, Settings};
use tracing::{Level, debug};
use tracing_subscriber::FmtSubscriber;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Misinformation claim matcher
#[derive(Parser)]
#[command(
    name = "misinfo",
    version = env!("CARGO_PKG_VERSION"),
    about = "Match sentences against known misinformation claims",
    long_about = "Store fact-checked claims with their sentence embeddings and find which claims a new sentence repeats.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ misinfo init\n  $ misinfo ingest --claim \"5G spreads viruses\" --link https://example.org/5g --info \"Radio waves cannot carry viruses\" --vectors claim.json\n  $ misinfo match --vectors sentence.json\n  $ misinfo match-batch --input article.json --json"
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory (overrides `data_dir` from settings)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize project
    #[command(about = "Set up .misinfo directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings after file and environment overrides")]
    Config,

    /// Add a fact-checked claim
    #[command(about = "Store a claim with its embeddings and rebuild the index")]
    Ingest(IngestArgs),

    /// Match one sentence
    #[command(
        about = "Find known claims close to a sentence's embeddings",
        after_help = "Input: a JSON array of vectors, e.g. [[0.12, -0.3, ...], ...]\nThe first vector is the sentence; any further ones are its propositions."
    )]
    Match {
        /// JSON file with the query vectors (`-` for stdin)
        #[arg(long)]
        vectors: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Match many sentences at once
    #[command(
        name = "match-batch",
        about = "Match every sentence of a document, keeping those that hit a claim",
        after_help = "Input: [{\"sentence\": \"...\", \"embeddings\": [[...], ...]}, ...]"
    )]
    MatchBatch {
        /// JSON file with sentences and embeddings (`-` for stdin)
        #[arg(long)]
        input: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the index from the vector store
    #[command(about = "Rebuild and persist the index")]
    Rebuild {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show store and index state
    #[command(about = "Show claim, vector and index counts")]
    Status {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct IngestArgs {
    /// Claim text
    #[arg(long)]
    claim: String,

    /// Link to the fact-check article
    #[arg(long)]
    link: String,

    /// Corrective information shown with a match
    #[arg(long)]
    info: String,

    /// JSON file with the claim's vectors (`-` for stdin)
    #[arg(long)]
    vectors: PathBuf,

    /// Strip HTML tags from the claim text
    #[arg(long)]
    strip_markup: bool,

    /// Output in JSON format
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.into());
}

fn run(cli: Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Init { force } => return init(*force),
        Commands::Config => {
            let settings = load_settings(cli.config.as_deref())?;
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{}", toml::to_string_pretty(&settings)?);
            return Ok(ExitCode::Success);
        }
        _ => {}
    }

    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(dir) = &cli.data_dir {
        settings.data_dir = dir.clone();
    }
    init_logging(cli.verbose, settings.debug)?;

    let json = match &cli.command {
        Commands::Ingest(args) => args.json,
        Commands::Match { json, .. }
        | Commands::MatchBatch { json, .. }
        | Commands::Rebuild { json }
        | Commands::Status { json } => *json,
        Commands::Init { .. } | Commands::Config => false,
    };
    let mut out = OutputManager::new(OutputFormat::from_json_flag(json));

    let started = Instant::now();
    let engine = match MatchingEngine::open(&settings) {
        Ok(engine) => engine,
        Err(e) => return Ok(out.error(&e)?),
    };
    debug!("Engine opened in {:?}", started.elapsed());

    let code = match cli.command {
        Commands::Ingest(args) => {
            let vectors = read_vectors(&args.vectors)?;
            let claim = NewClaim::new(args.claim, args.link, args.info, vectors)
                .with_strip_markup(args.strip_markup);
            report(&mut out, engine.ingest(&claim), |out, receipt| {
                let summary = serde_json::json!({
                    "record_id": receipt.record_id.get(),
                    "vector_start": receipt.vector_range.start().get(),
                    "vector_end": receipt.vector_range.end().get(),
                });
                out.success(&summary, |_| {
                    format!(
                        "Stored claim {} with vectors {}",
                        receipt.record_id, receipt.vector_range
                    )
                })
            })?
        }

        Commands::Match { vectors, .. } => {
            let vectors = read_vectors(&vectors)?;
            report(&mut out, engine.match_vectors(vectors.as_slice()), |out, matches| {
                out.matches(&matches, create_match_table)
            })?
        }

        Commands::MatchBatch { input, .. } => {
            let sentences = read_sentences(&input)?;
            report(&mut out, engine.match_sentences(&sentences), |out, matched| {
                out.matches(&matched, create_sentence_table)
            })?
        }

        Commands::Rebuild { .. } => {
            let started = Instant::now();
            report(&mut out, engine.rebuild_index(), |out, stats| {
                out.success(&stats, |s| {
                    format!(
                        "Rebuilt {} trees over {} vectors in {:.2?}",
                        s.tree_count,
                        s.indexed_vectors,
                        started.elapsed()
                    )
                })
            })?
        }

        Commands::Status { .. } => report(&mut out, engine.status(), |out, status| {
            out.success(&status, create_status_table)
        })?,

        Commands::Init { .. } | Commands::Config => unreachable!("handled before opening"),
    };
    Ok(code)
}

/// Writes `result` through `on_ok`, or reports the error with its exit code.
fn report<T, F>(out: &mut OutputManager, result: MatchResult<T>, on_ok: F) -> Result<ExitCode>
where
    F: FnOnce(&mut OutputManager, T) -> std::io::Result<ExitCode>,
{
    let code = match result {
        Ok(value) => on_ok(out, value)?,
        Err(e) => out.error(&e)?,
    };
    Ok(code)
}

fn init(force: bool) -> Result<ExitCode> {
    match Settings::init_config_file(force) {
        Ok(path) => {
            println!("Created configuration file at: {}", path.display());
            println!("Edit this file to customize your settings.");
            Ok(ExitCode::Success)
        }
        Err(e) => {
            let mut out = OutputManager::new(OutputFormat::Text);
            Ok(out.error(&MatchError::from(e))?)
        }
    }
}

/// Loads settings and anchors a relative `data_dir` at the workspace root,
/// so commands behave the same from any subdirectory.
fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let mut settings = match config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Configuration error loading from {}", path.display()))?,
        None => Settings::load().context("Configuration error")?,
    };

    if settings.data_dir.is_relative() {
        if let Some(root) = Settings::workspace_root() {
            settings.data_dir = root.join(&settings.data_dir);
        }
    }
    Ok(settings)
}

fn init_logging(verbose: u8, debug: bool) -> Result<()> {
    let level = match (verbose, debug) {
        (_, true) | (2.., _) => Level::DEBUG,
        (1, _) => Level::INFO,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set up logging")?;
    Ok(())
}
