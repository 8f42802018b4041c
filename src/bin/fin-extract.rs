//! CLI binary for fin-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, opens the database and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fin_extract::{
    inspect_document, run_extraction, ExtractionConfig, ExtractionProgressCallback, LlmExtractor,
    ProgressCallback, RunSummary, Stage, Store,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the current stage and logs dropped records above it.
struct CliProgressCallback {
    bar: ProgressBar,
    done: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(Stage::ALL.len() as u64);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{pos}/{len}] {msg}  ⏱ {elapsed}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(TICKS);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.set_message("opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            done: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(stage.to_string());
    }

    fn on_stage_complete(&self, stage: Stage) {
        let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        self.bar.set_position(n as u64);
        self.bar
            .println(format!("  {} {}", green("✓"), dim(stage.as_str())));
    }

    fn on_record_dropped(&self, metric_name: &str, column_label: &str) {
        self.bar.println(format!(
            "  {} dropped {} @ {} {}",
            yellow("⚠"),
            metric_name,
            column_label,
            dim("(value unresolved)")
        ));
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} metrics stored, {} dropped",
            green("✔"),
            bold(&summary.metrics_inserted.to_string()),
            summary.metrics_dropped
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract into the default database (./fin-extract.db)
  fin-extract extract report.pdf

  # Use a specific model and database
  fin-extract --db portfolio.db extract --provider openai --model gpt-4o report.pdf

  # See which pages would be sent to the model (no API key needed)
  fin-extract inspect report.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Provider name (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Model ID
  FIN_EXTRACT_DB          Database file
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download

  A .env file in the working directory is loaded before flags are parsed.
"#;

/// Extract company profiles and financial highlights from PDF reports.
#[derive(Parser, Debug)]
#[command(
    name = "fin-extract",
    version,
    about = "Extract company profiles and financial highlights from PDF reports into SQLite",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// SQLite database file (created if missing).
    #[arg(long, global = true, env = "FIN_EXTRACT_DB", default_value = "fin-extract.db")]
    db: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FIN_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FIN_EXTRACT_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true, env = "FIN_EXTRACT_NO_PROGRESS")]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full extraction and print the run summary as JSON.
    Extract(ExtractArgs),
    /// Print hash, page count and the located financial section. No model call.
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// PDF report to process.
    file: PathBuf,

    /// LLM model ID (default: gpt-4o-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FIN_EXTRACT_PASSWORD")]
    password: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "FIN_EXTRACT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens per call.
    #[arg(long, env = "FIN_EXTRACT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Retries per LLM call on transport failure.
    #[arg(long, env = "FIN_EXTRACT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "FIN_EXTRACT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Leading pages sent to the company-profile extraction.
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u16).range(1..))]
    company_pages: u16,

    /// Two-digit years at or above this are 19xx.
    #[arg(long, default_value_t = 70, value_parser = clap::value_parser!(u8).range(0..=99))]
    century_pivot: u8,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// PDF report to inspect.
    file: PathBuf,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "FIN_EXTRACT_PASSWORD")]
    password: Option<String>,

    /// Print the inspection as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so `env = ...` attributes see values from .env.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out of
    // its way unless asked for.
    let show_progress =
        !cli.quiet && !cli.no_progress && matches!(cli.command, Command::Extract(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    ensure_pdfium(cli.quiet)?;

    match cli.command {
        Command::Inspect(ref args) => inspect(args).await,
        Command::Extract(ref args) => extract(&cli, args, show_progress).await,
    }
}

/// Make sure a pdfium library is available before any PDF is opened.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    #[cfg(feature = "bundled")]
    {
        let _ = quiet;
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_bundled())
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if !pdfium_auto::is_pdfium_cached() {
        if quiet {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
        } else {
            let dl_bar = ProgressBar::new(0);
            dl_bar.set_style(
                ProgressStyle::with_template(
                    "{spinner:.cyan} {prefix:.bold}  \
                     [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏  ")
                .tick_strings(TICKS),
            );
            dl_bar.set_prefix("PDF engine");
            dl_bar.enable_steady_tick(Duration::from_millis(80));

            let bar = dl_bar.clone();
            tokio::task::block_in_place(|| {
                pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                    if let Some(t) = total {
                        if bar.length().unwrap_or(0) != t {
                            bar.set_length(t);
                        }
                    }
                    bar.set_position(downloaded);
                }))
            })
            .context("Failed to download PDFium engine")?;

            dl_bar.finish_with_message("ready ✓");
        }
    }

    Ok(())
}

async fn inspect(args: &InspectArgs) -> Result<()> {
    let inspection = inspect_document(&args.file, args.password.as_deref())
        .await
        .context("Failed to inspect PDF")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&inspection).context("Failed to serialise inspection")?
        );
        return Ok(());
    }

    let section = &inspection.section;
    println!("File:          {}", inspection.filename);
    println!("SHA-256:       {}", inspection.content_hash);
    println!("Pages:         {}", inspection.page_count);
    println!(
        "Section:       page {} ({})",
        section.start_page,
        if section.matched {
            "financial highlights heading"
        } else {
            "fallback: last pages"
        }
    );
    println!("Header line:   {}", section.header_line());
    println!();
    println!("{}", section.text);
    Ok(())
}

async fn extract(cli: &Cli, args: &ExtractArgs, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };

    let config = build_config(args, progress_cb)?;
    let extractor = LlmExtractor::from_config(&config).context("Failed to set up LLM provider")?;
    let store = Store::open(&cli.db)
        .with_context(|| format!("Failed to open database {}", cli.db.display()))?;

    let summary = run_extraction(&args.file, &extractor, &store, &config)
        .await
        .context("Extraction failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
    );

    if !cli.quiet && !show_progress {
        eprintln!(
            "Stored {} metrics ({} dropped) in {}",
            summary.metrics_inserted,
            summary.metrics_dropped,
            cli.db.display()
        );
    }
    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(args: &ExtractArgs, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .company_pages(usize::from(args.company_pages))
        .century_pivot(args.century_pivot);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
