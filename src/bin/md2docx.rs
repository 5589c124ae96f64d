//! CLI binary for edgequake-md2docx.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, converts each file on the blocking pool and prints
//! one status line per file.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_md2docx::pipeline::input::{is_documentation_file, is_markdown_file};
use edgequake_md2docx::{
    convert_to_file, default_output_path, AltTextOptions, ConversionConfig, ConversionReport,
    ConversionStatus, StyleMapping, VisionAltText,
};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert one file (writes paper.docx next to it)
  md2docx paper.md

  # Choose the output name
  md2docx paper.md -o accessible.docx

  # Batch, 8 files at a time, keeping OCR page breaks
  md2docx --preserve-page-breaks -j 8 ocr_output/*.md

  # No network: caption-less images are marked decorative
  md2docx --no-auto-alt paper.md

  # Machine-readable per-file report
  md2docx --json *.md > report.json

ALT TEXT:
  Images keep a real Markdown caption or a following "Figure N:" line as
  their description. Other images are described by a vision model; if no
  provider is configured or a call fails, they get "Image on page N".

ENVIRONMENT VARIABLES:
  MISTRAL_API_KEY         Mistral API key (pixtral vision models)
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (mistral, openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  RUST_LOG                Log filter (e.g. edgequake_md2docx=debug)

  A .env file is loaded from --env-file, then each input's directory, then
  the current directory. Variables already set are never overridden.
"#;

/// Compile OCR Markdown into accessible DOCX documents.
#[derive(Parser, Debug)]
#[command(
    name = "md2docx",
    version,
    about = "Compile OCR Markdown into accessible DOCX documents",
    long_about = "Compile Markdown produced by an OCR service into Word documents with real \
heading styles, grouped lists, marked table header rows, image descriptions and a linear \
reading order, so screen readers and accessibility checkers understand them.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Markdown file(s) to convert.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output filename (single input only).
    #[arg(short, long, env = "MD2DOCX_OUTPUT")]
    output: Option<PathBuf>,

    /// Insert page breaks at OCR page markers.
    #[arg(long, env = "MD2DOCX_PRESERVE_PAGE_BREAKS")]
    preserve_page_breaks: bool,

    /// Do not call a vision model; caption-less images are marked decorative.
    #[arg(long, env = "MD2DOCX_NO_AUTO_ALT")]
    no_auto_alt: bool,

    /// Do not linearise a side-by-side author block on the first page.
    #[arg(long, env = "MD2DOCX_NO_AUTHOR_GRID")]
    no_author_grid: bool,

    /// Keep inline LaTeX ($^{1}$ …) as written.
    #[arg(long, env = "MD2DOCX_KEEP_LATEX")]
    keep_latex: bool,

    /// Path to a .env file with provider credentials.
    #[arg(long, env = "MD2DOCX_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Vision model for alt text [default: pixtral-12b-2409 for Mistral, gpt-4.1-nano for OpenAI].
    #[arg(long, env = "MD2DOCX_ALT_MODEL")]
    alt_model: Option<String>,

    /// LLM provider: mistral, openai, anthropic, gemini, ollama.
    #[arg(long, env = "MD2DOCX_PROVIDER")]
    provider: Option<String>,

    /// JSON file mapping node kinds to DOCX style ids.
    #[arg(long, env = "MD2DOCX_STYLE_MAP")]
    style_map: Option<PathBuf>,

    /// Number of files converted concurrently.
    #[arg(short, long, env = "MD2DOCX_JOBS", default_value_t = 4,
          value_parser = clap::value_parser!(u16).range(1..=64))]
    jobs: u16,

    /// Print a JSON report of every file on stdout.
    #[arg(long, env = "MD2DOCX_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MD2DOCX_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MD2DOCX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MD2DOCX_QUIET")]
    quiet: bool,
}

/// One input after filtering.
enum Job {
    Convert { input: PathBuf, output: PathBuf },
    Skip { input: PathBuf, reason: &'static str },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the status lines carry everything the user needs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && cli.files.len() > 1;
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

    if cli.output.is_some() && cli.files.len() > 1 {
        anyhow::bail!("-o/--output can only be used with a single input file");
    }

    load_env_files(cli.env_file.as_deref(), &cli.files)?;
    let config = build_config(&cli)?;

    let jobs: Vec<Job> = cli.files.iter().map(|f| plan_job(f, cli.output.as_deref())).collect();
    let total = jobs
        .iter()
        .filter(|j| matches!(j, Job::Convert { .. }))
        .count();

    let bar = show_progress.then(|| progress_bar(total));
    let start = Instant::now();
    let mut reports: Vec<(usize, ConversionReport)> = Vec::with_capacity(jobs.len());

    let mut pending = Vec::new();
    for (idx, job) in jobs.into_iter().enumerate() {
        match job {
            Job::Skip { input, reason } => {
                if !cli.quiet && !cli.json {
                    status(&bar, format!("  {} {}  {}", dim("–"), input.display(), dim(reason)));
                }
            }
            Job::Convert { input, output } => pending.push((idx, input, output)),
        }
    }

    let mut results = stream::iter(pending.into_iter().map(|(idx, input, output)| {
        let config = config.clone();
        async move {
            let report = tokio::task::spawn_blocking({
                let input = input.clone();
                let output = output.clone();
                move || run_one(&input, &output, &config)
            })
            .await
            .unwrap_or_else(|e| ConversionReport {
                input,
                output: None,
                status: ConversionStatus::Failed {
                    reason: format!("worker panicked: {e}"),
                },
                warnings: Vec::new(),
            });
            (idx, report)
        }
    }))
    .buffer_unordered(usize::from(cli.jobs));

    while let Some((idx, report)) = results.next().await {
        if !cli.quiet && !cli.json {
            status(&bar, status_line(&report));
        }
        if let Some(ref b) = bar {
            b.inc(1);
        }
        reports.push((idx, report));
    }
    if let Some(b) = bar {
        b.finish_and_clear();
    }

    reports.sort_by_key(|(idx, _)| *idx);
    let reports: Vec<ConversionReport> = reports.into_iter().map(|(_, r)| r).collect();
    let failed = reports.iter().filter(|r| !r.succeeded()).count();

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&reports).context("Failed to serialise report")?
        );
    } else if !cli.quiet && total > 1 {
        let ok = total - failed;
        eprintln!(
            "{} {}/{} files converted  {}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&ok.to_string()),
            total,
            dim(&format!("{:.1}s", start.elapsed().as_secs_f64())),
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Decide what to do with one command-line path.
fn plan_job(input: &Path, output: Option<&Path>) -> Job {
    if is_documentation_file(input) {
        return Job::Skip {
            input: input.to_path_buf(),
            reason: "skipped: documentation file",
        };
    }
    if !is_markdown_file(input) {
        return Job::Skip {
            input: input.to_path_buf(),
            reason: "skipped: not a .md file",
        };
    }
    Job::Convert {
        input: input.to_path_buf(),
        output: output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_path(input)),
    }
}

/// Convert one file; runs on the blocking pool.
fn run_one(input: &Path, output: &Path, config: &ConversionConfig) -> ConversionReport {
    match convert_to_file(input, output, config) {
        Ok(out) => ConversionReport {
            input: input.to_path_buf(),
            output: Some(output.to_path_buf()),
            status: ConversionStatus::Succeeded { stats: out.stats },
            warnings: out.warnings,
        },
        Err(e) => ConversionReport {
            input: input.to_path_buf(),
            output: None,
            status: ConversionStatus::Failed {
                reason: e.to_string(),
            },
            warnings: Vec::new(),
        },
    }
}

fn status_line(report: &ConversionReport) -> String {
    match &report.status {
        ConversionStatus::Succeeded { stats } => {
            let mut line = format!(
                "  {} {}  →  {}  {}",
                green("✓"),
                report.input.display(),
                bold(
                    &report
                        .output
                        .as_deref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default()
                ),
                dim(&format!(
                    "{} headings, {} tables, {} images, {}ms",
                    stats.headings, stats.tables, stats.images, stats.duration_ms
                )),
            );
            for w in &report.warnings {
                line.push_str(&format!("\n      {} {}", cyan("⚠"), w));
            }
            line
        }
        ConversionStatus::Failed { reason } => {
            format!("  {} {}  {}", red("✗"), report.input.display(), red(reason))
        }
    }
}

/// Print above the progress bar when there is one.
fn status(bar: &Option<ProgressBar>, line: String) {
    match bar {
        Some(b) => b.println(line),
        None => eprintln!("{line}"),
    }
}

fn progress_bar(total: usize) -> ProgressBar {
    let bar = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  \
         [{bar:42.green/238}] {pos:>3}/{len} files  \
         ⏱ {elapsed_precise}  ETA {eta_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
    bar.set_style(style);
    bar.set_prefix("Converting");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Load `.env` files: `--env-file`, then each input's directory, then the
/// current directory. Earlier files win; the process environment wins over
/// all of them.
fn load_env_files(env_file: Option<&Path>, inputs: &[PathBuf]) -> Result<()> {
    if let Some(path) = env_file {
        dotenvy::from_path(path)
            .with_context(|| format!("Failed to load env file {}", path.display()))?;
    }
    let mut seen = std::collections::HashSet::new();
    for input in inputs {
        let dir = input
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let candidate = dir.join(".env");
        if seen.insert(candidate.clone()) && candidate.is_file() {
            if let Err(e) = dotenvy::from_path(&candidate) {
                warn!("Ignoring {}: {}", candidate.display(), e);
            }
        }
    }
    dotenvy::dotenv().ok();
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .preserve_page_breaks(cli.preserve_page_breaks)
        .auto_alt(!cli.no_auto_alt)
        .author_grid(!cli.no_author_grid)
        .clean_latex(!cli.keep_latex);

    if let Some(ref path) = cli.style_map {
        let styles = StyleMapping::from_json_file(path).context("Invalid style map")?;
        builder = builder.styles(styles);
    }

    if !cli.no_auto_alt {
        let options = AltTextOptions {
            provider_name: cli.provider.clone(),
            model: cli.alt_model.clone(),
            ..Default::default()
        };
        match VisionAltText::from_env(options) {
            Ok(vision) => builder = builder.alt_text(Arc::new(vision)),
            // A missing key degrades alt text; it does not stop conversion.
            Err(e) => {
                warn!("Alt-text synthesis unavailable: {e}");
                if !cli.quiet {
                    eprintln!(
                        "{} alt-text synthesis disabled: {}",
                        cyan("⚠"),
                        e.to_string().lines().next().unwrap_or_default()
                    );
                }
            }
        }
    }

    builder.build().context("Invalid configuration")
}
