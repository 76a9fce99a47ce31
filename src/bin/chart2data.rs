//! CLI binary for chart2data.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AnalysisConfig`, sequences the stages, and prints results. Stage-level
//! failures (a failed export, a failed analysis) print a notice and let the
//! remaining independent stages run; only startup problems (bad usage,
//! missing credential) abort the process.

use anyhow::{Context, Result};
use chart2data::{
    analyze, ask, column_statistics, detect, extract, summarize, write_csv, write_json,
    AnalysisConfig, AnalysisResult, ChartKind, ExtractionRecord, Validator,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
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
  # Complete analysis with validation report
  chart2data analyze chart.png

  # Analysis with JSON and CSV export
  chart2data analyze chart.png --output results.json --csv data.csv

  # Detect the chart type only
  chart2data detect chart.png

  # Extract with a known chart type, skipping detection
  chart2data extract chart.png --type bar_chart --csv data.csv

  # Ask a question, with context from a previous extraction
  chart2data ask chart.png "What is the highest value?" --context results.json

  # Use a specific model
  chart2data --model gpt-4.1 --provider openai analyze chart.png

SUPPORTED PROVIDERS & MODELS:
  Provider     Model                        Vision
  ─────────    ──────────────────────────   ──────
  openai       gpt-4.1-nano (default)       ✓
  openai       gpt-4.1-mini, gpt-4.1        ✓
  anthropic    claude-sonnet-4-20250514     ✓
  gemini       gemini-2.0-flash             ✓
  ollama       llava, llama3.2-vision       ✓

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  CHART2DATA_PROVIDER     Override provider (openai, anthropic, gemini, ollama)
  CHART2DATA_MODEL        Override model ID

SETUP:
  1. Set API key:     export OPENAI_API_KEY=sk-...
  2. Analyze:         chart2data analyze chart.png
"#;

/// Extract structured data from chart images using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "chart2data",
    version,
    about = "Extract structured data from chart images using Vision LLMs",
    long_about = "Analyze chart images (bar, line, pie, scatter) with a Vision Language Model: \
detect the chart type, extract the underlying data points, validate the result, and export it \
as JSON or CSV. Supports OpenAI, Anthropic, Google Gemini, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalOpts,
}

#[derive(Args, Debug)]
struct GlobalOpts {
    /// VLM model ID (e.g. gpt-4.1-nano, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "CHART2DATA_MODEL")]
    model: Option<String>,

    /// VLM provider: openai, anthropic, gemini, ollama.
    #[arg(long, global = true, env = "CHART2DATA_PROVIDER")]
    provider: Option<String>,

    /// Maximum image dimension in pixels before transmission.
    #[arg(long, global = true, env = "CHART2DATA_MAX_DIMENSION", default_value_t = 2048)]
    max_dimension: u32,

    /// Minimum detection confidence accepted without a validation issue.
    #[arg(long, global = true, env = "CHART2DATA_MIN_CONFIDENCE", default_value_t = 0.7)]
    min_confidence: f64,

    /// Extraction attempts before giving up.
    #[arg(long, global = true, env = "CHART2DATA_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Skip contrast/sharpness enhancement.
    #[arg(long, global = true, env = "CHART2DATA_NO_ENHANCE")]
    no_enhance: bool,

    /// HTTP download timeout for URL inputs, in seconds.
    #[arg(long, global = true, env = "CHART2DATA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CHART2DATA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, global = true, env = "CHART2DATA_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Complete analysis: detect, extract, validate, export.
    Analyze {
        /// Path or URL of the chart image.
        image: String,

        /// Write the full analysis as JSON to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export the extracted data points as CSV to this file.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Validate extracted data (default).
        #[arg(long, overrides_with = "no_validate")]
        validate: bool,

        /// Skip the validation report.
        #[arg(long)]
        no_validate: bool,
    },

    /// Detect the chart type in an image.
    Detect {
        /// Path or URL of the chart image.
        image: String,
    },

    /// Extract structured data from a chart.
    Extract {
        /// Path or URL of the chart image.
        image: String,

        /// Chart type (auto-detected if not specified).
        #[arg(short = 't', long = "type", value_parser = parse_kind)]
        kind: Option<ChartKind>,

        /// Write the extraction record as JSON to this file.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Export the extracted data points as CSV to this file.
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Ask a specific question about a chart.
    Ask {
        /// Path or URL of the chart image.
        image: String,

        /// The question to answer.
        question: String,

        /// JSON file with context from a previous extraction.
        #[arg(short, long)]
        context: Option<PathBuf>,
    },
}

fn parse_kind(s: &str) -> Result<ChartKind, String> {
    s.parse()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // spinner plus the printed results are the feedback that matters.
    let show_progress = !cli.global.quiet && !cli.global.verbose;
    let filter = if cli.global.verbose {
        "debug"
    } else if cli.global.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Usage checks before any core logic ───────────────────────────────
    let image = match &cli.command {
        Command::Analyze { image, .. }
        | Command::Detect { image }
        | Command::Extract { image, .. }
        | Command::Ask { image, .. } => image.clone(),
    };
    if !chart2data::pipeline::input::is_url(&image) && !Path::new(&image).exists() {
        anyhow::bail!("Image file not found: {image}");
    }

    // ── Build config and resolve the provider up front ───────────────────
    // A missing credential is a startup failure, not a pipeline failure.
    let mut config = AnalysisConfig::builder()
        .max_dimension(cli.global.max_dimension)
        .min_confidence(cli.global.min_confidence)
        .max_extraction_retries(cli.global.max_retries)
        .enhance(!cli.global.no_enhance)
        .download_timeout_secs(cli.global.download_timeout)
        .build()
        .context("Invalid configuration")?;
    config.model = cli.global.model.clone();
    config.provider_name = cli.global.provider.clone();

    let provider = chart2data::analyze::resolve_provider(&config)
        .context("No VLM provider configured — set an API key")?;
    config.provider = Some(provider);

    // ── Dispatch ─────────────────────────────────────────────────────────
    match cli.command {
        Command::Analyze {
            image,
            output,
            csv,
            validate: _,
            no_validate,
        } => run_analyze(&image, output, csv, !no_validate, &config, &cli.global).await,
        Command::Detect { image } => run_detect(&image, &config, &cli.global).await,
        Command::Extract {
            image,
            kind,
            output,
            csv,
        } => run_extract(&image, kind, output, csv, &config, &cli.global).await,
        Command::Ask {
            image,
            question,
            context,
        } => run_ask(&image, &question, context, &config, &cli.global).await,
    }
}

// ── Commands ─────────────────────────────────────────────────────────────

async fn run_analyze(
    image: &str,
    output: Option<PathBuf>,
    csv: Option<PathBuf>,
    validate: bool,
    config: &AnalysisConfig,
    opts: &GlobalOpts,
) -> Result<()> {
    banner("Chart Analysis", image, opts);

    let bar = spinner("Analyzing chart…", opts);
    let analysis = analyze(image, config).await;
    bar.finish_and_clear();

    let analysis = match analysis {
        Ok(analysis) => analysis,
        Err(e) => {
            eprintln!("{}", red(&format!("Analysis failed: {e}")));
            return Ok(());
        }
    };

    display_analysis(&analysis);

    if validate {
        let (_, report) = Validator::new(config.min_confidence).validate_result(&analysis);
        println!();
        println!("{}", report.render());
    }

    if let Some(path) = output {
        match write_json(&analysis, &path).await {
            Ok(()) => println!(
                "\n{}",
                green(&format!("✓ Results saved to: {}", path.display()))
            ),
            Err(e) => eprintln!("{}", red(&format!("✗ JSON export failed: {e}"))),
        }
    }

    if let Some(path) = csv {
        match write_csv(&analysis.extraction, &path).await {
            Ok(()) => println!(
                "{}",
                green(&format!("✓ Data exported to CSV: {}", path.display()))
            ),
            Err(e) => eprintln!("{}", cyan(&format!("⚠ Could not convert to CSV: {e}"))),
        }
    }

    Ok(())
}

async fn run_detect(image: &str, config: &AnalysisConfig, opts: &GlobalOpts) -> Result<()> {
    banner("Chart Type Detection", image, opts);

    let bar = spinner("Detecting chart type…", opts);
    let detection = detect(image, config).await;
    bar.finish_and_clear();

    let detection = match detection {
        Ok(detection) => detection,
        Err(e) => {
            eprintln!("{}", red(&format!("Detection failed: {e}")));
            return Ok(());
        }
    };

    println!("{}", bold("Detection Results"));
    println!("  Chart Type:  {}", detection.chart_type);
    println!("  Confidence:  {:.2}%", detection.confidence * 100.0);
    if let Some(ref orientation) = detection.orientation {
        println!("  Orientation: {orientation}");
    }
    println!(
        "  Reasoning:   {}",
        detection.reasoning.as_deref().unwrap_or("N/A")
    );

    Ok(())
}

async fn run_extract(
    image: &str,
    kind: Option<ChartKind>,
    output: Option<PathBuf>,
    csv: Option<PathBuf>,
    config: &AnalysisConfig,
    opts: &GlobalOpts,
) -> Result<()> {
    banner("Data Extraction", image, opts);

    let bar = spinner("Extracting data…", opts);
    let record = extract(image, kind, config).await;
    bar.finish_and_clear();

    let record = match record {
        Ok(record) => record,
        Err(e) => {
            eprintln!("{}", red(&format!("Extraction failed: {e}")));
            return Ok(());
        }
    };

    println!("{}", green(&bold("Extraction Successful!")));
    println!("Chart Type: {}", record.kind());
    println!("Title: {}", record.title().unwrap_or("N/A"));

    let summary = summarize(&record);
    println!("\nData Points: {}", summary.data_point_count);
    if let Some(series_count) = summary.series_count {
        println!("Series: {series_count}");
    }

    if let Some(path) = output {
        match write_json(&record, &path).await {
            Ok(()) => println!(
                "\n{}",
                green(&format!("✓ Results saved to: {}", path.display()))
            ),
            Err(e) => eprintln!("{}", red(&format!("✗ JSON export failed: {e}"))),
        }
    }

    if let Some(path) = csv {
        match write_csv(&record, &path).await {
            Ok(()) => {
                println!(
                    "{}",
                    green(&format!("✓ Data exported to CSV: {}", path.display()))
                );
                display_statistics(&record);
            }
            Err(e) => eprintln!("{}", cyan(&format!("⚠ Could not convert to CSV: {e}"))),
        }
    }

    Ok(())
}

async fn run_ask(
    image: &str,
    question: &str,
    context_path: Option<PathBuf>,
    config: &AnalysisConfig,
    opts: &GlobalOpts,
) -> Result<()> {
    banner("Chart Question Answering", image, opts);
    if !opts.quiet {
        eprintln!("{}", dim(&format!("Question: {question}")));
    }

    let context: Option<serde_json::Value> = match context_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read context file {}", path.display()))?;
            Some(
                serde_json::from_str(&text)
                    .with_context(|| format!("Context file {} is not valid JSON", path.display()))?,
            )
        }
        None => None,
    };

    let bar = spinner("Processing question…", opts);
    let answer = ask(image, question, context.as_ref(), config).await;
    bar.finish_and_clear();

    let answer = match answer {
        Ok(answer) => answer,
        Err(e) => {
            eprintln!("{}", red(&format!("Failed to answer question: {e}")));
            return Ok(());
        }
    };

    println!("{}", green(&bold("Answer:")));
    println!("{}", answer.answer);
    println!("\n{}", bold("Evidence:"));
    println!("{}", answer.evidence.as_deref().unwrap_or("No evidence provided"));
    if let Some(confidence) = answer.confidence {
        println!("\n{} {:.2}%", bold("Confidence:"), confidence * 100.0);
    }

    Ok(())
}

// ── Display helpers ──────────────────────────────────────────────────────

fn banner(title: &str, image: &str, opts: &GlobalOpts) {
    if opts.quiet {
        return;
    }
    eprintln!("{}", bold(&cyan(title)));
    eprintln!("{}", dim(&format!("Image: {image}")));
}

fn spinner(msg: &str, opts: &GlobalOpts) -> ProgressBar {
    if opts.quiet || opts.verbose {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_message(msg.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn display_analysis(analysis: &AnalysisResult) {
    println!("{}", green(&bold("Analysis Complete!")));

    println!("\n{}", bold("Chart Detection:"));
    println!("  Type: {}", analysis.detection.chart_type);
    println!("  Confidence: {:.2}%", analysis.detection.confidence * 100.0);

    println!("\n{}", bold("Data Extraction:"));
    println!("  Title: {}", analysis.extraction.title().unwrap_or("N/A"));

    match &analysis.extraction {
        ExtractionRecord::Bar(chart) => {
            println!("  Data Points: {}", chart.data_points.len());
            if !chart.data_points.is_empty() {
                println!("\n  Sample Data:");
                for point in chart.data_points.iter().take(5) {
                    println!(
                        "    {}: {}",
                        point.category.as_deref().unwrap_or("?"),
                        point
                            .value
                            .as_ref()
                            .map(|v| v.to_string())
                            .unwrap_or_else(|| "?".into())
                    );
                }
                if chart.data_points.len() > 5 {
                    println!("    … and {} more", chart.data_points.len() - 5);
                }
            }
        }
        ExtractionRecord::Line(chart) => {
            println!("  Series Count: {}", chart.series.len());
            for series in chart.series.iter().take(3) {
                println!(
                    "    {}: {} points",
                    series.name.as_deref().unwrap_or("?"),
                    series.data_points.len()
                );
            }
        }
        ExtractionRecord::Pie(chart) => {
            println!("  Segments: {}", chart.segments.len());
            for segment in &chart.segments {
                println!(
                    "    {}: {}%",
                    segment.label.as_deref().unwrap_or("?"),
                    segment
                        .percentage
                        .as_ref()
                        .or(segment.value.as_ref())
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "?".into())
                );
            }
        }
        ExtractionRecord::Scatter(chart) => {
            println!("  Data Points: {}", chart.data_points.len());
            if let Some(ref correlation) = chart.correlation {
                println!("  Correlation: {correlation}");
            }
        }
        _ => {}
    }
}

fn display_statistics(record: &ExtractionRecord) {
    let stats = column_statistics(record);
    if stats.is_empty() {
        return;
    }

    println!("\n{}", bold("Statistics:"));
    for (column, s) in stats {
        println!("\n{column}:");
        println!("  mean: {:.2}", s.mean);
        println!("  median: {:.2}", s.median);
        println!("  std: {:.2}", s.std);
        println!("  min: {:.2}", s.min);
        println!("  max: {:.2}", s.max);
        println!("  sum: {:.2}", s.sum);
        println!("  count: {}", s.count);
    }
}
