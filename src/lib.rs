//! # chart2data
//!
//! Extract structured data from chart images using Vision Language Models (VLMs).
//!
//! ## Why this crate?
//!
//! Charts embed their numbers in pixels. Classic computer-vision approaches
//! (axis detection, bar segmentation, OCR) are brittle across chart styles;
//! instead this crate normalises the image and lets a VLM read the chart as
//! a human would — then does the part a model cannot be trusted with:
//! turning its loosely-typed, possibly malformed JSON into a validated,
//! strongly-typed record with an itemised list of everything wrong with it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Input      resolve local file or download from URL
//!  ├─ 2. Normalize  bound dimensions, enhance contrast, PNG → base64
//!  ├─ 3. Detect     VLM call: classify chart kind + confidence
//!  ├─ 4. Extract    VLM call per kind (bounded retry on bad JSON)
//!  ├─ 5. Validate   shape/range issues per category, never raising
//!  └─ 6. Export     pretty JSON + per-kind CSV shaping
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chart2data::{analyze, AnalysisConfig, Validator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / …
//!     let config = AnalysisConfig::default();
//!     let result = analyze("chart.png", &config).await?;
//!
//!     println!("kind: {}", result.detection.chart_type);
//!
//!     let (valid, report) = Validator::default().validate_result(&result);
//!     if !valid {
//!         eprintln!("{}", report.render());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `chart2data` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! chart2data = { version = "0.1", default-features = false }
//! ```
//!
//! ## Validation model
//!
//! Validation never raises and never repairs: every shape or range problem
//! in model output becomes a human-readable issue string, grouped into
//! detection / extraction / consistency categories. A record that fails
//! validation is still returned and still exportable — the report is
//! advisory, and the caller decides severity.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod validate;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze, ask, detect, extract};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::ChartError;
pub use export::{column_statistics, summarize, write_csv, write_json, ColumnStats, Summary};
pub use model::{
    AnalysisResult, Answer, BarChart, ChartKind, DetectionResult, ExtractionRecord, LineChart,
    PieChart, ScatterPlot,
};
pub use validate::{check_consistency, ValidationReport, Validator};
