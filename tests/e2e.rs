//! End-to-end integration tests for chart2data.
//!
//! Offline tests exercise the full normalize → validate → export chain on
//! synthetic images and hand-built records; they always run. Live tests make
//! real VLM API calls against images in `./test_cases/` and are gated behind
//! the `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run the live tests with:
//!   E2E_ENABLED=1 OPENAI_API_KEY=sk-... cargo test --test e2e -- --nocapture

use chart2data::{
    analyze, column_statistics, detect, summarize, write_csv, write_json, AnalysisConfig,
    AnalysisResult, ChartKind, DetectionResult, ExtractionRecord, Validator,
};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::json;
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no image file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// A synthetic chart-ish image: white background with colored columns.
fn synthetic_chart(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let column = (x / 40) % 2 == 0;
        let tall = y > height / 3;
        if column && tall {
            Rgb([60, 90, 200])
        } else {
            Rgb([250, 250, 250])
        }
    });
    DynamicImage::ImageRgb8(img)
}

fn bar_analysis() -> AnalysisResult {
    let extraction = ExtractionRecord::from_value(
        ChartKind::Bar,
        json!({
            "title": "Quarterly revenue",
            "x_axis_label": "Quarter",
            "y_axis_label": "Revenue",
            "unit": "M$",
            "data_points": [
                {"category": "Q1", "value": 12.5},
                {"category": "Q2", "value": 18.0},
                {"category": "Q3", "value": 22.5}
            ]
        }),
    )
    .expect("bar payload decodes");

    AnalysisResult {
        image_path: "test_cases/sample_bar.png".to_string(),
        detection: DetectionResult {
            chart_type: ChartKind::Bar,
            confidence: 0.93,
            orientation: Some("vertical".into()),
            reasoning: Some("Clear vertical bars".into()),
        },
        extraction,
        timestamp: "2025-06-01T12:00:00Z".to_string(),
    }
}

// ── Normalizer tests (no VLM, instant) ───────────────────────────────────────

#[test]
fn normalize_bounds_large_images() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.png");
    synthetic_chart(3000, 1500).save(&path).unwrap();

    let config = AnalysisConfig::default();
    let normalized = chart2data::pipeline::image::normalize(&path, &config).unwrap();
    assert_eq!((normalized.width, normalized.height), (2048, 1024));
}

#[test]
fn normalize_leaves_small_images_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("small.jpg");
    synthetic_chart(320, 240).save(&path).unwrap();

    let normalized =
        chart2data::pipeline::image::normalize(&path, &AnalysisConfig::default()).unwrap();
    assert_eq!((normalized.width, normalized.height), (320, 240));
}

#[test]
fn normalize_with_and_without_enhancement_keep_geometry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chart.png");
    synthetic_chart(200, 100).save(&path).unwrap();

    let enhanced = AnalysisConfig::builder().enhance(true).build().unwrap();
    let plain = AnalysisConfig::builder().enhance(false).build().unwrap();

    let a = chart2data::pipeline::image::normalize(&path, &enhanced).unwrap();
    let b = chart2data::pipeline::image::normalize(&path, &plain).unwrap();
    assert_eq!((a.width, a.height), (b.width, b.height));
}

// ── Typed record → validation → export chain ────────────────────────────────

#[test]
fn clean_analysis_validates_end_to_end() {
    let analysis = bar_analysis();
    let (valid, report) = Validator::default().validate_result(&analysis);
    assert!(valid, "unexpected issues: {report:?}");
    assert!(report.render().contains("✓ All validations passed"));
}

#[test]
fn kind_mismatch_surfaces_in_consistency_category() {
    let mut analysis = bar_analysis();
    analysis.detection.chart_type = ChartKind::Line;

    let (valid, report) = Validator::default().validate_result(&analysis);
    assert!(!valid);
    assert!(report.detection.is_empty());
    assert_eq!(report.consistency.len(), 1);
    assert!(report.consistency[0].contains("detected=line_chart"));
}

#[test]
fn low_confidence_surfaces_in_detection_category() {
    let mut analysis = bar_analysis();
    analysis.detection.confidence = 0.4;

    let (valid, report) = Validator::default().validate_result(&analysis);
    assert!(!valid);
    assert_eq!(report.detection.len(), 1);
    assert!(report.detection[0].contains("below threshold"));
}

#[tokio::test]
async fn analysis_exports_to_json_and_csv() {
    let analysis = bar_analysis();
    let dir = tempfile::tempdir().unwrap();

    let json_path = dir.path().join("analysis.json");
    write_json(&analysis, &json_path).await.unwrap();
    let text = std::fs::read_to_string(&json_path).unwrap();
    let back: AnalysisResult = serde_json::from_str(&text).unwrap();
    assert_eq!(back.detection.chart_type, ChartKind::Bar);
    assert_eq!(back.extraction.title(), Some("Quarterly revenue"));

    let csv_path = dir.path().join("analysis.csv");
    write_csv(&analysis.extraction, &csv_path).await.unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().next(), Some("category,value"));
    assert_eq!(csv.lines().count(), 4);
}

#[test]
fn summary_and_statistics_agree_with_the_record() {
    let analysis = bar_analysis();
    let summary = summarize(&analysis.extraction);
    assert_eq!(summary.data_point_count, 3);
    assert_eq!(summary.key_metrics.as_ref().unwrap().highest, 22.5);

    let stats = column_statistics(&analysis.extraction);
    assert_eq!(stats[0].1.count, 3);
    assert!((stats[0].1.mean - 17.666).abs() < 0.01);
}

// ── Live tests (VLM calls, gated) ────────────────────────────────────────────

#[tokio::test]
async fn live_detect_bar_chart() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_bar.png"));

    let config = AnalysisConfig::default();
    let detection = detect(path.to_str().unwrap(), &config)
        .await
        .expect("detect() should succeed");

    println!("Detection: {detection:?}");
    assert!(detection.confidence > 0.0);
}

#[tokio::test]
async fn live_analyze_validates_cleanly() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample_bar.png"));

    let config = AnalysisConfig::default();
    let analysis = analyze(path.to_str().unwrap(), &config)
        .await
        .expect("analyze() should succeed");

    let (valid, report) = Validator::default().validate_result(&analysis);
    println!("{}", report.render());
    assert!(valid, "live analysis should validate: {report:?}");
}
