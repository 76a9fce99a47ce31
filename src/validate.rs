//! Validation and consistency checking for extracted chart data.
//!
//! Everything in this module takes the *untrusted* generic JSON form
//! (`serde_json::Value`) straight from the response parser and turns shape
//! and range problems into human-readable issue strings. Three rules hold
//! throughout:
//!
//! * **Never raise.** A missing key or wrong type is an issue string, not an
//!   error. Checking continues past every violation to maximise diagnostic
//!   yield per call.
//! * **Never repair.** Records are immutable; validation reports, it does
//!   not fix.
//! * **Accumulate in order.** Issues are appended in a fixed check order so
//!   reports are deterministic.
//!
//! The percentage sum for pie charts deliberately falls back to a segment's
//! raw `value` when `percentage` is absent. That rule is load-bearing:
//! existing data has been validated under it, and "fixing" it would change
//! outcomes.

use crate::model::{AnalysisResult, VALID_KINDS};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{info, warn};

/// Default minimum detection confidence.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Pie segments may deviate from the expected total by at most this much.
const PIE_SUM_TOLERANCE: f64 = 5.0;

/// Schema validator parameterized by the minimum-confidence threshold.
#[derive(Debug, Clone)]
pub struct Validator {
    min_confidence: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl Validator {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    /// Validate chart-type detection output.
    ///
    /// Checks, in order: `chart_type` present; `confidence` present, numeric,
    /// within [0, 1], and at least the threshold; `chart_type` a member of
    /// the closed kind set.
    pub fn validate_detection(&self, detection: &Value) -> (bool, Vec<String>) {
        let mut issues = Vec::new();

        if detection.get("chart_type").is_none() {
            issues.push("Missing 'chart_type' field".to_string());
        }

        match detection.get("confidence") {
            None => issues.push("Missing 'confidence' field".to_string()),
            Some(raw) => match raw.as_f64() {
                None => issues.push("Confidence must be a number".to_string()),
                Some(c) if !(0.0..=1.0).contains(&c) => {
                    issues.push("Confidence must be between 0 and 1".to_string());
                }
                Some(c) if c < self.min_confidence => {
                    issues.push(format!(
                        "Confidence {c} below threshold {}",
                        self.min_confidence
                    ));
                }
                Some(_) => {}
            },
        }

        let kind_is_valid = detection
            .get("chart_type")
            .and_then(Value::as_str)
            .map(|k| VALID_KINDS.contains(&k))
            .unwrap_or(false);
        if !kind_is_valid {
            issues.push(format!(
                "Invalid chart type: {}",
                render_field(detection.get("chart_type"))
            ));
        }

        let is_valid = issues.is_empty();
        if is_valid {
            info!("Detection validation passed");
        } else {
            warn!("Detection validation failed: {issues:?}");
        }
        (is_valid, issues)
    }

    /// Validate extracted chart data, dispatching on the embedded
    /// `chart_type` tag.
    pub fn validate_extraction(&self, extraction: &Value) -> (bool, Vec<String>) {
        let kind = extraction
            .get("chart_type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        let mut issues = Vec::new();
        match kind {
            "bar_chart" => validate_bar_chart(extraction, &mut issues),
            "line_chart" => validate_line_chart(extraction, &mut issues),
            "pie_chart" => validate_pie_chart(extraction, &mut issues),
            "scatter_plot" => validate_scatter_plot(extraction, &mut issues),
            other => issues.push(format!("Unknown chart type for validation: {other}")),
        }

        let is_valid = issues.is_empty();
        if is_valid {
            info!("Extraction validation passed for {kind}");
        } else {
            warn!("Extraction validation issues for {kind}: {issues:?}");
        }
        (is_valid, issues)
    }

    /// Validate a complete analysis: detection, extraction, and their
    /// consistency. Missing sections contribute a single synthetic issue to
    /// their category; consistency is only checked when both are present.
    pub fn validate_analysis(&self, analysis: &Value) -> (bool, ValidationReport) {
        let mut report = ValidationReport::default();

        match analysis.get("detection") {
            Some(detection) => report.detection = self.validate_detection(detection).1,
            None => report.detection.push("Missing detection results".to_string()),
        }

        match analysis.get("extraction") {
            Some(extraction) => report.extraction = self.validate_extraction(extraction).1,
            None => report.extraction.push("Missing extraction results".to_string()),
        }

        if let (Some(detection), Some(extraction)) =
            (analysis.get("detection"), analysis.get("extraction"))
        {
            report.consistency = check_consistency(detection, extraction).1;
        }

        let is_valid = report.is_valid();
        if is_valid {
            info!("Complete analysis validation passed");
        } else {
            warn!("Complete analysis validation failed");
        }
        (is_valid, report)
    }

    /// Typed convenience over [`Validator::validate_analysis`].
    pub fn validate_result(&self, result: &AnalysisResult) -> (bool, ValidationReport) {
        self.validate_analysis(&result.to_value())
    }
}

/// Check that the extraction's declared kind equals the detected kind.
///
/// Pure equality on the two `chart_type` fields; a mismatch yields exactly
/// one issue naming both values.
pub fn check_consistency(detection: &Value, extraction: &Value) -> (bool, Vec<String>) {
    let detected = detection.get("chart_type");
    let extracted = extraction.get("chart_type");

    let mut issues = Vec::new();
    if detected != extracted {
        issues.push(format!(
            "Chart type mismatch: detected={}, extracted={}",
            render_field(detected),
            render_field(extracted)
        ));
    }

    let is_consistent = issues.is_empty();
    if !is_consistent {
        warn!("Consistency issues: {issues:?}");
    }
    (is_consistent, issues)
}

// ── Per-kind checks ──────────────────────────────────────────────────────

fn validate_bar_chart(data: &Value, issues: &mut Vec<String>) {
    let Some(points) = non_empty_array(data, "data_points") else {
        issues.push("No data points found in bar chart".to_string());
        return;
    };

    for (i, point) in points.iter().enumerate() {
        let Some(obj) = point.as_object() else {
            issues.push(format!("Data point {i} is not an object"));
            continue;
        };

        if !obj.contains_key("category") {
            issues.push(format!("Data point {i} missing 'category'"));
        }

        match obj.get("value") {
            None => issues.push(format!("Data point {i} missing 'value'")),
            Some(v) if v.as_f64().is_none() => {
                issues.push(format!("Data point {i} value is not numeric"));
            }
            Some(_) => {}
        }
    }

    // Duplicate detection: distinct category count vs category-bearing points.
    let categories: Vec<String> = points
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| obj.get("category"))
        .map(Value::to_string)
        .collect();
    let distinct: HashSet<&String> = categories.iter().collect();
    if distinct.len() != categories.len() {
        issues.push("Duplicate categories found".to_string());
    }
}

fn validate_line_chart(data: &Value, issues: &mut Vec<String>) {
    let Some(series_list) = non_empty_array(data, "series") else {
        issues.push("No series found in line chart".to_string());
        return;
    };

    for (i, series) in series_list.iter().enumerate() {
        let Some(obj) = series.as_object() else {
            issues.push(format!("Series {i} is not an object"));
            continue;
        };

        if !obj.contains_key("name") {
            issues.push(format!("Series {i} missing 'name'"));
        }

        let points = obj.get("data_points").and_then(Value::as_array);
        let points = match points {
            Some(p) if !p.is_empty() => p,
            _ => {
                issues.push(format!("Series {i} has no data points"));
                continue;
            }
        };

        for (j, point) in points.iter().enumerate() {
            let Some(pobj) = point.as_object() else {
                issues.push(format!("Series {i}, point {j} is not an object"));
                continue;
            };
            if !pobj.contains_key("x") || !pobj.contains_key("y") {
                issues.push(format!("Series {i}, point {j} missing x or y coordinate"));
            }
        }
    }
}

fn validate_pie_chart(data: &Value, issues: &mut Vec<String>) {
    let Some(segments) = non_empty_array(data, "segments") else {
        issues.push("No segments found in pie chart".to_string());
        return;
    };

    let mut total = 0.0;
    for (i, segment) in segments.iter().enumerate() {
        let Some(obj) = segment.as_object() else {
            issues.push(format!("Segment {i} is not an object"));
            continue;
        };

        if !obj.contains_key("label") {
            issues.push(format!("Segment {i} missing 'label'"));
        }

        match obj.get("value") {
            None => issues.push(format!("Segment {i} missing 'value'")),
            Some(raw) => {
                if let Some(value) = raw.as_f64() {
                    // Sum the percentage, falling back to the raw value when
                    // percentage is absent. Only numeric-valued segments
                    // contribute.
                    let contribution = obj
                        .get("percentage")
                        .and_then(Value::as_f64)
                        .unwrap_or(value);
                    total += contribution;
                }
            }
        }
    }

    if (total - 100.0).abs() > PIE_SUM_TOLERANCE {
        issues.push(format!("Percentages sum to {total}, expected ~100"));
    }
}

fn validate_scatter_plot(data: &Value, issues: &mut Vec<String>) {
    let Some(points) = non_empty_array(data, "data_points") else {
        issues.push("No data points found in scatter plot".to_string());
        return;
    };

    for (i, point) in points.iter().enumerate() {
        let Some(obj) = point.as_object() else {
            issues.push(format!("Data point {i} is not an object"));
            continue;
        };

        if !obj.contains_key("x") || !obj.contains_key("y") {
            issues.push(format!("Data point {i} missing x or y coordinate"));
        }

        if let Some(x) = obj.get("x") {
            if x.as_f64().is_none() {
                issues.push(format!("Data point {i} x-coordinate is not numeric"));
            }
        }

        if let Some(y) = obj.get("y") {
            if y.as_f64().is_none() {
                issues.push(format!("Data point {i} y-coordinate is not numeric"));
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

/// The named field as a non-empty array, or `None`.
fn non_empty_array<'v>(data: &'v Value, field: &str) -> Option<&'v Vec<Value>> {
    data.get(field)
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
}

/// Render a possibly-absent field value for an issue message.
fn render_field(value: Option<&Value>) -> String {
    match value {
        None => "null".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

// ── Report ───────────────────────────────────────────────────────────────

/// Issues from a complete validation pass, grouped by category.
///
/// Created fresh per call; has no lifecycle beyond the call that produced
/// it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub detection: Vec<String>,
    pub extraction: Vec<String>,
    pub consistency: Vec<String>,
}

impl ValidationReport {
    /// Overall validity: every category issue-free.
    pub fn is_valid(&self) -> bool {
        self.detection.is_empty() && self.extraction.is_empty() && self.consistency.is_empty()
    }

    /// Render the human-readable report with a fixed section order:
    /// detection, extraction, consistency.
    pub fn render(&self) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![rule.clone(), "VALIDATION REPORT".to_string(), rule.clone(), String::new()];

        if self.is_valid() {
            lines.push("✓ All validations passed".to_string());
        } else {
            lines.push("✗ Validation failed".to_string());
        }
        lines.push(String::new());

        for (category, issues) in [
            ("DETECTION", &self.detection),
            ("EXTRACTION", &self.extraction),
            ("CONSISTENCY", &self.consistency),
        ] {
            lines.push(format!("{category}:"));
            if issues.is_empty() {
                lines.push("  ✓ No issues".to_string());
            } else {
                for issue in issues {
                    lines.push(format!("  ✗ {issue}"));
                }
            }
            lines.push(String::new());
        }

        lines.push(rule);
        lines.join("\n")
    }
}
