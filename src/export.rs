//! Export: JSON and CSV persistence, per-kind summaries and statistics.
//!
//! File writes are atomic (temp file + rename) so a crashed export never
//! leaves a half-written file behind. Export failures are advisory to the
//! caller: a failed CSV export must not abort an otherwise-successful JSON
//! export, so each writer returns independently.
//!
//! CSV rows are shaped per chart kind — one row per leaf data point:
//! `category,value` for bar, `series,x,y` for line,
//! `label,value,percentage` for pie, `x,y` for scatter.

use crate::error::ChartError;
use crate::model::{number_of, ChartKind, ExtractionRecord};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::info;

// ── File writers ─────────────────────────────────────────────────────────

/// Write any serialisable value as pretty-printed UTF-8 JSON.
pub async fn write_json<T: Serialize>(data: &T, path: impl AsRef<Path>) -> Result<(), ChartError> {
    let path = path.as_ref();
    let mut json = serde_json::to_string_pretty(data)
        .map_err(|e| ChartError::Internal(format!("JSON serialisation failed: {e}")))?;
    json.push('\n');

    write_atomic(path, json.as_bytes(), "json.tmp").await?;
    info!("Exported data to JSON: {}", path.display());
    Ok(())
}

/// Write an extraction record as CSV, one row per leaf data point.
///
/// Generic kinds (area, combo, table, other) have no tabular shape and
/// return [`ChartError::ExportUnsupported`].
pub async fn write_csv(record: &ExtractionRecord, path: impl AsRef<Path>) -> Result<(), ChartError> {
    let path = path.as_ref();
    let content = render_csv(record)?;

    write_atomic(path, content.as_bytes(), "csv.tmp").await?;
    info!("Exported data to CSV: {}", path.display());
    Ok(())
}

/// Atomic write: temp file in the target directory, then rename.
async fn write_atomic(path: &Path, bytes: &[u8], tmp_ext: &str) -> Result<(), ChartError> {
    let wrap = |e: std::io::Error| ChartError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(wrap)?;
        }
    }

    let tmp_path = path.with_extension(tmp_ext);
    tokio::fs::write(&tmp_path, bytes).await.map_err(wrap)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(wrap)?;
    Ok(())
}

// ── CSV shaping ──────────────────────────────────────────────────────────

/// Render the record as CSV text with kind-specific columns.
pub fn render_csv(record: &ExtractionRecord) -> Result<String, ChartError> {
    let mut lines = Vec::new();

    match record {
        ExtractionRecord::Bar(chart) => {
            lines.push("category,value".to_string());
            for point in &chart.data_points {
                lines.push(format!(
                    "{},{}",
                    csv_text(point.category.as_deref()),
                    csv_value(point.value.as_ref())
                ));
            }
        }
        ExtractionRecord::Line(chart) => {
            lines.push("series,x,y".to_string());
            for series in &chart.series {
                let name = csv_text(series.name.as_deref());
                for point in &series.data_points {
                    lines.push(format!(
                        "{},{},{}",
                        name,
                        csv_value(point.x.as_ref()),
                        csv_value(point.y.as_ref())
                    ));
                }
            }
        }
        ExtractionRecord::Pie(chart) => {
            lines.push("label,value,percentage".to_string());
            for segment in &chart.segments {
                lines.push(format!(
                    "{},{},{}",
                    csv_text(segment.label.as_deref()),
                    csv_value(segment.value.as_ref()),
                    csv_value(segment.percentage.as_ref())
                ));
            }
        }
        ExtractionRecord::Scatter(chart) => {
            lines.push("x,y".to_string());
            for point in &chart.data_points {
                lines.push(format!(
                    "{},{}",
                    csv_value(point.x.as_ref()),
                    csv_value(point.y.as_ref())
                ));
            }
        }
        other => {
            return Err(ChartError::ExportUnsupported {
                kind: other.kind().to_string(),
            })
        }
    }

    lines.push(String::new());
    Ok(lines.join("\n"))
}

/// Quote a text field when it contains a delimiter, quote, or newline.
fn csv_text(field: Option<&str>) -> String {
    let field = field.unwrap_or("");
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render an untrusted leaf value: numbers bare, strings quoted as needed,
/// anything else as its JSON text.
fn csv_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => csv_text(Some(s)),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => csv_text(Some(&other.to_string())),
    }
}

// ── Summaries ────────────────────────────────────────────────────────────

/// Headline numbers for one extraction record.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub chart_type: ChartKind,
    pub title: String,
    pub data_point_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_metrics: Option<KeyMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyMetrics {
    pub highest: f64,
    pub lowest: f64,
    pub average: f64,
}

/// Summarise a record: counts plus highest/lowest/average where the kind
/// has a single numeric value per point.
pub fn summarize(record: &ExtractionRecord) -> Summary {
    let mut summary = Summary {
        chart_type: record.kind(),
        title: record.title().unwrap_or("Untitled").to_string(),
        data_point_count: 0,
        series_count: None,
        total: None,
        key_metrics: None,
    };

    match record {
        ExtractionRecord::Bar(chart) => {
            summary.data_point_count = chart.data_points.len();
            let values: Vec<f64> = chart
                .data_points
                .iter()
                .filter_map(|p| p.value.as_ref())
                .filter_map(number_of)
                .collect();
            summary.key_metrics = key_metrics(&values);
        }
        ExtractionRecord::Line(chart) => {
            summary.series_count = Some(chart.series.len());
            summary.data_point_count =
                chart.series.iter().map(|s| s.data_points.len()).sum();
        }
        ExtractionRecord::Pie(chart) => {
            summary.data_point_count = chart.segments.len();
            summary.total = Some(chart.total);
        }
        ExtractionRecord::Scatter(chart) => {
            summary.data_point_count = chart.data_points.len();
        }
        _ => {}
    }

    summary
}

fn key_metrics(values: &[f64]) -> Option<KeyMetrics> {
    if values.is_empty() {
        return None;
    }
    let highest = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let lowest = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let average = values.iter().sum::<f64>() / values.len() as f64;
    Some(KeyMetrics {
        highest,
        lowest,
        average,
    })
}

// ── Column statistics ────────────────────────────────────────────────────

/// Descriptive statistics for one numeric column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: usize,
}

/// Statistics per numeric column of the record's tabular shape.
///
/// Columns follow the CSV shaping: `value` for bar, `y` for line,
/// `value`/`percentage` for pie, `x`/`y` for scatter. Non-numeric cells are
/// skipped; columns with no numeric cells are omitted.
pub fn column_statistics(record: &ExtractionRecord) -> Vec<(String, ColumnStats)> {
    let columns: Vec<(&str, Vec<f64>)> = match record {
        ExtractionRecord::Bar(chart) => vec![(
            "value",
            numeric(chart.data_points.iter().map(|p| p.value.as_ref())),
        )],
        ExtractionRecord::Line(chart) => vec![(
            "y",
            numeric(
                chart
                    .series
                    .iter()
                    .flat_map(|s| s.data_points.iter().map(|p| p.y.as_ref())),
            ),
        )],
        ExtractionRecord::Pie(chart) => vec![
            (
                "value",
                numeric(chart.segments.iter().map(|s| s.value.as_ref())),
            ),
            (
                "percentage",
                numeric(chart.segments.iter().map(|s| s.percentage.as_ref())),
            ),
        ],
        ExtractionRecord::Scatter(chart) => vec![
            ("x", numeric(chart.data_points.iter().map(|p| p.x.as_ref()))),
            ("y", numeric(chart.data_points.iter().map(|p| p.y.as_ref()))),
        ],
        _ => vec![],
    };

    columns
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(name, values)| (name.to_string(), stats_of(&values)))
        .collect()
}

fn numeric<'v>(values: impl Iterator<Item = Option<&'v Value>>) -> Vec<f64> {
    values.flatten().filter_map(number_of).collect()
}

fn stats_of(values: &[f64]) -> ColumnStats {
    let count = values.len();
    let sum: f64 = values.iter().sum();
    let mean = sum / count as f64;

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let median = if count % 2 == 1 {
        sorted[count / 2]
    } else {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    };

    // Sample standard deviation; zero for a single observation.
    let std = if count > 1 {
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    ColumnStats {
        mean,
        median,
        std,
        min: sorted[0],
        max: sorted[count - 1],
        sum,
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BarChart, BarPoint, LineChart, LinePoint, PieChart, ScatterPlot, ScatterPoint, Segment, Series};
    use serde_json::json;

    fn bar_record() -> ExtractionRecord {
        ExtractionRecord::Bar(BarChart {
            title: Some("Quarterly revenue".into()),
            data_points: vec![
                BarPoint {
                    category: Some("Q1".into()),
                    value: Some(json!(10.0)),
                },
                BarPoint {
                    category: Some("Q2, adjusted".into()),
                    value: Some(json!(20.0)),
                },
                BarPoint {
                    category: Some("Q3".into()),
                    value: Some(json!(30.0)),
                },
            ],
            ..Default::default()
        })
    }

    #[test]
    fn bar_csv_has_category_value_columns() {
        let csv = render_csv(&bar_record()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "category,value");
        assert_eq!(lines[1], "Q1,10.0");
        // Comma inside a category forces quoting.
        assert_eq!(lines[2], "\"Q2, adjusted\",20.0");
        assert_eq!(lines.len(), 4);
        assert!(csv.ends_with('\n'));
    }

    #[test]
    fn line_csv_flattens_series() {
        let record = ExtractionRecord::Line(LineChart {
            series: vec![
                Series {
                    name: Some("North".into()),
                    data_points: vec![
                        LinePoint {
                            x: Some(json!("Jan")),
                            y: Some(json!(100)),
                        },
                        LinePoint {
                            x: Some(json!("Feb")),
                            y: Some(json!(120)),
                        },
                    ],
                },
                Series {
                    name: Some("South".into()),
                    data_points: vec![LinePoint {
                        x: Some(json!("Jan")),
                        y: Some(json!(80)),
                    }],
                },
            ],
            ..Default::default()
        });

        let csv = render_csv(&record).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "series,x,y");
        assert_eq!(lines[1], "North,Jan,100");
        assert_eq!(lines[3], "South,Jan,80");
    }

    #[test]
    fn pie_csv_has_label_value_percentage_columns() {
        let record = ExtractionRecord::Pie(PieChart {
            segments: vec![Segment {
                label: Some("Mobile".into()),
                value: Some(json!(62.5)),
                percentage: Some(json!(62.5)),
            }],
            ..Default::default()
        });
        let csv = render_csv(&record).unwrap();
        assert!(csv.starts_with("label,value,percentage\n"));
        assert!(csv.contains("Mobile,62.5,62.5"));
    }

    #[test]
    fn scatter_csv_has_x_y_columns() {
        let record = ExtractionRecord::Scatter(ScatterPlot {
            data_points: vec![ScatterPoint {
                x: Some(json!(1)),
                y: Some(json!(2)),
            }],
            ..Default::default()
        });
        assert_eq!(render_csv(&record).unwrap(), "x,y\n1,2\n");
    }

    #[test]
    fn generic_kinds_refuse_csv() {
        let record = ExtractionRecord::Table(Default::default());
        let err = render_csv(&record).unwrap_err();
        assert!(matches!(err, ChartError::ExportUnsupported { .. }));
        assert!(err.to_string().contains("table"));
    }

    #[test]
    fn missing_leaf_values_render_empty_cells() {
        let record = ExtractionRecord::Bar(BarChart {
            data_points: vec![BarPoint {
                category: None,
                value: None,
            }],
            ..Default::default()
        });
        assert_eq!(render_csv(&record).unwrap(), "category,value\n,\n");
    }

    #[test]
    fn csv_text_escapes_quotes() {
        assert_eq!(csv_text(Some("say \"hi\"")), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_text(Some("plain")), "plain");
    }

    #[tokio::test]
    async fn write_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("record.json");

        write_json(&bar_record(), &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with('\n'));
        let back: ExtractionRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back.kind(), ChartKind::Bar);
        assert_eq!(back.title(), Some("Quarterly revenue"));
    }

    #[tokio::test]
    async fn write_csv_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");

        write_csv(&bar_record(), &path).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("category,value\n"));
        // No temp file left behind.
        assert!(!dir.path().join("data.csv.tmp").exists());
    }

    #[test]
    fn summarize_bar_computes_key_metrics() {
        let summary = summarize(&bar_record());
        assert_eq!(summary.chart_type, ChartKind::Bar);
        assert_eq!(summary.title, "Quarterly revenue");
        assert_eq!(summary.data_point_count, 3);
        let metrics = summary.key_metrics.unwrap();
        assert_eq!(metrics.highest, 30.0);
        assert_eq!(metrics.lowest, 10.0);
        assert_eq!(metrics.average, 20.0);
    }

    #[test]
    fn summarize_pie_reports_total() {
        let record = ExtractionRecord::Pie(PieChart {
            segments: vec![Segment::default(), Segment::default()],
            ..Default::default()
        });
        let summary = summarize(&record);
        assert_eq!(summary.data_point_count, 2);
        assert_eq!(summary.total, Some(100.0));
        assert_eq!(summary.title, "Untitled");
    }

    #[test]
    fn summarize_skips_non_numeric_bar_values() {
        let record = ExtractionRecord::Bar(BarChart {
            data_points: vec![BarPoint {
                category: Some("A".into()),
                value: Some(json!("n/a")),
            }],
            ..Default::default()
        });
        let summary = summarize(&record);
        assert_eq!(summary.data_point_count, 1);
        assert!(summary.key_metrics.is_none());
    }

    #[test]
    fn statistics_match_hand_computed_values() {
        let stats = column_statistics(&bar_record());
        assert_eq!(stats.len(), 1);
        let (name, s) = &stats[0];
        assert_eq!(name, "value");
        assert_eq!(s.count, 3);
        assert_eq!(s.sum, 60.0);
        assert_eq!(s.mean, 20.0);
        assert_eq!(s.median, 20.0);
        assert_eq!(s.min, 10.0);
        assert_eq!(s.max, 30.0);
        assert_eq!(s.std, 10.0); // sample std of 10, 20, 30
    }

    #[test]
    fn statistics_even_count_median_averages_middle_pair() {
        let values = [1.0, 3.0, 5.0, 7.0];
        let s = stats_of(&values);
        assert_eq!(s.median, 4.0);
    }

    #[test]
    fn statistics_omit_empty_columns() {
        let record = ExtractionRecord::Scatter(ScatterPlot {
            data_points: vec![ScatterPoint {
                x: Some(json!("left")),
                y: Some(json!(2)),
            }],
            ..Default::default()
        });
        let stats = column_statistics(&record);
        // x has no numeric cells and is omitted; y survives.
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].0, "y");
    }
}
