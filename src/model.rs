//! Core data model: chart kinds, detection and extraction records.
//!
//! Everything here is an immutable value produced by one pipeline stage and
//! consumed by the next. The untrusted, dynamically shaped model output lives
//! as `serde_json::Value` only between the response parser and the schema
//! validator; these types are the trusted form on the far side of that
//! boundary.
//!
//! Leaf numeric fields ([`BarPoint::value`], [`ScatterPoint::x`], …) are kept
//! as `Option<serde_json::Value>` rather than `f64`: model output is
//! untrusted, and a missing or non-numeric value must survive typed decoding
//! so the validator can *report* it and export can still proceed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

// ── Chart kinds ──────────────────────────────────────────────────────────

/// Closed set of chart shapes the detector may declare.
///
/// Wire names (`bar_chart`, `line_chart`, …) match what the detection prompt
/// instructs the model to emit. Unrecognized names fold into [`ChartKind::Other`]
/// at this typed boundary; the value-level validator still reports the raw
/// invalid string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum ChartKind {
    #[serde(rename = "bar_chart")]
    Bar,
    #[serde(rename = "line_chart")]
    Line,
    #[serde(rename = "pie_chart")]
    Pie,
    #[serde(rename = "scatter_plot")]
    Scatter,
    #[serde(rename = "area_chart")]
    Area,
    #[serde(rename = "combo_chart")]
    Combo,
    #[serde(rename = "table")]
    Table,
    #[default]
    #[serde(rename = "other")]
    Other,
}

// Manual Deserialize: unrecognized wire names fold into `Other` instead of
// failing the whole record, so an off-script model answer still decodes and
// the value-level validator gets to report the raw string.
impl<'de> Deserialize<'de> for ChartKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(match name.as_str() {
            "bar_chart" => ChartKind::Bar,
            "line_chart" => ChartKind::Line,
            "pie_chart" => ChartKind::Pie,
            "scatter_plot" => ChartKind::Scatter,
            "area_chart" => ChartKind::Area,
            "combo_chart" => ChartKind::Combo,
            "table" => ChartKind::Table,
            _ => ChartKind::Other,
        })
    }
}

/// Every valid wire name, in declaration order.
pub const VALID_KINDS: [&str; 8] = [
    "bar_chart",
    "line_chart",
    "pie_chart",
    "scatter_plot",
    "area_chart",
    "combo_chart",
    "table",
    "other",
];

impl ChartKind {
    /// The wire name used in prompts, JSON payloads, and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar_chart",
            ChartKind::Line => "line_chart",
            ChartKind::Pie => "pie_chart",
            ChartKind::Scatter => "scatter_plot",
            ChartKind::Area => "area_chart",
            ChartKind::Combo => "combo_chart",
            ChartKind::Table => "table",
            ChartKind::Other => "other",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChartKind {
    type Err = String;

    /// Accepts wire names and short aliases (`bar`, `line`, `pie`, `scatter`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar_chart" | "bar" => Ok(ChartKind::Bar),
            "line_chart" | "line" => Ok(ChartKind::Line),
            "pie_chart" | "pie" => Ok(ChartKind::Pie),
            "scatter_plot" | "scatter" => Ok(ChartKind::Scatter),
            "area_chart" | "area" => Ok(ChartKind::Area),
            "combo_chart" | "combo" => Ok(ChartKind::Combo),
            "table" => Ok(ChartKind::Table),
            "other" => Ok(ChartKind::Other),
            unknown => Err(format!(
                "unknown chart type '{}' (expected one of: {})",
                unknown,
                VALID_KINDS.join(", ")
            )),
        }
    }
}

/// Extract an `f64` from a JSON value when it is numeric.
pub(crate) fn number_of(value: &Value) -> Option<f64> {
    value.as_f64()
}

// ── Detection ────────────────────────────────────────────────────────────

/// Result of the chart-type detection call. Read-only once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    #[serde(default)]
    pub chart_type: ChartKind,
    /// Model self-reported confidence in [0, 1]. Defaults to 0 when absent,
    /// which the validator flags as below threshold.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

// ── Extraction ───────────────────────────────────────────────────────────

/// Structured data pulled out of a chart image, tagged by kind.
///
/// Decoded from model JSON after the response parser; immutable once
/// validated. A failed validation does not repair the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "chart_type")]
pub enum ExtractionRecord {
    #[serde(rename = "bar_chart")]
    Bar(BarChart),
    #[serde(rename = "line_chart")]
    Line(LineChart),
    #[serde(rename = "pie_chart")]
    Pie(PieChart),
    #[serde(rename = "scatter_plot")]
    Scatter(ScatterPlot),
    #[serde(rename = "area_chart")]
    Area(GenericChart),
    #[serde(rename = "combo_chart")]
    Combo(GenericChart),
    #[serde(rename = "table")]
    Table(GenericChart),
    #[serde(rename = "other")]
    Other(GenericChart),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarChart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub data_points: Vec<BarPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineChart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trends: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Series {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub data_points: Vec<LinePoint>,
}

/// One point on a line. `x` may be categorical ("Jan") or numeric.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinePoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieChart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// What the segments are expected to sum to. Defaults to 100.
    #[serde(default = "default_pie_total")]
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for PieChart {
    fn default() -> Self {
        Self {
            title: None,
            total: default_pie_total(),
            unit: None,
            segments: Vec::new(),
            notes: None,
        }
    }
}

fn default_pie_total() -> f64 {
    100.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScatterPlot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x_axis_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_label: Option<String>,
    #[serde(default)]
    pub data_points: Vec<ScatterPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScatterPoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Value>,
}

/// Payload for kinds without a dedicated extraction schema (area, combo,
/// table, other). Keeps whatever the model returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenericChart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl ExtractionRecord {
    /// Decode a parsed model response into a record of the declared kind.
    ///
    /// The declared kind wins over whatever `chart_type` the model put in
    /// the payload, so the record and the detection that selected the prompt
    /// agree by construction.
    pub fn from_value(kind: ChartKind, value: Value) -> Result<Self, crate::error::ChartError> {
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(crate::error::ChartError::ParseFailed {
                    detail: "model response is not a JSON object".into(),
                    snippet: crate::pipeline::parse::snippet(&other.to_string()),
                })
            }
        };
        map.remove("chart_type");
        let payload = Value::Object(map);

        let decode_err = |e: serde_json::Error| crate::error::ChartError::ParseFailed {
            detail: format!("response does not match the {kind} schema: {e}"),
            snippet: String::new(),
        };

        Ok(match kind {
            ChartKind::Bar => ExtractionRecord::Bar(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
            ChartKind::Line => ExtractionRecord::Line(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
            ChartKind::Pie => ExtractionRecord::Pie(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
            ChartKind::Scatter => ExtractionRecord::Scatter(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
            ChartKind::Area => ExtractionRecord::Area(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
            ChartKind::Combo => ExtractionRecord::Combo(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
            ChartKind::Table => ExtractionRecord::Table(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
            ChartKind::Other => ExtractionRecord::Other(
                serde_json::from_value(payload).map_err(decode_err)?,
            ),
        })
    }

    /// The record's declared kind.
    pub fn kind(&self) -> ChartKind {
        match self {
            ExtractionRecord::Bar(_) => ChartKind::Bar,
            ExtractionRecord::Line(_) => ChartKind::Line,
            ExtractionRecord::Pie(_) => ChartKind::Pie,
            ExtractionRecord::Scatter(_) => ChartKind::Scatter,
            ExtractionRecord::Area(_) => ChartKind::Area,
            ExtractionRecord::Combo(_) => ChartKind::Combo,
            ExtractionRecord::Table(_) => ChartKind::Table,
            ExtractionRecord::Other(_) => ChartKind::Other,
        }
    }

    pub fn title(&self) -> Option<&str> {
        match self {
            ExtractionRecord::Bar(c) => c.title.as_deref(),
            ExtractionRecord::Line(c) => c.title.as_deref(),
            ExtractionRecord::Pie(c) => c.title.as_deref(),
            ExtractionRecord::Scatter(c) => c.title.as_deref(),
            ExtractionRecord::Area(c)
            | ExtractionRecord::Combo(c)
            | ExtractionRecord::Table(c)
            | ExtractionRecord::Other(c) => c.title.as_deref(),
        }
    }

    /// Re-serialize to the generic JSON form (for validation and export).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ── Question answering ───────────────────────────────────────────────────

/// Answer to a free-form question about a chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    #[serde(default)]
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

// ── Aggregate ────────────────────────────────────────────────────────────

/// Complete analysis of one image: detection + extraction, owned by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub image_path: String,
    pub detection: DetectionResult,
    pub extraction: ExtractionRecord,
    /// RFC 3339 UTC timestamp taken when the analysis completed.
    pub timestamp: String,
}

impl AnalysisResult {
    /// Re-serialize to the generic JSON form (for validation and export).
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chart_kind_wire_names_round_trip() {
        for name in VALID_KINDS {
            let kind: ChartKind = name.parse().expect("wire name parses");
            assert_eq!(kind.as_str(), name);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{name}\""));
        }
    }

    #[test]
    fn chart_kind_aliases() {
        assert_eq!("bar".parse::<ChartKind>().unwrap(), ChartKind::Bar);
        assert_eq!("Pie".parse::<ChartKind>().unwrap(), ChartKind::Pie);
        assert!("donut".parse::<ChartKind>().is_err());
    }

    #[test]
    fn chart_kind_deserialize_unknown_folds_to_other() {
        let kind: ChartKind = serde_json::from_value(json!("donut_chart")).unwrap();
        assert_eq!(kind, ChartKind::Other);
    }

    #[test]
    fn detection_defaults_when_fields_absent() {
        let det: DetectionResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(det.chart_type, ChartKind::Other);
        assert_eq!(det.confidence, 0.0);
        assert!(det.orientation.is_none());
    }

    #[test]
    fn bar_record_decodes_and_stamps_kind() {
        let value = json!({
            "chart_type": "line_chart",
            "title": "Revenue",
            "data_points": [
                {"category": "Q1", "value": 10.5},
                {"category": "Q2", "value": "n/a"}
            ]
        });
        // Declared kind wins over the payload's own chart_type.
        let record = ExtractionRecord::from_value(ChartKind::Bar, value).unwrap();
        assert_eq!(record.kind(), ChartKind::Bar);
        assert_eq!(record.title(), Some("Revenue"));
        match record {
            ExtractionRecord::Bar(bar) => {
                assert_eq!(bar.data_points.len(), 2);
                assert_eq!(number_of(bar.data_points[0].value.as_ref().unwrap()), Some(10.5));
                assert_eq!(number_of(bar.data_points[1].value.as_ref().unwrap()), None);
            }
            other => panic!("expected bar record, got {other:?}"),
        }
    }

    #[test]
    fn pie_total_defaults_to_100() {
        let record = ExtractionRecord::from_value(
            ChartKind::Pie,
            json!({"segments": [{"label": "A", "value": 60}]}),
        )
        .unwrap();
        match record {
            ExtractionRecord::Pie(pie) => assert_eq!(pie.total, 100.0),
            other => panic!("expected pie record, got {other:?}"),
        }
    }

    #[test]
    fn generic_kind_preserves_unknown_fields() {
        let record = ExtractionRecord::from_value(
            ChartKind::Table,
            json!({"title": "T", "rows": [[1, 2], [3, 4]]}),
        )
        .unwrap();
        let value = record.to_value();
        assert_eq!(value["chart_type"], "table");
        assert_eq!(value["rows"][1][0], 3);
    }

    #[test]
    fn from_value_rejects_non_object() {
        let err = ExtractionRecord::from_value(ChartKind::Bar, json!([1, 2, 3])).unwrap_err();
        assert!(err.to_string().contains("not a JSON object"));
    }

    #[test]
    fn tagged_serialization_round_trip() {
        let record = ExtractionRecord::Scatter(ScatterPlot {
            title: Some("Height vs weight".into()),
            data_points: vec![ScatterPoint {
                x: Some(json!(10)),
                y: Some(json!(20)),
            }],
            correlation: Some("positive".into()),
            ..Default::default()
        });
        let value = record.to_value();
        assert_eq!(value["chart_type"], "scatter_plot");
        let back: ExtractionRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back.kind(), ChartKind::Scatter);
    }
}
