//! Instruction prompts for chart detection, extraction, and questions.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing the expected response schema for
//!    a chart kind means editing exactly one constant, and the validator's
//!    field names stay visibly in sync with what the model is told to emit.
//!
//! 2. **Testability** — unit tests can inspect prompts directly without
//!    spinning up a real VLM, making schema drift easy to catch.

use crate::model::ChartKind;

/// Prompt for the chart-type detection call.
pub const DETECTION_PROMPT: &str = r#"You are an expert at analyzing charts and graphs.
Analyze this image and determine the chart type.

Possible types:
- bar_chart (vertical or horizontal bars)
- line_chart (line plot with trends)
- pie_chart (circular chart with segments)
- scatter_plot (points on x-y axis)
- area_chart (filled area under line)
- combo_chart (combination of multiple types)
- table (data table)
- other (if none of the above)

Respond with ONLY a JSON object in this exact format:
{
    "chart_type": "bar_chart",
    "confidence": 0.95,
    "orientation": "vertical",
    "reasoning": "Clear vertical bars with x-axis labels"
}"#;

/// Extraction prompt for bar charts. Also the fallback for kinds without a
/// dedicated schema.
pub const BAR_EXTRACTION_PROMPT: &str = r#"You are analyzing a bar chart. Extract ALL data points with high precision.

Instructions:
1. Identify the x-axis labels (categories)
2. Read the y-axis values for each bar
3. Note the axis titles and units
4. Extract the chart title if present

Respond with ONLY a JSON object in this exact format:
{
    "title": "Chart title here",
    "x_axis_label": "X axis label",
    "y_axis_label": "Y axis label",
    "unit": "unit of measurement",
    "data_points": [
        {"category": "Category 1", "value": 45.5},
        {"category": "Category 2", "value": 32.1}
    ],
    "notes": "Any additional observations"
}"#;

pub const LINE_EXTRACTION_PROMPT: &str = r#"You are analyzing a line chart. Extract ALL data points and trends.

Instructions:
1. Identify all lines/series in the chart
2. Extract data points for each line
3. Note axis labels, titles, and units
4. Identify any trends or patterns

Respond with ONLY a JSON object in this exact format:
{
    "title": "Chart title here",
    "x_axis_label": "X axis label",
    "y_axis_label": "Y axis label",
    "unit": "unit of measurement",
    "series": [
        {
            "name": "Series 1",
            "data_points": [
                {"x": "Jan", "y": 100},
                {"x": "Feb", "y": 120}
            ]
        }
    ],
    "trends": "Description of trends",
    "notes": "Any additional observations"
}"#;

pub const PIE_EXTRACTION_PROMPT: &str = r#"You are analyzing a pie chart. Extract ALL segments with their values.

Instructions:
1. Identify all segments/slices
2. Extract the percentage or value for each segment
3. Note the chart title
4. Identify the total if shown

Respond with ONLY a JSON object in this exact format:
{
    "title": "Chart title here",
    "total": 100,
    "unit": "percentage or absolute value",
    "segments": [
        {"label": "Segment 1", "value": 35.5, "percentage": 35.5},
        {"label": "Segment 2", "value": 25.0, "percentage": 25.0}
    ],
    "notes": "Any additional observations"
}"#;

pub const SCATTER_EXTRACTION_PROMPT: &str = r#"You are analyzing a scatter plot. Extract data points and patterns.

Instructions:
1. Sample key data points (if too many, sample representative ones)
2. Identify any clusters or patterns
3. Note axis labels, titles, and units
4. Describe the correlation if visible

Respond with ONLY a JSON object in this exact format:
{
    "title": "Chart title here",
    "x_axis_label": "X axis label",
    "y_axis_label": "Y axis label",
    "data_points": [
        {"x": 10, "y": 20},
        {"x": 15, "y": 25}
    ],
    "correlation": "positive/negative/none",
    "clusters": "Description of any clusters",
    "notes": "Any additional observations"
}"#;

/// Template for free-form questions. `{context}` and `{question}` are filled
/// by [`question_prompt`].
const QUESTION_PROMPT_TEMPLATE: &str = r#"You are analyzing a chart/graph to answer a specific question.

Chart context: {context}

Question: {question}

Provide a clear, concise answer based on the visual data. If you need to make calculations, show your work.
Include specific numbers and references to the chart elements.

Respond with ONLY a JSON object in this exact format:
{
    "answer": "Your detailed answer here",
    "evidence": "Specific data points or visual elements that support your answer",
    "confidence": 0.95
}"#;

/// Select the extraction prompt for a chart kind.
///
/// Kinds without a dedicated schema (area, combo, table, other) fall back to
/// the bar-chart prompt.
pub fn extraction_prompt(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Bar => BAR_EXTRACTION_PROMPT,
        ChartKind::Line => LINE_EXTRACTION_PROMPT,
        ChartKind::Pie => PIE_EXTRACTION_PROMPT,
        ChartKind::Scatter => SCATTER_EXTRACTION_PROMPT,
        _ => BAR_EXTRACTION_PROMPT,
    }
}

/// Build the question-answering prompt from context and question.
pub fn question_prompt(context: &str, question: &str) -> String {
    QUESTION_PROMPT_TEMPLATE
        .replacen("{question}", question, 1)
        .replacen("{context}", context, 1)
}
