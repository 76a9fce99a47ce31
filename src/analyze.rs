//! Orchestration: detect kind → extract by kind → assemble the result.
//!
//! Entry points are deliberately thin sequencing over the pipeline stages.
//! The one piece of policy that lives here is the **bounded extraction
//! retry**: model calls that fail, and responses that fail to decode as
//! JSON, are retried up to the configured limit with exponential backoff.
//! Each attempt is independent — no partial results carry across attempts.
//! Detection and question-answering never retry; a single failure there
//! surfaces immediately.

use crate::config::AnalysisConfig;
use crate::error::ChartError;
use crate::model::{AnalysisResult, Answer, ChartKind, DetectionResult, ExtractionRecord};
use crate::pipeline::image::{self, NormalizedImage};
use crate::pipeline::{input, parse, vision};
use crate::prompts;
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// Model used when neither the config nor the environment names one.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Detect the chart type in an image.
///
/// Single model call, no retry: a failed call or undecodable response
/// surfaces immediately as an error.
pub async fn detect(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<DetectionResult, ChartError> {
    let input_str = input_str.as_ref();
    let provider = resolve_provider(config)?;
    let normalized = normalize_input(input_str, config).await?;
    detect_inner(&provider, &normalized, config).await
}

/// Extract structured data from a chart image.
///
/// When `kind` is `None` the chart type is auto-detected first. The
/// extraction call + parse sequence is retried up to
/// `config.max_extraction_retries` times.
pub async fn extract(
    input_str: impl AsRef<str>,
    kind: Option<ChartKind>,
    config: &AnalysisConfig,
) -> Result<ExtractionRecord, ChartError> {
    let input_str = input_str.as_ref();
    let provider = resolve_provider(config)?;
    let normalized = normalize_input(input_str, config).await?;

    let kind = match kind {
        Some(kind) => kind,
        None => {
            let detection = detect_inner(&provider, &normalized, config).await?;
            detection.chart_type
        }
    };
    info!("Extracting {kind} data from: {input_str}");

    extract_inner(&provider, &normalized, kind, config).await
}

/// Answer a free-form question about a chart, optionally with context from
/// a previous extraction. Single call, no retry.
pub async fn ask(
    input_str: impl AsRef<str>,
    question: &str,
    context: Option<&Value>,
    config: &AnalysisConfig,
) -> Result<Answer, ChartError> {
    let input_str = input_str.as_ref();
    info!("Answering question about {input_str}: {question}");
    let provider = resolve_provider(config)?;
    let normalized = normalize_input(input_str, config).await?;

    let context_str = match context {
        Some(value) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        None => "No prior context available".to_string(),
    };
    let prompt = prompts::question_prompt(&context_str, question);

    let raw = vision::request(&provider, &prompt, &normalized, config).await?;
    let value = parse::parse_response(&raw)?;
    let answer: Answer =
        serde_json::from_value(value).map_err(|e| ChartError::ParseFailed {
            detail: format!("response does not match the answer schema: {e}"),
            snippet: String::new(),
        })?;

    info!("Question answered (confidence: {:?})", answer.confidence);
    Ok(answer)
}

/// Complete analysis pipeline: detect, then extract with the detected kind.
///
/// The image is normalised once and reused for both model calls.
pub async fn analyze(
    input_str: impl AsRef<str>,
    config: &AnalysisConfig,
) -> Result<AnalysisResult, ChartError> {
    let input_str = input_str.as_ref();
    info!("Starting complete analysis for: {input_str}");

    let provider = resolve_provider(config)?;
    let normalized = normalize_input(input_str, config).await?;

    let detection = detect_inner(&provider, &normalized, config).await?;
    let extraction =
        extract_inner(&provider, &normalized, detection.chart_type, config).await?;

    info!("Complete analysis finished for: {input_str}");
    Ok(AnalysisResult {
        image_path: input_str.to_string(),
        detection,
        extraction,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

// ── Internal stages ──────────────────────────────────────────────────────

/// Resolve the input (path or URL) and run it through the image normalizer.
async fn normalize_input(
    input_str: &str,
    config: &AnalysisConfig,
) -> Result<NormalizedImage, ChartError> {
    let resolved = input::resolve_input(input_str, config.download_timeout_secs).await?;
    image::normalize(resolved.path(), config)
}

async fn detect_inner(
    provider: &Arc<dyn LLMProvider>,
    normalized: &NormalizedImage,
    config: &AnalysisConfig,
) -> Result<DetectionResult, ChartError> {
    let raw = vision::request(provider, prompts::DETECTION_PROMPT, normalized, config).await?;
    let value = parse::parse_response(&raw)?;

    let detection: DetectionResult =
        serde_json::from_value(value).map_err(|e| ChartError::ParseFailed {
            detail: format!("response does not match the detection schema: {e}"),
            snippet: String::new(),
        })?;

    info!(
        "Detected chart type: {} (confidence: {})",
        detection.chart_type, detection.confidence
    );
    Ok(detection)
}

async fn extract_inner(
    provider: &Arc<dyn LLMProvider>,
    normalized: &NormalizedImage,
    kind: ChartKind,
    config: &AnalysisConfig,
) -> Result<ExtractionRecord, ChartError> {
    let prompt = prompts::extraction_prompt(kind);
    let max_attempts = config.max_extraction_retries;

    let value = extract_with_retry(
        |attempt| {
            debug!("Extraction attempt {attempt}/{max_attempts}");
            vision::request(provider, prompt, normalized, config)
        },
        max_attempts,
        config.retry_backoff_ms,
    )
    .await?;

    ExtractionRecord::from_value(kind, value)
}

/// Run the call + parse sequence up to `max_attempts` times.
///
/// A call failure and a JSON decode failure are both retryable; anything
/// that survives parsing is returned as-is. Backoff doubles per attempt
/// (`backoff_ms * 2^(attempt-2)` before attempts 2, 3, …).
async fn extract_with_retry<F, Fut>(
    mut attempt_call: F,
    max_attempts: u32,
    backoff_ms: u64,
) -> Result<Value, ChartError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<String, ChartError>>,
{
    let mut last_err: Option<ChartError> = None;

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let backoff = backoff_ms * 2u64.pow(attempt - 2);
            warn!("Extraction retry {}/{} after {}ms", attempt, max_attempts, backoff);
            sleep(Duration::from_millis(backoff)).await;
        }

        match attempt_call(attempt).await {
            Ok(raw) => match parse::parse_response(&raw) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!("Extraction attempt {attempt} failed to parse: {e}");
                    last_err = Some(e);
                }
            },
            Err(e) => {
                warn!("Extraction attempt {attempt} call failed: {e}");
                last_err = Some(e);
            }
        }
    }

    Err(ChartError::ExtractionFailed {
        attempts: max_attempts,
        detail: last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string()),
    })
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ChartError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ChartError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the VLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is; useful in
///    tests or when the caller wraps the provider in middleware.
/// 2. **Named provider + model** (`config.provider_name`) — the factory
///    reads the matching API key from the environment.
/// 3. **Environment pair** (`CHART2DATA_PROVIDER` + `CHART2DATA_MODEL`) —
///    a provider chosen at the execution-environment level, honoured even
///    when multiple API keys are present.
/// 4. **OpenAI preference** — when `OPENAI_API_KEY` is set, default to
///    OpenAI so users with several keys get a deterministic choice.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`) — scan all known
///    API-key variables and take the first available provider.
///
/// Public so callers (the CLI included) can fail fast at startup when no
/// credential is configured, before any image work happens.
pub fn resolve_provider(
    config: &AnalysisConfig,
) -> Result<Arc<dyn LLMProvider>, ChartError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("CHART2DATA_PROVIDER"),
        std::env::var("CHART2DATA_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ChartError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No VLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_returns_record_when_third_attempt_parses() {
        let calls = AtomicU32::new(0);
        let value = extract_with_retry(
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Ok("the model rambled instead of emitting JSON".to_string())
                    } else {
                        Ok("{\"data_points\": []}".to_string())
                    }
                }
            },
            3,
            0,
        )
        .await
        .expect("third attempt should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(value.get("data_points").is_some());
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = extract_with_retry(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<String, _>(ChartError::ModelCallFailed {
                        detail: "backend down".into(),
                    })
                }
            },
            3,
            0,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            ChartError::ExtractionFailed { attempts, detail } => {
                assert_eq!(attempts, 3);
                assert!(detail.contains("backend down"));
            }
            other => panic!("expected ExtractionFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn retry_stops_at_first_success() {
        let calls = AtomicU32::new(0);
        let value = extract_with_retry(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("{\"ok\": true}".to_string()) }
            },
            3,
            0,
        )
        .await
        .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn retry_mixes_call_and_parse_failures() {
        // Attempt 1: call fails. Attempt 2: parse fails. Attempt 3: success.
        let value = extract_with_retry(
            |attempt| async move {
                match attempt {
                    1 => Err(ChartError::ModelCallFailed {
                        detail: "HTTP 503".into(),
                    }),
                    2 => Ok("```json\nnot json\n```".to_string()),
                    _ => Ok("```json\n{\"a\": 1}\n```".to_string()),
                }
            },
            3,
            0,
        )
        .await
        .unwrap();

        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn retry_respects_single_attempt_limit() {
        let calls = AtomicU32::new(0);
        let err = extract_with_retry(
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("still not json".to_string()) }
            },
            1,
            0,
        )
        .await
        .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ChartError::ExtractionFailed { attempts: 1, .. }));
    }
}
