//! VLM interaction: build the vision message and call the provider.
//!
//! Intentionally thin — all prompt text lives in [`crate::prompts`] and the
//! bounded extraction retry loop lives in the orchestrator
//! ([`crate::analyze`]), so this module stays a single-shot request with no
//! policy of its own. Detection and question-answering call it exactly once;
//! extraction calls it once per attempt.

use crate::config::AnalysisConfig;
use crate::error::ChartError;
use crate::pipeline::image::NormalizedImage;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Send one prompt + image request and return the raw response text.
///
/// The request is a single user message carrying the instruction text and
/// the base64 PNG attachment; the JSON response schema is dictated entirely
/// by the prompt.
pub async fn request(
    provider: &Arc<dyn LLMProvider>,
    prompt: &str,
    image: &NormalizedImage,
    config: &AnalysisConfig,
) -> Result<String, ChartError> {
    let start = Instant::now();

    let messages = vec![ChatMessage::user_with_images(
        prompt,
        vec![image.to_image_data()],
    )];
    let options = build_options(config);

    let response = provider
        .chat(&messages, Some(&options))
        .await
        .map_err(|e| ChartError::ModelCallFailed {
            detail: format!("{e}"),
        })?;

    debug!(
        "VLM response: {} input tokens, {} output tokens, {:?}",
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );

    if response.content.trim().is_empty() {
        return Err(ChartError::ModelCallFailed {
            detail: "empty response content".into(),
        });
    }

    Ok(response.content)
}

/// Build `CompletionOptions` from the analysis config.
fn build_options(config: &AnalysisConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
