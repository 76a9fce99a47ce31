//! Configuration for chart analysis.
//!
//! All behaviour is controlled through [`AnalysisConfig`], built via its
//! [`AnalysisConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share configs across calls, serialise them for logging, and
//! diff two runs to understand why their outputs differ.

use crate::error::ChartError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for a chart analysis run.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use chart2data::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .max_dimension(1024)
///     .min_confidence(0.8)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// VLM model identifier, e.g. "gpt-4.1-nano", "claude-sonnet-4-20250514".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// VLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `provider`, the provider is auto-detected from
    /// API-key environment variables.
    pub provider_name: Option<String>,

    /// Pre-constructed VLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Maximum image dimension (width or height) in pixels. Default: 2048.
    ///
    /// Charts larger than this are downscaled before transmission; vision
    /// models gain nothing from more pixels while the request body grows
    /// quadratically. Axis text stays legible well above 1024 px.
    pub max_dimension: u32,

    /// Apply contrast/sharpness enhancement before encoding. Default: true.
    ///
    /// Local contrast equalization plus mild sharpening makes thin grid
    /// lines and small axis labels easier for the model to read. Turn off
    /// for screenshots that are already crisp.
    pub enhance: bool,

    /// Minimum detection confidence accepted without a validation issue.
    /// Default: 0.7.
    pub min_confidence: f64,

    /// Extraction attempts before giving up. Default: 3.
    ///
    /// Each attempt is an independent call + parse; no partial results carry
    /// across attempts. Detection and question-answering never retry.
    pub max_extraction_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Sampling temperature for the VLM completion. Default: 0.1.
    ///
    /// Low temperature keeps the model faithful to what it sees on the
    /// chart. Higher values introduce creativity that worsens numeric
    /// read-off accuracy.
    pub temperature: f32,

    /// Maximum tokens the VLM may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            max_dimension: 2048,
            enhance: true,
            min_confidence: 0.7,
            max_extraction_retries: 3,
            retry_backoff_ms: 500,
            temperature: 0.1,
            max_tokens: 4096,
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_dimension", &self.max_dimension)
            .field("enhance", &self.enhance)
            .field("min_confidence", &self.min_confidence)
            .field("max_extraction_retries", &self.max_extraction_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(64);
        self
    }

    pub fn enhance(mut self, v: bool) -> Self {
        self.config.enhance = v;
        self
    }

    pub fn min_confidence(mut self, c: f64) -> Self {
        self.config.min_confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn max_extraction_retries(mut self, n: u32) -> Self {
        self.config.max_extraction_retries = n.max(1);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ChartError> {
        let c = &self.config;
        if c.max_dimension < 64 {
            return Err(ChartError::InvalidConfig(format!(
                "max_dimension must be ≥ 64, got {}",
                c.max_dimension
            )));
        }
        if !(0.0..=1.0).contains(&c.min_confidence) {
            return Err(ChartError::InvalidConfig(format!(
                "min_confidence must be within [0, 1], got {}",
                c.min_confidence
            )));
        }
        if c.max_extraction_retries == 0 {
            return Err(ChartError::InvalidConfig(
                "max_extraction_retries must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}
