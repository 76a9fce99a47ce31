//! Error types for the chart2data library.
//!
//! One fatal error enum covers the whole pipeline. Two classes of failure
//! deliberately do NOT appear here:
//!
//! * **Enhancement failures** — contrast/sharpen enhancement falls back to
//!   the unenhanced image inside the normalizer (logged as a warning). Only
//!   the final PNG/base64 encoding step is fatal, since the data-URI payload
//!   is the one form the multimodal API accepts.
//!
//! * **Validation issues** — shape and range problems in model output are
//!   returned as issue lists ([`crate::validate::ValidationReport`]), never
//!   as errors. Validation is advisory; a record whose pie segments sum to
//!   93 is still exported, just flagged.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the chart2data library.
#[derive(Debug, Error)]
pub enum ChartError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// File extension is not in the supported set.
    #[error("Unsupported image format '{extension}' for '{path}'\nSupported: png, jpg, jpeg, webp, gif")]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// The file exists but its bytes could not be decoded as an image.
    #[error("Failed to decode image '{path}': {detail}")]
    DecodeFailed { path: PathBuf, detail: String },

    // ── Encoding errors ───────────────────────────────────────────────────
    /// PNG/base64 serialisation of the processed image failed.
    #[error("Failed to encode processed image: {detail}")]
    EncodeFailed { detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("VLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// A single model call failed (network, HTTP error, empty response).
    #[error("Vision model call failed: {detail}")]
    ModelCallFailed { detail: String },

    /// Model output could not be decoded as JSON.
    ///
    /// Carries the head of the offending text for diagnostics.
    #[error("Failed to parse model response as JSON: {detail}\nResponse head: {snippet}")]
    ParseFailed { detail: String, snippet: String },

    /// Every extraction attempt failed; there is no record to return.
    #[error("Data extraction failed after {attempts} attempts.\nLast error: {detail}")]
    ExtractionFailed { attempts: u32, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The record's chart kind has no tabular shape.
    #[error("CSV export is not supported for chart type '{kind}'")]
    ExportUnsupported { kind: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = ChartError::UnsupportedFormat {
            path: PathBuf::from("chart.tiff"),
            extension: ".tiff".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".tiff"), "got: {msg}");
        assert!(msg.contains("webp"));
    }

    #[test]
    fn parse_failed_display_carries_snippet() {
        let e = ChartError::ParseFailed {
            detail: "expected value at line 1".into(),
            snippet: "not json at all".into(),
        };
        assert!(e.to_string().contains("not json at all"));
    }

    #[test]
    fn extraction_failed_display() {
        let e = ChartError::ExtractionFailed {
            attempts: 3,
            detail: "HTTP 503".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = ChartError::ProviderNotConfigured {
            provider: "auto".into(),
            hint: "Set OPENAI_API_KEY".into(),
        };
        assert!(e.to_string().contains("OPENAI_API_KEY"));
    }
}
