//! Error types for the docforge library.
//!
//! Every failure is fatal for the request that hit it: there is no partial
//! output and no retry inside the core. What differs between failures is
//! *when* they can happen relative to the first output byte, which decides how
//! a transport reports them:
//!
//! * Validation and decode failures are always raised **before** any output
//!   is produced, so the caller can still answer with a structured error body.
//! * [`ForgeError::StreamError`] happens after an archive has started
//!   streaming. Response headers are already committed at that point; the only
//!   correct recovery is to close the sink.
//!
//! [`ForgeError::category`] and [`ForgeError::is_pre_stream`] expose that
//! distinction without forcing callers to match every variant.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the docforge library.
#[derive(Debug, Error)]
pub enum ForgeError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Requested output format is not one of jpg, png, webp, avif.
    #[error("Unsupported format '{format}'. Supported formats: jpg, png, webp, avif")]
    UnsupportedFormat { format: String },

    /// Quality scalar outside 1–100.
    #[error("Invalid quality {quality}: must be between 1 and 100")]
    InvalidQuality { quality: i64 },

    /// Compression target is zero or negative.
    #[error("Invalid target size {value} KB: must be a positive number")]
    InvalidTargetSize { value: i64 },

    /// Split point is not a positive integer or does not leave two non-empty parts.
    #[error("Invalid split point: {reason}")]
    InvalidSplitPoint { reason: String },

    /// Document has more pages than the configured ceiling.
    #[error("PDF is too large ({pages} pages). Max allowed is {max}.")]
    DocumentTooLarge { pages: usize, max: usize },

    /// Request parameters are structurally wrong (e.g. too few files to merge).
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    // ── Decode errors ─────────────────────────────────────────────────────
    /// Bytes are neither a recognised image nor a PDF, or the wrong kind for the operation.
    #[error("Unsupported input kind: expected {expected}, got {actual}")]
    UnsupportedKind { expected: String, actual: String },

    /// Input could not be decoded.
    #[error("Failed to decode {kind}: {detail}\nEnsure the file is not encrypted or corrupt.")]
    CorruptInput { kind: String, detail: String },

    // ── Encode errors ─────────────────────────────────────────────────────
    /// A codec failed while producing output.
    #[error("Failed to encode {format}: {detail}")]
    EncodeError { format: String, detail: String },

    /// Building or serialising a PDF document failed.
    #[error("Failed to assemble document: {detail}")]
    AssemblyFailed { detail: String },

    // ── Stream errors ─────────────────────────────────────────────────────
    /// Archive output failed after streaming started.
    #[error("Archive stream failed: {source}")]
    StreamError {
        #[source]
        source: std::io::Error,
    },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Upload exceeds the size ceiling for its kind.
    #[error("File is too large ({size} bytes). Max allowed for {kind} is {max} bytes.")]
    FileTooLarge { kind: String, size: u64, max: u64 },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a worker task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ForgeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad parameters; the caller can fix the request and retry.
    Validation,
    /// The uploaded bytes could not be decoded.
    CorruptInput,
    /// A codec or document writer failed mid-pipeline.
    Encode,
    /// Output failed after streaming began.
    Stream,
    /// Reading the input or writing the output failed.
    Io,
    /// Configuration or runtime failure.
    Internal,
}

impl ForgeError {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ForgeError::UnsupportedFormat { .. }
            | ForgeError::InvalidQuality { .. }
            | ForgeError::InvalidTargetSize { .. }
            | ForgeError::InvalidSplitPoint { .. }
            | ForgeError::DocumentTooLarge { .. }
            | ForgeError::InvalidInput { .. } => ErrorCategory::Validation,
            ForgeError::UnsupportedKind { .. } | ForgeError::CorruptInput { .. } => {
                ErrorCategory::CorruptInput
            }
            ForgeError::EncodeError { .. } | ForgeError::AssemblyFailed { .. } => {
                ErrorCategory::Encode
            }
            ForgeError::StreamError { .. } => ErrorCategory::Stream,
            ForgeError::FileNotFound { .. }
            | ForgeError::PermissionDenied { .. }
            | ForgeError::FileTooLarge { .. }
            | ForgeError::DownloadFailed { .. }
            | ForgeError::DownloadTimeout { .. }
            | ForgeError::OutputWriteFailed { .. } => ErrorCategory::Io,
            ForgeError::InvalidConfig(_) | ForgeError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// `true` when the error can still be reported as a structured response,
    /// i.e. it cannot occur once archive bytes have been written.
    pub fn is_pre_stream(&self) -> bool {
        self.category() != ErrorCategory::Stream
    }

    /// `true` for errors the caller can fix by correcting the request.
    pub fn is_validation(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    pub(crate) fn encode(format: impl Into<String>, detail: impl ToString) -> Self {
        ForgeError::EncodeError {
            format: format.into(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn corrupt(kind: impl Into<String>, detail: impl ToString) -> Self {
        ForgeError::CorruptInput {
            kind: kind.into(),
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_names_value() {
        let e = ForgeError::UnsupportedFormat {
            format: "bmp".into(),
        };
        assert!(e.to_string().contains("'bmp'"), "got: {e}");
        assert_eq!(e.category(), ErrorCategory::Validation);
    }

    #[test]
    fn document_too_large_display() {
        let e = ForgeError::DocumentTooLarge {
            pages: 900,
            max: 500,
        };
        let msg = e.to_string();
        assert!(msg.contains("900 pages"), "got: {msg}");
        assert!(msg.contains("500"), "got: {msg}");
        assert!(e.is_validation());
    }

    #[test]
    fn stream_error_is_not_pre_stream() {
        let e = ForgeError::StreamError {
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"),
        };
        assert!(!e.is_pre_stream());
        assert_eq!(e.category(), ErrorCategory::Stream);
    }

    #[test]
    fn decode_and_encode_categories() {
        assert_eq!(
            ForgeError::corrupt("image", "bad header").category(),
            ErrorCategory::CorruptInput
        );
        assert_eq!(
            ForgeError::encode("avif", "oops").category(),
            ErrorCategory::Encode
        );
        assert!(ForgeError::encode("avif", "oops").is_pre_stream());
    }

    #[test]
    fn category_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::CorruptInput).unwrap();
        assert_eq!(json, "\"corrupt_input\"");
    }
}
