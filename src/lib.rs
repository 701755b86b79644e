//! # docforge
//!
//! Stateless image and PDF processing: format conversion, size-bounded JPEG
//! compression, PDF split/merge, images-to-PDF, and streamed zip archives.
//!
//! ## Why this crate?
//!
//! Upload-and-transform backends tend to grow the same four handlers: change
//! an image's format, squeeze it under a size limit, cut a PDF in two, and
//! hand back a zip. Each is simple on its own, yet the failure cases
//! (unsupported formats, EXIF rotation, split points past the end, a client
//! that hangs up mid-download) are where they go wrong. This crate does the
//! processing and leaves HTTP, storage and auth to the host.
//!
//! ## Pipeline Overview
//!
//! ```text
//! bytes ──▶ SourceArtifact (kind sniffed)
//!            │
//!            ├─ image ─▶ decode + orient ─┬─▶ encode(jpg|png|webp|avif)
//!            │                            └─▶ JPEG quality ladder ≤ target
//!            │
//!            └─ pdf ───▶ lopdf parse ─▶ plan split ─▶ 2× assemble ─▶ zip stream
//!                                    ├▶ merge
//!                                    └▶ inspect
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docforge::{Processor, ProcessingConfig, SourceArtifact};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let processor = Processor::new(ProcessingConfig::default());
//!
//!     let pdf = SourceArtifact::sniff(std::fs::read("report.pdf")?)?;
//!     let split = processor.split(pdf, "3").await?;
//!     eprintln!("{} → {}", split.suggested_filename, split.content_disposition());
//!
//!     let mut chunks = split.into_stream();
//!     while let Some(chunk) = chunks.next().await {
//!         let _bytes = chunk?; // forward to the client
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docforge` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docforge = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    CompressionLadder, PngEffort, ProcessingConfig, ProcessingConfigBuilder, DEFAULT_QUALITY,
    DEFAULT_TARGET_SIZE_KB, MAX_FILE_SIZE, MAX_PAGES, MAX_PDF_SIZE,
};
pub use error::{ErrorCategory, ForgeError};
pub use output::{ArtifactInfo, ProcessedFile, SplitOutput};
pub use pipeline::archive::{write_archive, ArchiveEntry};
pub use pipeline::codec::{CodecAdapter, DecodedImage, EncodeOptions, ImageCodec, MediaKind, SourceArtifact};
pub use pipeline::compress::{CompressionAttempt, CompressionRequest, CompressionResult};
pub use pipeline::input::{resolve_input, InputOrigin, ResolvedInput};
pub use pipeline::partition::{PageRange, SplitPlan, SplitRequest};
pub use pipeline::transcode::{ConversionRequest, TargetFormat};
pub use processor::Processor;
pub use progress::{NoopProgressCallback, ProcessingProgressCallback, ProgressCallback};
pub use stream::{archive_stream, ArchiveStream};
