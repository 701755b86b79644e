//! The request-level entry points.
//!
//! A [`Processor`] owns one codec adapter and one configuration, both shared
//! by `Arc`, and is cheap to clone into request handlers. Each operation
//! validates its parameters first, then moves the CPU-bound part (decode,
//! encode, PDF assembly) onto `spawn_blocking` so an async transport never
//! stalls its reactor on image work.
//!
//! ## Pipeline Overview
//!
//! ```text
//! convert   ─ parse format ─▶ decode ─▶ encode(target)          ─▶ ProcessedFile
//! compress  ─ parse target ─▶ decode ─▶ JPEG ladder search       ─▶ CompressionResult
//! split     ─ parse point  ─▶ parse PDF ─▶ plan ─▶ 2× assemble   ─▶ SplitOutput (zip)
//! merge     ─ ≥2 PDFs      ─▶ parse all ─▶ concatenate           ─▶ ProcessedFile
//! images→pdf ─ ≥1 image    ─▶ decode all ─▶ one page per image   ─▶ ProcessedFile
//! ```

use crate::config::ProcessingConfig;
use crate::error::ForgeError;
use crate::output::{ArtifactInfo, ProcessedFile, SplitOutput};
use crate::pipeline::archive::ArchiveEntry;
use crate::pipeline::assemble;
use crate::pipeline::codec::{self, CodecAdapter, ImageCodec, MediaKind, SourceArtifact};
use crate::pipeline::compress::{self, CompressionRequest, CompressionResult};
use crate::pipeline::partition::{self, SplitRequest};
use crate::pipeline::transcode::{self, ConversionRequest};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Stateless image and PDF processing service.
///
/// # Example
/// ```rust,no_run
/// use docforge::{MediaKind, Processor, ProcessingConfig, SourceArtifact};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let processor = Processor::new(ProcessingConfig::default());
/// let photo = SourceArtifact::new(std::fs::read("photo.jpg")?, MediaKind::Image);
/// let webp = processor.convert(photo, "webp", Some(80)).await?;
/// std::fs::write(&webp.suggested_filename, &webp.bytes)?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Processor {
    config: Arc<ProcessingConfig>,
    codec: Arc<dyn ImageCodec>,
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(ProcessingConfig::default())
    }
}

impl Processor {
    /// Build a processor with the production codec.
    pub fn new(config: ProcessingConfig) -> Self {
        let codec = Arc::new(CodecAdapter::new(config.max_image_dimension));
        Self::with_codec(config, codec)
    }

    /// Build a processor around a caller-supplied codec.
    pub fn with_codec(config: ProcessingConfig, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            config: Arc::new(config),
            codec,
        }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    // ── Images ───────────────────────────────────────────────────────────

    /// Re-encode an image as `format` (`jpg`, `png`, `webp` or `avif`).
    ///
    /// The format and quality are validated before the image is decoded.
    pub async fn convert(
        &self,
        artifact: SourceArtifact,
        format: &str,
        quality: Option<i64>,
    ) -> Result<ProcessedFile, ForgeError> {
        let request = ConversionRequest::parse(format, quality)?;
        artifact.expect_kind(MediaKind::Image)?;

        let codec = Arc::clone(&self.codec);
        let config = Arc::clone(&self.config);
        let converted = run_blocking("convert", move || {
            transcode::convert(codec.as_ref(), &artifact, &request, &config)
        })
        .await?;

        let target = converted.format;
        Ok(ProcessedFile::new(
            converted.bytes,
            target.content_type(),
            format!("image.{}", target.extension()),
        ))
    }

    /// Compress an image to JPEG under `target_size_kb` (default from config).
    ///
    /// Best effort: check [`CompressionResult::target_met`].
    pub async fn compress(
        &self,
        artifact: SourceArtifact,
        target_size_kb: Option<i64>,
    ) -> Result<CompressionResult, ForgeError> {
        let request = CompressionRequest::parse(target_size_kb, self.config.default_target_size_kb)?;
        artifact.expect_kind(MediaKind::Image)?;

        let codec = Arc::clone(&self.codec);
        let config = Arc::clone(&self.config);
        run_blocking("compress", move || {
            compress::compress(
                codec.as_ref(),
                &artifact,
                &request,
                &config.compression,
                config.progress_callback.as_ref(),
            )
        })
        .await
    }

    // ── PDFs ─────────────────────────────────────────────────────────────

    /// Split a PDF after page `split_at` (1-based) into two documents.
    ///
    /// Both parts are assembled before this returns; the archive is built
    /// when the caller writes or streams the [`SplitOutput`].
    pub async fn split(
        &self,
        artifact: SourceArtifact,
        split_at: &str,
    ) -> Result<SplitOutput, ForgeError> {
        let start = Instant::now();
        let request = SplitRequest::parse(split_at)?;
        artifact.expect_kind(MediaKind::Pdf)?;

        let decoded = run_blocking("decode pdf", move || codec::decode_pdf(&artifact)).await?;
        let plan = partition::plan(decoded.page_count(), &request, self.config.max_pages)?;
        debug!(
            "Split plan: {} | {}",
            plan.first_name(),
            plan.second_name()
        );

        let progress = self.config.progress_callback.clone();
        if let Some(cb) = &progress {
            cb.on_split_start(plan.total_pages, plan.split_at);
        }

        let source = Arc::new(decoded.into_document());
        let (first, second) = assemble::assemble_split(source, &plan, progress.clone()).await?;
        let entries = vec![
            ArchiveEntry::new(plan.first_name(), first),
            ArchiveEntry::new(plan.second_name(), second),
        ];

        info!(
            "Split ready in {}ms: {} pages at {}",
            start.elapsed().as_millis(),
            plan.total_pages,
            plan.split_at
        );
        Ok(SplitOutput::new(
            plan,
            entries,
            self.config.archive_compression_level,
            progress,
        ))
    }

    /// Concatenate two or more PDFs in the given order.
    pub async fn merge(&self, artifacts: Vec<SourceArtifact>) -> Result<ProcessedFile, ForgeError> {
        if artifacts.len() < 2 {
            return Err(ForgeError::InvalidInput {
                reason: format!("merge needs at least 2 PDFs, got {}", artifacts.len()),
            });
        }
        for artifact in &artifacts {
            artifact.expect_kind(MediaKind::Pdf)?;
        }

        let max_pages = self.config.max_pages;
        let bytes = run_blocking("merge", move || {
            let documents = artifacts
                .iter()
                .map(|a| codec::decode_pdf(a).map(|d| d.into_document()))
                .collect::<Result<Vec<_>, _>>()?;
            assemble::merge(documents, max_pages)
        })
        .await?;

        Ok(ProcessedFile::new(bytes, PDF_CONTENT_TYPE, "merged.pdf"))
    }

    /// Build a PDF with one page per image, in the given order.
    pub async fn images_to_pdf(
        &self,
        artifacts: Vec<SourceArtifact>,
    ) -> Result<ProcessedFile, ForgeError> {
        if artifacts.is_empty() {
            return Err(ForgeError::InvalidInput {
                reason: "no images to convert".into(),
            });
        }
        for artifact in &artifacts {
            artifact.expect_kind(MediaKind::Image)?;
        }

        let codec = Arc::clone(&self.codec);
        let quality = self.config.default_quality;
        let bytes = run_blocking("images to pdf", move || {
            let images = artifacts
                .iter()
                .map(|a| codec.decode(a))
                .collect::<Result<Vec<_>, _>>()?;
            assemble::images_to_pdf(&images, codec.as_ref(), quality)
        })
        .await?;

        Ok(ProcessedFile::new(bytes, PDF_CONTENT_TYPE, "converted.pdf"))
    }

    // ── Metadata ─────────────────────────────────────────────────────────

    /// Report kind, size, and format details without producing output.
    pub async fn inspect(&self, artifact: SourceArtifact) -> Result<ArtifactInfo, ForgeError> {
        let size_bytes = artifact.len();
        match artifact.kind() {
            MediaKind::Image => {
                let probe = codec::probe_image(&artifact)?;
                Ok(ArtifactInfo {
                    kind: MediaKind::Image,
                    size_bytes,
                    format: Some(format!("{:?}", probe.format).to_ascii_lowercase()),
                    width: Some(probe.width),
                    height: Some(probe.height),
                    page_count: None,
                    pdf_version: None,
                })
            }
            MediaKind::Pdf => {
                let decoded =
                    run_blocking("inspect pdf", move || codec::decode_pdf(&artifact)).await?;
                Ok(ArtifactInfo {
                    kind: MediaKind::Pdf,
                    size_bytes,
                    format: None,
                    width: None,
                    height: None,
                    page_count: Some(decoded.page_count()),
                    pdf_version: Some(decoded.version().to_string()),
                })
            }
        }
    }
}

/// Run CPU-bound work on the blocking pool, mapping a panicked task to
/// [`ForgeError::Internal`].
async fn run_blocking<T, F>(what: &'static str, work: F) -> Result<T, ForgeError>
where
    F: FnOnce() -> Result<T, ForgeError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ForgeError::Internal(format!("{what} task failed: {e}")))?
}
