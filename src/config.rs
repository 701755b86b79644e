//! Configuration types for docforge processing.
//!
//! Every limit and codec knob lives in [`ProcessingConfig`], built via
//! [`ProcessingConfigBuilder`]. A [`crate::Processor`] is constructed once
//! from a config and reused for every request; nothing here is mutated after
//! `build()`.
//!
//! # Design choice: builder over constructor
//! Most callers only override one or two limits. The builder lets them set
//! exactly those and rely on documented defaults for the rest.

use crate::error::ForgeError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default quality for lossy conversions.
pub const DEFAULT_QUALITY: u8 = 85;

/// Default compression target in KB.
pub const DEFAULT_TARGET_SIZE_KB: u64 = 500;

/// Default page ceiling for split and merge.
pub const MAX_PAGES: usize = 500;

/// Default upload ceiling for images (10 MiB).
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default upload ceiling for PDFs (50 MiB).
pub const MAX_PDF_SIZE: u64 = 50 * 1024 * 1024;

/// Configuration shared by every operation of a [`crate::Processor`].
///
/// # Example
/// ```rust
/// use docforge::ProcessingConfig;
///
/// let config = ProcessingConfig::builder()
///     .max_pages(200)
///     .archive_compression_level(1)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_pages, 200);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Quality used by `convert` when the caller gives none. Range 1–100. Default: 85.
    pub default_quality: u8,

    /// Target used by `compress` when the caller gives none. Default: 500 KB.
    pub default_target_size_kb: u64,

    /// Quality ladder walked by the compression search. Default: 90 → 60, step 5.
    pub compression: CompressionLadder,

    /// PNG compression effort for conversions. Default: [`PngEffort::Best`].
    ///
    /// PNG is lossless, so effort is the only knob: it trades encode time for
    /// output size and never changes pixels.
    pub png_effort: PngEffort,

    /// Enable optimized Huffman tables and progressive scans for JPEG
    /// conversions. Default: true. The compression search always enables it.
    pub jpeg_max_effort: bool,

    /// AVIF encoder speed, 1 (slowest, smallest) to 10 (fastest). Default: 6.
    pub avif_speed: u8,

    /// Largest width or height accepted by the image decoder. Default: 16 384 px.
    ///
    /// A small file can declare a huge canvas; the cap keeps decode
    /// allocations bounded regardless of the compressed size.
    pub max_image_dimension: u32,

    /// Page ceiling for split and merge. Default: 500.
    pub max_pages: usize,

    /// Image upload ceiling, enforced by the input resolver. Default: 10 MiB.
    pub max_file_size: u64,

    /// PDF upload ceiling, enforced by the input resolver. Default: 50 MiB.
    pub max_pdf_size: u64,

    /// Deflate level for split archives, 1–9. Default: 1.
    ///
    /// Assembling the documents dominates the cost of a split; level 1 keeps
    /// the archive step cheap at the expense of a slightly larger zip.
    pub archive_compression_level: i64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional progress callback for CLI bars or host-side telemetry.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            default_quality: DEFAULT_QUALITY,
            default_target_size_kb: DEFAULT_TARGET_SIZE_KB,
            compression: CompressionLadder::default(),
            png_effort: PngEffort::Best,
            jpeg_max_effort: true,
            avif_speed: 6,
            max_image_dimension: 16_384,
            max_pages: MAX_PAGES,
            max_file_size: MAX_FILE_SIZE,
            max_pdf_size: MAX_PDF_SIZE,
            archive_compression_level: 1,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ProcessingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingConfig")
            .field("default_quality", &self.default_quality)
            .field("default_target_size_kb", &self.default_target_size_kb)
            .field("compression", &self.compression)
            .field("png_effort", &self.png_effort)
            .field("jpeg_max_effort", &self.jpeg_max_effort)
            .field("avif_speed", &self.avif_speed)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("max_pages", &self.max_pages)
            .field("max_file_size", &self.max_file_size)
            .field("max_pdf_size", &self.max_pdf_size)
            .field("archive_compression_level", &self.archive_compression_level)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ProcessingProgressCallback>"),
            )
            .finish()
    }
}

impl ProcessingConfig {
    /// Create a new builder for `ProcessingConfig`.
    pub fn builder() -> ProcessingConfigBuilder {
        ProcessingConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ProcessingConfig`].
#[derive(Debug)]
pub struct ProcessingConfigBuilder {
    config: ProcessingConfig,
}

impl ProcessingConfigBuilder {
    pub fn default_quality(mut self, quality: u8) -> Self {
        self.config.default_quality = quality.clamp(1, 100);
        self
    }

    pub fn default_target_size_kb(mut self, kb: u64) -> Self {
        self.config.default_target_size_kb = kb.max(1);
        self
    }

    pub fn compression(mut self, ladder: CompressionLadder) -> Self {
        self.config.compression = ladder;
        self
    }

    pub fn png_effort(mut self, effort: PngEffort) -> Self {
        self.config.png_effort = effort;
        self
    }

    pub fn jpeg_max_effort(mut self, v: bool) -> Self {
        self.config.jpeg_max_effort = v;
        self
    }

    pub fn avif_speed(mut self, speed: u8) -> Self {
        self.config.avif_speed = speed.clamp(1, 10);
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px;
        self
    }

    pub fn max_pages(mut self, n: usize) -> Self {
        self.config.max_pages = n;
        self
    }

    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn max_pdf_size(mut self, bytes: u64) -> Self {
        self.config.max_pdf_size = bytes;
        self
    }

    pub fn archive_compression_level(mut self, level: i64) -> Self {
        self.config.archive_compression_level = level;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ProcessingConfig, ForgeError> {
        let c = &self.config;
        c.compression.validate()?;
        if c.max_pages == 0 {
            return Err(ForgeError::InvalidConfig("max_pages must be ≥ 1".into()));
        }
        if c.max_image_dimension == 0 {
            return Err(ForgeError::InvalidConfig(
                "max_image_dimension must be ≥ 1".into(),
            ));
        }
        if !(1..=9).contains(&c.archive_compression_level) {
            return Err(ForgeError::InvalidConfig(format!(
                "archive compression level must be 1–9, got {}",
                c.archive_compression_level
            )));
        }
        Ok(self.config)
    }
}

// ── Codec knobs ──────────────────────────────────────────────────────────

/// Descending quality sequence tried by the compression search.
///
/// The search starts at `start`, steps down by `step`, and never goes below
/// `floor`. With the defaults that is 90, 85, 80, 75, 70, 65, 60: seven
/// encodes at most.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionLadder {
    pub start: u8,
    pub floor: u8,
    pub step: u8,
}

impl Default for CompressionLadder {
    fn default() -> Self {
        Self {
            start: 90,
            floor: 60,
            step: 5,
        }
    }
}

impl CompressionLadder {
    /// Check `1 ≤ floor ≤ start ≤ 100` and `step ≥ 1`.
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.start > 100 || self.floor == 0 || self.floor > self.start {
            return Err(ForgeError::InvalidConfig(format!(
                "compression ladder needs 1 ≤ floor ≤ start ≤ 100, got start={} floor={}",
                self.start, self.floor
            )));
        }
        if self.step == 0 {
            return Err(ForgeError::InvalidConfig(
                "compression ladder step must be ≥ 1".into(),
            ));
        }
        Ok(())
    }

    /// The quality after `quality`, or `None` once the floor is reached.
    pub fn next(&self, quality: u8) -> Option<u8> {
        if quality <= self.floor {
            None
        } else {
            Some(quality.saturating_sub(self.step).max(self.floor))
        }
    }

    /// Every quality the search may try, in order.
    pub fn qualities(&self) -> Vec<u8> {
        let mut out = vec![self.start];
        let mut q = self.start;
        while let Some(next) = self.next(q) {
            out.push(next);
            q = next;
        }
        out
    }
}

/// PNG compression effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PngEffort {
    /// Fastest encode, largest file.
    Fast,
    /// The encoder's balanced default.
    Default,
    /// Slowest encode, smallest file. (default)
    #[default]
    Best,
}
