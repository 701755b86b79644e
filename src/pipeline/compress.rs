//! Size-bounded JPEG compression.
//!
//! Walks a descending quality ladder (90, 85, …, 60 by default) and stops at
//! the first quality whose encoded size fits the target, or at the floor.
//!
//! ## Why re-encode from the same decode?
//!
//! Every attempt encodes the *original* decoded pixels. Feeding one JPEG
//! attempt into the next would stack generation loss on top of the quality
//! change, and the size/quality relationship would stop being predictable.
//!
//! ## Why not fail when the target is unreachable?
//!
//! The target is advisory. When even the floor quality is too large the
//! floor result is still the smallest acceptable output, so it is returned
//! with [`CompressionResult::target_met`] set to `false` instead of an error.

use crate::config::{CompressionLadder, DEFAULT_TARGET_SIZE_KB};
use crate::error::ForgeError;
use crate::pipeline::codec::{DecodedImage, EncodeOptions, ImageCodec, SourceArtifact};
use crate::progress::ProgressCallback;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Validated compression parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressionRequest {
    pub target_size_kb: u64,
}

impl Default for CompressionRequest {
    fn default() -> Self {
        Self {
            target_size_kb: DEFAULT_TARGET_SIZE_KB,
        }
    }
}

impl CompressionRequest {
    /// Validate a raw target. `None` falls back to `default_kb`.
    pub fn parse(target_size_kb: Option<i64>, default_kb: u64) -> Result<Self, ForgeError> {
        match target_size_kb {
            None => Ok(Self {
                target_size_kb: default_kb,
            }),
            Some(v) if v > 0 => Ok(Self {
                target_size_kb: v as u64,
            }),
            Some(v) => Err(ForgeError::InvalidTargetSize { value: v }),
        }
    }

    pub fn target_bytes(&self) -> u64 {
        self.target_size_kb.saturating_mul(1024)
    }
}

/// One encode of the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompressionAttempt {
    pub quality: u8,
    pub size_bytes: usize,
}

/// Outcome of the compression search.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionResult {
    /// JPEG bytes of the last attempt.
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub final_quality: u8,
    pub size_bytes: usize,
    pub target_size_kb: u64,
    /// `false` when the floor quality still exceeded the target.
    pub target_met: bool,
    pub attempts: Vec<CompressionAttempt>,
}

/// Decode `artifact` once and run the quality search on it.
///
/// Blocking; callers on an async runtime should run it on `spawn_blocking`.
pub fn compress(
    codec: &dyn ImageCodec,
    artifact: &SourceArtifact,
    request: &CompressionRequest,
    ladder: &CompressionLadder,
    progress: Option<&ProgressCallback>,
) -> Result<CompressionResult, ForgeError> {
    let decoded = codec.decode(artifact)?;
    let result = search(codec, &decoded, request, ladder, progress)?;

    info!(
        "Compressed {} → {} bytes at q={} after {} attempt(s)",
        artifact.len(),
        result.size_bytes,
        result.final_quality,
        result.attempts.len()
    );
    Ok(result)
}

/// Walk the ladder over an already decoded image.
///
/// Stops at the first attempt with `size ≤ target` or at `ladder.floor`.
/// An encode failure aborts the search immediately.
pub fn search(
    codec: &dyn ImageCodec,
    decoded: &DecodedImage,
    request: &CompressionRequest,
    ladder: &CompressionLadder,
    progress: Option<&ProgressCallback>,
) -> Result<CompressionResult, ForgeError> {
    let target = request.target_bytes();
    let mut attempts = Vec::new();
    let mut quality = ladder.start;

    loop {
        let bytes = codec.encode(
            decoded,
            &EncodeOptions::Jpeg {
                quality,
                max_effort: true,
            },
        )?;
        let size = bytes.len();
        attempts.push(CompressionAttempt {
            quality,
            size_bytes: size,
        });
        debug!("Compression attempt q={} → {} bytes (target {})", quality, size, target);
        if let Some(cb) = progress {
            cb.on_compression_attempt(attempts.len(), quality, size);
        }

        let target_met = size as u64 <= target;
        match ladder.next(quality) {
            Some(next) if !target_met => quality = next,
            _ => {
                if !target_met {
                    warn!(
                        "Target {} KB not reachable; returning floor quality {} at {} bytes",
                        request.target_size_kb, quality, size
                    );
                }
                if let Some(cb) = progress {
                    cb.on_compression_complete(quality, size, target_met);
                }
                return Ok(CompressionResult {
                    bytes,
                    final_quality: quality,
                    size_bytes: size,
                    target_size_kb: request.target_size_kb,
                    target_met,
                    attempts,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::codec::CodecAdapter;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Mutex;

    /// Fake codec whose JPEG size is a fixed function of quality.
    struct SizeTableCodec {
        size_for: fn(u8) -> usize,
        seen: Mutex<Vec<u8>>,
    }

    impl SizeTableCodec {
        fn new(size_for: fn(u8) -> usize) -> Self {
            Self {
                size_for,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl ImageCodec for SizeTableCodec {
        fn decode(&self, _artifact: &SourceArtifact) -> Result<DecodedImage, ForgeError> {
            Ok(DecodedImage::new(
                DynamicImage::ImageRgb8(RgbImage::new(1, 1)),
                None,
            ))
        }

        fn encode(
            &self,
            _image: &DecodedImage,
            options: &EncodeOptions,
        ) -> Result<Vec<u8>, ForgeError> {
            match *options {
                EncodeOptions::Jpeg {
                    quality,
                    max_effort,
                } => {
                    assert!(max_effort, "compression must use max effort");
                    self.seen.lock().unwrap().push(quality);
                    Ok(vec![0u8; (self.size_for)(quality)])
                }
                other => panic!("unexpected options {other:?}"),
            }
        }
    }

    struct FailingCodec;

    impl ImageCodec for FailingCodec {
        fn decode(&self, _artifact: &SourceArtifact) -> Result<DecodedImage, ForgeError> {
            Ok(DecodedImage::new(
                DynamicImage::ImageRgb8(RgbImage::new(1, 1)),
                None,
            ))
        }

        fn encode(&self, _: &DecodedImage, _: &EncodeOptions) -> Result<Vec<u8>, ForgeError> {
            Err(ForgeError::encode("jpeg", "boom"))
        }
    }

    fn run(codec: &dyn ImageCodec, target_kb: u64) -> CompressionResult {
        let decoded = codec
            .decode(&SourceArtifact::new(vec![0u8], crate::MediaKind::Image))
            .unwrap();
        search(
            codec,
            &decoded,
            &CompressionRequest {
                target_size_kb: target_kb,
            },
            &CompressionLadder::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn stops_at_first_quality_under_target() {
        // 90 → 900 KB, 85 → 850 KB, ... linear in quality.
        let codec = SizeTableCodec::new(|q| q as usize * 10 * 1024);
        let result = run(&codec, 760);
        assert_eq!(result.final_quality, 75);
        assert!(result.target_met);
        assert_eq!(*codec.seen.lock().unwrap(), vec![90, 85, 80, 75]);
    }

    #[test]
    fn first_attempt_can_succeed() {
        let codec = SizeTableCodec::new(|_| 1024);
        let result = run(&codec, 500);
        assert_eq!(result.final_quality, 90);
        assert_eq!(result.attempts.len(), 1);
    }

    #[test]
    fn size_equal_to_target_counts_as_met() {
        let codec = SizeTableCodec::new(|q| if q <= 80 { 200 * 1024 } else { 300 * 1024 });
        let result = run(&codec, 200);
        assert_eq!(result.final_quality, 80);
        assert!(result.target_met);
    }

    #[test]
    fn unreachable_target_returns_floor() {
        let codec = SizeTableCodec::new(|_| 10 * 1024 * 1024);
        let result = run(&codec, 1);
        assert_eq!(result.final_quality, 60);
        assert!(!result.target_met);
        assert_eq!(result.attempts.len(), 7);
        assert_eq!(result.size_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn terminates_within_seven_attempts_for_any_target() {
        let codec = SizeTableCodec::new(|q| (q as usize).pow(3) * 3);
        for target in [1, 10, 100, 500, 1000, 5000, u64::MAX / 2048] {
            let result = run(&codec, target);
            assert!(result.attempts.len() <= 7);
            assert!([60, 65, 70, 75, 80, 85, 90].contains(&result.final_quality));
            assert!(result.target_met || result.final_quality == 60);
        }
    }

    #[test]
    fn encode_failure_aborts() {
        let decoded = DecodedImage::new(DynamicImage::ImageRgb8(RgbImage::new(1, 1)), None);
        let err = search(
            &FailingCodec,
            &decoded,
            &CompressionRequest::default(),
            &CompressionLadder::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ForgeError::EncodeError { .. }));
    }

    #[test]
    fn request_parse_validates_target() {
        assert_eq!(CompressionRequest::parse(None, 500).unwrap().target_size_kb, 500);
        assert_eq!(CompressionRequest::parse(Some(200), 500).unwrap().target_size_kb, 200);
        assert!(matches!(
            CompressionRequest::parse(Some(0), 500),
            Err(ForgeError::InvalidTargetSize { value: 0 })
        ));
        assert!(CompressionRequest::parse(Some(-4), 500).is_err());
    }

    #[test]
    fn real_codec_size_is_non_increasing_with_quality() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(96, 96, |x, y| {
            let v = (x * 31 + y * 17) ^ (x * y);
            Rgb([(v % 251) as u8, (v % 241) as u8, (v % 239) as u8])
        }));
        let decoded = DecodedImage::new(img, None);
        let codec = CodecAdapter::default();
        let sizes: Vec<usize> = CompressionLadder::default()
            .qualities()
            .into_iter()
            .map(|quality| {
                codec
                    .encode(
                        &decoded,
                        &EncodeOptions::Jpeg {
                            quality,
                            max_effort: true,
                        },
                    )
                    .unwrap()
                    .len()
            })
            .collect();
        for pair in sizes.windows(2) {
            assert!(pair[1] <= pair[0], "sizes not monotonic: {sizes:?}");
        }
    }
}
