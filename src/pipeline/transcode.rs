//! Format conversion: decoded image → target codec bytes + content type.
//!
//! The target format is parsed into [`TargetFormat`] before anything else
//! happens, so an unsupported request never pays for a decode. Once parsed,
//! [`TargetFormat::encode_options`] is the dispatch table: each format maps to
//! exactly one [`EncodeOptions`] shape and one content type.

use crate::config::{ProcessingConfig, DEFAULT_QUALITY};
use crate::error::ForgeError;
use crate::pipeline::codec::{EncodeOptions, ImageCodec, SourceArtifact};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Output formats supported by [`convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Jpg,
    Png,
    Webp,
    Avif,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 4] = [
        TargetFormat::Jpg,
        TargetFormat::Png,
        TargetFormat::Webp,
        TargetFormat::Avif,
    ];

    /// MIME type of the encoded output.
    pub fn content_type(self) -> &'static str {
        match self {
            TargetFormat::Jpg => "image/jpeg",
            TargetFormat::Png => "image/png",
            TargetFormat::Webp => "image/webp",
            TargetFormat::Avif => "image/avif",
        }
    }

    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Jpg => "jpg",
            TargetFormat::Png => "png",
            TargetFormat::Webp => "webp",
            TargetFormat::Avif => "avif",
        }
    }

    /// Encoder settings for this format. PNG ignores `quality`.
    pub fn encode_options(self, quality: u8, config: &ProcessingConfig) -> EncodeOptions {
        match self {
            TargetFormat::Jpg => EncodeOptions::Jpeg {
                quality,
                max_effort: config.jpeg_max_effort,
            },
            TargetFormat::Png => EncodeOptions::Png {
                effort: config.png_effort,
            },
            TargetFormat::Webp => EncodeOptions::Webp { quality },
            TargetFormat::Avif => EncodeOptions::Avif {
                quality,
                speed: config.avif_speed,
            },
        }
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TargetFormat {
    type Err = ForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(TargetFormat::Jpg),
            "png" => Ok(TargetFormat::Png),
            "webp" => Ok(TargetFormat::Webp),
            "avif" => Ok(TargetFormat::Avif),
            _ => Err(ForgeError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

/// Validated conversion parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversionRequest {
    pub target_format: TargetFormat,
    pub quality: u8,
}

impl ConversionRequest {
    /// Validate raw transport parameters. The format is checked first.
    pub fn parse(format: &str, quality: Option<i64>) -> Result<Self, ForgeError> {
        let target_format = format.parse::<TargetFormat>()?;
        let quality = match quality {
            None => DEFAULT_QUALITY,
            Some(q) if (1..=100).contains(&q) => q as u8,
            Some(q) => return Err(ForgeError::InvalidQuality { quality: q }),
        };
        Ok(Self {
            target_format,
            quality,
        })
    }
}

/// Encoded conversion output.
#[derive(Debug, Clone)]
pub struct Converted {
    pub bytes: Vec<u8>,
    pub format: TargetFormat,
}

/// Decode `artifact` and re-encode it as `request.target_format`.
///
/// Blocking; callers on an async runtime should run it on `spawn_blocking`.
pub fn convert(
    codec: &dyn ImageCodec,
    artifact: &SourceArtifact,
    request: &ConversionRequest,
    config: &ProcessingConfig,
) -> Result<Converted, ForgeError> {
    let decoded = codec.decode(artifact)?;
    let options = request.target_format.encode_options(request.quality, config);
    let bytes = codec.encode(&decoded, &options)?;

    info!(
        "Converted {}x{} image to {} (q={}): {} → {} bytes",
        decoded.width(),
        decoded.height(),
        request.target_format,
        request.quality,
        artifact.len(),
        bytes.len()
    );

    Ok(Converted {
        bytes,
        format: request.target_format,
    })
}
