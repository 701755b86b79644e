//! Codec adapter: raw bytes ⇄ decoded handles.
//!
//! Images and PDFs take entirely separate paths. An image decodes to a
//! [`DecodedImage`] (pixels, orientation already applied); a PDF decodes to a
//! [`DecodedPdf`] (the object graph, never rasterised). No handle type is
//! shared between the two, so an image engine cannot be handed a PDF by
//! mistake.
//!
//! ## Why apply orientation at decode time?
//!
//! Phone cameras store pixels in sensor order and record the rotation in an
//! EXIF tag. Most target formats either drop that tag or are read by viewers
//! that ignore it. Rotating the pixels once, right after decode, makes every
//! encoded output orientation-correct regardless of format.
//!
//! ## Why a closed options enum?
//!
//! Each format takes a different option shape. PNG is lossless and has no
//! quality scalar at all; [`EncodeOptions::Png`] therefore carries only an
//! effort level, so a caller cannot pass a meaningless quality.

use crate::config::PngEffort;
use crate::error::ForgeError;
use image::codecs::avif::AvifEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, Limits};
use serde::Serialize;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// PDF headers may be preceded by junk; readers accept them within this window.
const PDF_HEADER_WINDOW: usize = 1024;

// ── Source artifact ──────────────────────────────────────────────────────

/// Declared kind of an uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Pdf,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => f.write_str("image"),
            MediaKind::Pdf => f.write_str("pdf"),
        }
    }
}

/// Immutable uploaded bytes plus their media kind.
///
/// The buffer is reference-counted so it can move onto blocking worker
/// threads without copying.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    bytes: Arc<[u8]>,
    kind: MediaKind,
}

impl SourceArtifact {
    /// Wrap bytes with a kind the caller already knows.
    pub fn new(bytes: impl Into<Arc<[u8]>>, kind: MediaKind) -> Self {
        Self {
            bytes: bytes.into(),
            kind,
        }
    }

    /// Wrap bytes, detecting the kind from magic bytes.
    pub fn sniff(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ForgeError> {
        let bytes = bytes.into();
        let kind = sniff_kind(&bytes).ok_or_else(|| ForgeError::UnsupportedKind {
            expected: "image or pdf".into(),
            actual: describe_magic(&bytes),
        })?;
        Ok(Self { bytes, kind })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn expect_kind(&self, expected: MediaKind) -> Result<(), ForgeError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ForgeError::UnsupportedKind {
                expected: expected.to_string(),
                actual: self.kind.to_string(),
            })
        }
    }
}

/// Detect the media kind of `bytes`, or `None` if it is neither.
pub fn sniff_kind(bytes: &[u8]) -> Option<MediaKind> {
    let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        Some(MediaKind::Pdf)
    } else if image::guess_format(bytes).is_ok() {
        Some(MediaKind::Image)
    } else {
        None
    }
}

fn describe_magic(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "empty input".into();
    }
    let head: Vec<String> = bytes.iter().take(4).map(|b| format!("{b:02x}")).collect();
    format!("unknown data (first bytes: {})", head.join(" "))
}

// ── Decoded handles ──────────────────────────────────────────────────────

/// A decoded raster image with orientation normalised into the pixels.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    source_format: Option<ImageFormat>,
}

impl DecodedImage {
    pub fn new(image: DynamicImage, source_format: Option<ImageFormat>) -> Self {
        Self {
            image,
            source_format,
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn source_format(&self) -> Option<ImageFormat> {
        self.source_format
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A parsed PDF object graph.
#[derive(Debug, Clone)]
pub struct DecodedPdf {
    document: lopdf::Document,
}

impl DecodedPdf {
    pub fn document(&self) -> &lopdf::Document {
        &self.document
    }

    pub fn into_document(self) -> lopdf::Document {
        self.document
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn version(&self) -> &str {
        &self.document.version
    }
}

/// Parse a PDF artifact.
pub fn decode_pdf(artifact: &SourceArtifact) -> Result<DecodedPdf, ForgeError> {
    artifact.expect_kind(MediaKind::Pdf)?;
    let document =
        lopdf::Document::load_mem(artifact.bytes()).map_err(|e| ForgeError::corrupt("pdf", e))?;
    debug!(
        "Decoded PDF {}: {} pages",
        document.version,
        document.get_pages().len()
    );
    Ok(DecodedPdf { document })
}

// ── Encode options ───────────────────────────────────────────────────────

/// Per-format encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeOptions {
    /// `max_effort` enables optimized Huffman tables and progressive scans.
    Jpeg { quality: u8, max_effort: bool },
    Png { effort: PngEffort },
    Webp { quality: u8 },
    /// `speed` runs from 1 (slowest) to 10 (fastest).
    Avif { quality: u8, speed: u8 },
}

impl EncodeOptions {
    /// Short format name used in errors and logs.
    pub fn format_name(&self) -> &'static str {
        match self {
            EncodeOptions::Jpeg { .. } => "jpeg",
            EncodeOptions::Png { .. } => "png",
            EncodeOptions::Webp { .. } => "webp",
            EncodeOptions::Avif { .. } => "avif",
        }
    }
}

// ── Codec seam ───────────────────────────────────────────────────────────

/// Image decode/encode operations used by the compression and conversion engines.
pub trait ImageCodec: Send + Sync {
    /// Decode an image artifact, applying its orientation metadata.
    fn decode(&self, artifact: &SourceArtifact) -> Result<DecodedImage, ForgeError>;

    /// Encode a decoded image with format-specific options.
    fn encode(&self, image: &DecodedImage, options: &EncodeOptions) -> Result<Vec<u8>, ForgeError>;
}

/// The production codec: `image` for decoding, PNG and AVIF; `jpeg-encoder`
/// for JPEG; libwebp for lossy WebP.
///
/// Constructed once per [`crate::Processor`] and shared by reference.
#[derive(Debug, Clone)]
pub struct CodecAdapter {
    max_dimension: u32,
}

impl CodecAdapter {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl Default for CodecAdapter {
    fn default() -> Self {
        Self::new(16_384)
    }
}

impl ImageCodec for CodecAdapter {
    fn decode(&self, artifact: &SourceArtifact) -> Result<DecodedImage, ForgeError> {
        artifact.expect_kind(MediaKind::Image)?;

        let mut reader = ImageReader::new(Cursor::new(artifact.bytes()))
            .with_guessed_format()
            .map_err(|e| ForgeError::corrupt("image", e))?;
        let format = reader.format();

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        reader.limits(limits);

        let mut decoder = reader
            .into_decoder()
            .map_err(|e| ForgeError::corrupt("image", e))?;
        let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
        let mut image =
            DynamicImage::from_decoder(decoder).map_err(|e| ForgeError::corrupt("image", e))?;
        image.apply_orientation(orientation);

        debug!(
            "Decoded {:?} → {}x{} px (orientation {:?})",
            format,
            image.width(),
            image.height(),
            orientation
        );
        Ok(DecodedImage::new(image, format))
    }

    fn encode(&self, image: &DecodedImage, options: &EncodeOptions) -> Result<Vec<u8>, ForgeError> {
        let bytes = match *options {
            EncodeOptions::Jpeg {
                quality,
                max_effort,
            } => encode_jpeg(image.image(), quality, max_effort)?,
            EncodeOptions::Png { effort } => encode_png(image.image(), effort)?,
            EncodeOptions::Webp { quality } => encode_webp(image.image(), quality)?,
            EncodeOptions::Avif { quality, speed } => encode_avif(image.image(), quality, speed)?,
        };
        debug!("Encoded {:?} → {} bytes", options, bytes.len());
        Ok(bytes)
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8, max_effort: bool) -> Result<Vec<u8>, ForgeError> {
    // JPEG has no alpha channel; transparency is dropped.
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let (w, h) = match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(ForgeError::encode(
                "jpeg",
                format!("{width}x{height} exceeds the 65535 px JPEG limit"),
            ))
        }
    };

    let mut buf = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buf, quality.clamp(1, 100));
    if max_effort {
        encoder.set_optimized_huffman_tables(true);
        encoder.set_progressive(true);
    }
    encoder
        .encode(rgb.as_raw(), w, h, jpeg_encoder::ColorType::Rgb)
        .map_err(|e| ForgeError::encode("jpeg", e))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage, effort: PngEffort) -> Result<Vec<u8>, ForgeError> {
    let compression = match effort {
        PngEffort::Fast => CompressionType::Fast,
        PngEffort::Default => CompressionType::Default,
        PngEffort::Best => CompressionType::Best,
    };
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| ForgeError::encode("png", e))?;
    Ok(buf)
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ForgeError> {
    let (width, height) = (img.width(), img.height());
    let memory = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), width, height)
            .encode_simple(false, f32::from(quality))
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), width, height)
            .encode_simple(false, f32::from(quality))
    }
    .map_err(|e| ForgeError::encode("webp", format!("{e:?}")))?;
    Ok(memory.to_vec())
}

fn encode_avif(img: &DynamicImage, quality: u8, speed: u8) -> Result<Vec<u8>, ForgeError> {
    let normalised = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let mut buf = Vec::new();
    let encoder =
        AvifEncoder::new_with_speed_quality(&mut buf, speed.clamp(1, 10), quality.clamp(1, 100));
    normalised
        .write_with_encoder(encoder)
        .map_err(|e| ForgeError::encode("avif", e))?;
    Ok(buf)
}

// ── Probing ──────────────────────────────────────────────────────────────

/// Format and pixel size of an image, read without decoding the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProbe {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Read an image's format and dimensions from its header.
///
/// AVIF dimensions come from the container's `ispe` property, so no AV1
/// decoder is needed.
pub fn probe_image(artifact: &SourceArtifact) -> Result<ImageProbe, ForgeError> {
    artifact.expect_kind(MediaKind::Image)?;
    let bytes = artifact.bytes();
    let format = image::guess_format(bytes).map_err(|e| ForgeError::corrupt("image", e))?;

    let (width, height) = if format == ImageFormat::Avif {
        avif_dimensions(bytes)
            .ok_or_else(|| ForgeError::corrupt("avif", "missing ispe property"))?
    } else {
        ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .map_err(|e| ForgeError::corrupt("image", e))?
    };

    Ok(ImageProbe {
        format,
        width,
        height,
    })
}

/// Width and height from the first `ispe` (image spatial extents) box.
pub fn avif_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    let pos = bytes.windows(4).position(|w| w == b"ispe")?;
    // type(4) + version/flags(4), then width and height as big-endian u32.
    let body = bytes.get(pos + 8..pos + 16)?;
    let width = u32::from_be_bytes(body[0..4].try_into().ok()?);
    let height = u32::from_be_bytes(body[4..8].try_into().ok()?);
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7) as u8, (y * 5) as u8, 128])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn sniff_detects_pdf_and_image() {
        assert_eq!(sniff_kind(b"%PDF-1.7\n..."), Some(MediaKind::Pdf));
        assert_eq!(sniff_kind(&png_bytes(4, 4)), Some(MediaKind::Image));
        assert_eq!(sniff_kind(b"hello world"), None);
    }

    #[test]
    fn sniff_accepts_pdf_header_after_junk() {
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"%PDF-1.4\n");
        assert_eq!(sniff_kind(&bytes), Some(MediaKind::Pdf));
    }

    #[test]
    fn sniff_rejects_unknown_bytes() {
        let err = SourceArtifact::sniff(b"not a file".to_vec()).unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedKind { .. }));
        assert!(err.to_string().contains("6e 6f 74 20"), "got: {err}");
    }

    #[test]
    fn decode_rejects_pdf_kind() {
        let artifact = SourceArtifact::new(b"%PDF-1.4".to_vec(), MediaKind::Pdf);
        let err = CodecAdapter::default().decode(&artifact).unwrap_err();
        assert!(matches!(err, ForgeError::UnsupportedKind { .. }));
    }

    #[test]
    fn decode_truncated_image_is_corrupt() {
        let mut bytes = png_bytes(16, 16);
        bytes.truncate(40);
        let artifact = SourceArtifact::new(bytes, MediaKind::Image);
        let err = CodecAdapter::default().decode(&artifact).unwrap_err();
        assert!(matches!(err, ForgeError::CorruptInput { .. }), "got: {err}");
    }

    #[test]
    fn decode_respects_dimension_limit() {
        let artifact = SourceArtifact::new(png_bytes(64, 8), MediaKind::Image);
        let err = CodecAdapter::new(32).decode(&artifact).unwrap_err();
        assert!(matches!(err, ForgeError::CorruptInput { .. }));
    }

    #[test]
    fn png_options_have_no_quality() {
        let opts = EncodeOptions::Png {
            effort: PngEffort::Best,
        };
        assert_eq!(opts.format_name(), "png");
    }

    #[test]
    fn jpeg_drops_alpha_and_keeps_dimensions() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(20, 10, Rgba([10, 20, 30, 0])));
        let codec = CodecAdapter::default();
        let bytes = codec
            .encode(
                &DecodedImage::new(img, None),
                &EncodeOptions::Jpeg {
                    quality: 80,
                    max_effort: true,
                },
            )
            .unwrap();
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (20, 10));
    }

    #[test]
    fn avif_dimensions_reads_ispe() {
        let mut bytes = b"....ftypavif....".to_vec();
        bytes.extend_from_slice(&[0, 0, 0, 20]);
        bytes.extend_from_slice(b"ispe");
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(&640u32.to_be_bytes());
        bytes.extend_from_slice(&480u32.to_be_bytes());
        assert_eq!(avif_dimensions(&bytes), Some((640, 480)));
        assert_eq!(avif_dimensions(b"no box here"), None);
    }

    #[test]
    fn probe_reads_png_header() {
        let artifact = SourceArtifact::new(png_bytes(33, 21), MediaKind::Image);
        let probe = probe_image(&artifact).unwrap();
        assert_eq!(probe.format, ImageFormat::Png);
        assert_eq!((probe.width, probe.height), (33, 21));
    }
}
