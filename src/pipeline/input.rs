//! Input resolution: turn a user-supplied path or URL into a [`SourceArtifact`].
//!
//! ## Why enforce ceilings here and not in the engines?
//!
//! The engines operate on bytes that are already in memory; by then the cost
//! of an oversized upload has been paid. The resolver sees the size first
//! (file metadata, or a running byte count while downloading) and can refuse
//! before buffering. Images and PDFs get separate ceilings because a
//! reasonable PDF is routinely larger than a reasonable photo.

use crate::config::ProcessingConfig;
use crate::error::ForgeError;
use crate::pipeline::codec::{MediaKind, SourceArtifact};
use futures::StreamExt;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Where an artifact came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputOrigin {
    Local(PathBuf),
    Url(String),
}

impl fmt::Display for InputOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputOrigin::Local(p) => write!(f, "{}", p.display()),
            InputOrigin::Url(u) => f.write_str(u),
        }
    }
}

/// A loaded, kind-checked, size-checked input.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub artifact: SourceArtifact,
    pub origin: InputOrigin,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` to bytes, detect its kind and enforce the upload ceilings.
pub async fn resolve_input(
    input: &str,
    config: &ProcessingConfig,
) -> Result<ResolvedInput, ForgeError> {
    let (bytes, origin) = if is_url(input) {
        (
            download_url(input, config).await?,
            InputOrigin::Url(input.to_string()),
        )
    } else {
        let path = PathBuf::from(input);
        (read_local(&path, config).await?, InputOrigin::Local(path))
    };

    let artifact = SourceArtifact::sniff(bytes)?;
    enforce_ceiling(&artifact, config)?;
    debug!(
        "Resolved {} as {} ({} bytes)",
        origin,
        artifact.kind(),
        artifact.len()
    );
    Ok(ResolvedInput { artifact, origin })
}

/// Reject an artifact larger than the ceiling for its kind.
pub fn enforce_ceiling(
    artifact: &SourceArtifact,
    config: &ProcessingConfig,
) -> Result<(), ForgeError> {
    let max = ceiling_for(artifact.kind(), config);
    let size = artifact.len() as u64;
    if size > max {
        return Err(ForgeError::FileTooLarge {
            kind: artifact.kind().to_string(),
            size,
            max,
        });
    }
    Ok(())
}

fn ceiling_for(kind: MediaKind, config: &ProcessingConfig) -> u64 {
    match kind {
        MediaKind::Image => config.max_file_size,
        MediaKind::Pdf => config.max_pdf_size,
    }
}

/// The kind is unknown until the bytes are read, so the larger ceiling
/// bounds the read itself.
fn read_limit(config: &ProcessingConfig) -> u64 {
    config.max_file_size.max(config.max_pdf_size)
}

async fn read_local(path: &PathBuf, config: &ProcessingConfig) -> Result<Vec<u8>, ForgeError> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| io_to_input_error(path, e))?;
    if !metadata.is_file() {
        return Err(ForgeError::InvalidInput {
            reason: format!("'{}' is not a regular file", path.display()),
        });
    }
    let limit = read_limit(config);
    if metadata.len() > limit {
        return Err(ForgeError::FileTooLarge {
            kind: "input".into(),
            size: metadata.len(),
            max: limit,
        });
    }
    tokio::fs::read(path).await.map_err(|e| io_to_input_error(path, e))
}

fn io_to_input_error(path: &PathBuf, e: std::io::Error) -> ForgeError {
    match e.kind() {
        std::io::ErrorKind::PermissionDenied => ForgeError::PermissionDenied { path: path.clone() },
        std::io::ErrorKind::NotFound => ForgeError::FileNotFound { path: path.clone() },
        _ => ForgeError::InvalidInput {
            reason: format!("cannot read '{}': {e}", path.display()),
        },
    }
}

/// Download a URL into memory, stopping as soon as the read limit is passed.
async fn download_url(url: &str, config: &ProcessingConfig) -> Result<Vec<u8>, ForgeError> {
    info!("Downloading input from: {}", url);
    let timeout_secs = config.download_timeout_secs;
    let limit = read_limit(config);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ForgeError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            ForgeError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ForgeError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;
    if !response.status().is_success() {
        return Err(ForgeError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        if len > limit {
            return Err(ForgeError::FileTooLarge {
                kind: "download".into(),
                size: len,
                max: limit,
            });
        }
    }

    let mut body = Vec::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(map_err)?;
        body.extend_from_slice(&chunk);
        if body.len() as u64 > limit {
            return Err(ForgeError::FileTooLarge {
                kind: "download".into(),
                size: body.len() as u64,
                max: limit,
            });
        }
    }

    info!("Downloaded {} bytes", body.len());
    Ok(body)
}
