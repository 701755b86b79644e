//! Output types returned by [`crate::Processor`].
//!
//! Single-file results ([`ProcessedFile`]) are fully materialised: an encoded
//! image or one PDF is small enough to hold in memory. A split result
//! ([`SplitOutput`]) holds the two serialised parts but defers building the
//! zip until the caller picks a sink or asks for a stream.

use crate::error::ForgeError;
use crate::pipeline::archive::{write_archive, ArchiveEntry};
use crate::pipeline::codec::MediaKind;
use crate::pipeline::compress::CompressionResult;
use crate::pipeline::partition::SplitPlan;
use crate::progress::ProgressCallback;
use crate::stream::{archive_stream, ArchiveStream};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// One encoded output file.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedFile {
    #[serde(skip)]
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub suggested_filename: String,
    pub size_bytes: usize,
}

impl ProcessedFile {
    pub fn new(
        bytes: Vec<u8>,
        content_type: &'static str,
        suggested_filename: impl Into<String>,
    ) -> Self {
        let size_bytes = bytes.len();
        Self {
            bytes,
            content_type,
            suggested_filename: suggested_filename.into(),
            size_bytes,
        }
    }

    /// Write the bytes to `path` atomically (temp file + rename).
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ForgeError> {
        write_atomic(path.as_ref(), &self.bytes).await
    }
}

impl CompressionResult {
    /// Compression output is always JPEG.
    pub fn into_file(self) -> ProcessedFile {
        ProcessedFile::new(self.bytes, "image/jpeg", "compressed.jpg")
    }
}

/// A validated, assembled split waiting to be archived.
pub struct SplitOutput {
    pub plan: SplitPlan,
    pub entries: Vec<ArchiveEntry>,
    pub suggested_filename: String,
    level: i64,
    progress: Option<ProgressCallback>,
}

impl fmt::Debug for SplitOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitOutput")
            .field("plan", &self.plan)
            .field(
                "entries",
                &self
                    .entries
                    .iter()
                    .map(|e| (&e.name, e.payload.len()))
                    .collect::<Vec<_>>(),
            )
            .field("suggested_filename", &self.suggested_filename)
            .field("level", &self.level)
            .finish()
    }
}

impl SplitOutput {
    pub const CONTENT_TYPE: &'static str = "application/zip";

    pub(crate) fn new(
        plan: SplitPlan,
        entries: Vec<ArchiveEntry>,
        level: i64,
        progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            plan,
            entries,
            suggested_filename: split_archive_name(),
            level,
            progress,
        }
    }

    /// `attachment; filename="…"` header value for HTTP transports.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.suggested_filename)
    }

    /// Write the archive to a blocking sink, returning the bytes written.
    pub fn write_to<W: Write>(&self, sink: W) -> Result<u64, ForgeError> {
        write_archive(&self.entries, sink, self.level, self.progress.as_ref())
    }

    /// Stream the archive as byte chunks. Must be called inside a tokio runtime.
    pub fn into_stream(self) -> ArchiveStream {
        archive_stream(self.entries, self.level, self.progress)
    }
}

/// `split_output_<unix-millis>.zip`
fn split_archive_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("split_output_{millis}.zip")
}

/// What [`crate::Processor::inspect`] reports about an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactInfo {
    pub kind: MediaKind,
    pub size_bytes: usize,
    /// Image container format, e.g. `"png"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_version: Option<String>,
}

/// Write `bytes` to `path` via a sibling temp file and a rename, so readers
/// never observe a partial file.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ForgeError> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();
    tokio::task::spawn_blocking(move || persist(&path, &bytes))
        .await
        .map_err(|e| ForgeError::Internal(format!("output write task failed: {e}")))?
}

fn persist(path: &Path, bytes: &[u8]) -> Result<(), ForgeError> {
    let fail = |source| ForgeError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent).map_err(fail)?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(fail)?;
    tmp.write_all(bytes).map_err(fail)?;
    tmp.persist(path).map_err(|e| fail(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::partition::{plan, SplitRequest};

    #[test]
    fn split_filename_shape() {
        let name = split_archive_name();
        let stamp = name
            .strip_prefix("split_output_")
            .and_then(|s| s.strip_suffix(".zip"))
            .unwrap();
        assert!(stamp.parse::<u128>().unwrap() > 0);
    }

    #[test]
    fn content_disposition_names_the_archive() {
        let plan = plan(4, &SplitRequest::parse("1").unwrap(), 500).unwrap();
        let out = SplitOutput::new(plan, Vec::new(), 1, None);
        let header = out.content_disposition();
        assert!(header.starts_with("attachment; filename=\"split_output_"));
        assert!(header.ends_with(".zip\""));
    }

    #[test]
    fn artifact_info_omits_absent_fields() {
        let info = ArtifactInfo {
            kind: MediaKind::Pdf,
            size_bytes: 1234,
            format: None,
            width: None,
            height: None,
            page_count: Some(10),
            pdf_version: Some("1.7".into()),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["kind"], "pdf");
        assert_eq!(json["page_count"], 10);
        assert!(json.get("width").is_none());
    }

    #[tokio::test]
    async fn save_writes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("image.png");
        let file = ProcessedFile::new(vec![1, 2, 3], "image/png", "image.png");
        file.save(&path).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        let siblings = std::fs::read_dir(dir.path().join("nested")).unwrap().count();
        assert_eq!(siblings, 1);
    }
}
