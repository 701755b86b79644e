//! Zip packaging of output documents, written incrementally.
//!
//! The archive goes through zip's non-seeking writer: every entry carries a
//! data descriptor, so the sink only ever sees forward writes and can be a
//! socket, a pipe or a channel. Nothing buffers the whole archive.

use crate::error::ForgeError;
use crate::progress::ProgressCallback;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deflate level used when none is configured: fast, still shrinks PDFs.
pub const DEFAULT_ARCHIVE_LEVEL: i64 = 1;

/// A named payload destined for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub payload: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// Write `entries` as a Deflate zip to `sink` and return the bytes written.
///
/// Entry order is preserved. A sink error surfaces as
/// [`ForgeError::StreamError`]; the partial archive is not repaired.
pub fn write_archive<W: Write>(
    entries: &[ArchiveEntry],
    sink: W,
    level: i64,
    progress: Option<&ProgressCallback>,
) -> Result<u64, ForgeError> {
    let counter = CountingWriter::new(sink);
    let written = counter.handle();

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(level));

    let mut zip = ZipWriter::new_stream(counter);
    for entry in entries {
        zip.start_file(entry.name.as_str(), options)
            .map_err(zip_to_stream_error)?;
        zip.write_all(&entry.payload)
            .map_err(|source| ForgeError::StreamError { source })?;
        debug!("Archived {} ({} bytes)", entry.name, entry.payload.len());
        if let Some(cb) = progress {
            cb.on_entry_written(&entry.name, entry.payload.len());
        }
    }

    let mut inner = zip.finish().map_err(zip_to_stream_error)?;
    inner
        .flush()
        .map_err(|source| ForgeError::StreamError { source })?;

    let total = written.load(Ordering::SeqCst);
    info!("Archive complete: {} entries, {} bytes", entries.len(), total);
    if let Some(cb) = progress {
        cb.on_archive_complete(total);
    }
    Ok(total)
}

fn zip_to_stream_error(err: zip::result::ZipError) -> ForgeError {
    let source = match err {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::other(other.to_string()),
    };
    ForgeError::StreamError { source }
}

/// Forwards writes and counts the bytes accepted by the inner writer.
///
/// After the first failed write or flush the inner writer is never touched
/// again: later writes are discarded. The zip writer finalizes itself on drop,
/// and that late central directory must not land on a sink that already
/// failed mid-archive.
struct CountingWriter<W> {
    inner: W,
    count: Arc<AtomicU64>,
    failed: bool,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            count: Arc::new(AtomicU64::new(0)),
            failed: false,
        }
    }

    fn handle(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.count)
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.failed {
            return Ok(buf.len());
        }
        match self.inner.write(buf) {
            Ok(n) => {
                self.count.fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.failed = true;
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.failed {
            return Ok(());
        }
        let result = self.inner.flush();
        if result.is_err() {
            self.failed = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn entries() -> Vec<ArchiveEntry> {
        vec![
            ArchiveEntry::new("Part1_Pages_1-3.pdf", b"%PDF-first".repeat(50)),
            ArchiveEntry::new("Part2_Pages_4-10.pdf", b"%PDF-second".repeat(50)),
        ]
    }

    #[test]
    fn archive_reads_back_in_order() {
        let mut buf = Vec::new();
        let written = write_archive(&entries(), &mut buf, DEFAULT_ARCHIVE_LEVEL, None).unwrap();
        assert_eq!(written as usize, buf.len());

        let mut zip = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
        assert_eq!(zip.len(), 2);
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(names.contains(&"Part1_Pages_1-3.pdf".to_string()));
        assert_eq!(zip.by_index(0).unwrap().name(), "Part1_Pages_1-3.pdf");

        let mut second = zip.by_name("Part2_Pages_4-10.pdf").unwrap();
        assert_eq!(second.compression(), CompressionMethod::Deflated);
        let mut payload = Vec::new();
        second.read_to_end(&mut payload).unwrap();
        assert_eq!(payload, b"%PDF-second".repeat(50));
    }

    #[test]
    fn empty_archive_is_valid() {
        let mut buf = Vec::new();
        write_archive(&[], &mut buf, DEFAULT_ARCHIVE_LEVEL, None).unwrap();
        let zip = zip::ZipArchive::new(Cursor::new(buf)).unwrap();
        assert_eq!(zip.len(), 0);
    }

    /// Accepts `budget` bytes, then fails every write and counts the retries.
    #[derive(Clone)]
    struct FailingSink {
        budget: usize,
        accepted: Arc<AtomicU64>,
        writes_after_failure: Arc<AtomicU64>,
        failed: bool,
    }

    impl FailingSink {
        fn new(budget: usize) -> Self {
            Self {
                budget,
                accepted: Arc::new(AtomicU64::new(0)),
                writes_after_failure: Arc::new(AtomicU64::new(0)),
                failed: false,
            }
        }
    }

    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failed {
                self.writes_after_failure.fetch_add(1, Ordering::SeqCst);
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
            }
            let accepted = self.accepted.load(Ordering::SeqCst) as usize;
            if accepted + buf.len() > self.budget {
                self.failed = true;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer went away"));
            }
            self.accepted.fetch_add(buf.len() as u64, Ordering::SeqCst);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn sink_failure_is_stream_error() {
        let err = write_archive(&entries(), FailingSink::new(0), DEFAULT_ARCHIVE_LEVEL, None)
            .unwrap_err();
        assert!(matches!(err, ForgeError::StreamError { .. }), "got: {err}");
        assert!(!err.is_pre_stream());
    }

    #[test]
    fn failed_sink_is_not_written_again() {
        let sink = FailingSink::new(16);
        let observer = sink.clone();

        let err = write_archive(&entries(), sink, DEFAULT_ARCHIVE_LEVEL, None).unwrap_err();
        match err {
            ForgeError::StreamError { source } => {
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe)
            }
            other => panic!("expected StreamError, got {other}"),
        }

        assert_eq!(observer.writes_after_failure.load(Ordering::SeqCst), 0);
        assert!(observer.accepted.load(Ordering::SeqCst) <= 16);
    }

    #[test]
    fn counting_writer_discards_after_failure() {
        let sink = FailingSink::new(4);
        let observer = sink.clone();
        let mut writer = CountingWriter::new(sink);
        let count = writer.handle();

        writer.write_all(b"abcd").unwrap();
        assert!(writer.write_all(b"efgh").is_err());
        writer.write_all(b"central directory").unwrap();
        writer.flush().unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(observer.writes_after_failure.load(Ordering::SeqCst), 0);
    }
}
