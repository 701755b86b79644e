//! Streaming archive API: emit zip bytes as they are produced.
//!
//! ## Why stream?
//!
//! A split can produce two documents of tens of megabytes each. Streaming
//! the archive lets a transport start sending before the zip is finished and
//! keeps peak memory at a few chunks instead of the whole archive.
//!
//! The zip writer is synchronous, so it runs on a blocking thread and hands
//! fixed-size chunks to the async side through a bounded channel. When the
//! consumer drops the [`ArchiveStream`] the next send fails, the writer sees
//! `BrokenPipe`, stops, and the abandonment is logged. Nothing else is sent.

use crate::error::ForgeError;
use crate::pipeline::archive::{write_archive, ArchiveEntry};
use crate::progress::ProgressCallback;
use std::io::{self, Write};
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, warn};

/// A boxed stream of archive byte chunks.
pub type ArchiveStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ForgeError>> + Send>>;

/// Bytes accumulated before a chunk is handed to the consumer.
pub const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Chunks in flight between the writer thread and the consumer.
const CHANNEL_DEPTH: usize = 8;

/// Stream `entries` as a zip archive.
///
/// Must be called from within a tokio runtime. The returned stream yields
/// byte chunks in order; a late failure is yielded as the final item.
pub fn archive_stream(
    entries: Vec<ArchiveEntry>,
    level: i64,
    progress: Option<ProgressCallback>,
) -> ArchiveStream {
    spawn_archive_writer(entries, level, progress).0
}

/// Like [`archive_stream`], also returning the writer task.
pub(crate) fn spawn_archive_writer(
    entries: Vec<ArchiveEntry>,
    level: i64,
    progress: Option<ProgressCallback>,
) -> (ArchiveStream, JoinHandle<Result<u64, ForgeError>>) {
    let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
    let err_tx = tx.clone();

    let handle = tokio::task::spawn_blocking(move || {
        let writer = ChannelWriter::new(tx);
        let result = write_archive(&entries, writer, level, progress.as_ref());
        match &result {
            Ok(bytes) => debug!("Archive stream finished: {} bytes", bytes),
            Err(e) if err_tx.is_closed() => {
                warn!("Archive consumer went away, writer stopped: {}", e);
            }
            Err(e) => {
                error!("Archive stream failed: {}", e);
                let late = ForgeError::StreamError {
                    source: io::Error::other(e.to_string()),
                };
                let _ = err_tx.blocking_send(Err(late));
            }
        }
        result
    });

    (Box::pin(ReceiverStream::new(rx)), handle)
}

/// A blocking `Write` that forwards chunks into an mpsc channel.
struct ChannelWriter {
    tx: mpsc::Sender<Result<Vec<u8>, ForgeError>>,
    buffer: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<Result<Vec<u8>, ForgeError>>) -> Self {
        Self {
            tx,
            buffer: Vec::with_capacity(STREAM_CHUNK_SIZE),
        }
    }

    fn send_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buffer, Vec::with_capacity(STREAM_CHUNK_SIZE));
        self.tx
            .blocking_send(Ok(chunk))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive consumer dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.tx.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "archive consumer dropped",
            ));
        }
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= STREAM_CHUNK_SIZE {
            self.send_buffer()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffer()
    }
}
