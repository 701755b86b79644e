//! CLI binary for docforge.
//!
//! A thin shim over the library crate that maps subcommands and flags to
//! `ProcessingConfig` and `Processor` calls, then writes the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docforge::{
    resolve_input, ArtifactInfo, ProcessedFile, ProcessingConfig, ProcessingProgressCallback,
    Processor, ProgressCallback, SourceArtifact, SplitOutput, MAX_PAGES,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn human_bytes(n: u64) -> String {
    match n {
        n if n >= 1024 * 1024 => format!("{:.1} MB", n as f64 / (1024.0 * 1024.0)),
        n if n >= 1024 => format!("{:.1} KB", n as f64 / 1024.0),
        n => format!("{n} B"),
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner anchored at the bottom of the
/// terminal plus one log line per compression attempt, assembled part and
/// archive entry.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Working");
        bar.set_message("reading input…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProcessingProgressCallback for CliProgressCallback {
    fn on_compression_attempt(&self, attempt: usize, quality: u8, size_bytes: usize) {
        self.bar.set_prefix("Compressing");
        self.bar.set_message(format!("quality {quality}"));
        self.bar.println(format!(
            "  {} attempt {:>2}  q={:<3} {}",
            dim("·"),
            attempt,
            quality,
            dim(&human_bytes(size_bytes as u64)),
        ));
    }

    fn on_compression_complete(&self, final_quality: u8, size_bytes: usize, target_met: bool) {
        let mark = if target_met { green("✓") } else { cyan("⚠") };
        self.bar.println(format!(
            "  {} settled on q={} at {}{}",
            mark,
            final_quality,
            bold(&human_bytes(size_bytes as u64)),
            if target_met {
                String::new()
            } else {
                dim("  (target not reachable, floor quality used)")
            }
        ));
    }

    fn on_split_start(&self, total_pages: usize, split_at: usize) {
        self.bar.set_prefix("Splitting");
        self.bar.set_message(format!("{total_pages} pages at page {split_at}"));
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Splitting {total_pages} pages after page {split_at}…"))
        ));
    }

    fn on_part_assembled(&self, part: usize, page_count: usize, size_bytes: usize) {
        self.bar.println(format!(
            "  {} Part {}  {:>4} pages  {}",
            green("✓"),
            part,
            page_count,
            dim(&human_bytes(size_bytes as u64)),
        ));
    }

    fn on_entry_written(&self, name: &str, size_bytes: usize) {
        self.bar.set_prefix("Archiving");
        self.bar.set_message(name.to_string());
        self.bar.println(format!(
            "  {} {}  {}",
            dim("+"),
            name,
            dim(&human_bytes(size_bytes as u64))
        ));
    }

    fn on_archive_complete(&self, bytes_written: u64) {
        self.bar.set_message(format!("{} written", human_bytes(bytes_written)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a photo to WebP at quality 80
  docforge convert photo.jpg --format webp --quality 80 -o photo.webp

  # Squeeze an image under 200 KB
  docforge compress scan.png --target-size 200 -o scan.jpg

  # Split a PDF after page 3 into a zip of two documents
  docforge split report.pdf --at 3 -o parts.zip

  # Stream the archive to stdout
  docforge split https://example.com/report.pdf --at 10 -o - > parts.zip

  # Merge PDFs in order
  docforge merge a.pdf b.pdf c.pdf -o all.pdf

  # One page per image at 300 DPI
  docforge images-to-pdf page1.jpg page2.png -o scans.pdf

  # Metadata only
  docforge inspect report.pdf --json

OUTPUT:
  Without -o the result is written to its suggested name in the current
  directory (image.webp, compressed.jpg, split_output_<ts>.zip, merged.pdf,
  converted.pdf). Use -o - to write to stdout.

ENVIRONMENT VARIABLES:
  DOCFORGE_OUTPUT            Default for -o/--output
  DOCFORGE_MAX_PAGES         Page ceiling for split and merge
  DOCFORGE_DOWNLOAD_TIMEOUT  HTTP download timeout in seconds
  RUST_LOG                   Override the log filter (e.g. docforge=debug)
"#;

/// Convert, compress, split and merge images and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "docforge",
    version,
    about = "Convert, compress, split and merge images and PDFs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Write the result here ("-" for stdout) instead of its suggested name.
    #[arg(short, long, global = true, env = "DOCFORGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCFORGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCFORGE_QUIET")]
    quiet: bool,

    /// Disable progress output.
    #[arg(long, global = true, env = "DOCFORGE_NO_PROGRESS")]
    no_progress: bool,

    /// Maximum pages accepted by split and merge.
    #[arg(long, global = true, env = "DOCFORGE_MAX_PAGES", default_value_t = MAX_PAGES)]
    max_pages: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "DOCFORGE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-encode an image as jpg, png, webp or avif.
    Convert {
        /// Local image path or HTTP/HTTPS URL.
        input: String,
        /// Target format: jpg, png, webp, avif.
        #[arg(short, long, env = "DOCFORGE_FORMAT")]
        format: String,
        /// Quality 1–100 (ignored for png). Default: 85.
        #[arg(long, env = "DOCFORGE_QUALITY", allow_negative_numbers = true)]
        quality: Option<i64>,
    },
    /// Re-encode an image as JPEG under a target size.
    Compress {
        /// Local image path or HTTP/HTTPS URL.
        input: String,
        /// Target size in KB. Default: 500.
        #[arg(long, env = "DOCFORGE_TARGET_SIZE", allow_negative_numbers = true)]
        target_size: Option<i64>,
    },
    /// Split a PDF after a page into a zip of two documents.
    Split {
        /// Local PDF path or HTTP/HTTPS URL.
        input: String,
        /// Last page (1-based) of the first part.
        #[arg(long = "at", env = "DOCFORGE_SPLIT_AT")]
        split_at: String,
    },
    /// Concatenate PDFs in the order given.
    Merge {
        /// Two or more PDF paths or URLs.
        #[arg(required = true, num_args = 2..)]
        inputs: Vec<String>,
    },
    /// Build a PDF with one page per image.
    ImagesToPdf {
        /// One or more image paths or URLs.
        #[arg(required = true)]
        inputs: Vec<String>,
    },
    /// Print kind, size and format details.
    Inspect {
        /// Local path or HTTP/HTTPS URL.
        input: String,
        /// Output JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let json = matches!(cli.command, Command::Inspect { json: true, .. });
    let show_progress = !cli.quiet && !cli.no_progress && !json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress = if show_progress {
        Some(CliProgressCallback::new())
    } else {
        None
    };

    let mut builder = ProcessingConfig::builder()
        .max_pages(cli.max_pages)
        .download_timeout_secs(cli.download_timeout);
    if let Some(cb) = &progress {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let config = builder.build().context("Invalid configuration")?;
    let processor = Processor::new(config);

    let start = Instant::now();
    let result = run(&cli, &processor).await;
    if let Some(cb) = &progress {
        cb.finish();
    }
    let written = match result {
        Ok(w) => w,
        Err(e) => {
            if !cli.quiet {
                eprintln!("{} {}", red("✘"), bold(&format!("{e:#}")));
            }
            return Err(e);
        }
    };

    if !cli.quiet {
        if let Some((bytes, target)) = written {
            eprintln!(
                "{}  {}  {}ms  →  {}",
                green("✔"),
                human_bytes(bytes),
                start.elapsed().as_millis(),
                bold(&target),
            );
        }
    }
    Ok(())
}

/// Execute the subcommand. Returns `(bytes, destination)` for written outputs.
async fn run(cli: &Cli, processor: &Processor) -> Result<Option<(u64, String)>> {
    match &cli.command {
        Command::Convert {
            input,
            format,
            quality,
        } => {
            let artifact = load(input, processor).await?;
            let file = processor
                .convert(artifact, format, *quality)
                .await
                .context("Conversion failed")?;
            emit_file(&file, cli.output.as_deref()).await.map(Some)
        }
        Command::Compress { input, target_size } => {
            let artifact = load(input, processor).await?;
            let result = processor
                .compress(artifact, *target_size)
                .await
                .context("Compression failed")?;
            if !result.target_met && !cli.quiet {
                eprintln!(
                    "{} target {} KB not reached; best is {} at q={}",
                    cyan("⚠"),
                    result.target_size_kb,
                    human_bytes(result.size_bytes as u64),
                    result.final_quality
                );
            }
            emit_file(&result.into_file(), cli.output.as_deref())
                .await
                .map(Some)
        }
        Command::Split { input, split_at } => {
            let artifact = load(input, processor).await?;
            let split = processor
                .split(artifact, split_at)
                .await
                .context("Split failed")?;
            emit_archive(split, cli.output.as_deref()).await.map(Some)
        }
        Command::Merge { inputs } => {
            let artifacts = load_all(inputs, processor).await?;
            let file = processor.merge(artifacts).await.context("Merge failed")?;
            emit_file(&file, cli.output.as_deref()).await.map(Some)
        }
        Command::ImagesToPdf { inputs } => {
            let artifacts = load_all(inputs, processor).await?;
            let file = processor
                .images_to_pdf(artifacts)
                .await
                .context("Images to PDF failed")?;
            emit_file(&file, cli.output.as_deref()).await.map(Some)
        }
        Command::Inspect { input, json } => {
            let artifact = load(input, processor).await?;
            let info = processor
                .inspect(artifact)
                .await
                .context("Failed to inspect input")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("Failed to serialize info")?
                );
            } else {
                print_info(input, &info);
            }
            Ok(None)
        }
    }
}

async fn load(input: &str, processor: &Processor) -> Result<SourceArtifact> {
    let resolved = resolve_input(input, processor.config())
        .await
        .with_context(|| format!("Failed to read {input}"))?;
    Ok(resolved.artifact)
}

async fn load_all(inputs: &[String], processor: &Processor) -> Result<Vec<SourceArtifact>> {
    let mut artifacts = Vec::with_capacity(inputs.len());
    for input in inputs {
        artifacts.push(load(input, processor).await?);
    }
    Ok(artifacts)
}

fn is_stdout(path: Option<&Path>) -> bool {
    path.is_some_and(|p| p.as_os_str() == "-")
}

async fn emit_file(file: &ProcessedFile, output: Option<&Path>) -> Result<(u64, String)> {
    if is_stdout(output) {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(&file.bytes)
            .await
            .context("Failed to write to stdout")?;
        stdout.flush().await.context("Failed to write to stdout")?;
        return Ok((file.bytes.len() as u64, "stdout".into()));
    }

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&file.suggested_filename));
    file.save(&path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok((file.bytes.len() as u64, path.display().to_string()))
}

/// Stream the zip chunk by chunk; a file target is written to a sibling temp
/// file and persisted only once the archive is complete.
async fn emit_archive(split: SplitOutput, output: Option<&Path>) -> Result<(u64, String)> {
    let mut written = 0u64;

    if is_stdout(output) {
        let mut stdout = tokio::io::stdout();
        let mut chunks = split.into_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.context("Archive stream failed")?;
            stdout
                .write_all(&chunk)
                .await
                .context("Failed to write to stdout")?;
            written += chunk.len() as u64;
        }
        stdout.flush().await.context("Failed to write to stdout")?;
        return Ok((written, "stdout".into()));
    }

    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&split.suggested_filename));
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };

    // The temp file is removed on drop unless persisted, so every early
    // return below leaves nothing behind.
    let tmp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create a temp file in {}", dir.display()))?;
    let mut file = tokio::fs::File::from_std(
        tmp.reopen()
            .with_context(|| format!("Failed to open {}", tmp.path().display()))?,
    );

    let mut chunks = split.into_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.context("Archive stream failed")?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    drop(file);

    tmp.persist(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok((written, path.display().to_string()))
}

fn print_info(input: &str, info: &ArtifactInfo) {
    println!("File:         {input}");
    println!("Kind:         {}", info.kind);
    println!("Size:         {}", human_bytes(info.size_bytes as u64));
    if let Some(ref format) = info.format {
        println!("Format:       {format}");
    }
    if let (Some(w), Some(h)) = (info.width, info.height) {
        println!("Dimensions:   {w} × {h} px");
    }
    if let Some(pages) = info.page_count {
        println!("Pages:        {pages}");
    }
    if let Some(ref version) = info.pdf_version {
        println!("PDF Version:  {version}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_split() {
        let cli = Cli::try_parse_from(["docforge", "split", "doc.pdf", "--at", "3", "-o", "-"])
            .unwrap();
        assert!(is_stdout(cli.output.as_deref()));
        match cli.command {
            Command::Split { input, split_at } => {
                assert_eq!(input, "doc.pdf");
                assert_eq!(split_at, "3");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn merge_requires_two_inputs() {
        assert!(Cli::try_parse_from(["docforge", "merge", "a.pdf"]).is_err());
        assert!(Cli::try_parse_from(["docforge", "merge", "a.pdf", "b.pdf"]).is_ok());
    }

    #[test]
    fn negative_quality_reaches_the_library() {
        let cli = Cli::try_parse_from([
            "docforge", "convert", "a.png", "--format", "webp", "--quality", "-5",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Convert {
                quality: Some(-5),
                ..
            }
        ));
    }

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.0 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    fn two_page_pdf() -> SourceArtifact {
        use lopdf::{Dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = (0..2)
            .map(|_| {
                let content_id = doc.add_object(Stream::new(Dictionary::new(), Vec::new()));
                let page_id = doc.add_object(Dictionary::from_iter(vec![
                    ("Type", Object::Name(b"Page".to_vec())),
                    ("Parent", Object::Reference(pages_id)),
                    ("Contents", Object::Reference(content_id)),
                ]));
                Object::Reference(page_id)
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(Dictionary::from_iter(vec![
                ("Type", Object::Name(b"Pages".to_vec())),
                ("Count", Object::Integer(2)),
                ("Kids", Object::Array(kids)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ]),
                ),
            ])),
        );
        let catalog_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ]));
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        SourceArtifact::sniff(bytes).unwrap()
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn archive_to_file_leaves_only_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("parts.zip");
        let split = Processor::default().split(two_page_pdf(), "1").await.unwrap();

        let (written, _) = emit_archive(split, Some(target.as_path())).await.unwrap();

        assert_eq!(written, std::fs::metadata(&target).unwrap().len());
        assert_eq!(dir_entries(dir.path()), ["parts.zip"]);
    }

    #[tokio::test]
    async fn failed_archive_write_removes_the_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way makes the final rename fail.
        let target = dir.path().join("parts.zip");
        std::fs::create_dir(&target).unwrap();
        let split = Processor::default().split(two_page_pdf(), "1").await.unwrap();

        assert!(emit_archive(split, Some(target.as_path())).await.is_err());
        assert_eq!(dir_entries(dir.path()), ["parts.zip"]);
        assert!(target.is_dir());
    }
}
