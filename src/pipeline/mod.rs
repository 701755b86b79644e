//! Processing stages for images and PDFs.
//!
//! Each submodule implements one step and is usable on its own. The
//! [`crate::Processor`] wires them together per request; nothing here holds
//! state between requests.
//!
//! ## Data Flow
//!
//! ```text
//!               ┌──▶ transcode ──▶ bytes + content type
//! input ──▶ codec ┤
//! (path/URL)    └──▶ compress  ──▶ JPEG under a size target
//!
//! input ──▶ codec ──▶ partition ──▶ assemble (×2) ──▶ archive ──▶ zip sink
//!          (lopdf)    (ranges)      (fork-join)      (deflate)
//! ```
//!
//! 1. [`input`]     — resolve a path or URL to bytes and enforce upload ceilings
//! 2. [`codec`]     — decode/encode behind the [`codec::ImageCodec`] seam;
//!    images and PDFs take separate paths
//! 3. [`transcode`] — validate a target format and dispatch its encoder options
//! 4. [`compress`]  — descending-quality JPEG search against a byte budget
//! 5. [`partition`] — validate a split point and compute two page ranges
//! 6. [`assemble`]  — build standalone PDFs from page ranges, merges or images
//! 7. [`archive`]   — write entries into a zip incrementally

pub mod archive;
pub mod assemble;
pub mod codec;
pub mod compress;
pub mod input;
pub mod partition;
pub mod transcode;
