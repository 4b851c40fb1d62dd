//! # tiles2pdf
//!
//! Downloads sequentially numbered page scans from a tiled-image service
//! and compiles them into a single PDF.
//!
//! The two phases are independent and communicate only through the image
//! directory: download once, then compile as many times as you like with
//! different compression settings.
//!
//! ## Usage
//!
//! ```bash
//! tiles2pdf                                  # download, then compile
//! tiles2pdf --skip-download --quality 60     # re-compile existing images
//! ```

mod compiler;
mod downloader;
mod error;
mod pdf_builder;

pub use compiler::{CompileSummary, CompressionProfile, PdfCompiler};
pub use downloader::{
    AcquireSummary, Downloader, HttpFetcher, PageFetcher, PageUrlTemplate, STOP_THRESHOLD,
};
pub use error::{AcquireError, CompileError, FetchError};
pub use pdf_builder::PdfBuilder;
