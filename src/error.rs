//! Error types.
//!
//! Two tiers of failure exist and must not be conflated:
//!
//! * Per-page failures ([`FetchError`] during download, decode failures
//!   during compilation) are non-fatal. They only feed the stop-detection
//!   counter or the skip count; the run continues.
//! * Whole-run failures ([`AcquireError`], [`CompileError`]) abort with a
//!   non-zero exit. Configuration problems (bad URL, bad quality) surface
//!   before any page is touched.

use std::path::PathBuf;
use thiserror::Error;

/// A single page request that did not yield image bytes.
///
/// Both variants increment the consecutive-failure counter that drives
/// stop detection; they differ only in how they are logged. `NotFound` is
/// the expected end-of-document signal, `Transient` carries the reason
/// (timeout, connection error, unexpected status) for diagnosis.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page not found")]
    NotFound,

    #[error("transient fetch failure: {0}")]
    Transient(String),
}

/// Fatal errors raised by the download phase.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL pattern '{pattern}' does not contain a {{page}} placeholder")]
    MissingPagePlaceholder { pattern: String },

    #[error("failed to create output directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write image to '{}': {source}", path.display())]
    WriteImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Fatal errors raised by the compilation phase.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid compression profile: {0}")]
    InvalidProfile(String),

    #[error("failed to read image directory '{}': {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no page images found in '{}'", dir.display())]
    NoImagesFound { dir: PathBuf },

    #[error("all {count} page images failed to decode; nothing to assemble")]
    AllPagesSkipped { count: usize },

    #[error("failed to serialize PDF: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("failed to write PDF to '{}': {source}", path.display())]
    WritePdf {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
