//! Error types for the edgequake-md2docx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Md2DocxError`]: **Fatal**: the file cannot be converted at all
//!   (unreadable input, container write failure, bad configuration).
//!   Returned as `Err(Md2DocxError)` from the top-level `convert*` functions.
//!
//! * [`ConversionWarning`]: **Non-fatal**: one image could not be loaded or
//!   described, but the document is still produced. Stored inside
//!   [`crate::output::ConversionOutput`] so callers can inspect what was
//!   degraded.
//!
//! Parsing and normalisation have no error type: OCR Markdown is noisy and
//! every line degrades to plain text rather than failing.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-md2docx library.
#[derive(Debug, Error)]
pub enum Md2DocxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The Markdown file is missing, unreadable, or not valid UTF-8.
    #[error("Cannot read Markdown input '{path}': {reason}")]
    UnreadableInput { path: PathBuf, reason: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Building the DOCX container failed (zip or media error).
    #[error("Failed to build DOCX for '{path}': {detail}")]
    EmissionFailed { path: PathBuf, detail: String },

    /// Could not create, write, or rename the output DOCX file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The alt-text LLM provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal problem with a single image.
///
/// The image is still represented in the output, with a degraded alt text.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum ConversionWarning {
    /// The referenced image file does not exist or cannot be decoded.
    #[error("Image '{src}' could not be loaded; a text placeholder was used")]
    MalformedImageReference { src: String },

    /// The alt-text collaborator failed; a positional description was used.
    #[error("Alt text synthesis failed for '{src}' on page {page}: {detail}")]
    AltTextSynthesisFailed {
        src: String,
        page: usize,
        detail: String,
    },
}
