//! # edgequake-md2docx
//!
//! Compile OCR-derived Markdown into accessible Word (DOCX) documents.
//!
//! ## Why this crate?
//!
//! OCR services such as Mistral OCR turn scanned papers into Markdown that
//! reads fine on screen but makes a poor accessible document: heading levels
//! skip, lists are fragmented, tables have no header row, images have
//! placeholder alt text and the first page's author block reads across
//! columns. This crate repairs that structure and writes it using the
//! format's own accessibility markup, so screen readers and Word's
//! accessibility checker understand the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Markdown
//!  │
//!  ├─ 1. Clean      OCR artefacts: invisible chars, &amp;, inline LaTeX
//!  ├─ 2. Parse      headings, lists, tables, images, page markers
//!  ├─ 3. Normalise  heading gaps, list grouping, author grid, page breaks
//!  ├─ 4. Alt text   captions, "Figure N:" lines, or a vision LLM
//!  ├─ 5. Emit       WordprocessingML with tblHeader, descr, decorative
//!  └─ 6. Package    in-memory zip, atomically written to disk
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_md2docx::{convert_to_file, ConversionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // No synthesizer: caption-less images get "Image on page N".
//!     let config = ConversionConfig::default();
//!     let output = convert_to_file("paper.md", "paper.docx", &config)?;
//!     for warning in &output.warnings {
//!         eprintln!("warning: {warning}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! With a vision model for alt text (reads `MISTRAL_API_KEY`,
//! `OPENAI_API_KEY`, …):
//!
//! ```rust,no_run
//! use edgequake_md2docx::{convert, AltTextOptions, ConversionConfig, VisionAltText};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let vision = VisionAltText::from_env(AltTextOptions::default())?;
//! let config = ConversionConfig::builder().alt_text(Arc::new(vision)).build()?;
//! let output = convert("paper.md", &config)?;
//! println!("{} images described", output.stats.synthesized_alt);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `md2docx` binary (clap + anyhow + tracing-subscriber + indicatif + dotenvy) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-md2docx = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod styles;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder, DEFAULT_ALT_MODEL};
pub use convert::{compile_markdown, convert, convert_to_file, default_output_path};
pub use error::{ConversionWarning, Md2DocxError};
pub use model::{AltText, DocumentNode, ImageRef, TableBlock};
pub use output::{ConversionOutput, ConversionReport, ConversionStats, ConversionStatus};
pub use pipeline::alt_text::{AltTextRequest, AltTextSynthesizer, SynthesisError};
pub use pipeline::llm::{AltTextOptions, VisionAltText};
pub use styles::StyleMapping;
