//! Pipeline stages for Markdown-to-DOCX compilation.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and none knows about the stages around it.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ clean ──▶ parse ──▶ normalize ──▶ alt_text ──▶ emit ──▶ package
//! (UTF-8)   (OCR      (nodes)   (headings,    (captions,   (WML)    (zip)
//!            noise)             lists, grid)   VLM)
//! ```
//!
//! 1. [`input`] : read the Markdown file; the only fatal input error
//! 2. [`clean`] : strip OCR artefacts (invisible chars, `&amp;`, inline LaTeX)
//! 3. [`parse`] : line-oriented Markdown → [`crate::model::DocumentNode`]s;
//!    never fails, unknown syntax degrades to paragraphs
//! 4. [`normalize`]: heading repair, list grouping, author grid, page
//!    breaks, and [`table`] structuring
//! 5. [`alt_text`]: give every image a description; [`llm`] and [`encode`]
//!    back the default vision-model synthesizer
//! 6. [`emit`]  : WordprocessingML body with native accessibility markup
//! 7. [`package`]: the OPC zip container, built in memory

pub mod alt_text;
pub mod clean;
pub mod emit;
pub mod encode;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod package;
pub mod parse;
pub mod table;
mod xml;
