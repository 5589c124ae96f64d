//! Structural document model shared by every pipeline stage.
//!
//! The node set is closed: the emitter matches exhaustively on
//! [`DocumentNode`], so adding a variant is a compile error everywhere it
//! must be handled.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One block-level element of the document, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DocumentNode {
    /// Heading with a level in `1..=6`.
    Heading { level: u8, text: String },
    /// Paragraph made of styled text runs.
    Paragraph { runs: Vec<TextRun> },
    /// One list entry. `list_id` groups entries into a logical list and is
    /// assigned by the normaliser (0 until then).
    ListItem {
        depth: u8,
        ordered: bool,
        text: String,
        list_id: usize,
    },
    /// Table with a marked header row.
    Table(TableBlock),
    /// Embedded image.
    Image(ImageRef),
    /// Explicit break at the start of OCR page `page`.
    PageBreak { page: usize },
    /// Side-by-side author/affiliation layout from a paper's first page.
    AuthorGrid(AuthorGridBlock),
}

impl DocumentNode {
    /// Plain paragraph with a single unstyled run.
    pub fn paragraph(text: impl Into<String>) -> Self {
        DocumentNode::Paragraph {
            runs: vec![TextRun::plain(text)],
        }
    }

    /// Concatenated text content, for heuristics and alt-text context.
    pub fn plain_text(&self) -> String {
        match self {
            DocumentNode::Heading { text, .. } | DocumentNode::ListItem { text, .. } => {
                text.clone()
            }
            DocumentNode::Paragraph { runs } => runs.iter().map(|r| r.text.as_str()).collect(),
            DocumentNode::Table(t) => t.plain_text(),
            DocumentNode::Image(img) => img.caption.clone().unwrap_or_default(),
            DocumentNode::PageBreak { .. } => String::new(),
            DocumentNode::AuthorGrid(g) => g.reading_order().join("\n"),
        }
    }
}

/// A run of text sharing the same emphasis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRun {
    pub text: String,
    pub bold: bool,
    pub italic: bool,
}

impl TextRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            bold: false,
            italic: false,
        }
    }
}

/// What a table cell represents after structuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CellKind {
    /// Cell present in the source (possibly empty).
    #[default]
    Content,
    /// Cell added to pad a short row.
    Padding,
    /// Empty source cell following a populated one: the populated cell
    /// visually spans it.
    SpanContinuation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub text: String,
    pub kind: CellKind,
}

impl TableCell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: CellKind::Content,
        }
    }
}

/// A table as rows of cells.
///
/// After [`crate::pipeline::table::structure_table`] every row has the same
/// number of cells and `header_row_index` is 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableBlock {
    pub rows: Vec<Vec<TableCell>>,
    pub header_row_index: usize,
}

impl TableBlock {
    /// Raw table from parsed cell text; not yet structured.
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|r| r.into_iter().map(TableCell::new).collect())
                .collect(),
            header_row_index: 0,
        }
    }

    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_header_row(&self, index: usize) -> bool {
        index == self.header_row_index
    }

    pub fn plain_text(&self) -> String {
        self.rows
            .iter()
            .map(|r| {
                r.iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Resolution state of an image's alternative text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AltText {
    /// Not processed by the alt-text resolver yet.
    #[default]
    Unresolved,
    /// Author-provided text from the source Markdown.
    Caption(String),
    /// Generated by the alt-text collaborator.
    Synthesized(String),
    /// Degraded default after a synthesis failure ("Image on page N").
    Positional(String),
    /// The image file could not be loaded.
    Unavailable(String),
    /// Synthesis disabled and no caption: marked decorative, not left empty.
    Decorative,
}

impl AltText {
    /// Description to expose to assistive technology, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            AltText::Caption(s)
            | AltText::Synthesized(s)
            | AltText::Positional(s)
            | AltText::Unavailable(s) => Some(s),
            AltText::Unresolved | AltText::Decorative => None,
        }
    }

    pub fn is_decorative(&self) -> bool {
        matches!(self, AltText::Decorative)
    }
}

/// An image reference produced by the OCR step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Target as written in the Markdown (cleaned of `./`, `<>` and titles).
    pub src: String,
    /// File-system location, when the file was found.
    pub path: Option<PathBuf>,
    /// Caption seed from the Markdown.
    pub caption: Option<String>,
    /// 1-based OCR page the image appeared on.
    pub page: usize,
    pub alt: AltText,
}

impl ImageRef {
    pub fn new(src: impl Into<String>, caption: Option<String>, page: usize) -> Self {
        Self {
            src: src.into(),
            path: None,
            caption,
            page,
            alt: AltText::Unresolved,
        }
    }
}

/// Author names and affiliations laid out side by side.
///
/// Each column is one author block, lines top to bottom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorGridBlock {
    pub columns: Vec<Vec<String>>,
}

impl AuthorGridBlock {
    /// Lines in linear reading order: each column fully, left to right.
    pub fn reading_order(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| c.iter().cloned())
            .filter(|l| !l.trim().is_empty())
            .collect()
    }
}
