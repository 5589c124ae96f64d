//! Result types returned by the conversion entry points.

use crate::error::ConversionWarning;
use crate::model::{AltText, DocumentNode};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A compiled document, held in memory.
#[derive(Debug, Clone)]
pub struct ConversionOutput {
    /// Normalised nodes the DOCX was emitted from.
    pub nodes: Vec<DocumentNode>,
    /// Complete `.docx` container bytes.
    pub docx: Vec<u8>,
    /// Degraded images, in document order.
    pub warnings: Vec<ConversionWarning>,
    pub stats: ConversionStats,
}

/// What a conversion produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionStats {
    pub headings: usize,
    pub paragraphs: usize,
    pub list_items: usize,
    pub tables: usize,
    pub images: usize,
    /// Images whose description came from the alt-text collaborator.
    pub synthesized_alt: usize,
    /// Images marked decorative.
    pub decorative_images: usize,
    /// Images replaced by a text placeholder.
    pub missing_images: usize,
    pub page_breaks: usize,
    pub docx_bytes: usize,
    pub duration_ms: u64,
}

impl ConversionStats {
    /// Count node kinds in a finished node sequence.
    pub fn from_nodes(nodes: &[DocumentNode]) -> Self {
        let mut stats = Self::default();
        for node in nodes {
            match node {
                DocumentNode::Heading { .. } => stats.headings += 1,
                DocumentNode::Paragraph { .. } => stats.paragraphs += 1,
                DocumentNode::ListItem { .. } => stats.list_items += 1,
                DocumentNode::Table(_) => stats.tables += 1,
                DocumentNode::Image(img) => {
                    stats.images += 1;
                    match img.alt {
                        AltText::Synthesized(_) => stats.synthesized_alt += 1,
                        AltText::Decorative => stats.decorative_images += 1,
                        AltText::Unavailable(_) => stats.missing_images += 1,
                        _ => {}
                    }
                }
                DocumentNode::PageBreak { .. } => stats.page_breaks += 1,
                DocumentNode::AuthorGrid(g) => stats.paragraphs += g.reading_order().len(),
            }
        }
        stats
    }
}

/// Outcome of one file in a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionStatus {
    Succeeded { stats: ConversionStats },
    Failed { reason: String },
}

/// Per-file line of the CLI's `--json` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    #[serde(flatten)]
    pub status: ConversionStatus,
    pub warnings: Vec<ConversionWarning>,
}

impl ConversionReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, ConversionStatus::Succeeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageRef;

    #[test]
    fn stats_count_node_kinds() {
        let mut decorative = ImageRef::new("a.png", None, 1);
        decorative.alt = AltText::Decorative;
        let mut missing = ImageRef::new("b.png", None, 2);
        missing.alt = AltText::Unavailable("Image could not be loaded".into());
        let nodes = vec![
            DocumentNode::Heading {
                level: 1,
                text: "T".into(),
            },
            DocumentNode::paragraph("p"),
            DocumentNode::Image(decorative),
            DocumentNode::PageBreak { page: 2 },
            DocumentNode::Image(missing),
        ];
        let stats = ConversionStats::from_nodes(&nodes);
        assert_eq!(stats.headings, 1);
        assert_eq!(stats.paragraphs, 1);
        assert_eq!(stats.images, 2);
        assert_eq!(stats.decorative_images, 1);
        assert_eq!(stats.missing_images, 1);
        assert_eq!(stats.page_breaks, 1);
    }

    #[test]
    fn report_serialises_flat_status() {
        let report = ConversionReport {
            input: PathBuf::from("paper.md"),
            output: None,
            status: ConversionStatus::Failed {
                reason: "file not found".into(),
            },
            warnings: vec![],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "file not found");
        assert!(!report.succeeded());
    }
}
