//! Mapping from document nodes to named DOCX styles.
//!
//! The emitter never hard-codes a style id; it asks the [`StyleMapping`]
//! held by the configuration. The default ids are Word's built-in style
//! names, which screen readers and Word's accessibility checker recognise
//! as structural roles (`Heading1` is announced as "heading level 1").

use crate::error::Md2DocxError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Style ids used for each node kind.
///
/// Loaded once (default or from JSON) and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleMapping {
    /// Style ids for heading levels 1–6.
    pub headings: [String; 6],
    pub paragraph: String,
    pub list_bullet: String,
    pub list_number: String,
    pub table: String,
    /// Paragraph holding an inline picture.
    pub image: String,
    /// Placeholder paragraph for images that could not be loaded.
    pub image_placeholder: String,
    /// Paragraphs produced from an author grid.
    pub author: String,
}

impl Default for StyleMapping {
    fn default() -> Self {
        Self {
            headings: [
                "Heading1".into(),
                "Heading2".into(),
                "Heading3".into(),
                "Heading4".into(),
                "Heading5".into(),
                "Heading6".into(),
            ],
            paragraph: "Normal".into(),
            list_bullet: "ListBullet".into(),
            list_number: "ListNumber".into(),
            table: "TableGrid".into(),
            image: "Figure".into(),
            image_placeholder: "Caption".into(),
            author: "Author".into(),
        }
    }
}

impl StyleMapping {
    /// Style id for a heading level; levels outside `1..=6` are clamped.
    pub fn heading(&self, level: u8) -> &str {
        let idx = usize::from(level.clamp(1, 6)) - 1;
        &self.headings[idx]
    }

    /// Load a mapping from a JSON file. Missing keys keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Md2DocxError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Md2DocxError::InvalidConfig(format!("cannot read style map {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, Md2DocxError> {
        let mapping: StyleMapping = serde_json::from_str(text)
            .map_err(|e| Md2DocxError::InvalidConfig(format!("invalid style map: {e}")))?;
        mapping.validate()?;
        Ok(mapping)
    }

    /// Style ids end up in XML attributes and must be non-empty identifiers.
    pub fn validate(&self) -> Result<(), Md2DocxError> {
        let all = self.headings.iter().chain([
            &self.paragraph,
            &self.list_bullet,
            &self.list_number,
            &self.table,
            &self.image,
            &self.image_placeholder,
            &self.author,
        ]);
        for id in all {
            if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                return Err(Md2DocxError::InvalidConfig(format!(
                    "style id {id:?} must be non-empty and contain only ASCII letters, digits, '-' or '_'"
                )));
            }
        }
        Ok(())
    }
}
