//! Configuration types for Markdown-to-DOCX compilation.
//!
//! All compiler behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The config is constructed once at
//! entry, shared by reference through every pipeline stage and never
//! mutated mid-conversion, so the same value can drive many files in
//! parallel.

use crate::error::Md2DocxError;
use crate::pipeline::alt_text::AltTextSynthesizer;
use crate::styles::StyleMapping;
use std::fmt;
use std::sync::Arc;

/// Default vision model used for alt-text synthesis.
pub const DEFAULT_ALT_MODEL: &str = "pixtral-12b-2409";

/// Configuration for one or more Markdown-to-DOCX conversions.
///
/// # Example
/// ```rust
/// use edgequake_md2docx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .preserve_page_breaks(true)
///     .auto_alt(false)
///     .build()
///     .unwrap();
/// assert!(config.preserve_page_breaks);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Keep OCR per-page markers as explicit page breaks. Default: false.
    ///
    /// Page boundaries in a scanned paper are an artefact of the paper size,
    /// not of the logical structure, so by default content flows on.
    pub preserve_page_breaks: bool,

    /// Synthesise alt text for images without a caption. Default: true.
    ///
    /// When false, no call is made to the alt-text collaborator and
    /// caption-less images are marked decorative.
    pub auto_alt: bool,

    /// Collapse a first-page side-by-side author block into linear reading
    /// order. Default: true.
    pub author_grid: bool,

    /// Strip inline LaTeX notation left by the OCR step. Default: true.
    pub clean_latex: bool,

    /// Style ids for each node kind.
    pub styles: StyleMapping,

    /// Maximum picture width in inches. Range: 1.0–8.5. Default: 5.5.
    pub max_image_width_in: f32,

    /// Pre-resolved alt-text collaborator. `None` with `auto_alt` on means
    /// every caption-less image gets a positional description.
    pub alt_text: Option<Arc<dyn AltTextSynthesizer>>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            preserve_page_breaks: false,
            auto_alt: true,
            author_grid: true,
            clean_latex: true,
            styles: StyleMapping::default(),
            max_image_width_in: 5.5,
            alt_text: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("preserve_page_breaks", &self.preserve_page_breaks)
            .field("auto_alt", &self.auto_alt)
            .field("author_grid", &self.author_grid)
            .field("clean_latex", &self.clean_latex)
            .field("styles", &self.styles)
            .field("max_image_width_in", &self.max_image_width_in)
            .field(
                "alt_text",
                &self.alt_text.as_ref().map(|_| "<dyn AltTextSynthesizer>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Whether the alt-text collaborator may be called at all.
    pub fn synthesis_enabled(&self) -> bool {
        self.auto_alt
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn preserve_page_breaks(mut self, v: bool) -> Self {
        self.config.preserve_page_breaks = v;
        self
    }

    pub fn auto_alt(mut self, v: bool) -> Self {
        self.config.auto_alt = v;
        self
    }

    pub fn author_grid(mut self, v: bool) -> Self {
        self.config.author_grid = v;
        self
    }

    pub fn clean_latex(mut self, v: bool) -> Self {
        self.config.clean_latex = v;
        self
    }

    pub fn styles(mut self, styles: StyleMapping) -> Self {
        self.config.styles = styles;
        self
    }

    pub fn max_image_width_in(mut self, inches: f32) -> Self {
        self.config.max_image_width_in = inches.clamp(1.0, 8.5);
        self
    }

    pub fn alt_text(mut self, synthesizer: Arc<dyn AltTextSynthesizer>) -> Self {
        self.config.alt_text = Some(synthesizer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Md2DocxError> {
        let c = &self.config;
        if !(1.0..=8.5).contains(&c.max_image_width_in) {
            return Err(Md2DocxError::InvalidConfig(format!(
                "Image width must be 1.0–8.5 inches, got {}",
                c.max_image_width_in
            )));
        }
        c.styles.validate()?;
        Ok(self.config)
    }
}
