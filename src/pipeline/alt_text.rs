//! Alt-text resolver: give every image a non-empty description, or mark it
//! decorative.
//!
//! Resolution order per image:
//!
//! 1. file missing or undecodable → `Unavailable` + a
//!    [`ConversionWarning::MalformedImageReference`]
//! 2. a real author caption (`![A bar chart](…)`) → `Caption`
//! 3. a following `Figure N: …` paragraph → `Caption`
//! 4. synthesis disabled → `Decorative`
//! 5. the [`AltTextSynthesizer`] → `Synthesized`, or on failure `Positional`
//!    + a [`ConversionWarning::AltTextSynthesisFailed`]
//!
//! Synthesis failures never abort the document.

use crate::config::ConversionConfig;
use crate::error::ConversionWarning;
use crate::model::{AltText, DocumentNode, ImageRef};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Extensions tried when the referenced file is missing.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "gif"];
/// Directory some OCR tools write images into, next to the Markdown.
pub const EXTRACTED_IMAGES_DIR: &str = "extracted_images";
/// Surrounding text handed to the synthesizer is cut to this many chars.
pub const MAX_CONTEXT_CHARS: usize = 300;

static RE_PLACEHOLDER_ALT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(img|image|figure|photo|screenshot)[-_ ]?\d*$").unwrap());
static RE_FIGURE_CAPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(figure|fig\.?)\s*\d*[:.\-]\s+").unwrap());
static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Everything the collaborator gets to describe one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltTextRequest {
    /// Resolved, decodable image file.
    pub path: PathBuf,
    /// Reference as written in the Markdown.
    pub src: String,
    pub page: usize,
    /// Nearby heading or paragraph text.
    pub context: Option<String>,
}

/// Why a synthesis attempt produced no description.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("cannot read image '{path}': {detail}")]
    Image { path: PathBuf, detail: String },

    #[error("provider call failed after {retries} retries: {detail}")]
    ProviderFailed { retries: u32, detail: String },

    #[error("provider call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("provider returned an empty description")]
    Empty,

    #[error("cannot drive the async provider call: {detail}")]
    Runtime { detail: String },
}

/// External service that describes images.
///
/// Calls are blocking from the compiler's point of view; implementations
/// own any retry or timeout policy.
pub trait AltTextSynthesizer: Send + Sync {
    fn describe(&self, request: &AltTextRequest) -> Result<String, SynthesisError>;
}

/// Resolve the alt text of every unresolved image in `nodes`.
///
/// Returns one warning per degraded image, in document order.
pub fn resolve_alt_text(
    nodes: &mut [DocumentNode],
    base_dir: &Path,
    config: &ConversionConfig,
) -> Vec<ConversionWarning> {
    let mut warnings = Vec::new();

    for i in 0..nodes.len() {
        let figure_caption = nodes.get(i + 1).and_then(figure_caption);
        let context = i
            .checked_sub(1)
            .and_then(|prev| nodes.get(prev))
            .and_then(context_text);

        let DocumentNode::Image(image) = &mut nodes[i] else {
            continue;
        };
        if image.alt != AltText::Unresolved {
            continue;
        }
        if let Some(w) = resolve_one(image, figure_caption, context, base_dir, config) {
            warnings.push(w);
        }
    }
    warnings
}

fn resolve_one(
    image: &mut ImageRef,
    figure_caption: Option<String>,
    context: Option<String>,
    base_dir: &Path,
    config: &ConversionConfig,
) -> Option<ConversionWarning> {
    let caption = image
        .caption
        .as_deref()
        .filter(|c| !is_placeholder_alt(c, &image.src))
        .map(collapse_whitespace)
        .or(figure_caption);

    let Some(path) = find_image_path(base_dir, &image.src).filter(|p| is_loadable(p)) else {
        warn!("Image '{}' on page {} could not be loaded", image.src, image.page);
        image.alt = AltText::Unavailable(match &caption {
            Some(c) => format!("Image could not be loaded: {c}"),
            None => "Image could not be loaded".to_string(),
        });
        return Some(ConversionWarning::MalformedImageReference {
            src: image.src.clone(),
        });
    };
    image.path = Some(path.clone());

    if let Some(c) = caption {
        image.alt = AltText::Caption(c);
        return None;
    }
    if !config.synthesis_enabled() {
        image.alt = AltText::Decorative;
        return None;
    }

    let positional = format!("Image on page {}", image.page);
    let Some(synthesizer) = config.alt_text.as_ref() else {
        debug!("No alt-text synthesizer configured; '{}' gets a positional description", image.src);
        image.alt = AltText::Positional(positional);
        return None;
    };

    let request = AltTextRequest {
        path,
        src: image.src.clone(),
        page: image.page,
        context,
    };
    match synthesizer
        .describe(&request)
        .map(|text| clean_description(&text))
        .and_then(|text| if text.is_empty() { Err(SynthesisError::Empty) } else { Ok(text) })
    {
        Ok(text) => {
            debug!("Synthesised alt text for '{}': {}", image.src, text);
            image.alt = AltText::Synthesized(text);
            None
        }
        Err(e) => {
            warn!("Alt text for '{}' on page {}: {}", image.src, image.page, e);
            image.alt = AltText::Positional(positional);
            Some(ConversionWarning::AltTextSynthesisFailed {
                src: image.src.clone(),
                page: image.page,
                detail: e.to_string(),
            })
        }
    }
}

/// Locate an image file, trying sibling extensions and the
/// `extracted_images/` directory when the reference itself is missing.
///
/// Remote (`http:`, `https:`, `data:`) references are never fetched.
pub fn find_image_path(base_dir: &Path, src: &str) -> Option<PathBuf> {
    let src = src.trim();
    if src.is_empty() || ["http://", "https://", "data:"].iter().any(|p| src.starts_with(p)) {
        return None;
    }

    let direct = base_dir.join(src);
    if direct.is_file() {
        return Some(direct);
    }

    let stem = Path::new(src).file_stem()?.to_str()?;
    let sibling_dir = direct.parent().unwrap_or(base_dir).to_path_buf();
    let extracted_dir = base_dir.join(EXTRACTED_IMAGES_DIR);
    [sibling_dir, extracted_dir]
        .into_iter()
        .flat_map(|dir| IMAGE_EXTENSIONS.iter().map(move |ext| dir.join(format!("{stem}.{ext}"))))
        .find(|p| p.is_file())
}

fn is_loadable(path: &Path) -> bool {
    match image::image_dimensions(path) {
        Ok((w, h)) => w > 0 && h > 0,
        Err(e) => {
            debug!("Cannot decode {}: {}", path.display(), e);
            false
        }
    }
}

/// Whether a Markdown alt attribute is an OCR placeholder rather than a
/// description: empty, the file name, or `img-3` style.
pub fn is_placeholder_alt(alt: &str, src: &str) -> bool {
    let alt = alt.trim();
    if alt.is_empty() || RE_PLACEHOLDER_ALT.is_match(alt) {
        return true;
    }
    let lower = alt.to_ascii_lowercase();
    if IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{ext}"))) {
        return true;
    }
    let file = Path::new(src);
    let same = |part: Option<&std::ffi::OsStr>| {
        part.and_then(|p| p.to_str())
            .is_some_and(|p| p.eq_ignore_ascii_case(alt))
    };
    same(file.file_name()) || same(file.file_stem())
}

/// Caption text of a `Figure 2: …` paragraph, prefix removed.
fn figure_caption(node: &DocumentNode) -> Option<String> {
    let DocumentNode::Paragraph { .. } = node else {
        return None;
    };
    let text = node.plain_text();
    let text = text.trim();
    let m = RE_FIGURE_CAPTION.find(text)?;
    let caption = collapse_whitespace(&text[m.end()..]);
    (!caption.is_empty()).then_some(caption)
}

fn context_text(node: &DocumentNode) -> Option<String> {
    match node {
        DocumentNode::Heading { .. } | DocumentNode::Paragraph { .. } => {
            let text = collapse_whitespace(&node.plain_text());
            (!text.is_empty()).then(|| text.chars().take(MAX_CONTEXT_CHARS).collect())
        }
        _ => None,
    }
}

fn collapse_whitespace(text: &str) -> String {
    RE_WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Strip wrapping quotes models like to add, and collapse whitespace.
fn clean_description(text: &str) -> String {
    let text = collapse_whitespace(text);
    text.trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”'))
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct MockSynth {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl MockSynth {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl AltTextSynthesizer for MockSynth {
        fn describe(&self, _request: &AltTextRequest) -> Result<String, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| SynthesisError::ProviderFailed {
                    retries: 3,
                    detail: "HTTP 503".into(),
                })
        }
    }

    fn write_png(dir: &Path, name: &str) {
        image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]))
            .save(dir.join(name))
            .unwrap();
    }

    fn image_node(src: &str, caption: Option<&str>, page: usize) -> DocumentNode {
        DocumentNode::Image(ImageRef::new(src, caption.map(str::to_string), page))
    }

    fn alt_of(node: &DocumentNode) -> &AltText {
        match node {
            DocumentNode::Image(img) => &img.alt,
            other => panic!("not an image: {other:?}"),
        }
    }

    fn config_with(synth: Arc<MockSynth>, auto_alt: bool) -> ConversionConfig {
        ConversionConfig::builder()
            .auto_alt(auto_alt)
            .alt_text(synth)
            .build()
            .unwrap()
    }

    #[test]
    fn author_caption_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "chart.png");
        let synth = MockSynth::new(Some("unused"));
        let mut nodes = vec![image_node("chart.png", Some("A  bar chart"), 1)];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &config_with(synth.clone(), true));
        assert!(warnings.is_empty());
        assert_eq!(alt_of(&nodes[0]), &AltText::Caption("A bar chart".into()));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn placeholder_caption_is_synthesized() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "img-0.png");
        let synth = MockSynth::new(Some("\"A line graph of rising costs.\""));
        let mut nodes = vec![
            DocumentNode::paragraph("Costs grew every year."),
            image_node("img-0.png", Some("img-0.png"), 2),
        ];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &config_with(synth.clone(), true));
        assert!(warnings.is_empty());
        assert_eq!(
            alt_of(&nodes[1]),
            &AltText::Synthesized("A line graph of rising costs.".into())
        );
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn figure_caption_paragraph_used_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "fig.png");
        let synth = MockSynth::new(Some("unused"));
        let mut nodes = vec![
            image_node("fig.png", None, 1),
            DocumentNode::paragraph("Figure 3: Survey response rates by region"),
        ];
        resolve_alt_text(&mut nodes, dir.path(), &config_with(synth.clone(), true));
        assert_eq!(
            alt_of(&nodes[0]),
            &AltText::Caption("Survey response rates by region".into())
        );
        assert_eq!(nodes.len(), 2);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn synthesis_failure_degrades_to_positional() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "img-1.png");
        let synth = MockSynth::new(None);
        let mut nodes = vec![image_node("img-1.png", None, 4)];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &config_with(synth, true));
        assert_eq!(alt_of(&nodes[0]), &AltText::Positional("Image on page 4".into()));
        assert!(matches!(
            &warnings[..],
            [ConversionWarning::AltTextSynthesisFailed { page: 4, .. }]
        ));
    }

    #[test]
    fn empty_synthesis_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        let synth = MockSynth::new(Some("  \"\" "));
        let mut nodes = vec![image_node("a.png", None, 1)];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &config_with(synth, true));
        assert_eq!(warnings.len(), 1);
        assert_eq!(alt_of(&nodes[0]), &AltText::Positional("Image on page 1".into()));
    }

    #[test]
    fn disabled_synthesis_marks_decorative_without_calls() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        let synth = MockSynth::new(Some("unused"));
        let mut nodes = vec![image_node("a.png", None, 1)];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &config_with(synth.clone(), false));
        assert!(warnings.is_empty());
        assert_eq!(alt_of(&nodes[0]), &AltText::Decorative);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn no_synthesizer_gives_positional_without_warning() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        let mut nodes = vec![image_node("a.png", None, 7)];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &ConversionConfig::default());
        assert!(warnings.is_empty());
        assert_eq!(alt_of(&nodes[0]), &AltText::Positional("Image on page 7".into()));
    }

    #[test]
    fn missing_image_is_unavailable_with_caption() {
        let dir = tempfile::tempdir().unwrap();
        let mut nodes = vec![image_node("gone.png", Some("Site map"), 1)];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &ConversionConfig::default());
        assert_eq!(
            alt_of(&nodes[0]),
            &AltText::Unavailable("Image could not be loaded: Site map".into())
        );
        assert_eq!(
            warnings,
            vec![ConversionWarning::MalformedImageReference {
                src: "gone.png".into()
            }]
        );
    }

    #[test]
    fn corrupt_image_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.png"), b"not a png").unwrap();
        let mut nodes = vec![image_node("bad.png", None, 1)];
        let warnings = resolve_alt_text(&mut nodes, dir.path(), &ConversionConfig::default());
        assert_eq!(warnings.len(), 1);
        assert_eq!(
            alt_of(&nodes[0]),
            &AltText::Unavailable("Image could not be loaded".into())
        );
    }

    #[test]
    fn fallback_extensions_and_extracted_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "img-0.png");
        std::fs::create_dir(dir.path().join(EXTRACTED_IMAGES_DIR)).unwrap();
        write_png(&dir.path().join(EXTRACTED_IMAGES_DIR), "img-9.png");

        assert_eq!(
            find_image_path(dir.path(), "img-0.jpeg"),
            Some(dir.path().join("img-0.png"))
        );
        assert_eq!(
            find_image_path(dir.path(), "img-9.jpeg"),
            Some(dir.path().join(EXTRACTED_IMAGES_DIR).join("img-9.png"))
        );
        assert_eq!(find_image_path(dir.path(), "https://x.org/a.png"), None);
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_placeholder_alt("", "a.png"));
        assert!(is_placeholder_alt("img-3", "img-3.jpeg"));
        assert!(is_placeholder_alt("Figure 2", "x.png"));
        assert!(is_placeholder_alt("chart.PNG", "other.png"));
        assert!(is_placeholder_alt("scan", "pages/scan.jpg"));
        assert!(!is_placeholder_alt("A map of the region", "map.png"));
    }

    #[test]
    fn resolution_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png");
        let synth = MockSynth::new(Some("A photo."));
        let config = config_with(synth.clone(), true);
        let mut nodes = vec![image_node("a.png", None, 1)];
        resolve_alt_text(&mut nodes, dir.path(), &config);
        let once = nodes.clone();
        resolve_alt_text(&mut nodes, dir.path(), &config);
        assert_eq!(nodes, once);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }
}
