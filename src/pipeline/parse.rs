//! Markdown tokenizer/parser: OCR Markdown → ordered [`DocumentNode`]s.
//!
//! Parsing is line-oriented and never fails. Anything that is not a
//! recognised block construct becomes a paragraph, one per source line, the
//! way OCR services emit them.
//!
//! Recognised constructs, checked in this order for each line:
//!
//! | Construct | Syntax |
//! |-----------|--------|
//! | page sentinel | `<!-- Page N -->` |
//! | fenced code | ```` ``` ```` / `~~~` … closing fence |
//! | thematic break | `---`, `***`, `___` (dropped) |
//! | page number | a line holding only digits (dropped) |
//! | table | pipe row followed by a `---` separator row |
//! | heading | `#`..`######` + space |
//! | list item | `-`, `*`, `+`, `•`, `1.`, `1)` |
//! | image | `![alt](target)` anywhere on the line |

use crate::model::{DocumentNode, ImageRef, TableBlock, TextRun};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Indentation columns that open one nesting level.
pub const INDENT_STEP: usize = 2;
/// Columns of indentation jitter tolerated between sibling items.
pub const INDENT_TOLERANCE: usize = 1;
/// DOCX supports nine list levels (`ilvl` 0–8).
pub const MAX_LIST_LEVELS: usize = 9;

static RE_PAGE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<!--\s*[Pp]age\s+(\d+)\s*-->$").unwrap());
static RE_COMMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<!--.*-->$").unwrap());
static RE_THEMATIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:(?:-[ \t]*){3,}|(?:\*[ \t]*){3,}|(?:_[ \t]*){3,})$").unwrap());
static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());
static RE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").unwrap());
static RE_LIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([ \t]*)([-*+•]|\d{1,9}[.)])[ \t]+(.+)$").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());
static RE_SEPARATOR_CELL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:?-+:?$").unwrap());
static RE_BR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());
static RE_EMPHASIS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*\*\*([^*]+)\*\*\*|\*\*([^*]+)\*\*|__([^_]+)__|\*([^*\s][^*]*)\*").unwrap()
});
static RE_IMAGE_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^(.+?)\s+["'].*["']$"#).unwrap());

/// Parse cleaned OCR Markdown into block nodes.
pub fn parse_markdown(text: &str) -> Vec<DocumentNode> {
    let lines: Vec<&str> = text.lines().collect();
    let mut parser = Parser {
        lines: &lines,
        pos: 0,
        page: 1,
        nodes: Vec::new(),
        list_indent: ListIndent::default(),
    };
    parser.run();
    debug!("Parsed {} lines into {} nodes", lines.len(), parser.nodes.len());
    parser.nodes
}

struct Parser<'a> {
    lines: &'a [&'a str],
    pos: usize,
    /// Current OCR page, 1-based.
    page: usize,
    nodes: Vec<DocumentNode>,
    list_indent: ListIndent,
}

impl Parser<'_> {
    fn run(&mut self) {
        while self.pos < self.lines.len() {
            let raw = self.lines[self.pos];
            let line = raw.trim();

            if line.is_empty() {
                self.pos += 1;
                continue;
            }

            if let Some(caps) = RE_PAGE_MARKER.captures(line) {
                let page = caps[1].parse().unwrap_or(self.page + 1);
                self.page = page;
                self.push(DocumentNode::PageBreak { page });
                self.pos += 1;
                continue;
            }

            if line.starts_with("```") || line.starts_with("~~~") {
                self.parse_fence(&line[..3]);
                continue;
            }

            if RE_COMMENT.is_match(line) || RE_THEMATIC.is_match(line) || RE_PAGE_NUMBER.is_match(line) {
                self.pos += 1;
                continue;
            }

            if line.contains('|')
                && self
                    .lines
                    .get(self.pos + 1)
                    .is_some_and(|next| is_separator_line(next))
            {
                self.parse_table();
                continue;
            }

            if let Some(caps) = RE_HEADING.captures(line) {
                let level = caps[1].len() as u8;
                let text = inline_plain(&caps[2]);
                if !text.is_empty() {
                    self.push(DocumentNode::Heading { level, text });
                }
                self.pos += 1;
                continue;
            }

            if let Some(caps) = RE_LIST.captures(raw) {
                let width = indent_width(&caps[1]);
                let depth = self.list_indent.depth_for(width);
                let marker = &caps[2];
                let ordered = marker.starts_with(|c: char| c.is_ascii_digit());
                let text = inline_plain(&caps[3]);
                self.nodes.push(DocumentNode::ListItem {
                    depth,
                    ordered,
                    text,
                    list_id: 0,
                });
                self.pos += 1;
                continue;
            }

            self.parse_text_line(line);
            self.pos += 1;
        }
    }

    /// Push a non-list node, ending any indentation context.
    fn push(&mut self, node: DocumentNode) {
        self.list_indent.reset();
        self.nodes.push(node);
    }

    /// A text line, possibly holding inline images.
    fn parse_text_line(&mut self, line: &str) {
        let mut rest = line;
        while let Some(caps) = RE_IMAGE.captures(rest) {
            let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
            let before = rest[..whole.0].trim();
            if !before.is_empty() {
                self.push(paragraph_node(before));
            }
            let alt = caps[1].trim();
            let src = clean_image_target(&caps[2]);
            let caption = (!alt.is_empty()).then(|| alt.to_string());
            self.push(DocumentNode::Image(ImageRef::new(src, caption, self.page)));
            rest = &rest[whole.1..];
        }
        let tail = rest.trim();
        if !tail.is_empty() {
            self.push(paragraph_node(tail));
        }
    }

    fn parse_fence(&mut self, fence: &str) {
        self.pos += 1;
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos];
            self.pos += 1;
            if line.trim_start().starts_with(fence) {
                return;
            }
            if !line.trim().is_empty() {
                self.push(DocumentNode::paragraph(line.trim_end()));
            }
        }
    }

    fn parse_table(&mut self) {
        let mut rows = vec![split_table_row(self.lines[self.pos])];
        self.pos += 2;
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].trim();
            if !is_table_row(line) {
                break;
            }
            if !is_separator_line(line) {
                rows.push(split_table_row(line));
            }
            self.pos += 1;
        }
        self.push(DocumentNode::Table(TableBlock::from_rows(rows)));
    }
}

/// Stack of indentation widths for the current list region.
#[derive(Debug, Default)]
struct ListIndent {
    widths: Vec<usize>,
}

impl ListIndent {
    fn depth_for(&mut self, width: usize) -> u8 {
        while let Some(&top) = self.widths.last() {
            if width + INDENT_TOLERANCE < top {
                self.widths.pop();
            } else {
                break;
            }
        }
        match self.widths.last() {
            Some(&top) if width >= top + INDENT_STEP && self.widths.len() < MAX_LIST_LEVELS => {
                self.widths.push(width)
            }
            Some(_) => {}
            None => self.widths.push(width),
        }
        (self.widths.len() - 1) as u8
    }

    fn reset(&mut self) {
        self.widths.clear();
    }
}

fn indent_width(indent: &str) -> usize {
    indent.chars().map(|c| if c == '\t' { 4 } else { 1 }).sum()
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.contains('|')
        && !trimmed.starts_with('#')
        && !RE_PAGE_MARKER.is_match(trimmed)
}

/// A row of `---` / `:---:` cells separated by pipes.
pub fn is_separator_line(line: &str) -> bool {
    let trimmed = line.trim();
    if !trimmed.contains('|') || !trimmed.contains('-') {
        return false;
    }
    let inner = trimmed.trim_start_matches('|').trim_end_matches('|');
    inner
        .split('|')
        .all(|cell| RE_SEPARATOR_CELL.is_match(cell.trim()))
}

/// Split a pipe row into cell texts, honouring `\|` escapes.
pub fn split_table_row(line: &str) -> Vec<String> {
    let mut row = line.trim();
    if let Some(stripped) = row.strip_prefix('|') {
        row = stripped;
    }
    if let Some(stripped) = row.strip_suffix('|') {
        if !stripped.ends_with('\\') {
            row = stripped;
        }
    }

    let mut cells = Vec::new();
    let mut current = String::new();
    let mut chars = row.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                current.push('|');
                chars.next();
            }
            '|' => cells.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cells.push(current);
    cells.iter().map(|c| inline_plain(c.trim())).collect()
}

/// Strip `<...>`, a trailing title and `./` from an image target.
fn clean_image_target(target: &str) -> String {
    let mut t = target.trim();
    if t.starts_with('<') && t.ends_with('>') && t.len() >= 2 {
        t = t[1..t.len() - 1].trim();
    }
    let t = RE_IMAGE_TITLE
        .captures(t)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(t);
    let t = t.replace('\\', "/");
    t.strip_prefix("./").unwrap_or(&t).to_string()
}

fn paragraph_node(text: &str) -> DocumentNode {
    DocumentNode::Paragraph {
        runs: parse_inline(text),
    }
}

/// Split text into runs on `**bold**`, `__bold__`, `*italic*` and
/// `***both***`. `<br>` becomes a line break inside the run.
pub fn parse_inline(text: &str) -> Vec<TextRun> {
    let text = RE_BR.replace_all(text, "\n");
    let mut runs = Vec::new();
    let mut last = 0;
    for caps in RE_EMPHASIS.captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            runs.push(TextRun::plain(&text[last..whole.start()]));
        }
        let (inner, bold, italic) = if let Some(m) = caps.get(1) {
            (m.as_str(), true, true)
        } else if let Some(m) = caps.get(2).or_else(|| caps.get(3)) {
            (m.as_str(), true, false)
        } else if let Some(m) = caps.get(4) {
            (m.as_str(), false, true)
        } else {
            continue;
        };
        runs.push(TextRun {
            text: inner.to_string(),
            bold,
            italic,
        });
        last = whole.end();
    }
    if last < text.len() {
        runs.push(TextRun::plain(&text[last..]));
    }
    if runs.is_empty() {
        runs.push(TextRun::plain(""));
    }
    runs
}

/// Inline text with emphasis markers removed.
pub fn inline_plain(text: &str) -> String {
    parse_inline(text)
        .into_iter()
        .map(|r| r.text)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headings(nodes: &[DocumentNode]) -> Vec<(u8, String)> {
        nodes
            .iter()
            .filter_map(|n| match n {
                DocumentNode::Heading { level, text } => Some((*level, text.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_headings_and_paragraphs() {
        let nodes = parse_markdown("# Title\n### Subsection\nText");
        assert_eq!(
            headings(&nodes),
            vec![(1, "Title".to_string()), (3, "Subsection".to_string())]
        );
        assert_eq!(nodes[2], DocumentNode::paragraph("Text"));
    }

    #[test]
    fn heading_closing_hashes_and_emphasis_stripped() {
        let nodes = parse_markdown("## **Results** ##");
        assert_eq!(headings(&nodes), vec![(2, "Results".to_string())]);
    }

    #[test]
    fn hash_without_space_is_paragraph() {
        let nodes = parse_markdown("#hashtag");
        assert_eq!(nodes, vec![DocumentNode::paragraph("#hashtag")]);
    }

    #[test]
    fn list_kinds_and_depths() {
        let md = "- one\n    - nested\n    - nested two\n- two\n1. first\n2) second";
        let items: Vec<(u8, bool, String)> = parse_markdown(md)
            .into_iter()
            .filter_map(|n| match n {
                DocumentNode::ListItem {
                    depth,
                    ordered,
                    text,
                    ..
                } => Some((depth, ordered, text)),
                _ => None,
            })
            .collect();
        assert_eq!(
            items,
            vec![
                (0, false, "one".into()),
                (1, false, "nested".into()),
                (1, false, "nested two".into()),
                (0, false, "two".into()),
                (0, true, "first".into()),
                (0, true, "second".into()),
            ]
        );
    }

    #[test]
    fn jittery_indentation_stays_at_same_depth() {
        let mut indent = ListIndent::default();
        assert_eq!(indent.depth_for(0), 0);
        assert_eq!(indent.depth_for(3), 1);
        assert_eq!(indent.depth_for(4), 1);
        assert_eq!(indent.depth_for(2), 1);
        assert_eq!(indent.depth_for(8), 2);
        assert_eq!(indent.depth_for(1), 0);
    }

    #[test]
    fn table_detected_and_separators_skipped() {
        let md = "| A | B | C |\n|---|:---:|---|\n| 1 | 2 |\n| --- | --- |\n| 3 | 4 | 5 |\nAfter";
        let nodes = parse_markdown(md);
        let DocumentNode::Table(t) = &nodes[0] else {
            panic!("expected table, got {:?}", nodes[0]);
        };
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.rows[1].len(), 2);
        assert_eq!(nodes[1], DocumentNode::paragraph("After"));
    }

    #[test]
    fn pipe_without_separator_is_text() {
        let nodes = parse_markdown("a | b\nplain");
        assert_eq!(nodes[0], DocumentNode::paragraph("a | b"));
    }

    #[test]
    fn escaped_pipes_stay_in_cell() {
        assert_eq!(split_table_row(r"| a \| b | c |"), vec!["a | b", "c"]);
    }

    #[test]
    fn page_markers_and_rules() {
        let md = "<!-- Page 1 -->\n\nIntro\n\n---\n\n<!-- Page 2 -->\n\n12\n\nMore";
        let nodes = parse_markdown(md);
        assert_eq!(
            nodes,
            vec![
                DocumentNode::PageBreak { page: 1 },
                DocumentNode::paragraph("Intro"),
                DocumentNode::PageBreak { page: 2 },
                DocumentNode::paragraph("More"),
            ]
        );
    }

    #[test]
    fn images_carry_page_and_caption_seed() {
        let md = "<!-- Page 3 -->\nSee ![Figure of cells](./extracted_images/img-0.jpeg \"t\") below";
        let nodes = parse_markdown(md);
        assert_eq!(nodes[1], DocumentNode::paragraph("See"));
        let DocumentNode::Image(img) = &nodes[2] else {
            panic!("expected image");
        };
        assert_eq!(img.src, "extracted_images/img-0.jpeg");
        assert_eq!(img.caption.as_deref(), Some("Figure of cells"));
        assert_eq!(img.page, 3);
        assert_eq!(nodes[3], DocumentNode::paragraph("below"));
    }

    #[test]
    fn inline_emphasis_runs() {
        let runs = parse_inline("a **b** *c* ***d***");
        assert_eq!(runs.len(), 6);
        assert!(runs[1].bold && !runs[1].italic);
        assert!(runs[3].italic && !runs[3].bold);
        assert!(runs[5].bold && runs[5].italic);
    }

    #[test]
    fn fenced_code_is_kept_as_text() {
        let nodes = parse_markdown("```\n# not a heading\n```\n# Real");
        assert_eq!(nodes[0], DocumentNode::paragraph("# not a heading"));
        assert_eq!(headings(&nodes), vec![(1, "Real".to_string())]);
    }
}
