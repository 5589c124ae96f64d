//! Structural normaliser: repair parsed nodes for assistive technology.
//!
//! Passes run in a fixed order over the node sequence, in place:
//!
//! 1. [`normalize_author_grid`] — first-page author layout → reading order
//!    (needs page breaks to find the first page, so it runs first)
//! 2. [`apply_page_break_policy`] — drop OCR page sentinels unless preserved
//! 3. [`repair_heading_levels`] — no skipped heading levels
//! 4. [`infer_lists`] — group list items into logical lists
//! 5. [`crate::pipeline::table::structure_table`] on every table
//!
//! None of the passes alter text content; they only reorder, regroup or
//! relabel it. Every pass is idempotent.

use crate::config::ConversionConfig;
use crate::model::{AuthorGridBlock, DocumentNode, TableBlock, TableCell};
use crate::pipeline::table::structure_table;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use tracing::debug;

/// Lines at least this long are body text, not author/affiliation lines.
pub const SHORT_LINE_MAX: usize = 80;
/// Minimum number of short lines for a run to count as an author block.
pub const MIN_GRID_LINES: usize = 2;

static RE_WIDE_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+| {3,}").unwrap());
static RE_NAME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}[\p{L}'`\-.]*").unwrap());
static RE_EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap());
static RE_AFFILIATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(univ\w*|institut\w*|laborator\w*|college|school|department|dept|faculty|labs?|cent(er|re)|academy|hospital|inc|corp|ltd|gmbh)\b",
    )
    .unwrap()
});

/// Run every normalisation pass.
pub fn normalize(nodes: &mut Vec<DocumentNode>, config: &ConversionConfig) {
    if config.author_grid && normalize_author_grid(nodes) {
        debug!("Collapsed first-page author grid into reading order");
    }
    apply_page_break_policy(nodes, config.preserve_page_breaks);
    repair_heading_levels(nodes);
    infer_lists(nodes);
    for node in nodes.iter_mut() {
        if let DocumentNode::Table(table) = node {
            structure_table(table);
        }
    }
}

// ── Page breaks ──────────────────────────────────────────────────────────────

/// Keep or drop every [`DocumentNode::PageBreak`].
pub fn apply_page_break_policy(nodes: &mut Vec<DocumentNode>, preserve: bool) {
    if !preserve {
        nodes.retain(|n| !matches!(n, DocumentNode::PageBreak { .. }));
    }
}

// ── Headings ─────────────────────────────────────────────────────────────────

/// Promote any heading that sits more than one level below its predecessor.
///
/// The start of the document counts as level 0, so the first heading
/// becomes H1 at most.
pub fn repair_heading_levels(nodes: &mut [DocumentNode]) {
    let mut previous = 0u8;
    for node in nodes.iter_mut() {
        if let DocumentNode::Heading { level, .. } = node {
            let repaired = (*level).clamp(1, previous + 1);
            if repaired != *level {
                debug!("Heading level {} promoted to {}", level, repaired);
                *level = repaired;
            }
            previous = repaired;
        }
    }
}

// ── Lists ────────────────────────────────────────────────────────────────────

/// Assign `list_id`s: consecutive items sharing depth and kind form one list.
///
/// Deeper items nest without ending the enclosing list, a change of kind at
/// the same depth starts a new list, and any non-list node ends all open
/// lists. Depths are clamped so they never skip a level.
pub fn infer_lists(nodes: &mut [DocumentNode]) {
    let mut next_id = 0usize;
    // Open list per depth: (ordered, list_id).
    let mut open: Vec<(bool, usize)> = Vec::new();

    for node in nodes.iter_mut() {
        let DocumentNode::ListItem {
            depth,
            ordered,
            list_id,
            ..
        } = node
        else {
            open.clear();
            continue;
        };

        let d = usize::from(*depth).min(open.len());
        *depth = d as u8;
        open.truncate(d + 1);
        match open.get(d) {
            Some(&(kind, id)) if kind == *ordered => *list_id = id,
            _ => {
                next_id += 1;
                open.truncate(d);
                open.push((*ordered, next_id));
                *list_id = next_id;
            }
        }
    }
}

// ── Author grid ──────────────────────────────────────────────────────────────

/// Detect a first-page author grid and replace it with linear paragraphs.
///
/// Returns true when the sequence changed.
pub fn normalize_author_grid(nodes: &mut Vec<DocumentNode>) -> bool {
    let Some((range, grid)) = detect_author_grid(nodes) else {
        return false;
    };
    if grid.columns.len() < 2 {
        // A single column is already in reading order.
        return false;
    }
    let replacement: Vec<DocumentNode> = linearize_author_grid(&grid);
    let _ = nodes.splice(range, replacement);
    true
}

/// One paragraph per author line, column by column.
pub fn linearize_author_grid(grid: &AuthorGridBlock) -> Vec<DocumentNode> {
    grid.reading_order()
        .into_iter()
        .map(DocumentNode::paragraph)
        .collect()
}

/// Find the run of short author/affiliation lines between the title heading
/// and the first substantial paragraph on the first page.
///
/// Returns the node range and the grid, with one column per author. Plain
/// stacked lines form a single column; layout tables and gap-separated lines
/// contribute one column per visual column.
pub fn detect_author_grid(nodes: &[DocumentNode]) -> Option<(Range<usize>, AuthorGridBlock)> {
    let first_page_end = first_page_end(nodes);
    let title_idx = nodes[..first_page_end]
        .iter()
        .position(|n| matches!(n, DocumentNode::Heading { .. }))?;

    let start = title_idx + 1;
    let mut end = start;
    let mut columns: Vec<Vec<String>> = Vec::new();
    let mut stacked: Vec<String> = Vec::new();
    let mut gap_band: Vec<Vec<String>> = Vec::new();
    let mut line_count = 0usize;

    while end < first_page_end {
        match &nodes[end] {
            DocumentNode::Paragraph { .. } => {
                let text = nodes[end].plain_text();
                if is_abstract_marker(&text) {
                    break;
                }
                let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
                if lines.is_empty() || lines.iter().any(|l| l.chars().count() >= SHORT_LINE_MAX) {
                    break;
                }
                for line in lines {
                    line_count += 1;
                    let segments = split_wide_gaps(line);
                    let multi = segments.len() > 1;
                    if multi && segments.iter().any(|s| looks_numeric(s)) {
                        // Gap-aligned figures are a data table, not authors.
                        return None;
                    }
                    let opens_band = multi && segments.iter().all(|s| looks_like_author_name(s));
                    if opens_band || (multi && !gap_band.is_empty()) {
                        flush_stacked(&mut stacked, &mut columns);
                        add_band_row(&mut gap_band, &segments);
                    } else {
                        columns.append(&mut gap_band);
                        stacked.push(line.to_string());
                    }
                }
            }
            DocumentNode::Table(table) if is_layout_table(table) => {
                flush_stacked(&mut stacked, &mut columns);
                columns.append(&mut gap_band);
                let table_columns = table_columns(table);
                line_count += table_columns.iter().map(Vec::len).sum::<usize>();
                columns.extend(table_columns);
            }
            _ => break,
        }
        end += 1;
    }
    flush_stacked(&mut stacked, &mut columns);
    columns.append(&mut gap_band);

    if line_count < MIN_GRID_LINES || end == start {
        return None;
    }
    Some((start..end, AuthorGridBlock { columns }))
}

/// Index just past the first page: the first page sentinel that follows
/// some content, or the end of the sequence.
fn first_page_end(nodes: &[DocumentNode]) -> usize {
    let mut seen_content = false;
    for (i, node) in nodes.iter().enumerate() {
        match node {
            DocumentNode::PageBreak { .. } if seen_content => return i,
            DocumentNode::PageBreak { .. } => {}
            _ => seen_content = true,
        }
    }
    nodes.len()
}

fn flush_stacked(stacked: &mut Vec<String>, columns: &mut Vec<Vec<String>>) {
    if !stacked.is_empty() {
        columns.push(std::mem::take(stacked));
    }
}

fn add_band_row(band: &mut Vec<Vec<String>>, segments: &[String]) {
    if band.len() < segments.len() {
        band.resize_with(segments.len(), Vec::new);
    }
    for (col, seg) in segments.iter().enumerate() {
        band[col].push(seg.clone());
    }
}

fn split_wide_gaps(line: &str) -> Vec<String> {
    RE_WIDE_GAP
        .split(line)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Columns of a layout table, each cell split on its line breaks.
fn table_columns(table: &TableBlock) -> Vec<Vec<String>> {
    let width = table.column_count();
    (0..width)
        .map(|col| {
            table
                .rows
                .iter()
                .filter_map(|row| row.get(col))
                .flat_map(|cell| cell.text.lines().map(str::trim).map(str::to_string).collect::<Vec<_>>())
                .filter(|l| !l.is_empty())
                .collect::<Vec<String>>()
        })
        .filter(|c| !c.is_empty())
        .collect()
}

/// A table used for visual layout of authors rather than data: all cells
/// short, every populated header cell starting with a person's name, no
/// numeric cell, and at least one body cell carrying an affiliation or
/// e-mail address.
fn is_layout_table(table: &TableBlock) -> bool {
    let Some((header, body)) = table.rows.split_first() else {
        return false;
    };
    let all_lines: Vec<String> = table.rows.iter().flat_map(|r| cell_lines(r)).collect();
    if all_lines
        .iter()
        .any(|l| l.chars().count() >= SHORT_LINE_MAX || looks_numeric(l))
    {
        return false;
    }

    let mut populated = header.iter().filter(|c| !c.text.trim().is_empty()).peekable();
    let names = populated.peek().is_some()
        && populated.all(|c| c.text.lines().next().is_some_and(looks_like_author_name));
    let affiliated = body
        .iter()
        .flat_map(|r| cell_lines(r))
        .any(|l| looks_like_email(&l) || looks_like_affiliation(&l));
    names && affiliated
}

/// Non-empty lines of a row's cells, left to right.
fn cell_lines(cells: &[TableCell]) -> Vec<String> {
    cells
        .iter()
        .flat_map(|c| c.text.lines())
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// A cell or line holding a number rather than words: `10`, `2.5`,
/// `±0.3`, `12 %`.
fn looks_numeric(text: &str) -> bool {
    let t = text.trim();
    t.chars().any(|c| c.is_ascii_digit()) && !t.chars().any(char::is_alphabetic)
}

pub fn looks_like_email(text: &str) -> bool {
    RE_EMAIL.is_match(text)
}

/// Mentions an institution: `Univ. A`, `Department of Physics`, `MIT Media Lab`.
pub fn looks_like_affiliation(text: &str) -> bool {
    RE_AFFILIATION.is_match(text)
}

/// `Abstract`, `**Abstract**`, `Abstract:` or `Abstract — text…`.
fn is_abstract_marker(text: &str) -> bool {
    let t = text.trim().trim_start_matches(['*', '_', '#', ' ']);
    t.get(..8).is_some_and(|head| head.eq_ignore_ascii_case("abstract"))
}

/// Two to seven capitalised name tokens and no e-mail address.
pub fn looks_like_author_name(text: &str) -> bool {
    let t = text.trim();
    if t.is_empty() || t.contains('@') || t.chars().count() >= SHORT_LINE_MAX {
        return false;
    }
    let tokens: Vec<&str> = RE_NAME_TOKEN.find_iter(t).map(|m| m.as_str()).collect();
    (2..=7).contains(&tokens.len())
        && tokens
            .iter()
            .all(|tok| tok.chars().next().is_some_and(char::is_uppercase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CellKind;
    use crate::pipeline::parse::parse_markdown;

    fn normalized(md: &str, config: &ConversionConfig) -> Vec<DocumentNode> {
        let mut nodes = parse_markdown(md);
        normalize(&mut nodes, config);
        nodes
    }

    fn heading_levels(nodes: &[DocumentNode]) -> Vec<u8> {
        nodes
            .iter()
            .filter_map(|n| match n {
                DocumentNode::Heading { level, .. } => Some(*level),
                _ => None,
            })
            .collect()
    }

    fn paragraphs(nodes: &[DocumentNode]) -> Vec<String> {
        nodes
            .iter()
            .filter(|n| matches!(n, DocumentNode::Paragraph { .. }))
            .map(DocumentNode::plain_text)
            .collect()
    }

    #[test]
    fn heading_gap_promoted() {
        let nodes = normalized("# Title\n### Subsection\nText", &ConversionConfig::default());
        assert_eq!(
            nodes[..2],
            [
                DocumentNode::Heading {
                    level: 1,
                    text: "Title".into()
                },
                DocumentNode::Heading {
                    level: 2,
                    text: "Subsection".into()
                },
            ]
        );
    }

    #[test]
    fn heading_repair_uses_repaired_predecessor_and_is_idempotent() {
        let mut nodes = parse_markdown("## A\n#### B\n###### C\n## D\n# E\n### F");
        repair_heading_levels(&mut nodes);
        assert_eq!(heading_levels(&nodes), vec![1, 2, 3, 2, 1, 2]);
        let once = nodes.clone();
        repair_heading_levels(&mut nodes);
        assert_eq!(nodes, once);
    }

    #[test]
    fn repaired_levels_never_skip() {
        let mut nodes = parse_markdown("### a\n# b\n#### c\n## d\n###### e\n##### f");
        repair_heading_levels(&mut nodes);
        let levels = heading_levels(&nodes);
        let mut prev = 0u8;
        for level in levels {
            assert!(level <= prev + 1, "skipped from {prev} to {level}");
            prev = level;
        }
    }

    #[test]
    fn page_breaks_dropped_or_kept_exactly() {
        let md = "<!-- Page 1 -->\nA\n---\n<!-- Page 2 -->\nB\n---\n<!-- Page 3 -->\nC";
        let count = |nodes: &[DocumentNode]| {
            nodes
                .iter()
                .filter(|n| matches!(n, DocumentNode::PageBreak { .. }))
                .count()
        };
        let dropped = normalized(md, &ConversionConfig::default());
        assert_eq!(count(&dropped), 0);
        let kept = normalized(
            md,
            &ConversionConfig::builder().preserve_page_breaks(true).build().unwrap(),
        );
        assert_eq!(count(&kept), 3);
    }

    #[test]
    fn lists_grouped_by_depth_and_kind() {
        let mut nodes = parse_markdown("- a\n  - a1\n- b\n1. one\n2. two\nText\n- stray");
        infer_lists(&mut nodes);
        let ids: Vec<usize> = nodes
            .iter()
            .filter_map(|n| match n {
                DocumentNode::ListItem { list_id, .. } => Some(*list_id),
                _ => None,
            })
            .collect();
        // a, a1 (nested), b share the outer list; the ordered list is new;
        // the stray bullet after text is its own one-item list.
        assert_eq!(ids, vec![1, 2, 1, 3, 3, 4]);
        assert!(matches!(nodes[6], DocumentNode::ListItem { .. }));
    }

    #[test]
    fn list_depth_cannot_skip_levels() {
        let mut nodes = vec![DocumentNode::ListItem {
            depth: 3,
            ordered: false,
            text: "deep".into(),
            list_id: 0,
        }];
        infer_lists(&mut nodes);
        assert!(matches!(nodes[0], DocumentNode::ListItem { depth: 0, list_id: 1, .. }));
    }

    #[test]
    fn stacked_author_lines_stay_in_order() {
        let md = "# A Study\nJane Doe\nUniv. A\nJohn Smith\nUniv. B\n**Abstract**\nWe study things.";
        let nodes = normalized(md, &ConversionConfig::default());
        assert_eq!(
            paragraphs(&nodes)[..4],
            ["Jane Doe", "Univ. A", "John Smith", "Univ. B"]
        );
        let (range, grid) = detect_author_grid(&parse_markdown(md)).unwrap();
        assert_eq!(range, 1..5);
        assert_eq!(grid.columns.len(), 1);
    }

    #[test]
    fn layout_table_collapsed_column_by_column() {
        let md = "# A Study\n| Jane Doe | John Smith |\n| --- | --- |\n| Univ. A | Univ. B |\nAbstract: text";
        let nodes = normalized(md, &ConversionConfig::default());
        assert!(!nodes.iter().any(|n| matches!(n, DocumentNode::Table(_))));
        assert_eq!(
            paragraphs(&nodes),
            vec!["Jane Doe", "Univ. A", "John Smith", "Univ. B", "Abstract: text"]
        );
    }

    #[test]
    fn gap_separated_author_line_collapsed() {
        let md = "# A Study\nJane Doe      John Smith\nUniv. A      Univ. B\n\nA long body paragraph that clearly is not an author line because it keeps going on and on.";
        let nodes = normalized(md, &ConversionConfig::default());
        assert_eq!(
            paragraphs(&nodes)[..4],
            ["Jane Doe", "Univ. A", "John Smith", "Univ. B"]
        );
    }

    #[test]
    fn gapped_author_line_with_affiliation_marks_after_cleaning() {
        let md = "# A Study\nJane Doe$^{1}$      John Smith$^{2}$\nUniv. A      Univ. B\n\nA long body paragraph that clearly is not an author line because it keeps going on and on.";
        let cleaned = crate::pipeline::clean::clean_ocr_text(md, true);
        let nodes = normalized(&cleaned, &ConversionConfig::default());
        assert_eq!(
            paragraphs(&nodes)[..4],
            ["Jane Doe¹", "Univ. A", "John Smith²", "Univ. B"]
        );
    }

    #[test]
    fn title_case_data_table_after_title_is_kept() {
        let md = "# Results Overview\n| Sample Size | Mean Value |\n|---|---|\n| 10 | 2.5 |\n| 20 | 3.1 |\nA long body paragraph that clearly is not an author line because it keeps going on and on.";
        let nodes = normalized(md, &ConversionConfig::default());
        let DocumentNode::Table(t) = &nodes[1] else {
            panic!("expected table, got {:?}", nodes[1]);
        };
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.header_row_index, 0);
        assert!(!paragraphs(&nodes).iter().any(|p| p == "Sample Size"));
    }

    #[test]
    fn title_case_table_without_affiliations_is_kept() {
        let md = "# Overview\n| Primary Outcome | Secondary Outcome |\n|---|---|\n| Mortality | Readmission |";
        let nodes = normalized(md, &ConversionConfig::default());
        assert!(matches!(nodes[1], DocumentNode::Table(_)));
    }

    #[test]
    fn gap_aligned_figures_are_not_an_author_grid() {
        let md = "# Results Overview\nSample Size      Mean Value\n10      2.5\n20      3.1";
        let mut nodes = parse_markdown(md);
        assert!(detect_author_grid(&nodes).is_none());
        let before = nodes.clone();
        assert!(!normalize_author_grid(&mut nodes));
        assert_eq!(nodes, before);
    }

    #[test]
    fn email_layout_table_collapsed() {
        let md = "# A Study\n| Jane Doe | John Smith |\n|---|---|\n| jane@a.edu | john@b.org |";
        let nodes = normalized(md, &ConversionConfig::default());
        assert_eq!(
            paragraphs(&nodes),
            vec!["Jane Doe", "jane@a.edu", "John Smith", "john@b.org"]
        );
    }

    #[test]
    fn affiliation_and_email_signals() {
        assert!(looks_like_affiliation("Univ. A"));
        assert!(looks_like_affiliation("Department of Physics"));
        assert!(looks_like_affiliation("MIT Media Lab"));
        assert!(!looks_like_affiliation("Mean Value"));
        assert!(!looks_like_affiliation("Incidence Rate"));
        assert!(looks_like_email("jane.doe@univ.edu"));
        assert!(!looks_like_email("Jane Doe"));
        assert!(looks_numeric("2.5"));
        assert!(looks_numeric("±0.3 %"));
        assert!(!looks_numeric("Jane Doe¹"));
    }

    #[test]
    fn author_grid_can_be_disabled() {
        let md = "# A Study\n| Jane Doe | John Smith |\n| --- | --- |\n| Univ. A | Univ. B |";
        let config = ConversionConfig::builder().author_grid(false).build().unwrap();
        let nodes = normalized(md, &config);
        assert!(matches!(nodes[1], DocumentNode::Table(_)));
    }

    #[test]
    fn data_table_after_title_is_not_an_author_grid() {
        let md = "# Results\n| Name | Score |\n| --- | --- |\n| A | 1 |";
        let nodes = normalized(md, &ConversionConfig::default());
        assert!(matches!(nodes[1], DocumentNode::Table(_)));
    }

    #[test]
    fn author_grid_only_on_first_page() {
        let md = "<!-- Page 1 -->\nIntro text\n<!-- Page 2 -->\n# Later\n| Jane Doe | John Smith |\n| --- | --- |\n| Univ. A | Univ. B |";
        let nodes = normalized(md, &ConversionConfig::default());
        assert!(nodes.iter().any(|n| matches!(n, DocumentNode::Table(_))));
    }

    #[test]
    fn tables_structured_during_normalize() {
        let nodes = normalized("| A | B | C |\n|---|---|---|\n| 1 | 2 |", &ConversionConfig::default());
        let DocumentNode::Table(t) = &nodes[0] else {
            panic!("expected table");
        };
        assert_eq!(t.rows.len(), 2);
        assert!(t.rows.iter().all(|r| r.len() == 3));
        assert_eq!(t.rows[1][2].kind, CellKind::Padding);
        assert_eq!(t.header_row_index, 0);
    }

    #[test]
    fn normalize_is_idempotent() {
        let md = "# T\n### S\n| Jane Doe | John Smith |\n|---|---|\n| U | V |\n- a\n  - b\n| A | B |\n|---|---|\n| 1 |";
        let config = ConversionConfig::default();
        let mut nodes = parse_markdown(md);
        normalize(&mut nodes, &config);
        let once = nodes.clone();
        normalize(&mut nodes, &config);
        assert_eq!(nodes, once);
    }

    #[test]
    fn author_name_heuristic() {
        assert!(looks_like_author_name("Jane Doe"));
        assert!(looks_like_author_name("María J. O'Neil"));
        assert!(!looks_like_author_name("jane@univ.edu"));
        assert!(!looks_like_author_name("Name"));
        assert!(!looks_like_author_name("the results of"));
    }
}
