//! Pre-cleaning: deterministic cleanup of OCR-generated Markdown.
//!
//! OCR services emit artefacts that are harmless in a Markdown preview but
//! turn into noise once the text is read aloud by a screen reader:
//!
//! - Windows-style `\r\n` line endings
//! - invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! - HTML-escaped ampersands (`&amp;`)
//! - inline LaTeX for author superscripts and ORCID icons (`$^{1,2}$`, `$①$`)
//!
//! Each rule is a pure `&str → String` function, applied in a fixed order by
//! [`clean_ocr_text`].

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Apply all pre-cleaning rules.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode
/// 3. Decode `&amp;`
/// 4. Clean inline LaTeX notation (only when `clean_latex` is set)
pub fn clean_ocr_text(input: &str, clean_latex: bool) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = decode_ampersands(&s);
    if clean_latex {
        clean_latex_notation(&s)
    } else {
        s
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Decode escaped ampersands ───────────────────────────────────────

fn decode_ampersands(input: &str) -> String {
    input.replace("&amp;", "&")
}

// ── Rule 4: LaTeX notation ──────────────────────────────────────────────────
//
// Academic first pages come back from OCR with affiliations as
// `Jane Doe$^{1,2}$` and ORCID icons as `$①$`. Superscript affiliation
// markers become Unicode superscripts, icons are dropped, and any other
// inline math loses its dollar delimiters. Display math (`$$…$$`) is out of
// scope and left alone.

static RE_ORCID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$[①②③④⑤⑥⑦⑧⑨⑩]+\$\s*,?\s*").unwrap());
static RE_AFFILIATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\^\{([0-9,*]+)\}\$").unwrap());
static RE_SUPERSCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\^\{(.*?)\}\$").unwrap());
static RE_SUBSCRIPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$_\{(.*?)\}\$").unwrap());
static RE_INLINE_MATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$([^$\n]+)\$").unwrap());
static RE_DOUBLE_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

fn to_superscript(c: char) -> char {
    match c {
        '0' => '⁰',
        '1' => '¹',
        '2' => '²',
        '3' => '³',
        '4' => '⁴',
        '5' => '⁵',
        '6' => '⁶',
        '7' => '⁷',
        '8' => '⁸',
        '9' => '⁹',
        ',' => '˙',
        other => other,
    }
}

fn clean_latex_notation(input: &str) -> String {
    input
        .lines()
        .map(clean_latex_line)
        .collect::<Vec<_>>()
        .join("\n")
}

fn clean_latex_line(line: &str) -> String {
    // Lines without math, and display math, are kept verbatim.
    if !line.contains('$') || line.trim_start().starts_with("$$") {
        return line.to_string();
    }
    let s = RE_ORCID.replace_all(line, "");
    let s = RE_AFFILIATION.replace_all(&s, |caps: &Captures<'_>| {
        caps[1].chars().map(to_superscript).collect::<String>()
    });
    let s = RE_SUPERSCRIPT.replace_all(&s, "$1");
    let s = RE_SUBSCRIPT.replace_all(&s, "$1");
    let s = RE_INLINE_MATH.replace_all(&s, "$1");
    // Leading indentation carries list nesting; only collapse inner runs.
    // Runs of three or more spaces are column gaps in a side-by-side author
    // line and survive.
    let indent_len = s.len() - s.trim_start().len();
    let (indent, rest) = s.split_at(indent_len);
    let rest = RE_DOUBLE_SPACE.replace_all(rest, |caps: &Captures<'_>| {
        if caps[0].len() == 2 {
            " ".to_string()
        } else {
            caps[0].to_string()
        }
    });
    format!("{indent}{rest}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_decode_ampersands() {
        assert_eq!(decode_ampersands("R&amp;D"), "R&D");
    }

    #[test]
    fn test_affiliation_superscripts() {
        assert_eq!(clean_latex_line("Jane Doe$^{1,2}$"), "Jane Doe¹˙²");
    }

    #[test]
    fn test_orcid_icons_removed() {
        assert_eq!(clean_latex_line("John Smith $①$, Univ. B"), "John Smith Univ. B");
    }

    #[test]
    fn test_generic_math_unwrapped() {
        assert_eq!(clean_latex_line("CO$_{2}$ and $x^2$ values"), "CO2 and x^2 values");
    }

    #[test]
    fn test_display_math_untouched() {
        assert_eq!(clean_latex_line("$$E = mc^2$$"), "$$E = mc^2$$");
    }

    #[test]
    fn test_indentation_preserved() {
        assert_eq!(clean_latex_line("    - nested $x$  item"), "    - nested x item");
    }

    #[test]
    fn test_layout_gaps_without_math_untouched() {
        assert_eq!(clean_latex_line("Jane Doe      John Smith"), "Jane Doe      John Smith");
    }

    #[test]
    fn test_column_gaps_kept_on_math_lines() {
        assert_eq!(
            clean_latex_line("Jane Doe$^{1}$      John Smith$^{2}$"),
            "Jane Doe¹      John Smith²"
        );
        assert_eq!(clean_latex_line("a $x$\tb  c"), "a x\tb c");
    }

    #[test]
    fn test_latex_cleanup_can_be_disabled() {
        let raw = "Jane Doe$^{1}$\r\n";
        assert_eq!(clean_ocr_text(raw, false), "Jane Doe$^{1}$\n");
        assert_eq!(clean_ocr_text(raw, true), "Jane Doe¹");
    }
}
