//! Input loading: read an OCR Markdown file as UTF-8 text.
//!
//! The only fatal condition on the input side is a file that cannot be read
//! as text. Everything inside the text, however malformed, is handled by the
//! parser's degrade-to-paragraph rule.

use crate::error::Md2DocxError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File names that are never OCR output and are skipped by batch callers.
pub const DOCUMENTATION_FILES: [&str; 4] =
    ["readme.md", "changelog.md", "contributing.md", "license.md"];

/// A loaded Markdown input.
#[derive(Debug, Clone)]
pub struct MarkdownInput {
    pub path: PathBuf,
    /// Directory image references are resolved against.
    pub base_dir: PathBuf,
    pub text: String,
}

/// Read `path` as UTF-8 Markdown.
pub fn read_markdown(path: impl AsRef<Path>) -> Result<MarkdownInput, Md2DocxError> {
    let path = path.as_ref().to_path_buf();

    let bytes = std::fs::read(&path).map_err(|e| {
        let reason = match e.kind() {
            ErrorKind::NotFound => "file not found".to_string(),
            ErrorKind::PermissionDenied => format!("permission denied (try: chmod +r {path:?})"),
            _ => e.to_string(),
        };
        Md2DocxError::UnreadableInput {
            path: path.clone(),
            reason,
        }
    })?;

    let text = String::from_utf8(bytes).map_err(|e| Md2DocxError::UnreadableInput {
        path: path.clone(),
        reason: format!("not valid UTF-8 text ({e})"),
    })?;

    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    debug!("Read {} bytes of Markdown from {}", text.len(), path.display());
    Ok(MarkdownInput {
        path,
        base_dir,
        text,
    })
}

/// Whether a path names a project documentation file rather than OCR output.
pub fn is_documentation_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| DOCUMENTATION_FILES.contains(&n.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether a path has a `.md` extension (case-insensitive).
pub fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("md"))
        .unwrap_or(false)
}

/// Document title derived from a file stem: `my_paper-v2` → `My Paper V2`.
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Document");
    stem.replace(['_', '-'], " ")
        .split_whitespace()
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_utf8_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("doc.md");
        std::fs::write(&p, "# Title\n").unwrap();
        let input = read_markdown(&p).unwrap();
        assert_eq!(input.text, "# Title\n");
        assert_eq!(input.base_dir, dir.path());
    }

    #[test]
    fn missing_file_is_unreadable() {
        let err = read_markdown("/definitely/not/here.md").unwrap_err();
        assert!(matches!(err, Md2DocxError::UnreadableInput { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn invalid_utf8_is_unreadable() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0xff, 0xfe, 0x00, 0x80]).unwrap();
        let err = read_markdown(f.path()).unwrap_err();
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn documentation_and_extension_checks() {
        assert!(is_documentation_file(Path::new("docs/README.md")));
        assert!(!is_documentation_file(Path::new("paper.md")));
        assert!(is_markdown_file(Path::new("paper.MD")));
        assert!(!is_markdown_file(Path::new("paper.docx")));
    }

    #[test]
    fn title_is_title_cased() {
        assert_eq!(title_from_path(Path::new("/x/my_paper-FINAL.md")), "My Paper Final");
    }
}
