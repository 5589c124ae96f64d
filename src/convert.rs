//! Conversion entry points.
//!
//! [`compile_markdown`] is the pure core: text in, `.docx` bytes out, no
//! file-system writes. [`convert`] adds reading the input file, and
//! [`convert_to_file`] adds an atomic write of the result.
//!
//! Everything here is synchronous. Batch callers run files in parallel on
//! a blocking thread pool (see the `md2docx` binary).

use crate::config::ConversionConfig;
use crate::error::Md2DocxError;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::{alt_text, clean, emit, input, normalize, package, parse};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Compile Markdown text into a DOCX container.
///
/// # Arguments
/// * `text` — OCR Markdown
/// * `base_dir` — directory image references are resolved against
/// * `title` — document title for `docProps/core.xml`
/// * `config` — conversion configuration
///
/// # Errors
/// Only [`Md2DocxError::EmissionFailed`]: parsing, normalisation and alt
/// text never fail; degraded images are reported in
/// [`ConversionOutput::warnings`].
pub fn compile_markdown(
    text: &str,
    base_dir: &Path,
    title: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2DocxError> {
    let start = Instant::now();

    // ── Step 1: Pre-clean ────────────────────────────────────────────────
    let cleaned = clean::clean_ocr_text(text, config.clean_latex);

    // ── Step 2: Parse ────────────────────────────────────────────────────
    let mut nodes = parse::parse_markdown(&cleaned);
    debug!("Parsed {} nodes", nodes.len());

    // ── Step 3: Normalise ────────────────────────────────────────────────
    normalize::normalize(&mut nodes, config);

    // ── Step 4: Alt text ─────────────────────────────────────────────────
    let warnings = alt_text::resolve_alt_text(&mut nodes, base_dir, config);

    // ── Step 5: Emit + package ───────────────────────────────────────────
    let emission_failed = |detail: String| Md2DocxError::EmissionFailed {
        path: PathBuf::from(title),
        detail,
    };
    let emitted =
        emit::emit_document(&nodes, config).map_err(|e| emission_failed(e.to_string()))?;
    let metadata = package::DocumentMetadata::new(title);
    let docx = package::build_docx(&emitted, &metadata, &config.styles)
        .map_err(|e| emission_failed(e.to_string()))?;

    let mut stats = ConversionStats::from_nodes(&nodes);
    stats.docx_bytes = docx.len();
    stats.duration_ms = start.elapsed().as_millis() as u64;

    Ok(ConversionOutput {
        nodes,
        docx,
        warnings,
        stats,
    })
}

/// Read a Markdown file and compile it.
///
/// Images are resolved relative to the file's directory and the document
/// title is the title-cased file stem.
pub fn convert(
    input_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2DocxError> {
    let input_path = input_path.as_ref();
    info!("Starting conversion: {}", input_path.display());

    let md = input::read_markdown(input_path)?;
    let title = input::title_from_path(&md.path);
    let output = compile_markdown(&md.text, &md.base_dir, &title, config).map_err(|e| match e {
        Md2DocxError::EmissionFailed { detail, .. } => Md2DocxError::EmissionFailed {
            path: input_path.to_path_buf(),
            detail,
        },
        other => other,
    })?;

    info!(
        "Conversion complete: {} nodes, {} image(s), {} warning(s), {}ms",
        output.nodes.len(),
        output.stats.images,
        output.warnings.len(),
        output.stats.duration_ms
    );
    Ok(output)
}

/// Convert a Markdown file and write the `.docx` next to it (or to
/// `output_path`).
///
/// The container is written to a temporary file in the destination
/// directory and renamed into place, so a failure never leaves a partial
/// file and never clobbers a previous output.
pub fn convert_to_file(
    input_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Md2DocxError> {
    let output = convert(input_path, config)?;
    let path = output_path.as_ref();
    write_atomic(path, &output.docx)?;
    info!("Wrote {} ({} bytes)", path.display(), output.docx.len());
    Ok(output)
}

/// Default output path: the input with a `.docx` extension.
pub fn default_output_path(input_path: &Path) -> PathBuf {
    input_path.with_extension("docx")
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), Md2DocxError> {
    let write_err = |source: std::io::Error| Md2DocxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".md2docx-")
        .suffix(".docx.tmp")
        .tempfile_in(&parent)
        .map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    // On error the temporary file is deleted when `PersistError` drops.
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_replaces_extension() {
        assert_eq!(
            default_output_path(Path::new("/tmp/paper.md")),
            PathBuf::from("/tmp/paper.docx")
        );
    }

    #[test]
    fn compile_returns_zip_bytes() {
        let out = compile_markdown(
            "# Title\nText",
            Path::new("."),
            "Title",
            &ConversionConfig::default(),
        )
        .unwrap();
        assert_eq!(&out.docx[..2], b"PK");
        assert_eq!(out.stats.headings, 1);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.docx");
        write_atomic(&target, b"PK-data").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("out.docx")]);
    }

    #[test]
    fn unwritable_destination_keeps_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.docx");
        std::fs::write(&target, b"previous").unwrap();
        // A file where the parent directory should be.
        let blocked = dir.path().join("file-not-dir");
        std::fs::write(&blocked, b"x").unwrap();
        let err = write_atomic(&blocked.join("out.docx"), b"new").unwrap_err();
        assert!(matches!(err, Md2DocxError::OutputWriteFailed { .. }));
        assert_eq!(std::fs::read(&target).unwrap(), b"previous");
    }
}
