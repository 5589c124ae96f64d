//! DOCX container: wrap an [`EmittedDocument`] in the OPC zip package.
//!
//! The whole container is built in memory. Writing it to disk is the
//! caller's job (see [`crate::convert::convert_to_file`]), so a failure
//! here can never leave a partial file behind.

use crate::pipeline::emit::{EmittedDocument, NumberingInstance, NS_MAIN};
use crate::pipeline::xml::{self, empty, text_element, xml_safe, XmlWriter};
use crate::styles::StyleMapping;
use quick_xml::writer::ElementWriter;
use std::collections::HashSet;
use std::io::{self, Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// Heading point sizes (half-points) for levels 1–6.
const HEADING_SIZES: [u32; 6] = [32, 28, 26, 24, 22, 22];
/// Deepest list level a numbering definition describes.
const LIST_LEVELS: usize = 9;

/// Document-level properties written to `docProps/core.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub subject: String,
    pub creator: String,
    pub language: String,
}

impl DocumentMetadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            subject: "Accessible Document".to_string(),
            creator: "md2docx".to_string(),
            language: "en-US".to_string(),
        }
    }
}

/// Assemble the `.docx` bytes.
pub fn build_docx(
    doc: &EmittedDocument,
    meta: &DocumentMetadata,
    styles: &StyleMapping,
) -> zip::result::ZipResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let parts: [(&str, String); 9] = [
        ("[Content_Types].xml", content_types_xml()?),
        ("_rels/.rels", package_rels_xml()?),
        ("docProps/core.xml", core_xml(meta)?),
        ("docProps/app.xml", app_xml()?),
        ("word/document.xml", doc.document_xml.clone()),
        ("word/styles.xml", styles_xml(styles, &meta.language)?),
        ("word/numbering.xml", numbering_xml(&doc.numbering)?),
        ("word/settings.xml", settings_xml()?),
        ("word/_rels/document.xml.rels", document_rels_xml(doc)?),
    ];
    for (name, xml) in &parts {
        zip.start_file(*name, options)?;
        zip.write_all(xml.as_bytes())?;
    }

    // Already-compressed image formats gain nothing from deflate.
    let stored = options.compression_method(CompressionMethod::Stored);
    for media in &doc.media {
        zip.start_file(format!("word/media/{}", media.name), stored)?;
        zip.write_all(&media.bytes)?;
    }

    let bytes = zip.finish()?.into_inner();
    debug!(
        "Packaged DOCX: {} bytes, {} media file(s)",
        bytes.len(),
        doc.media.len()
    );
    Ok(bytes)
}

fn content_types_xml() -> io::Result<String> {
    const WML: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml";
    const DEFAULTS: [(&str, &str); 5] = [
        ("rels", "application/vnd.openxmlformats-package.relationships+xml"),
        ("xml", "application/xml"),
        ("png", "image/png"),
        ("jpeg", "image/jpeg"),
        ("gif", "image/gif"),
    ];
    let overrides = [
        ("/word/document.xml", format!("{WML}.document.main+xml")),
        ("/word/styles.xml", format!("{WML}.styles+xml")),
        ("/word/numbering.xml", format!("{WML}.numbering+xml")),
        ("/word/settings.xml", format!("{WML}.settings+xml")),
        (
            "/docProps/core.xml",
            "application/vnd.openxmlformats-package.core-properties+xml".to_string(),
        ),
        (
            "/docProps/app.xml",
            "application/vnd.openxmlformats-officedocument.extended-properties+xml".to_string(),
        ),
    ];
    xml::part(|w| {
        w.create_element("Types")
            .with_attribute(("xmlns", NS_CONTENT_TYPES))
            .write_inner_content(|w| {
                for (ext, ty) in DEFAULTS {
                    empty(w, "Default", &[("Extension", ext), ("ContentType", ty)])?;
                }
                for (name, ty) in &overrides {
                    empty(w, "Override", &[("PartName", *name), ("ContentType", ty.as_str())])?;
                }
                Ok(())
            })?;
        Ok(())
    })
}

/// `<Relationships>` with `(id, type, target)` entries.
fn relationships_xml(rels: &[(String, String, String)]) -> io::Result<String> {
    xml::part(|w| {
        w.create_element("Relationships")
            .with_attribute(("xmlns", NS_PKG_REL))
            .write_inner_content(|w| {
                for (id, ty, target) in rels {
                    empty(
                        w,
                        "Relationship",
                        &[("Id", id.as_str()), ("Type", ty.as_str()), ("Target", target.as_str())],
                    )?;
                }
                Ok(())
            })?;
        Ok(())
    })
}

fn rel(id: &str, ty: &str, target: &str) -> (String, String, String) {
    (id.to_string(), ty.to_string(), target.to_string())
}

fn package_rels_xml() -> io::Result<String> {
    relationships_xml(&[
        rel("rId1", &format!("{REL_BASE}/officeDocument"), "word/document.xml"),
        rel(
            "rId2",
            "http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties",
            "docProps/core.xml",
        ),
        rel("rId3", &format!("{REL_BASE}/extended-properties"), "docProps/app.xml"),
    ])
}

fn document_rels_xml(doc: &EmittedDocument) -> io::Result<String> {
    let mut rels = vec![
        rel("rId1", &format!("{REL_BASE}/styles"), "styles.xml"),
        rel("rId2", &format!("{REL_BASE}/numbering"), "numbering.xml"),
        rel("rId3", &format!("{REL_BASE}/settings"), "settings.xml"),
    ];
    for media in &doc.media {
        rels.push(rel(
            &media.rel_id,
            &format!("{REL_BASE}/image"),
            &format!("media/{}", media.name),
        ));
    }
    relationships_xml(&rels)
}

fn core_xml(meta: &DocumentMetadata) -> io::Result<String> {
    xml::part(|w| {
        w.create_element("cp:coreProperties")
            .with_attributes([
                (
                    "xmlns:cp",
                    "http://schemas.openxmlformats.org/package/2006/metadata/core-properties",
                ),
                ("xmlns:dc", "http://purl.org/dc/elements/1.1/"),
                ("xmlns:dcterms", "http://purl.org/dc/terms/"),
                ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ])
            .write_inner_content(|w| {
                text_element(w, "dc:title", &meta.title)?;
                text_element(w, "dc:subject", &meta.subject)?;
                text_element(w, "dc:creator", &meta.creator)?;
                text_element(w, "dc:language", &meta.language)
            })?;
        Ok(())
    })
}

fn app_xml() -> io::Result<String> {
    xml::part(|w| {
        w.create_element("Properties")
            .with_attribute((
                "xmlns",
                "http://schemas.openxmlformats.org/officeDocument/2006/extended-properties",
            ))
            .write_inner_content(|w| {
                let app = format!("edgequake-md2docx {}", env!("CARGO_PKG_VERSION"));
                text_element(w, "Application", &app)
            })?;
        Ok(())
    })
}

fn settings_xml() -> io::Result<String> {
    xml::part(|w| {
        w.create_element("w:settings")
            .with_attribute(("xmlns:w", NS_MAIN))
            .write_inner_content(|w| {
                empty(w, "w:defaultTabStop", &[("w:val", "720")])?;
                w.create_element("w:compat").write_inner_content(|w| {
                    empty(
                        w,
                        "w:compatSetting",
                        &[
                            ("w:name", "compatibilityMode"),
                            ("w:uri", "http://schemas.microsoft.com/office/word"),
                            ("w:val", "15"),
                        ],
                    )
                })?;
                Ok(())
            })?;
        Ok(())
    })
}

// ── styles.xml ───────────────────────────────────────────────────────────────

/// Style definitions for every id in the mapping.
///
/// Headings are black, bold and carry their outline level, which is what
/// navigation panes and screen readers use to build the document outline.
fn styles_xml(styles: &StyleMapping, language: &str) -> io::Result<String> {
    xml::part(|w| {
        w.create_element("w:styles")
            .with_attribute(("xmlns:w", NS_MAIN))
            .write_inner_content(|w| {
                write_doc_defaults(w, language)?;
                write_style_definitions(w, styles)
            })?;
        Ok(())
    })
}

fn write_doc_defaults(w: &mut XmlWriter, language: &str) -> io::Result<()> {
    w.create_element("w:docDefaults").write_inner_content(|w| {
        w.create_element("w:rPrDefault").write_inner_content(|w| {
            w.create_element("w:rPr").write_inner_content(|w| {
                empty(
                    w,
                    "w:rFonts",
                    &[
                        ("w:ascii", "Calibri"),
                        ("w:hAnsi", "Calibri"),
                        ("w:eastAsia", "Calibri"),
                        ("w:cs", "Calibri"),
                    ],
                )?;
                empty(w, "w:sz", &[("w:val", "22")])?;
                empty(w, "w:szCs", &[("w:val", "22")])?;
                empty(w, "w:lang", &[("w:val", &*xml_safe(language))])
            })?;
            Ok(())
        })?;
        w.create_element("w:pPrDefault").write_inner_content(|w| {
            w.create_element("w:pPr").write_inner_content(|w| {
                empty(
                    w,
                    "w:spacing",
                    &[("w:after", "160"), ("w:line", "259"), ("w:lineRule", "auto")],
                )
            })?;
            Ok(())
        })?;
        Ok(())
    })?;
    Ok(())
}

/// Paragraph-level formatting of a simple derived style.
#[derive(Clone, Copy)]
enum Layout {
    Contextual,
    Centered,
    Tight,
}

fn write_style_definitions(w: &mut XmlWriter, styles: &StyleMapping) -> io::Result<()> {
    let mut defined = HashSet::new();
    let normal = xml_safe(&styles.paragraph);
    let normal = normal.as_ref();

    // Style ids may repeat across node kinds; each is defined once.
    if defined.insert(styles.paragraph.as_str()) {
        style_element(w, "paragraph", normal, true).write_inner_content(|w| {
            empty(w, "w:name", &[("w:val", "Normal")])?;
            empty(w, "w:qFormat", &[])
        })?;
    }

    for (i, id) in styles.headings.iter().enumerate() {
        if !defined.insert(id.as_str()) {
            continue;
        }
        let name = format!("heading {}", i + 1);
        let outline = i.to_string();
        let size = HEADING_SIZES[i].to_string();
        style_element(w, "paragraph", &xml_safe(id), false).write_inner_content(|w| {
            empty(w, "w:name", &[("w:val", name.as_str())])?;
            empty(w, "w:basedOn", &[("w:val", normal)])?;
            empty(w, "w:next", &[("w:val", normal)])?;
            empty(w, "w:qFormat", &[])?;
            w.create_element("w:pPr").write_inner_content(|w| {
                empty(w, "w:keepNext", &[])?;
                empty(w, "w:spacing", &[("w:before", "240"), ("w:after", "120")])?;
                empty(w, "w:outlineLvl", &[("w:val", outline.as_str())])
            })?;
            w.create_element("w:rPr").write_inner_content(|w| {
                empty(w, "w:b", &[])?;
                empty(w, "w:color", &[("w:val", "000000")])?;
                empty(w, "w:sz", &[("w:val", size.as_str())])?;
                empty(w, "w:szCs", &[("w:val", size.as_str())])
            })?;
            Ok(())
        })?;
    }

    let derived = [
        (&styles.list_bullet, "List Bullet", Layout::Contextual, false),
        (&styles.list_number, "List Number", Layout::Contextual, false),
        (&styles.image, "Figure", Layout::Centered, false),
        (&styles.image_placeholder, "Caption", Layout::Centered, true),
        (&styles.author, "Author", Layout::Tight, false),
    ];
    for (id, name, layout, italic) in derived {
        if !defined.insert(id.as_str()) {
            continue;
        }
        style_element(w, "paragraph", &xml_safe(id), false).write_inner_content(|w| {
            empty(w, "w:name", &[("w:val", name)])?;
            empty(w, "w:basedOn", &[("w:val", normal)])?;
            w.create_element("w:pPr").write_inner_content(|w| match layout {
                Layout::Contextual => empty(w, "w:contextualSpacing", &[]),
                Layout::Centered => empty(w, "w:jc", &[("w:val", "center")]),
                Layout::Tight => empty(w, "w:spacing", &[("w:after", "0")]),
            })?;
            w.create_element("w:rPr").write_inner_content(|w| {
                if italic {
                    empty(w, "w:i", &[])?;
                }
                Ok(())
            })?;
            Ok(())
        })?;
    }

    if defined.insert(styles.table.as_str()) {
        style_element(w, "table", &xml_safe(&styles.table), false).write_inner_content(|w| {
            empty(w, "w:name", &[("w:val", "Table Grid")])?;
            w.create_element("w:tblPr").write_inner_content(|w| {
                w.create_element("w:tblBorders").write_inner_content(|w| {
                    for side in ["w:top", "w:left", "w:bottom", "w:right", "w:insideH", "w:insideV"] {
                        empty(
                            w,
                            side,
                            &[
                                ("w:val", "single"),
                                ("w:sz", "4"),
                                ("w:space", "0"),
                                ("w:color", "000000"),
                            ],
                        )?;
                    }
                    Ok(())
                })?;
                Ok(())
            })?;
            w.create_element("w:tblStylePr")
                .with_attribute(("w:type", "firstRow"))
                .write_inner_content(|w| {
                    w.create_element("w:rPr")
                        .write_inner_content(|w| empty(w, "w:b", &[]))?;
                    Ok(())
                })?;
            Ok(())
        })?;
    }
    Ok(())
}

/// `<w:style>` start for `id`; the caller writes the body.
fn style_element<'w>(
    w: &'w mut XmlWriter,
    kind: &str,
    id: &str,
    default: bool,
) -> ElementWriter<'w, Vec<u8>> {
    let el = w.create_element("w:style").with_attribute(("w:type", kind));
    let el = if default {
        el.with_attribute(("w:default", "1"))
    } else {
        el
    };
    el.with_attribute(("w:styleId", id))
}

// ── numbering.xml ────────────────────────────────────────────────────────────

const BULLET_ABSTRACT_ID: usize = 0;
const ORDERED_ABSTRACT_ID: usize = 1;

fn numbering_xml(instances: &[NumberingInstance]) -> io::Result<String> {
    const BULLETS: [&str; 3] = ["•", "◦", "▪"];
    const FORMATS: [&str; 3] = ["decimal", "lowerLetter", "lowerRoman"];

    xml::part(|w| {
        w.create_element("w:numbering")
            .with_attribute(("xmlns:w", NS_MAIN))
            .write_inner_content(|w| {
                abstract_num(w, BULLET_ABSTRACT_ID, |ilvl| {
                    ("bullet", BULLETS[ilvl % BULLETS.len()].to_string())
                })?;
                abstract_num(w, ORDERED_ABSTRACT_ID, |ilvl| {
                    (FORMATS[ilvl % FORMATS.len()], format!("%{}.", ilvl + 1))
                })?;

                for n in instances {
                    let abstract_id = if n.ordered {
                        ORDERED_ABSTRACT_ID
                    } else {
                        BULLET_ABSTRACT_ID
                    };
                    w.create_element("w:num")
                        .with_attribute(("w:numId", n.num_id.to_string().as_str()))
                        .write_inner_content(|w| {
                            empty(w, "w:abstractNumId", &[("w:val", abstract_id.to_string().as_str())])?;
                            if n.ordered {
                                // Every ordered list counts from 1 again.
                                for ilvl in 0..LIST_LEVELS {
                                    w.create_element("w:lvlOverride")
                                        .with_attribute(("w:ilvl", ilvl.to_string().as_str()))
                                        .write_inner_content(|w| {
                                            empty(w, "w:startOverride", &[("w:val", "1")])
                                        })?;
                                }
                            }
                            Ok(())
                        })?;
                }
                Ok(())
            })?;
        Ok(())
    })
}

/// One `w:abstractNum`; `level` gives the number format and text per level.
fn abstract_num<L>(w: &mut XmlWriter, id: usize, level: L) -> io::Result<()>
where
    L: Fn(usize) -> (&'static str, String),
{
    w.create_element("w:abstractNum")
        .with_attribute(("w:abstractNumId", id.to_string().as_str()))
        .write_inner_content(|w| {
            empty(w, "w:multiLevelType", &[("w:val", "hybridMultilevel")])?;
            for ilvl in 0..LIST_LEVELS {
                let (num_fmt, text) = level(ilvl);
                let left = (720 * (ilvl + 1)).to_string();
                w.create_element("w:lvl")
                    .with_attribute(("w:ilvl", ilvl.to_string().as_str()))
                    .write_inner_content(|w| {
                        empty(w, "w:start", &[("w:val", "1")])?;
                        empty(w, "w:numFmt", &[("w:val", num_fmt)])?;
                        empty(w, "w:lvlText", &[("w:val", text.as_str())])?;
                        empty(w, "w:lvlJc", &[("w:val", "left")])?;
                        w.create_element("w:pPr").write_inner_content(|w| {
                            empty(w, "w:ind", &[("w:left", left.as_str()), ("w:hanging", "360")])
                        })?;
                        Ok(())
                    })?;
            }
            Ok(())
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConversionConfig;
    use crate::model::DocumentNode;
    use crate::pipeline::emit::emit_document;
    use std::io::Read;

    fn read_part(docx: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut part = archive.by_name(name).unwrap();
        let mut s = String::new();
        part.read_to_string(&mut s).unwrap();
        s
    }

    fn package(nodes: &[DocumentNode]) -> Vec<u8> {
        let config = ConversionConfig::default();
        let doc = emit_document(nodes, &config).unwrap();
        build_docx(&doc, &DocumentMetadata::new("My Paper"), &config.styles).unwrap()
    }

    #[test]
    fn package_has_all_parts() {
        let docx = package(&[DocumentNode::paragraph("Hello")]);
        let archive = zip::ZipArchive::new(Cursor::new(&docx[..])).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "docProps/core.xml",
            "docProps/app.xml",
            "word/document.xml",
            "word/styles.xml",
            "word/numbering.xml",
            "word/settings.xml",
            "word/_rels/document.xml.rels",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
    }

    #[test]
    fn core_properties_carry_title_and_subject() {
        let core = read_part(&package(&[]), "docProps/core.xml");
        assert!(core.contains("<dc:title>My Paper</dc:title>"));
        assert!(core.contains("<dc:subject>Accessible Document</dc:subject>"));
    }

    #[test]
    fn styles_define_every_mapped_id() {
        let xml = styles_xml(&StyleMapping::default(), "en-US").unwrap();
        for id in ["Normal", "Heading1", "Heading6", "ListBullet", "ListNumber", "TableGrid", "Figure", "Caption", "Author"] {
            assert!(xml.contains(&format!(r#"w:styleId="{id}""#)), "missing {id}");
        }
        assert!(xml.contains(r#"<w:outlineLvl w:val="0"/>"#));
        assert!(xml.contains(r#"<w:color w:val="000000"/>"#));
    }

    #[test]
    fn duplicate_style_ids_defined_once() {
        let mut styles = StyleMapping::default();
        styles.author = "Normal".into();
        let xml = styles_xml(&styles, "en-US").unwrap();
        assert_eq!(xml.matches(r#"w:styleId="Normal""#).count(), 1);
    }

    #[test]
    fn ordered_instances_restart() {
        let xml = numbering_xml(&[
            NumberingInstance { num_id: 1, ordered: true },
            NumberingInstance { num_id: 2, ordered: false },
        ])
        .unwrap();
        assert!(xml.contains(r#"<w:num w:numId="1"><w:abstractNumId w:val="1"/>"#));
        assert!(xml.contains(r#"<w:num w:numId="2"><w:abstractNumId w:val="0"/></w:num>"#));
        assert_eq!(xml.matches("<w:startOverride").count(), LIST_LEVELS);
    }

    #[test]
    fn every_xml_part_is_well_formed() {
        let config = ConversionConfig::default();
        let doc = emit_document(
            &[
                DocumentNode::paragraph("x"),
                DocumentNode::ListItem {
                    depth: 0,
                    ordered: true,
                    text: "one".into(),
                    list_id: 1,
                },
            ],
            &config,
        )
        .unwrap();
        let meta = DocumentMetadata::new("Q&A <Notes> \u{1}");
        let docx = build_docx(&doc, &meta, &config.styles).unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(&docx[..])).unwrap();
        let names: Vec<String> = archive.file_names().map(str::to_string).collect();
        for name in names.iter().filter(|n| n.ends_with(".xml") || n.ends_with(".rels")) {
            let mut xml = String::new();
            archive.by_name(name).unwrap().read_to_string(&mut xml).unwrap();
            let mut reader = quick_xml::Reader::from_str(&xml);
            loop {
                match reader.read_event() {
                    Ok(quick_xml::events::Event::Eof) => break,
                    Ok(_) => {}
                    Err(e) => panic!("{name} is not well-formed: {e}"),
                }
            }
        }
        let core = read_part(&docx, "docProps/core.xml");
        assert!(core.contains("<dc:title>Q&amp;A &lt;Notes&gt; </dc:title>"));
    }
}
