//! Document emitter: walk the normalised nodes once, in order, and produce
//! the WordprocessingML body plus the media and list instances it refers to.
//!
//! Every accessibility property is written in its format-native form so
//! Word and screen readers pick it up without post-processing:
//!
//! | Node        | Native form                                              |
//! |-------------|----------------------------------------------------------|
//! | Heading     | `HeadingN` paragraph style (outline level from styles)   |
//! | ListItem    | `w:numPr` pointing at one numbering instance per list    |
//! | Table       | `w:tblHeader` on the header row, `w:tblLook firstRow=1`  |
//! | Image       | `wp:docPr/@descr`, or the Office decorative extension    |
//! | PageBreak   | `w:br w:type="page"`                                     |
//!
//! The package around the body is assembled by [`crate::pipeline::package`].

use crate::config::ConversionConfig;
use crate::model::{AltText, CellKind, DocumentNode, ImageRef, TableBlock, TextRun};
use crate::pipeline::encode::mime_type;
use crate::pipeline::table::span_width;
use crate::pipeline::xml::{empty, finish_part, part_writer, text_event, xml_safe, XmlWriter};
use quick_xml::events::{BytesEnd, BytesStart, Event};
use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// English Metric Units per inch.
pub const EMU_PER_INCH: f64 = 914_400.0;
/// Pixel density assumed for images without a better hint.
pub const ASSUMED_DPI: f64 = 96.0;
/// Text width of a Letter page with 1 in margins, in twentieths of a point.
pub const TEXT_WIDTH_TWIPS: usize = 9360;

pub(crate) const NS_MAIN: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_WP: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_PIC: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const NS_ADEC: &str = "http://schemas.microsoft.com/office/drawing/2017/decorative";
const DECORATIVE_EXT_URI: &str = "{C183D7F6-B498-43B3-948B-1728B52AA6E4}";

/// An image file copied into `word/media/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// File name inside `word/media/`, e.g. `image1.png`.
    pub name: String,
    pub rel_id: String,
    pub bytes: Vec<u8>,
}

/// One `w:num` instance; each logical list gets its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberingInstance {
    pub num_id: usize,
    pub ordered: bool,
}

/// Output of the emitter, ready for packaging.
#[derive(Debug, Clone)]
pub struct EmittedDocument {
    /// Complete `word/document.xml`.
    pub document_xml: String,
    pub media: Vec<MediaFile>,
    pub numbering: Vec<NumberingInstance>,
}

/// Emit the body for `nodes`.
///
/// An image that cannot be read at this point degrades to the same italic
/// placeholder as an unresolved reference. Errors come only from the XML
/// writer.
pub fn emit_document(
    nodes: &[DocumentNode],
    config: &ConversionConfig,
) -> io::Result<EmittedDocument> {
    let mut emitter = Emitter::new(config)?;
    for node in nodes {
        emitter.node(node)?;
    }
    emitter.finish()
}

struct Emitter<'a> {
    config: &'a ConversionConfig,
    xml: XmlWriter,
    media: Vec<MediaFile>,
    /// list_id → numbering instance, in order of first use.
    lists: BTreeMap<usize, NumberingInstance>,
    has_content: bool,
    next_drawing_id: usize,
}

impl<'a> Emitter<'a> {
    fn new(config: &'a ConversionConfig) -> io::Result<Self> {
        let mut xml = part_writer()?;
        xml.write_event(Event::Start(BytesStart::new("w:document").with_attributes([
            ("xmlns:w", NS_MAIN),
            ("xmlns:r", NS_REL),
            ("xmlns:wp", NS_WP),
            ("xmlns:a", NS_A),
            ("xmlns:pic", NS_PIC),
        ])))?;
        xml.write_event(Event::Start(BytesStart::new("w:body")))?;
        Ok(Self {
            config,
            xml,
            media: Vec::new(),
            lists: BTreeMap::new(),
            has_content: false,
            next_drawing_id: 1,
        })
    }

    fn node(&mut self, node: &DocumentNode) -> io::Result<()> {
        let config = self.config;
        let styles = &config.styles;
        match node {
            DocumentNode::Heading { level, text } => {
                let runs = [TextRun::plain(text.as_str())];
                self.paragraph(styles.heading(*level), no_props, &runs)
            }
            DocumentNode::Paragraph { runs } => self.paragraph(&styles.paragraph, no_props, runs),
            DocumentNode::ListItem {
                depth,
                ordered,
                text,
                list_id,
            } => self.list_item(*depth, *ordered, text, *list_id),
            DocumentNode::Table(table) => self.table(table),
            DocumentNode::Image(image) => self.image(image),
            DocumentNode::PageBreak { page } => {
                if self.has_content {
                    self.xml.create_element("w:p").write_inner_content(|w| {
                        w.create_element("w:r").write_inner_content(|w| {
                            empty(w, "w:br", &[("w:type", "page")])
                        })?;
                        Ok(())
                    })?;
                } else {
                    debug!("Page break before page {} suppressed: no content yet", page);
                }
                Ok(())
            }
            DocumentNode::AuthorGrid(grid) => {
                for line in grid.reading_order() {
                    self.paragraph(&styles.author, no_props, &[TextRun::plain(line)])?;
                }
                Ok(())
            }
        }
    }

    /// `<w:p>` with a paragraph style; `props` appends to `w:pPr`.
    fn paragraph<F>(&mut self, style: &str, props: F, runs: &[TextRun]) -> io::Result<()>
    where
        F: FnOnce(&mut XmlWriter) -> io::Result<()>,
    {
        write_paragraph(&mut self.xml, style, props, |w| write_runs(w, runs))?;
        self.has_content = true;
        Ok(())
    }

    fn list_item(&mut self, depth: u8, ordered: bool, text: &str, list_id: usize) -> io::Result<()> {
        let next = self.lists.len() + 1;
        let num_id = self
            .lists
            .entry(list_id)
            .or_insert(NumberingInstance {
                num_id: next,
                ordered,
            })
            .num_id;
        let config = self.config;
        let styles = &config.styles;
        let style = if ordered {
            &styles.list_number
        } else {
            &styles.list_bullet
        };
        let num_pr = |w: &mut XmlWriter| -> io::Result<()> {
            w.create_element("w:numPr").write_inner_content(|w| {
                empty(w, "w:ilvl", &[("w:val", depth.to_string().as_str())])?;
                empty(w, "w:numId", &[("w:val", num_id.to_string().as_str())])
            })?;
            Ok(())
        };
        self.paragraph(style, num_pr, &[TextRun::plain(text)])
    }

    fn table(&mut self, table: &TableBlock) -> io::Result<()> {
        let columns = table.column_count();
        if columns == 0 {
            return Ok(());
        }
        let col_width = TEXT_WIDTH_TWIPS / columns;
        let config = self.config;
        let styles = &config.styles;

        self.xml.create_element("w:tbl").write_inner_content(|w| {
            w.create_element("w:tblPr").write_inner_content(|w| {
                empty(w, "w:tblStyle", &[("w:val", &*xml_safe(&styles.table))])?;
                empty(w, "w:tblW", &[("w:w", "5000"), ("w:type", "pct")])?;
                empty(
                    w,
                    "w:tblLook",
                    &[
                        ("w:val", "04A0"),
                        ("w:firstRow", "1"),
                        ("w:lastRow", "0"),
                        ("w:firstColumn", "0"),
                        ("w:lastColumn", "0"),
                        ("w:noHBand", "0"),
                        ("w:noVBand", "1"),
                    ],
                )
            })?;
            w.create_element("w:tblGrid").write_inner_content(|w| {
                let width = col_width.to_string();
                for _ in 0..columns {
                    empty(w, "w:gridCol", &[("w:w", width.as_str())])?;
                }
                Ok(())
            })?;

            for (r, row) in table.rows.iter().enumerate() {
                let header = table.is_header_row(r);
                w.create_element("w:tr").write_inner_content(|w| {
                    if header {
                        w.create_element("w:trPr")
                            .write_inner_content(|w| empty(w, "w:tblHeader", &[]))?;
                    }
                    let mut col = 0;
                    while col < row.len() {
                        let cell = &row[col];
                        let span = if header && cell.kind == CellKind::Content {
                            span_width(row, col)
                        } else {
                            1
                        };
                        let run = TextRun {
                            text: if cell.kind == CellKind::Content {
                                cell.text.clone()
                            } else {
                                String::new()
                            },
                            bold: header,
                            italic: false,
                        };
                        w.create_element("w:tc").write_inner_content(|w| {
                            w.create_element("w:tcPr").write_inner_content(|w| {
                                let width = (col_width * span).to_string();
                                empty(w, "w:tcW", &[("w:w", width.as_str()), ("w:type", "dxa")])?;
                                if span > 1 {
                                    empty(w, "w:gridSpan", &[("w:val", span.to_string().as_str())])?;
                                }
                                Ok(())
                            })?;
                            write_paragraph(w, &styles.paragraph, no_props, |w| {
                                write_runs(w, std::slice::from_ref(&run))
                            })
                        })?;
                        col += span;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })?;

        // A table directly followed by another needs a separating paragraph.
        empty(&mut self.xml, "w:p", &[])?;
        self.has_content = true;
        Ok(())
    }

    fn image(&mut self, image: &ImageRef) -> io::Result<()> {
        let Some(path) = image.path.as_deref() else {
            return self.image_placeholder(image);
        };
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Cannot embed {}: {}", path.display(), e);
                return self.image_placeholder(image);
            }
        };
        let Some((cx, cy)) = extent_emu(path, self.config.max_image_width_in) else {
            return self.image_placeholder(image);
        };

        let index = self.media.len() + 1;
        let ext = match mime_type(path, &bytes) {
            "image/jpeg" => "jpeg",
            "image/gif" => "gif",
            _ => "png",
        };
        let name = format!("image{index}.{ext}");
        let rel_id = format!("rIdImg{index}");
        let id = self.next_drawing_id;
        self.next_drawing_id += 1;

        let positional = format!("Image on page {}", image.page);
        let (descr, decorative) = match &image.alt {
            AltText::Decorative => (String::new(), true),
            alt => (alt.text().unwrap_or(positional.as_str()).to_string(), false),
        };
        let safe_descr = xml_safe(&descr);
        let picture = Picture {
            id,
            name: &name,
            rel_id: &rel_id,
            descr: &safe_descr,
            decorative,
            cx,
            cy,
        };

        let config = self.config;
        let center = |w: &mut XmlWriter| empty(w, "w:jc", &[("w:val", "center")]);
        write_paragraph(&mut self.xml, &config.styles.image, center, |w| {
            w.create_element("w:r")
                .write_inner_content(|w| picture.write(w))?;
            Ok(())
        })?;
        self.has_content = true;

        debug!("Embedded {} as {} ({}x{} EMU)", image.src, name, cx, cy);
        self.media.push(MediaFile {
            name,
            rel_id,
            bytes,
        });
        Ok(())
    }

    /// Italic text standing in for an image that is not embedded.
    fn image_placeholder(&mut self, image: &ImageRef) -> io::Result<()> {
        let text = match &image.alt {
            AltText::Unavailable(s) => s.clone(),
            AltText::Caption(c) => format!("Image could not be loaded: {c}"),
            _ => "Image could not be loaded".to_string(),
        };
        let runs = [TextRun {
            text,
            bold: false,
            italic: true,
        }];
        let config = self.config;
        self.paragraph(&config.styles.image_placeholder, no_props, &runs)
    }

    fn finish(mut self) -> io::Result<EmittedDocument> {
        self.xml.create_element("w:sectPr").write_inner_content(|w| {
            empty(w, "w:pgSz", &[("w:w", "12240"), ("w:h", "15840")])?;
            empty(
                w,
                "w:pgMar",
                &[
                    ("w:top", "1440"),
                    ("w:right", "1440"),
                    ("w:bottom", "1440"),
                    ("w:left", "1440"),
                    ("w:header", "720"),
                    ("w:footer", "720"),
                    ("w:gutter", "0"),
                ],
            )
        })?;
        self.xml.write_event(Event::End(BytesEnd::new("w:body")))?;
        self.xml.write_event(Event::End(BytesEnd::new("w:document")))?;

        let mut numbering: Vec<NumberingInstance> = self.lists.into_values().collect();
        numbering.sort_by_key(|n| n.num_id);
        Ok(EmittedDocument {
            document_xml: finish_part(self.xml)?,
            media: self.media,
            numbering,
        })
    }
}

/// An inline `wp:inline` picture.
///
/// `descr` goes on both `wp:docPr` and `pic:cNvPr`; a decorative picture
/// keeps it empty and carries the Office decorative extension on `wp:docPr`.
struct Picture<'p> {
    id: usize,
    name: &'p str,
    rel_id: &'p str,
    descr: &'p str,
    decorative: bool,
    cx: u64,
    cy: u64,
}

impl Picture<'_> {
    fn write(&self, w: &mut XmlWriter) -> io::Result<()> {
        let id = self.id.to_string();
        let cx = self.cx.to_string();
        let cy = self.cy.to_string();
        let extent = [("cx", cx.as_str()), ("cy", cy.as_str())];

        w.create_element("w:drawing").write_inner_content(|w| {
            w.create_element("wp:inline")
                .with_attributes([("distT", "0"), ("distB", "0"), ("distL", "0"), ("distR", "0")])
                .write_inner_content(|w| {
                    empty(w, "wp:extent", &extent)?;
                    let doc_pr = w
                        .create_element("wp:docPr")
                        .with_attribute(("id", id.as_str()))
                        .with_attribute(("name", format!("Picture {id}").as_str()))
                        .with_attribute(("descr", self.descr));
                    if self.decorative {
                        doc_pr.write_inner_content(|w| {
                            w.create_element("a:extLst")
                                .with_attribute(("xmlns:a", NS_A))
                                .write_inner_content(|w| {
                                    w.create_element("a:ext")
                                        .with_attribute(("uri", DECORATIVE_EXT_URI))
                                        .write_inner_content(|w| {
                                            empty(
                                                w,
                                                "adec:decorative",
                                                &[("xmlns:adec", NS_ADEC), ("val", "1")],
                                            )
                                        })?;
                                    Ok(())
                                })?;
                            Ok(())
                        })?;
                    } else {
                        doc_pr.write_empty()?;
                    }
                    w.create_element("wp:cNvGraphicFramePr")
                        .write_inner_content(|w| {
                            empty(
                                w,
                                "a:graphicFrameLocks",
                                &[("xmlns:a", NS_A), ("noChangeAspect", "1")],
                            )
                        })?;
                    w.create_element("a:graphic")
                        .with_attribute(("xmlns:a", NS_A))
                        .write_inner_content(|w| {
                            w.create_element("a:graphicData")
                                .with_attribute(("uri", NS_PIC))
                                .write_inner_content(|w| {
                                    w.create_element("pic:pic")
                                        .with_attribute(("xmlns:pic", NS_PIC))
                                        .write_inner_content(|w| self.write_pic(w, &id, &extent))?;
                                    Ok(())
                                })?;
                            Ok(())
                        })?;
                    Ok(())
                })?;
            Ok(())
        })?;
        Ok(())
    }

    fn write_pic(&self, w: &mut XmlWriter, id: &str, extent: &[(&str, &str)]) -> io::Result<()> {
        w.create_element("pic:nvPicPr").write_inner_content(|w| {
            empty(
                w,
                "pic:cNvPr",
                &[("id", id), ("name", self.name), ("descr", self.descr)],
            )?;
            empty(w, "pic:cNvPicPr", &[])
        })?;
        w.create_element("pic:blipFill").write_inner_content(|w| {
            empty(w, "a:blip", &[("r:embed", self.rel_id)])?;
            w.create_element("a:stretch")
                .write_inner_content(|w| empty(w, "a:fillRect", &[]))?;
            Ok(())
        })?;
        w.create_element("pic:spPr").write_inner_content(|w| {
            w.create_element("a:xfrm").write_inner_content(|w| {
                empty(w, "a:off", &[("x", "0"), ("y", "0")])?;
                empty(w, "a:ext", extent)
            })?;
            w.create_element("a:prstGeom")
                .with_attribute(("prst", "rect"))
                .write_inner_content(|w| empty(w, "a:avLst", &[]))?;
            Ok(())
        })?;
        Ok(())
    }
}

/// Picture size in EMU, capped at `max_width_in`.
fn extent_emu(path: &Path, max_width_in: f32) -> Option<(u64, u64)> {
    let (w, h) = image::image_dimensions(path).ok()?;
    if w == 0 || h == 0 {
        return None;
    }
    let width_in = (f64::from(w) / ASSUMED_DPI).min(f64::from(max_width_in));
    let cx = (width_in * EMU_PER_INCH).round();
    let cy = (cx * f64::from(h) / f64::from(w)).round();
    Some((cx as u64, cy as u64))
}

fn no_props(_: &mut XmlWriter) -> io::Result<()> {
    Ok(())
}

fn write_paragraph<P, C>(w: &mut XmlWriter, style: &str, props: P, content: C) -> io::Result<()>
where
    P: FnOnce(&mut XmlWriter) -> io::Result<()>,
    C: FnOnce(&mut XmlWriter) -> io::Result<()>,
{
    w.create_element("w:p").write_inner_content(|w| {
        w.create_element("w:pPr").write_inner_content(|w| {
            empty(w, "w:pStyle", &[("w:val", &*xml_safe(style))])?;
            props(w)
        })?;
        content(w)
    })?;
    Ok(())
}

fn write_runs(w: &mut XmlWriter, runs: &[TextRun]) -> io::Result<()> {
    for run in runs.iter().filter(|r| !r.text.is_empty()) {
        w.create_element("w:r").write_inner_content(|w| {
            if run.bold || run.italic {
                w.create_element("w:rPr").write_inner_content(|w| {
                    if run.bold {
                        empty(w, "w:b", &[])?;
                    }
                    if run.italic {
                        empty(w, "w:i", &[])?;
                    }
                    Ok(())
                })?;
            }
            for (i, line) in run.text.split('\n').enumerate() {
                if i > 0 {
                    empty(w, "w:br", &[])?;
                }
                if !line.is_empty() {
                    w.create_element("w:t")
                        .with_attribute(("xml:space", "preserve"))
                        .write_text_content(text_event(line))?;
                }
            }
            Ok(())
        })?;
    }
    Ok(())
}
