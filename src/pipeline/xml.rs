//! Thin helpers over [`quick_xml::Writer`] shared by the emitter and the
//! packager. Every part is streamed into an in-memory buffer; attribute
//! values and text go through quick-xml's escaping after characters that
//! XML 1.0 cannot carry have been dropped.

use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use std::borrow::Cow;
use std::io;

pub(crate) type XmlWriter = Writer<Vec<u8>>;

/// A writer positioned after the standalone XML declaration.
pub(crate) fn part_writer() -> io::Result<XmlWriter> {
    let mut w = Writer::new(Vec::new());
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    w.write_event(Event::Text(BytesText::from_escaped("\n")))?;
    Ok(w)
}

pub(crate) fn finish_part(w: XmlWriter) -> io::Result<String> {
    String::from_utf8(w.into_inner()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// One whole part: declaration plus whatever `body` writes.
pub(crate) fn part<F>(body: F) -> io::Result<String>
where
    F: FnOnce(&mut XmlWriter) -> io::Result<()>,
{
    let mut w = part_writer()?;
    body(&mut w)?;
    finish_part(w)
}

/// `<name a="b" .../>`
pub(crate) fn empty(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> io::Result<()> {
    w.create_element(name)
        .with_attributes(attrs.iter().copied())
        .write_empty()?;
    Ok(())
}

/// `<name>text</name>`
pub(crate) fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> io::Result<()> {
    w.create_element(name).write_text_content(text_event(text))?;
    Ok(())
}

/// Escaped character data.
pub(crate) fn text_event(text: &str) -> BytesText<'static> {
    BytesText::new(&xml_safe(text)).into_owned()
}

/// Drop characters XML 1.0 cannot carry (C0 controls other than tab and
/// newlines, U+FFFE, U+FFFF).
pub(crate) fn xml_safe(text: &str) -> Cow<'_, str> {
    let allowed = |c: char| {
        matches!(c, '\t' | '\n' | '\r') || (c >= '\u{20}' && !matches!(c, '\u{FFFE}' | '\u{FFFF}'))
    };
    if text.chars().all(allowed) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.chars().filter(|&c| allowed(c)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::events::Event;
    use quick_xml::Reader;

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(xml_safe("a\u{0}b\u{1b}<c>"), "ab<c>");
        assert!(matches!(xml_safe("plain"), Cow::Borrowed(_)));
    }

    #[test]
    fn attribute_and_text_are_escaped() {
        let xml = part(|w| {
            w.create_element("doc")
                .with_attribute(("descr", "say \"hi\" & <go>"))
                .write_text_content(text_event("a < b\u{1}"))?;
            Ok(())
        })
        .unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#));
        assert!(xml.contains(r#"descr="say &quot;hi&quot; &amp; &lt;go&gt;""#));
        assert!(xml.contains(">a &lt; b</doc>"));

        let mut reader = Reader::from_str(&xml);
        loop {
            match reader.read_event().unwrap() {
                Event::Eof => break,
                Event::Start(e) => {
                    let descr = e.try_get_attribute("descr").unwrap().unwrap();
                    assert_eq!(descr.unescape_value().unwrap(), "say \"hi\" & <go>");
                }
                _ => {}
            }
        }
    }

    #[test]
    fn empty_element_is_self_closing() {
        let mut w = Writer::new(Vec::new());
        empty(&mut w, "w:tblHeader", &[]).unwrap();
        empty(&mut w, "w:jc", &[("w:val", "center")]).unwrap();
        assert_eq!(
            finish_part(w).unwrap(),
            r#"<w:tblHeader/><w:jc w:val="center"/>"#
        );
    }
}
