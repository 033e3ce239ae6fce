//! Content extraction from word-processor documents.
//!
//! Reads `word/document.xml` out of the DOCX container and turns it into
//! semantic HTML and raw text. Anything that cannot be represented is
//! reported as a warning instead of failing the extraction.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::io::{Read, Seek};

use super::error::ConversionError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Extracted document content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocxContent {
    /// HTML fragment (no surrounding document shell).
    pub html: String,
    /// Raw text, paragraphs terminated by a blank line.
    pub text: String,
    pub warnings: Vec<String>,
}

/// Reads the main document part from a DOCX container.
pub fn read_document_xml<R: Read + Seek>(reader: R) -> Result<String, ConversionError> {
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| ConversionError::invalid_input(format!("Not a DOCX container: {e}")))?;
    let mut part = archive.by_name(DOCUMENT_PART).map_err(|e| {
        ConversionError::invalid_input(format!("Missing {DOCUMENT_PART} in document: {e}"))
    })?;
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .map_err(|e| ConversionError::invalid_input(format!("Unreadable {DOCUMENT_PART}: {e}")))?;
    Ok(xml)
}

/// Extracts HTML and text from a DOCX container.
pub fn extract<R: Read + Seek>(reader: R) -> Result<DocxContent, ConversionError> {
    let xml = read_document_xml(reader)?;
    extract_from_xml(&xml)
}

#[derive(Debug, Default)]
struct Run {
    bold: bool,
    italic: bool,
    underline: bool,
    html: String,
    text: String,
}

#[derive(Debug, Default)]
struct Paragraph {
    style: Option<String>,
    numbered: bool,
    html: String,
    text: String,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Vec<String>>,
    row: Vec<String>,
    cell: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Block {
    Heading(u8),
    ListItem,
    Paragraph,
}

#[derive(Debug, Default)]
struct Extractor {
    body: String,
    text: String,
    warnings: Vec<String>,
    seen_warnings: BTreeSet<String>,
    paragraph: Option<Paragraph>,
    run: Option<Run>,
    tables: Vec<Table>,
    in_text: bool,
    in_run_props: bool,
    list_open: bool,
    skip_depth: usize,
}

impl Extractor {
    fn warn_once(&mut self, message: String) {
        if self.seen_warnings.insert(message.clone()) {
            self.warnings.push(message);
        }
    }

    fn start(&mut self, e: &BytesStart<'_>, empty: bool) {
        let name = e.name();
        let name = name.as_ref();

        if self.skip_depth > 0 {
            if !empty {
                self.skip_depth += 1;
            }
            return;
        }

        match name {
            b"w:p" => {
                self.paragraph = Some(Paragraph::default());
                if empty {
                    self.end_paragraph();
                }
            }
            b"w:pStyle" => {
                if let (Some(p), Some(val)) = (self.paragraph.as_mut(), attr(e, b"w:val")) {
                    p.style = Some(val);
                }
            }
            b"w:numPr" => {
                if let Some(p) = self.paragraph.as_mut() {
                    p.numbered = true;
                }
            }
            b"w:r" if !empty => self.run = Some(Run::default()),
            b"w:rPr" if !empty => self.in_run_props = true,
            b"w:b" | b"w:i" | b"w:u" if self.in_run_props => {
                let on = toggle(e, name == b"w:u");
                if let Some(run) = self.run.as_mut() {
                    match name {
                        b"w:b" => run.bold = on,
                        b"w:i" => run.italic = on,
                        _ => run.underline = on,
                    }
                }
            }
            b"w:t" if !empty => self.in_text = true,
            b"w:tab" if !self.in_run_props => self.push_text("\t", "\t"),
            b"w:br" | b"w:cr" => self.push_text("<br />", "\n"),
            b"w:tbl" if !empty => {
                self.close_list();
                self.tables.push(Table::default());
            }
            b"w:tc" if !empty => {
                if let Some(t) = self.tables.last_mut() {
                    t.cell = Some(String::new());
                }
            }
            b"w:drawing" | b"w:pict" | b"w:object" => {
                self.warn_once("Image or embedded object was skipped".to_string());
                if !empty {
                    self.skip_depth = 1;
                }
            }
            b"w:footnoteReference" | b"w:endnoteReference" => {
                self.warn_once("Footnote and endnote references are not supported".to_string())
            }
            b"w:commentReference" => self.warn_once("Comments were ignored".to_string()),
            _ => {}
        }
    }

    fn end(&mut self, name: &[u8]) {
        if self.skip_depth > 0 {
            self.skip_depth -= 1;
            return;
        }

        match name {
            b"w:t" => self.in_text = false,
            b"w:rPr" => self.in_run_props = false,
            b"w:r" => self.end_run(),
            b"w:p" => self.end_paragraph(),
            b"w:tc" => {
                if let Some(t) = self.tables.last_mut() {
                    let cell = t.cell.take().unwrap_or_default();
                    t.row.push(cell);
                }
            }
            b"w:tr" => {
                if let Some(t) = self.tables.last_mut() {
                    let row = std::mem::take(&mut t.row);
                    t.rows.push(row);
                }
            }
            b"w:tbl" => {
                if let Some(table) = self.tables.pop() {
                    let html = render_table(&table);
                    self.emit_html(&html);
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, content: &str) {
        if self.skip_depth == 0 && self.in_text {
            let escaped = escape(content);
            self.push_text(&escaped, content);
        }
    }

    fn push_text(&mut self, html: &str, text: &str) {
        if let Some(run) = self.run.as_mut() {
            run.html.push_str(html);
            run.text.push_str(text);
        } else if let Some(p) = self.paragraph.as_mut() {
            p.html.push_str(html);
            p.text.push_str(text);
        }
    }

    fn end_run(&mut self) {
        let Some(run) = self.run.take() else { return };
        let Some(p) = self.paragraph.as_mut() else { return };

        let mut html = run.html;
        if run.underline {
            html = format!("<u>{html}</u>");
        }
        if run.italic {
            html = format!("<em>{html}</em>");
        }
        if run.bold {
            html = format!("<strong>{html}</strong>");
        }
        p.html.push_str(&html);
        p.text.push_str(&run.text);
    }

    fn end_paragraph(&mut self) {
        self.end_run();
        let Some(p) = self.paragraph.take() else { return };

        self.text.push_str(&p.text);
        self.text.push_str("\n\n");

        let block = self.classify(&p);
        if self.tables.last().is_some_and(|t| t.cell.is_some()) {
            if !p.html.is_empty() {
                let html = match block {
                    Block::Heading(level) => format!("<h{level}>{}</h{level}>", p.html),
                    _ => format!("<p>{}</p>", p.html),
                };
                self.emit_html(&html);
            }
            return;
        }

        match block {
            Block::ListItem => {
                if !self.list_open {
                    self.body.push_str("<ul>");
                    self.list_open = true;
                }
                self.body.push_str(&format!("<li>{}</li>", p.html));
            }
            Block::Heading(level) => {
                self.close_list();
                if !p.html.is_empty() {
                    self.body.push_str(&format!("<h{level}>{}</h{level}>", p.html));
                }
            }
            Block::Paragraph => {
                self.close_list();
                if !p.html.is_empty() {
                    self.body.push_str(&format!("<p>{}</p>", p.html));
                }
            }
        }
    }

    fn classify(&mut self, p: &Paragraph) -> Block {
        let style = p.style.as_deref().unwrap_or("Normal");
        let lower = style.to_ascii_lowercase();
        if let Some(level) = lower
            .strip_prefix("heading")
            .and_then(|n| n.trim().parse::<u8>().ok())
            .filter(|n| (1..=6).contains(n))
        {
            return Block::Heading(level);
        }
        match lower.as_str() {
            "title" => Block::Heading(1),
            "subtitle" => Block::Heading(2),
            "listparagraph" | "listbullet" | "listnumber" => Block::ListItem,
            _ if p.numbered => Block::ListItem,
            "normal" | "normalweb" | "bodytext" => Block::Paragraph,
            _ => {
                self.warn_once(format!("Unrecognised paragraph style: '{style}'"));
                Block::Paragraph
            }
        }
    }

    fn emit_html(&mut self, html: &str) {
        if let Some(cell) = self.tables.last_mut().and_then(|t| t.cell.as_mut()) {
            cell.push_str(html);
        } else {
            self.body.push_str(html);
        }
    }

    fn close_list(&mut self) {
        if self.list_open {
            self.body.push_str("</ul>");
            self.list_open = false;
        }
    }

    fn finish(mut self) -> DocxContent {
        self.end_paragraph();
        self.close_list();
        DocxContent {
            html: self.body,
            text: self.text,
            warnings: self.warnings,
        }
    }
}

/// Extracts HTML and text from the main document XML.
pub fn extract_from_xml(xml: &str) -> Result<DocxContent, ConversionError> {
    let mut reader = Reader::from_str(xml);
    let mut extractor = Extractor::default();

    loop {
        let event = reader.read_event().map_err(|e| {
            ConversionError::invalid_input(format!(
                "Malformed document XML at byte {}: {e}",
                reader.buffer_position()
            ))
        })?;
        match event {
            Event::Start(e) => extractor.start(&e, false),
            Event::Empty(e) => extractor.start(&e, true),
            Event::End(e) => extractor.end(e.name().as_ref()),
            Event::Text(t) => {
                let raw = String::from_utf8_lossy(&t);
                let text = quick_xml::escape::unescape(&raw)
                    .map(|c| c.into_owned())
                    .unwrap_or_else(|_| raw.into_owned());
                extractor.text(&text);
            }
            Event::CData(t) => extractor.text(&String::from_utf8_lossy(&t)),
            Event::GeneralRef(r) => {
                let name = String::from_utf8_lossy(&r).into_owned();
                match resolve_entity(&name) {
                    Some(text) => extractor.text(&text),
                    None => extractor.warn_once(format!("Unknown entity reference: &{name};")),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(extractor.finish())
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(code) = name.strip_prefix('#') {
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => code.parse::<u32>().ok()?,
        };
        return char::from_u32(value).map(String::from);
    }
    quick_xml::escape::resolve_predefined_entity(name).map(str::to_string)
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Whether a run property element switches its property on.
fn toggle(e: &BytesStart<'_>, underline: bool) -> bool {
    match attr(e, b"w:val") {
        None => true,
        Some(v) => {
            let v = v.to_ascii_lowercase();
            !(v == "0" || v == "false" || v == "off" || (underline && v == "none"))
        }
    }
}

fn render_table(table: &Table) -> String {
    let mut html = String::from("<table>");
    for row in &table.rows {
        html.push_str("<tr>");
        for cell in row {
            html.push_str("<td>");
            html.push_str(cell);
            html.push_str("</td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</table>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn wrap(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{body}</w:body></w:document>"#
        )
    }

    #[test]
    fn test_paragraphs_and_formatting() {
        let xml = wrap(
            r#"<w:p><w:r><w:t>Hello </w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r><w:r><w:rPr><w:i/><w:b w:val="0"/></w:rPr><w:t xml:space="preserve"> and italic</w:t></w:r></w:p>"#,
        );
        let content = extract_from_xml(&xml).unwrap();
        assert_eq!(
            content.html,
            "<p>Hello <strong>bold</strong><em> and italic</em></p>"
        );
        assert_eq!(content.text, "Hello bold and italic\n\n");
        assert!(content.warnings.is_empty());
    }

    #[test]
    fn test_headings_and_lists() {
        let xml = wrap(
            r#"<w:p><w:pPr><w:pStyle w:val="Heading2"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="ListParagraph"/><w:numPr><w:ilvl w:val="0"/></w:numPr></w:pPr><w:r><w:t>one</w:t></w:r></w:p>
<w:p><w:pPr><w:pStyle w:val="ListParagraph"/></w:pPr><w:r><w:t>two</w:t></w:r></w:p>
<w:p><w:r><w:t>after</w:t></w:r></w:p>"#,
        );
        let content = extract_from_xml(&xml).unwrap();
        assert_eq!(
            content.html,
            "<h2>Title</h2><ul><li>one</li><li>two</li></ul><p>after</p>"
        );
    }

    #[test]
    fn test_escaping_and_entities() {
        let xml = wrap(r#"<w:p><w:r><w:t>a &lt; b &amp; c &#x263A;</w:t></w:r></w:p>"#);
        let content = extract_from_xml(&xml).unwrap();
        assert_eq!(content.html, "<p>a &lt; b &amp; c \u{263A}</p>");
        assert_eq!(content.text, "a < b & c \u{263A}\n\n");

        let xml = wrap(r#"<w:p><w:r><w:t>"quoted" &gt; 'single'</w:t></w:r></w:p>"#);
        let content = extract_from_xml(&xml).unwrap();
        assert_eq!(
            content.html,
            "<p>&quot;quoted&quot; &gt; &apos;single&apos;</p>"
        );
        assert_eq!(content.text, "\"quoted\" > 'single'\n\n");
    }

    #[test]
    fn test_drawings_become_warnings() {
        let xml = wrap(
            r#"<w:p><w:r><w:drawing><wp:inline><w:p><w:r><w:t>hidden</w:t></w:r></w:p></wp:inline></w:drawing></w:r><w:r><w:t>visible</w:t></w:r></w:p>"#,
        );
        let content = extract_from_xml(&xml).unwrap();
        assert_eq!(content.html, "<p>visible</p>");
        assert_eq!(content.warnings, vec!["Image or embedded object was skipped"]);
    }

    #[test]
    fn test_unknown_style_warns_once() {
        let xml = wrap(
            r#"<w:p><w:pPr><w:pStyle w:val="Fancy"/></w:pPr><w:r><w:t>a</w:t></w:r></w:p><w:p><w:pPr><w:pStyle w:val="Fancy"/></w:pPr><w:r><w:t>b</w:t></w:r></w:p>"#,
        );
        let content = extract_from_xml(&xml).unwrap();
        assert_eq!(content.html, "<p>a</p><p>b</p>");
        assert_eq!(content.warnings.len(), 1);
    }

    #[test]
    fn test_tables_and_breaks() {
        let xml = wrap(
            r#"<w:tbl><w:tr><w:tc><w:p><w:r><w:t>A1</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>B1</w:t><w:br/><w:t>x</w:t></w:r></w:p></w:tc></w:tr></w:tbl>"#,
        );
        let content = extract_from_xml(&xml).unwrap();
        assert_eq!(
            content.html,
            "<table><tr><td><p>A1</p></td><td><p>B1<br />x</p></td></tr></table>"
        );
        assert_eq!(content.text, "A1\n\nB1\nx\n\n");
    }

    #[test]
    fn test_extract_from_container() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buffer);
            zip.start_file(DOCUMENT_PART, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(wrap("<w:p><w:r><w:t>zipped</w:t></w:r></w:p>").as_bytes())
                .unwrap();
            zip.finish().unwrap();
        }
        buffer.set_position(0);
        let content = extract(buffer).unwrap();
        assert_eq!(content.text, "zipped\n\n");
    }

    #[test]
    fn test_not_a_container() {
        let err = extract(Cursor::new(b"plain text".to_vec())).unwrap_err();
        assert_eq!(err.kind(), crate::converter::ErrorKind::InvalidInput);
    }
}
