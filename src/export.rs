//! Word (`.docx`) export of held search results.
//!
//! Documents are assembled entirely in memory: a minimal OOXML package
//! (content types, relationships, a Title style, core properties and the
//! document body) written with `quick-xml` into a `zip` archive. Body blocks
//! appear exactly in the order given.

use anyhow::Result;
use chrono::Utc;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ArchiveConfig;
use crate::session::{Held, SessionState};

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/><Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#;

const ROOT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#;

const DOCUMENT_RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/></Relationships>"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:rPr><w:sz w:val="22"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Title"><w:name w:val="Title"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:spacing w:after="240"/></w:pPr><w:rPr><w:b/><w:sz w:val="52"/></w:rPr></w:style></w:styles>"#;

/// A serialized document ready for download.
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Builds a `.docx` with one Title heading, the metadata paragraphs, then
/// one paragraph per body block.
pub fn build_document(title: &str, metadata: &[String], body: &[String]) -> Result<Vec<u8>> {
    let document_xml = document_xml(title, metadata, body)?;
    let core_xml = core_xml(title);

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let parts: [(&str, &[u8]); 6] = [
        ("[Content_Types].xml", CONTENT_TYPES_XML.as_bytes()),
        ("_rels/.rels", ROOT_RELS_XML.as_bytes()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS_XML.as_bytes()),
        ("word/styles.xml", STYLES_XML.as_bytes()),
        ("docProps/core.xml", core_xml.as_bytes()),
        ("word/document.xml", &document_xml),
    ];
    for (name, data) in parts {
        zip.start_file(name, options)?;
        zip.write_all(data)?;
    }
    Ok(zip.finish()?.into_inner())
}

fn document_xml(title: &str, metadata: &[String], body: &[String]) -> Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(
        BytesStart::new("w:document").with_attributes([("xmlns:w", W_NS)]),
    ))?;
    writer.write_event(Event::Start(BytesStart::new("w:body")))?;

    write_paragraph(&mut writer, title, Some("Title"))?;
    for line in metadata {
        write_paragraph(&mut writer, line, None)?;
    }
    for block in body {
        write_paragraph(&mut writer, block, None)?;
    }

    writer.write_event(Event::End(BytesEnd::new("w:body")))?;
    writer.write_event(Event::End(BytesEnd::new("w:document")))?;
    Ok(writer.into_inner().into_inner())
}

/// One `<w:p>`; newlines inside `text` become `<w:br/>` within a single run.
fn write_paragraph(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    text: &str,
    style: Option<&str>,
) -> Result<()> {
    writer.write_event(Event::Start(BytesStart::new("w:p")))?;
    if let Some(style) = style {
        writer.write_event(Event::Start(BytesStart::new("w:pPr")))?;
        writer.write_event(Event::Empty(
            BytesStart::new("w:pStyle").with_attributes([("w:val", style)]),
        ))?;
        writer.write_event(Event::End(BytesEnd::new("w:pPr")))?;
    }

    writer.write_event(Event::Start(BytesStart::new("w:r")))?;
    for (idx, line) in text.split('\n').enumerate() {
        if idx > 0 {
            writer.write_event(Event::Empty(BytesStart::new("w:br")))?;
        }
        if line.is_empty() {
            continue;
        }
        writer.write_event(Event::Start(
            BytesStart::new("w:t").with_attributes([("xml:space", "preserve")]),
        ))?;
        writer.write_event(Event::Text(BytesText::new(&strip_control_chars(line))))?;
        writer.write_event(Event::End(BytesEnd::new("w:t")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("w:r")))?;

    writer.write_event(Event::End(BytesEnd::new("w:p")))?;
    Ok(())
}

/// XML 1.0 forbids most C0 controls; PDF text (form feeds especially) carries them.
fn strip_control_chars(line: &str) -> String {
    line.chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect()
}

fn core_xml(title: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dc:creator>{}</dc:creator><dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created></cp:coreProperties>"#,
        quick_xml::escape::escape(strip_control_chars(title).as_str()),
        env!("CARGO_PKG_NAME"),
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// Exports whatever the session holds; `None` when it holds nothing.
pub fn export_session(state: &SessionState, archive: &ArchiveConfig) -> Result<Option<ExportedDocument>> {
    let doc = match state.held() {
        None => return Ok(None),
        Some(Held::Single { results, .. }) => {
            let title = format!(
                "{} {} Extracted Questions",
                archive.subject_code, archive.subject_name
            );
            let body: Vec<String> = results.iter().map(|r| r.render()).collect();
            ExportedDocument {
                file_name: format!("{}_Questions.docx", file_safe(&archive.subject_name)),
                bytes: build_document(&title, &[], &body)?,
            }
        }
        Some(Held::Batch { report }) => {
            let query = &report.query;
            let topic = query.topic.as_deref().map(str::trim).filter(|t| !t.is_empty());
            let title = format!(
                "Topical Question Bank: {}",
                topic.unwrap_or("All Topics")
            );
            let metadata = vec![format!(
                "Range: {} to {} | Paper: {} | Variant: {}",
                query.start_year,
                query.end_year(),
                query.variant.paper(),
                query.variant
            )];
            ExportedDocument {
                file_name: format!(
                    "Batch_{}_{}.docx",
                    file_safe(topic.unwrap_or("all")),
                    query.start_year
                ),
                bytes: build_document(&title, &metadata, &[report.aggregate_text()])?,
            }
        }
    };
    tracing::info!(file = %doc.file_name, bytes = doc.bytes.len(), "built export document");
    Ok(Some(doc))
}

/// Replaces anything but ASCII alphanumerics, `-` and `_` with `_`.
fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
