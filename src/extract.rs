//! Page-level text extraction and keyword matching.
//!
//! PDF decoding is delegated to `pdf-extract` behind the [`PageExtractor`]
//! trait; this module decides which pages match a keyword and tags each with
//! its source file and 1-based page number. Failures never escape as panics:
//! a file that cannot be decoded becomes [`Extraction::Unreadable`].

use serde::{Deserialize, Serialize};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug)]
pub enum ExtractError {
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "OOXML extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Turns document bytes into the text of each page, in page order.
pub trait PageExtractor: Send + Sync {
    fn pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// Production extractor backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfPageExtractor;

impl PageExtractor for PdfPageExtractor {
    fn pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        if !looks_like_pdf(bytes) {
            return Err(ExtractError::Pdf("missing %PDF header".to_string()));
        }
        // pdf-extract panics on some malformed inputs.
        match panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        })) {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
            Err(_) => Err(ExtractError::Pdf("decoder panicked".to_string())),
        }
    }
}

pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

/// One matched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// 1-based.
    pub page_number: u32,
    pub text: String,
}

/// The pages of one file that matched a search, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// File name (no directory) of the question paper the pages came from.
    pub source_file: String,
    pub pages: Vec<ExtractedPage>,
}

impl ExtractionResult {
    /// Renders every page behind a `--- {file} (P.{n}) ---` banner.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for page in &self.pages {
            out.push_str(&format!(
                "\n--- {} (P.{}) ---\n{}",
                self.source_file, page.page_number, page.text
            ));
        }
        out
    }
}

/// Outcome of extracting one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Found(ExtractionResult),
    /// No file at the path.
    Missing,
    /// The file exists but no page matched.
    NoMatch,
    Unreadable { source_file: String, reason: String },
}

impl Extraction {
    /// `Missing` and `NoMatch` are both "no hit"; callers need not tell them apart.
    pub fn is_hit(&self) -> bool {
        matches!(self, Extraction::Found(_))
    }
}

/// Normalizes an optional keyword: blank means "every page".
pub fn normalize_keyword(keyword: Option<&str>) -> Option<String> {
    keyword
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase)
}

/// Selects the pages of `pages` matching `keyword` (case-insensitive substring).
pub fn matching_pages(pages: Vec<String>, keyword: Option<&str>) -> Vec<ExtractedPage> {
    let needle = normalize_keyword(keyword);
    pages
        .into_iter()
        .enumerate()
        .filter(|(_, text)| match &needle {
            Some(needle) => text.to_lowercase().contains(needle.as_str()),
            None => true,
        })
        .map(|(idx, text)| ExtractedPage {
            page_number: idx as u32 + 1,
            text,
        })
        .collect()
}

/// Reads `path` and returns its pages matching `keyword`.
pub fn extract(path: &Path, keyword: Option<&str>, extractor: &dyn PageExtractor) -> Extraction {
    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Extraction::Missing,
        Err(e) => {
            return Extraction::Unreadable {
                source_file,
                reason: e.to_string(),
            }
        }
    };

    let pages = match extractor.pages(&bytes) {
        Ok(pages) => pages,
        Err(e) => {
            return Extraction::Unreadable {
                source_file,
                reason: e.to_string(),
            }
        }
    };

    let pages = matching_pages(pages, keyword);
    if pages.is_empty() {
        return Extraction::NoMatch;
    }

    Extraction::Found(ExtractionResult { source_file, pages })
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Paragraph texts of a `.docx`, in document order. `<w:br/>` becomes `\n`.
pub fn docx_paragraphs(bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_t = false;
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_t = true;
                }
            }
            Ok(quick_xml::events::Event::Empty(e)) => {
                if e.local_name().as_ref() == b"br" {
                    current.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Text(te)) if in_t => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(quick_xml::events::Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}
