//! Text extraction for uploaded documents (PDF, DOCX, TXT).
//!
//! The format is decided from the file extension before any bytes are
//! read. Each reader returns plain UTF-8 text plus a page count when the
//! format has one (PDF only).

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::DocumentError;

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY: &str = "word/document.xml";

/// Recognized upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Txt,
}

impl DocumentFormat {
    /// Detects the format from a filename's extension (case-insensitive).
    ///
    /// `.doc` is accepted and routed to the DOCX reader; legacy binary Word
    /// files then fail extraction rather than validation.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename)
            .extension()?
            .to_str()?
            .to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
        }
    }
}

/// Validates the extension of `filename`, returning its format.
pub fn detect_format(filename: &str) -> Result<DocumentFormat, DocumentError> {
    DocumentFormat::from_filename(filename).ok_or_else(|| {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_else(|| "(none)".to_string());
        DocumentError::UnsupportedFormat(ext)
    })
}

/// Extracted plain text and optional page count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub pages: Option<u32>,
}

/// Format-specific extraction failure.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read PDF: {0}")]
    Pdf(String),
    #[error("failed to read DOCX: {0}")]
    Docx(String),
    #[error("failed to read TXT: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("{} reader aborted", .0.as_str())]
    Aborted(DocumentFormat),
}

/// Extracts text from in-memory file content of a known format.
pub fn extract(bytes: &[u8], format: DocumentFormat) -> Result<Extracted, ExtractError> {
    match format {
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => Ok(Extracted {
            text: extract_docx(bytes)?,
            pages: None,
        }),
        DocumentFormat::Txt => Ok(Extracted {
            text: extract_txt(bytes)?,
            pages: None,
        }),
    }
}

/// Runs [`extract`] on the blocking thread pool.
///
/// A reader that panics on malformed input is reported as
/// [`ExtractError::Aborted`] instead of taking the task down.
pub async fn extract_blocking(
    bytes: Vec<u8>,
    format: DocumentFormat,
) -> Result<Extracted, ExtractError> {
    tokio::task::spawn_blocking(move || extract(&bytes, format))
        .await
        .map_err(|_| ExtractError::Aborted(format))?
}

fn extract_pdf(bytes: &[u8]) -> Result<Extracted, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    let count = u32::try_from(pages.len())
        .map_err(|_| ExtractError::Pdf(format!("too many pages: {}", pages.len())))?;
    Ok(Extracted {
        text: pages.join("\n"),
        pages: Some(count),
    })
}

fn extract_txt(bytes: &[u8]) -> Result<String, ExtractError> {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    Ok(String::from_utf8(body.to_vec())?)
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY)
        .map_err(|_| ExtractError::Docx(format!("{} not found", DOCX_BODY)))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(format!(
            "{} exceeds size limit ({} bytes)",
            DOCX_BODY, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(docx_paragraphs(&doc_xml)?.join("\n"))
}

/// Collects the text of every `w:p` paragraph in document order.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    // Run boundaries can fall inside words; whitespace in w:t is significant.
    reader.config_mut().trim_text(false);

    let mut paragraphs = Vec::new();
    // Text boxes nest whole paragraphs inside a run of the outer one.
    let mut open: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => open.push(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => push_to(&mut open, "\t"),
                b"br" | b"cr" => push_to(&mut open, "\n"),
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                push_to(&mut open, &text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = open.pop() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(paragraphs)
}

fn push_to(open: &mut [String], s: &str) {
    if let Some(p) = open.last_mut() {
        p.push_str(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docx_with_body(body: &str) -> Vec<u8> {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(DOCX_BODY, zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn detects_formats_case_insensitively() {
        assert_eq!(
            DocumentFormat::from_filename("Report.PDF"),
            Some(DocumentFormat::Pdf)
        );
        assert_eq!(
            DocumentFormat::from_filename("notes.txt"),
            Some(DocumentFormat::Txt)
        );
        assert_eq!(
            DocumentFormat::from_filename("legacy.doc"),
            Some(DocumentFormat::Docx)
        );
        assert_eq!(DocumentFormat::from_filename("image.png"), None);
        assert_eq!(DocumentFormat::from_filename("README"), None);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let err = detect_format("slides.pptx").unwrap_err();
        assert!(matches!(err, DocumentError::UnsupportedFormat(ref e) if e == ".pptx"));
    }

    #[test]
    fn txt_is_decoded_and_bom_stripped() {
        let out = extract(b"\xEF\xBB\xBFhello world", DocumentFormat::Txt).unwrap();
        assert_eq!(out.text, "hello world");
        assert_eq!(out.pages, None);
    }

    #[test]
    fn invalid_utf8_txt_fails() {
        let err = extract(&[0x66, 0x6f, 0xff, 0xfe], DocumentFormat::Txt).unwrap_err();
        assert!(matches!(err, ExtractError::Encoding(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract(b"not a pdf", DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract(b"not a zip", DocumentFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_paragraphs_joined_by_newline() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>First </w:t></w:r><w:r><w:t>paragraph</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second</w:t><w:tab/><w:t>tabbed</w:t></w:r></w:p>",
        );
        let out = extract(&bytes, DocumentFormat::Docx).unwrap();
        assert_eq!(out.text, "First paragraph\nSecond\ttabbed");
        assert_eq!(out.pages, None);
    }

    #[test]
    fn docx_empty_paragraph_keeps_its_line() {
        let bytes = docx_with_body("<w:p><w:r><w:t>a</w:t></w:r></w:p><w:p/><w:p><w:r><w:t>b</w:t></w:r></w:p>");
        let out = extract(&bytes, DocumentFormat::Docx).unwrap();
        assert_eq!(out.text, "a\n\nb");
    }

    #[test]
    fn docx_text_box_keeps_surrounding_paragraph() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>Before box. </w:t></w:r>\
             <w:r><w:pict><v:shape><v:textbox><w:txbxContent>\
             <w:p><w:r><w:t>Inside box.</w:t></w:r></w:p>\
             </w:txbxContent></v:textbox></v:shape></w:pict></w:r>\
             <w:r><w:t>After box.</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Next.</w:t></w:r></w:p>",
        );
        let out = extract(&bytes, DocumentFormat::Docx).unwrap();
        assert_eq!(out.text, "Inside box.\nBefore box. After box.\nNext.");
    }

    #[test]
    fn docx_entities_are_unescaped() {
        let bytes = docx_with_body("<w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>");
        let out = extract(&bytes, DocumentFormat::Docx).unwrap();
        assert_eq!(out.text, "Fish & chips");
    }

    #[test]
    fn docx_without_body_fails() {
        use std::io::Write;
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = extract(&buf, DocumentFormat::Docx).unwrap_err();
        assert!(err.to_string().contains("word/document.xml not found"));
    }
}
