//! Text extraction for uploaded documents.
//!
//! Turns a [`Document`]'s raw bytes into per-page text ready for the
//! chunker. PDFs are extracted page by page so chunks can carry page
//! numbers; plain text is a single unpaged block.

use crate::error::{QaError, Result};
use crate::models::{Document, DocumentFormat, PageText};

/// Extract page texts from a document.
///
/// Pages that contain only whitespace are dropped. A document with no
/// extractable text at all is a [`QaError::DocumentLoad`].
pub fn load_document(doc: &Document) -> Result<Vec<PageText>> {
    let pages = match doc.format {
        DocumentFormat::Pdf => extract_pdf(&doc.name, &doc.bytes)?,
        DocumentFormat::Text => vec![PageText {
            page: None,
            text: decode_text(&doc.name, &doc.bytes)?,
        }],
    };

    let pages: Vec<PageText> = pages
        .into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .collect();

    if pages.is_empty() {
        return Err(QaError::load(&doc.name, "no extractable text"));
    }
    Ok(pages)
}

fn extract_pdf(name: &str, bytes: &[u8]) -> Result<Vec<PageText>> {
    if !bytes.starts_with(b"%PDF") {
        return Err(QaError::load(name, "missing %PDF header"));
    }

    // pdf-extract panics on some malformed inputs instead of returning an error.
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| QaError::load(name, "PDF parser panicked on malformed input"))?
        .map_err(|e| QaError::load(name, format!("PDF extraction failed: {}", e)))?;

    Ok(extracted
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText {
            page: Some(i as u32 + 1),
            text: normalize_newlines(&text),
        })
        .collect())
}

fn decode_text(name: &str, bytes: &[u8]) -> Result<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|e| QaError::load(name, format!("text is not valid UTF-8: {}", e)))?;
    Ok(normalize_newlines(text))
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
