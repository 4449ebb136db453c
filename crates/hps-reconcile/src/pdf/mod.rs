//! PDF handling for clearance paperwork: fillable forms and authority lists.

pub mod bulk;
pub mod forms;
mod layout;

use lopdf::{Document, Object, StringFormat};

pub use bulk::{is_authority_pdf, AuthorityListKind, AuthorityRow};
pub use forms::{extract_fields, fill_fields, read_form_fields, FilledForm, FormField};

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("unreadable PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("failed to write PDF: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF has no extractable text")]
    NoText,
    #[error("form field '{0}' is not an indirect object and cannot be updated")]
    InlineField(String),
}

/// Full-text extraction seam; documents it cannot read are skipped by callers.
pub trait PdfTextExtractor: Send + Sync {
    fn extract_text(&self, pdf: &[u8]) -> Result<String, PdfError>;
}

/// Layout-preserving text extraction over `lopdf`'s content stream decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfTextExtractor;

impl PdfTextExtractor for LopdfTextExtractor {
    fn extract_text(&self, pdf: &[u8]) -> Result<String, PdfError> {
        let document = Document::load_mem(pdf)?;
        let text = layout::document_text(&document)?;
        if text.trim().is_empty() {
            return Err(PdfError::NoText);
        }
        Ok(text)
    }
}

/// PDFDocEncoding code points for 0x80..=0x9F, where it departs from Latin-1.
const PDF_DOC_HIGH: [char; 32] = [
    '\u{2022}', '\u{2020}', '\u{2021}', '\u{2026}', '\u{2014}', '\u{2013}', '\u{0192}', '\u{2044}',
    '\u{2039}', '\u{203A}', '\u{2212}', '\u{2030}', '\u{201E}', '\u{201C}', '\u{201D}', '\u{2018}',
    '\u{2019}', '\u{201A}', '\u{2122}', '\u{FB01}', '\u{FB02}', '\u{0141}', '\u{0152}', '\u{0160}',
    '\u{0178}', '\u{017D}', '\u{0131}', '\u{0142}', '\u{0153}', '\u{0161}', '\u{017E}', '\u{FFFD}',
];

/// Decodes a PDF text string (UTF-16BE with BOM, otherwise PDFDocEncoding).
pub(crate) fn decode_text(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes
        .iter()
        .map(|byte| match byte {
            0x80..=0x9F => PDF_DOC_HIGH[usize::from(byte - 0x80)],
            0xA0 => '\u{20AC}',
            _ => char::from(*byte),
        })
        .collect()
}

/// Encodes a value as a PDF text string, using UTF-16BE only when needed.
pub(crate) fn encode_text(value: &str) -> Object {
    if value.is_ascii() {
        return Object::String(value.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in value.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// Follows one level of indirection.
pub(crate) fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}
