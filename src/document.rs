//! Text extraction from uploaded documents.
//!
//! Parsing PDFs is delegated to a `PdfParser`; this module only checks that
//! the upload is a PDF and stitches the per-page text together.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;

pub const PDF_MIME: &str = "application/pdf";
const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Not a PDF file: {0}")]
    InvalidFileType(String),

    #[error("Could not read document: {0}")]
    Extraction(String),

    #[error("Document contains no text")]
    Empty,
}

/// Pages of an opened document, read one at a time
#[async_trait]
pub trait PageTextSource: Send {
    fn page_count(&self) -> usize;

    /// Text items of a zero-based page, in reading order
    async fn page_items(&mut self, index: usize) -> Result<Vec<String>, DocumentError>;
}

pub trait PdfParser: Send + Sync {
    fn open(&self, bytes: Bytes) -> Result<Box<dyn PageTextSource>, DocumentError>;
}

/// An upload as the host received it
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub mime: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, mime: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime: mime.map(|m| m.to_string()),
            bytes: bytes.into(),
        }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, None, bytes))
    }
}

/// True if the upload claims to be, or starts like, a PDF
pub fn looks_like_pdf(file: &UploadedFile) -> bool {
    file.bytes.starts_with(PDF_MAGIC)
        || file
            .mime
            .as_deref()
            .map(|m| m.eq_ignore_ascii_case(PDF_MIME))
            .unwrap_or(false)
        || Path::new(&file.name)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
}

/// Accept the upload only if it declares or looks like a PDF and carries
/// the `%PDF-` signature.
pub fn validate_pdf(file: &UploadedFile) -> Result<(), DocumentError> {
    let declared = match file.mime.as_deref() {
        Some(mime) => mime.eq_ignore_ascii_case(PDF_MIME),
        None => Path::new(&file.name)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false),
    };

    if !declared || !file.bytes.starts_with(PDF_MAGIC) {
        return Err(DocumentError::InvalidFileType(file.name.clone()));
    }
    Ok(())
}

pub async fn extract_text(file: &UploadedFile, parser: &dyn PdfParser) -> Result<String, DocumentError> {
    validate_pdf(file)?;

    let mut source = parser.open(file.bytes.clone())?;
    let mut pages = Vec::with_capacity(source.page_count());
    for index in 0..source.page_count() {
        let items = source.page_items(index).await?;
        pages.push(items.join(" "));
    }

    let text = pages.join(" ").trim().to_string();
    if text.is_empty() {
        return Err(DocumentError::Empty);
    }

    log::info!(
        "Extracted {} characters from {} ({} pages)",
        text.chars().count(),
        file.name,
        pages.len()
    );
    Ok(text)
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;

    pub struct FakeParser {
        pub pages: Vec<Vec<&'static str>>,
    }

    struct FakeSource {
        pages: Vec<Vec<String>>,
    }

    #[async_trait]
    impl PageTextSource for FakeSource {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        async fn page_items(&mut self, index: usize) -> Result<Vec<String>, DocumentError> {
            self.pages
                .get(index)
                .cloned()
                .ok_or_else(|| DocumentError::Extraction(format!("page {} missing", index)))
        }
    }

    impl PdfParser for FakeParser {
        fn open(&self, _bytes: Bytes) -> Result<Box<dyn PageTextSource>, DocumentError> {
            Ok(Box::new(FakeSource {
                pages: self
                    .pages
                    .iter()
                    .map(|p| p.iter().map(|s| s.to_string()).collect())
                    .collect(),
            }))
        }
    }
}
