//! Loaded PDF handle
//!
//! Wraps a parsed lopdf document. Operations borrow it and always build new
//! documents; the source is never modified.

use std::collections::{BTreeMap, HashSet};

use lopdf::{Document, ObjectId};

use crate::error::PdfToolsError;

#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: Document,
    source_len: usize,
}

impl PdfDocument {
    /// Parse PDF bytes. Any parse failure is reported as a corrupt document.
    pub fn load(bytes: &[u8]) -> Result<Self, PdfToolsError> {
        if bytes.is_empty() {
            return Err(PdfToolsError::CorruptDocument("File is empty".into()));
        }

        let inner =
            Document::load_mem(bytes).map_err(|e| PdfToolsError::CorruptDocument(e.to_string()))?;

        Ok(Self {
            inner,
            source_len: bytes.len(),
        })
    }

    pub(crate) fn from_inner(inner: Document) -> Self {
        Self {
            inner,
            source_len: 0,
        }
    }

    pub(crate) fn inner(&self) -> &Document {
        &self.inner
    }

    /// Number of pages in the document
    pub fn page_count(&self) -> u32 {
        self.inner.get_pages().len() as u32
    }

    /// A document without pages cannot be split, merged or converted
    pub fn require_pages(&self) -> Result<(), PdfToolsError> {
        if self.page_count() == 0 {
            return Err(PdfToolsError::CorruptDocument("Document has no pages".into()));
        }
        Ok(())
    }

    /// Size in bytes of the input this document was loaded from (0 for built documents)
    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// Page object ids keyed by 1-based page number
    pub(crate) fn page_ids(&self) -> BTreeMap<u32, ObjectId> {
        self.inner.get_pages()
    }

    /// Build a new document keeping only `pages` (1-based, already validated).
    ///
    /// Pages keep their original relative order.
    pub(crate) fn select_pages(&self, pages: &[u32]) -> Result<Self, PdfToolsError> {
        let page_count = self.page_count();
        if let Some(&page) = pages.iter().find(|&&p| p == 0 || p > page_count) {
            return Err(PdfToolsError::OperationFailed(format!(
                "Page {} does not exist (document has {} pages)",
                page, page_count
            )));
        }

        let keep: HashSet<u32> = pages.iter().copied().collect();
        let to_delete: Vec<u32> = (1..=page_count).filter(|p| !keep.contains(p)).collect();

        let mut doc = self.inner.clone();
        if !to_delete.is_empty() {
            doc.delete_pages(&to_delete);
            doc.prune_objects();
        }

        Ok(Self::from_inner(doc))
    }

    /// Serialize the document, compressing streams first
    pub fn into_bytes(self) -> Result<Vec<u8>, PdfToolsError> {
        let mut doc = self.inner;
        doc.compress();

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| PdfToolsError::OperationFailed(format!("Save failed: {}", e)))?;

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{create_test_pdf, page_widths};

    #[test]
    fn test_load_reports_page_count_and_size() {
        let pdf = create_test_pdf(4, 600);
        let doc = PdfDocument::load(&pdf).unwrap();
        assert_eq!(doc.page_count(), 4);
        assert_eq!(doc.source_len(), pdf.len());
    }

    #[test]
    fn test_load_empty_bytes_is_corrupt() {
        let err = PdfDocument::load(&[]).unwrap_err();
        assert!(matches!(err, PdfToolsError::CorruptDocument(_)));
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let err = PdfDocument::load(b"%PDF-1.7 definitely not a pdf").unwrap_err();
        assert!(matches!(err, PdfToolsError::CorruptDocument(_)));
    }

    #[test]
    fn test_require_pages() {
        let empty = PdfDocument::load(&create_test_pdf(0, 600)).unwrap();
        assert!(matches!(
            empty.require_pages(),
            Err(PdfToolsError::CorruptDocument(_))
        ));
        let doc = PdfDocument::load(&create_test_pdf(1, 600)).unwrap();
        assert!(doc.require_pages().is_ok());
    }

    #[test]
    fn test_select_pages_keeps_document_order() {
        let doc = PdfDocument::load(&create_test_pdf(5, 600)).unwrap();
        let selected = doc.select_pages(&[2, 4]).unwrap();
        assert_eq!(page_widths(&selected), vec![602.0, 604.0]);
        // Source untouched
        assert_eq!(doc.page_count(), 5);
    }

    #[test]
    fn test_select_pages_rejects_missing_page() {
        let doc = PdfDocument::load(&create_test_pdf(2, 600)).unwrap();
        assert!(doc.select_pages(&[3]).is_err());
    }

    #[test]
    fn test_into_bytes_reloads() {
        let doc = PdfDocument::load(&create_test_pdf(3, 600)).unwrap();
        let bytes = doc.select_pages(&[1, 3]).unwrap().into_bytes().unwrap();
        let reloaded = PdfDocument::load(&bytes).unwrap();
        assert_eq!(page_widths(&reloaded), vec![601.0, 603.0]);
    }
}
