//! PDF page operations
//!
//! Split, extract, merge and inspection of PDF documents using lopdf, plus the
//! page-selection rules they share and ZIP bundling of multi-document results.
//!
//! All operations work on in-memory bytes. Inputs are never modified; every
//! operation builds new documents.

pub mod bundle;
pub mod document;
pub mod error;
pub mod inspect;
pub mod merge;
pub mod selection;
pub mod split;

#[cfg(test)]
mod fixtures;

pub use bundle::{file_stem, page_entry_name, range_entry_name, zip_bundle};
pub use document::PdfDocument;
pub use error::PdfToolsError;
pub use inspect::{inspect, DocumentInfo, DocumentMetadata, PageGeometry, PageOrientation};
pub use merge::{merge_documents, MAX_MERGE_INPUTS};
pub use selection::{
    parse_page_list, parse_range_list, resolve_enumerated, resolve_ranges, PageRange,
};
pub use split::{extract_pages, split_by_page, split_by_ranges};

/// Parse PDF bytes and return the page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, PdfToolsError> {
    Ok(PdfDocument::load(bytes)?.page_count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::create_test_pdf;

    #[test]
    fn test_get_page_count() {
        assert_eq!(get_page_count(&create_test_pdf(7, 600)).unwrap(), 7);
        assert!(get_page_count(b"not a pdf").is_err());
    }

    #[test]
    fn test_split_then_merge_restores_page_order() {
        let doc = PdfDocument::load(&create_test_pdf(4, 600)).unwrap();
        let parts = split_by_page(&doc).unwrap();

        let merged = merge_documents(&parts).unwrap();
        let reloaded = PdfDocument::load(&merged.into_bytes().unwrap()).unwrap();

        let widths: Vec<f64> = inspect(&reloaded).pages.iter().map(|p| p.width).collect();
        assert_eq!(widths, vec![601.0, 602.0, 603.0, 604.0]);
    }
}
