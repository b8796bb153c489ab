//! Split and extract operations
//!
//! Pages are carried over with "Construction by Whitelist": the source is
//! cloned, every page outside the selection is deleted, and objects no longer
//! reachable from the trailer are pruned.

use tracing::debug;

use crate::document::PdfDocument;
use crate::error::PdfToolsError;
use crate::selection::{resolve_enumerated, resolve_ranges, PageRange};

/// One single-page document per page, in page order. A document without
/// pages is rejected rather than split into nothing.
pub fn split_by_page(doc: &PdfDocument) -> Result<Vec<PdfDocument>, PdfToolsError> {
    doc.require_pages()?;
    let total_pages = doc.page_count();
    debug!("Splitting {} pages into single-page documents", total_pages);

    (1..=total_pages)
        .map(|page| doc.select_pages(&[page]))
        .collect()
}

/// One document per requested range, in the order the ranges were given.
///
/// The whole range list is validated before any output is built.
pub fn split_by_ranges(
    doc: &PdfDocument,
    ranges: &[(i64, i64)],
) -> Result<Vec<(PageRange, PdfDocument)>, PdfToolsError> {
    let ranges = resolve_ranges(ranges, doc.page_count())?;
    debug!("Splitting document into {} ranges", ranges.len());

    ranges
        .into_iter()
        .map(|range| {
            let pages: Vec<u32> = range.pages().collect();
            Ok((range, doc.select_pages(&pages)?))
        })
        .collect()
}

/// A single document holding the requested pages, deduplicated and ascending.
///
/// Returns the resolved page list alongside the document.
pub fn extract_pages(
    doc: &PdfDocument,
    pages: &[i64],
) -> Result<(Vec<u32>, PdfDocument), PdfToolsError> {
    let pages = resolve_enumerated(pages, doc.page_count())?;
    debug!("Extracting pages {:?}", pages);

    let extracted = doc.select_pages(&pages)?;
    Ok((pages, extracted))
}
