//! In-memory ZIP bundles for multi-document results

use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PdfToolsError;
use crate::selection::PageRange;

/// Build a deflated ZIP archive from `(entry name, contents)` pairs
pub fn zip_bundle(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, PdfToolsError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, contents) in entries {
        writer
            .start_file(name.as_str(), options)
            .map_err(|e| PdfToolsError::Bundle(e.to_string()))?;
        writer
            .write_all(contents)
            .map_err(|e| PdfToolsError::Bundle(e.to_string()))?;
    }

    let archive = writer
        .finish()
        .map_err(|e| PdfToolsError::Bundle(e.to_string()))?
        .into_inner();

    debug!("Bundled {} entries into {} bytes", entries.len(), archive.len());
    Ok(archive)
}

/// File name without a trailing `.pdf` (any case) and without directories
pub fn file_stem(filename: &str) -> &str {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    match name.len().checked_sub(4) {
        Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".pdf") => {
            &name[..cut]
        }
        _ => name,
    }
}

/// `{stem}_page_{NN}.pdf`, zero padded to the width of `total_pages`
pub fn page_entry_name(stem: &str, page: u32, total_pages: u32) -> String {
    let width = total_pages.to_string().len();
    format!("{}_page_{:0width$}.pdf", stem, page, width = width)
}

/// `{stem}_pages_{start}-{end}.pdf`
pub fn range_entry_name(stem: &str, range: &PageRange) -> String {
    format!("{}_pages_{}-{}.pdf", stem, range.start, range.end)
}
