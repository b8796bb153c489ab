//! Read-only document inspection
//!
//! Reports page count, size, per-page geometry and Info-dictionary metadata.
//! Metadata fields are always present; missing values fall back to fixed
//! placeholders. A page whose geometry cannot be read is reported as a zeroed
//! entry instead of failing the whole inspection.

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use tracing::warn;

use crate::document::PdfDocument;

pub const DEFAULT_TITLE: &str = "Untitled";
pub const DEFAULT_AUTHOR: &str = "Unknown";

const MAX_TREE_DEPTH: usize = 64;

/// Page orientation
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PageOrientation {
    Portrait,
    Landscape,
    Square,
    Unknown,
}

/// Geometry of a single page
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageGeometry {
    /// Page number (1-indexed)
    pub page_number: u32,
    /// Page width in points (1 point = 1/72 inch)
    pub width: f64,
    /// Page height in points
    pub height: f64,
    /// Page rotation in degrees (0, 90, 180, 270)
    pub rotation: i32,
    /// Orientation after applying rotation
    pub orientation: PageOrientation,
}

impl PageGeometry {
    fn placeholder(page_number: u32) -> Self {
        Self {
            page_number,
            width: 0.0,
            height: 0.0,
            rotation: 0,
            orientation: PageOrientation::Unknown,
        }
    }
}

/// Info dictionary values with placeholders for anything absent
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub creator: String,
    pub producer: String,
    pub creation_date: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            subject: String::new(),
            creator: String::new(),
            producer: String::new(),
            creation_date: String::new(),
        }
    }
}

/// Inspection result
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DocumentInfo {
    pub total_pages: u32,
    pub file_size: usize,
    pub file_size_mb: f64,
    #[serde(flatten)]
    pub metadata: DocumentMetadata,
    #[serde(rename = "pages_info")]
    pub pages: Vec<PageGeometry>,
}

/// Inspect a loaded document
pub fn inspect(doc: &PdfDocument) -> DocumentInfo {
    let inner = doc.inner();
    let pages: Vec<PageGeometry> = doc
        .page_ids()
        .into_iter()
        .map(|(page_number, page_id)| {
            page_geometry(inner, page_number, page_id).unwrap_or_else(|e| {
                warn!("Could not read geometry of page {}: {}", page_number, e);
                PageGeometry::placeholder(page_number)
            })
        })
        .collect();

    let file_size = doc.source_len();

    DocumentInfo {
        total_pages: pages.len() as u32,
        file_size,
        file_size_mb: (file_size as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0,
        metadata: read_metadata(inner),
        pages,
    }
}

fn page_geometry(
    doc: &Document,
    page_number: u32,
    page_id: ObjectId,
) -> Result<PageGeometry, String> {
    let page_dict = doc
        .get_dictionary(page_id)
        .map_err(|_| format!("Page {} is not a dictionary", page_number))?;

    let media_box = inherited(doc, page_dict, b"MediaBox")
        .ok_or_else(|| "MediaBox not found".to_string())
        .and_then(|obj| {
            obj.as_array()
                .map_err(|_| "MediaBox is not an array".to_string())
        })
        .and_then(|array| parse_box_array(array))?;

    let width = (media_box[2] - media_box[0]).abs();
    let height = (media_box[3] - media_box[1]).abs();

    let rotation = inherited(doc, page_dict, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .map(|angle| normalize_rotation(angle as i32))
        .unwrap_or(0);

    // Orientation is judged on the displayed page, after rotation
    let (effective_width, effective_height) = if rotation == 90 || rotation == 270 {
        (height, width)
    } else {
        (width, height)
    };

    let orientation = if (effective_width - effective_height).abs() < 1.0 {
        PageOrientation::Square
    } else if effective_width > effective_height {
        PageOrientation::Landscape
    } else {
        PageOrientation::Portrait
    };

    Ok(PageGeometry {
        page_number,
        width,
        height,
        rotation,
        orientation,
    })
}

/// Look `key` up on the page, then up the `Parent` chain
fn inherited<'a>(doc: &'a Document, page: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let mut node = page;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        let parent_id = node.get(b"Parent").and_then(Object::as_reference).ok()?;
        node = doc.get_dictionary(parent_id).ok()?;
    }
    None
}

/// Parse a box array [x1, y1, x2, y2]
fn parse_box_array(array: &[Object]) -> Result<[f64; 4], String> {
    if array.len() != 4 {
        return Err("MediaBox must have 4 elements".to_string());
    }

    let mut result = [0.0; 4];
    for (i, obj) in array.iter().enumerate() {
        result[i] = match obj {
            Object::Integer(n) => *n as f64,
            Object::Real(n) => *n as f64,
            _ => return Err(format!("MediaBox element {} is not a number", i)),
        };
    }

    Ok(result)
}

/// Normalize rotation to 0, 90, 180, or 270
fn normalize_rotation(angle: i32) -> i32 {
    let normalized = angle % 360;
    if normalized < 0 {
        normalized + 360
    } else {
        normalized
    }
}

fn read_metadata(doc: &Document) -> DocumentMetadata {
    let mut metadata = DocumentMetadata::default();

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let Some(info) = info else {
        return metadata;
    };

    let text = |key: &[u8]| -> Option<String> {
        let value = match info.get(key).ok()? {
            Object::Reference(id) => doc.get_object(*id).ok()?,
            other => other,
        };
        let decoded = decode_text(value.as_str().ok()?);
        (!decoded.is_empty()).then_some(decoded)
    };

    if let Some(title) = text(b"Title") {
        metadata.title = title;
    }
    if let Some(author) = text(b"Author") {
        metadata.author = author;
    }
    metadata.subject = text(b"Subject").unwrap_or_default();
    metadata.creator = text(b"Creator").unwrap_or_default();
    metadata.producer = text(b"Producer").unwrap_or_default();
    metadata.creation_date = text(b"CreationDate").unwrap_or_default();

    metadata
}

/// Decode a PDF text string: UTF-16BE when it carries a BOM, otherwise lossy UTF-8
fn decode_text(bytes: &[u8]) -> String {
    let decoded = match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    };
    decoded.trim_end_matches('\0').trim().to_string()
}
