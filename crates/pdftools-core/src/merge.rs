//! PDF Merge algorithm
//!
//! Combines 2 to [`MAX_MERGE_INPUTS`] documents into a single document.

use lopdf::{Document, Object, ObjectId};
use tracing::debug;

use crate::document::PdfDocument;
use crate::error::PdfToolsError;

/// Largest number of inputs accepted by one merge
pub const MAX_MERGE_INPUTS: usize = 10;

/// Attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against cyclic `Parent` chains in malformed files
const MAX_TREE_DEPTH: usize = 64;

/// Merge documents in the order given
///
/// The algorithm:
/// 1. Check the input count (2..=10) and that every input has pages
/// 2. Start from a copy of the first document
/// 3. For each further document:
///    a. Calculate ID offset to avoid conflicts
///    b. Import all objects with remapped IDs
///    c. Append its pages to the destination page list
/// 4. Rebuild a flat page tree: inherited attributes are copied onto each
///    page and every page is re-parented onto the destination `Pages` node
/// 5. Prune objects left unreachable (the inputs' catalogs and page trees)
pub fn merge_documents(documents: &[PdfDocument]) -> Result<PdfDocument, PdfToolsError> {
    if documents.len() < 2 {
        return Err(PdfToolsError::EmptyInputSet {
            count: documents.len(),
        });
    }
    if documents.len() > MAX_MERGE_INPUTS {
        return Err(PdfToolsError::TooManyInputs {
            count: documents.len(),
            max: MAX_MERGE_INPUTS,
        });
    }

    // Every input must be usable before anything is copied
    for (i, doc) in documents.iter().enumerate() {
        doc.require_pages().map_err(|_| {
            PdfToolsError::CorruptDocument(format!("Document {} has no pages", i + 1))
        })?;
    }

    let mut dest = documents[0].inner().clone();
    let mut dest_max_id = dest.max_id;
    let mut dest_page_refs = get_page_references(&dest);

    for source in &documents[1..] {
        let source = source.inner();
        let id_offset = dest_max_id;

        for (old_id, object) in source.objects.iter() {
            let new_id = (old_id.0 + id_offset, old_id.1);
            dest.objects
                .insert(new_id, remap_object_refs(object.clone(), id_offset));
        }

        dest_page_refs.extend(
            get_page_references(source)
                .into_iter()
                .map(|id| (id.0 + id_offset, id.1)),
        );

        dest_max_id = (source.max_id + id_offset).max(dest_max_id);
    }

    dest.max_id = dest_max_id;
    update_page_tree(&mut dest, &dest_page_refs)?;
    dest.prune_objects();

    debug!(
        "Merged {} documents into {} pages",
        documents.len(),
        dest_page_refs.len()
    );

    Ok(PdfDocument::from_inner(dest))
}

/// Get all page object references from a document, in page order
fn get_page_references(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().values().copied().collect()
}

/// Recursively remap object references in an object
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

/// Collect attributes a page inherits but does not define itself
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(&'static [u8], Object)> {
    let Some(Object::Dictionary(page)) = doc.objects.get(&page_id) else {
        return Vec::new();
    };

    let mut missing: Vec<&'static [u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    let mut found = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(parent_id) = parent {
        if missing.is_empty() || depth >= MAX_TREE_DEPTH {
            break;
        }
        let Some(Object::Dictionary(node)) = doc.objects.get(&parent_id) else {
            break;
        };

        missing.retain(|key| match node.get(key) {
            Ok(value) => {
                found.push((*key, value.clone()));
                false
            }
            Err(_) => true,
        });

        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }

    found
}

/// Point the root `Pages` node at `page_refs` and re-parent every page onto it
fn update_page_tree(doc: &mut Document, page_refs: &[ObjectId]) -> Result<(), PdfToolsError> {
    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfToolsError::OperationFailed("No Root in trailer".into()))?;

    let pages_id = doc
        .objects
        .get(&catalog_id)
        .ok_or_else(|| PdfToolsError::OperationFailed("Catalog not found".into()))?
        .as_dict()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|_| PdfToolsError::OperationFailed("Invalid catalog".into()))?;

    let inherited: Vec<_> = page_refs
        .iter()
        .map(|&id| inherited_attributes(doc, id))
        .collect();

    for (&page_id, attributes) in page_refs.iter().zip(inherited) {
        if let Some(Object::Dictionary(page)) = doc.objects.get_mut(&page_id) {
            for (key, value) in attributes {
                page.set(key, value);
            }
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    if let Some(Object::Dictionary(ref mut pages_dict)) = doc.objects.get_mut(&pages_id) {
        let kids = page_refs
            .iter()
            .map(|&id| Object::Reference(id))
            .collect::<Vec<_>>();
        pages_dict.set("Kids", Object::Array(kids));
        pages_dict.set("Count", Object::Integer(page_refs.len() as i64));
    } else {
        return Err(PdfToolsError::OperationFailed(
            "Invalid pages dictionary".into(),
        ));
    }

    Ok(())
}
