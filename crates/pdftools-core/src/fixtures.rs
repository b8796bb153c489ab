//! Test document builders
//!
//! Page `n` of a generated document is `width_base + n` points wide, so page
//! identity survives split and merge and can be checked through geometry.

use lopdf::{content::Content, content::Operation, Dictionary, Document, Object, Stream};

use crate::document::PdfDocument;
use crate::inspect::inspect;

/// Create a simple PDF with `num_pages` pages
pub fn create_test_pdf(num_pages: u32, width_base: i64) -> Vec<u8> {
    build_test_pdf(num_pages, width_base, None)
}

/// Create a PDF with an Info dictionary holding `title` and `author`
pub fn create_test_pdf_with_info(num_pages: u32, title: &str, author: &str) -> Vec<u8> {
    build_test_pdf(num_pages, 600, Some((title, author)))
}

fn build_test_pdf(num_pages: u32, width_base: i64, info: Option<(&str, &str)>) -> Vec<u8> {
    let mut doc = Document::with_version("1.7");
    let pages_id = doc.new_object_id();

    let mut page_ids = Vec::new();

    for i in 1..=num_pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new(
                    "Tf",
                    vec![Object::Name(b"F1".to_vec()), Object::Integer(12)],
                ),
                Operation::new("Td", vec![Object::Integer(100), Object::Integer(700)]),
                Operation::new(
                    "Tj",
                    vec![Object::String(
                        format!("Page {}", i).into_bytes(),
                        lopdf::StringFormat::Literal,
                    )],
                ),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));

        let page = Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(width_base + i64::from(i)),
                    Object::Integer(792),
                ]),
            ),
            ("Contents", Object::Reference(content_id)),
        ]);
        page_ids.push(doc.add_object(page));
    }

    let pages = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(num_pages as i64)),
        (
            "Kids",
            Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
        ),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog = Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]);
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    if let Some((title, author)) = info {
        let info_id = doc.add_object(Dictionary::from_iter(vec![
            ("Title", Object::string_literal(title)),
            ("Author", Object::string_literal(author)),
            ("Producer", Object::string_literal("pdftools tests")),
        ]));
        doc.trailer.set("Info", Object::Reference(info_id));
    }

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

/// Page widths in page order, read back through inspection
pub fn page_widths(doc: &PdfDocument) -> Vec<f64> {
    inspect(doc).pages.iter().map(|p| p.width).collect()
}
