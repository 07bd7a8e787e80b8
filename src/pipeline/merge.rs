//! Combine single-page PDFs into one document, in the order given.
//!
//! Each input is renumbered into a disjoint object-id range, its page
//! objects are re-parented under a single page tree, and the result is
//! compacted. Outlines are dropped; nothing else in the inputs is altered.

use crate::error::Pdf2HtmlError;
use lopdf::{Document, Object, ObjectId};
use std::collections::BTreeMap;
use tracing::debug;

fn merge_err(detail: impl Into<String>) -> Pdf2HtmlError {
    Pdf2HtmlError::MergeFailed(detail.into())
}

/// Merge PDF documents (as bytes) into one. Page order follows `inputs`,
/// then each input's own page order.
pub fn merge_pdfs(inputs: &[Vec<u8>]) -> Result<Vec<u8>, Pdf2HtmlError> {
    if inputs.is_empty() {
        return Err(merge_err("no documents to merge"));
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for (i, bytes) in inputs.iter().enumerate() {
        let mut doc = Document::load_mem(bytes)
            .map_err(|e| merge_err(format!("document {}: {}", i + 1, e)))?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        for (_, page_id) in doc.get_pages() {
            let page = doc
                .get_object(page_id)
                .map_err(|e| merge_err(format!("document {}: {}", i + 1, e)))?
                .to_owned();
            pages.push((page_id, page));
        }
        objects.extend(doc.objects);
    }

    let mut document = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Object)> = None;
    let mut pages_root: Option<(ObjectId, Object)> = None;

    for (object_id, object) in objects {
        match object.type_name().unwrap_or("") {
            "Catalog" => {
                if catalog.is_none() {
                    catalog = Some((object_id, object));
                }
            }
            "Pages" => {
                // Fold every tree root into the first one so inheritable
                // attributes (MediaBox, Resources) survive.
                if let Ok(dictionary) = object.as_dict() {
                    let mut dictionary = dictionary.clone();
                    let id = match pages_root.take() {
                        Some((id, existing)) => {
                            if let Ok(old) = existing.as_dict() {
                                dictionary.extend(old);
                            }
                            id
                        }
                        None => object_id,
                    };
                    pages_root = Some((id, Object::Dictionary(dictionary)));
                }
            }
            "Page" | "Outlines" | "Outline" => {}
            _ => {
                document.objects.insert(object_id, object);
            }
        }
    }

    let (pages_id, pages_object) = pages_root.ok_or_else(|| merge_err("no page tree found"))?;
    let (catalog_id, catalog_object) = catalog.ok_or_else(|| merge_err("no catalog found"))?;

    for (object_id, object) in &pages {
        if let Ok(dictionary) = object.as_dict() {
            let mut dictionary = dictionary.clone();
            dictionary.set("Parent", pages_id);
            document
                .objects
                .insert(*object_id, Object::Dictionary(dictionary));
        }
    }

    let mut tree = pages_object
        .as_dict()
        .map_err(|e| merge_err(format!("page tree: {}", e)))?
        .clone();
    tree.set("Count", pages.len() as i64);
    tree.set(
        "Kids",
        pages
            .iter()
            .map(|(id, _)| Object::Reference(*id))
            .collect::<Vec<_>>(),
    );
    document.objects.insert(pages_id, Object::Dictionary(tree));

    let mut root = catalog_object
        .as_dict()
        .map_err(|e| merge_err(format!("catalog: {}", e)))?
        .clone();
    root.set("Pages", pages_id);
    root.remove(b"Outlines");
    document.objects.insert(catalog_id, Object::Dictionary(root));

    document.trailer.set("Root", catalog_id);
    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.adjust_zero_pages();
    document.compress();

    let mut buf = Vec::new();
    document
        .save_to(&mut buf)
        .map_err(|e| merge_err(e.to_string()))?;

    debug!(
        "Merged {} documents → {} pages, {} bytes",
        inputs.len(),
        pages.len(),
        buf.len()
    );
    Ok(buf)
}
