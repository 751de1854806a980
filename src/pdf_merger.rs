use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lopdf::{Document, Object, ObjectId};
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::merger::PageMerger;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// In-process merging with `lopdf`, for machines without a PDF toolkit.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfMerger;

impl LopdfMerger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageMerger for LopdfMerger {
    async fn merge(&self, pages: &[PathBuf], dest: &Path) -> Result<()> {
        let mut documents = Vec::with_capacity(pages.len());
        for path in pages {
            let data = fs::read(path).await.map_err(|e| Error::io(path, e))?;
            let document = Document::load_mem(&data).map_err(|e| {
                Error::merge(dest, format!("failed to parse {}: {}", path.display(), e))
            })?;
            debug!("Loaded PDF with {} pages from {}", document.get_pages().len(), path.display());
            documents.push(document);
        }

        let mut merged = merge_documents(documents).map_err(|reason| Error::merge(dest, reason))?;

        let mut data = Vec::new();
        merged
            .save_to(&mut data)
            .map_err(|e| Error::merge(dest, format!("failed to serialize merged PDF: {e}")))?;

        fs::write(dest, data).await.map_err(|e| Error::io(dest, e))?;

        info!("Successfully merged {} PDFs into {}", pages.len(), dest.display());
        Ok(())
    }
}

/// Appends the pages of every document, in order, to the first one's page tree.
pub fn merge_documents(documents: Vec<Document>) -> std::result::Result<Document, String> {
    let mut documents = documents.into_iter();
    let mut merged = documents.next().ok_or("no PDFs to merge")?;
    if documents.as_slice().is_empty() {
        return Ok(merged);
    }

    let mut all_page_ids: Vec<ObjectId> = merged.get_pages().into_values().collect();
    let mut max_id = merged.max_id;

    for mut document in documents {
        // Renumber objects to avoid conflicts
        document.renumber_objects_with(max_id + 1);
        max_id = document.max_id;

        all_page_ids.extend(document.get_pages().into_values());
        merged.objects.extend(document.objects);
    }
    merged.max_id = max_id;

    let pages_id = root_pages_id(&merged)?;

    // Flattening the tree loses ancestors, so copy what each page inherited first
    let inherited: Vec<(ObjectId, Vec<(Vec<u8>, Object)>)> = all_page_ids
        .iter()
        .map(|&page_id| (page_id, inherited_attributes(&merged, page_id, pages_id)))
        .collect();

    for (page_id, attributes) in inherited {
        let page = merged
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| format!("page {page_id:?} is not a dictionary: {e}"))?;
        for (key, value) in attributes {
            page.set(key, value);
        }
        page.set("Parent", Object::Reference(pages_id));
    }

    let count = all_page_ids.len() as i64;
    let pages = merged
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| format!("page tree root is not a dictionary: {e}"))?;
    pages.set(
        "Kids",
        Object::Array(all_page_ids.into_iter().map(Object::Reference).collect()),
    );
    pages.set("Count", Object::Integer(count));

    merged.prune_objects();
    info!("Finalizing merged PDF with {} total pages", count);
    Ok(merged)
}

fn root_pages_id(document: &Document) -> std::result::Result<ObjectId, String> {
    document
        .catalog()
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| format!("missing page tree root: {e}"))
}

/// Attributes the page does not carry itself but gets from an ancestor other than `root`.
fn inherited_attributes(document: &Document, page_id: ObjectId, root: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = document.get_dictionary(page_id) else {
        return Vec::new();
    };

    let mut found: Vec<(Vec<u8>, Object)> = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(node_id) = parent {
        depth += 1;
        if depth > 64 {
            break;
        }
        let Ok(node) = document.get_dictionary(node_id) else {
            break;
        };
        // The root's own attributes still apply after re-parenting
        if node_id != root {
            for key in INHERITABLE {
                if page.has(key) || found.iter().any(|(k, _)| k == key) {
                    continue;
                }
                if let Ok(value) = node.get(key) {
                    found.push((key.to_vec(), value.clone()));
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    found
}
