//! Document assembly: page ranges, merges and image pages → serialised PDFs.
//!
//! All three builders work on the object graph directly (structural copy);
//! page content is never rasterised or re-rendered.
//!
//! ## Why clone-and-delete for ranges?
//!
//! Deleting the pages outside a range and pruning what became unreachable
//! keeps every object the remaining pages depend on (fonts, images, shared
//! resources) without walking the dependency graph by hand.
//!
//! ## Why an `Arc<Document>` for splits?
//!
//! The two halves of a split are assembled concurrently on blocking threads.
//! Each side clones from the same read-only parse, so the source is decoded
//! once and never mutated.

use crate::error::ForgeError;
use crate::pipeline::codec::{DecodedImage, EncodeOptions, ImageCodec};
use crate::pipeline::partition::{PageRange, SplitPlan};
use crate::progress::ProgressCallback;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Resolution used to size image pages.
pub const IMAGE_PAGE_DPI: f32 = 300.0;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

// ── Page ranges ──────────────────────────────────────────────────────────

/// Serialise the pages of `range` as a standalone document.
pub fn assemble(source: &Document, range: &PageRange) -> Result<Vec<u8>, ForgeError> {
    let mut doc = source.clone();
    let total = doc.get_pages().len();
    if range.is_empty() || range.end_exclusive > total {
        return Err(ForgeError::AssemblyFailed {
            detail: format!(
                "page range {}..{} is outside a {total}-page document",
                range.first_page(),
                range.last_page()
            ),
        });
    }

    // lopdf page numbers are 1-based.
    let doomed: Vec<u32> = (0..total)
        .filter(|i| !range.contains(*i))
        .map(|i| (i + 1) as u32)
        .collect();
    doc.delete_pages(&doomed);
    doc.prune_objects();
    doc.renumber_objects();
    doc.compress();

    let bytes = save(&mut doc)?;
    debug!(
        "Assembled pages {}-{} → {} bytes",
        range.first_page(),
        range.last_page(),
        bytes.len()
    );
    Ok(bytes)
}

/// Assemble both parts of a split concurrently.
///
/// Both tasks are joined before returning; if either fails the split fails.
pub async fn assemble_split(
    source: Arc<Document>,
    plan: &SplitPlan,
    progress: Option<ProgressCallback>,
) -> Result<(Vec<u8>, Vec<u8>), ForgeError> {
    let first = spawn_part(Arc::clone(&source), 1, plan.first, progress.clone());
    let second = spawn_part(source, 2, plan.second, progress);

    let (first, second) = tokio::try_join!(first, second)?;
    info!(
        "Split {} pages at {}: {} + {} bytes",
        plan.total_pages,
        plan.split_at,
        first.len(),
        second.len()
    );
    Ok((first, second))
}

async fn spawn_part(
    source: Arc<Document>,
    part: usize,
    range: PageRange,
    progress: Option<ProgressCallback>,
) -> Result<Vec<u8>, ForgeError> {
    let bytes = tokio::task::spawn_blocking(move || assemble(&source, &range))
        .await
        .map_err(|e| ForgeError::Internal(format!("assembler task for part {part} failed: {e}")))??;
    if let Some(cb) = &progress {
        cb.on_part_assembled(part, range.len(), bytes.len());
    }
    Ok(bytes)
}

// ── Merge ────────────────────────────────────────────────────────────────

/// Concatenate `documents` into one, keeping input and page order.
///
/// Requires at least two documents and at most `max_pages` pages in total.
pub fn merge(documents: Vec<Document>, max_pages: usize) -> Result<Vec<u8>, ForgeError> {
    if documents.len() < 2 {
        return Err(ForgeError::InvalidInput {
            reason: format!("merge needs at least 2 PDFs, got {}", documents.len()),
        });
    }
    let total: usize = documents.iter().map(|d| d.get_pages().len()).sum();
    if total > max_pages {
        return Err(ForgeError::DocumentTooLarge {
            pages: total,
            max: max_pages,
        });
    }

    let mut next_id = 1;
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();
    let mut page_ids: Vec<ObjectId> = Vec::with_capacity(total);

    for mut doc in documents {
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for &page_id in &pages {
            let inherited = inherited_attributes(&doc, page_id);
            if let Ok(page) = doc.get_object_mut(page_id).and_then(Object::as_dict_mut) {
                for (key, value) in inherited {
                    page.set(key, value);
                }
            }
        }
        page_ids.extend(pages);

        for (id, object) in doc.objects {
            if !is_tree_node(&object) {
                objects.insert(id, object);
            }
        }
    }

    let pages_id = (next_id, 0);
    let catalog_id = (next_id + 1, 0);
    for id in &page_ids {
        if let Some(Object::Dictionary(page)) = objects.get_mut(id) {
            page.set("Parent", Object::Reference(pages_id));
        }
    }

    let mut merged = Document::with_version("1.5");
    merged.objects = objects;
    merged.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(page_ids.len() as i64)),
            (
                "Kids",
                Object::Array(page_ids.iter().map(|id| Object::Reference(*id)).collect()),
            ),
        ])),
    );
    merged.objects.insert(
        catalog_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Catalog".to_vec())),
            ("Pages", Object::Reference(pages_id)),
        ])),
    );
    merged.trailer.set("Root", Object::Reference(catalog_id));
    merged.max_id = next_id + 1;

    merged.prune_objects();
    merged.renumber_objects();
    merged.compress();

    let bytes = save(&mut merged)?;
    info!("Merged {} pages → {} bytes", page_ids.len(), bytes.len());
    Ok(bytes)
}

/// Catalog, page-tree and outline nodes are rebuilt, not copied.
fn is_tree_node(object: &Object) -> bool {
    let Ok(dict) = object.as_dict() else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog" | b"Pages" | b"Outlines" | b"Outline")
    )
}

/// Attributes `page_id` inherits from ancestors but does not set itself.
fn inherited_attributes(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, Object)> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for key in INHERITABLE {
        if page.has(key) {
            continue;
        }
        let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
        // Bounded walk; malformed trees can contain cycles.
        for _ in 0..64 {
            let Some(node) = parent.and_then(|id| doc.get_dictionary(id).ok()) else {
                break;
            };
            if let Ok(value) = node.get(key) {
                found.push((key.to_vec(), value.clone()));
                break;
            }
            parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        }
    }
    found
}

// ── Images → PDF ─────────────────────────────────────────────────────────

/// Build a document with one page per image, each sized at [`IMAGE_PAGE_DPI`].
///
/// Images are flattened to RGB and embedded as baseline JPEG.
pub fn images_to_pdf(
    images: &[DecodedImage],
    codec: &dyn ImageCodec,
    quality: u8,
) -> Result<Vec<u8>, ForgeError> {
    if images.is_empty() {
        return Err(ForgeError::InvalidInput {
            reason: "no images to convert".into(),
        });
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::with_capacity(images.len());

    for image in images {
        let jpeg = codec.encode(
            image,
            &EncodeOptions::Jpeg {
                quality,
                max_effort: false,
            },
        )?;
        let (px_w, px_h) = (image.width(), image.height());
        let width = px_w as f32 * 72.0 / IMAGE_PAGE_DPI;
        let height = px_h as f32 * 72.0 / IMAGE_PAGE_DPI;

        let xobject = Stream::new(
            Dictionary::from_iter(vec![
                ("Type", Object::Name(b"XObject".to_vec())),
                ("Subtype", Object::Name(b"Image".to_vec())),
                ("Width", Object::Integer(px_w as i64)),
                ("Height", Object::Integer(px_h as i64)),
                ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
                ("BitsPerComponent", Object::Integer(8)),
                ("Filter", Object::Name(b"DCTDecode".to_vec())),
            ]),
            jpeg,
        )
        .with_compression(false);
        let xobject_id = doc.add_object(xobject);

        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(width),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(height),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let encoded = content
            .encode()
            .map_err(|e| ForgeError::AssemblyFailed {
                detail: e.to_string(),
            })?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let resources = Dictionary::from_iter(vec![(
            "XObject",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Im0",
                Object::Reference(xobject_id),
            )])),
        )]);
        let page_id = doc.add_object(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Page".to_vec())),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width),
                    Object::Real(height),
                ]),
            ),
            ("Resources", Object::Dictionary(resources)),
            ("Contents", Object::Reference(content_id)),
        ]));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter(vec![
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(count as i64)),
            ("Kids", Object::Array(kids)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter(vec![
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));
    doc.compress();

    let bytes = save(&mut doc)?;
    info!("Built {count}-page PDF from images → {} bytes", bytes.len());
    Ok(bytes)
}

fn save(doc: &mut Document) -> Result<Vec<u8>, ForgeError> {
    let mut buf = Vec::new();
    doc.save_to(&mut buf)
        .map_err(|e| ForgeError::AssemblyFailed {
            detail: format!("save failed: {e}"),
        })?;
    Ok(buf)
}
