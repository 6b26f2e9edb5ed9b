//! # pdf: document partitioning, compression, bundling and page operations
//!
//! Every operation reads its source from a [`StoredArtifact`] and writes its
//! result as a new scoped scratch artifact, so a failure part-way leaves
//! nothing behind. Sources are only ever read: each call works on its own
//! in-memory copy of the document, so concurrent operations on the same
//! source need no locking.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::{self, Write};
use std::num::NonZeroUsize;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};
use crate::pages::{PageSelection, ResolvedSelection};
use crate::store::{ArtifactStore, StoredArtifact};

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Result of [`partition`]: either the untouched source or freshly written parts.
#[derive(Debug)]
pub enum DocumentPartition<'a> {
    /// The source already fits in one part; no copy was made.
    Whole(&'a StoredArtifact),
    /// Consecutive page ranges of the source, in order.
    Parts(Vec<StoredArtifact>),
}

impl<'a> DocumentPartition<'a> {
    pub fn len(&self) -> usize {
        match self {
            DocumentPartition::Whole(_) => 1,
            DocumentPartition::Parts(parts) => parts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_split(&self) -> bool {
        matches!(self, DocumentPartition::Parts(_))
    }

    pub fn artifacts(&self) -> Vec<&StoredArtifact> {
        match self {
            DocumentPartition::Whole(source) => vec![*source],
            DocumentPartition::Parts(parts) => parts.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    pub num_pages: usize,
    pub is_encrypted: bool,
    pub metadata: BTreeMap<String, String>,
}

/// Pages picked by [`select_pages`] plus the requested numbers that did not exist.
#[derive(Debug)]
pub struct Selected {
    pub artifact: StoredArtifact,
    pub pages: Vec<u32>,
    pub out_of_range: Vec<i64>,
}

fn load(artifact: &StoredArtifact) -> Result<Document> {
    let bytes = fs::read(artifact.path())?;
    Document::load_mem(&bytes).map_err(|e| {
        error!(error = ?e, path = %artifact.path().display(), "Failed to parse PDF");
        Error::MalformedDocument(e.to_string())
    })
}

fn save(doc: &mut Document, target: &mut impl Write) -> Result<()> {
    doc.save_to(target)
        .map_err(|e| Error::Io(io::Error::other(e.to_string())))
}

fn malformed(e: lopdf::Error) -> Error {
    Error::MalformedDocument(e.to_string())
}

/// Page numbers (1-based) in document order.
fn page_numbers(doc: &Document) -> Vec<u32> {
    doc.get_pages().keys().copied().collect()
}

pub fn page_count(artifact: &StoredArtifact) -> Result<usize> {
    Ok(load(artifact)?.get_pages().len())
}

/// Splits `source` into consecutive parts of at most `max_pages` pages.
///
/// Parts are named after the source and their page range. If any part
/// fails, the parts already written are removed.
pub fn partition<'a>(
    store: &ArtifactStore,
    source: &'a StoredArtifact,
    max_pages: NonZeroUsize,
) -> Result<DocumentPartition<'a>> {
    let doc = load(source)?;
    let numbers = page_numbers(&doc);
    let total = numbers.len();
    let max_pages = max_pages.get();

    if total <= max_pages {
        info!(total, max_pages, path = %source.path().display(), "Document fits in a single part");
        return Ok(DocumentPartition::Whole(source));
    }

    let source_name = format!("{}.pdf", source.stem());
    let mut parts = Vec::with_capacity(total.div_ceil(max_pages));
    for (index, range) in numbers.chunks(max_pages).enumerate() {
        let start = index * max_pages;
        let end = start + range.len();
        let mut part_doc = assemble(&doc, range)?;
        let prefix = format!("chunk_{start}_{end}_");
        let part = store.write_scratch(&prefix, &source_name, |w| save(&mut part_doc, w))?;
        debug!(start, end, path = %part.path().display(), "Wrote partition part");
        parts.push(part);
    }

    info!(
        total,
        max_pages,
        parts = parts.len(),
        path = %source.path().display(),
        "Partitioned document"
    );
    Ok(DocumentPartition::Parts(parts))
}

/// Writes a size-reduced copy of `source`.
///
/// Best effort: the result may be no smaller than the input. Encrypted or
/// unreadable sources fail with [`Error::CompressionUnsupported`].
pub fn compress(store: &ArtifactStore, source: &StoredArtifact) -> Result<StoredArtifact> {
    let mut doc = match load(source) {
        Ok(doc) => doc,
        Err(Error::MalformedDocument(msg)) => return Err(Error::CompressionUnsupported(msg)),
        Err(e) => return Err(e),
    };
    if doc.is_encrypted() {
        warn!(path = %source.path().display(), "Refusing to compress encrypted PDF");
        return Err(Error::CompressionUnsupported("document is encrypted".to_string()));
    }

    doc.prune_objects();
    doc.delete_zero_length_streams();
    doc.compress();

    let name = format!("{}.pdf", source.stem());
    let compressed = store.write_scratch("compressed_", &name, |w| save(&mut doc, w))?;
    info!(
        before = source.size(),
        after = compressed.size(),
        path = %compressed.path().display(),
        "Compressed document"
    );
    Ok(compressed)
}

/// Canonical archive entry name for the `index`-th (0-based) part.
pub fn part_entry_name(index: usize) -> String {
    format!("part_{}.pdf", index + 1)
}

/// Packages `artifacts` into one zip archive, naming entries with `entry_name(index)`.
pub fn bundle<F>(
    store: &ArtifactStore,
    artifacts: &[&StoredArtifact],
    archive_name: &str,
    entry_name: F,
) -> Result<StoredArtifact>
where
    F: Fn(usize) -> String,
{
    let bundle = store.write_scratch("bundle_", archive_name, |w| {
        let mut zip = ZipWriter::new(w);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (index, artifact) in artifacts.iter().enumerate() {
            let name = entry_name(index);
            zip.start_file(name.as_str(), options)?;
            let mut input = File::open(artifact.path())?;
            io::copy(&mut input, &mut zip)?;
            debug!(entry = %name, path = %artifact.path().display(), "Added archive entry");
        }
        zip.finish()?;
        Ok(())
    })?;
    info!(entries = artifacts.len(), path = %bundle.path().display(), "Bundled artifacts");
    Ok(bundle)
}

/// Text of every page, separated by blank lines.
pub fn extract_text(source: &StoredArtifact) -> Result<String> {
    let doc = load(source)?;
    let mut text = String::new();
    for number in page_numbers(&doc) {
        let page_text = doc.extract_text(&[number]).unwrap_or_else(|e| {
            warn!(error = ?e, page = number, "Failed to extract text from page");
            String::new()
        });
        text.push_str(&page_text);
        text.push_str("\n\n");
    }
    Ok(text.trim().to_string())
}

/// Splits `text` into pieces of at most `max_chars` characters.
pub fn text_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(max_chars)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

pub fn info(source: &StoredArtifact) -> Result<DocumentInfo> {
    let doc = load(source)?;
    let mut metadata = BTreeMap::new();
    if let Ok(info_obj) = doc.trailer.get(b"Info") {
        if let Ok(dict) = resolve_dict(&doc, info_obj) {
            for (key, value) in dict.iter() {
                if let Some(text) = text_value(&doc, value) {
                    metadata.insert(String::from_utf8_lossy(key).into_owned(), text);
                }
            }
        }
    }
    Ok(DocumentInfo {
        num_pages: doc.get_pages().len(),
        is_encrypted: doc.is_encrypted(),
        metadata,
    })
}

/// Concatenates the pages of every source, in argument order.
pub fn merge(store: &ArtifactStore, sources: &[&StoredArtifact]) -> Result<StoredArtifact> {
    if sources.is_empty() {
        return Err(Error::InvalidSelection("nothing to merge".to_string()));
    }

    let mut next_id = 1;
    let mut page_ids: Vec<ObjectId> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for source in sources {
        let mut doc = load(source)?;
        doc.renumber_objects_with(next_id);
        next_id = doc.max_id + 1;
        let ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for id in &ids {
            flatten_inherited(&mut doc, *id)?;
        }
        page_ids.extend(ids);
        objects.extend(doc.objects);
    }

    let mut merged = Document::with_version("1.5");
    for (id, object) in objects {
        let skip = matches!(
            &object,
            Object::Dictionary(dict) if type_is(dict, b"Catalog") || type_is(dict, b"Pages") || type_is(dict, b"Outlines")
        );
        if !skip {
            merged.objects.insert(id, object);
        }
    }
    merged.max_id = next_id;
    let pages_id = merged.new_object_id();
    for id in &page_ids {
        merged
            .get_object_mut(*id)
            .and_then(Object::as_dict_mut)
            .map_err(malformed)?
            .set("Parent", pages_id);
    }
    let kids: Vec<Object> = page_ids.iter().map(|id| Object::Reference(*id)).collect();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_ids.len() as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.prune_objects();
    merged.renumber_objects();

    let artifact = store.write_scratch("merged_", "merged.pdf", |w| save(&mut merged, w))?;
    info!(
        sources = sources.len(),
        pages = page_ids.len(),
        path = %artifact.path().display(),
        "Merged documents"
    );
    Ok(artifact)
}

/// Copies the selected pages, in selection order, into a new document.
pub fn select_pages(
    store: &ArtifactStore,
    source: &StoredArtifact,
    selection: &PageSelection,
) -> Result<Selected> {
    let doc = load(source)?;
    let total = doc.get_pages().len() as u32;
    let ResolvedSelection {
        pages,
        out_of_range,
    } = selection.resolve(total);
    if !out_of_range.is_empty() {
        warn!(?out_of_range, total, "Ignoring out-of-range pages");
    }
    if pages.is_empty() {
        return Err(Error::InvalidSelection(format!(
            "none of the requested pages exist in a {total}-page document"
        )));
    }

    let mut selected = assemble(&doc, &pages)?;
    let name = format!("{}.pdf", source.stem());
    let artifact = store.write_scratch("split_", &name, |w| save(&mut selected, w))?;
    info!(pages = ?pages, path = %artifact.path().display(), "Selected pages");
    Ok(Selected {
        artifact,
        pages,
        out_of_range,
    })
}

/// Stamps `text` diagonally across every page.
pub fn watermark(store: &ArtifactStore, source: &StoredArtifact, text: &str) -> Result<StoredArtifact> {
    let mut doc = load(source)?;

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let state_id = doc.add_object(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(0.3),
        "CA" => Object::Real(0.3),
    });
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let restore_id = doc.add_object(Stream::new(dictionary! {}, b"\nQ\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(dictionary! {}, stamp_content(text)?));

    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in &page_ids {
        flatten_inherited(&mut doc, *page_id)?;
        add_resource(&mut doc, *page_id, b"Font", "FWm", font_id)?;
        add_resource(&mut doc, *page_id, b"ExtGState", "GSwm", state_id)?;

        // Existing content runs inside q/Q so its graphics state cannot leak into the stamp.
        let page = doc
            .get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)
            .map_err(malformed)?;
        let mut contents = vec![Object::Reference(save_id)];
        match page.get(b"Contents") {
            Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
            Ok(existing @ Object::Reference(_)) => contents.push(existing.clone()),
            _ => {}
        }
        contents.push(Object::Reference(restore_id));
        contents.push(Object::Reference(stamp_id));
        page.set("Contents", contents);
    }

    let name = format!("{}.pdf", source.stem());
    let artifact = store.write_scratch("watermarked_", &name, |w| save(&mut doc, w))?;
    info!(pages = page_ids.len(), path = %artifact.path().display(), "Watermarked document");
    Ok(artifact)
}

fn stamp_content(text: &str) -> Result<Vec<u8>> {
    const FONT_SIZE: f32 = 40.0;
    // Helvetica averages about half an em per glyph.
    let half_width = text.chars().count() as f32 * FONT_SIZE * 0.5 / 2.0;
    let diagonal = std::f32::consts::FRAC_1_SQRT_2;
    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(b"GSwm".to_vec())]),
            Operation::new(
                "rg",
                vec![Object::Real(0.5), Object::Real(0.5), Object::Real(0.5)],
            ),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(b"FWm".to_vec()), Object::Real(FONT_SIZE)],
            ),
            Operation::new(
                "Tm",
                vec![
                    Object::Real(diagonal),
                    Object::Real(diagonal),
                    Object::Real(-diagonal),
                    Object::Real(diagonal),
                    Object::Integer(300),
                    Object::Integer(400),
                ],
            ),
            Operation::new("Td", vec![Object::Real(-half_width), Object::Integer(0)]),
            Operation::new(
                "Tj",
                vec![Object::String(win_ansi_bytes(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    content
        .encode()
        .map_err(|e| Error::Io(io::Error::other(e.to_string())))
}

/// Encodes `text` for a standard font using WinAnsiEncoding. Characters the
/// encoding lacks become `?`.
fn win_ansi_bytes(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            ' '..='~' | '\u{a0}'..='\u{ff}' => c as u8,
            '€' => 0x80,
            '‚' => 0x82,
            'ƒ' => 0x83,
            '„' => 0x84,
            '…' => 0x85,
            '†' => 0x86,
            '‡' => 0x87,
            'ˆ' => 0x88,
            '‰' => 0x89,
            'Š' => 0x8A,
            '‹' => 0x8B,
            'Œ' => 0x8C,
            'Ž' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '•' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '˜' => 0x98,
            '™' => 0x99,
            'š' => 0x9A,
            '›' => 0x9B,
            'œ' => 0x9C,
            'ž' => 0x9E,
            'Ÿ' => 0x9F,
            _ => b'?',
        })
        .collect()
}

/// Builds a copy of `source` whose page tree holds exactly `pages`
/// (1-based), in the given order. Repeated numbers become duplicated pages.
fn assemble(source: &Document, pages: &[u32]) -> Result<Document> {
    let mut doc = source.clone();
    let page_map = doc.get_pages();
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(malformed)?;
    let pages_id = doc
        .get_dictionary(root_id)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(malformed)?;

    let mut seen = HashSet::new();
    let mut kids = Vec::with_capacity(pages.len());
    for number in pages {
        let page_id = *page_map.get(number).ok_or_else(|| {
            Error::InvalidSelection(format!("page {number} does not exist"))
        })?;
        flatten_inherited(&mut doc, page_id)?;
        let id = if seen.insert(page_id) {
            page_id
        } else {
            let copy = doc.get_dictionary(page_id).map_err(malformed)?.clone();
            doc.add_object(copy)
        };
        doc.get_object_mut(id)
            .and_then(Object::as_dict_mut)
            .map_err(malformed)?
            .set("Parent", pages_id);
        kids.push(Object::Reference(id));
    }

    let count = kids.len() as i64;
    let tree = doc
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(malformed)?;
    tree.set("Kids", kids);
    tree.set("Count", count);
    doc.prune_objects();
    Ok(doc)
}

/// Copies attributes a page inherits from its ancestors onto the page itself,
/// so the page survives being moved to a different tree.
fn flatten_inherited(doc: &mut Document, page_id: ObjectId) -> Result<()> {
    let page = doc.get_dictionary(page_id).map_err(malformed)?;
    let missing: Vec<&[u8]> = INHERITABLE
        .iter()
        .copied()
        .filter(|key| !page.has(key))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut inherited: Vec<(&[u8], Object)> = Vec::new();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut visited = HashSet::new();
    while let Some(parent_id) = parent {
        if !visited.insert(parent_id) {
            break;
        }
        let Ok(node) = doc.get_dictionary(parent_id) else {
            break;
        };
        for key in &missing {
            if inherited.iter().all(|(k, _)| k != key) {
                if let Ok(value) = node.get(key) {
                    inherited.push((*key, value.clone()));
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    let page = doc
        .get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(malformed)?;
    for (key, value) in inherited {
        page.set(key.to_vec(), value);
    }
    Ok(())
}

/// Registers `id` under `name` in the page's `category` resources. The page's
/// resource dictionary is made inline so other pages sharing it are untouched.
fn add_resource(
    doc: &mut Document,
    page_id: ObjectId,
    category: &[u8],
    name: &str,
    id: ObjectId,
) -> Result<()> {
    let page = doc.get_dictionary(page_id).map_err(malformed)?;
    let mut resources = match page.get(b"Resources") {
        Ok(obj) => resolve_dict(doc, obj)?,
        Err(_) => Dictionary::new(),
    };
    let mut entries = match resources.get(category) {
        Ok(obj) => resolve_dict(doc, obj)?,
        Err(_) => Dictionary::new(),
    };
    entries.set(name, id);
    resources.set(category.to_vec(), entries);
    doc.get_object_mut(page_id)
        .and_then(Object::as_dict_mut)
        .map_err(malformed)?
        .set("Resources", resources);
    Ok(())
}

fn resolve_dict(doc: &Document, obj: &Object) -> Result<Dictionary> {
    match obj {
        Object::Reference(id) => Ok(doc.get_dictionary(*id).map_err(malformed)?.clone()),
        Object::Dictionary(dict) => Ok(dict.clone()),
        _ => Err(Error::MalformedDocument("expected a dictionary".to_string())),
    }
}

fn type_is(dict: &Dictionary, name: &[u8]) -> bool {
    dict.get(b"Type")
        .and_then(Object::as_name)
        .is_ok_and(|t| t == name)
}

fn text_value(doc: &Document, obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        Object::Reference(id) => doc.get_object(*id).ok().and_then(|o| text_value(doc, o)),
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE with a byte-order mark, else Latin-1-ish bytes.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_chunks_split_on_char_boundaries() {
        let chunks = text_chunks("ação€abc", 3);
        assert_eq!(chunks, vec!["açã", "o€a", "bc"]);
        assert!(text_chunks("", 10).is_empty());
    }

    #[test]
    fn watermark_text_is_win_ansi_encoded() {
        assert_eq!(win_ansi_bytes("Versão"), b"Vers\xe3o".to_vec());
        assert_eq!(
            win_ansi_bytes("5\u{20ac} \u{2013} \u{201c}ok\u{201d} 漢"),
            b"5\x80 \x96 \x93ok\x94 ?".to_vec()
        );
    }

    #[test]
    fn part_entries_are_one_based() {
        assert_eq!(part_entry_name(0), "part_1.pdf");
        assert_eq!(part_entry_name(2), "part_3.pdf");
    }

    #[test]
    fn pdf_strings_decode_utf16_and_utf8() {
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x41, 0x00, 0xE7]), "Aç");
        assert_eq!(decode_pdf_string(b"Title"), "Title");
    }
}
