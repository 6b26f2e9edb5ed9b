//! Shared fixtures for the core integration tests.
#![allow(dead_code)]

use std::path::Path;

use lessonkit_core::config::StorageSettings;
use lessonkit_core::store::{ArtifactStore, Origin, StoredArtifact};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tempfile::TempDir;

/// Opens a store whose three directories live under `root`.
pub fn store_in(root: &Path) -> ArtifactStore {
    let settings = StorageSettings {
        upload_dir: root.join("uploads"),
        output_dir: root.join("output"),
        scratch_dir: root.join("temp"),
    };
    ArtifactStore::open(&settings).expect("open store")
}

pub fn temp_store() -> (TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = store_in(dir.path());
    (dir, store)
}

/// Builds a PDF with `pages` pages whose content streams show "Page N".
///
/// Font and MediaBox live on the Pages node, so pages rely on inheritance.
pub fn sample_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids = Vec::new();
    for n in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {n}"))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    let info_id = doc.add_object(dictionary! {
        "Title" => Object::string_literal("Sample lesson"),
        "Author" => Object::string_literal("Teacher"),
    });
    doc.trailer.set("Info", info_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save sample pdf");
    bytes
}

/// Writes `bytes` into the uploads directory and describes it, unscoped.
pub fn upload(store: &ArtifactStore, name: &str, bytes: &[u8]) -> StoredArtifact {
    let path = store.dir(Origin::Upload).join(name);
    std::fs::write(&path, bytes).expect("write upload");
    StoredArtifact::describe(path, Origin::Upload).expect("describe upload")
}

/// The "Page N" labels of a document, in page order.
pub fn page_labels(path: &Path) -> Vec<String> {
    let doc = Document::load(path).expect("load pdf");
    doc.get_pages()
        .values()
        .map(|id| {
            let content = doc.get_page_content(*id).expect("page content");
            let text = String::from_utf8_lossy(&content).into_owned();
            let start = text.find("(Page ").expect("page label") + 1;
            let end = start + text[start..].find(')').expect("closing paren");
            text[start..end].to_string()
        })
        .collect()
}
