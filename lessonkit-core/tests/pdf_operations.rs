mod common;

use std::fs::File;
use std::num::NonZeroUsize;

use common::{page_labels, sample_pdf, temp_store, upload};
use lessonkit_core::pages::PageSelection;
use lessonkit_core::pdf::{self, DocumentPartition};
use lessonkit_core::Error;

fn non_zero(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[test]
fn small_document_is_returned_whole() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "short.pdf", &sample_pdf(3));

    let partition = pdf::partition(&store, &source, non_zero(10)).unwrap();

    assert!(!partition.is_split());
    assert_eq!(partition.len(), 1);
    assert_eq!(partition.artifacts()[0].path(), source.path());
}

#[test]
fn partition_covers_every_page_in_order() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "long.pdf", &sample_pdf(25));

    let partition = pdf::partition(&store, &source, non_zero(10)).unwrap();

    let DocumentPartition::Parts(parts) = &partition else {
        panic!("expected the document to be split");
    };
    let counts: Vec<usize> = parts
        .iter()
        .map(|p| pdf::page_count(p).unwrap())
        .collect();
    assert_eq!(counts, vec![10, 10, 5]);

    let labels: Vec<String> = parts.iter().flat_map(|p| page_labels(p.path())).collect();
    let expected: Vec<String> = (1..=25).map(|n| format!("Page {n}")).collect();
    assert_eq!(labels, expected);

    assert!(parts[0].file_name().starts_with("chunk_0_10_"));
    assert!(parts[2].file_name().starts_with("chunk_20_25_"));
}

#[test]
fn dropping_parts_removes_their_files() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "long.pdf", &sample_pdf(4));

    let partition = pdf::partition(&store, &source, non_zero(1)).unwrap();
    let paths: Vec<_> = partition
        .artifacts()
        .iter()
        .map(|a| a.path().to_path_buf())
        .collect();
    assert_eq!(paths.len(), 4);
    assert!(paths.iter().all(|p| p.exists()));

    drop(partition);
    assert!(paths.iter().all(|p| !p.exists()));
    assert!(source.path().exists(), "source must be untouched");
}

#[test]
fn malformed_source_fails_without_leftovers() {
    let (dir, store) = temp_store();
    let source = upload(&store, "broken.pdf", b"definitely not a pdf");

    let err = pdf::partition(&store, &source, non_zero(2)).unwrap_err();
    assert!(matches!(err, Error::MalformedDocument(_)));

    let scratch = std::fs::read_dir(dir.path().join("temp")).unwrap().count();
    assert_eq!(scratch, 0);
}

#[test]
fn thirty_pages_bundle_into_three_named_entries() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "course.pdf", &sample_pdf(30));

    let partition = pdf::partition(&store, &source, non_zero(10)).unwrap();
    assert_eq!(partition.len(), 3);

    let bundle = pdf::bundle(
        &store,
        &partition.artifacts(),
        "course_split.zip",
        pdf::part_entry_name,
    )
    .unwrap();

    let mut archive = zip::ZipArchive::new(File::open(bundle.path()).unwrap()).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["part_1.pdf", "part_2.pdf", "part_3.pdf"]);
    assert!(archive.by_name("part_2.pdf").unwrap().size() > 0);
}

#[test]
fn compress_produces_a_loadable_copy() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "big.pdf", &sample_pdf(5));

    let compressed = pdf::compress(&store, &source).unwrap();

    assert!(compressed.is_scoped());
    assert_eq!(pdf::page_count(&compressed).unwrap(), 5);
    assert!(compressed.file_name().starts_with("compressed_"));
}

#[test]
fn compress_rejects_unreadable_input() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "junk.pdf", b"%PDF-1.4 garbage");

    let err = pdf::compress(&store, &source).unwrap_err();
    assert!(matches!(err, Error::CompressionUnsupported(_)));
}

#[test]
fn extracts_text_from_every_page() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "text.pdf", &sample_pdf(2));

    let text = pdf::extract_text(&source).unwrap();

    assert!(text.contains("Page 1"));
    assert!(text.contains("Page 2"));
    assert!(text.find("Page 1") < text.find("Page 2"));
}

#[test]
fn info_reports_pages_and_metadata() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "meta.pdf", &sample_pdf(4));

    let info = pdf::info(&source).unwrap();

    assert_eq!(info.num_pages, 4);
    assert!(!info.is_encrypted);
    assert_eq!(info.metadata.get("Title").map(String::as_str), Some("Sample lesson"));
}

#[test]
fn merge_concatenates_in_argument_order() {
    let (_dir, store) = temp_store();
    let first = upload(&store, "a.pdf", &sample_pdf(2));
    let second = upload(&store, "b.pdf", &sample_pdf(3));

    let merged = pdf::merge(&store, &[&second, &first]).unwrap();

    assert_eq!(
        page_labels(merged.path()),
        vec!["Page 1", "Page 2", "Page 3", "Page 1", "Page 2"]
    );
}

#[test]
fn select_keeps_order_and_reports_missing_pages() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "deck.pdf", &sample_pdf(5));
    let selection: PageSelection = "4, 2, 9".parse().unwrap();

    let selected = pdf::select_pages(&store, &source, &selection).unwrap();

    assert_eq!(selected.pages, vec![4, 2]);
    assert_eq!(selected.out_of_range, vec![9]);
    assert_eq!(page_labels(selected.artifact.path()), vec!["Page 4", "Page 2"]);
}

#[test]
fn select_with_no_valid_page_is_rejected() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "deck.pdf", &sample_pdf(2));
    let selection: PageSelection = "7,8".parse().unwrap();

    let err = pdf::select_pages(&store, &source, &selection).unwrap_err();
    assert!(matches!(err, Error::InvalidSelection(_)));
}

#[test]
fn watermark_stamps_every_page() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "plain.pdf", &sample_pdf(3));

    let stamped = pdf::watermark(&store, &source, "DRAFT").unwrap();

    let doc = lopdf::Document::load(stamped.path()).unwrap();
    assert_eq!(doc.get_pages().len(), 3);
    for id in doc.get_pages().values() {
        let content = String::from_utf8_lossy(&doc.get_page_content(*id).unwrap()).into_owned();
        assert!(content.contains("(DRAFT)"));
        assert!(content.contains("Page "), "original content is kept");
    }
    assert_eq!(page_labels(stamped.path())[2], "Page 3");
}

#[test]
fn watermark_encodes_accented_text_for_the_standard_font() {
    let (_dir, store) = temp_store();
    let source = upload(&store, "aula.pdf", &sample_pdf(1));

    let stamped = pdf::watermark(&store, &source, "Versão").unwrap();

    let doc = lopdf::Document::load(stamped.path()).unwrap();
    let page_id = *doc.get_pages().get(&1).unwrap();
    let content = lopdf::content::Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
    let shown: Vec<Vec<u8>> = content
        .operations
        .iter()
        .filter(|op| op.operator == "Tj")
        .filter_map(|op| op.operands.first()?.as_str().ok().map(<[u8]>::to_vec))
        .collect();
    assert!(shown.contains(&b"Vers\xe3o".to_vec()), "got {shown:?}");

    let stamp_font_encoded = doc.objects.values().filter_map(|obj| obj.as_dict().ok()).any(|dict| {
        dict.get(b"BaseFont").and_then(lopdf::Object::as_name).ok() == Some(b"Helvetica".as_slice())
            && dict.get(b"Encoding").and_then(lopdf::Object::as_name).ok()
                == Some(b"WinAnsiEncoding".as_slice())
    });
    assert!(stamp_font_encoded);
}
