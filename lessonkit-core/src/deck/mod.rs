//! OOXML slide decks (`.pptx`).
//!
//! A deck is a zip package. Slides live at `ppt/slides/slideN.xml` and the
//! slide size at `ppt/presentation.xml`. Only DrawingML text runs are read;
//! layout, images and notes are ignored. Building and editing decks lives in
//! [`authoring`].

mod authoring;
mod package;

pub use authoring::{add_slide, create, modify_slide, SlideContent, DEFAULT_SUBTITLE};

use std::fs::File;
use std::io::Read;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, error, info};
use zip::ZipArchive;

use crate::error::{Error, Result};
use crate::store::StoredArtifact;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideText {
    pub slide_number: usize,
    pub title: String,
    pub content: Vec<String>,
}

/// Slide count and size. Width and height are in EMU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeckInfo {
    pub num_slides: usize,
    pub width: u64,
    pub height: u64,
}

struct Patterns {
    slide_entry: Regex,
    shape: Regex,
    title_placeholder: Regex,
    run: Regex,
    slide_size: Regex,
    cx: Regex,
    cy: Regex,
    text_body: Regex,
    body_properties: Regex,
    relationship_id: Regex,
    slide_id: Regex,
}

impl Patterns {
    fn compile() -> Result<Self> {
        let build = |pattern: &str| {
            Regex::new(pattern).map_err(|e| Error::Archive(format!("invalid pattern: {e}")))
        };
        Ok(Self {
            slide_entry: build(r"^ppt/slides/slide(\d+)\.xml$")?,
            shape: build(r"(?s)<p:sp\b.*?</p:sp>")?,
            title_placeholder: build(r#"<p:ph\b[^>]*\btype="(?:title|ctrTitle)""#)?,
            run: build(r"(?s)<a:t>(.*?)</a:t>")?,
            slide_size: build(r"<p:sldSz\b[^>]*>")?,
            cx: build(r#"\bcx="(\d+)""#)?,
            cy: build(r#"\bcy="(\d+)""#)?,
            text_body: build(r"(?s)<p:txBody\b.*?</p:txBody>")?,
            body_properties: build(r"(?s)<a:bodyPr\b(?:[^>]*/>|.*?</a:bodyPr>)")?,
            relationship_id: build(r#"\bId="rId(\d+)""#)?,
            slide_id: build(r#"<p:sldId\b[^>]*?\bid="(\d+)""#)?,
        })
    }
}

fn open(artifact: &StoredArtifact) -> Result<ZipArchive<File>> {
    let file = File::open(artifact.path())?;
    ZipArchive::new(file).map_err(|e| {
        error!(error = ?e, path = %artifact.path().display(), "Failed to open deck");
        Error::MalformedDocument(e.to_string())
    })
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<String> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| Error::MalformedDocument(format!("{name}: {e}")))?;
    let mut xml = String::new();
    entry.read_to_string(&mut xml)?;
    Ok(xml)
}

/// Slide entries in numeric order, as `(slide_number, entry_name)`.
fn slide_entries<'n>(
    names: impl Iterator<Item = &'n str>,
    patterns: &Patterns,
) -> Vec<(usize, String)> {
    let mut slides: Vec<(usize, String)> = names
        .filter_map(|name| {
            let number = patterns.slide_entry.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);
    slides
}

pub fn extract_text(artifact: &StoredArtifact) -> Result<Vec<SlideText>> {
    let patterns = Patterns::compile()?;
    let mut archive = open(artifact)?;
    let entries = slide_entries(archive.file_names(), &patterns);

    let mut slides = Vec::with_capacity(entries.len());
    for (index, (number, name)) in entries.iter().enumerate() {
        let xml = read_entry(&mut archive, name)?;
        let mut slide = SlideText {
            slide_number: index + 1,
            title: String::new(),
            content: Vec::new(),
        };
        for shape in patterns.shape.find_iter(&xml) {
            let text = shape_text(shape.as_str(), &patterns);
            if text.is_empty() {
                continue;
            }
            if slide.title.is_empty() && patterns.title_placeholder.is_match(shape.as_str()) {
                slide.title = text;
            } else {
                slide.content.push(text);
            }
        }
        debug!(slide = number, shapes = slide.content.len(), "Read slide");
        slides.push(slide);
    }

    info!(slides = slides.len(), path = %artifact.path().display(), "Extracted deck text");
    Ok(slides)
}

pub fn info(artifact: &StoredArtifact) -> Result<DeckInfo> {
    let patterns = Patterns::compile()?;
    let mut archive = open(artifact)?;
    let num_slides = slide_entries(archive.file_names(), &patterns).len();
    let presentation = read_entry(&mut archive, "ppt/presentation.xml")?;

    let size_tag = patterns
        .slide_size
        .find(&presentation)
        .ok_or_else(|| Error::MalformedDocument("presentation has no slide size".to_string()))?
        .as_str();
    let dimension = |pattern: &Regex| -> Result<u64> {
        pattern
            .captures(size_tag)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| Error::MalformedDocument(format!("unreadable slide size: {size_tag}")))
    };

    Ok(DeckInfo {
        num_slides,
        width: dimension(&patterns.cx)?,
        height: dimension(&patterns.cy)?,
    })
}

/// Text of one shape: runs concatenated, paragraphs on separate lines.
fn shape_text(shape: &str, patterns: &Patterns) -> String {
    shape
        .split("</a:p>")
        .map(|paragraph| {
            patterns
                .run
                .captures_iter(paragraph)
                .filter_map(|c| c.get(1))
                .map(|m| unescape(m.as_str()))
                .collect::<String>()
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Origin;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn slide(shapes: &[(&str, &str)]) -> String {
        let body: String = shapes
            .iter()
            .map(|(placeholder, text)| {
                let paragraphs: String = text
                    .lines()
                    .map(|line| format!("<a:p><a:r><a:t>{line}</a:t></a:r></a:p>"))
                    .collect();
                format!(
                    "<p:sp><p:nvSpPr><p:nvPr>{placeholder}</p:nvPr></p:nvSpPr>\
                     <p:spPr/><p:txBody>{paragraphs}</p:txBody></p:sp>"
                )
            })
            .collect();
        format!("<p:sld><p:cSld><p:spTree>{body}</p:spTree></p:cSld></p:sld>")
    }

    fn write_deck(path: &std::path::Path, slides: &[String]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        zip.start_file("ppt/presentation.xml", options).unwrap();
        zip.write_all(br#"<p:presentation><p:sldSz cx="9144000" cy="6858000" type="screen4x3"/></p:presentation>"#)
            .unwrap();
        // Written out of order to check numeric sorting.
        for (index, xml) in slides.iter().enumerate().rev() {
            zip.start_file(format!("ppt/slides/slide{}.xml", index + 1), options)
                .unwrap();
            zip.write_all(xml.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn reads_titles_and_content_in_slide_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lesson.pptx");
        let mut slides: Vec<String> = (1..=10)
            .map(|n| slide(&[(r#"<p:ph type="title"/>"#, &format!("Slide {n}"))]))
            .collect();
        slides[0] = slide(&[
            (r#"<p:ph type="ctrTitle"/>"#, "Fractions &amp; Decimals"),
            (r#"<p:ph type="body" idx="1"/>"#, "Halves\nQuarters"),
            ("", "   "),
        ]);
        write_deck(&path, &slides);
        let artifact = StoredArtifact::describe(&path, Origin::Upload).unwrap();

        let text = extract_text(&artifact).unwrap();

        assert_eq!(text.len(), 10);
        assert_eq!(text[0].title, "Fractions & Decimals");
        assert_eq!(text[0].content, vec!["Halves\nQuarters"]);
        assert_eq!(text[1].title, "Slide 2");
        assert_eq!(text[9].slide_number, 10);
        assert_eq!(text[9].title, "Slide 10");
    }

    #[test]
    fn info_reports_count_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        write_deck(&path, &[slide(&[]), slide(&[])]);
        let artifact = StoredArtifact::describe(&path, Origin::Upload).unwrap();

        assert_eq!(
            info(&artifact).unwrap(),
            DeckInfo {
                num_slides: 2,
                width: 9_144_000,
                height: 6_858_000,
            }
        );
    }

    #[test]
    fn non_zip_input_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pptx");
        std::fs::write(&path, b"plain text").unwrap();
        let artifact = StoredArtifact::describe(&path, Origin::Upload).unwrap();

        assert!(matches!(extract_text(&artifact), Err(Error::MalformedDocument(_))));
    }
}
