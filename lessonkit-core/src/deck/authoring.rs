//! Building and editing decks.
//!
//! New decks get a minimal package: one master, a title layout, a
//! title-and-content layout and a theme. Edits read the source package,
//! replace the parts that change and write every other entry back untouched.
//! Results are scoped scratch artifacts, like every other document operation.

use std::io::{Read, Write};

use serde::Deserialize;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::package::{self, Layout};
use super::{open, slide_entries, Patterns};
use crate::error::{Error, Result};
use crate::store::{ArtifactStore, StoredArtifact};

/// Subtitle of the opening slide of a new deck.
pub const DEFAULT_SUBTITLE: &str = "Teaching material";

/// Title and body text of one slide. Lines of `content` become paragraphs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlideContent {
    pub title: String,
    pub content: String,
}

impl SlideContent {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// Package entries in archive order.
struct Package {
    entries: Vec<(String, Vec<u8>)>,
}

impl Package {
    fn read(source: &StoredArtifact) -> Result<Self> {
        let mut archive = open(source)?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            entries.push((name, bytes));
        }
        Ok(Self { entries })
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    fn text(&self, name: &str) -> Result<String> {
        let (_, bytes) = self
            .entries
            .iter()
            .find(|(entry, _)| entry == name)
            .ok_or_else(|| Error::MalformedDocument(format!("deck has no {name}")))?;
        String::from_utf8(bytes.clone())
            .map_err(|e| Error::MalformedDocument(format!("{name}: {e}")))
    }

    fn set(&mut self, name: &str, content: String) {
        match self.entries.iter_mut().find(|(entry, _)| entry == name) {
            Some((_, bytes)) => *bytes = content.into_bytes(),
            None => self.entries.push((name.to_string(), content.into_bytes())),
        }
    }

    fn write(&self, store: &ArtifactStore, prefix: &str, name: &str) -> Result<StoredArtifact> {
        store.write_scratch(prefix, name, |w| {
            let mut zip = ZipWriter::new(w);
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (entry, bytes) in &self.entries {
                zip.start_file(entry.as_str(), options)?;
                zip.write_all(bytes)?;
            }
            zip.finish()?;
            Ok(())
        })
    }
}

/// Builds a new deck: a title slide followed by one slide per entry of `slides`.
pub fn create(store: &ArtifactStore, title: &str, slides: &[SlideContent]) -> Result<StoredArtifact> {
    let mut entries: Vec<(String, String)> = package::skeleton(slides.len() + 1);
    let opening = std::iter::once((Layout::Title, title, DEFAULT_SUBTITLE));
    let rest = slides
        .iter()
        .map(|s| (Layout::TitleAndContent, s.title.as_str(), s.content.as_str()));
    for (index, (layout, slide_title, body)) in opening.chain(rest).enumerate() {
        let number = index + 1;
        entries.push((
            format!("ppt/slides/slide{number}.xml"),
            package::slide(layout, slide_title, body),
        ));
        entries.push((
            format!("ppt/slides/_rels/slide{number}.xml.rels"),
            package::slide_rels(&layout.target()),
        ));
    }

    let package = Package {
        entries: entries
            .into_iter()
            .map(|(name, xml)| (name, xml.into_bytes()))
            .collect(),
    };
    let artifact = package.write(store, "deck_", &format!("{title}.pptx"))?;
    info!(slides = slides.len() + 1, path = %artifact.path().display(), "Created deck");
    Ok(artifact)
}

/// Appends a title-and-content slide after the last slide of `source`.
pub fn add_slide(
    store: &ArtifactStore,
    source: &StoredArtifact,
    title: &str,
    content: &str,
) -> Result<StoredArtifact> {
    let patterns = Patterns::compile()?;
    let mut package = Package::read(source)?;
    let slides = slide_entries(package.names(), &patterns);
    let number = slides.last().map_or(1, |(last, _)| last + 1);
    let layout_target = content_layout(&package)?;

    let mut content_types = package.text(package::CONTENT_TYPES)?;
    let slide_override = package::slide_override(number);
    insert_before(&mut content_types, "</Types>", &slide_override, package::CONTENT_TYPES)?;

    let mut presentation_rels = package.text(package::PRESENTATION_RELS)?;
    let relationship = next_number(&patterns.relationship_id, &presentation_rels, 1);
    let slide_rel = format!(
        r#"<Relationship Id="rId{relationship}" Type="{}" Target="slides/slide{number}.xml"/>"#,
        package::SLIDE_REL_TYPE
    );
    insert_before(
        &mut presentation_rels,
        "</Relationships>",
        &slide_rel,
        package::PRESENTATION_RELS,
    )?;

    let mut presentation = package.text(package::PRESENTATION)?;
    let slide_id = next_number(&patterns.slide_id, &presentation, package::FIRST_SLIDE_ID);
    let slide_ref = format!(r#"<p:sldId id="{slide_id}" r:id="rId{relationship}"/>"#);
    append_slide_id(&mut presentation, &slide_ref)?;

    package.set(package::CONTENT_TYPES, content_types);
    package.set(package::PRESENTATION_RELS, presentation_rels);
    package.set(package::PRESENTATION, presentation);
    package.set(
        &format!("ppt/slides/slide{number}.xml"),
        package::slide(Layout::TitleAndContent, title, content),
    );
    package.set(
        &format!("ppt/slides/_rels/slide{number}.xml.rels"),
        package::slide_rels(&layout_target),
    );

    let artifact = package.write(store, "updated_", &format!("{}.pptx", source.stem()))?;
    info!(slide = number, path = %artifact.path().display(), "Added slide");
    Ok(artifact)
}

/// Replaces the title and the first text shape of slide `number` (1-based).
///
/// A slide without a title placeholder gets no title; a slide without another
/// text shape keeps its content as is.
pub fn modify_slide(
    store: &ArtifactStore,
    source: &StoredArtifact,
    number: usize,
    title: &str,
    content: &str,
) -> Result<StoredArtifact> {
    let patterns = Patterns::compile()?;
    let mut package = Package::read(source)?;
    let slides = slide_entries(package.names(), &patterns);
    let Some((_, part)) = number.checked_sub(1).and_then(|index| slides.get(index)) else {
        return Err(Error::InvalidSelection(format!(
            "slide {number} does not exist in a {}-slide deck",
            slides.len()
        )));
    };

    let xml = package.text(part)?;
    let updated = rewrite_slide(&xml, title, content, &patterns);
    package.set(part, updated);

    let artifact = package.write(store, "modified_", &format!("{}.pptx", source.stem()))?;
    info!(slide = number, path = %artifact.path().display(), "Modified slide");
    Ok(artifact)
}

fn rewrite_slide(xml: &str, title: &str, content: &str, patterns: &Patterns) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut copied_up_to = 0;
    let mut title_done = false;
    let mut content_done = false;
    for shape in patterns.shape.find_iter(xml) {
        let is_title = patterns.title_placeholder.is_match(shape.as_str());
        let text = if is_title && !title_done {
            title_done = true;
            title
        } else if !is_title && !content_done && patterns.text_body.is_match(shape.as_str()) {
            content_done = true;
            content
        } else {
            continue;
        };
        out.push_str(&xml[copied_up_to..shape.start()]);
        out.push_str(&replace_text(shape.as_str(), text, patterns));
        copied_up_to = shape.end();
    }
    out.push_str(&xml[copied_up_to..]);
    if !content_done {
        debug!("Slide has no content shape, content left unchanged");
    }
    out
}

/// Swaps a shape's paragraphs for `text`, keeping its body properties.
fn replace_text(shape: &str, text: &str, patterns: &Patterns) -> String {
    match patterns.text_body.find(shape) {
        Some(body) => {
            let properties = patterns
                .body_properties
                .find(body.as_str())
                .map_or("<a:bodyPr/>", |p| p.as_str());
            format!(
                "{}{}{}",
                &shape[..body.start()],
                package::text_body(properties, text),
                &shape[body.end()..]
            )
        }
        None => shape.replacen(
            "</p:sp>",
            &format!("{}</p:sp>", package::text_body("<a:bodyPr/>", text)),
            1,
        ),
    }
}

/// The title-and-content layout, falling back to the first layout of the deck.
fn content_layout(package: &Package) -> Result<String> {
    let mut layouts: Vec<&str> = package
        .names()
        .filter(|name| name.starts_with("ppt/slideLayouts/slideLayout") && name.ends_with(".xml"))
        .collect();
    layouts.sort_unstable();
    let chosen = layouts
        .iter()
        .find(|name| {
            package
                .text(name)
                .is_ok_and(|xml| xml.contains(r#"type="obj""#))
        })
        .or_else(|| layouts.first())
        .ok_or_else(|| Error::MalformedDocument("deck has no slide layout".to_string()))?;
    Ok(format!("../{}", chosen.trim_start_matches("ppt/")))
}

/// One more than the largest number captured by `pattern`, and at least `floor`.
fn next_number(pattern: &regex::Regex, xml: &str, floor: u64) -> u64 {
    pattern
        .captures_iter(xml)
        .filter_map(|c| c.get(1)?.as_str().parse::<u64>().ok())
        .max()
        .map_or(floor, |max| (max + 1).max(floor))
}

fn insert_before(xml: &mut String, closing: &str, fragment: &str, part: &str) -> Result<()> {
    let at = xml
        .rfind(closing)
        .ok_or_else(|| Error::MalformedDocument(format!("{part} has no {closing}")))?;
    xml.insert_str(at, fragment);
    Ok(())
}

fn append_slide_id(presentation: &mut String, slide_ref: &str) -> Result<()> {
    if presentation.contains("</p:sldIdLst>") {
        return insert_before(presentation, "</p:sldIdLst>", slide_ref, package::PRESENTATION);
    }
    let list = format!("<p:sldIdLst>{slide_ref}</p:sldIdLst>");
    if presentation.contains("<p:sldIdLst/>") {
        *presentation = presentation.replacen("<p:sldIdLst/>", &list, 1);
        return Ok(());
    }
    let anchor = "</p:sldMasterIdLst>";
    let at = presentation
        .find(anchor)
        .ok_or_else(|| Error::MalformedDocument("presentation has no slide master list".to_string()))?;
    presentation.insert_str(at + anchor.len(), &list);
    Ok(())
}
