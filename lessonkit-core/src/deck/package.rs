//! Parts of a freshly built deck package and the markup for generated slides.

pub(super) const CONTENT_TYPES: &str = "[Content_Types].xml";
pub(super) const PRESENTATION: &str = "ppt/presentation.xml";
pub(super) const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

const NS: &str = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;
const REL_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_TYPE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
pub(super) const SLIDE_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
pub(super) const SLIDE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";

/// 10 x 7.5 inches, in EMU.
const SLIDE_WIDTH: u64 = 9_144_000;
const SLIDE_HEIGHT: u64 = 6_858_000;

/// Slide ids start here; lower values are reserved.
pub(super) const FIRST_SLIDE_ID: u64 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Layout {
    Title,
    TitleAndContent,
}

impl Layout {
    fn number(self) -> usize {
        match self {
            Layout::Title => 1,
            Layout::TitleAndContent => 2,
        }
    }

    /// Target of a slide's layout relationship.
    pub(super) fn target(self) -> String {
        format!("../slideLayouts/slideLayout{}.xml", self.number())
    }
}

/// Placeholder markup and position (x, y, cx, cy) of a shape.
struct Placeholder {
    name: &'static str,
    kind: &'static str,
    frame: [u64; 4],
}

const CENTERED_TITLE: Placeholder = Placeholder {
    name: "Title",
    kind: r#"<p:ph type="ctrTitle"/>"#,
    frame: [685_800, 2_130_425, 7_772_400, 1_470_025],
};
const SUBTITLE: Placeholder = Placeholder {
    name: "Subtitle",
    kind: r#"<p:ph type="subTitle" idx="1"/>"#,
    frame: [1_371_600, 3_886_200, 6_400_800, 1_752_600],
};
const TITLE: Placeholder = Placeholder {
    name: "Title",
    kind: r#"<p:ph type="title"/>"#,
    frame: [457_200, 274_638, 8_229_600, 1_143_000],
};
const BODY: Placeholder = Placeholder {
    name: "Content",
    kind: r#"<p:ph idx="1"/>"#,
    frame: [457_200, 1_600_200, 8_229_600, 4_525_963],
};

/// Escapes text for element content, dropping characters XML cannot carry.
pub(super) fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// A text body with one paragraph per line of `text`.
pub(super) fn text_body(body_properties: &str, text: &str) -> String {
    let paragraphs: String = if text.is_empty() {
        r#"<a:p><a:endParaRPr lang="en-US" dirty="0"/></a:p>"#.to_string()
    } else {
        text.lines()
            .map(|line| {
                format!(
                    r#"<a:p><a:r><a:rPr lang="en-US" dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
                    escape(line)
                )
            })
            .collect()
    };
    format!("<p:txBody>{body_properties}<a:lstStyle/>{paragraphs}</p:txBody>")
}

fn shape(id: usize, placeholder: &Placeholder, text: &str) -> String {
    let [x, y, cx, cy] = placeholder.frame;
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name} {id}"/><p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr><p:nvPr>{kind}</p:nvPr></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm></p:spPr>{body}</p:sp>"#,
        name = placeholder.name,
        kind = placeholder.kind,
        body = text_body("<a:bodyPr/>", text),
    )
}

const EMPTY_TREE: &str = r#"<p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>"#;

/// Markup of a slide with a title and one text placeholder below it.
pub(super) fn slide(layout: Layout, title: &str, body: &str) -> String {
    let (title_placeholder, body_placeholder) = match layout {
        Layout::Title => (&CENTERED_TITLE, &SUBTITLE),
        Layout::TitleAndContent => (&TITLE, &BODY),
    };
    format!(
        r#"{XML_DECL}<p:sld {NS}><p:cSld><p:spTree>{EMPTY_TREE}{}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#,
        shape(2, title_placeholder, title),
        shape(3, body_placeholder, body),
    )
}

pub(super) fn slide_rels(layout_target: &str) -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_TYPE}/slideLayout" Target="{layout_target}"/></Relationships>"#
    )
}

pub(super) fn slide_override(number: usize) -> String {
    format!(r#"<Override PartName="/ppt/slides/slide{number}.xml" ContentType="{SLIDE_CONTENT_TYPE}"/>"#)
}

/// Every part of a new package except the slides themselves.
pub(super) fn skeleton(slide_count: usize) -> Vec<(String, String)> {
    let slide_overrides: String = (1..=slide_count).map(slide_override).collect();
    let content_types = format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/slideLayouts/slideLayout2.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>{slide_overrides}</Types>"#
    );
    let root_rels = format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_TYPE}/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#
    );

    // rId1 is the master, rId2 the theme, slides follow from rId3.
    let slide_ids: String = (0..slide_count)
        .map(|i| {
            format!(
                r#"<p:sldId id="{}" r:id="rId{}"/>"#,
                FIRST_SLIDE_ID + i as u64,
                i + 3
            )
        })
        .collect();
    let presentation = format!(
        r#"{XML_DECL}<p:presentation {NS} saveSubsetFonts="1"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{slide_ids}</p:sldIdLst><p:sldSz cx="{SLIDE_WIDTH}" cy="{SLIDE_HEIGHT}"/><p:notesSz cx="{SLIDE_HEIGHT}" cy="{SLIDE_WIDTH}"/></p:presentation>"#
    );
    let slide_rels: String = (1..=slide_count)
        .map(|n| {
            format!(
                r#"<Relationship Id="rId{}" Type="{SLIDE_REL_TYPE}" Target="slides/slide{n}.xml"/>"#,
                n + 2
            )
        })
        .collect();
    let presentation_rels = format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_TYPE}/slideMaster" Target="slideMasters/slideMaster1.xml"/><Relationship Id="rId2" Type="{REL_TYPE}/theme" Target="theme/theme1.xml"/>{slide_rels}</Relationships>"#
    );

    let master = format!(
        r#"{XML_DECL}<p:sldMaster {NS}><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree>{EMPTY_TREE}</p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/><p:sldLayoutId id="2147483650" r:id="rId2"/></p:sldLayoutIdLst></p:sldMaster>"#
    );
    let master_rels = format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_TYPE}/slideLayout" Target="../slideLayouts/slideLayout1.xml"/><Relationship Id="rId2" Type="{REL_TYPE}/slideLayout" Target="../slideLayouts/slideLayout2.xml"/><Relationship Id="rId3" Type="{REL_TYPE}/theme" Target="../theme/theme1.xml"/></Relationships>"#
    );
    let layout = |kind: &str, name: &str| {
        format!(
            r#"{XML_DECL}<p:sldLayout {NS} type="{kind}" preserve="1"><p:cSld name="{name}"><p:spTree>{EMPTY_TREE}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#
        )
    };
    let layout_rels = format!(
        r#"{XML_DECL}<Relationships xmlns="{REL_NS}"><Relationship Id="rId1" Type="{REL_TYPE}/slideMaster" Target="../slideMasters/slideMaster1.xml"/></Relationships>"#
    );

    vec![
        (CONTENT_TYPES.to_string(), content_types),
        ("_rels/.rels".to_string(), root_rels),
        (PRESENTATION.to_string(), presentation),
        (PRESENTATION_RELS.to_string(), presentation_rels),
        ("ppt/slideMasters/slideMaster1.xml".to_string(), master),
        ("ppt/slideMasters/_rels/slideMaster1.xml.rels".to_string(), master_rels),
        ("ppt/slideLayouts/slideLayout1.xml".to_string(), layout("title", "Title Slide")),
        ("ppt/slideLayouts/_rels/slideLayout1.xml.rels".to_string(), layout_rels.clone()),
        ("ppt/slideLayouts/slideLayout2.xml".to_string(), layout("obj", "Title and Content")),
        ("ppt/slideLayouts/_rels/slideLayout2.xml.rels".to_string(), layout_rels),
        ("ppt/theme/theme1.xml".to_string(), theme()),
    ]
}

fn theme() -> String {
    let colors = [
        ("dk1", r#"<a:sysClr val="windowText" lastClr="000000"/>"#),
        ("lt1", r#"<a:sysClr val="window" lastClr="FFFFFF"/>"#),
        ("dk2", r#"<a:srgbClr val="1F497D"/>"#),
        ("lt2", r#"<a:srgbClr val="EEECE1"/>"#),
        ("accent1", r#"<a:srgbClr val="4F81BD"/>"#),
        ("accent2", r#"<a:srgbClr val="C0504D"/>"#),
        ("accent3", r#"<a:srgbClr val="9BBB59"/>"#),
        ("accent4", r#"<a:srgbClr val="8064A2"/>"#),
        ("accent5", r#"<a:srgbClr val="4BACC6"/>"#),
        ("accent6", r#"<a:srgbClr val="F79646"/>"#),
        ("hlink", r#"<a:srgbClr val="0000FF"/>"#),
        ("folHlink", r#"<a:srgbClr val="800080"/>"#),
    ];
    let color_scheme: String = colors
        .iter()
        .map(|(slot, color)| format!("<a:{slot}>{color}</a:{slot}>"))
        .collect();
    let font = r#"<a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/>"#;
    let fill = r#"<a:solidFill><a:schemeClr val="phClr"/></a:solidFill>"#;
    let fills = fill.repeat(3);
    let lines = format!(r#"<a:ln w="9525">{fill}</a:ln>"#).repeat(3);
    let effects = "<a:effectStyle><a:effectLst/></a:effectStyle>".repeat(3);
    format!(
        r#"{XML_DECL}<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="lessonkit"><a:themeElements><a:clrScheme name="lessonkit">{color_scheme}</a:clrScheme><a:fontScheme name="lessonkit"><a:majorFont>{font}</a:majorFont><a:minorFont>{font}</a:minorFont></a:fontScheme><a:fmtScheme name="lessonkit"><a:fillStyleLst>{fills}</a:fillStyleLst><a:lnStyleLst>{lines}</a:lnStyleLst><a:effectStyleLst>{effects}</a:effectStyleLst><a:bgFillStyleLst>{fills}</a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#
    )
}
