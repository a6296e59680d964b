use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::fields::{first_element, node_text};

pub const FULL_TEXT_KEY: &str = "FullText";

const CONTENT_ROOTS: [&str; 3] = ["article", "div#main", "div#content"];

static SEGMENT_HEADINGS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2, h3").unwrap());
static NAMED_HEADINGS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h2, h3, h4").unwrap());
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());

static METHODS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)method|material").unwrap());
static RESULTS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)result|finding").unwrap());
static CONCLUSIONS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)conclusion|discussion").unwrap());

/// Heading text → section text, in document order. Re-inserting a name
/// replaces the text but keeps the original position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionMap {
    entries: Vec<(String, String)>,
}

impl SectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, text: String) {
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = text,
            None => self.entries.push((name, text)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First section whose name contains any of `needles` (case-insensitive).
    pub fn find_containing(&self, needles: &[&str]) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .find(|(k, _)| {
                let k = k.to_lowercase();
                needles.iter().any(|n| k.contains(n))
            })
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for SectionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Methods / Results / Conclusions texts from the first matching heading.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct NamedSections {
    pub methods: Option<String>,
    pub results: Option<String>,
    pub conclusions: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedSection {
    Methods,
    Results,
    Conclusions,
}

impl NamedSection {
    fn pattern(&self) -> &'static Regex {
        match self {
            NamedSection::Methods => &METHODS_RE,
            NamedSection::Results => &RESULTS_RE,
            NamedSection::Conclusions => &CONCLUSIONS_RE,
        }
    }
}

/// `article`, then `div#main`, then `div#content`, else the whole document.
pub fn content_root(doc: &Html) -> ElementRef<'_> {
    first_element(doc.root_element(), &CONTENT_ROOTS).unwrap_or_else(|| doc.root_element())
}

/// Headed sections, or a single `FullText` entry when there are none.
pub fn segment(doc: &Html) -> SectionMap {
    match segment_body(doc) {
        Body::Headed(sections) => sections,
        Body::Unheaded(text) => {
            let mut fallback = SectionMap::new();
            if let Some(text) = text {
                fallback.insert(FULL_TEXT_KEY.to_string(), text);
            }
            fallback
        }
    }
}

/// Headed sections, or the paragraph fallback when the root has no usable
/// headings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Headed(SectionMap),
    Unheaded(Option<String>),
}

pub fn segment_body(doc: &Html) -> Body {
    let root = content_root(doc);
    let sections = segment_headed(root);
    if sections.is_empty() {
        Body::Unheaded(full_text_fallback(root))
    } else {
        Body::Headed(sections)
    }
}

/// Sibling walk from every h2/h3 under `root`.
pub fn segment_headed(root: ElementRef) -> SectionMap {
    let mut sections = SectionMap::new();
    for heading in root.select(&SEGMENT_HEADINGS) {
        let name = node_text(heading);
        if name.is_empty() {
            continue;
        }
        let texts = walk_section(heading);
        if !texts.is_empty() {
            sections.insert(name, texts.join(" "));
        }
    }
    sections
}

/// Paragraph texts following `heading` up to the next heading of the same
/// or a higher level. Deeper headings are stepped over; `div`/`section`
/// siblings contribute their nested paragraphs.
fn walk_section(heading: ElementRef) -> Vec<String> {
    let Some(level) = heading_level(heading) else {
        return Vec::new();
    };
    let mut texts: Vec<String> = Vec::new();
    for sibling in heading.next_siblings().filter_map(ElementRef::wrap) {
        if let Some(other) = heading_level(sibling) {
            if other <= level {
                break;
            }
            continue;
        }
        match sibling.value().name() {
            "p" => texts.push(node_text(sibling)),
            "div" | "section" => texts.extend(sibling.select(&P_SEL).map(node_text)),
            _ => {}
        }
    }
    texts.retain(|t| !t.is_empty());
    texts
}

/// Every paragraph under `root` separated by blank lines.
pub fn full_text_fallback(root: ElementRef) -> Option<String> {
    let paras: Vec<String> = root
        .select(&P_SEL)
        .map(node_text)
        .filter(|t| !t.is_empty())
        .collect();
    if paras.is_empty() {
        None
    } else {
        Some(paras.join("\n\n"))
    }
}

/// Section walk from the first h2–h4 whose title matches `kind`, texts
/// joined by newlines. Later matching headings are ignored.
pub fn named_section(root: ElementRef, kind: NamedSection) -> Option<String> {
    let heading = root
        .select(&NAMED_HEADINGS)
        .find(|h| kind.pattern().is_match(&node_text(*h)))?;
    let texts = walk_section(heading);
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

pub fn named_sections(root: ElementRef) -> NamedSections {
    NamedSections {
        methods: named_section(root, NamedSection::Methods),
        results: named_section(root, NamedSection::Results),
        conclusions: named_section(root, NamedSection::Conclusions),
    }
}

fn heading_level(el: ElementRef) -> Option<u8> {
    match el.value().name() {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

// ── Tests ──
