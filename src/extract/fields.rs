use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Selector};

static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
static DOI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(doi:\s*|https?://(dx\.)?doi\.org/)").unwrap());

static META_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta").unwrap());
static P_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p").unwrap());

pub const MAX_AUTHORS: usize = 10;

const AUTHOR_MARKERS: [char; 5] = ['✉', '*', '†', '‡', '§'];
const AUTHOR_BOILERPLATE: [&str; 3] = [
    "competing interests",
    "conceived and designed",
    "corresponding author",
];

/// Collapse whitespace runs and trim.
pub fn clean_text(text: &str) -> String {
    WS_RE.replace_all(text, " ").trim().to_string()
}

pub fn node_text(el: ElementRef) -> String {
    clean_text(&el.text().collect::<String>())
}

/// `content` of every meta tag whose `name` or `property` matches one of
/// `names` (ASCII case-insensitive), in document order.
pub fn meta_values(root: ElementRef, names: &[&str]) -> Vec<String> {
    root.select(&META_SEL)
        .filter(|m| {
            let v = m.value();
            v.attr("name")
                .or_else(|| v.attr("property"))
                .is_some_and(|n| names.iter().any(|want| n.eq_ignore_ascii_case(want)))
        })
        .filter_map(|m| m.value().attr("content"))
        .map(clean_text)
        .filter(|c| !c.is_empty())
        .collect()
}

pub fn meta_value(root: ElementRef, names: &[&str]) -> Option<String> {
    meta_values(root, names).into_iter().next()
}

/// First element matching any selector (tried in order) with non-empty text.
pub fn first_text(root: ElementRef, selectors: &[&str]) -> Option<String> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        root.select(&sel)
            .map(node_text)
            .find(|t| !t.is_empty())
    })
}

/// First element matching any selector, in selector order.
pub fn first_element<'a>(root: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors.iter().find_map(|s| {
        let sel = Selector::parse(s).ok()?;
        root.select(&sel).next()
    })
}

/// Paragraph texts joined by a single space; the whole text when the
/// container has no paragraphs.
pub fn paragraph_text(container: ElementRef) -> String {
    let paras: Vec<String> = container
        .select(&P_SEL)
        .map(node_text)
        .filter(|t| !t.is_empty())
        .collect();
    if paras.is_empty() {
        node_text(container)
    } else {
        paras.join(" ")
    }
}

/// First `19xx`/`20xx` token as a whole word.
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR_RE.find(text).and_then(|m| m.as_str().parse().ok())
}

pub fn strip_doi_prefix(raw: &str) -> String {
    let raw = clean_text(raw);
    DOI_PREFIX_RE.replace(&raw, "").trim().to_string()
}

pub fn is_valid_author(name: &str) -> bool {
    let name = name.trim();
    let len = name.chars().count();
    if !(2..=100).contains(&len) {
        return false;
    }
    let lower = name.to_lowercase();
    if name.contains('@') || lower.contains("http") {
        return false;
    }
    if name.starts_with(AUTHOR_MARKERS) {
        return false;
    }
    !AUTHOR_BOILERPLATE.iter().any(|p| lower.contains(p))
}

/// Clean, validate and de-duplicate names, keeping first-seen order, then cap.
pub fn filter_authors(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = clean_text(&name);
        if is_valid_author(&name) && !out.contains(&name) {
            out.push(name);
            if out.len() == MAX_AUTHORS {
                break;
            }
        }
    }
    out
}

// ── Tests ──
