use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static PMCID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)PMC\d+").unwrap());
static TRAILING_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/(\d+)/?$").unwrap());

/// Hosting platform of a paper; selects the extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SourceKind {
    Pmc,
    PubMed,
    BioRxivLike,
    Generic,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Pmc => "pmc",
            SourceKind::PubMed => "pubmed",
            SourceKind::BioRxivLike => "biorxiv",
            SourceKind::Generic => "generic",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick a source kind from URL substrings. Total: anything unknown is Generic.
pub fn classify(url: &str) -> SourceKind {
    let lower = url.to_lowercase();
    if lower.contains("pmc/articles") {
        SourceKind::Pmc
    } else if lower.contains("pubmed") {
        SourceKind::PubMed
    } else if lower.contains("biorxiv") || lower.contains("medrxiv") {
        SourceKind::BioRxivLike
    } else {
        SourceKind::Generic
    }
}

/// PMC identifier embedded anywhere in the text, normalized to upper case.
pub fn pmcid_in(text: &str) -> Option<String> {
    PMCID_RE.find(text).map(|m| m.as_str().to_uppercase())
}

/// Numeric identifier in the URL's trailing path segment (PubMed PMID).
pub fn trailing_numeric_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    TRAILING_ID_RE.captures(path).map(|c| c[1].to_string())
}
