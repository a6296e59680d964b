use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::chain::{first_non_empty, FallbackChain};
use super::fields::{
    clean_text, filter_authors, first_element, first_text, meta_value, meta_values, node_text,
    paragraph_text, parse_year, strip_doi_prefix,
};
use super::pubmed::{self, efetch_url, PubMedArticle};
use super::sections::{content_root, named_sections, segment_body, Body, SectionMap};
use super::visuals;
use super::ExtractedContent;
use crate::error::ExtractError;
use crate::fetcher::PageFetcher;
use crate::source::{pmcid_in, trailing_numeric_id, SourceKind};

const TITLE_META: [&str; 2] = ["citation_title", "dc.title"];
const AUTHOR_META: [&str; 1] = ["citation_author"];
const ABSTRACT_META: [&str; 2] = ["citation_abstract", "description"];
const DOI_META: [&str; 1] = ["citation_doi"];
const DATE_META: [&str; 3] = ["citation_publication_date", "citation_date", "dc.date"];
const JOURNAL_META: [&str; 1] = ["citation_journal_title"];

/// Produces field values for one kind of source.
#[async_trait]
pub trait FieldExtractionStrategy: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn extract(
        &self,
        fetcher: &dyn PageFetcher,
        url: &str,
        fallback_title: Option<&str>,
    ) -> Result<ExtractedContent, ExtractError>;
}

/// Per-source selector lists consumed by `HtmlStrategy`. Lists are tried in
/// order, after the shared meta tags.
#[derive(Debug)]
pub struct SourceProfile {
    pub kind: SourceKind,
    pub title: &'static [&'static str],
    pub authors: &'static [&'static str],
    pub abstract_containers: &'static [&'static str],
    pub doi: &'static [&'static str],
    pub year: &'static [&'static str],
    pub journal: &'static [&'static str],
}

const AUTHOR_CLASSES: &[&str] = &[".contrib-auth", ".authors", ".author"];
const ABSTRACT_CONTAINERS: &[&str] = &["div.abstract", "section.abstract", "#abstract", "#Abs1"];
const DOI_NODES: &[&str] = &["span.doi", ".citation-doi"];
const JOURNAL_NODES: &[&str] = &["span.journal-title", "a.journal-link"];

pub static PMC_PROFILE: SourceProfile = SourceProfile {
    kind: SourceKind::Pmc,
    title: &["h1.content-title", "h1"],
    authors: AUTHOR_CLASSES,
    abstract_containers: &[
        "div.abstract",
        "section.abstract",
        "#abstract",
        "#Abs1",
        "abstract",
    ],
    doi: DOI_NODES,
    year: &["span.cit"],
    journal: JOURNAL_NODES,
};

pub static BIORXIV_PROFILE: SourceProfile = SourceProfile {
    kind: SourceKind::BioRxivLike,
    title: &["h1#page-title", "h1"],
    authors: &[".highwire-citation-author", ".contrib-auth", ".authors", ".author"],
    abstract_containers: &[
        "div.section.abstract",
        "div.abstract",
        "section.abstract",
        "#abstract",
        "#Abs1",
    ],
    doi: &[".highwire-cite-metadata-doi", "span.doi", ".citation-doi"],
    year: &[],
    journal: JOURNAL_NODES,
};

pub static GENERIC_PROFILE: SourceProfile = SourceProfile {
    kind: SourceKind::Generic,
    title: &["h1"],
    authors: AUTHOR_CLASSES,
    abstract_containers: ABSTRACT_CONTAINERS,
    doi: DOI_NODES,
    year: &[],
    journal: JOURNAL_NODES,
};

/// Fetches the page itself and reads fields from its DOM.
pub struct HtmlStrategy {
    profile: &'static SourceProfile,
}

/// Reads fields from the PubMed efetch XML for the PMID in the URL.
pub struct PubMedStrategy;

static PMC: HtmlStrategy = HtmlStrategy {
    profile: &PMC_PROFILE,
};
static BIORXIV: HtmlStrategy = HtmlStrategy {
    profile: &BIORXIV_PROFILE,
};
static GENERIC: HtmlStrategy = HtmlStrategy {
    profile: &GENERIC_PROFILE,
};
static PUBMED: PubMedStrategy = PubMedStrategy;

pub fn strategy_for(kind: SourceKind) -> &'static dyn FieldExtractionStrategy {
    match kind {
        SourceKind::Pmc => &PMC,
        SourceKind::PubMed => &PUBMED,
        SourceKind::BioRxivLike => &BIORXIV,
        SourceKind::Generic => &GENERIC,
    }
}

#[async_trait]
impl FieldExtractionStrategy for HtmlStrategy {
    fn kind(&self) -> SourceKind {
        self.profile.kind
    }

    async fn extract(
        &self,
        fetcher: &dyn PageFetcher,
        url: &str,
        fallback_title: Option<&str>,
    ) -> Result<ExtractedContent, ExtractError> {
        let html = fetcher.fetch(url).await?;
        Ok(extract_html(self.profile, url, &html, fallback_title))
    }
}

#[async_trait]
impl FieldExtractionStrategy for PubMedStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::PubMed
    }

    async fn extract(
        &self,
        fetcher: &dyn PageFetcher,
        url: &str,
        fallback_title: Option<&str>,
    ) -> Result<ExtractedContent, ExtractError> {
        let pmid = trailing_numeric_id(url)
            .ok_or_else(|| ExtractError::MissingIdentifier(url.to_string()))?;
        let xml = fetcher.fetch(&efetch_url("pubmed", &pmid)).await?;
        let article = pubmed::parse_article(&xml)?
            .ok_or_else(|| ExtractError::Parse(format!("no PubmedArticle for PMID {}", pmid)))?;
        Ok(content_from_pubmed(article, &pmid, fallback_title))
    }
}

/// Field extraction over an already fetched HTML page.
pub fn extract_html(
    profile: &SourceProfile,
    url: &str,
    html: &str,
    fallback_title: Option<&str>,
) -> ExtractedContent {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let title = FallbackChain::new("title")
        .or(|| meta_value(root, &TITLE_META))
        .or(|| first_text(root, profile.title))
        .or(|| fallback_title.map(str::to_string))
        .resolve();

    let authors = first_non_empty(&[
        &|| filter_authors(meta_values(root, &AUTHOR_META)),
        &|| dom_authors(root, profile.authors),
    ]);

    let abstract_text = FallbackChain::new("abstract")
        .or(|| meta_value(root, &ABSTRACT_META))
        .or(|| abstract_container(root, profile.abstract_containers))
        .resolve();

    let doi = FallbackChain::new("doi")
        .or(|| first_text(root, profile.doi).map(|t| strip_doi_prefix(&t)))
        .or(|| meta_value(root, &DOI_META).map(|d| strip_doi_prefix(&d)))
        .or(|| pmcid_in(url).map(|id| format!("PMC:{}", id)))
        .resolve();

    let year = FallbackChain::new("year")
        .or(|| first_text(root, profile.year).and_then(|t| year_token(&t)))
        .or(|| meta_value(root, &DATE_META).and_then(|t| year_token(&t)))
        .resolve()
        .and_then(|y| y.parse().ok());

    let journal = FallbackChain::new("journal")
        .or(|| first_text(root, profile.journal))
        .or(|| meta_value(root, &JOURNAL_META))
        .or_if(profile.kind == SourceKind::BioRxivLike, || {
            Some(preprint_server(url).to_string())
        })
        .resolve();

    let (sections, full_text) = match segment_body(&doc) {
        Body::Headed(sections) => (sections, None),
        Body::Unheaded(text) => (SectionMap::new(), text),
    };
    let named = named_sections(content_root(&doc));
    let (figures, tables) = visuals::locate(root);

    let content = ExtractedContent {
        title,
        authors,
        abstract_text,
        year,
        journal,
        doi,
        sections,
        full_text,
        named,
        figures,
        tables,
    };
    log_missing(url, profile.kind, &content);
    content
}

fn content_from_pubmed(
    article: PubMedArticle,
    pmid: &str,
    fallback_title: Option<&str>,
) -> ExtractedContent {
    let title = FallbackChain::new("title")
        .or(|| article.title.clone())
        .or(|| fallback_title.map(str::to_string))
        .resolve();
    let doi = FallbackChain::new("doi")
        .or(|| article.doi.clone())
        .or(|| Some(format!("PMID:{}", pmid)))
        .resolve();

    let content = ExtractedContent {
        title,
        authors: filter_authors(article.authors),
        abstract_text: article.abstract_text,
        year: article.year,
        journal: article.journal,
        doi,
        ..Default::default()
    };
    log_missing(pmid, SourceKind::PubMed, &content);
    content
}

/// Author nodes, one selector at a time; `.authors` containers hold a
/// comma or semicolon separated list.
fn dom_authors(root: ElementRef, selectors: &[&str]) -> Vec<String> {
    selectors
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .map(|sel| {
            let names = root.select(&sel).flat_map(|el| {
                let text = node_text(el);
                if el.value().classes().any(|c| c == "authors") {
                    text.split([',', ';']).map(clean_text).collect::<Vec<_>>()
                } else {
                    vec![text]
                }
            });
            filter_authors(names)
        })
        .find(|names| !names.is_empty())
        .unwrap_or_default()
}

fn abstract_container(root: ElementRef, selectors: &[&str]) -> Option<String> {
    first_element(root, selectors).map(paragraph_text)
}

fn year_token(text: &str) -> Option<String> {
    parse_year(text).map(|y| y.to_string())
}

fn preprint_server(url: &str) -> &'static str {
    if url.to_lowercase().contains("medrxiv") {
        "medRxiv"
    } else {
        "bioRxiv"
    }
}

fn log_missing(source: &str, kind: SourceKind, c: &ExtractedContent) {
    let mut missing = Vec::new();
    if c.title.is_none() {
        missing.push("title");
    }
    if c.authors.is_empty() {
        missing.push("authors");
    }
    if c.abstract_text.is_none() {
        missing.push("abstract");
    }
    if c.doi.is_none() {
        missing.push("doi");
    }
    if c.year.is_none() {
        missing.push("year");
    }
    if c.journal.is_none() {
        missing.push("journal");
    }
    if !missing.is_empty() {
        debug!(source, kind = %kind, missing = ?missing, "Extraction degraded");
    }
}

// ── Tests ──
