use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::fields::{clean_text, parse_year};
use crate::error::ExtractError;

const EFETCH_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi";

/// E-utilities efetch URL returning XML for one identifier.
pub fn efetch_url(db: &str, id: &str) -> String {
    format!("{EFETCH_URL}?db={db}&id={id}&retmode=xml")
}

/// Fields read from the first `<PubmedArticle>` of an efetch response.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PubMedArticle {
    pub pmid: Option<String>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub authors: Vec<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub pmcid: Option<String>,
}

/// Parse an efetch `PubmedArticleSet`. `Ok(None)` when no article is present.
pub fn parse_article(xml: &str) -> Result<Option<PubMedArticle>, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut article: Option<PubMedArticle> = None;
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut id_type: Option<String> = None;
    let mut title_parts: Vec<String> = Vec::new();
    let mut abstract_parts: Vec<String> = Vec::new();
    let mut last_name = String::new();
    let mut fore_name = String::new();
    let mut medline_date: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"PubmedArticle" if article.is_none() => {
                        article = Some(PubMedArticle::default());
                    }
                    b"Author" => {
                        last_name.clear();
                        fore_name.clear();
                    }
                    b"ArticleId" | b"ELocationID" => id_type = typed_id(&e)?,
                    _ => {}
                }
                path.push(name);
            }
            Event::Text(e) => {
                let text = clean_text(&e.unescape()?);
                let keep = !text.is_empty() && !inside(&path, b"ReferenceList");
                if let Some(a) = article.as_mut().filter(|_| keep) {
                    match path.last().map(Vec::as_slice) {
                        Some(b"PMID") if a.pmid.is_none() && parent_is(&path, b"MedlineCitation") => {
                            a.pmid = Some(text);
                        }
                        Some(b"LastName") => last_name = text,
                        Some(b"ForeName") => fore_name = text,
                        Some(b"CollectiveName") => a.authors.push(text),
                        Some(b"Title") if parent_is(&path, b"Journal") => a.journal = Some(text),
                        Some(b"Year") if parent_is(&path, b"PubDate") => a.year = parse_year(&text),
                        Some(b"MedlineDate") if parent_is(&path, b"PubDate") => {
                            medline_date = Some(text)
                        }
                        Some(b"ArticleId") => match id_type.as_deref() {
                            Some("doi") => a.doi = Some(text),
                            Some("pmc") => a.pmcid = Some(text),
                            _ => {}
                        },
                        Some(b"ELocationID") if id_type.as_deref() == Some("doi") => {
                            a.doi.get_or_insert(text);
                        }
                        _ if inside(&path, b"ArticleTitle") => title_parts.push(text),
                        _ if inside(&path, b"AbstractText") => abstract_parts.push(text),
                        _ => {}
                    }
                }
            }
            Event::End(e) => {
                path.pop();
                match e.name().as_ref() {
                    b"Author" => {
                        if let Some(a) = article.as_mut() {
                            let name = match (fore_name.is_empty(), last_name.is_empty()) {
                                (_, true) => String::new(),
                                (true, false) => last_name.clone(),
                                (false, false) => format!("{} {}", fore_name, last_name),
                            };
                            if !name.is_empty() {
                                a.authors.push(name);
                            }
                        }
                    }
                    b"PubmedArticle" => break,
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(article.map(|mut a| {
        if !title_parts.is_empty() {
            a.title = Some(title_parts.join(" "));
        }
        if !abstract_parts.is_empty() {
            a.abstract_text = Some(abstract_parts.join(" "));
        }
        if a.year.is_none() {
            a.year = medline_date.as_deref().and_then(parse_year);
        }
        a
    }))
}

fn typed_id(e: &BytesStart) -> Result<Option<String>, ExtractError> {
    for key in ["IdType", "EIdType"] {
        if let Some(attr) = e
            .try_get_attribute(key)
            .map_err(|err| ExtractError::Parse(err.to_string()))?
        {
            return Ok(Some(attr.unescape_value()?.to_lowercase()));
        }
    }
    Ok(None)
}

fn inside(path: &[Vec<u8>], tag: &[u8]) -> bool {
    path.iter().any(|p| p.as_slice() == tag)
}

fn parent_is(path: &[Vec<u8>], tag: &[u8]) -> bool {
    path.len() >= 2 && path[path.len() - 2].as_slice() == tag
}

// ── Tests ──
