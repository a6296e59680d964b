use std::time::Duration;

use anyhow::{Context, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, PaperRow};
use crate::error::ExtractError;
use crate::extract::fields::{clean_text, parse_year, strip_doi_prefix};
use crate::extract::pubmed::efetch_url;
use crate::extract::PaperRecord;
use crate::fetcher::PageFetcher;
use crate::source::pmcid_in;

/// One entry of a JATS `<ref-list>`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reference {
    pub title: Option<String>,
    pub journal: Option<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
    pub authors: Vec<String>,
}

impl Reference {
    /// Identifier used as the paper key: the DOI, else the same synthetic
    /// `PMC:`/`PMID:` ids extraction produces.
    fn identifier(&self) -> Option<String> {
        self.doi
            .clone()
            .or_else(|| self.pmcid.as_ref().map(|id| format!("PMC:{}", id)))
            .or_else(|| self.pmid.as_ref().map(|id| format!("PMID:{}", id)))
    }

    /// Papers table needs a title; untitled references use their identifier.
    fn into_record(self) -> Option<PaperRecord> {
        let doi = self.identifier();
        let title = self.title.or_else(|| doi.clone())?;
        Some(PaperRecord {
            title,
            year: self.year,
            journal: self.journal,
            doi,
            authors: self.authors,
            ..Default::default()
        })
    }
}

#[derive(Debug, Default)]
pub struct JatsArticle {
    pub title: Option<String>,
    pub references: Vec<Reference>,
}

/// Parse a PMC efetch JATS document: the article title and its references.
/// Refs without an `element-citation` or `mixed-citation` are ignored.
pub fn parse_jats(xml: &str) -> Result<JatsArticle, ExtractError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut article = JatsArticle::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut title_parts: Vec<String> = Vec::new();
    let mut current: Option<Reference> = None;
    let mut has_citation = false;
    let mut ref_title: Vec<String> = Vec::new();
    let mut surname = String::new();
    let mut given = String::new();
    let mut pub_id_type: Option<String> = None;
    let mut ext_link_doi = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                match name.as_slice() {
                    b"ref" if inside(&path, b"ref-list") => {
                        current = Some(Reference::default());
                        has_citation = false;
                        ref_title.clear();
                    }
                    b"element-citation" | b"mixed-citation" => has_citation = true,
                    b"name" => {
                        surname.clear();
                        given.clear();
                    }
                    b"pub-id" => pub_id_type = attr_lower(&e, "pub-id-type")?,
                    b"ext-link" => {
                        ext_link_doi = attr_lower(&e, "ext-link-type")?.as_deref() == Some("doi")
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::Text(e) => {
                let text = clean_text(&e.unescape()?);
                match current.as_mut() {
                    _ if text.is_empty() => {}
                    Some(r) if has_citation => match path.last().map(Vec::as_slice) {
                        Some(b"source") => {
                            r.journal.get_or_insert(text);
                        }
                        Some(b"year") if r.year.is_none() => r.year = parse_year(&text),
                        Some(b"surname") => surname = text,
                        Some(b"given-names") => given = text,
                        Some(b"pub-id") => match pub_id_type.as_deref() {
                            Some("doi") => r.doi = Some(text),
                            Some("pmid") => r.pmid = Some(text),
                            Some("pmcid") | Some("pmc") => {
                                r.pmcid = Some(if text.starts_with("PMC") {
                                    text
                                } else {
                                    format!("PMC{}", text)
                                });
                            }
                            _ => {}
                        },
                        _ if ext_link_doi && inside(&path, b"ext-link") => {
                            r.doi.get_or_insert_with(|| strip_doi_prefix(&text));
                        }
                        _ if inside(&path, b"article-title") => ref_title.push(text),
                        _ => {}
                    },
                    Some(_) => {}
                    None => {
                        if article.title.is_none()
                            && inside(&path, b"title-group")
                            && inside(&path, b"article-title")
                        {
                            title_parts.push(text);
                        }
                    }
                }
            }
            Event::End(e) => {
                path.pop();
                match e.name().as_ref() {
                    b"article-title" if current.is_none() && !title_parts.is_empty() => {
                        article.title.get_or_insert_with(|| title_parts.join(" "));
                    }
                    b"name" => {
                        if let Some(r) = current.as_mut() {
                            match (given.is_empty(), surname.is_empty()) {
                                (_, true) => {}
                                (true, false) => r.authors.push(surname.clone()),
                                (false, false) => r.authors.push(format!("{} {}", given, surname)),
                            }
                        }
                    }
                    b"ext-link" => ext_link_doi = false,
                    b"ref" => {
                        if let Some(mut r) = current.take() {
                            if has_citation {
                                if !ref_title.is_empty() {
                                    r.title = Some(ref_title.join(" "));
                                }
                                article.references.push(r);
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(article)
}

fn attr_lower(e: &BytesStart, key: &str) -> Result<Option<String>, ExtractError> {
    let attr = e
        .try_get_attribute(key)
        .map_err(|err| ExtractError::Parse(err.to_string()))?;
    match attr {
        Some(a) => Ok(Some(a.unescape_value()?.to_lowercase())),
        None => Ok(None),
    }
}

fn inside(path: &[Vec<u8>], tag: &[u8]) -> bool {
    path.iter().any(|p| p.as_slice() == tag)
}

// ── Persistence ──

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CitationOutcome {
    pub refs_parsed: usize,
    pub edges_created: usize,
}

/// Store each reference as a paper and link it as cited by `citing_id`.
pub fn store_references(
    conn: &Connection,
    citing_id: i64,
    references: Vec<Reference>,
) -> Result<CitationOutcome> {
    let mut outcome = CitationOutcome {
        refs_parsed: references.len(),
        edges_created: 0,
    };
    for reference in references {
        let Some(record) = reference.into_record() else {
            debug!(citing_id, "Skipping reference with no title or DOI");
            continue;
        };
        let cited = db::save_paper(conn, &record)?;
        if cited.id != citing_id && db::save_citation(conn, cited.id, citing_id)? {
            outcome.edges_created += 1;
        }
    }
    Ok(outcome)
}

/// Fetch the JATS for one stored paper and record its reference list.
pub async fn ingest_paper<F: PageFetcher>(
    conn: &Connection,
    fetcher: &F,
    paper: &PaperRow,
) -> Result<CitationOutcome> {
    let pmcid = paper
        .doi
        .as_deref()
        .and_then(pmcid_in)
        .or_else(|| paper.pdf_url.as_deref().and_then(pmcid_in))
        .with_context(|| format!("No PMC id for paper {}", paper.id))?;

    let xml = fetcher
        .fetch(&efetch_url("pmc", pmcid.trim_start_matches("PMC")))
        .await
        .with_context(|| format!("Failed to fetch JATS for {}", pmcid))?;
    let jats = parse_jats(&xml).with_context(|| format!("Invalid JATS for {}", pmcid))?;

    let outcome = store_references(conn, paper.id, jats.references)?;
    info!(
        paper_id = paper.id,
        pmcid = %pmcid,
        refs = outcome.refs_parsed,
        edges = outcome.edges_created,
        "Ingested references"
    );
    Ok(outcome)
}

#[derive(Debug, Default)]
pub struct CitationStats {
    pub papers: usize,
    pub failed: usize,
    pub refs_parsed: usize,
    pub edges_created: usize,
}

/// Walk PMC-backed papers one at a time, pausing `delay` between fetches.
pub async fn ingest_all<F: PageFetcher>(
    conn: &Connection,
    fetcher: &F,
    limit: Option<usize>,
    delay: Duration,
) -> Result<CitationStats> {
    let papers = db::fetch_pmc_papers(conn, limit)?;
    info!(papers = papers.len(), "Ingesting PMC reference lists");

    let mut stats = CitationStats::default();
    for (i, paper) in papers.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }
        match ingest_paper(conn, fetcher, paper).await {
            Ok(outcome) => {
                stats.papers += 1;
                stats.refs_parsed += outcome.refs_parsed;
                stats.edges_created += outcome.edges_created;
            }
            Err(e) => {
                warn!(paper_id = paper.id, error = %e, "Reference ingestion failed");
                stats.failed += 1;
            }
        }
    }
    Ok(stats)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::memory_db;
    use crate::extract::testing::StubFetcher;

    const JATS: &str = r#"<?xml version="1.0"?>
<pmc-articleset><article>
  <front><article-meta><title-group>
    <article-title>Spaceflight alters <italic>Arabidopsis</italic> roots</article-title>
  </title-group></article-meta></front>
  <back><ref-list>
    <ref id="r1"><element-citation publication-type="journal">
      <person-group><name><surname>Paul</surname><given-names>AL</given-names></name>
      <name><surname>Ferl</surname></name></person-group>
      <article-title>Root growth in orbit</article-title>
      <source>Plant Physiol</source><year>2012</year>
      <pub-id pub-id-type="doi">10.1104/pp.112.1</pub-id>
      <pub-id pub-id-type="pmcid">3456</pub-id>
    </element-citation></ref>
    <ref id="r2"><mixed-citation>Smith J. <source>Gravit Space Res</source>
      <year>2009</year>. <ext-link ext-link-type="doi">https://doi.org/10.2/gsr</ext-link>
    </mixed-citation></ref>
    <ref id="r3"><note>No citation element</note></ref>
  </ref-list></back>
</article></pmc-articleset>"#;

    #[test]
    fn parses_title_and_references() {
        let a = parse_jats(JATS).unwrap();
        assert_eq!(a.title.as_deref(), Some("Spaceflight alters Arabidopsis roots"));
        assert_eq!(a.references.len(), 2);

        let r1 = &a.references[0];
        assert_eq!(r1.title.as_deref(), Some("Root growth in orbit"));
        assert_eq!(r1.journal.as_deref(), Some("Plant Physiol"));
        assert_eq!(r1.year, Some(2012));
        assert_eq!(r1.doi.as_deref(), Some("10.1104/pp.112.1"));
        assert_eq!(r1.pmcid.as_deref(), Some("PMC3456"));
        assert_eq!(r1.authors, vec!["AL Paul", "Ferl"]);

        let r2 = &a.references[1];
        assert_eq!(r2.title, None);
        assert_eq!(r2.doi.as_deref(), Some("10.2/gsr"));
        assert_eq!(r2.year, Some(2009));
    }

    #[test]
    fn synthetic_identifiers_for_doi_less_refs() {
        let r = Reference {
            pmcid: Some("PMC7".into()),
            pmid: Some("11".into()),
            ..Default::default()
        };
        let rec = r.into_record().unwrap();
        assert_eq!(rec.doi.as_deref(), Some("PMC:PMC7"));
        assert_eq!(rec.title, "PMC:PMC7");

        let r = Reference {
            title: Some("Only pmid".into()),
            pmid: Some("11".into()),
            ..Default::default()
        };
        assert_eq!(r.into_record().unwrap().doi.as_deref(), Some("PMID:11"));
        assert!(Reference::default().into_record().is_none());
    }

    #[test]
    fn stores_edges_once() {
        let conn = memory_db();
        let citing = db::upsert_paper(
            &conn,
            &PaperRecord {
                title: "Citing".into(),
                doi: Some("PMC:PMC99".into()),
                ..Default::default()
            },
        )
        .unwrap()
        .id;

        let refs = parse_jats(JATS).unwrap().references;
        let first = store_references(&conn, citing, refs.clone()).unwrap();
        assert_eq!(first, CitationOutcome { refs_parsed: 2, edges_created: 2 });
        let again = store_references(&conn, citing, refs).unwrap();
        assert_eq!(again.edges_created, 0);
        assert_eq!(db::get_stats(&conn).unwrap().citations, 2);
    }

    #[tokio::test]
    async fn ingest_fetches_pmc_efetch() {
        let conn = memory_db();
        db::upsert_paper(
            &conn,
            &PaperRecord {
                title: "Citing".into(),
                doi: Some("PMC:PMC99".into()),
                pdf_url: "https://www.ncbi.nlm.nih.gov/pmc/articles/PMC99/".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let fetcher = StubFetcher::default().with_page(&efetch_url("pmc", "99"), JATS);

        let stats = ingest_all(&conn, &fetcher, None, Duration::ZERO).await.unwrap();
        assert_eq!(stats.papers, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.edges_created, 2);
        assert_eq!(fetcher.call_count(), 1);
    }
}
