use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::db::{self, KeywordRow, PaperRow, SummaryRow};

const MAX_KEYWORDS: usize = 10;

/// Space-biology vocabulary. Matched at a word start, case-insensitively,
/// except `ISS` which must appear as the uppercase acronym.
static TERMS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        "microgravity",
        "radiation",
        "spaceflight",
        "cell",
        "bone",
        "muscle",
        "gene",
        "protein",
        "stem cell",
        "immune",
        "cardiovascular",
        "plant",
    ]
    .into_iter()
    .map(|t| (t, Regex::new(&format!(r"(?i)\b{}", regex::escape(t))).unwrap()))
    .chain(std::iter::once(("ISS", Regex::new(r"\bISS\b").unwrap())))
    .collect()
});

/// Vocabulary terms found in `text`, with occurrence counts scaled so the
/// most frequent term has relevance 1.0.
pub fn extract_keywords(text: &str) -> Vec<KeywordRow> {
    let counts: Vec<(&str, usize)> = TERMS
        .iter()
        .map(|(term, re)| (*term, re.find_iter(text).count()))
        .filter(|(_, n)| *n > 0)
        .take(MAX_KEYWORDS)
        .collect();
    let max = counts.iter().map(|(_, n)| *n).max().unwrap_or(1) as f64;
    counts
        .into_iter()
        .map(|(term, n)| KeywordRow {
            word: term.to_lowercase(),
            relevance: (n as f64 / max * 100.0).round() / 100.0,
        })
        .collect()
}

/// Split on `.`, `!` or `?` followed by whitespace.
pub fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(j, next)) = chars.peek() {
                if next.is_whitespace() {
                    let s = text[start..=i].trim();
                    if !s.is_empty() {
                        out.push(s);
                    }
                    start = j;
                }
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Extractive summary: the first `max_sentences` sentences. Short texts
/// (under 100 chars) and texts that are already short enough come back as is.
pub fn summarize_text(text: &str, max_sentences: usize) -> String {
    let text = text.trim();
    if text.len() < 100 {
        return text.to_string();
    }
    let parts = sentences(text);
    if parts.len() <= max_sentences {
        return text.to_string();
    }
    parts[..max_sentences].join(" ")
}

/// Build the summary row and keyword list for one paper.
pub fn summarize_paper(paper: &PaperRow) -> (SummaryRow, Vec<KeywordRow>) {
    let summarize = |v: &Option<String>, n| {
        v.as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| summarize_text(t, n))
    };
    let summary_results = summarize(&paper.results_section, 4);
    let summary_conclusions = summarize(&paper.conclusions_section, 3);

    let key_findings = [&summary_results, &summary_conclusions]
        .into_iter()
        .flatten()
        .filter_map(|s| sentences(s).first().map(|f| f.to_string()))
        .collect();

    let text = format!(
        "{} {}",
        paper.title,
        paper.abstract_text.as_deref().unwrap_or_default()
    );
    let summary = SummaryRow {
        paper_id: paper.id,
        summary_abstract: summarize(&paper.abstract_text, 3),
        summary_results,
        summary_conclusions,
        key_findings,
    };
    (summary, extract_keywords(&text))
}

/// Summarize and tag every paper that has no summary yet.
pub fn run(conn: &Connection, limit: Option<usize>) -> Result<usize> {
    let papers = db::fetch_unsummarized(conn, limit)?;
    if papers.is_empty() {
        info!("No papers pending summarization");
        return Ok(0);
    }

    let mut done = 0;
    for paper in &papers {
        let (summary, keywords) = summarize_paper(paper);
        match db::save_summary(conn, &summary, &keywords) {
            Ok(()) => {
                debug!(paper_id = paper.id, keywords = keywords.len(), "Summarized");
                done += 1;
            }
            Err(e) => warn!(paper_id = paper.id, error = %e, "Failed to store summary"),
        }
    }
    info!(done, total = papers.len(), "Summaries stored");
    Ok(done)
}

// ── Tests ──
