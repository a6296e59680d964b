use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::analysis::{compare, effects, graph, keywords, themes};
use crate::citations;
use crate::csv_input::PaperEntry;
use crate::db;
use crate::extract::assemble::truncate_chars;
use crate::extract::ContentExtractor;
use crate::fetcher::PageFetcher;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub stubs: usize,
    pub skipped: usize,
    pub failed: usize,
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Extract and store each entry in turn. URLs that already produced a real
/// record are skipped without fetching; stubs are retried. `delay`
/// separates consecutive fetches.
pub async fn ingest<F: PageFetcher>(
    conn: &Connection,
    extractor: &ContentExtractor<F>,
    entries: &[PaperEntry],
    delay: Duration,
) -> Result<IngestStats> {
    let mut stats = IngestStats {
        total: entries.len(),
        ..Default::default()
    };
    let pb = progress_bar(entries.len());
    let mut fetched_any = false;

    for entry in entries {
        let stored_url = truncate_chars(&entry.url, extractor.limits().url);
        if db::paper_extracted_from(conn, &stored_url)? {
            stats.skipped += 1;
            pb.inc(1);
            continue;
        }
        if fetched_any {
            tokio::time::sleep(delay).await;
        }
        fetched_any = true;

        let record = extractor
            .extract_from_url(&entry.url, Some(&entry.title))
            .await;
        if record.is_stub() {
            stats.stubs += 1;
        }
        match db::save_paper(conn, &record) {
            Ok(up) if up.inserted => stats.inserted += 1,
            Ok(_) => stats.updated += 1,
            Err(e) => {
                warn!(url = %entry.url, error = %e, "Failed to store paper");
                stats.failed += 1;
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    info!(
        total = stats.total,
        inserted = stats.inserted,
        updated = stats.updated,
        stubs = stats.stubs,
        skipped = stats.skipped,
        failed = stats.failed,
        "Ingestion finished"
    );
    Ok(stats)
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub ingest: IngestStats,
    pub citation_edges: usize,
    pub summaries: usize,
    pub themes: usize,
    pub effects: usize,
    pub comparisons: usize,
    pub relations: usize,
}

/// Every stage in order: ingest, citations, summaries, themes, effects,
/// comparisons, relation graph. A failing derived stage is logged and the
/// run continues with the next one.
pub async fn run_all<F: PageFetcher>(
    conn: &Connection,
    extractor: &ContentExtractor<F>,
    entries: &[PaperEntry],
    delay: Duration,
    out_dir: &Path,
) -> Result<PipelineReport> {
    let mut report = PipelineReport {
        ingest: ingest(conn, extractor, entries, delay).await?,
        ..Default::default()
    };

    let t = Instant::now();
    match citations::ingest_all(conn, extractor.fetcher(), None, delay).await {
        Ok(s) => report.citation_edges = s.edges_created,
        Err(e) => warn!(error = %e, "Citation stage failed"),
    }
    info!(secs = t.elapsed().as_secs_f64(), "Citations stage done");

    report.summaries = stage("summaries", keywords::run(conn, None));
    report.themes = stage("themes", themes::run(conn));
    report.effects = stage("effects", effects::run(conn));
    report.comparisons = stage("comparisons", compare::run(conn));
    report.relations = stage("graph", graph::run(conn, out_dir).map(|g| g.relations));
    Ok(report)
}

fn stage(name: &str, result: Result<usize>) -> usize {
    result.unwrap_or_else(|e| {
        warn!(stage = name, error = %e, "Stage failed");
        0
    })
}

// ── Tests ──
