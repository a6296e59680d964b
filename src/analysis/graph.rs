use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use crate::db::{self, RelationRow};

pub const MIN_SHARED: usize = 2;
/// Each paper is compared with at most this many following papers.
pub const WINDOW: usize = 50;
/// Node cap for the exported graph; the best-connected papers are kept.
pub const EXPORT_NODES: usize = 50;

/// Pairwise relations by shared keywords. `papers` must be ordered; each
/// paper is compared with the next `WINDOW - 1` entries.
pub fn relate(papers: &[(i64, Vec<String>)], min_shared: usize) -> Vec<RelationRow> {
    let sets: Vec<(i64, BTreeSet<&str>)> = papers
        .iter()
        .map(|(id, words)| (*id, words.iter().map(String::as_str).collect()))
        .collect();

    let mut out = Vec::new();
    for i in 0..sets.len() {
        for j in (i + 1)..(i + WINDOW).min(sets.len()) {
            let (a, ka) = &sets[i];
            let (b, kb) = &sets[j];
            let shared = ka.intersection(kb).count();
            if shared >= min_shared {
                out.push(RelationRow {
                    paper_a: *a,
                    paper_b: *b,
                    shared_keywords: shared,
                    strength: shared as f64 / (ka.len() + kb.len()) as f64,
                });
            }
        }
    }
    out
}

/// Papers related to `paper_id`, strongest first.
pub fn neighbors(relations: &[RelationRow], paper_id: i64) -> Vec<(i64, f64)> {
    let mut out: Vec<(i64, f64)> = relations
        .iter()
        .filter_map(|r| match (r.paper_a == paper_id, r.paper_b == paper_id) {
            (true, _) => Some((r.paper_b, r.strength)),
            (_, true) => Some((r.paper_a, r.strength)),
            _ => None,
        })
        .collect();
    out.sort_by(|x, y| y.1.total_cmp(&x.1).then(x.0.cmp(&y.0)));
    out
}

#[derive(Debug, Serialize)]
pub struct GraphNode {
    pub id: i64,
    pub title: String,
    pub degree: usize,
}

#[derive(Debug, Serialize)]
pub struct GraphEdge {
    pub source: i64,
    pub target: i64,
    pub weight: f64,
}

#[derive(Debug, Serialize)]
pub struct GraphExport {
    pub generated_at: DateTime<Utc>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Subgraph over the `max_nodes` highest-degree papers.
pub fn export(
    relations: &[RelationRow],
    titles: &HashMap<i64, String>,
    max_nodes: usize,
) -> GraphExport {
    let mut degree: HashMap<i64, usize> = HashMap::new();
    for r in relations {
        *degree.entry(r.paper_a).or_default() += 1;
        *degree.entry(r.paper_b).or_default() += 1;
    }
    let mut ranked: Vec<(i64, usize)> = degree.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(max_nodes);

    let kept: BTreeSet<i64> = ranked.iter().map(|(id, _)| *id).collect();
    let nodes = ranked
        .into_iter()
        .map(|(id, degree)| GraphNode {
            id,
            title: titles.get(&id).cloned().unwrap_or_default(),
            degree,
        })
        .collect();
    let edges = relations
        .iter()
        .filter(|r| kept.contains(&r.paper_a) && kept.contains(&r.paper_b))
        .map(|r| GraphEdge {
            source: r.paper_a,
            target: r.paper_b,
            weight: r.strength,
        })
        .collect();
    GraphExport {
        generated_at: Utc::now(),
        nodes,
        edges,
    }
}

#[derive(Debug)]
pub struct GraphSummary {
    pub relations: usize,
    pub nodes: usize,
    pub path: PathBuf,
}

/// Rebuild `paper_relations` and write `knowledge_graph.json` to `out_dir`.
pub fn run(conn: &Connection, out_dir: &Path) -> Result<GraphSummary> {
    let relations = relate(&db::fetch_paper_keywords(conn)?, MIN_SHARED);
    let stored = db::replace_relations(conn, &relations)?;

    let mut titles = HashMap::new();
    for r in &relations {
        for id in [r.paper_a, r.paper_b] {
            if titles.contains_key(&id) {
                continue;
            }
            if let Some(p) = db::fetch_paper(conn, id)? {
                titles.insert(id, p.title);
            }
        }
    }
    let graph = export(&relations, &titles, EXPORT_NODES);

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join("knowledge_graph.json");
    std::fs::write(&path, serde_json::to_string_pretty(&graph)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(
        relations = stored,
        nodes = graph.nodes.len(),
        path = %path.display(),
        "Relation graph built"
    );
    Ok(GraphSummary {
        relations: stored,
        nodes: graph.nodes.len(),
        path,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn kw(id: i64, words: &[&str]) -> (i64, Vec<String>) {
        (id, words.iter().map(|w| w.to_string()).collect())
    }

    #[test]
    fn strength_is_shared_over_total() {
        let papers = vec![
            kw(1, &["bone", "microgravity", "muscle"]),
            kw(2, &["bone", "microgravity"]),
            kw(3, &["plant"]),
        ];
        let rels = relate(&papers, MIN_SHARED);
        assert_eq!(rels.len(), 1);
        assert_eq!((rels[0].paper_a, rels[0].paper_b), (1, 2));
        assert_eq!(rels[0].shared_keywords, 2);
        assert!((rels[0].strength - 0.4).abs() < 1e-9);
    }

    #[test]
    fn window_limits_comparisons() {
        let papers: Vec<_> = (0..60).map(|i| kw(i, &["a", "b"])).collect();
        let rels = relate(&papers, MIN_SHARED);
        assert!(rels.iter().all(|r| r.paper_b - r.paper_a < WINDOW as i64));
        assert_eq!(rels.iter().filter(|r| r.paper_a == 0).count(), WINDOW - 1);
    }

    #[test]
    fn neighbors_and_export() {
        let rels = vec![
            RelationRow { paper_a: 1, paper_b: 2, shared_keywords: 2, strength: 0.4 },
            RelationRow { paper_a: 1, paper_b: 3, shared_keywords: 3, strength: 0.5 },
            RelationRow { paper_a: 2, paper_b: 3, shared_keywords: 2, strength: 0.2 },
        ];
        assert_eq!(neighbors(&rels, 1), vec![(3, 0.5), (2, 0.4)]);
        assert!(neighbors(&rels, 9).is_empty());

        let titles = HashMap::from([(1, "One".to_string())]);
        let g = export(&rels, &titles, 2);
        assert_eq!(g.nodes.len(), 2);
        assert_eq!(g.nodes[0].title, "One");
        assert_eq!(g.edges.len(), 1);
    }

    #[test]
    fn run_writes_json() {
        use crate::analysis::keywords;
        use crate::db::tests::memory_db;
        use crate::extract::PaperRecord;

        let conn = memory_db();
        for (doi, title) in [("10.1/a", "Bone loss in microgravity"), ("10.1/b", "Microgravity and bone")] {
            db::upsert_paper(
                &conn,
                &PaperRecord {
                    title: title.into(),
                    doi: Some(doi.into()),
                    abstract_text: Some("Spaceflight study.".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        }
        keywords::run(&conn, None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let summary = run(&conn, dir.path()).unwrap();
        assert_eq!(summary.relations, 1);
        assert_eq!(summary.nodes, 2);
        let json = std::fs::read_to_string(summary.path).unwrap();
        assert!(json.contains("Bone loss in microgravity"));
        assert!(json.contains("generated_at"));
    }
}
