use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::Result;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{self, ComparisonRow, ThemeEffectRow};

/// A theme needs at least this many distinct papers to be compared.
const MIN_PAPERS: usize = 3;
/// Effect groups (theme, effect type) smaller than this are ignored.
const MIN_GROUP: usize = 2;

#[derive(Debug, Default)]
struct Tally {
    supporting: usize,
    against: usize,
    neutral: usize,
    papers: BTreeSet<i64>,
}

/// Per-theme consensus over classified effects.
pub fn build(rows: &[ThemeEffectRow]) -> Vec<ComparisonRow> {
    let mut groups: HashMap<(&str, &str), Vec<i64>> = HashMap::new();
    for r in rows {
        groups
            .entry((r.theme.as_str(), r.effect_type.as_str()))
            .or_default()
            .push(r.paper_id);
    }

    let mut tallies: BTreeMap<&str, Tally> = BTreeMap::new();
    for ((theme, effect), papers) in groups {
        if papers.len() < MIN_GROUP {
            continue;
        }
        let t = tallies.entry(theme).or_default();
        match effect {
            "positive" => t.supporting = papers.len(),
            "negative" => t.against = papers.len(),
            _ => t.neutral = papers.len(),
        }
        t.papers.extend(papers);
    }

    tallies
        .into_iter()
        .filter(|(_, t)| t.papers.len() >= MIN_PAPERS)
        .map(|(theme, t)| {
            let (consensus, summary) = if t.supporting > t.against && t.supporting > t.neutral {
                (
                    "positive",
                    format!(
                        "Positive consensus on {}: {} papers report beneficial effects",
                        theme, t.supporting
                    ),
                )
            } else if t.against > t.supporting && t.against > t.neutral {
                (
                    "negative",
                    format!(
                        "Negative consensus on {}: {} papers report adverse effects",
                        theme, t.against
                    ),
                )
            } else {
                (
                    "mixed",
                    format!(
                        "Mixed results on {}: {} positive vs {} negative",
                        theme, t.supporting, t.against
                    ),
                )
            };
            ComparisonRow {
                topic: format!("Analysis of {}", theme),
                papers_supporting: t.supporting,
                papers_against: t.against,
                papers_neutral: t.neutral,
                consensus_level: consensus.to_string(),
                summary,
                paper_ids: t.papers.into_iter().collect(),
            }
        })
        .collect()
}

/// Regenerate the comparisons table from current themes and effects.
pub fn run(conn: &Connection) -> Result<usize> {
    let rows = build(&db::fetch_theme_effects(conn)?);
    for c in &rows {
        info!(
            topic = %c.topic,
            supporting = c.papers_supporting,
            against = c.papers_against,
            neutral = c.papers_neutral,
            consensus = %c.consensus_level,
            "Comparison"
        );
    }
    let added = db::replace_comparisons(conn, &rows)?;
    if added == 0 {
        warn!("Not enough themed effects to compare");
    }
    Ok(added)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn row(theme: &str, paper_id: i64, effect: &str) -> ThemeEffectRow {
        ThemeEffectRow {
            theme: theme.into(),
            paper_id,
            effect_type: effect.into(),
        }
    }

    #[test]
    fn positive_majority() {
        let rows = vec![
            row("Immune System", 1, "positive"),
            row("Immune System", 2, "positive"),
            row("Immune System", 3, "positive"),
            row("Immune System", 4, "negative"),
            row("Immune System", 5, "negative"),
        ];
        let c = build(&rows);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].topic, "Analysis of Immune System");
        assert_eq!(c[0].consensus_level, "positive");
        assert_eq!((c[0].papers_supporting, c[0].papers_against), (3, 2));
        assert_eq!(c[0].paper_ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn singleton_groups_are_dropped() {
        let rows = vec![
            row("Cell Biology", 1, "negative"),
            row("Cell Biology", 2, "negative"),
            row("Cell Biology", 3, "negative"),
            row("Cell Biology", 4, "positive"),
        ];
        let c = build(&rows);
        assert_eq!(c[0].consensus_level, "negative");
        assert_eq!(c[0].papers_supporting, 0);
        assert_eq!(c[0].paper_ids, vec![1, 2, 3]);
    }

    #[test]
    fn ties_are_mixed_and_small_themes_skipped() {
        let rows = vec![
            row("Plant Biology", 1, "positive"),
            row("Plant Biology", 2, "positive"),
            row("Plant Biology", 3, "neutral"),
            row("Plant Biology", 4, "neutral"),
            row("Human Health", 5, "positive"),
            row("Human Health", 6, "positive"),
        ];
        let c = build(&rows);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].consensus_level, "mixed");
        assert_eq!(c[0].summary, "Mixed results on Plant Biology: 2 positive vs 0 negative");
    }
}
