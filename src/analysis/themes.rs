use anyhow::Result;
use rusqlite::Connection;
use tracing::{debug, info};

use super::count_present;
use crate::db;

pub struct Theme {
    pub name: &'static str,
    pub description: &'static str,
    pub color: &'static str,
    pub keywords: &'static [&'static str],
}

/// The first theme is also the default for papers matching nothing.
pub const THEMES: [Theme; 5] = [
    Theme {
        name: "Microgravity Effects",
        description: "Effects of microgravity and spaceflight",
        color: "#3498db",
        keywords: &["microgravity", "gravity", "spaceflight", "space flight", "weightlessness"],
    },
    Theme {
        name: "Immune System",
        description: "Immune function and inflammation",
        color: "#e74c3c",
        keywords: &["immune", "nk cell", "lymphocyte", "inflammation", "cytokine", "t cell"],
    },
    Theme {
        name: "Cell Biology",
        description: "Cellular and molecular biology",
        color: "#2ecc71",
        keywords: &["cell", "cellular", "gene", "protein", "dna", "rna", "expression"],
    },
    Theme {
        name: "Human Health",
        description: "Astronaut health and clinical outcomes",
        color: "#f39c12",
        keywords: &["health", "medical", "astronaut", "therapy", "treatment", "clinical"],
    },
    Theme {
        name: "Plant Biology",
        description: "Plant growth in space",
        color: "#27ae60",
        keywords: &["plant", "crop", "growth", "seed", "root", "photosynthesis"],
    },
];

const CONFIDENCE: f64 = 0.8;

/// Indices into [`THEMES`] whose keywords occur in title + summary.
pub fn assign(title: &str, summary: Option<&str>) -> Vec<usize> {
    let Some(summary) = summary.filter(|s| !s.trim().is_empty()) else {
        return vec![0];
    };
    let content = format!("{} {}", title, summary).to_lowercase();
    let matched: Vec<usize> = THEMES
        .iter()
        .enumerate()
        .filter(|(_, t)| count_present(&content, t.keywords) > 0)
        .map(|(i, _)| i)
        .collect();
    if matched.is_empty() {
        vec![0]
    } else {
        matched
    }
}

/// Ensure the theme rows exist and tag every summarized, untagged paper.
pub fn run(conn: &Connection) -> Result<usize> {
    let defs: Vec<(&str, &str, &str)> = THEMES
        .iter()
        .map(|t| (t.name, t.description, t.color))
        .collect();
    let ids = db::ensure_themes(conn, &defs)?;

    let mut links = Vec::new();
    for (paper_id, title, summary) in db::fetch_unthemed(conn)? {
        for idx in assign(&title, summary.as_deref()) {
            debug!(paper_id, theme = THEMES[idx].name, "Theme assigned");
            links.push((paper_id, ids[idx], CONFIDENCE));
        }
    }
    let assigned = db::save_paper_themes(conn, &links)?;
    info!(assigned, "Themes assigned");
    Ok(assigned)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_themes_can_match() {
        let got = assign(
            "Astronaut T cell responses",
            Some("Spaceflight suppressed cytokine release"),
        );
        assert_eq!(got, vec![0, 1, 2, 3]);
    }

    #[test]
    fn defaults_to_first_theme() {
        assert_eq!(assign("Seeds in orbit", None), vec![0]);
        assert_eq!(assign("Orbital mechanics", Some("Nothing relevant here")), vec![0]);
        assert_eq!(assign("Crop yield", Some("harvest")), vec![4]);
    }

    #[test]
    fn run_creates_themes_once() {
        use crate::db::tests::memory_db;
        use crate::db::SummaryRow;
        use crate::extract::PaperRecord;

        let conn = memory_db();
        let id = db::upsert_paper(
            &conn,
            &PaperRecord {
                title: "Root growth".into(),
                ..Default::default()
            },
        )
        .unwrap()
        .id;
        let s = SummaryRow {
            paper_id: id,
            summary_abstract: Some("Roots bend".into()),
            summary_results: None,
            summary_conclusions: None,
            key_findings: vec![],
        };
        db::save_summary(&conn, &s, &[]).unwrap();

        assert_eq!(run(&conn).unwrap(), 1);
        assert_eq!(run(&conn).unwrap(), 0);
        assert_eq!(db::get_stats(&conn).unwrap().themes, THEMES.len());
    }
}
