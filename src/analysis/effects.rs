use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;
use tracing::info;

use super::count_present;
use crate::db::{self, EffectRow};

const POSITIVE: [&str; 6] = ["increase", "improve", "enhance", "positive", "benefit", "promote"];
const NEGATIVE: [&str; 6] = ["decrease", "reduce", "impair", "negative", "damage", "inhibit"];
const NEUTRAL: [&str; 5] = ["no change", "stable", "neutral", "similar", "unaltered"];

const CONFIDENCE: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    Positive,
    Negative,
    Neutral,
}

impl EffectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectType::Positive => "positive",
            EffectType::Negative => "negative",
            EffectType::Neutral => "neutral",
        }
    }
}

/// Indicator-count vote over a summary. A side wins only with a strict
/// majority over both others; everything else is neutral. Blank text has
/// no effect.
pub fn classify(summary: &str) -> Option<(EffectType, &'static str)> {
    let text = summary.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }
    let pos = count_present(&text, &POSITIVE);
    let neg = count_present(&text, &NEGATIVE);
    let neu = count_present(&text, &NEUTRAL);

    let effect = if pos > neg && pos > neu {
        (EffectType::Positive, "Positive effect detected under spaceflight conditions")
    } else if neg > pos && neg > neu {
        (EffectType::Negative, "Negative effect observed in microgravity")
    } else if neu > 0 {
        (EffectType::Neutral, "Stable response without significant changes")
    } else {
        (EffectType::Neutral, "Biological effect observed in the space environment")
    };
    Some(effect)
}

pub fn run(conn: &Connection) -> Result<usize> {
    let rows: Vec<EffectRow> = db::fetch_summaries_without_effects(conn)?
        .into_iter()
        .filter_map(|(paper_id, text)| {
            classify(&text).map(|(kind, description)| EffectRow {
                paper_id,
                effect_type: kind.as_str().to_string(),
                description: description.to_string(),
                confidence: CONFIDENCE,
                section_source: "summary".to_string(),
            })
        })
        .collect();
    let added = db::save_effects(conn, &rows)?;
    info!(added, "Effects classified");
    Ok(added)
}

// ── Tests ──
