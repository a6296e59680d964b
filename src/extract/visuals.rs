use scraper::ElementRef;

use super::fields::first_text;

const FIGURE_SELECTORS: &str = "figure, div.fig, div.figure";
const FIGURE_CAPTIONS: [&str; 3] = ["figcaption", "div.caption", "div.fig-caption"];

const TABLE_SELECTORS: &str = "table.table-wrap, div.table-wrap, div.tbl, table.tbl";
const TABLE_CAPTIONS: [&str; 2] = ["caption", "div.caption"];

/// Figure and table captions under `root`, in document order.
pub fn locate(root: ElementRef) -> (Vec<String>, Vec<String>) {
    (
        captions(root, FIGURE_SELECTORS, &FIGURE_CAPTIONS),
        captions(root, TABLE_SELECTORS, &TABLE_CAPTIONS),
    )
}

fn captions(root: ElementRef, containers: &str, caption_selectors: &[&str]) -> Vec<String> {
    let Ok(sel) = scraper::Selector::parse(containers) else {
        return Vec::new();
    };
    root.select(&sel)
        .filter_map(|el| first_text(el, caption_selectors))
        .collect()
}

// ── Tests ──
