//! Derived artifacts computed from stored papers: summaries and keywords,
//! effect classification, theme tagging, cross-paper comparisons and the
//! keyword relation graph. Each step reads from and writes to SQLite only.

pub mod compare;
pub mod effects;
pub mod graph;
pub mod keywords;
pub mod themes;

/// Number of `needles` occurring in `haystack` (already lowercased).
pub(crate) fn count_present(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| haystack.contains(*n)).count()
}
