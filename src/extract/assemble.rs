use serde::Serialize;

use super::ExtractedContent;
use crate::config::FieldLimits;

pub const UNKNOWN_TITLE: &str = "Unknown Paper";

/// Normalized record handed to persistence. `title` and `pdf_url` are
/// always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaperRecord {
    pub title: String,
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub pdf_url: String,
    pub full_text: Option<String>,
    pub methods_section: Option<String>,
    pub results_section: Option<String>,
    pub conclusions_section: Option<String>,
    pub authors: Vec<String>,
    pub figures: Vec<String>,
    pub tables: Vec<String>,
    /// Set only by `stub`; a sparse but successful extraction is not a stub.
    pub stub: bool,
}

impl PaperRecord {
    pub fn is_stub(&self) -> bool {
        self.stub
    }
}

/// Merge extracted content into a capped record.
pub fn assemble(
    content: &ExtractedContent,
    url: &str,
    fallback_title: Option<&str>,
    limits: &FieldLimits,
) -> PaperRecord {
    let title = content
        .title
        .as_deref()
        .or(fallback_title.filter(|t| !t.trim().is_empty()))
        .unwrap_or(UNKNOWN_TITLE);

    let full_text = content.full_text.clone().or_else(|| {
        let joined = content
            .sections
            .iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n\n");
        (!joined.is_empty()).then_some(joined)
    });

    let cap = |v: &Option<String>, max: usize| v.as_deref().map(|s| truncate_chars(s, max));

    PaperRecord {
        title: truncate_chars(title, limits.title),
        abstract_text: cap(&content.abstract_text, limits.abstract_text),
        year: content.year,
        journal: cap(&content.journal, limits.journal),
        doi: cap(&content.doi, limits.doi),
        pdf_url: truncate_chars(url, limits.url),
        full_text: full_text.map(|t| truncate_chars(&t, limits.full_text)),
        methods_section: cap(&content.named.methods, limits.section),
        results_section: cap(&content.named.results, limits.section),
        conclusions_section: cap(&content.named.conclusions, limits.section),
        authors: content.authors.clone(),
        figures: content
            .figures
            .iter()
            .map(|c| truncate_chars(c, limits.caption))
            .collect(),
        tables: content
            .tables
            .iter()
            .map(|c| truncate_chars(c, limits.caption))
            .collect(),
        stub: false,
    }
}

/// Record carrying only what the caller already knew.
pub fn stub(fallback_title: Option<&str>, url: &str, limits: &FieldLimits) -> PaperRecord {
    let title = fallback_title
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNKNOWN_TITLE);
    PaperRecord {
        title: truncate_chars(title, limits.title),
        pdf_url: truncate_chars(url, limits.url),
        stub: true,
        ..Default::default()
    }
}

/// Keep at most `max` characters, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::sections::{NamedSections, SectionMap};

    #[test]
    fn stub_uses_caller_title_or_placeholder() {
        let limits = FieldLimits::default();
        let s = stub(Some("My Title"), "http://x", &limits);
        assert_eq!(s.title, "My Title");
        assert_eq!(s.pdf_url, "http://x");
        assert!(s.is_stub());
        assert_eq!(s.abstract_text, None);
        assert_eq!(stub(None, "http://x", &limits).title, UNKNOWN_TITLE);
        assert_eq!(stub(Some("  "), "http://x", &limits).title, UNKNOWN_TITLE);
    }

    #[test]
    fn caps_are_applied_per_field() {
        let limits = FieldLimits {
            title: 5,
            abstract_text: 3,
            section: 4,
            caption: 2,
            ..FieldLimits::default()
        };
        let content = ExtractedContent {
            title: Some("Microgravity".into()),
            abstract_text: Some("ééééé".into()),
            named: NamedSections {
                methods: Some("Centrifuge".into()),
                ..Default::default()
            },
            figures: vec!["Fig 1".into()],
            ..Default::default()
        };
        let r = assemble(&content, "http://x", None, &limits);
        assert_eq!(r.title, "Micro");
        assert_eq!(r.abstract_text.as_deref(), Some("ééé"));
        assert_eq!(r.methods_section.as_deref(), Some("Cent"));
        assert_eq!(r.figures, vec!["Fi"]);
    }

    #[test]
    fn sparse_extraction_is_not_a_stub() {
        let content = ExtractedContent {
            title: Some("Bone loss".into()),
            figures: vec!["Figure 1. Femur.".into()],
            ..Default::default()
        };
        let r = assemble(&content, "http://x", None, &FieldLimits::default());
        assert!(!r.is_stub());
        assert_eq!(r.abstract_text, None);
        assert_eq!(r.doi, None);
    }

    #[test]
    fn full_text_prefers_fallback_then_sections() {
        let limits = FieldLimits::default();
        let mut sections = SectionMap::new();
        sections.insert("Methods".into(), "m".into());
        sections.insert("Results".into(), "r".into());
        let headed = ExtractedContent {
            sections,
            ..Default::default()
        };
        let r = assemble(&headed, "u", Some("T"), &limits);
        assert_eq!(r.full_text.as_deref(), Some("m\n\nr"));
        assert_eq!(r.title, "T");

        let flat = ExtractedContent {
            full_text: Some("a\n\nb".into()),
            ..Default::default()
        };
        assert_eq!(assemble(&flat, "u", None, &limits).full_text.as_deref(), Some("a\n\nb"));
        assert_eq!(assemble(&flat, "u", None, &limits).title, UNKNOWN_TITLE);
    }

    #[test]
    fn truncation_is_char_safe() {
        assert_eq!(truncate_chars("añb", 2), "añ");
        assert_eq!(truncate_chars("ab", 10), "ab");
        assert_eq!(truncate_chars("", 0), "");
    }
}
