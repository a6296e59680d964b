use super::{preview, sections_of};
use crate::analysis::count_present;
use crate::extract::assemble::truncate_chars;
use crate::extract::ExtractedContent;

const HEADER: &str = "Answer (based ONLY on the paper):\n\n";
const SUMMARY_CHARS: usize = 1500;
const DIGEST_CHARS: usize = 3000;

const RESULT_QUESTION: [&str; 3] = ["result", "conclu", "finding"];
const RESULT_SECTION: [&str; 2] = ["result", "conclus"];
const METHOD_QUESTION: [&str; 2] = ["method", "procedure"];
const METHOD_SECTION: [&str; 3] = ["method", "procedure", "materials"];
const SUMMARY_QUESTION: [&str; 3] = ["summar", "what is", "describe"];

/// Deterministic answer built from the extracted content alone.
pub fn local_answer(content: &ExtractedContent, question: &str) -> String {
    let q = question.to_lowercase();
    let sections = sections_of(content);

    if count_present(&q, &SUMMARY_QUESTION) > 0 {
        let summary = match &content.abstract_text {
            Some(abs) => truncate_chars(abs, SUMMARY_CHARS),
            None => {
                let joined: Vec<&str> = sections.iter().take(3).map(|(_, t)| *t).collect();
                truncate_chars(&joined.join(" "), SUMMARY_CHARS)
            }
        };
        return format!("{}{}", HEADER, summary);
    }

    let pick = |needles: &[&str]| {
        sections
            .iter()
            .find(|(name, _)| count_present(&name.to_lowercase(), needles) > 0)
            .map(|(_, text)| *text)
    };
    let mut preferred = None;
    if count_present(&q, &RESULT_QUESTION) > 0 {
        preferred = pick(&RESULT_SECTION[..]);
    }
    if preferred.is_none() && count_present(&q, &METHOD_QUESTION) > 0 {
        preferred = pick(&METHOD_SECTION[..]);
    }

    let mut parts: Vec<String> = Vec::new();
    if let Some(title) = &content.title {
        parts.push(format!("Title: {}", title));
    }
    if !content.authors.is_empty() {
        let names: Vec<&str> = content.authors.iter().take(5).map(String::as_str).collect();
        parts.push(format!("Authors: {}", names.join(", ")));
    }
    if let Some(abs) = &content.abstract_text {
        parts.push(format!("\nABSTRACT:\n{}", abs));
    }
    match preferred {
        Some(text) => parts.push(format!("\nRELEVANT SECTION:\n{}", preview(text, 1000))),
        None => {
            for (name, text) in sections.iter().take(3) {
                parts.push(format!("\n--- {} ---\n{}", name, preview(text, 500)));
            }
        }
    }

    format!(
        "{}{}\n\nNote: If the answer is not explicit in the paper, this will be stated.",
        HEADER,
        truncate_chars(&parts.join("\n"), DIGEST_CHARS)
    )
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SectionMap;

    fn content() -> ExtractedContent {
        let mut sections = SectionMap::new();
        sections.insert("Introduction".into(), "Intro text".into());
        sections.insert("Materials and Methods".into(), "Centrifuge protocol".into());
        sections.insert("Results".into(), "Bone density fell".into());
        ExtractedContent {
            title: Some("Bone loss".into()),
            abstract_text: Some("Mice lost bone.".into()),
            sections,
            ..Default::default()
        }
    }

    #[test]
    fn results_question_prefers_results_section() {
        let a = local_answer(&content(), "What were the main findings?");
        assert!(a.contains("RELEVANT SECTION:\nBone density fell"));
        assert!(!a.contains("Centrifuge"));
    }

    #[test]
    fn method_question_prefers_methods_section() {
        let a = local_answer(&content(), "Which procedure was used?");
        assert!(a.contains("RELEVANT SECTION:\nCentrifuge protocol"));
    }

    #[test]
    fn summary_question_returns_abstract() {
        let a = local_answer(&content(), "Can you summarize this?");
        assert_eq!(a, format!("{}Mice lost bone.", HEADER));

        let mut c = content();
        c.abstract_text = None;
        let a = local_answer(&c, "Describe the paper");
        assert_eq!(a, format!("{}Intro text Centrifuge protocol Bone density fell", HEADER));
    }

    #[test]
    fn other_questions_get_capped_digest() {
        let mut c = content();
        c.abstract_text = Some("z".repeat(5000));
        let a = local_answer(&c, "Who funded it?");
        assert!(a.starts_with(HEADER));
        assert!(a.contains("Title: Bone loss"));
        let body = a
            .trim_start_matches(HEADER)
            .split("\n\nNote:")
            .next()
            .unwrap();
        assert_eq!(body.chars().count(), DIGEST_CHARS);
    }
}
