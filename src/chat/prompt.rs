use super::{preview, sections_of};
use crate::extract::assemble::truncate_chars;
use crate::extract::ExtractedContent;

const MAX_AUTHORS: usize = 5;
const ABSTRACT_CHARS: usize = 1500;
const SECTIONS: usize = 5;
const SECTION_CHARS: usize = 800;
const CAPTIONS: usize = 3;
const CAPTION_CHARS: usize = 150;

/// Paper context block followed by the question. The model is told to
/// answer from the paper only.
pub fn build_prompt(content: &ExtractedContent, question: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = &content.title {
        parts.push(format!("**TITLE:** {}", title));
    }
    if !content.authors.is_empty() {
        let names: Vec<&str> = content
            .authors
            .iter()
            .take(MAX_AUTHORS)
            .map(String::as_str)
            .collect();
        parts.push(format!("**AUTHORS:** {}", names.join(", ")));
    }
    if let Some(abs) = &content.abstract_text {
        parts.push(format!("**ABSTRACT:**\n{}", truncate_chars(abs, ABSTRACT_CHARS)));
    }

    let sections = sections_of(content);
    if !sections.is_empty() {
        parts.push("\n**PAPER CONTENT:**".to_string());
        for (name, text) in sections.into_iter().take(SECTIONS) {
            parts.push(format!("\n--- {} ---\n{}", name, preview(text, SECTION_CHARS)));
        }
    }

    for (label, captions) in [("FIGURES", &content.figures), ("TABLES", &content.tables)] {
        if captions.is_empty() {
            continue;
        }
        parts.push(format!("\n**{} ({}):**", label, captions.len()));
        for (i, c) in captions.iter().take(CAPTIONS).enumerate() {
            parts.push(format!("{}. {}", i + 1, truncate_chars(c, CAPTION_CHARS)));
        }
    }

    format!(
        "You are an expert assistant for analyzing scientific papers. \
         Answer the user's question using ONLY the information present in the paper.\n\n\
         {}\n\nQUESTION: {}\n\nANSWER:",
        parts.join("\n"),
        question
    )
}

// ── Tests ──
