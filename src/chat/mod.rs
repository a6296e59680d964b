pub mod assistant;
pub mod llm;
pub mod local;
pub mod prompt;

pub use assistant::{select_paper, Answer, AnswerSource, PaperAssistant};
pub use llm::{GeminiClient, LanguageModel};

use crate::extract::sections::FULL_TEXT_KEY;
use crate::extract::ExtractedContent;

/// Headed sections, or the whole-text fallback as a single section.
pub(crate) fn sections_of(content: &ExtractedContent) -> Vec<(&str, &str)> {
    if !content.sections.is_empty() {
        return content.sections.iter().collect();
    }
    content
        .full_text
        .as_deref()
        .map(|t| vec![(FULL_TEXT_KEY, t)])
        .unwrap_or_default()
}

/// Cap at `max` chars, appending "..." when something was cut.
pub(crate) fn preview(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        format!("{}...", crate::extract::assemble::truncate_chars(text, max))
    } else {
        text.to_string()
    }
}
