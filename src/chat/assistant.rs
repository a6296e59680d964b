use tracing::{info, warn};

use super::llm::LanguageModel;
use super::local::local_answer;
use super::prompt::build_prompt;
use crate::cache::PaperCache;
use crate::csv_input::PaperEntry;
use crate::error::ChatError;
use crate::fetcher::PageFetcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    Model,
    Local,
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub source: AnswerSource,
}

/// A 1-based index into `entries`, or an exact title.
pub fn select_paper<'a>(entries: &'a [PaperEntry], selector: &str) -> Result<&'a PaperEntry, ChatError> {
    let selector = selector.trim();
    let found = match selector.parse::<usize>() {
        Ok(n) => n.checked_sub(1).and_then(|i| entries.get(i)),
        Err(_) => entries.iter().find(|e| e.title == selector),
    };
    found.ok_or_else(|| ChatError::PaperNotFound(selector.to_string()))
}

/// Answers questions about one paper at a time. Paper content is cached
/// by URL; the model is optional and any failure there falls back to the
/// local answer.
pub struct PaperAssistant<F> {
    cache: PaperCache<F>,
    model: Option<Box<dyn LanguageModel>>,
}

impl<F: PageFetcher> PaperAssistant<F> {
    pub fn new(cache: PaperCache<F>, model: Option<Box<dyn LanguageModel>>) -> Self {
        Self { cache, model }
    }

    pub async fn answer(&mut self, paper: &PaperEntry, question: &str) -> Result<Answer, ChatError> {
        let content = self
            .cache
            .get_or_fetch(&paper.url)
            .await
            .ok_or_else(|| ChatError::ContentUnavailable(paper.url.clone()))?;

        if let Some(model) = &self.model {
            match model.generate(&build_prompt(content, question)).await {
                Ok(text) => {
                    info!(model = model.model_id(), "Answered by model");
                    return Ok(Answer {
                        text,
                        source: AnswerSource::Model,
                    });
                }
                Err(e) => warn!(error = %e, "Model call failed, answering locally"),
            }
        }

        Ok(Answer {
            text: local_answer(content, question),
            source: AnswerSource::Local,
        })
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::config::FieldLimits;
    use crate::error::LlmError;
    use crate::extract::testing::StubFetcher;
    use crate::extract::ContentExtractor;

    const URL: &str = "https://example.org/bone";
    const PAGE: &str = "<html><head><meta name=\"citation_title\" content=\"Bone loss\">\
        <meta name=\"citation_abstract\" content=\"Mice lost bone.\"></head>\
        <body><h2>Results</h2><p>Density fell.</p></body></html>";

    struct FakeModel {
        reply: Option<&'static str>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl LanguageModel for FakeModel {
        async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("**TITLE:** Bone loss"));
            self.reply.map(String::from).ok_or(LlmError::Empty)
        }

        fn model_id(&self) -> &str {
            "fake"
        }
    }

    fn entries() -> Vec<PaperEntry> {
        vec![PaperEntry {
            title: "Bone loss".into(),
            url: URL.into(),
        }]
    }

    fn assistant(model: Option<Box<dyn LanguageModel>>) -> PaperAssistant<StubFetcher> {
        let fetcher = StubFetcher::default().with_page(URL, PAGE);
        let cache = PaperCache::new(ContentExtractor::new(fetcher, FieldLimits::default()));
        PaperAssistant::new(cache, model)
    }

    #[test]
    fn selects_by_index_or_title() {
        let e = entries();
        assert_eq!(select_paper(&e, "1").unwrap().url, URL);
        assert_eq!(select_paper(&e, "Bone loss").unwrap().url, URL);
        assert!(matches!(select_paper(&e, "0"), Err(ChatError::PaperNotFound(_))));
        assert!(select_paper(&e, "2").is_err());
        assert!(select_paper(&e, "Other").is_err());
    }

    #[tokio::test]
    async fn model_answer_is_used_when_available() {
        let calls = Arc::new(AtomicUsize::new(0));
        let model = FakeModel {
            reply: Some("From the model"),
            calls: calls.clone(),
        };
        let mut a = assistant(Some(Box::new(model)));
        let paper = &entries()[0];
        let ans = a.answer(paper, "What happened?").await.unwrap();
        assert_eq!(ans.source, AnswerSource::Model);
        assert_eq!(ans.text, "From the model");
        a.answer(paper, "Again?").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_local() {
        let model = FakeModel {
            reply: None,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut a = assistant(Some(Box::new(model)));
        let ans = a.answer(&entries()[0], "Summarize it").await.unwrap();
        assert_eq!(ans.source, AnswerSource::Local);
        assert!(ans.text.ends_with("Mice lost bone."));
    }

    #[tokio::test]
    async fn without_model_answers_locally() {
        let mut a = assistant(None);
        let ans = a.answer(&entries()[0], "What were the results?").await.unwrap();
        assert_eq!(ans.source, AnswerSource::Local);
        assert!(ans.text.contains("RELEVANT SECTION:\nDensity fell."));
    }

    #[tokio::test]
    async fn unreachable_paper_is_an_error() {
        let mut a = assistant(None);
        let missing = PaperEntry {
            title: "x".into(),
            url: "https://example.org/missing".into(),
        };
        let err = a.answer(&missing, "q").await.unwrap_err();
        assert!(matches!(err, ChatError::ContentUnavailable(_)));
    }
}
