pub mod assemble;
pub mod chain;
pub mod fields;
pub mod pubmed;
pub mod sections;
pub mod strategy;
pub mod visuals;

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

pub use assemble::PaperRecord;
pub use sections::{NamedSections, SectionMap};

use crate::config::FieldLimits;
use crate::error::ExtractError;
use crate::fetcher::PageFetcher;
use crate::source::classify;

/// Everything read from one source URL. Each field is independently
/// optional; `full_text` is only set when no headed sections were found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedContent {
    pub title: Option<String>,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub sections: SectionMap,
    pub full_text: Option<String>,
    pub named: NamedSections,
    pub figures: Vec<String>,
    pub tables: Vec<String>,
}

/// Classifies a URL, runs the matching strategy and assembles the record.
pub struct ContentExtractor<F> {
    fetcher: F,
    limits: FieldLimits,
}

impl<F: PageFetcher> ContentExtractor<F> {
    pub fn new(fetcher: F, limits: FieldLimits) -> Self {
        Self { fetcher, limits }
    }

    pub fn limits(&self) -> &FieldLimits {
        &self.limits
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Run the strategy for the URL's source kind. Stage failures surface
    /// as `ExtractError`; missing fields do not.
    pub async fn extract(
        &self,
        url: &str,
        fallback_title: Option<&str>,
    ) -> Result<ExtractedContent, ExtractError> {
        let kind = classify(url);
        let start = Instant::now();
        let strategy = strategy::strategy_for(kind);
        let content = strategy.extract(&self.fetcher, url, fallback_title).await?;
        info!(
            url,
            kind = %strategy.kind(),
            sections = content.sections.len(),
            figures = content.figures.len(),
            tables = content.tables.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Extracted paper"
        );
        Ok(content)
    }

    /// Never fails: any stage error yields the stub record.
    pub async fn extract_from_url(&self, url: &str, title: Option<&str>) -> PaperRecord {
        match self.extract(url, title).await {
            Ok(content) => assemble::assemble(&content, url, title, &self.limits),
            Err(e) => {
                warn!(url, error = %e, "Extraction failed, using stub record");
                assemble::stub(title, url, &self.limits)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::FetchError;
    use crate::fetcher::PageFetcher;

    /// Serves canned bodies by exact URL; anything else is a network error.
    #[derive(Default)]
    pub struct StubFetcher {
        pages: HashMap<String, String>,
        pub calls: AtomicUsize,
    }

    impl StubFetcher {
        pub fn with_page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::Network("operation timed out".into()))
        }
    }
}

// ── Tests ──
