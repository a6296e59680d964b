use std::collections::HashMap;

use tracing::{debug, warn};

use crate::extract::{ContentExtractor, ExtractedContent};
use crate::fetcher::PageFetcher;

/// URL → extracted content for the lifetime of the process. Failures are
/// not stored, so the next lookup fetches again. Unbounded.
pub struct PaperCache<F> {
    extractor: ContentExtractor<F>,
    entries: HashMap<String, ExtractedContent>,
}

impl<F: PageFetcher> PaperCache<F> {
    pub fn new(extractor: ContentExtractor<F>) -> Self {
        Self {
            extractor,
            entries: HashMap::new(),
        }
    }

    pub async fn get_or_fetch(&mut self, url: &str) -> Option<&ExtractedContent> {
        if !self.entries.contains_key(url) {
            match self.extractor.extract(url, None).await {
                Ok(content) => {
                    self.entries.insert(url.to_string(), content);
                }
                Err(e) => {
                    warn!(url, error = %e, "Could not load paper content");
                    return None;
                }
            }
        } else {
            debug!(url, "Cache hit");
        }
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ──
