use tracing::trace;

type Candidate<'a> = Box<dyn Fn() -> Option<String> + 'a>;

/// Ordered list of candidate producers for one field. The first candidate
/// whose value is non-empty after trimming wins; later ones never run.
pub struct FallbackChain<'a> {
    field: &'static str,
    candidates: Vec<Candidate<'a>>,
}

impl<'a> FallbackChain<'a> {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            candidates: Vec::new(),
        }
    }

    pub fn or(mut self, candidate: impl Fn() -> Option<String> + 'a) -> Self {
        self.candidates.push(Box::new(candidate));
        self
    }

    /// Append a candidate only when `cond` holds (source-specific steps).
    pub fn or_if(self, cond: bool, candidate: impl Fn() -> Option<String> + 'a) -> Self {
        if cond {
            self.or(candidate)
        } else {
            self
        }
    }

    pub fn resolve(self) -> Option<String> {
        for (idx, candidate) in self.candidates.iter().enumerate() {
            if let Some(value) = candidate() {
                let value = value.trim();
                if !value.is_empty() {
                    trace!(field = self.field, candidate = idx, "Field resolved");
                    return Some(value.to_string());
                }
            }
        }
        trace!(field = self.field, "No candidate matched");
        None
    }
}

/// Same rule for list-valued fields: first non-empty list wins.
pub fn first_non_empty<T>(candidates: &[&dyn Fn() -> Vec<T>]) -> Vec<T> {
    candidates
        .iter()
        .map(|candidate| candidate())
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_non_blank_wins() {
        let v = FallbackChain::new("title")
            .or(|| None)
            .or(|| Some("   ".to_string()))
            .or(|| Some("  Real Title ".to_string()))
            .or(|| Some("Later".to_string()))
            .resolve();
        assert_eq!(v.as_deref(), Some("Real Title"));
    }

    #[test]
    fn later_candidates_are_not_evaluated() {
        let calls = Cell::new(0);
        let v = FallbackChain::new("doi")
            .or(|| Some("10.1/abc".to_string()))
            .or(|| {
                calls.set(calls.get() + 1);
                Some("unused".to_string())
            })
            .resolve();
        assert_eq!(v.as_deref(), Some("10.1/abc"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn conditional_steps_and_empty_chain() {
        assert_eq!(FallbackChain::new("journal").resolve(), None);
        let v = FallbackChain::new("journal")
            .or_if(false, || Some("skipped".to_string()))
            .or_if(true, || Some("bioRxiv".to_string()))
            .resolve();
        assert_eq!(v.as_deref(), Some("bioRxiv"));
    }

    #[test]
    fn list_candidates() {
        let calls = Cell::new(0);
        let v = first_non_empty(&[
            &|| Vec::new(),
            &|| vec!["a", "b"],
            &|| {
                calls.set(calls.get() + 1);
                vec!["c"]
            },
        ]);
        assert_eq!(v, vec!["a", "b"]);
        assert_eq!(calls.get(), 0);
        assert!(first_non_empty::<&str>(&[&|| Vec::new()]).is_empty());
    }
}
