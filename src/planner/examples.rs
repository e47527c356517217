//! Worked-example lookup for plan enrichment
//!
//! The planner can enrich its prompt with the closest worked example from a
//! fixed library. The similarity mechanism is pluggable; the built-in
//! library does plain keyword overlap, which is enough for a curated set of
//! a few dozen examples.

/// Pluggable lookup: the closest worked example for a request, or none.
pub trait ExampleRetriever: Send + Sync {
    fn lookup(&self, request: &str) -> Option<String>;
}

/// Fixed in-memory example library with keyword-overlap scoring.
pub struct StaticExampleLibrary {
    /// (reference request, worked plan text)
    entries: Vec<(String, String)>,
}

impl StaticExampleLibrary {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn keywords(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(|w| w.to_string())
        .collect()
}

impl ExampleRetriever for StaticExampleLibrary {
    fn lookup(&self, request: &str) -> Option<String> {
        let request_words = keywords(request);
        if request_words.is_empty() {
            return None;
        }

        let mut best: Option<(usize, &str)> = None;
        for (reference, plan_text) in &self.entries {
            let reference_words = keywords(reference);
            let overlap = request_words
                .iter()
                .filter(|w| reference_words.contains(w))
                .count();
            if overlap > 0 && best.map(|(score, _)| overlap > score).unwrap_or(true) {
                best = Some((overlap, plan_text));
            }
        }

        best.map(|(_, plan_text)| plan_text.to_string())
    }
}
