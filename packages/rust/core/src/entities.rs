//! Drug/ingredient name detection with local validation.
//!
//! The extraction capability proposes names; only candidates literally
//! present in the query survive, which defends against the capability
//! hallucinating names the user never typed.

use std::collections::HashSet;

use tracing::{debug, instrument};

use mediq_capabilities::ExtractEntities;
use mediq_shared::CapabilityResult;

/// Maximum accepted candidate length in characters.
const MAX_NAME_CHARS: usize = 80;

/// Detection stage: extract, clean, validate, dedup.
pub struct EntityExtractor<X> {
    extractor: X,
}

impl<X: ExtractEntities> EntityExtractor<X> {
    pub fn new(extractor: X) -> Self {
        Self { extractor }
    }

    /// Extract explicit drug/ingredient names from the query. An empty
    /// query yields no names without a capability call; a capability
    /// failure propagates for the engine to degrade on.
    #[instrument(skip_all)]
    pub async fn extract(&self, query: &str) -> CapabilityResult<Vec<String>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let raw = self.extractor.extract(query).await?;
        let names = clean_names(query, raw);
        debug!(count = names.len(), "drug names detected");
        Ok(names)
    }
}

/// Trim quoting and surrounding punctuation, drop empty/overlong
/// candidates and anything not present in the query, dedup
/// case-insensitively preserving first-seen order.
fn clean_names(query: &str, raw: Vec<String>) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut seen: HashSet<String> = HashSet::new();
    let mut cleaned = Vec::new();

    for candidate in raw {
        let name = candidate
            .trim()
            .trim_matches(['"', '\'', '`'])
            .trim()
            .trim_matches([' ', '.', ':', ';', ',', '-']);

        if name.is_empty() || name.chars().count() > MAX_NAME_CHARS {
            continue;
        }

        let key = name.to_lowercase();
        if !query_lower.contains(&key) {
            continue;
        }
        if seen.insert(key) {
            cleaned.push(name.to_string());
        }
    }

    cleaned
}
