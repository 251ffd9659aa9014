//! Relevance-ranked passage retrieval with score filtering, optional
//! name restriction, and min/max truncation policy.

use std::sync::Arc;

use tracing::{debug, instrument};

use mediq_capabilities::Embed;
use mediq_index::PassageStore;
use mediq_shared::{CapabilityResult, Passage, RetrievalConfig, to_web_url};

/// Retrieves a relevance-ranked, size-bounded passage list for a query.
///
/// The underlying store being absent is "no corpus coverage", not an
/// error; only an embedding failure surfaces as a capability error.
pub struct RetrievalEngine<E> {
    embedder: E,
    store: Arc<PassageStore>,
    config: RetrievalConfig,
}

impl<E: Embed> RetrievalEngine<E> {
    pub fn new(embedder: E, store: Arc<PassageStore>, config: RetrievalConfig) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Retrieve passages for `query`, optionally restricted to chunks
    /// tagged with one of `restrict_names`.
    ///
    /// Policy: fetch the raw top-K pool, apply the name restriction
    /// over the whole pool, then the similarity floor. If the floor
    /// leaves at least `min_passages` candidates, the top
    /// `max_passages` of the filtered set are returned; otherwise the
    /// top `min_passages` of the unfiltered ranked pool are returned
    /// instead, so callers always see between min and max passages
    /// whenever the index has any candidates at all.
    #[instrument(skip_all, fields(restrict = restrict_names.len()))]
    pub async fn retrieve(
        &self,
        query: &str,
        restrict_names: &[String],
    ) -> CapabilityResult<Vec<Passage>> {
        if !self.store.is_available() {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed(query).await?;
        let hits = self.store.search(&vector, self.config.top_k);
        if hits.is_empty() {
            return Ok(Vec::new());
        }

        // Hits from the store arrive sorted by score descending.
        let pool: Vec<Passage> = hits
            .iter()
            .map(|hit| self.to_passage(hit.row, hit.score))
            .collect();

        let restricted: Vec<&Passage> = if restrict_names.is_empty() {
            pool.iter().collect()
        } else {
            pool.iter()
                .filter(|p| matches_restriction(p, restrict_names))
                .collect()
        };

        let above_floor: Vec<&Passage> = restricted
            .iter()
            .copied()
            .filter(|p| p.score >= self.config.min_similarity)
            .collect();

        let result: Vec<Passage> = if above_floor.len() >= self.config.min_passages {
            above_floor
                .into_iter()
                .take(self.config.max_passages)
                .cloned()
                .collect()
        } else {
            pool.iter()
                .take(self.config.min_passages)
                .cloned()
                .collect()
        };

        debug!(
            pool = pool.len(),
            returned = result.len(),
            "retrieval complete"
        );
        Ok(result)
    }

    fn to_passage(&self, row: usize, score: f64) -> Passage {
        let record = self.store.record(row);

        let mut text = record.text.clone();
        let cap = self.config.passage_char_limit;
        if cap > 0 && text.chars().count() > cap {
            text = text.chars().take(cap).collect();
        }

        Passage {
            text,
            source_url: to_web_url(record.source_url.as_deref()),
            section: record.section.clone(),
            score,
            drug_name: record.drug_name.clone(),
            active_ingredients: record.active_ingredients.clone(),
        }
    }
}

/// A passage matches when its drug name or any active ingredient
/// case-insensitively contains one of the restriction names.
fn matches_restriction(passage: &Passage, names: &[String]) -> bool {
    let drug = passage.drug_name.as_deref().unwrap_or("").to_lowercase();
    let ingredients: Vec<String> = passage
        .active_ingredients
        .iter()
        .flatten()
        .map(|i| i.to_lowercase())
        .collect();

    names.iter().any(|name| {
        let needle = name.to_lowercase();
        if needle.is_empty() {
            return false;
        }
        drug.contains(&needle) || ingredients.iter().any(|i| i.contains(&needle))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediq_index::DocRecord;
    use mediq_shared::{CapabilityError, CapabilityResult};

    struct FixedEmbedder {
        vector: Vec<f32>,
        fail: bool,
    }

    impl Embed for FixedEmbedder {
        async fn embed(&self, _text: &str) -> CapabilityResult<Vec<f32>> {
            if self.fail {
                Err(CapabilityError::transport("embedder down"))
            } else {
                Ok(self.vector.clone())
            }
        }
    }

    fn record(id: &str, drug: Option<&str>, ingredients: &[&str]) -> DocRecord {
        DocRecord {
            id: id.into(),
            text: format!("First line about {id}.\nSecond line."),
            source_url: Some(format!("https://example.com/{id}.pdf")),
            section: Some("Precautions".into()),
            drug_name: drug.map(String::from),
            active_ingredients: if ingredients.is_empty() {
                None
            } else {
                Some(ingredients.iter().map(|s| s.to_string()).collect())
            },
        }
    }

    /// Six records on a 2d unit circle so scores against [1, 0] descend
    /// in record order: 1.0, ~0.98, ~0.92, ~0.71, ~0.38, 0.0.
    fn fixture_engine(fail_embed: bool) -> RetrievalEngine<FixedEmbedder> {
        let records = vec![
            record("a", Some("Metex"), &["metformin"]),
            record("b", Some("Eliquis"), &["apixaban"]),
            record("c", Some("Metformin Sandoz"), &["metformin hydrochloride"]),
            record("d", Some("Zyrtec"), &["cetirizine"]),
            record("e", None, &[]),
            record("f", Some("Panadol"), &["paracetamol"]),
        ];
        let angles: [f64; 6] = [0.0, 0.2, 0.4, 0.785, 1.2, 1.5708];
        let vectors = angles
            .iter()
            .map(|a| vec![a.cos() as f32, a.sin() as f32])
            .collect();
        let store = Arc::new(PassageStore::from_rows(records, vectors).unwrap());
        RetrievalEngine::new(
            FixedEmbedder {
                vector: vec![1.0, 0.0],
                fail: fail_embed,
            },
            store,
            RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn scores_sorted_non_increasing_and_bounded() {
        let engine = fixture_engine(false);
        let passages = engine.retrieve("question", &[]).await.unwrap();

        assert!(passages.len() >= 3 && passages.len() <= 5);
        assert!(passages.windows(2).all(|w| w[0].score >= w[1].score));
        // Four candidates clear the 0.4 floor.
        assert_eq!(passages.len(), 4);
        assert!(passages.iter().all(|p| p.score >= 0.4));
    }

    #[tokio::test]
    async fn restriction_below_min_falls_back_to_unfiltered_pool() {
        let engine = fixture_engine(false);
        let names = vec!["metformin".to_string()];
        let passages = engine.retrieve("question", &names).await.unwrap();

        // Records a and c match and clear the floor, but two is below
        // min_passages, so the unfiltered fallback applies.
        assert_eq!(passages.len(), 3);
        assert!(passages[0].score > passages[2].score);
    }

    #[tokio::test]
    async fn restriction_filtered_branch_returns_only_matches() {
        let mut engine = fixture_engine(false);
        engine.config.min_passages = 2;
        let names = vec!["metformin".to_string()];
        let passages = engine.retrieve("question", &names).await.unwrap();

        assert_eq!(passages.len(), 2);
        for p in &passages {
            let drug = p.drug_name.as_deref().unwrap_or("").to_lowercase();
            let in_ingredients = p
                .active_ingredients
                .iter()
                .flatten()
                .any(|i| i.to_lowercase().contains("metformin"));
            assert!(drug.contains("metformin") || in_ingredients);
        }
    }

    #[tokio::test]
    async fn restriction_fallback_returns_unfiltered_top_min() {
        let engine = fixture_engine(false);
        let names = vec!["nonexistent-drug".to_string()];
        let passages = engine.retrieve("question", &names).await.unwrap();

        // No candidate matches; fallback is unfiltered top min_passages.
        assert_eq!(passages.len(), 3);
        assert!(passages[0].score > passages[2].score);
    }

    #[tokio::test]
    async fn unavailable_store_returns_empty() {
        let engine = RetrievalEngine::new(
            FixedEmbedder {
                vector: vec![1.0, 0.0],
                fail: false,
            },
            Arc::new(PassageStore::unavailable()),
            RetrievalConfig::default(),
        );
        let passages = engine.retrieve("question", &[]).await.unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn embed_failure_surfaces_as_capability_error() {
        let engine = fixture_engine(true);
        let err = engine.retrieve("question", &[]).await.unwrap_err();
        assert_eq!(err.kind, mediq_shared::CapabilityErrorKind::Transport);
    }

    #[tokio::test]
    async fn passage_text_is_capped() {
        let mut engine = fixture_engine(false);
        engine.config.passage_char_limit = 10;
        let passages = engine.retrieve("question", &[]).await.unwrap();
        assert!(passages.iter().all(|p| p.text.chars().count() <= 10));
    }
}
