//! Read-only similarity index over pre-embedded document chunks.
//!
//! The ingestion job (out of scope here) writes two row-aligned JSONL
//! files under the index directory:
//! - `docs.jsonl` — one [`DocRecord`] per line
//! - `vectors.jsonl` — one normalized `Vec<f32>` per line
//!
//! [`PassageStore`] loads both at startup and serves brute-force inner
//! product search. A missing index is *not* an error: callers must
//! treat empty retrieval as "no corpus coverage".

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mediq_shared::{MediqError, Result};

/// Corpus file names under the index directory.
const DOCS_FILE: &str = "docs.jsonl";
const VECTORS_FILE: &str = "vectors.jsonl";

// ---------------------------------------------------------------------------
// DocRecord
// ---------------------------------------------------------------------------

/// One pre-chunked corpus record, as written by the ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocRecord {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drug_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_ingredients: Option<Vec<String>>,
}

/// One nearest-neighbour hit: corpus row plus similarity score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub row: usize,
    /// Inner product of normalized vectors, cosine-like in roughly [-1, 1].
    pub score: f64,
}

// ---------------------------------------------------------------------------
// PassageStore
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LoadedIndex {
    records: Vec<DocRecord>,
    vectors: Vec<Vec<f32>>,
    dim: usize,
}

/// Similarity index over the pre-embedded corpus, shared read-only
/// across concurrent pipeline runs.
#[derive(Debug)]
pub struct PassageStore {
    index_dir: PathBuf,
    inner: Option<LoadedIndex>,
}

impl PassageStore {
    /// Load the index from `index_dir`. Missing corpus files yield an
    /// *unavailable* store, not an error; malformed or misaligned files
    /// are validation errors.
    pub fn load(index_dir: impl Into<PathBuf>) -> Result<Self> {
        let index_dir = index_dir.into();
        let docs_path = index_dir.join(DOCS_FILE);
        let vectors_path = index_dir.join(VECTORS_FILE);

        if !docs_path.exists() || !vectors_path.exists() {
            warn!(?index_dir, "corpus index not found; retrieval will return no passages");
            return Ok(Self {
                index_dir,
                inner: None,
            });
        }

        let records = read_jsonl::<DocRecord>(&docs_path)?;
        let vectors = read_jsonl::<Vec<f32>>(&vectors_path)?;

        if records.len() != vectors.len() {
            return Err(MediqError::Index(format!(
                "row count mismatch: {} docs vs {} vectors",
                records.len(),
                vectors.len()
            )));
        }

        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(MediqError::Index(format!(
                "vector at row {bad} has dimension {} (expected {dim})",
                vectors[bad].len()
            )));
        }

        info!(
            records = records.len(),
            dim,
            ?index_dir,
            "corpus index loaded"
        );

        Ok(Self {
            index_dir,
            inner: Some(LoadedIndex {
                records,
                vectors,
                dim,
            }),
        })
    }

    /// An explicitly unavailable store (for tests and degraded setups).
    pub fn unavailable() -> Self {
        Self {
            index_dir: PathBuf::new(),
            inner: None,
        }
    }

    /// Build a store directly from rows (fixture constructor).
    pub fn from_rows(records: Vec<DocRecord>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if records.len() != vectors.len() {
            return Err(MediqError::validation("records/vectors length mismatch"));
        }
        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        Ok(Self {
            index_dir: PathBuf::new(),
            inner: Some(LoadedIndex {
                records,
                vectors,
                dim,
            }),
        })
    }

    pub fn is_available(&self) -> bool {
        self.inner.is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.records.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Embedding dimension, 0 when unavailable or empty.
    pub fn dim(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.dim)
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }

    /// Record at `row`; panics on out-of-range rows, which only
    /// [`search`](Self::search) produces.
    pub fn record(&self, row: usize) -> &DocRecord {
        &self.inner.as_ref().expect("store available").records[row]
    }

    /// Brute-force inner-product search, scores sorted non-increasing.
    /// Returns empty when the store is unavailable or the query vector
    /// dimension does not match the corpus.
    pub fn search(&self, vector: &[f32], k: usize) -> Vec<SearchHit> {
        let Some(index) = &self.inner else {
            return Vec::new();
        };
        if index.records.is_empty() || k == 0 {
            return Vec::new();
        }
        if vector.len() != index.dim {
            warn!(
                got = vector.len(),
                expected = index.dim,
                "query vector dimension mismatch; returning no hits"
            );
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = index
            .vectors
            .iter()
            .enumerate()
            .map(|(row, v)| SearchHit {
                row,
                score: dot(vector, v),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        hits
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|e| MediqError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| MediqError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|e| {
            MediqError::Index(format!("{}:{}: {e}", path.display(), line_no + 1))
        })?;
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, drug: &str) -> DocRecord {
        DocRecord {
            id: id.into(),
            text: format!("Text for {id}"),
            source_url: None,
            section: None,
            drug_name: Some(drug.into()),
            active_ingredients: None,
        }
    }

    fn fixture_store() -> PassageStore {
        PassageStore::from_rows(
            vec![record("a", "metformin"), record("b", "apixaban"), record("c", "cetirizine")],
            vec![
                vec![1.0, 0.0],
                vec![0.0, 1.0],
                vec![0.7071, 0.7071],
            ],
        )
        .unwrap()
    }

    #[test]
    fn search_orders_scores_non_increasing() {
        let store = fixture_store();
        let hits = store.search(&[1.0, 0.0], 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].row, 0);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn dimension_mismatch_returns_empty() {
        let store = fixture_store();
        assert!(store.search(&[1.0, 0.0, 0.0], 3).is_empty());
    }

    #[test]
    fn unavailable_store_is_silent() {
        let store = PassageStore::unavailable();
        assert!(!store.is_available());
        assert!(store.search(&[1.0], 5).is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn missing_files_load_as_unavailable() {
        let dir = std::env::temp_dir().join("mediq-index-missing");
        std::fs::create_dir_all(&dir).unwrap();
        let store = PassageStore::load(&dir).expect("missing index is not an error");
        assert!(!store.is_available());
    }

    #[test]
    fn load_rejects_row_mismatch() {
        let dir = std::env::temp_dir().join(format!("mediq-index-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(DOCS_FILE),
            "{\"id\":\"a\",\"text\":\"t\"}\n{\"id\":\"b\",\"text\":\"t\"}\n",
        )
        .unwrap();
        std::fs::write(dir.join(VECTORS_FILE), "[1.0,0.0]\n").unwrap();

        let err = PassageStore::load(&dir).unwrap_err();
        assert!(err.to_string().contains("mismatch"));
    }

    #[test]
    fn load_round_trip() {
        let dir = std::env::temp_dir().join(format!("mediq-index-rt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(DOCS_FILE),
            "{\"id\":\"a\",\"text\":\"alpha\",\"drug_name\":\"metformin\"}\n",
        )
        .unwrap();
        std::fs::write(dir.join(VECTORS_FILE), "[0.6,0.8]\n").unwrap();

        let store = PassageStore::load(&dir).unwrap();
        assert!(store.is_available());
        assert_eq!(store.len(), 1);
        assert_eq!(store.dim(), 2);
        assert_eq!(store.record(0).drug_name.as_deref(), Some("metformin"));

        let hits = store.search(&[0.6, 0.8], 5);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }
}
