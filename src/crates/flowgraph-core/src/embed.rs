//! Embedding and vector-engine contracts
//!
//! The core treats embedding providers and vector engines as opaque
//! services: [`Embedder`] maps text to vectors, [`VectorIndex`] stores and
//! searches them. [`InMemoryVectorIndex`] is the bundled reference
//! implementation (exact cosine scan with optional metadata equality
//! filtering) used by tests and local runs.

use crate::error::{FlowError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Text-to-vector provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch; the default implementation embeds sequentially.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

/// One search hit from a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Stored record id
    pub id: String,
    /// Similarity score, higher is closer
    pub score: f32,
    /// Metadata stored with the record
    pub metadata: Value,
}

/// Vector storage and similarity search.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace a record.
    async fn insert(&self, id: &str, vector: Vec<f32>, metadata: Value) -> Result<()>;

    /// The `top_k` records most similar to `vector`.
    ///
    /// `filter`, when given, is an object whose every field must equal the
    /// corresponding metadata field for a record to qualify.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<VectorMatch>>;
}

#[derive(Debug, Clone)]
struct StoredVector {
    vector: Vec<f32>,
    metadata: Value,
}

/// Process-local [`VectorIndex`] using exact cosine similarity.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    records: RwLock<HashMap<String, StoredVector>>,
}

impl InMemoryVectorIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the index is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn matches_filter(metadata: &Value, filter: &Value) -> bool {
    match filter.as_object() {
        Some(expected) => expected
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value)),
        None => true,
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn insert(&self, id: &str, vector: Vec<f32>, metadata: Value) -> Result<()> {
        if vector.is_empty() {
            return Err(FlowError::task("vector_store", "empty vector"));
        }
        self.records
            .write()
            .await
            .insert(id.to_string(), StoredVector { vector, metadata });
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<VectorMatch>> {
        let records = self.records.read().await;
        let mut hits: Vec<VectorMatch> = records
            .iter()
            .filter(|(_, stored)| filter.map_or(true, |f| matches_filter(&stored.metadata, f)))
            .map(|(id, stored)| VectorMatch {
                id: id.clone(),
                score: cosine(vector, &stored.vector),
                metadata: stored.metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}
