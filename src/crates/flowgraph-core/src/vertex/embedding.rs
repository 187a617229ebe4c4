//! Embedding and vector-engine vertices
//!
//! Thin adapters from resolved inputs onto the [`Embedder`] and
//! [`VectorIndex`] contracts. Input keys are configurable per vertex so
//! bindings can route producer fields without renaming.

use crate::embed::{Embedder, VectorIndex};
use crate::error::{FlowError, Result};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Configuration for an Embedding vertex.
#[derive(Clone)]
pub struct EmbeddingConfig {
    /// The embedding provider
    pub embedder: Arc<dyn Embedder>,
    /// Input key holding the text (string) or texts (array of strings)
    pub text_var: String,
}

impl EmbeddingConfig {
    /// Create a config reading from the `"text"` input key.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            text_var: "text".to_string(),
        }
    }

    /// Read the text from a different input key.
    pub fn with_text_var(mut self, var: impl Into<String>) -> Self {
        self.text_var = var.into();
        self
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("text_var", &self.text_var)
            .finish_non_exhaustive()
    }
}

/// Embed one text into `{"vector": [...]}` or a batch into
/// `{"vectors": [[...], ...]}`.
pub(crate) async fn run_embedding(
    config: &EmbeddingConfig,
    inputs: Map<String, Value>,
) -> Result<Value> {
    match inputs.get(&config.text_var) {
        Some(Value::String(text)) => {
            let vector = config.embedder.embed(text).await?;
            Ok(json!({ "vector": vector }))
        }
        Some(Value::Array(items)) => {
            let texts: Vec<String> = items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
            if texts.len() != items.len() {
                return Err(FlowError::task("embedding", "batch entries must be strings"));
            }
            let vectors = config.embedder.embed_batch(&texts).await?;
            Ok(json!({ "vectors": vectors }))
        }
        _ => Err(FlowError::MissingDependency {
            vertex: "embedding".to_string(),
            dependency: format!("input.{}", config.text_var),
        }),
    }
}

/// Configuration for a VectorStore (insert) vertex.
#[derive(Clone)]
pub struct VectorStoreConfig {
    /// The vector engine
    pub index: Arc<dyn VectorIndex>,
    /// Input key holding the record id
    pub id_var: String,
    /// Input key holding the vector
    pub vector_var: String,
    /// Input key holding the metadata object (missing inserts `{}`)
    pub metadata_var: String,
}

impl VectorStoreConfig {
    /// Create a config reading `"id"`, `"vector"` and `"metadata"`.
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            id_var: "id".to_string(),
            vector_var: "vector".to_string(),
            metadata_var: "metadata".to_string(),
        }
    }
}

impl std::fmt::Debug for VectorStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStoreConfig")
            .field("id_var", &self.id_var)
            .field("vector_var", &self.vector_var)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_vector_store(
    vertex_id: &str,
    config: &VectorStoreConfig,
    inputs: Map<String, Value>,
) -> Result<Value> {
    let id = inputs
        .get(&config.id_var)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(vertex_id, &config.id_var))?;
    let vector = parse_vector(vertex_id, &config.vector_var, inputs.get(&config.vector_var))?;
    let metadata = inputs
        .get(&config.metadata_var)
        .cloned()
        .unwrap_or_else(|| json!({}));

    config.index.insert(id, vector, metadata).await?;
    Ok(json!({ "inserted": 1, "id": id }))
}

/// Configuration for a VectorQuery (search) vertex.
#[derive(Clone)]
pub struct VectorQueryConfig {
    /// The vector engine
    pub index: Arc<dyn VectorIndex>,
    /// Input key holding the query vector
    pub vector_var: String,
    /// Number of hits to return
    pub top_k: usize,
    /// Input key holding an optional metadata filter object
    pub filter_var: String,
}

impl VectorQueryConfig {
    /// Create a config reading `"vector"` / `"filter"`, returning 10 hits.
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            vector_var: "vector".to_string(),
            top_k: 10,
            filter_var: "filter".to_string(),
        }
    }

    /// Set the hit count.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

impl std::fmt::Debug for VectorQueryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorQueryConfig")
            .field("vector_var", &self.vector_var)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_vector_query(
    vertex_id: &str,
    config: &VectorQueryConfig,
    inputs: Map<String, Value>,
) -> Result<Value> {
    let vector = parse_vector(vertex_id, &config.vector_var, inputs.get(&config.vector_var))?;
    let filter = inputs.get(&config.filter_var);

    let matches = config.index.query(&vector, config.top_k, filter).await?;
    Ok(json!({ "matches": matches }))
}

fn missing(vertex_id: &str, var: &str) -> FlowError {
    FlowError::MissingDependency {
        vertex: vertex_id.to_string(),
        dependency: format!("input.{var}"),
    }
}

fn parse_vector(vertex_id: &str, var: &str, value: Option<&Value>) -> Result<Vec<f32>> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| missing(vertex_id, var))?;
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| {
            FlowError::task(vertex_id, format!("'{var}' must be an array of numbers"))
        }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::InMemoryVectorIndex;
    use async_trait::async_trait;

    struct LenEmbedder;

    #[async_trait]
    impl Embedder for LenEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32])
        }
    }

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_embed_single() {
        let config = EmbeddingConfig::new(Arc::new(LenEmbedder));
        let out = run_embedding(&config, map(&[("text", json!("hello"))])).await.unwrap();
        assert_eq!(out, json!({"vector": [5.0]}));
    }

    #[tokio::test]
    async fn test_embed_batch() {
        let config = EmbeddingConfig::new(Arc::new(LenEmbedder));
        let out = run_embedding(&config, map(&[("text", json!(["a", "bb"]))])).await.unwrap();
        assert_eq!(out, json!({"vectors": [[1.0], [2.0]]}));
    }

    #[tokio::test]
    async fn test_embed_missing_input() {
        let config = EmbeddingConfig::new(Arc::new(LenEmbedder));
        assert!(run_embedding(&config, Map::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_store_then_query() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let store = VectorStoreConfig::new(Arc::clone(&index) as Arc<dyn VectorIndex>);
        let out = run_vector_store(
            "store",
            &store,
            map(&[
                ("id", json!("doc-1")),
                ("vector", json!([1.0, 0.0])),
                ("metadata", json!({"lang": "en"})),
            ]),
        )
        .await
        .unwrap();
        assert_eq!(out["inserted"], json!(1));

        let query = VectorQueryConfig::new(index as Arc<dyn VectorIndex>).with_top_k(5);
        let out = run_vector_query("query", &query, map(&[("vector", json!([1.0, 0.0]))]))
            .await
            .unwrap();
        let matches = out["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["id"], json!("doc-1"));
        assert_eq!(matches[0]["metadata"], json!({"lang": "en"}));
    }

    #[tokio::test]
    async fn test_query_rejects_non_numeric_vector() {
        let index = Arc::new(InMemoryVectorIndex::new());
        let config = VectorQueryConfig::new(index as Arc<dyn VectorIndex>);
        let result = run_vector_query("query", &config, map(&[("vector", json!(["x"]))])).await;
        assert!(result.is_err());
    }
}
