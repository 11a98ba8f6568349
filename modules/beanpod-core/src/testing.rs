//! Deterministic inference doubles for tests. No network, stable outputs.

use std::collections::HashMap;

use async_trait::async_trait;

use inference_client::{Digest, EmbeddingTask, InsightExtractor, KeyConcept, TextEmbedder};

/// Deterministic embedder. Registered texts get exact vectors; unmatched
/// texts get a unique hash-based vector (low similarity to everything).
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
        }
    }

    /// Register a text→vector mapping for controlled similarity.
    pub fn on_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Generate a deterministic hash-seeded unit vector for unmatched text.
    fn hash_vector(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish() | 1;

        let mut vec: Vec<f32> = (0..self.dimension)
            .map(|_| {
                // xorshift64, spread into [-1, 1]
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state >> 40) as f32 / (1u32 << 24) as f32) * 2.0 - 1.0
            })
            .collect();
        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }

    fn lookup(&self, text: &str) -> Vec<f32> {
        self.vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hash_vector(text))
    }
}

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.lookup(t)).collect()
    }

    async fn embed(&self, text: &str, _task: EmbeddingTask) -> Vec<f32> {
        self.lookup(text)
    }
}

/// Embedder standing in for an unreachable service: every input comes back
/// as the empty-vector backstop.
pub struct OfflineEmbedder;

#[async_trait]
impl TextEmbedder for OfflineEmbedder {
    async fn embed_batch(&self, texts: &[String], _task: EmbeddingTask) -> Vec<Vec<f32>> {
        vec![Vec::new(); texts.len()]
    }

    async fn embed(&self, _text: &str, _task: EmbeddingTask) -> Vec<f32> {
        Vec::new()
    }
}

/// Extractor returning a derived digest per text and a fixed concept list.
pub struct CannedExtractor {
    concepts: Vec<KeyConcept>,
}

impl CannedExtractor {
    pub fn new() -> Self {
        Self { concepts: Vec::new() }
    }

    pub fn with_concepts(concepts: Vec<KeyConcept>) -> Self {
        Self { concepts }
    }
}

impl Default for CannedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InsightExtractor for CannedExtractor {
    async fn extract_digests(&self, texts: &[String]) -> Vec<Digest> {
        texts
            .iter()
            .map(|text| Digest {
                summary: format!(
                    "Digest of: {}",
                    inference_client::util::truncate_to_char_boundary(text, 40)
                ),
                topic: "general".to_string(),
            })
            .collect()
    }

    async fn extract_key_concepts(&self, _texts: &[String]) -> Vec<KeyConcept> {
        self.concepts.clone()
    }
}

/// Unit vector along one axis, for exact-similarity setups.
pub fn basis_vector(dimension: usize, axis: usize) -> Vec<f32> {
    let mut vec = vec![0.0f32; dimension];
    vec[axis % dimension] = 1.0;
    vec
}
