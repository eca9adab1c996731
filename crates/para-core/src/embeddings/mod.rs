//! Embedding Service (C4, `spec.md` §4.4).

mod local;

pub use local::{FastEmbedEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

/// `spec.md` §4.4: "Failure mode `EmbedderUnavailable` must propagate."
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding model failed to initialize: {0}")]
    ModelInit(String),
    #[error("embedder unavailable: {0}")]
    EmbedderUnavailable(String),
    #[error("embedding request failed: {0}")]
    EmbeddingFailed(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// A fixed-dimension float vector (`spec.md` §3, "Embedding").
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }

    pub fn dimensions(&self) -> usize {
        self.vector.len()
    }

    pub fn cosine_similarity(&self, other: &Embedding) -> f32 {
        cosine_similarity(&self.vector, &other.vector)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
    }
}

/// The collaborator interface C5 and C9 depend on (`spec.md` §9, "express
/// each collaborator via an interface abstraction ... and inject them into
/// the core"). `embed` is a blocking call, bounded by the caller's timeout
/// per `spec.md` §5.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError>;

    fn dimensions(&self) -> usize;
}

/// Test double used when no model is configured, and in unit tests that do
/// not exercise C4 itself. Produces a deterministic low-dimensional vector
/// derived from a content hash, so `knn`/fusion logic still has something
/// stable to operate on.
pub struct NullEmbedder {
    dimensions: usize,
}

impl NullEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Default for NullEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

impl Embedder for NullEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = vec![0.0f32; self.dimensions];
        for (i, word) in text.split_whitespace().enumerate() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0 / (i as f32 + 1.0);
        }
        Ok(Embedding::new(vector))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Wraps any `Embedder` with a content-hash-keyed cache
/// (`spec.md` §4.4: "the adapter as a pure function plus a local cache
/// keyed by content hash").
pub struct CachingEmbedder<E: Embedder> {
    inner: E,
    cache: Mutex<HashMap<u64, Embedding>>,
}

impl<E: Embedder> CachingEmbedder<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn content_hash(text: &str) -> u64 {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        hasher.finish()
    }
}

impl<E: Embedder> Embedder for CachingEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let key = Self::content_hash(text);
        if let Some(cached) = self.cache.lock().unwrap().get(&key) {
            return Ok(cached.clone());
        }
        let embedding = self.inner.embed(text)?;
        self.cache.lock().unwrap().insert(key, embedding.clone());
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let a = [1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_handles_zero_vector() {
        let a = [0.0, 0.0];
        let b = [1.0, 1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn null_embedder_is_deterministic() {
        let embedder = NullEmbedder::new(16);
        let first = embedder.embed("hello world").unwrap();
        let second = embedder.embed("hello world").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn caching_embedder_reuses_result_for_identical_content() {
        struct CountingEmbedder {
            calls: Mutex<usize>,
        }
        impl Embedder for CountingEmbedder {
            fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
                *self.calls.lock().unwrap() += 1;
                Ok(Embedding::new(vec![1.0, 0.0]))
            }
            fn dimensions(&self) -> usize {
                2
            }
        }

        let counting = CountingEmbedder {
            calls: Mutex::new(0),
        };
        let cached = CachingEmbedder::new(counting);
        cached.embed("same text").unwrap();
        cached.embed("same text").unwrap();
        assert_eq!(*cached.inner.calls.lock().unwrap(), 1);
    }
}
