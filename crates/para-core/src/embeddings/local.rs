//! Local ONNX embedding inference via `fastembed`, feature-gated behind
//! `embeddings` so CI without model downloads can run against test
//! doubles only.

use std::sync::{Mutex, OnceLock};

use super::{Embedder, Embedding, EmbeddingError};

/// `spec.md` §3: "treat dimension as a configured constant" — the model
/// named in `Config::embedding_model` determines this at construction
/// time; this is the default for the built-in model.
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// `spec.md` §4.7 sets an input-length ceiling for the LLM at ~4000 words;
/// the embedder applies an analogous ceiling so a single oversized note
/// cannot stall a sweep.
const MAX_TEXT_CHARS: usize = 32_000;

#[cfg(feature = "embeddings")]
type ModelHandle = fastembed::TextEmbedding;

#[cfg(feature = "embeddings")]
fn model(model_name: &str) -> Result<&'static Mutex<ModelHandle>, EmbeddingError> {
    static MODEL: OnceLock<Result<Mutex<fastembed::TextEmbedding>, String>> = OnceLock::new();
    let cell = MODEL.get_or_init(|| {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let model = match model_name {
            "nomic-ai/nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
            "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            _ => EmbeddingModel::NomicEmbedTextV15,
        };
        TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
            .map(Mutex::new)
            .map_err(|e| e.to_string())
    });
    cell.as_ref().map_err(|e| EmbeddingError::ModelInit(e.clone()))
}

/// Production `Embedder` implementation. Degrades to `EmbedderUnavailable`
/// on any model-initialization or inference error; the caller (C5's write
/// path) is responsible for the null-embedding degrade path described in
/// `spec.md` §4.4.
pub struct FastEmbedEmbedder {
    model_name: String,
    dimensions: usize,
}

impl FastEmbedEmbedder {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }

    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn truncate(text: &str) -> &str {
        if text.len() <= MAX_TEXT_CHARS {
            text
        } else {
            let mut end = MAX_TEXT_CHARS;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            &text[..end]
        }
    }
}

#[cfg(feature = "embeddings")]
impl Embedder for FastEmbedEmbedder {
    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }
        let truncated = Self::truncate(text);
        let handle = model(&self.model_name)?;
        let guard = handle
            .lock()
            .map_err(|e| EmbeddingError::EmbedderUnavailable(e.to_string()))?;
        let mut result = guard
            .embed(vec![truncated], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        let vector = result
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("empty embedding result".to_string()))?;
        Ok(Embedding::new(matryoshka_truncate(vector, self.dimensions)))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(not(feature = "embeddings"))]
impl Embedder for FastEmbedEmbedder {
    fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
        Err(EmbeddingError::EmbedderUnavailable(
            "crate built without the `embeddings` feature".to_string(),
        ))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Truncates an embedding to the first `dimensions` components, matching
/// Matryoshka-trained models where a prefix of the full vector is itself a
/// valid, if lower-fidelity, embedding.
pub fn matryoshka_truncate(vector: Vec<f32>, dimensions: usize) -> Vec<f32> {
    if vector.len() <= dimensions {
        vector
    } else {
        vector[..dimensions].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "a".repeat(MAX_TEXT_CHARS + 10);
        let truncated = FastEmbedEmbedder::truncate(&text);
        assert_eq!(truncated.len(), MAX_TEXT_CHARS);
    }

    #[test]
    fn matryoshka_truncate_shortens_long_vectors() {
        let v = vec![1.0; 768];
        let truncated = matryoshka_truncate(v, 256);
        assert_eq!(truncated.len(), 256);
    }

    #[test]
    fn matryoshka_truncate_leaves_short_vectors_untouched() {
        let v = vec![1.0; 10];
        let truncated = matryoshka_truncate(v.clone(), 256);
        assert_eq!(truncated, v);
    }
}
