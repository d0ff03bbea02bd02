// Local deterministic embedder, no external model required

use async_trait::async_trait;
use tracing::debug;

use super::Embedder;
use crate::error::Result;

/// Embedding dimension of the local model
pub const DIMENSION: usize = 384;

/// Deterministic local embedder.
///
/// Each lowercase token hashes (blake3 XOF) to a fixed pseudo-random vector;
/// a text embeds as the normalised sum of its token vectors. Similar texts
/// share tokens and therefore direction. Vectors are stable across runs and
/// builds, which keeps re-index passes idempotent.
pub struct HashingEmbedder {
    model_id: String,
}

impl HashingEmbedder {
    pub fn new(model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        debug!("Initialising local hashing embedder: {}", model_id);
        Self { model_id }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f32; DIMENSION];
        let mut token_count = 0usize;

        for token in tokenize(text) {
            let token_vector = token_vector(&token);
            for (acc, v) in sum.iter_mut().zip(token_vector.iter()) {
                *acc += v;
            }
            token_count += 1;
        }

        if token_count == 0 {
            // An empty text still embeds to a fixed unit vector
            sum[0] = 1.0;
            return sum;
        }

        normalize(&mut sum);
        sum
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
}

/// Expand a token into a fixed pseudo-random vector via the blake3 XOF
fn token_vector(token: &str) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(token.as_bytes());
    let mut reader = hasher.finalize_xof();
    let mut bytes = vec![0u8; DIMENSION];
    reader.fill(&mut bytes);

    bytes.iter().map(|&b| (b as f32) / 127.5 - 1.0).collect()
}

fn normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder() -> HashingEmbedder {
        HashingEmbedder::new("local-hash-v1")
    }

    #[tokio::test]
    async fn test_vectors_are_unit_norm() {
        let e = embedder();
        let vectors = e
            .embed_batch(&["compute fibonacci numbers".to_string(), "".to_string()])
            .await
            .unwrap();

        for vector in &vectors {
            assert_eq!(vector.len(), DIMENSION);
            let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm was {norm}");
        }
    }

    #[tokio::test]
    async fn test_deterministic_and_order_preserving() {
        let e = embedder();
        let texts = vec!["alpha beta".to_string(), "gamma delta".to_string()];

        let first = e.embed_batch(&texts).await.unwrap();
        let second = e.embed_batch(&texts).await.unwrap();
        assert_eq!(first, second);

        let reversed: Vec<String> = texts.iter().rev().cloned().collect();
        let swapped = e.embed_batch(&reversed).await.unwrap();
        assert_eq!(first[0], swapped[1]);
        assert_eq!(first[1], swapped[0]);
    }

    #[tokio::test]
    async fn test_shared_tokens_raise_similarity() {
        let e = embedder();
        let vectors = e
            .embed_batch(&[
                "fibonacci".to_string(),
                "compute fibonacci numbers".to_string(),
                "connect to the database".to_string(),
            ])
            .await
            .unwrap();

        let related = crate::store::vector::cosine_similarity(&vectors[0], &vectors[1]);
        let unrelated = crate::store::vector::cosine_similarity(&vectors[0], &vectors[2]);
        assert!(
            related > unrelated,
            "related {related} should beat unrelated {unrelated}"
        );
    }

    #[test]
    fn test_tokenize() {
        let tokens: Vec<String> = tokenize("def compute_fib(n): return n").collect();
        assert!(tokens.contains(&"compute_fib".to_string()));
        assert!(tokens.contains(&"return".to_string()));
        // Single-character tokens are dropped
        assert!(!tokens.contains(&"n".to_string()));
    }
}
