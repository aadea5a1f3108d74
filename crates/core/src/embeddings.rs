use crate::chunking::content_tokens;
use crate::error::EmbeddingError;

const DEFAULT: usize = 384;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps text to fixed-length dense vectors. Deterministic for a fixed model:
/// identical input always yields the identical vector.
pub trait Embedder {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Order-preserving batch form, result-identical to repeated `embed`.
    /// Exists purely for throughput.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Local embedding model hashing stop-filtered word tokens, plus a
/// four-character prefix per longer token so close word forms land in a
/// shared bucket, into a fixed-dimension unit vector. No model download,
/// no warm-up, bit-identical output for identical input.
#[derive(Debug, Clone, Copy)]
pub struct HashedTokenEmbedder {
    pub dimensions: usize,
}

impl Default for HashedTokenEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for HashedTokenEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];

        for token in content_tokens(text) {
            bump(&mut vector, &token);
            if token.chars().count() > 4 {
                let prefix: String = token.chars().take(4).collect();
                bump(&mut vector, &prefix);
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

// FNV-1a over the token bytes picks the bucket.
fn bump(vector: &mut [f32], token: &str) {
    let mut hash = 1469598103934665603u64;
    for byte in token.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    let bucket = (hash % vector.len() as u64) as usize;
    vector[bucket] += 1.0;
}

#[cfg(test)]
mod tests {
    use super::{Embedder, HashedTokenEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};

    #[test]
    fn embedder_is_deterministic() {
        let embedder = HashedTokenEmbedder::default();
        let first = embedder.embed("What coffee is available?").expect("embed");
        let second = embedder.embed("What coffee is available?").expect("embed");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = HashedTokenEmbedder::default();
        let vector = embedder.embed("abc").expect("embed");
        assert_eq!(vector.len(), DEFAULT_EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn batch_matches_repeated_single_calls() {
        let embedder = HashedTokenEmbedder { dimensions: 64 };
        let texts = vec![
            "latte art basics".to_string(),
            "espresso extraction time".to_string(),
            String::new(),
        ];

        let batch = embedder.embed_batch(&texts).expect("batch");
        assert_eq!(batch.len(), texts.len());
        for (text, vector) in texts.iter().zip(&batch) {
            assert_eq!(vector, &embedder.embed(text).expect("embed"));
        }
    }

    #[test]
    fn vectors_are_unit_length() {
        let embedder = HashedTokenEmbedder::default();
        let vector = embedder.embed("steam wand cleaning").expect("embed");
        let magnitude: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn related_texts_score_above_the_default_threshold() {
        let embedder = HashedTokenEmbedder::default();
        let question = embedder.embed("What coffee is available?").expect("embed");
        let chunk = embedder
            .embed("The coffee menu includes Latte and Cappuccino.")
            .expect("embed");

        let similarity: f32 = question.iter().zip(&chunk).map(|(a, b)| a * b).sum();
        assert!(similarity >= 0.3, "similarity was {similarity}");
    }
}
