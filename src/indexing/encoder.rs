// src/indexing/encoder.rs
// Sentence encoding seam plus the built-in feature-hashing encoder.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CoreError, CoreResult};

/// Fixed-dimension text encoder. Implementations must be deterministic: the same text
/// always yields the same vector.
pub trait SentenceEncoder: Send + Sync {
    fn dimension(&self) -> usize;

    fn encode(&self, text: &str) -> CoreResult<Vec<f32>>;

    /// Short identifier recorded with each index generation.
    fn name(&self) -> &str;
}

static WORD: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\w+").ok());

const UNIGRAM_WEIGHT: f32 = 1.0;
const BIGRAM_WEIGHT: f32 = 0.7;
const TRIGRAM_WEIGHT: f32 = 0.3;

/// Feature-hashing encoder over word unigrams, word bigrams and character trigrams.
/// Needs no model files; each feature lands in an md5-derived bucket with an md5-derived sign.
#[derive(Debug, Clone)]
pub struct HashedNgramEncoder {
    dimension: usize,
}

impl HashedNgramEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = md5::compute(feature.as_bytes());
        let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize % self.dimension;
        let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl SentenceEncoder for HashedNgramEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashed-ngram"
    }

    fn encode(&self, text: &str) -> CoreResult<Vec<f32>> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = match WORD.as_ref() {
            Some(re) => re.find_iter(&lowered).map(|m| m.as_str()).collect(),
            None => lowered.split_whitespace().collect(),
        };
        if words.is_empty() {
            return Err(CoreError::EncodingFailed {
                subject: preview(text),
                reason: "no encodable terms".to_string(),
            });
        }

        let mut vector = vec![0.0_f32; self.dimension];
        for word in &words {
            self.add_feature(&mut vector, &format!("w:{}", word), UNIGRAM_WEIGHT);

            let padded: Vec<char> = std::iter::once('<')
                .chain(word.chars())
                .chain(std::iter::once('>'))
                .collect();
            for tri in padded.windows(3) {
                let gram: String = tri.iter().collect();
                self.add_feature(&mut vector, &format!("c:{}", gram), TRIGRAM_WEIGHT);
            }
        }
        for pair in words.windows(2) {
            self.add_feature(&mut vector, &format!("b:{} {}", pair[0], pair[1]), BIGRAM_WEIGHT);
        }

        if !normalize_in_place(&mut vector) {
            return Err(CoreError::EncodingFailed {
                subject: preview(text),
                reason: "features cancelled to a zero vector".to_string(),
            });
        }
        Ok(vector)
    }
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(40).collect();
    if head.len() < text.len() {
        format!("'{}...'", head)
    } else {
        format!("'{}'", head)
    }
}

/// Scales `vector` to unit length in place. Returns false for a zero vector.
pub fn normalize_in_place(vector: &mut [f32]) -> bool {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return false;
    }
    for v in vector.iter_mut() {
        *v /= norm;
    }
    true
}
