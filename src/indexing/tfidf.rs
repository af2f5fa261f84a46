// src/indexing/tfidf.rs
// Sparse TF-IDF model fit over the golden-record corpus.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

pub type TermId = u32;

// English stop words removed before weighting.
const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against", "all", "almost",
    "alone", "along", "already", "also", "although", "always", "am", "among", "amongst", "an",
    "and", "another", "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "be", "became", "because", "become", "becomes", "becoming", "been",
    "before", "beforehand", "behind", "being", "below", "beside", "besides", "between", "beyond",
    "both", "but", "by", "can", "cannot", "could", "did", "do", "does", "doing", "done", "down",
    "due", "during", "each", "either", "else", "elsewhere", "enough", "etc", "even", "ever",
    "every", "everyone", "everything", "everywhere", "except", "few", "for", "former",
    "formerly", "from", "further", "had", "has", "have", "having", "he", "hence", "her", "here",
    "hereafter", "hereby", "herein", "hers", "herself", "him", "himself", "his", "how",
    "however", "i", "ie", "if", "in", "indeed", "into", "is", "it", "its", "itself", "just",
    "latter", "latterly", "least", "less", "ltd", "made", "many", "may", "me", "meanwhile",
    "might", "mine", "more", "moreover", "most", "mostly", "much", "must", "my", "myself",
    "namely", "neither", "never", "nevertheless", "next", "no", "nobody", "none", "noone",
    "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on", "once", "only",
    "onto", "or", "other", "others", "otherwise", "our", "ours", "ourselves", "out", "over",
    "own", "per", "perhaps", "please", "rather", "re", "same", "seem", "seemed", "seeming",
    "seems", "several", "she", "should", "since", "so", "some", "somehow", "someone",
    "something", "sometime", "sometimes", "somewhere", "still", "such", "than", "that", "the",
    "their", "them", "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "this", "those", "though", "through",
    "throughout", "thru", "thus", "to", "together", "too", "toward", "towards", "under",
    "until", "up", "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever",
    "when", "whence", "whenever", "where", "whereafter", "whereas", "whereby", "wherein",
    "whereupon", "wherever", "whether", "which", "while", "whither", "who", "whoever", "whole",
    "whom", "whose", "why", "will", "with", "within", "without", "would", "yet", "you", "your",
    "yours", "yourself", "yourselves",
];

static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| ENGLISH_STOPWORDS.iter().copied().collect());
static TOKEN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\w\w+").ok());

/// Lower-cased runs of two or more word characters, stop words removed.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let tokens: Vec<&str> = match TOKEN.as_ref() {
        Some(re) => re.find_iter(&lowered).map(|m| m.as_str()).collect(),
        None => lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.chars().count() >= 2)
            .collect(),
    };
    tokens
        .into_iter()
        .filter(|t| !STOPWORDS.contains(*t))
        .map(str::to_string)
        .collect()
}

/// Sparse vector with strictly ascending term ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<TermId>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Dot product by merging the two sorted index lists.
    pub fn dot(&self, other: &SparseVector) -> f64 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0_f64;
        while i < self.indices.len() && j < other.indices.len() {
            match self.indices[i].cmp(&other.indices[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += self.values[i] as f64 * other.values[j] as f64;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Vocabulary and smoothed inverse document frequencies.
#[derive(Debug, Clone, Default)]
pub struct TfidfModel {
    vocabulary: HashMap<String, TermId>,
    idf: Vec<f32>,
    documents: usize,
}

impl TfidfModel {
    /// Fits the vocabulary over `documents`. Term ids follow sorted term order.
    pub fn fit<S: AsRef<str>>(documents: &[S]) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let distinct: BTreeSet<String> = tokenize(doc.as_ref()).into_iter().collect();
            for term in distinct {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let n = documents.len() as f64;
        let mut vocabulary = HashMap::with_capacity(document_frequency.len());
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (id, (term, df)) in document_frequency.into_iter().enumerate() {
            vocabulary.insert(term, id as TermId);
            idf.push((((1.0 + n) / (1.0 + df as f64)).ln() + 1.0) as f32);
        }

        Self {
            vocabulary,
            idf,
            documents: documents.len(),
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    pub fn documents(&self) -> usize {
        self.documents
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.vocabulary.get(term).copied()
    }

    /// Projects `text` onto the fitted vocabulary. Unknown terms contribute nothing; the
    /// result is L2-normalized (or empty).
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<TermId, u32> = BTreeMap::new();
        for token in tokenize(text) {
            if let Some(id) = self.term_id(&token) {
                *counts.entry(id).or_default() += 1;
            }
        }

        let mut indices = Vec::with_capacity(counts.len());
        let mut values = Vec::with_capacity(counts.len());
        for (id, count) in counts {
            indices.push(id);
            values.push(count as f32 * self.idf[id as usize]);
        }

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in values.iter_mut() {
                *v /= norm;
            }
        }
        SparseVector { indices, values }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("The Hunter, and a DUNGEON! x y2"),
            vec!["hunter", "dungeon", "y2"]
        );
    }

    #[test]
    fn test_idf_and_vocabulary_order() {
        let docs = ["hunter dungeon", "hunter romance", "cooking"];
        let model = TfidfModel::fit(&docs);
        assert_eq!(model.vocabulary_size(), 4);
        assert_eq!(model.documents(), 3);
        // sorted: cooking, dungeon, hunter, romance
        assert_eq!(model.term_id("cooking"), Some(0));
        assert_eq!(model.term_id("romance"), Some(3));
        assert!(model.term_id("the").is_none());

        let v = model.transform("hunter hunter dungeon");
        assert_eq!(v.indices, vec![1, 2]);
        let norm: f32 = v.values.iter().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_out_of_vocabulary_terms_contribute_zero() {
        let model = TfidfModel::fit(&["hunter dungeon", "cooking romance"]);
        assert!(model.transform("spaceship pirates").is_empty());
        let doc = model.transform("hunter dungeon");
        let query = model.transform("hunter spaceship");
        let sim = doc.dot(&query);
        assert!(sim > 0.0 && sim < 1.0);
        assert!((doc.dot(&doc) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_sparse_dot_merges_sorted_indices() {
        let a = SparseVector {
            indices: vec![0, 3, 7],
            values: vec![1.0, 2.0, 3.0],
        };
        let b = SparseVector {
            indices: vec![3, 5, 7],
            values: vec![0.5, 9.0, 1.0],
        };
        assert!((a.dot(&b) - 4.0).abs() < 1e-9);
        assert_eq!(a.dot(&SparseVector::default()), 0.0);
    }
}
