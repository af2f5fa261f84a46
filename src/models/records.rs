// src/models/records.rs
use serde::{Deserialize, Serialize};

/// A catalog entry exactly as an ingestion source delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source system identifier, e.g. "mangadex" or "anilist".
    pub source: String,
    /// Identifier native to the source system.
    pub source_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub alt_titles: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub popularity: u64,
    #[serde(default)]
    pub origin_language: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub cover_art: Option<String>,
    #[serde(default)]
    pub official_link: Option<String>,
}

/// External identity of a record: the source and its native id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub source_id: String,
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.source, self.source_id)
    }
}

/// A raw record after canonicalization. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub source_ref: SourceRef,
    /// Display title: trimmed with internal whitespace collapsed.
    pub title: String,
    /// Comparison key used for blocking, resolution and title boost.
    pub title_key: String,
    pub alt_titles: Vec<String>,
    /// Comparison keys of `alt_titles`, index-aligned.
    pub alt_title_keys: Vec<String>,
    pub tags: Vec<String>,
    pub synopsis: String,
    pub popularity: u64,
    pub origin_language: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub cover_art: Option<String>,
    pub official_link: Option<String>,
    pub combined_text: String,
}

impl NormalizedRecord {
    /// The title key followed by every alternate title key.
    pub fn all_title_keys(&self) -> impl Iterator<Item = &str> + Clone {
        std::iter::once(self.title_key.as_str()).chain(self.alt_title_keys.iter().map(String::as_str))
    }
}

/// The single canonical record of one equivalence class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldenRecord {
    pub id: String,
    pub canonical_title: String,
    pub canonical_key: String,
    pub alt_titles: Vec<String>,
    pub alt_title_keys: Vec<String>,
    pub tags: Vec<String>,
    pub description: String,
    pub synopses: Vec<String>,
    pub combined_text: String,
    pub popularity: u64,
    pub origin_language: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub cover_art: Option<String>,
    pub official_link: Option<String>,
    pub sources: Vec<SourceRef>,
}

impl GoldenRecord {
    pub fn all_title_keys(&self) -> impl Iterator<Item = &str> + Clone {
        std::iter::once(self.canonical_key.as_str())
            .chain(self.alt_title_keys.iter().map(String::as_str))
    }
}

/// Human-facing explanation of why a result was returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchReason {
    DirectTitle,
    NearTitle,
    StrongKeyword,
    PlotVibe,
}

impl MatchReason {
    pub fn label(&self) -> &'static str {
        match self {
            MatchReason::DirectTitle => "Direct title match",
            MatchReason::NearTitle => "Near title match",
            MatchReason::StrongKeyword => "Strong keyword match",
            MatchReason::PlotVibe => "Matches plot vibe",
        }
    }
}

/// One ranked hit. The component scores are the exact values used for ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub record_id: String,
    pub title: String,
    pub popularity: u64,
    pub score: f64,
    pub dense_score: f64,
    pub sparse_score: f64,
    pub title_boost: f64,
    pub reason: MatchReason,
}
