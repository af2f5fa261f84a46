// src/matching/normalizer.rs
// Record Normalizer: raw catalog records into the uniform internal shape.

use log::{debug, info, warn};
use std::collections::{BTreeMap, HashSet};
use url::Url;

use crate::error::{CoreError, RejectReason};
use crate::matching::title::{clean_display, normalize_title_key};
use crate::models::stats_models::NormalizationStats;
use crate::models::{NormalizedRecord, RawRecord, SourceRef};

/// Result of normalizing one batch: the accepted records in `(source, source_id)` order,
/// the per-record rejections, and counters.
#[derive(Debug, Default)]
pub struct NormalizationOutcome {
    pub records: Vec<NormalizedRecord>,
    pub rejected: Vec<CoreError>,
    pub stats: NormalizationStats,
}

/// Normalizes a batch. A `(source, source_id)` delivered more than once keeps only
/// its last delivery; rejected records are reported, never fatal.
pub fn normalize_batch(raw_records: Vec<RawRecord>) -> NormalizationOutcome {
    let mut stats = NormalizationStats {
        raw_records: raw_records.len(),
        ..Default::default()
    };

    let mut latest: BTreeMap<SourceRef, RawRecord> = BTreeMap::new();
    for raw in raw_records {
        let key = SourceRef {
            source: raw.source.trim().to_string(),
            source_id: raw.source_id.trim().to_string(),
        };
        if latest.insert(key, raw).is_some() {
            stats.superseded += 1;
        }
    }
    if stats.superseded > 0 {
        debug!("{} raw records superseded by later deliveries", stats.superseded);
    }

    let mut records = Vec::with_capacity(latest.len());
    let mut rejected = Vec::new();
    for raw in latest.into_values() {
        match normalize_record(raw) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("{}", e);
                rejected.push(e);
            }
        }
    }

    stats.rejected = rejected.len();
    stats.normalized = records.len();
    info!(
        "Normalized {} of {} raw records ({} superseded, {} rejected)",
        stats.normalized, stats.raw_records, stats.superseded, stats.rejected
    );

    NormalizationOutcome {
        records,
        rejected,
        stats,
    }
}

/// Canonicalizes a single record.
pub fn normalize_record(raw: RawRecord) -> Result<NormalizedRecord, CoreError> {
    let source = raw.source.trim().to_string();
    let source_id = raw.source_id.trim().to_string();
    let reject = |reason| CoreError::RecordRejected {
        source_name: source.clone(),
        source_id: source_id.clone(),
        reason,
    };

    if source_id.is_empty() {
        return Err(reject(RejectReason::MissingSourceId));
    }
    let title = raw
        .title
        .as_deref()
        .map(clean_display)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| reject(RejectReason::MissingTitle))?;
    let title_key = normalize_title_key(&title);

    let mut seen_keys: HashSet<String> = HashSet::new();
    seen_keys.insert(title_key.clone());
    let mut alt_titles = Vec::new();
    let mut alt_title_keys = Vec::new();
    for alt in &raw.alt_titles {
        let display = clean_display(alt);
        if display.is_empty() {
            continue;
        }
        let key = normalize_title_key(&display);
        if key.is_empty() && display == title {
            continue;
        }
        if !key.is_empty() && !seen_keys.insert(key.clone()) {
            continue;
        }
        alt_titles.push(display);
        alt_title_keys.push(key);
    }

    let tags = normalize_tags(&raw.tags);
    let synopsis = raw.synopsis.as_deref().map(clean_display).unwrap_or_default();
    let origin_language = raw
        .origin_language
        .as_deref()
        .map(|l| l.trim().to_lowercase().replace('_', "-"))
        .filter(|l| !l.is_empty());
    let official_link = raw.official_link.as_deref().and_then(parse_http_url);
    let cover_art = raw
        .cover_art
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let combined_text = combine_text(&title, &alt_titles, &tags, std::iter::once(synopsis.as_str()));

    Ok(NormalizedRecord {
        source_ref: SourceRef { source, source_id },
        title,
        title_key,
        alt_titles,
        alt_title_keys,
        tags,
        synopsis,
        popularity: raw.popularity,
        origin_language,
        year: raw.year,
        rating: raw.rating.filter(|r| r.is_finite()),
        cover_art,
        official_link,
        combined_text,
    })
}

/// Trimmed, case-insensitively distinct, sorted tags.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut by_key: BTreeMap<String, String> = BTreeMap::new();
    for tag in tags {
        let cleaned = clean_display(tag);
        if cleaned.is_empty() {
            continue;
        }
        by_key.entry(cleaned.to_lowercase()).or_insert(cleaned);
    }
    let mut out: Vec<String> = by_key.into_values().collect();
    out.sort();
    out
}

/// Joins title, alternate titles, tags and synopses with single spaces, skipping blanks.
pub fn combine_text<'a>(
    title: &'a str,
    alt_titles: &'a [String],
    tags: &'a [String],
    synopses: impl IntoIterator<Item = &'a str>,
) -> String {
    std::iter::once(title)
        .chain(alt_titles.iter().map(String::as_str))
        .chain(tags.iter().map(String::as_str))
        .chain(synopses)
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_http_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url.to_string()),
        _ => None,
    }
}
