// src/consolidation/golden_record.rs
// Golden Record Builder: merges each equivalence class into one canonical record.

use log::{debug, info, warn};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::clustering::{EquivalenceClass, Resolution};
use crate::matching::normalizer::{combine_text, normalize_tags};
use crate::models::{GoldenRecord, NormalizedRecord, SourceRef};

/// Hex characters kept from the sha256 digest for a golden id.
const GOLDEN_ID_HEX_LEN: usize = 16;

/// True when `language` is one of `preferred`, or a regional variant of one ("zh-tw" for "zh").
pub fn is_preferred_language(language: Option<&str>, preferred: &[String]) -> bool {
    match language {
        Some(lang) => preferred.iter().any(|p| {
            lang == p || (lang.len() > p.len() && lang.starts_with(p.as_str()) && lang[p.len()..].starts_with('-'))
        }),
        None => false,
    }
}

/// Total order used to pick the canonical member: preferred origin language first, then
/// highest popularity, then shortest title, then title key, then source ref.
pub fn canonical_order(a: &NormalizedRecord, b: &NormalizedRecord, preferred: &[String]) -> Ordering {
    let a_pref = is_preferred_language(a.origin_language.as_deref(), preferred);
    let b_pref = is_preferred_language(b.origin_language.as_deref(), preferred);
    b_pref
        .cmp(&a_pref)
        .then_with(|| b.popularity.cmp(&a.popularity))
        .then_with(|| a.title.chars().count().cmp(&b.title.chars().count()))
        .then_with(|| a.title_key.cmp(&b.title_key))
        .then_with(|| a.source_ref.cmp(&b.source_ref))
}

/// Stable id: leading bytes of sha256 over the canonical key (or the display title when the key is empty).
pub fn golden_id(canonical_key: &str, canonical_title: &str) -> String {
    let seed = if canonical_key.is_empty() {
        canonical_title
    } else {
        canonical_key
    };
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..GOLDEN_ID_HEX_LEN].to_string()
}

/// Id for classes whose canonical key collides with another class: the member refs are
/// hashed in as well, so both ids stay stable across rebuilds.
fn disambiguated_id(canonical_key: &str, canonical_title: &str, sources: &[SourceRef]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_key.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_title.as_bytes());
    for source in sources {
        hasher.update(b"\n");
        hasher.update(source.to_string().as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    digest[..GOLDEN_ID_HEX_LEN].to_string()
}

/// Merges one class. `members` must be non-empty.
pub fn build_golden_record(members: &[&NormalizedRecord], preferred_languages: &[String]) -> Option<GoldenRecord> {
    let canonical = members
        .iter()
        .copied()
        .min_by(|a, b| canonical_order(a, b, preferred_languages))?;

    // canonical first, then the rest in their (source, source_id) order
    let mut ordered: Vec<&NormalizedRecord> = Vec::with_capacity(members.len());
    ordered.push(canonical);
    let mut rest: Vec<&NormalizedRecord> = members
        .iter()
        .copied()
        .filter(|m| m.source_ref != canonical.source_ref)
        .collect();
    rest.sort_by(|a, b| a.source_ref.cmp(&b.source_ref));
    ordered.extend(rest);

    let mut seen_keys: HashSet<&str> = HashSet::new();
    let mut seen_unkeyed: HashSet<&str> = HashSet::new();
    seen_keys.insert(canonical.title_key.as_str());
    seen_unkeyed.insert(canonical.title.as_str());
    let mut alt_titles = Vec::new();
    let mut alt_title_keys = Vec::new();
    for member in &ordered {
        let titles = std::iter::once((member.title.as_str(), member.title_key.as_str())).chain(
            member
                .alt_titles
                .iter()
                .map(String::as_str)
                .zip(member.alt_title_keys.iter().map(String::as_str)),
        );
        for (display, key) in titles {
            let fresh = if key.is_empty() {
                seen_unkeyed.insert(display)
            } else {
                seen_keys.insert(key)
            };
            if fresh {
                alt_titles.push(display.to_string());
                alt_title_keys.push(key.to_string());
            }
        }
    }

    let all_tags: Vec<String> = ordered.iter().flat_map(|m| m.tags.iter().cloned()).collect();
    let tags = normalize_tags(&all_tags);

    let mut synopses: Vec<String> = Vec::new();
    for member in &ordered {
        if !member.synopsis.is_empty() && !synopses.contains(&member.synopsis) {
            synopses.push(member.synopsis.clone());
        }
    }
    let description = synopses.first().cloned().unwrap_or_default();

    let combined_text = combine_text(
        &canonical.title,
        &alt_titles,
        &tags,
        synopses.iter().map(String::as_str),
    );

    let mut sources: Vec<SourceRef> = ordered.iter().map(|m| m.source_ref.clone()).collect();
    sources.sort();

    Some(GoldenRecord {
        id: golden_id(&canonical.title_key, &canonical.title),
        canonical_title: canonical.title.clone(),
        canonical_key: canonical.title_key.clone(),
        alt_titles,
        alt_title_keys,
        tags,
        description,
        synopses,
        combined_text,
        popularity: ordered.iter().map(|m| m.popularity).max().unwrap_or(0),
        origin_language: canonical.origin_language.clone(),
        year: ordered.iter().filter_map(|m| m.year).min(),
        rating: ordered
            .iter()
            .filter_map(|m| m.rating)
            .fold(None, |best: Option<f64>, r| Some(best.map_or(r, |b| b.max(r)))),
        cover_art: ordered.iter().find_map(|m| m.cover_art.clone()),
        official_link: ordered.iter().find_map(|m| m.official_link.clone()),
        sources,
    })
}

/// Builds one golden record per class, sorted by id.
pub fn build_golden_records(resolution: &Resolution, preferred_languages: &[String]) -> Vec<GoldenRecord> {
    let records = &resolution.records;
    let mut golden: Vec<GoldenRecord> = resolution
        .classes
        .iter()
        .filter_map(|class: &EquivalenceClass| {
            let members: Vec<&NormalizedRecord> = class.members.iter().map(|&m| &records[m]).collect();
            build_golden_record(&members, preferred_languages)
        })
        .collect();

    let mut by_id: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (idx, record) in golden.iter().enumerate() {
        by_id.entry(record.id.clone()).or_default().push(idx);
    }
    for (id, holders) in by_id.into_iter().filter(|(_, h)| h.len() > 1) {
        warn!(
            "{} golden records share id {} (canonical key collision); disambiguating by sources",
            holders.len(),
            id
        );
        for idx in holders {
            let record = &mut golden[idx];
            record.id = disambiguated_id(&record.canonical_key, &record.canonical_title, &record.sources);
        }
    }

    golden.sort_by(|a, b| a.id.cmp(&b.id));
    let merged = golden.iter().filter(|g| g.sources.len() > 1).count();
    info!(
        "Built {} golden records ({} merged from multiple sources)",
        golden.len(),
        merged
    );
    for record in golden.iter().filter(|g| g.sources.len() > 1) {
        debug!(
            "Golden {} '{}' <- {}",
            record.id,
            record.canonical_title,
            record
                .sources
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    golden
}
