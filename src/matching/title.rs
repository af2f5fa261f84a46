// src/matching/title.rs
// Title canonicalization and the edit-distance similarity used by resolution and title boost.

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::normalized_levenshtein;

static MULTI_SPACE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"\s+").ok());

/// Trims and collapses internal whitespace, keeping case and punctuation.
pub fn clean_display(text: &str) -> String {
    match MULTI_SPACE.as_ref() {
        Some(re) => re.replace_all(text.trim(), " ").into_owned(),
        None => text.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}

/// Comparison key for a title: lower-cased, `&` spelled out, apostrophes dropped,
/// every other non-alphanumeric character folded to a space, whitespace collapsed.
///
/// A title made only of symbols yields an empty key.
pub fn normalize_title_key(title: &str) -> String {
    let lowered = title.to_lowercase().replace('&', " and ");
    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        match c {
            '\'' | '\u{2019}' => {}
            c if c.is_alphanumeric() || c.is_whitespace() => folded.push(c),
            _ => folded.push(' '),
        }
    }
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized Levenshtein similarity of two comparison keys in [0, 1].
/// Empty keys carry no evidence and never match anything.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    normalized_levenshtein(a, b)
}

/// Highest similarity over every pairing of the two key sets.
pub fn best_title_similarity<'a, 'b>(
    keys_a: impl IntoIterator<Item = &'a str>,
    keys_b: impl IntoIterator<Item = &'b str> + Clone,
) -> f64 {
    let mut best = 0.0_f64;
    for a in keys_a {
        for b in keys_b.clone() {
            let sim = title_similarity(a, b);
            if sim > best {
                best = sim;
                if best >= 1.0 {
                    return best;
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_title_key() {
        assert_eq!(normalize_title_key("  Solo   Leveling "), "solo leveling");
        assert_eq!(normalize_title_key("Solo Leveling: Ragnarok"), "solo leveling ragnarok");
        assert_eq!(normalize_title_key("Spy×Family"), "spy family");
        assert_eq!(normalize_title_key("Hell's Paradise"), "hells paradise");
        assert_eq!(normalize_title_key("Love & Lies"), "love and lies");
        assert_eq!(normalize_title_key("나 혼자만 레벨업"), "나 혼자만 레벨업");
        assert_eq!(normalize_title_key("!!!"), "");
        assert_eq!(normalize_title_key("Re:Zero"), "re zero");
    }

    #[test]
    fn test_clean_display() {
        assert_eq!(clean_display("  Solo \t Leveling\n"), "Solo Leveling");
    }

    #[test]
    fn test_title_similarity() {
        assert_eq!(title_similarity("solo leveling", "solo leveling"), 1.0);
        assert_eq!(title_similarity("", ""), 0.0);
        let sim = title_similarity("solo leveling", "solo leveling ragnarok");
        assert!(sim < 0.85, "got {}", sim);
        let sim = title_similarity("tower of god", "tower of gods");
        assert!(sim >= 0.9, "got {}", sim);
    }

    #[test]
    fn test_best_title_similarity_takes_max() {
        let a = vec!["only i level up", "solo leveling"];
        let b = vec!["solo leveling"];
        assert_eq!(best_title_similarity(a.iter().copied(), b.iter().copied()), 1.0);
        let c = vec!["omniscient reader"];
        assert!(best_title_similarity(a.iter().copied(), c.iter().copied()) < 0.5);
    }
}
