//! Fixed domain keyword set used both to pick a dialogue's dominant topic
//! (for summary extraction) and to seed a recall query's keywords (spec
//! §4.4). `rust-stemmers`/`stop-words` were considered and declined here:
//! the spec's matching is substring/token based, not a stemmed NLP
//! pipeline, so pulling in a stemmer would add a dependency with nothing to
//! do (see DESIGN.md).

pub const DOMAIN_KEYWORDS: &[&str] = &[
    "weather", "music", "food", "travel", "health", "sport", "technology",
    "movie", "book", "game", "work", "family", "shopping", "finance", "news",
    "school", "project", "holiday", "recipe", "exercise",
];

/// Extracts keywords from free text: the subset of `DOMAIN_KEYWORDS` that
/// appear as substrings, or (if none match) the first three whitespace
/// tokens, per spec §4.4 `query_memory` step 1.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let matched: Vec<String> = DOMAIN_KEYWORDS
        .iter()
        .filter(|kw| lower.contains(*kw))
        .map(|kw| kw.to_string())
        .collect();
    if !matched.is_empty() {
        return matched;
    }
    lower
        .split_whitespace()
        .take(3)
        .map(|s| s.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
