// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text normalization and whole-word phrase matching shared by the classifiers.

/// Lowercase, keep letters, digits and apostrophes, collapse everything
/// else to single spaces.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether `phrase` occurs in `normalized` on word boundaries.
/// `phrase` is normalized first, so `"what's up"` and `"good-morning"` work.
pub fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let phrase = normalize(phrase);
    if phrase.is_empty() {
        return false;
    }
    let haystack = format!(" {normalized} ");
    haystack.contains(&format!(" {phrase} "))
}

/// Number of phrases from `phrases` present in `normalized`.
pub fn count_phrases<S: AsRef<str>>(normalized: &str, phrases: &[S]) -> usize {
    phrases
        .iter()
        .filter(|p| contains_phrase(normalized, p.as_ref()))
        .count()
}

/// Whether any phrase from `phrases` is present in `normalized`.
pub fn any_phrase<S: AsRef<str>>(normalized: &str, phrases: &[S]) -> bool {
    phrases.iter().any(|p| contains_phrase(normalized, p.as_ref()))
}
