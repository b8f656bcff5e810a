use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::MatcherConfig;

const PHONETIC_CODE_MAX_LEN: usize = 10;
const TRIGRAM_WIDTH: usize = 3;

/// Per-pair similarity signals; `FuzzyMatcher::is_match` turns them into
/// the accept/reject decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub edit_similarity: f64,
    pub phonetic_match: bool,
    pub trigram_similarity: f64,
}

/// Normalized-name similarity scoring: edit distance, phonetic skeleton,
/// trigram overlap. Thresholds come from configuration so they can be tuned
/// without touching matcher logic.
#[derive(Debug, Clone)]
pub struct FuzzyMatcher {
    config: MatcherConfig,
}

impl FuzzyMatcher {
    #[must_use]
    pub const fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn score(&self, a: &str, b: &str) -> MatchScore {
        let code_a = phonetic_code(a);
        let code_b = phonetic_code(b);
        MatchScore {
            edit_similarity: edit_similarity(a, b),
            phonetic_match: !code_a.is_empty() && code_a == code_b,
            trigram_similarity: trigram_similarity(&trigrams(a), &trigrams(b)),
        }
    }

    #[must_use]
    pub fn is_match(&self, score: &MatchScore) -> bool {
        score.edit_similarity >= self.config.edit_similarity_threshold
            || (score.phonetic_match
                && score.trigram_similarity >= self.config.trigram_threshold)
    }

    #[must_use]
    pub fn matches(&self, a: &str, b: &str) -> bool {
        self.is_match(&self.score(a, b))
    }
}

/// `1 - levenshtein/max(len)`; 0.0 when both sides are empty so blank
/// queries never match anything.
#[must_use]
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    let distance = strsim::levenshtein(a, b);
    1.0 - distance as f64 / max_len as f64
}

/// Consonant-skeleton code: first letter kept, later vowels dropped,
/// repeated letters collapsed, a few digraphs folded (PH/CK/SH/CH).
/// Computed on the space-stripped string, truncated to ten characters.
#[must_use]
pub fn phonetic_code(text: &str) -> String {
    let compact = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    let mut chars = compact.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut skeleton = String::with_capacity(compact.len());
    skeleton.push(first);
    for c in chars {
        if !matches!(c, 'A' | 'E' | 'I' | 'O' | 'U') {
            skeleton.push(c);
        }
    }

    let mut collapsed = String::with_capacity(skeleton.len());
    for c in skeleton.chars() {
        if collapsed.chars().next_back() != Some(c) {
            collapsed.push(c);
        }
    }

    collapsed
        .replace("PH", "F")
        .replace("CK", "K")
        .replace("SH", "X")
        .replace("CH", "X")
        .chars()
        .take(PHONETIC_CODE_MAX_LEN)
        .collect()
}

/// 3-character shingles of the space-stripped string. Shorter non-empty
/// strings are right-padded so one/two-character names still produce a
/// shingle.
#[must_use]
pub fn trigrams(text: &str) -> BTreeSet<String> {
    let mut compact = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>();
    if compact.is_empty() {
        return BTreeSet::new();
    }
    while compact.chars().count() < TRIGRAM_WIDTH {
        compact.push(' ');
    }
    let chars = compact.chars().collect::<Vec<_>>();
    chars
        .windows(TRIGRAM_WIDTH)
        .map(|window| window.iter().collect())
        .collect()
}

/// Jaccard overlap of two shingle sets.
#[must_use]
pub fn trigram_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::{FuzzyMatcher, MatchScore, edit_similarity, phonetic_code, trigram_similarity, trigrams};
    use crate::config::MatcherConfig;

    fn matcher() -> FuzzyMatcher {
        FuzzyMatcher::new(MatcherConfig::default())
    }

    #[test]
    fn identical_names_match() {
        assert!(matcher().matches("sangotedo", "sangotedo"));
    }

    #[test]
    fn single_edit_on_a_long_name_passes_edit_similarity() {
        let m = matcher();
        let score = m.score("sangotedo", "sangoteddo");
        assert!(score.edit_similarity >= 0.8);
        assert!(m.is_match(&score));
    }

    #[test]
    fn agege_does_not_match_ajah() {
        let m = matcher();
        let score = m.score("agege", "ajah");
        assert!(score.edit_similarity < 0.8, "edit {}", score.edit_similarity);
        assert!(
            score.trigram_similarity < 0.6,
            "trigram {}",
            score.trigram_similarity
        );
        assert!(!m.is_match(&score));
    }

    #[test]
    fn appended_district_token_is_not_a_fuzzy_match() {
        // "sangotedo" vs "sangotedo ajah": trigram overlap clears the bar
        // but the phonetic codes differ, so the strict rule rejects it.
        // The expanded-spatial layer's token-overlap rule covers this pair.
        let m = matcher();
        let score = m.score("sangotedo", "sangotedo ajah");
        assert!(score.edit_similarity < 0.8);
        assert!(score.trigram_similarity >= 0.6);
        assert!(!score.phonetic_match);
        assert!(!m.is_match(&score));
    }

    #[test]
    fn phonetic_and_trigram_agreement_is_accepted_without_edit_similarity() {
        let m = matcher();
        let score = MatchScore {
            edit_similarity: 0.5,
            phonetic_match: true,
            trigram_similarity: 0.65,
        };
        assert!(m.is_match(&score));
        let phonetic_only = MatchScore {
            edit_similarity: 0.5,
            phonetic_match: true,
            trigram_similarity: 0.4,
        };
        assert!(!m.is_match(&phonetic_only));
    }

    #[test]
    fn both_empty_is_a_non_match() {
        let m = matcher();
        let score = m.score("", "");
        assert_eq!(score.edit_similarity, 0.0);
        assert!(!m.is_match(&score));
    }

    #[test]
    fn phonetic_code_keeps_first_vowel_and_folds_digraphs() {
        assert_eq!(phonetic_code("sangotedo"), "SNGTD");
        assert_eq!(phonetic_code("ajah"), "AJH");
        assert_eq!(phonetic_code("check"), "XK");
        assert_eq!(phonetic_code(""), "");
        // Spaces are stripped before encoding.
        assert_eq!(phonetic_code("abc def"), phonetic_code("abcdef"));
    }

    #[test]
    fn phonetic_code_collapses_repeated_letters() {
        assert_eq!(phonetic_code("maryland estate"), phonetic_code("marylands estate"));
    }

    #[test]
    fn trigrams_ignore_spaces_and_pad_short_names() {
        let set = trigrams("sangotedo");
        assert_eq!(set.len(), 7);
        assert!(set.contains("san"));
        assert!(set.contains("edo"));
        assert_eq!(trigrams("vi").len(), 1);
        assert!(trigrams("").is_empty());
        assert_eq!(trigrams("lekki phase"), trigrams("lekkiphase"));
    }

    #[test]
    fn trigram_similarity_is_jaccard_overlap() {
        let a = trigrams("sangotedo");
        let b = trigrams("sangotedo ajah");
        let sim = trigram_similarity(&a, &b);
        assert!((sim - 7.0 / 11.0).abs() < 1e-9);
        assert_eq!(trigram_similarity(&a, &trigrams("")), 0.0);
    }

    #[test]
    fn thresholds_are_configuration_not_constants() {
        let strict = FuzzyMatcher::new(MatcherConfig {
            edit_similarity_threshold: 0.95,
            trigram_threshold: 0.9,
        });
        assert!(!strict.matches("sangotedo", "sangoteddo"));
    }

    #[test]
    fn edit_similarity_boundaries() {
        assert_eq!(edit_similarity("", ""), 0.0);
        assert_eq!(edit_similarity("abcd", "abcd"), 1.0);
        assert!((edit_similarity("agege", "ajah") - 0.2).abs() < 1e-9);
    }
}
