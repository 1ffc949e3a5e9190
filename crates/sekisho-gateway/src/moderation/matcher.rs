//! Deterministic keyword matcher — moderation tier 1.

use sekisho_store::PolicyWord;

/// Return the first policy word (in stored order) whose case-folded form
/// appears as a substring of the case-folded text.
///
/// Stored order is insertion order; no semantic priority is implied.
/// O(words × text length), fine for the small policy sets this runs on.
pub fn find_match<'a>(text: &str, words: &'a [PolicyWord]) -> Option<&'a PolicyWord> {
    let folded = text.to_lowercase();
    words.iter().find(|w| {
        let candidate = w.word.to_lowercase();
        !candidate.is_empty() && folded.contains(&candidate)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<PolicyWord> {
        list.iter().map(|w| PolicyWord::new(*w)).collect()
    }

    #[test]
    fn matches_case_insensitively() {
        let set = words(&["Bomb"]);
        let hit = find_match("how to build a BOMB today", &set).unwrap();
        // The stored casing is reported, not the text's.
        assert_eq!(hit.word, "Bomb");
    }

    #[test]
    fn matches_cjk_substring() {
        let set = words(&["暴力"]);
        assert!(find_match("これは暴力的な話です", &set).is_some());
    }

    #[test]
    fn first_stored_word_wins() {
        let set = words(&["beta", "alpha"]);
        let hit = find_match("alpha and beta both appear", &set).unwrap();
        assert_eq!(hit.word, "beta");
    }

    #[test]
    fn no_hit_returns_none() {
        let set = words(&["暴力"]);
        assert!(find_match("こんにちは", &set).is_none());
    }

    #[test]
    fn empty_words_never_match() {
        let set = words(&[""]);
        assert!(find_match("anything", &set).is_none());
    }

    #[test]
    fn empty_set_never_matches() {
        assert!(find_match("anything", &[]).is_none());
    }
}
