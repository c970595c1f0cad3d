//! Text normalization and similarity primitives
//!
//! Every component keys and matches on the same normalized form, so cache
//! identity, keyword scoring, and similarity mining all agree on what a
//! message "is".

use unicode_normalization::UnicodeNormalization;

/// Punctuation stripped during normalization (includes Spanish inverted marks)
const PUNCTUATION: &[char] = &['¿', '?', '¡', '!', '.', ',', ';', ':', '(', ')'];

/// Normalize a message for keying and keyword matching
///
/// Lowercases, trims, collapses runs of whitespace to single spaces, strips
/// punctuation, and removes accents via NFD decomposition (combining marks
/// are dropped, so "Cuánto" and "cuanto" normalize identically).
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| !PUNCTUATION.contains(c))
        .collect();

    stripped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Unicode combining diacritical marks block (U+0300..=U+036F)
fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036f}').contains(&c)
}

/// Split normalized text into words
pub fn words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Jaccard word-set similarity between two texts
///
/// Operates on lowercased word sets. Returns 0.0 when both texts are empty.
pub fn jaccard(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;

    let set_a: HashSet<String> = a.to_lowercase().split_whitespace().map(String::from).collect();
    let set_b: HashSet<String> = b.to_lowercase().split_whitespace().map(String::from).collect();

    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();

    intersection as f64 / union as f64
}

/// Count words longer than `min_len` characters that `message` shares with
/// `reference`
///
/// Used by the implicit-feedback overlap heuristic: a user restating the
/// bot's own terms back usually means the answer did not land.
pub fn shared_long_words(message: &str, reference: &str, min_len: usize) -> usize {
    use std::collections::HashSet;

    let reference_words: HashSet<String> = reference
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();

    let message_words: HashSet<String> = message
        .to_lowercase()
        .split_whitespace()
        .map(String::from)
        .collect();

    message_words
        .iter()
        .filter(|w| w.chars().count() > min_len && reference_words.contains(*w))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_trims() {
        assert_eq!(normalize("  Hola Mundo  "), "hola mundo");
    }

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("¿Hola!! cómo, estás?"), "hola como estas");
    }

    #[test]
    fn test_normalize_strips_accents() {
        assert_eq!(normalize("Cuánto vale un depto"), "cuanto vale un depto");
        assert_eq!(normalize("tasación"), "tasacion");
    }

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("hola    \t  mundo"), "hola mundo");
    }

    #[test]
    fn test_normalize_matches_between_variants() {
        // Cache key normalization property: "Hola!!" and "hola" collide
        assert_eq!(normalize("Hola!!"), normalize("hola"));
    }

    #[test]
    fn test_normalize_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("   "), "");
    }

    #[test]
    fn test_jaccard_identical() {
        assert_eq!(jaccard("hola mundo", "hola mundo"), 1.0);
    }

    #[test]
    fn test_jaccard_disjoint() {
        assert_eq!(jaccard("hola mundo", "adios tierra"), 0.0);
    }

    #[test]
    fn test_jaccard_partial_overlap() {
        // {a, b} vs {b, c}: intersection 1, union 3
        let sim = jaccard("precio palermo", "precio belgrano");
        assert!((sim - 1.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_jaccard_both_empty() {
        assert_eq!(jaccard("", ""), 0.0);
    }

    #[test]
    fn test_shared_long_words_counts_only_long_matches() {
        let reference = "la comision del asesor depende de la operacion";
        // "comision" and "operacion" are shared and > 4 chars; "la" is short
        assert_eq!(
            shared_long_words("que comision tiene esa operacion", reference, 4),
            2
        );
    }

    #[test]
    fn test_shared_long_words_no_overlap() {
        assert_eq!(shared_long_words("gracias", "respuesta anterior", 4), 0);
    }

    mod properties {
        use super::super::normalize;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn normalize_is_idempotent(s in ".{0,200}") {
                let once = normalize(&s);
                prop_assert_eq!(normalize(&once), once);
            }

            #[test]
            fn normalize_never_yields_uppercase_ascii(s in ".{0,200}") {
                prop_assert!(!normalize(&s).chars().any(|c| c.is_ascii_uppercase()));
            }

            #[test]
            fn normalize_never_yields_double_spaces(s in ".{0,200}") {
                prop_assert!(!normalize(&s).contains("  "));
            }
        }
    }
}
