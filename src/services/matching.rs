//! Résumé-to-posting similarity.
//!
//! Each comparison fits a TF-IDF model on the two-document corpus
//! `{description, cv}` (unigrams and bigrams, at most [`MAX_FEATURES`]
//! terms, English and French stop words removed) and returns the cosine
//! similarity as a percentage with one decimal.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

/// Vocabulary cap, keeping the most frequent terms.
pub const MAX_FEATURES: usize = 1000;

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9\s]").expect("static regex is valid"));
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\w\w+\b").expect("static regex is valid"));

const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "by", "for", "from", "has", "he", "in",
    "is", "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "would", "you",
    "your", "yours", "yourself", "yourselves", "i", "me", "my", "myself", "we", "our", "ours",
    "ourselves", "they", "them", "their", "theirs", "themselves", "what", "which", "who", "whom",
    "this", "these", "those", "am", "were", "being", "have", "had", "having", "do", "does", "did",
    "doing", "can", "could", "should", "ought", "now", "about", "above", "after", "again",
    "against", "all", "any", "both", "each", "few", "more", "most", "other", "some", "such", "no",
    "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s", "t", "just", "don",
];

const FRENCH_STOP_WORDS: &[&str] = &[
    "le", "la", "les", "un", "une", "des", "de", "du", "et", "ce", "il", "elle", "ils", "elles",
    "je", "tu", "nous", "vous", "te", "se", "lui", "leur", "mon", "ma", "mes", "ton", "ta", "tes",
    "son", "sa", "ses", "notre", "nos", "votre", "vos", "leurs", "qui", "que", "quoi", "dont",
    "comment", "quand", "pourquoi", "est", "sont", "avoir", "ai", "avons", "avez", "ont", "eu",
    "eue", "eues", "eus", "eut", "eurent", "suis", "es", "sommes", "fus", "fut", "furent",
    "serai", "seras", "sera", "serons", "serez", "seront", "serais", "serait", "serions",
    "seriez", "seraient", "aurai", "auras", "aura", "aurons", "aurez", "auront", "aurais",
    "aurait", "aurions", "auriez", "auraient", "dans", "sur", "avec", "par", "pour", "sans",
    "sous", "vers", "chez", "contre", "entre", "parmi", "pendant", "selon", "si", "comme",
    "lorsque", "puisque", "car", "mais", "ou", "donc", "or", "ni", "soit", "plus", "moins",
    "aussi", "encore", "toujours", "jamais", "souvent", "parfois", "quelquefois", "bien", "mal",
    "mieux", "pire", "peut", "peuvent", "pouvez", "pouvons", "puis", "pourrai", "pourras",
    "pourra", "pourrons", "pourrez", "pourront", "pourrais", "pourrait", "pourrions",
    "pourriez", "pourraient", "veux", "veut", "voulons", "voulez", "veulent", "voudrai",
    "voudras", "voudra", "voudrons", "voudrez", "voudront", "voudrais", "voudrait",
    "voudrions", "voudriez", "voudraient",
];

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    ENGLISH_STOP_WORDS
        .iter()
        .chain(FRENCH_STOP_WORDS)
        .copied()
        .collect()
});

/// Lowercase, replace anything outside `[a-z0-9\s]` with a space, squeeze whitespace.
pub fn preprocess(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned = NON_ALNUM.replace_all(&lowered, " ");
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Unigrams and bigrams over the stop-word-free token stream.
fn terms(clean: &str) -> Vec<String> {
    let tokens: Vec<&str> = TOKEN
        .find_iter(clean)
        .map(|m| m.as_str())
        .filter(|t| !STOP_WORDS.contains(t))
        .collect();

    let mut out: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    out.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    out
}

fn counts(terms: &[String]) -> HashMap<&str, f64> {
    let mut counts = HashMap::new();
    for term in terms {
        *counts.entry(term.as_str()).or_insert(0.0) += 1.0;
    }
    counts
}

/// Most frequent terms across both documents, ties broken alphabetically.
fn vocabulary<'a>(a: &HashMap<&'a str, f64>, b: &HashMap<&'a str, f64>) -> Vec<&'a str> {
    let mut totals: HashMap<&str, f64> = a.clone();
    for (term, n) in b {
        *totals.entry(*term).or_insert(0.0) += n;
    }
    let mut vocab: Vec<(&str, f64)> = totals.into_iter().collect();
    vocab.sort_by(|x, y| y.1.total_cmp(&x.1).then_with(|| x.0.cmp(y.0)));
    vocab.truncate(MAX_FEATURES);
    vocab.into_iter().map(|(t, _)| t).collect()
}

/// L2-normalised TF-IDF vector over `vocab` with smoothed IDF.
fn weights(doc: &HashMap<&str, f64>, other: &HashMap<&str, f64>, vocab: &[&str]) -> Vec<f64> {
    // n = 2 documents: idf = ln((1 + n) / (1 + df)) + 1
    let mut v: Vec<f64> = vocab
        .iter()
        .map(|term| {
            let tf = doc.get(term).copied().unwrap_or(0.0);
            let df = [doc, other].iter().filter(|d| d.contains_key(term)).count() as f64;
            tf * ((3.0 / (1.0 + df)).ln() + 1.0)
        })
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Similarity between a posting description and a résumé, in `[0, 100]`.
///
/// Returns 0.0 when either text is empty after preprocessing or shares no
/// vocabulary with the other.
pub fn match_percentage(description: &str, cv: &str) -> f64 {
    let (desc_clean, cv_clean) = (preprocess(description), preprocess(cv));
    if desc_clean.is_empty() || cv_clean.is_empty() {
        return 0.0;
    }

    let (desc_terms, cv_terms) = (terms(&desc_clean), terms(&cv_clean));
    let (desc_counts, cv_counts) = (counts(&desc_terms), counts(&cv_terms));
    let vocab = vocabulary(&desc_counts, &cv_counts);
    if vocab.is_empty() {
        return 0.0;
    }

    let a = weights(&desc_counts, &cv_counts, &vocab);
    let b = weights(&cv_counts, &desc_counts, &vocab);
    let cosine: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();

    ((cosine * 1000.0).round() / 10.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_strips_punctuation() {
        assert_eq!(preprocess("  Rust/Tokio, C++!\n\tSQL "), "rust tokio c sql");
        assert_eq!(preprocess("Développeur"), "d veloppeur");
    }

    #[test]
    fn test_terms_drop_stop_words_and_add_bigrams() {
        let t = terms("the rust and tokio developer");
        assert_eq!(
            t,
            vec!["rust", "tokio", "developer", "rust tokio", "tokio developer"]
        );
    }

    #[test]
    fn test_identical_texts_score_100() {
        let text = "Senior Rust engineer building async services with Tokio";
        assert_eq!(match_percentage(text, text), 100.0);
    }

    #[test]
    fn test_disjoint_texts_score_0() {
        assert_eq!(match_percentage("rust tokio axum", "python django flask"), 0.0);
    }

    #[test]
    fn test_empty_side_scores_0() {
        assert_eq!(match_percentage("", "rust"), 0.0);
        assert_eq!(match_percentage("rust", "   "), 0.0);
        assert_eq!(match_percentage("the and of", "rust"), 0.0);
    }

    #[test]
    fn test_partial_overlap_is_between_bounds() {
        let score = match_percentage(
            "Rust backend engineer, Kubernetes and PostgreSQL",
            "Backend engineer with Go and PostgreSQL experience",
        );
        assert!(score > 0.0 && score < 100.0, "score = {}", score);
        assert_eq!(score, (score * 10.0).round() / 10.0);
    }
}
