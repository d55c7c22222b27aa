//! Word stemming used for the stemmed half of a search-term summary.

/// Reduces a word to its stem.
pub trait Stemmer: Send + Sync {
    fn stem(&self, word: &str) -> String;
}

/// A light English suffix stripper.
///
/// Lowercases the word, then removes plural and `-ed` / `-ing` endings.
/// Words of three characters or fewer are only lowercased.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishStemmer;

impl Stemmer for EnglishStemmer {
    fn stem(&self, word: &str) -> String {
        let word = word.to_lowercase();
        if word.chars().count() <= 3 {
            return word;
        }
        let word = strip_plural(word);
        strip_verb_suffix(word)
    }
}

fn strip_plural(word: String) -> String {
    if word.ends_with("sses") {
        return word[..word.len() - 2].to_owned();
    }
    if word.ends_with("ies") && word.len() > 4 {
        return format!("{}y", &word[..word.len() - 3]);
    }
    for suffix in ["xes", "ches", "shes", "zes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_owned();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_owned();
    }
    word
}

fn strip_verb_suffix(word: String) -> String {
    for suffix in ["ing", "ed"] {
        let Some(stem) = word.strip_suffix(suffix) else {
            continue;
        };
        if stem.len() < 3 || !stem.chars().any(is_vowel) {
            return word;
        }
        return undouble(stem);
    }
    word
}

/// `running` -> `runn` -> `run`, but `falling` keeps its `ll`.
fn undouble(stem: &str) -> String {
    let mut chars = stem.chars().rev();
    match (chars.next(), chars.next()) {
        (Some(a), Some(b)) if a == b && !is_vowel(a) && !matches!(a, 'l' | 's' | 'z') => {
            stem[..stem.len() - a.len_utf8()].to_owned()
        }
        _ => stem.to_owned(),
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')
}
