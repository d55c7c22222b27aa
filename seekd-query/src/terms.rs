//! Search-term summaries: the exact and stemmed text a query looks for.
//!
//! The summary is computed once per query, after normalization and before
//! any backend is consulted, so callers can highlight matches in hits as
//! they stream in.

use std::collections::HashSet;
use std::sync::Arc;

use crate::stemmer::{EnglishStemmer, Stemmer};
use crate::types::{PartKind, PartLogic, Query, QueryPart, SearchTermSummary};

/// The English stop-word list used when no other list is configured.
pub const ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// A case-insensitive set of words excluded from search-term summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopWords {
    words: HashSet<String>,
}

impl StopWords {
    /// Build a list from arbitrary words. Matching ignores case.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// An empty list; nothing is treated as a stop word.
    pub fn none() -> Self {
        Self {
            words: HashSet::new(),
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for StopWords {
    fn default() -> Self {
        Self::new(ENGLISH_STOP_WORDS)
    }
}

/// Computes [`SearchTermSummary`] values for normalized queries.
#[derive(Clone)]
pub struct TermExtractor {
    stop_words: StopWords,
    stemmer: Arc<dyn Stemmer>,
}

impl Default for TermExtractor {
    fn default() -> Self {
        Self::new(StopWords::default(), Arc::new(EnglishStemmer))
    }
}

impl std::fmt::Debug for TermExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermExtractor")
            .field("stop_words", &self.stop_words.len())
            .finish_non_exhaustive()
    }
}

impl TermExtractor {
    pub fn new(stop_words: StopWords, stemmer: Arc<dyn Stemmer>) -> Self {
        Self {
            stop_words,
            stemmer,
        }
    }

    pub fn stop_words(&self) -> &StopWords {
        &self.stop_words
    }

    /// Summarize the text parts of `query`.
    ///
    /// Prohibited parts are skipped and or-groups are walked recursively.
    /// Every remaining text part contributes exactly one exact and one
    /// stemmed entry, even when all of its words are stop words, so the two
    /// lists stay parallel.
    ///
    /// Human parts contribute nothing; run [`crate::normalize`] first.
    pub fn summarize(&self, query: &Query) -> SearchTermSummary {
        let mut summary = SearchTermSummary::default();
        for part in query.parts() {
            self.add_part(part, &mut summary);
        }
        summary
    }

    fn add_part(&self, part: &QueryPart, summary: &mut SearchTermSummary) {
        if part.logic == PartLogic::Prohibited {
            return;
        }

        match &part.kind {
            PartKind::Or { parts } => {
                for sub_part in parts {
                    self.add_part(sub_part, summary);
                }
            }
            PartKind::Text { text } => {
                let words: Vec<&str> = text
                    .split_whitespace()
                    .filter(|w| !self.stop_words.contains(w))
                    .collect();
                summary.exact.push(words.join(" "));
                summary.stemmed.push(
                    words
                        .iter()
                        .map(|w| self.stemmer.stem(w))
                        .collect::<Vec<_>>()
                        .join(" "),
                );
            }
            PartKind::Human { text } => {
                tracing::trace!(text = %text, "human part left out of term summary");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    /// Upper-cases every word so tests can tell stemmed output apart.
    struct ShoutingStemmer;

    impl Stemmer for ShoutingStemmer {
        fn stem(&self, word: &str) -> String {
            word.to_uppercase()
        }
    }

    fn extractor(stop_words: &[&str]) -> TermExtractor {
        TermExtractor::new(StopWords::new(stop_words), Arc::new(ShoutingStemmer))
    }

    #[test]
    fn default_stop_words_cover_common_english() {
        let words = StopWords::default();
        assert!(words.contains("the"));
        assert!(words.contains("The"));
        assert!(!words.contains("fox"));
        assert_eq!(words.len(), ENGLISH_STOP_WORDS.len());
    }

    #[test]
    fn stop_words_ignore_blank_entries() {
        let words = StopWords::new(["", "  ", "A"]);
        assert_eq!(words.len(), 1);
        assert!(words.contains("a"));
    }

    #[test]
    fn the_quick_fox() {
        let query = Query::new().with_part(QueryPart::text("the quick fox"));
        let summary = extractor(&["the"]).summarize(&query);
        assert_eq!(summary.exact, ["quick fox"]);
        assert_eq!(summary.stemmed, ["QUICK FOX"]);
    }

    #[test]
    fn prohibited_parts_are_skipped() {
        let query = Query::new()
            .with_part(QueryPart::text("fox"))
            .with_part(QueryPart::text("dog").with_logic(PartLogic::Prohibited));
        let summary = extractor(&[]).summarize(&query);
        assert_eq!(summary.exact, ["fox"]);
    }

    #[test]
    fn or_groups_are_walked() {
        let query = Query::new().with_part(QueryPart::or(vec![
            QueryPart::text("cat").with_logic(PartLogic::Optional),
            QueryPart::text("dog").with_logic(PartLogic::Prohibited),
            QueryPart::text("bird").with_logic(PartLogic::Optional),
        ]));
        let summary = extractor(&[]).summarize(&query);
        assert_eq!(summary.exact, ["cat", "bird"]);
        assert_eq!(summary.stemmed, ["CAT", "BIRD"]);
    }

    #[test]
    fn prohibited_or_group_contributes_nothing() {
        let query = Query::new().with_part(
            QueryPart::or(vec![QueryPart::text("cat")]).with_logic(PartLogic::Prohibited),
        );
        let summary = extractor(&[]).summarize(&query);
        assert!(summary.is_empty());
    }

    #[test]
    fn all_stop_word_part_keeps_lists_parallel() {
        let query = Query::new()
            .with_part(QueryPart::text("the"))
            .with_part(QueryPart::text("fox"));
        let summary = extractor(&["the"]).summarize(&query);
        assert_eq!(summary.exact, ["", "fox"]);
        assert_eq!(summary.stemmed.len(), summary.exact.len());
    }

    #[test]
    fn human_parts_are_left_out() {
        let query = Query::from_text("quick fox").with_part(QueryPart::text("dog"));
        let summary = extractor(&[]).summarize(&query);
        assert_eq!(summary.exact, ["dog"]);
        assert_eq!(summary.stemmed, ["DOG"]);
    }

    #[test]
    fn nested_human_part_is_left_out() {
        let query = Query::new().with_part(QueryPart::or(vec![
            QueryPart::human("fox"),
            QueryPart::text("cat"),
        ]));
        let summary = extractor(&[]).summarize(&query);
        assert_eq!(summary.exact, ["cat"]);
    }

    #[test]
    fn summarize_does_not_mutate() {
        let query = Query::new().with_part(QueryPart::text("the quick fox"));
        let before = query.clone();
        let _ = TermExtractor::default().summarize(&query);
        assert_eq!(query, before);
    }

    #[test]
    fn default_extractor_uses_english_stemmer() {
        let query = Query::new().with_part(QueryPart::text("the running foxes"));
        let summary = TermExtractor::default().summarize(&query);
        assert_eq!(summary.exact, ["running foxes"]);
        assert_eq!(summary.stemmed, ["run fox"]);
    }
}
