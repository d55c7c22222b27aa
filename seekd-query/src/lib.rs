//! # seekd-query
//!
//! Query model and query-language preparation for the seekd daemon.
//!
//! A [`Query`] is an ordered list of [`QueryPart`]s. Clients usually send a
//! single free-text ("human") part; before a query is handed to any backend
//! it is prepared in two steps:
//!
//! 1. [`normalize`] expands every human part in place, including parts
//!    nested in or-groups, using a [`QueryStringParser`] (by default
//!    [`SimpleQueryParser`]).
//! 2. [`TermExtractor::summarize`] derives a [`SearchTermSummary`]: the
//!    query's phrases with stop words removed, plus a stemmed copy.
//!
//! ## Example
//!
//! ```
//! use seekd_query::{normalize, Query, SimpleQueryParser, TermExtractor};
//!
//! let mut query = Query::from_text(r#""the quick fox" -lazy"#);
//! normalize(&mut query, &SimpleQueryParser);
//! let summary = TermExtractor::default().summarize(&query);
//! assert_eq!(summary.exact, ["quick fox"]);
//! ```

pub mod normalize;
pub mod parser;
pub mod stemmer;
pub mod terms;
pub mod types;

pub use normalize::normalize;
pub use parser::{QueryStringParser, SimpleQueryParser};
pub use stemmer::{EnglishStemmer, Stemmer};
pub use terms::{StopWords, TermExtractor, ENGLISH_STOP_WORDS};
pub use types::{
    PartKind, PartLogic, Query, QueryDomain, QueryPart, SearchTermSummary, DEFAULT_MAX_HITS,
};
