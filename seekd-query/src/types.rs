//! Core types for structured queries and their search-term summaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Default cap on hits a backend should produce for one query.
pub const DEFAULT_MAX_HITS: usize = 100;

/// The scope of data a backend searches over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryDomain {
    /// Data belonging to the current user (home directory, mail, notes).
    Local,
    /// System-wide data shared by all users (documentation, man pages).
    System,
    /// Data reachable over the local network (neighbouring daemons).
    Network,
    /// Internet-scale sources.
    Global,
}

impl QueryDomain {
    /// Returns the lowercase name of this domain.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::System => "system",
            Self::Network => "network",
            Self::Global => "global",
        }
    }

    /// Domains a query allows when the caller does not say otherwise.
    pub fn defaults() -> BTreeSet<QueryDomain> {
        [Self::Local, Self::System].into_iter().collect()
    }
}

impl fmt::Display for QueryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a part contributes to matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartLogic {
    /// A hit must match this part.
    #[default]
    Required,
    /// Matching this part is optional (used for members of an or-group).
    Optional,
    /// A hit must not match this part.
    Prohibited,
}

/// The payload of a [`QueryPart`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartKind {
    /// A literal word or phrase.
    Text { text: String },
    /// Any one of the sub-parts satisfies the group.
    Or { parts: Vec<QueryPart> },
    /// Unparsed free text typed by a person, awaiting normalization.
    Human { text: String },
}

/// One element of a [`Query`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPart {
    pub logic: PartLogic,
    pub kind: PartKind,
}

impl QueryPart {
    /// A required text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            logic: PartLogic::Required,
            kind: PartKind::Text { text: text.into() },
        }
    }

    /// A required or-group over `parts`.
    pub fn or(parts: Vec<QueryPart>) -> Self {
        Self {
            logic: PartLogic::Required,
            kind: PartKind::Or { parts },
        }
    }

    /// A free-text part awaiting normalization.
    pub fn human(text: impl Into<String>) -> Self {
        Self {
            logic: PartLogic::Required,
            kind: PartKind::Human { text: text.into() },
        }
    }

    /// Returns this part with `logic` applied.
    #[must_use]
    pub fn with_logic(mut self, logic: PartLogic) -> Self {
        self.logic = logic;
        self
    }

    /// Returns `true` for unparsed free-text parts.
    pub fn is_human(&self) -> bool {
        matches!(self.kind, PartKind::Human { .. })
    }

    /// Returns `true` if this part or any part nested in it is free text.
    pub fn contains_human(&self) -> bool {
        match &self.kind {
            PartKind::Human { .. } => true,
            PartKind::Or { parts } => parts.iter().any(QueryPart::contains_human),
            PartKind::Text { .. } => false,
        }
    }
}

/// A structured search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    parts: Vec<QueryPart>,
    domains: BTreeSet<QueryDomain>,
    max_hits: usize,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            parts: Vec::new(),
            domains: QueryDomain::defaults(),
            max_hits: DEFAULT_MAX_HITS,
        }
    }
}

impl Query {
    /// An empty query over the default domains.
    pub fn new() -> Self {
        Self::default()
    }

    /// A query holding a single free-text part.
    pub fn from_text(text: impl Into<String>) -> Self {
        let mut query = Self::new();
        query.add_part(QueryPart::human(text));
        query
    }

    /// Appends a part.
    pub fn add_part(&mut self, part: QueryPart) {
        self.parts.push(part);
    }

    /// Builder-style variant of [`Query::add_part`].
    #[must_use]
    pub fn with_part(mut self, part: QueryPart) -> Self {
        self.add_part(part);
        self
    }

    /// Replaces every part.
    pub fn set_parts(&mut self, parts: Vec<QueryPart>) {
        self.parts = parts;
    }

    pub fn parts(&self) -> &[QueryPart] {
        &self.parts
    }

    /// Returns `true` if any part, at any depth, is still unparsed free text.
    pub fn has_human_parts(&self) -> bool {
        self.parts.iter().any(QueryPart::contains_human)
    }

    /// Restricts the query to exactly `domains`.
    #[must_use]
    pub fn with_domains(mut self, domains: impl IntoIterator<Item = QueryDomain>) -> Self {
        self.domains = domains.into_iter().collect();
        self
    }

    /// Adds `domain` to the set of allowed domains.
    pub fn allow_domain(&mut self, domain: QueryDomain) {
        self.domains.insert(domain);
    }

    /// Returns `true` if backends in `domain` may answer this query.
    pub fn allows_domain(&self, domain: QueryDomain) -> bool {
        self.domains.contains(&domain)
    }

    pub fn domains(&self) -> &BTreeSet<QueryDomain> {
        &self.domains
    }

    /// Maximum number of hits each backend should return.
    pub fn max_hits(&self) -> usize {
        self.max_hits
    }

    #[must_use]
    pub fn with_max_hits(mut self, max_hits: usize) -> Self {
        self.max_hits = max_hits;
        self
    }
}

/// Exact and stemmed renderings of the text a query searches for.
///
/// The two lists are parallel: entry `i` of `stemmed` is the stemmed form of
/// entry `i` of `exact`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTermSummary {
    /// Phrases with stop words removed.
    pub exact: Vec<String>,
    /// The same phrases with every remaining token stemmed.
    pub stemmed: Vec<String>,
}

impl SearchTermSummary {
    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }
}
