//! A minimal static index backed by a JSON manifest.
//!
//! The index directory holds one `seekd-index.json` file listing documents
//! and their text. It is loaded into memory when opened and answers queries
//! by case-insensitive phrase containment.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use seekd_query::{PartKind, PartLogic, Query, QueryPart};

use crate::backend::{BackendStatus, ChangeData, Queryable};
use crate::error::{BackendError, StaticIndexError};
use crate::hit::Hit;
use crate::loader::{BackendContext, StaticIndexOpener};
use crate::result::QueryWorker;

/// File name of the manifest inside an index directory.
pub const MANIFEST_FILE: &str = "seekd-index.json";

/// Manifest format this build reads and writes.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// One indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub uri: String,
    pub text: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// On-disk contents of a JSON index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub version: u32,
    #[serde(default)]
    pub documents: Vec<IndexDocument>,
}

impl IndexManifest {
    pub fn new(documents: Vec<IndexDocument>) -> Self {
        Self {
            version: INDEX_FORMAT_VERSION,
            documents,
        }
    }

    /// Read and validate the manifest in `dir`.
    pub fn load(dir: &Path) -> Result<Self, StaticIndexError> {
        let content = fs::read_to_string(dir.join(MANIFEST_FILE))?;
        let manifest: Self = serde_json::from_str(&content)
            .map_err(|e| StaticIndexError::Corrupt(e.to_string()))?;
        if manifest.version != INDEX_FORMAT_VERSION {
            return Err(StaticIndexError::VersionMismatch {
                found: manifest.version,
                expected: INDEX_FORMAT_VERSION,
            });
        }
        Ok(manifest)
    }

    /// Write the manifest into `dir`, creating the directory if needed.
    pub fn save(&self, dir: &Path) -> Result<(), StaticIndexError> {
        fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| StaticIndexError::Corrupt(e.to_string()))?;
        fs::write(dir.join(MANIFEST_FILE), content)?;
        Ok(())
    }
}

struct Entry {
    document: IndexDocument,
    folded: String,
}

/// An in-memory, read-only index.
pub struct JsonIndex {
    entries: Vec<Entry>,
}

impl std::fmt::Debug for JsonIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonIndex")
            .field("documents", &self.entries.len())
            .finish()
    }
}

impl JsonIndex {
    pub fn open(dir: &Path) -> Result<Self, StaticIndexError> {
        Ok(Self::from_manifest(IndexManifest::load(dir)?))
    }

    pub fn from_manifest(manifest: IndexManifest) -> Self {
        let entries = manifest
            .documents
            .into_iter()
            .map(|document| Entry {
                folded: document.text.to_lowercase(),
                document,
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Documents matching `query`, best first, at most `query.max_hits()`.
    pub fn search(&self, query: &Query) -> Vec<Hit> {
        let mut scored: Vec<(usize, &IndexDocument)> = self
            .entries
            .iter()
            .filter_map(|entry| score(query.parts(), &entry.folded).map(|s| (s, &entry.document)))
            .collect();
        // Stable sort keeps manifest order among equal scores.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(query.max_hits())
            .map(|(score, document)| {
                let mut hit = Hit::new(&document.uri, score as f64);
                hit.properties = document.properties.clone();
                hit
            })
            .collect()
    }
}

/// Number of positive parts matched, or `None` if a required part is
/// missing or a prohibited part is present.
fn score(parts: &[QueryPart], text: &str) -> Option<usize> {
    let mut matched = 0;
    let mut positive = 0;
    for part in parts {
        let hit = part_matches(part, text);
        match part.logic {
            PartLogic::Prohibited if hit => return None,
            PartLogic::Prohibited => {}
            PartLogic::Required if !hit => return None,
            PartLogic::Required | PartLogic::Optional => {
                positive += 1;
                if hit {
                    matched += 1;
                }
            }
        }
    }
    (positive > 0 && matched > 0).then_some(matched)
}

fn part_matches(part: &QueryPart, text: &str) -> bool {
    match &part.kind {
        PartKind::Text { text: phrase } => {
            let phrase = phrase.trim().to_lowercase();
            !phrase.is_empty() && text.contains(&phrase)
        }
        PartKind::Or { parts } => parts.iter().any(|p| part_matches(p, text)),
        PartKind::Human { .. } => false,
    }
}

impl Queryable for JsonIndex {
    fn do_query(
        &self,
        query: Arc<Query>,
        worker: QueryWorker,
        _change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError> {
        let hits = self.search(&query);
        worker
            .add_hits(hits)
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        worker.finish();
        Ok(())
    }

    fn status(&self) -> Option<BackendStatus> {
        Some(BackendStatus {
            is_indexing: false,
            item_count: Some(self.entries.len() as u64),
            progress_percent: None,
        })
    }
}

/// Opens [`JsonIndex`] directories for the loader.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonIndexOpener;

impl StaticIndexOpener for JsonIndexOpener {
    fn open(
        &self,
        dir: &Path,
        _context: &BackendContext,
    ) -> Result<Arc<dyn Queryable>, StaticIndexError> {
        Ok(Arc::new(JsonIndex::open(dir)?))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use seekd_query::{SimpleQueryParser, normalize};

    fn doc(uri: &str, text: &str) -> IndexDocument {
        IndexDocument {
            uri: uri.to_owned(),
            text: text.to_owned(),
            properties: BTreeMap::new(),
        }
    }

    fn index() -> JsonIndex {
        JsonIndex::from_manifest(IndexManifest::new(vec![
            doc("man:ls", "ls - list directory contents"),
            doc("man:cp", "cp - copy files and directories"),
            doc("man:mv", "mv - move (rename) files"),
        ]))
    }

    fn query(text: &str) -> Query {
        let mut query = Query::from_text(text);
        normalize(&mut query, &SimpleQueryParser);
        query
    }

    fn uris(hits: &[Hit]) -> Vec<&str> {
        hits.iter().map(|h| h.uri.as_str()).collect()
    }

    #[test]
    fn required_terms_must_all_match() {
        let index = index();
        assert_eq!(uris(&index.search(&query("files directories"))), ["man:cp"]);
    }

    #[test]
    fn prohibited_terms_exclude() {
        let index = index();
        assert_eq!(uris(&index.search(&query("files -copy"))), ["man:mv"]);
    }

    #[test]
    fn or_groups_match_either_side() {
        let index = index();
        let hits = index.search(&query("copy OR move"));
        assert_eq!(uris(&hits), ["man:cp", "man:mv"]);
    }

    #[test]
    fn phrases_are_case_insensitive() {
        let index = index();
        assert_eq!(uris(&index.search(&query("\"LIST Directory\""))), ["man:ls"]);
    }

    #[test]
    fn max_hits_truncates() {
        let index = index();
        let query = query("-nothing-matches-this s").with_max_hits(1);
        assert_eq!(index.search(&query).len(), 1);
    }

    #[test]
    fn manifest_round_trip_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        IndexManifest::new(vec![doc("file:///a", "alpha")])
            .save(dir.path())
            .expect("save");
        let index = JsonIndex::open(dir.path()).expect("open");
        assert_eq!(index.len(), 1);
        assert_eq!(index.status().and_then(|s| s.item_count), Some(1));
    }

    #[test]
    fn version_mismatch_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"version": 99, "documents": []}"#,
        )
        .expect("write");
        let err = JsonIndex::open(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            StaticIndexError::VersionMismatch {
                found: 99,
                expected: INDEX_FORMAT_VERSION
            }
        ));
    }

    #[test]
    fn garbage_manifest_is_corrupt() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(MANIFEST_FILE), "not json").expect("write");
        assert!(matches!(
            JsonIndex::open(dir.path()).unwrap_err(),
            StaticIndexError::Corrupt(_)
        ));
    }

    #[test]
    fn missing_manifest_is_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            JsonIndex::open(dir.path()).unwrap_err(),
            StaticIndexError::Io(_)
        ));
    }
}
