//! Per-query aggregation of backend results.
//!
//! A [`QueryResult`] is shared by every backend answering one query. Each
//! unit of in-flight work holds a [`QueryWorker`]; the result moves through
//!
//! ```text
//! Idle (0 workers) -> Active (N workers) -> Terminal
//! ```
//!
//! emitting [`QueryEvent::Started`] on the first attach and
//! [`QueryEvent::Finished`] when the last worker detaches. Terminal is
//! entered exactly once. Hits can be added by any attached worker from any
//! thread until then.
//!
//! There is no deadline: a worker that is never finished or dropped keeps
//! its query from finishing.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use seekd_query::SearchTermSummary;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{DaemonError, Result};
use crate::hit::Hit;

/// Lifecycle notifications for one query, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// The query's search terms. Always precedes any hit.
    SearchTerms(SearchTermSummary),
    /// The first worker attached.
    Started,
    /// A worker reported hits.
    HitsAdded { source: String, hits: Vec<Hit> },
    /// The last worker detached; no further events follow.
    Finished { total_hits: usize },
}

/// Receiving side of a query's event stream.
pub type QueryEvents = mpsc::UnboundedReceiver<QueryEvent>;

/// Where a [`QueryResult`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultPhase {
    Idle,
    Active,
    Terminal,
}

struct ResultState {
    phase: ResultPhase,
    live_workers: HashSet<u64>,
    next_worker_id: u64,
    hits: Vec<Hit>,
    search_terms: Option<SearchTermSummary>,
}

struct ResultInner {
    id: Uuid,
    state: Mutex<ResultState>,
    events: mpsc::UnboundedSender<QueryEvent>,
}

/// The aggregate outcome of one query across all backends.
///
/// Cloning is cheap and yields another handle to the same result.
#[derive(Clone)]
pub struct QueryResult {
    inner: Arc<ResultInner>,
}

impl fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("QueryResult")
            .field("id", &self.inner.id)
            .field("phase", &state.phase)
            .field("active_workers", &state.live_workers.len())
            .field("hits", &state.hits.len())
            .finish()
    }
}

impl QueryResult {
    /// Create an idle result and the receiver for its events.
    pub fn new() -> (Self, QueryEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let result = Self {
            inner: Arc::new(ResultInner {
                id: Uuid::new_v4(),
                state: Mutex::new(ResultState {
                    phase: ResultPhase::Idle,
                    live_workers: HashSet::new(),
                    next_worker_id: 0,
                    hits: Vec::new(),
                    search_terms: None,
                }),
                events,
            }),
        };
        (result, rx)
    }

    /// Unique identifier of this query, used in logs.
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    fn lock(&self) -> MutexGuard<'_, ResultState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Events are sent while the state lock is held so their order matches
    /// the order of state changes. A dropped receiver is not an error.
    fn emit(&self, event: QueryEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Record the query's search terms and announce them.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::DispatchProtocol`] once any worker has attached,
    /// since hits may already have been delivered.
    pub fn deliver_search_terms(&self, summary: SearchTermSummary) -> Result<()> {
        let mut state = self.lock();
        if state.phase != ResultPhase::Idle {
            let err = DaemonError::DispatchProtocol(format!(
                "query {} received search terms after work started",
                self.inner.id
            ));
            tracing::error!(error = %err, "search terms rejected");
            return Err(err);
        }
        state.search_terms = Some(summary.clone());
        self.emit(QueryEvent::SearchTerms(summary));
        Ok(())
    }

    /// The search terms delivered for this query, if any.
    pub fn search_terms(&self) -> Option<SearchTermSummary> {
        self.lock().search_terms.clone()
    }

    /// Attach a new unit of work on behalf of `source`.
    ///
    /// The first attach moves the result from idle to active and emits
    /// [`QueryEvent::Started`].
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::DispatchProtocol`] if the result has already
    /// finished.
    pub fn attach_worker(&self, source: impl Into<String>) -> Result<QueryWorker> {
        let source = source.into();
        let mut state = self.lock();
        if state.phase == ResultPhase::Terminal {
            let err = DaemonError::DispatchProtocol(format!(
                "{source} attached a worker to query {} after it finished",
                self.inner.id
            ));
            tracing::error!(error = %err, "worker attach rejected");
            return Err(err);
        }

        let id = state.next_worker_id;
        state.next_worker_id += 1;
        state.live_workers.insert(id);
        if state.phase == ResultPhase::Idle {
            state.phase = ResultPhase::Active;
            self.emit(QueryEvent::Started);
        }
        tracing::trace!(query = %self.inner.id, %source, worker = id, "worker attached");

        Ok(QueryWorker {
            result: self.clone(),
            id,
            source,
            detached: false,
        })
    }

    /// Detach worker `id`, finishing the query when it was the last one.
    ///
    /// Detaching an id that is not attached is a protocol violation: it is
    /// logged and the result is forced terminal so the caller is not left
    /// waiting on bookkeeping that can no longer be trusted.
    pub(crate) fn detach_worker(&self, id: u64) {
        let mut state = self.lock();
        if !state.live_workers.remove(&id) {
            let err = DaemonError::DispatchProtocol(format!(
                "worker {id} detached from query {} without being attached",
                self.inner.id
            ));
            tracing::error!(error = %err, "forcing query to finish");
            if state.phase != ResultPhase::Terminal {
                state.live_workers.clear();
                self.finish_locked(&mut state);
            }
            return;
        }

        tracing::trace!(query = %self.inner.id, worker = id, "worker detached");
        if state.live_workers.is_empty() {
            self.finish_locked(&mut state);
        }
    }

    fn finish_locked(&self, state: &mut ResultState) {
        state.phase = ResultPhase::Terminal;
        let total_hits = state.hits.len();
        tracing::debug!(query = %self.inner.id, total_hits, "query finished");
        self.emit(QueryEvent::Finished { total_hits });
    }

    fn add_hits(&self, worker_id: u64, source: &str, hits: Vec<Hit>) -> Result<()> {
        let mut state = self.lock();
        if state.phase == ResultPhase::Terminal || !state.live_workers.contains(&worker_id) {
            let err = DaemonError::DispatchProtocol(format!(
                "{source} added {} hits to query {} after detaching",
                hits.len(),
                self.inner.id
            ));
            tracing::warn!(error = %err, "late hits discarded");
            return Err(err);
        }
        if hits.is_empty() {
            return Ok(());
        }

        let hits: Vec<Hit> = hits
            .into_iter()
            .map(|mut hit| {
                hit.source = source.to_owned();
                hit
            })
            .collect();
        state.hits.extend(hits.iter().cloned());
        self.emit(QueryEvent::HitsAdded {
            source: source.to_owned(),
            hits,
        });
        Ok(())
    }

    pub fn phase(&self) -> ResultPhase {
        self.lock().phase
    }

    /// Returns `true` once the last worker has detached.
    pub fn is_finished(&self) -> bool {
        self.phase() == ResultPhase::Terminal
    }

    /// Number of workers currently attached.
    pub fn active_workers(&self) -> usize {
        self.lock().live_workers.len()
    }

    /// A snapshot of every hit received so far, in arrival order.
    pub fn hits(&self) -> Vec<Hit> {
        self.lock().hits.clone()
    }

    pub fn hit_count(&self) -> usize {
        self.lock().hits.len()
    }
}

/// One attached unit of work on a [`QueryResult`].
///
/// Finishing the worker, or dropping it, detaches it exactly once. A
/// backend that fails or panics therefore still releases its share of the
/// query when its worker goes out of scope.
pub struct QueryWorker {
    result: QueryResult,
    id: u64,
    source: String,
    detached: bool,
}

impl fmt::Debug for QueryWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryWorker")
            .field("query", &self.result.id())
            .field("id", &self.id)
            .field("source", &self.source)
            .finish()
    }
}

impl QueryWorker {
    /// Name of the backend this worker reports for.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn query_id(&self) -> Uuid {
        self.result.id()
    }

    /// Report a single hit.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::DispatchProtocol`] if the result has already
    /// finished; the hit is discarded.
    pub fn add_hit(&self, hit: Hit) -> Result<()> {
        self.add_hits(vec![hit])
    }

    /// Report a batch of hits. Order within the batch is preserved.
    ///
    /// # Errors
    ///
    /// Same as [`QueryWorker::add_hit`].
    pub fn add_hits(&self, hits: Vec<Hit>) -> Result<()> {
        self.result.add_hits(self.id, &self.source, hits)
    }

    /// Attach another worker for the same source, e.g. to split work across
    /// threads. The query finishes only after both are done.
    ///
    /// # Errors
    ///
    /// Same as [`QueryResult::attach_worker`].
    pub fn fork(&self) -> Result<QueryWorker> {
        self.result.attach_worker(self.source.clone())
    }

    /// Signal that this unit of work is complete.
    pub fn finish(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if !self.detached {
            self.detached = true;
            self.result.detach_worker(self.id);
        }
    }
}

impl Drop for QueryWorker {
    fn drop(&mut self) {
        if !self.detached {
            tracing::debug!(
                query = %self.result.id(),
                source = %self.source,
                "worker dropped without finishing, detaching"
            );
            self.detach();
        }
    }
}
