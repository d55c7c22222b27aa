//! Fan-out of a query to every willing backend.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, RwLock};

use seekd_query::{Query, QueryStringParser, SearchTermSummary, TermExtractor, normalize};

use crate::backend::{ChangeData, panic_message};
use crate::error::{DaemonError, Result};
use crate::registry::{BackendPolicy, Registration, RegistrationSet};
use crate::result::QueryResult;

/// Source label of the worker that holds a query open during fan-out.
pub const BOOKKEEPING_SOURCE: &str = "dispatch";

/// Prepares queries and hands them to backends.
///
/// Dispatch runs on the caller's thread. Backends are expected to move long
/// work elsewhere; the dispatcher never waits for them.
pub struct QueryDispatcher {
    registrations: Arc<RegistrationSet>,
    policy: Arc<RwLock<BackendPolicy>>,
    parser: Arc<dyn QueryStringParser>,
    terms: TermExtractor,
}

impl std::fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("backends", &self.registrations.len())
            .field("terms", &self.terms)
            .finish_non_exhaustive()
    }
}

impl QueryDispatcher {
    pub fn new(
        registrations: Arc<RegistrationSet>,
        policy: Arc<RwLock<BackendPolicy>>,
        parser: Arc<dyn QueryStringParser>,
        terms: TermExtractor,
    ) -> Self {
        Self {
            registrations,
            policy,
            parser,
            terms,
        }
    }

    /// Normalize `query`, announce its search terms on `result`, and send it
    /// to every started, enabled backend that accepts it.
    ///
    /// A bookkeeping worker is attached for the duration of the fan-out, so
    /// `result` sees exactly one `Started` and one `Finished` even when no
    /// backend takes the query.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::DispatchProtocol`] if `result` has already been
    /// used for another query. Backend failures are logged, never returned.
    pub fn dispatch(&self, query: &mut Query, result: &QueryResult) -> Result<SearchTermSummary> {
        if result.is_finished() {
            let err = DaemonError::DispatchProtocol(format!(
                "query {} was dispatched after it finished",
                result.id()
            ));
            tracing::error!(error = %err, "dispatch rejected");
            return Err(err);
        }

        let expanded = normalize(query, self.parser.as_ref());
        let summary = self.terms.summarize(query);
        result.deliver_search_terms(summary.clone())?;
        tracing::debug!(
            query = %result.id(),
            expanded,
            terms = ?summary.exact,
            "query prepared"
        );

        let query = Arc::new(query.clone());
        let bookkeeping = result.attach_worker(BOOKKEEPING_SOURCE)?;
        let mut asked = 0usize;
        for registration in self.registrations.iter() {
            if !self.wants(registration, &query) {
                continue;
            }
            if self.run_backend(registration, &query, result, None) {
                asked += 1;
            }
        }
        bookkeeping.finish();

        tracing::debug!(query = %result.id(), backends = asked, "query dispatched");
        Ok(summary)
    }

    /// Send `query` to a single backend, optionally with the change that
    /// triggered the re-run. Used to refresh live queries.
    ///
    /// Returns whether the backend was asked.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::DispatchProtocol`] if `result` has finished.
    pub fn dispatch_one(
        &self,
        registration: &Registration,
        query: Arc<Query>,
        result: &QueryResult,
        change: Option<Arc<ChangeData>>,
    ) -> Result<bool> {
        let query = if query.has_human_parts() {
            let mut normalized = (*query).clone();
            normalize(&mut normalized, self.parser.as_ref());
            Arc::new(normalized)
        } else {
            query
        };

        if result.is_finished() {
            let err = DaemonError::DispatchProtocol(format!(
                "query {} was re-run on {} after it finished",
                result.id(),
                registration.name()
            ));
            tracing::error!(error = %err, "dispatch rejected");
            return Err(err);
        }
        if !self.wants(registration, &query) {
            return Ok(false);
        }
        Ok(self.run_backend(registration, &query, result, change))
    }

    fn wants(&self, registration: &Registration, query: &Query) -> bool {
        if !registration.is_started() {
            return false;
        }
        let enabled = self
            .policy
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_enabled(registration.name());
        if !enabled {
            tracing::trace!(backend = %registration.flavor(), "backend disabled, skipping");
            return false;
        }
        if !query.allows_domain(registration.flavor().domain()) {
            return false;
        }
        let backend = registration.backend();
        match panic::catch_unwind(AssertUnwindSafe(|| backend.accept_query(query))) {
            Ok(accepted) => accepted,
            Err(payload) => {
                tracing::error!(
                    backend = %registration.flavor(),
                    panic = %panic_message(payload.as_ref()),
                    "backend panicked while checking a query, treating it as declined"
                );
                false
            }
        }
    }

    /// Attach a worker and hand the query to the backend. The worker is
    /// moved into the backend; if the backend fails or panics it is dropped
    /// there, which detaches it.
    fn run_backend(
        &self,
        registration: &Registration,
        query: &Arc<Query>,
        result: &QueryResult,
        change: Option<Arc<ChangeData>>,
    ) -> bool {
        let worker = match result.attach_worker(registration.name()) {
            Ok(worker) => worker,
            Err(_) => return false,
        };
        let backend = registration.backend();
        let query = Arc::clone(query);
        match panic::catch_unwind(AssertUnwindSafe(|| backend.do_query(query, worker, change))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(
                    backend = %registration.flavor(),
                    query = %result.id(),
                    error = %err,
                    "backend failed to answer query"
                );
            }
            Err(payload) => {
                tracing::error!(
                    backend = %registration.flavor(),
                    query = %result.id(),
                    panic = %panic_message(payload.as_ref()),
                    "backend panicked while answering query"
                );
            }
        }
        true
    }
}
