//! The capability interface every search backend implements.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

use seekd_query::Query;

use crate::error::BackendError;
use crate::result::QueryWorker;
use crate::router::ChangeNotifier;

/// URIs a backend saw appear or disappear since it last reported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeData {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl ChangeData {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// A backend's self-reported indexing state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatus {
    pub is_indexing: bool,
    #[serde(default)]
    pub item_count: Option<u64>,
    #[serde(default)]
    pub progress_percent: Option<u8>,
}

/// A searchable backend.
///
/// Implementations are shared across threads and must not block in
/// [`Queryable::do_query`]: long-running work should be moved to a thread
/// or task that owns the [`QueryWorker`]. The query does not finish until
/// every worker handed out for it has been finished or dropped.
pub trait Queryable: Send + Sync {
    /// Whether this backend wants to answer `query` at all.
    fn accept_query(&self, _query: &Query) -> bool {
        true
    }

    /// Answer `query`, reporting hits through `worker`.
    ///
    /// `change` is set when the query is re-run because this backend's
    /// contents changed. Returning an error, or panicking, drops the worker
    /// and so detaches it.
    fn do_query(
        &self,
        query: Arc<Query>,
        worker: QueryWorker,
        change: Option<Arc<ChangeData>>,
    ) -> Result<(), BackendError>;

    /// Begin background work (watching, crawling). Called at most once.
    fn start(&self, _notifier: ChangeNotifier) {}

    /// Current indexing state, if the backend tracks one.
    fn status(&self) -> Option<BackendStatus> {
        None
    }
}

/// Identity of a live backend instance.
///
/// Derived from the instance's address, so it is only meaningful while the
/// instance is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendId(usize);

impl BackendId {
    pub fn of(backend: &dyn Queryable) -> Self {
        Self(backend as *const dyn Queryable as *const () as usize)
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
