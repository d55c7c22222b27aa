//! Routing of backend-originated change events, and daemon status.

use serde::Serialize;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

use crate::backend::{BackendId, BackendStatus, ChangeData, Queryable, panic_message};
use crate::flavor::{BackendFlavor, QueryDomain};
use crate::registry::{Registration, RegistrationOrigin, RegistrationSet};

/// Capacity of the change broadcast. Slow subscribers see `Lagged`.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A backend reported that its contents changed.
#[derive(Debug, Clone)]
pub struct BackendChanged {
    pub flavor: BackendFlavor,
    pub change: Arc<ChangeData>,
}

/// Status of one registered backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendStatusEntry {
    pub name: String,
    pub domain: QueryDomain,
    pub origin: RegistrationOrigin,
    pub started: bool,
    /// `None` when the backend does not report a status.
    pub status: Option<BackendStatus>,
}

impl BackendStatusEntry {
    fn is_indexing(&self) -> bool {
        self.status.as_ref().is_some_and(|s| s.is_indexing)
    }
}

/// Daemon-wide indexing state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaemonStatus {
    /// True until backends have started, then while any backend is indexing.
    pub is_indexing: bool,
    pub backends: Vec<BackendStatusEntry>,
}

/// Routes change notifications to subscribers and aggregates status.
#[derive(Clone)]
pub struct ChangeRouter {
    registrations: Arc<RegistrationSet>,
    events: broadcast::Sender<BackendChanged>,
    started: Arc<AtomicBool>,
}

impl fmt::Debug for ChangeRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRouter")
            .field("backends", &self.registrations.len())
            .field("subscribers", &self.events.receiver_count())
            .field("started", &self.is_started())
            .finish()
    }
}

impl ChangeRouter {
    pub fn new(registrations: Arc<RegistrationSet>) -> Self {
        let (events, _rx) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            registrations,
            events,
            started: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receive every routed change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BackendChanged> {
        self.events.subscribe()
    }

    /// A notifier bound to `registration`, handed to its backend at start.
    pub fn notifier_for(&self, registration: &Registration) -> ChangeNotifier {
        ChangeNotifier {
            router: self.clone(),
            backend: registration.id(),
        }
    }

    /// Route a change reported by `source`.
    ///
    /// Returns `false` if `source` is not a registered backend.
    pub fn notify_changed(&self, source: &dyn Queryable, change: ChangeData) -> bool {
        self.route(BackendId::of(source), change)
    }

    fn route(&self, id: BackendId, change: ChangeData) -> bool {
        let Some(registration) = self.registrations.get_by_id(id) else {
            tracing::debug!(?id, "change from an unregistered backend ignored");
            return false;
        };
        let event = BackendChanged {
            flavor: registration.flavor().clone(),
            change: Arc::new(change),
        };
        // No subscribers is not an error; nobody has a live query open.
        let receivers = self.events.send(event).unwrap_or(0);
        tracing::trace!(backend = %registration.flavor(), receivers, "change routed");
        true
    }

    pub(crate) fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Whether backends have been started.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Snapshot of every backend's status.
    pub fn status(&self) -> DaemonStatus {
        let backends: Vec<BackendStatusEntry> = self
            .registrations
            .iter()
            .map(|registration| BackendStatusEntry {
                name: registration.name().to_owned(),
                domain: registration.flavor().domain(),
                origin: registration.origin(),
                started: registration.is_started(),
                status: backend_status(registration),
            })
            .collect();
        let is_indexing =
            !self.is_started() || backends.iter().any(BackendStatusEntry::is_indexing);
        DaemonStatus {
            is_indexing,
            backends,
        }
    }
}

/// A backend's own status, or `None` if asking for it panics.
fn backend_status(registration: &Registration) -> Option<BackendStatus> {
    let backend = registration.backend();
    match panic::catch_unwind(AssertUnwindSafe(|| backend.status())) {
        Ok(status) => status,
        Err(payload) => {
            tracing::error!(
                backend = %registration.flavor(),
                panic = %panic_message(payload.as_ref()),
                "backend panicked while reporting status"
            );
            None
        }
    }
}

/// Handle a backend uses to announce that its contents changed.
#[derive(Clone)]
pub struct ChangeNotifier {
    router: ChangeRouter,
    backend: BackendId,
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}

impl ChangeNotifier {
    /// Announce `change`. Returns `false` if the backend is not registered.
    pub fn notify(&self, change: ChangeData) -> bool {
        self.router.route(self.backend, change)
    }
}
