//! A live backend bound to its flavor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::backend::{BackendId, Queryable, panic_message};
use crate::flavor::BackendFlavor;
use crate::router::ChangeNotifier;

/// How a registration came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOrigin {
    /// Found by scanning a plugin directory.
    Plugin,
    /// Compiled into the daemon.
    BuiltIn,
    /// A subdirectory of the system index directory.
    SystemIndex,
    /// A static index the user configured or added.
    UserIndex,
}

/// One live backend instance and the flavor it was created for.
pub struct Registration {
    flavor: BackendFlavor,
    backend: Arc<dyn Queryable>,
    origin: RegistrationOrigin,
    start_claimed: AtomicBool,
    started: AtomicBool,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("flavor", &self.flavor)
            .field("origin", &self.origin)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl Registration {
    pub fn new(
        flavor: BackendFlavor,
        backend: Arc<dyn Queryable>,
        origin: RegistrationOrigin,
    ) -> Self {
        Self {
            flavor,
            backend,
            origin,
            start_claimed: AtomicBool::new(false),
            started: AtomicBool::new(false),
        }
    }

    /// Display name of the backend.
    pub fn name(&self) -> &str {
        self.flavor.name()
    }

    pub fn flavor(&self) -> &BackendFlavor {
        &self.flavor
    }

    pub fn backend(&self) -> &Arc<dyn Queryable> {
        &self.backend
    }

    pub fn origin(&self) -> RegistrationOrigin {
        self.origin
    }

    pub fn id(&self) -> BackendId {
        BackendId::of(self.backend.as_ref())
    }

    /// Whether the backend's start hook has completed.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Run the backend's start hook unless it already ran.
    ///
    /// Returns `false` if the hook had already been claimed or it panicked;
    /// a backend whose start panicked is never marked started.
    pub(crate) fn start(&self, notifier: ChangeNotifier) -> bool {
        if self.start_claimed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let backend = Arc::clone(&self.backend);
        match panic::catch_unwind(AssertUnwindSafe(move || backend.start(notifier))) {
            Ok(()) => {
                self.started.store(true, Ordering::Release);
                tracing::debug!(backend = %self.flavor, "backend started");
                true
            }
            Err(payload) => {
                tracing::error!(
                    backend = %self.flavor,
                    panic = %panic_message(payload.as_ref()),
                    "backend panicked while starting; it will not receive queries"
                );
                false
            }
        }
    }
}
