//! The orchestration core: one value owning the registry, dispatcher and
//! router for the daemon's lifetime.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use seekd_query::{
    EnglishStemmer, Query, QueryStringParser, SearchTermSummary, SimpleQueryParser, TermExtractor,
};

use crate::backend::{ChangeData, Queryable};
use crate::config::{BackendConfig, DaemonConfig, expand_home};
use crate::dispatch::QueryDispatcher;
use crate::error::Result;
use crate::flavor::HostCapabilities;
use crate::loader::{
    BackendContext, BackendLoader, BackendModule, PluginScanner, StaticIndexOpener, subdirectories,
};
use crate::registry::{BackendPolicy, Registration, RegistrationSet};
use crate::result::QueryResult;
use crate::router::{BackendChanged, ChangeRouter, DaemonStatus};

/// Backend names grouped the way administration tools present them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendListing {
    /// Flavors offered by loaded modules.
    pub user: Vec<String>,
    /// Index directories shipped with the system.
    pub system: Vec<String>,
    /// Backends currently registered.
    pub active: Vec<String>,
}

/// Assembles an [`OrchestrationCore`].
pub struct CoreBuilder {
    config: DaemonConfig,
    host: Option<HostCapabilities>,
    modules: Vec<Arc<dyn BackendModule>>,
    scanner: Option<Arc<dyn PluginScanner>>,
    opener: Option<Arc<dyn StaticIndexOpener>>,
    parser: Arc<dyn QueryStringParser>,
    only_allow: Vec<String>,
    static_indexes: Vec<PathBuf>,
}

impl CoreBuilder {
    pub fn new(config: DaemonConfig) -> Self {
        Self {
            config,
            host: None,
            modules: Vec::new(),
            scanner: None,
            opener: None,
            parser: Arc::new(SimpleQueryParser),
            only_allow: Vec::new(),
            static_indexes: Vec::new(),
        }
    }

    /// Register a built-in backend module.
    #[must_use]
    pub fn with_module(mut self, module: impl BackendModule + 'static) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    #[must_use]
    pub fn with_plugin_scanner(mut self, scanner: impl PluginScanner + 'static) -> Self {
        self.scanner = Some(Arc::new(scanner));
        self
    }

    #[must_use]
    pub fn with_static_opener(mut self, opener: impl StaticIndexOpener + 'static) -> Self {
        self.opener = Some(Arc::new(opener));
        self
    }

    /// Override host capability detection.
    #[must_use]
    pub fn with_host_capabilities(mut self, host: HostCapabilities) -> Self {
        self.host = Some(host);
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: impl QueryStringParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Run only the named backends, ignoring configured denials.
    #[must_use]
    pub fn only_allow(mut self, name: impl Into<String>) -> Self {
        self.only_allow.push(name.into());
        self
    }

    /// Always load the static index at `path`.
    #[must_use]
    pub fn add_static_index(mut self, path: impl Into<PathBuf>) -> Self {
        self.static_indexes.push(path.into());
        self
    }

    /// Resolve the policy, load backends and assemble the core.
    pub fn build(self) -> OrchestrationCore {
        let config = Arc::new(self.config);

        let mut policy = BackendPolicy::new(&config.backends);
        for name in &self.only_allow {
            policy.only_allow(name);
        }
        policy.read_config();

        let host = self.host.unwrap_or_else(HostCapabilities::detect);
        let mut loader = BackendLoader::new(BackendContext::new(Arc::clone(&config), host));
        for module in self.modules {
            loader.add_module(module);
        }
        if let Some(scanner) = self.scanner {
            loader.set_plugin_scanner(scanner);
        }
        if let Some(opener) = self.opener {
            loader.set_static_opener(opener);
        }
        for path in self.static_indexes {
            loader.add_static_index(path);
        }
        let outcome = loader.load(&policy);

        let registrations = Arc::new(outcome.registrations);
        let policy = Arc::new(RwLock::new(policy));
        let terms = TermExtractor::new(config.query.stop_words(), Arc::new(EnglishStemmer));
        let dispatcher = QueryDispatcher::new(
            Arc::clone(&registrations),
            Arc::clone(&policy),
            self.parser,
            terms,
        );
        let router = ChangeRouter::new(Arc::clone(&registrations));

        OrchestrationCore {
            config,
            policy,
            registrations,
            dispatcher,
            router,
            user_flavors: outcome.user_flavors,
            start_claimed: AtomicBool::new(false),
        }
    }
}

/// Owns every piece of query orchestration.
pub struct OrchestrationCore {
    config: Arc<DaemonConfig>,
    policy: Arc<RwLock<BackendPolicy>>,
    registrations: Arc<RegistrationSet>,
    dispatcher: QueryDispatcher,
    router: ChangeRouter,
    user_flavors: Vec<String>,
    start_claimed: AtomicBool,
}

impl std::fmt::Debug for OrchestrationCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationCore")
            .field("backends", &self.registrations.names())
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl OrchestrationCore {
    pub fn builder(config: DaemonConfig) -> CoreBuilder {
        CoreBuilder::new(config)
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Start every backend, now or after the configured indexing delay.
    ///
    /// A deferred start needs a tokio runtime; the spawned task's handle is
    /// returned. Without a runtime backends start immediately. Calling this
    /// more than once has no further effect.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        if self.start_claimed.swap(true, Ordering::AcqRel) {
            tracing::debug!("backends already starting");
            return None;
        }

        let Some(delay) = self.config.indexing.start_delay() else {
            start_backends(&self.registrations, &self.router);
            return None;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::info!(delay_secs = delay.as_secs(), "deferring backend start");
                let registrations = Arc::clone(&self.registrations);
                let router = self.router.clone();
                Some(handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    start_backends(&registrations, &router);
                }))
            }
            Err(_) => {
                tracing::warn!("no async runtime for a deferred start, starting backends now");
                start_backends(&self.registrations, &self.router);
                None
            }
        }
    }

    /// Whether backends have finished starting.
    pub fn is_started(&self) -> bool {
        self.router.is_started()
    }

    /// A free-text query using the configured hit limit.
    pub fn query(&self, text: &str) -> Query {
        Query::from_text(text).with_max_hits(self.config.query.max_hits)
    }

    /// Send `query` to every willing backend. See [`QueryDispatcher::dispatch`].
    pub fn dispatch(&self, query: &mut Query, result: &QueryResult) -> Result<SearchTermSummary> {
        self.dispatcher.dispatch(query, result)
    }

    /// Re-run `query` on the backend named `name`, e.g. after it reported a
    /// change. Returns `Ok(false)` if no such backend is registered or it
    /// does not take the query.
    pub fn dispatch_one(
        &self,
        name: &str,
        query: Arc<Query>,
        result: &QueryResult,
        change: Option<Arc<ChangeData>>,
    ) -> Result<bool> {
        let Some(registration) = self.registrations.get(name) else {
            tracing::debug!(backend = name, "re-run requested for an unknown backend");
            return Ok(false);
        };
        self.dispatcher.dispatch_one(registration, query, result, change)
    }

    fn policy_mut(&self) -> RwLockWriteGuard<'_, BackendPolicy> {
        self.policy.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Enable `name` for future queries. A backend that was never loaded
    /// only appears after a restart.
    pub fn allow(&self, name: &str) {
        self.policy_mut().allow(name);
        tracing::info!(backend = name, "backend allowed");
    }

    /// Stop sending queries to `name`.
    pub fn deny(&self, name: &str) {
        self.policy_mut().deny(name);
        tracing::info!(backend = name, "backend denied");
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.policy
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_enabled(name)
    }

    /// Re-apply backend denials from `config`.
    pub fn reload_policy(&self, config: &BackendConfig) {
        let mut policy = self.policy_mut();
        policy.reload(config);
        policy.read_config();
    }

    /// Backend names grouped by where they come from.
    pub fn list_backends(&self) -> BackendListing {
        let system_dir = expand_home(&self.config.backends.system_indexes_dir);
        BackendListing {
            user: self.user_flavors.clone(),
            system: subdirectories(&system_dir)
                .into_iter()
                .map(|(name, _)| name)
                .collect(),
            active: self.registrations.names(),
        }
    }

    pub fn status(&self) -> DaemonStatus {
        self.router.status()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<BackendChanged> {
        self.router.subscribe()
    }

    /// Route a change reported by `source`; `false` if it is not registered.
    pub fn notify_changed(&self, source: &dyn Queryable, change: ChangeData) -> bool {
        self.router.notify_changed(source, change)
    }

    pub fn registration(&self, name: &str) -> Option<Arc<Registration>> {
        self.registrations.get(name).cloned()
    }

    pub fn registrations(&self) -> &RegistrationSet {
        &self.registrations
    }
}

fn start_backends(registrations: &RegistrationSet, router: &ChangeRouter) {
    let started = registrations
        .iter()
        .filter(|registration| registration.start(router.notifier_for(registration)))
        .count();
    router.mark_started();
    tracing::info!(started, total = registrations.len(), "backends started");
}
