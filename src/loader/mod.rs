//! Backend discovery and instantiation.
//!
//! Loading happens once, before the core exists:
//!
//! 1. Plugin directories are scanned for modules, then built-in modules are
//!    appended. A module id seen twice is loaded once.
//! 2. Each module registers at most one of its flavors.
//! 3. Static indexes are opened: subdirectories of the system index
//!    directory, then user index paths.
//!
//! Nothing here fails the daemon. A backend that cannot be created is logged
//! and left out.

pub mod json_index;
pub mod module;

pub use json_index::{
    INDEX_FORMAT_VERSION, IndexDocument, IndexManifest, JsonIndex, JsonIndexOpener, MANIFEST_FILE,
};
pub use module::{
    BackendContext, BackendFactory, BackendModule, FlavorEntry, PluginScanner, StaticIndexOpener,
};

use std::collections::HashSet;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{Queryable, panic_message};
use crate::config::expand_home;
use crate::error::{DaemonError, StaticIndexError};
use crate::flavor::{BackendFlavor, QueryDomain};
use crate::registry::{
    BackendPolicy, Registration, RegistrationOrigin, RegistrationSet, STATIC_BACKEND,
};

/// Environment variable listing extra plugin directories, in the
/// platform's `PATH` format.
pub const BACKEND_PATH_ENV: &str = "SEEKD_BACKEND_PATH";

/// Everything loading produced.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub registrations: RegistrationSet,
    /// Every flavor name offered by a loaded module, registered or not.
    pub user_flavors: Vec<String>,
}

/// Collects backend sources and turns them into registrations.
pub struct BackendLoader {
    context: BackendContext,
    builtins: Vec<Arc<dyn BackendModule>>,
    scanner: Option<Arc<dyn PluginScanner>>,
    opener: Option<Arc<dyn StaticIndexOpener>>,
    extra_static: Vec<PathBuf>,
}

impl BackendLoader {
    pub fn new(context: BackendContext) -> Self {
        Self {
            context,
            builtins: Vec::new(),
            scanner: None,
            opener: None,
            extra_static: Vec::new(),
        }
    }

    pub fn add_module(&mut self, module: Arc<dyn BackendModule>) {
        self.builtins.push(module);
    }

    pub fn set_plugin_scanner(&mut self, scanner: Arc<dyn PluginScanner>) {
        self.scanner = Some(scanner);
    }

    pub fn set_static_opener(&mut self, opener: Arc<dyn StaticIndexOpener>) {
        self.opener = Some(opener);
    }

    /// A static index to load regardless of the `static` policy entry.
    pub fn add_static_index(&mut self, path: impl Into<PathBuf>) {
        self.extra_static.push(path.into());
    }

    pub fn context(&self) -> &BackendContext {
        &self.context
    }

    /// Plugin directories from the environment and configuration, in that
    /// order, without duplicates.
    pub fn plugin_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = std::env::var_os(BACKEND_PATH_ENV)
            .map(|raw| std::env::split_paths(&raw).collect())
            .unwrap_or_default();
        if let Some(dir) = &self.context.config().backends.backend_dir {
            dirs.push(dir.clone());
        }
        dedup_paths(dirs)
    }

    /// Discover and instantiate every backend `policy` allows.
    pub fn load(&self, policy: &BackendPolicy) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        let mut seen = HashSet::new();

        let mut modules: Vec<(Arc<dyn BackendModule>, RegistrationOrigin)> = self
            .scan_plugins()
            .into_iter()
            .map(|m| (m, RegistrationOrigin::Plugin))
            .collect();
        modules.extend(
            self.builtins
                .iter()
                .map(|m| (Arc::clone(m), RegistrationOrigin::BuiltIn)),
        );

        for (module, origin) in modules {
            if !seen.insert(module.id().to_owned()) {
                tracing::debug!(module = module.id(), "module already loaded, skipping");
                continue;
            }
            let entries = module.flavors();
            outcome
                .user_flavors
                .extend(entries.iter().map(|e| e.flavor().name().to_owned()));
            self.register_first_accepted(
                module.id(),
                &entries,
                origin,
                policy,
                &mut outcome.registrations,
            );
        }

        self.load_static_indexes(policy, &mut outcome.registrations);

        tracing::info!(
            backends = outcome.registrations.len(),
            names = ?outcome.registrations.names(),
            "backends loaded"
        );
        outcome
    }

    fn scan_plugins(&self) -> Vec<Arc<dyn BackendModule>> {
        let Some(scanner) = &self.scanner else {
            return Vec::new();
        };
        let mut modules = Vec::new();
        for dir in self.plugin_dirs() {
            if !dir.is_dir() {
                tracing::debug!(dir = %dir.display(), "plugin directory missing, skipping");
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| scanner.scan(&dir))) {
                Ok(Ok(found)) => {
                    tracing::debug!(
                        dir = %dir.display(),
                        modules = found.len(),
                        "plugin directory scanned"
                    );
                    modules.extend(found);
                }
                Ok(Err(err)) => {
                    tracing::warn!(
                        dir = %dir.display(),
                        error = %err,
                        "failed to scan plugin directory"
                    );
                }
                Err(payload) => {
                    tracing::error!(
                        dir = %dir.display(),
                        panic = %panic_message(payload.as_ref()),
                        "plugin scanner panicked"
                    );
                }
            }
        }
        modules
    }

    fn register_first_accepted(
        &self,
        module_id: &str,
        entries: &[FlavorEntry],
        origin: RegistrationOrigin,
        policy: &BackendPolicy,
        registrations: &mut RegistrationSet,
    ) {
        for entry in entries {
            let flavor = entry.flavor();
            if !policy.is_enabled(flavor.name()) {
                tracing::debug!(module = module_id, backend = %flavor, "backend disabled");
                continue;
            }
            if let Some(missing) = self.context.host().missing_for(flavor) {
                tracing::info!(
                    module = module_id,
                    backend = %flavor,
                    missing,
                    "host lacks a capability this backend needs"
                );
                continue;
            }
            match self.instantiate(entry) {
                Ok(backend) => {
                    registrations.insert(Registration::new(flavor.clone(), backend, origin));
                    return;
                }
                Err(err) => {
                    tracing::error!(module = module_id, error = %err, "backend skipped");
                }
            }
        }
    }

    fn instantiate(&self, entry: &FlavorEntry) -> Result<Arc<dyn Queryable>, DaemonError> {
        let name = entry.flavor().name().to_owned();
        match panic::catch_unwind(AssertUnwindSafe(|| entry.instantiate(&self.context))) {
            Ok(Ok(backend)) => Ok(backend),
            Ok(Err(err)) => Err(DaemonError::BackendInstantiation {
                name,
                reason: err.to_string(),
            }),
            Err(payload) => Err(DaemonError::BackendInstantiation {
                name,
                reason: format!("factory panicked: {}", panic_message(payload.as_ref())),
            }),
        }
    }

    fn load_static_indexes(&self, policy: &BackendPolicy, registrations: &mut RegistrationSet) {
        let Some(opener) = &self.opener else {
            tracing::debug!("no static index opener configured");
            return;
        };
        let backends = &self.context.config().backends;

        let system_dir = expand_home(&backends.system_indexes_dir);
        for (name, dir) in subdirectories(&system_dir) {
            if !policy.is_enabled(&name) {
                tracing::debug!(index = %name, "system index disabled");
                continue;
            }
            self.open_static(
                opener.as_ref(),
                &dir,
                name,
                QueryDomain::System,
                RegistrationOrigin::SystemIndex,
                registrations,
            );
        }

        let mut user_paths = self.extra_static.clone();
        if policy.is_enabled(STATIC_BACKEND) {
            user_paths.extend(backends.static_index_paths.iter().cloned());
        }
        let user_paths = dedup_paths(user_paths.iter().map(|p| expand_home(p)).collect());
        for dir in user_paths {
            if !dir.is_dir() {
                tracing::debug!(dir = %dir.display(), "static index missing, skipping");
                continue;
            }
            let Some(name) = dir_name(&dir) else {
                continue;
            };
            self.open_static(
                opener.as_ref(),
                &dir,
                name,
                QueryDomain::Local,
                RegistrationOrigin::UserIndex,
                registrations,
            );
        }
    }

    fn open_static(
        &self,
        opener: &dyn StaticIndexOpener,
        dir: &Path,
        name: String,
        domain: QueryDomain,
        origin: RegistrationOrigin,
        registrations: &mut RegistrationSet,
    ) {
        let opened = panic::catch_unwind(AssertUnwindSafe(|| opener.open(dir, &self.context)))
            .unwrap_or_else(|payload| {
                Err(StaticIndexError::Corrupt(format!(
                    "opener panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        match opened {
            Ok(backend) => {
                let flavor = BackendFlavor::new(name, domain);
                tracing::debug!(backend = %flavor, dir = %dir.display(), "static index opened");
                registrations.insert(Registration::new(flavor, backend, origin));
            }
            Err(source) => {
                let mismatch = matches!(source, StaticIndexError::VersionMismatch { .. });
                let err = DaemonError::StaticIndex {
                    path: dir.to_path_buf(),
                    source,
                };
                if mismatch {
                    tracing::warn!(error = %err, "static index skipped");
                } else {
                    tracing::error!(error = %err, "static index skipped");
                }
            }
        }
    }
}

impl std::fmt::Debug for BackendLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendLoader")
            .field("builtins", &self.builtins.len())
            .field("scanner", &self.scanner.is_some())
            .field("opener", &self.opener.is_some())
            .field("extra_static", &self.extra_static)
            .finish()
    }
}

/// Subdirectories of `dir` as `(name, path)`, sorted by name. A missing or
/// unreadable directory yields nothing.
pub fn subdirectories(dir: &Path) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<(String, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .filter_map(|path| dir_name(&path).map(|name| (name, path)))
        .collect();
    dirs.sort();
    dirs
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn dedup_paths(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|p| !p.as_os_str().is_empty())
        .filter(|p| seen.insert(p.clone()))
        .collect()
}
