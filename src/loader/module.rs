//! How backends make themselves known to the loader.

use std::fmt;
use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::backend::Queryable;
use crate::config::DaemonConfig;
use crate::error::{BackendError, StaticIndexError};
use crate::flavor::{BackendFlavor, HostCapabilities};

/// What a factory gets to build a backend from.
#[derive(Debug, Clone)]
pub struct BackendContext {
    config: Arc<DaemonConfig>,
    host: HostCapabilities,
}

impl BackendContext {
    pub fn new(config: Arc<DaemonConfig>, host: HostCapabilities) -> Self {
        Self { config, host }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn host(&self) -> HostCapabilities {
        self.host
    }
}

/// Builds a backend instance for one flavor.
pub type BackendFactory =
    Box<dyn Fn(&BackendContext) -> Result<Arc<dyn Queryable>, BackendError> + Send + Sync>;

/// A flavor a module can provide, with the factory that instantiates it.
pub struct FlavorEntry {
    flavor: BackendFlavor,
    factory: BackendFactory,
}

impl fmt::Debug for FlavorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlavorEntry")
            .field("flavor", &self.flavor)
            .finish_non_exhaustive()
    }
}

impl FlavorEntry {
    pub fn new<F>(flavor: BackendFlavor, factory: F) -> Self
    where
        F: Fn(&BackendContext) -> Result<Arc<dyn Queryable>, BackendError> + Send + Sync + 'static,
    {
        Self {
            flavor,
            factory: Box::new(factory),
        }
    }

    pub fn flavor(&self) -> &BackendFlavor {
        &self.flavor
    }

    pub(crate) fn instantiate(
        &self,
        context: &BackendContext,
    ) -> Result<Arc<dyn Queryable>, BackendError> {
        (self.factory)(context)
    }
}

/// A unit of backend code: a plugin or a built-in.
///
/// A module lists its flavors in order of preference. The loader registers
/// at most one of them: the first that is enabled, supported by the host
/// and successfully instantiated.
pub trait BackendModule: Send + Sync {
    /// Stable identifier; a second module with the same id is ignored.
    fn id(&self) -> &str;

    fn flavors(&self) -> Vec<FlavorEntry>;
}

/// Finds backend modules in a plugin directory.
pub trait PluginScanner: Send + Sync {
    /// Modules found in `dir`. The directory is known to exist.
    fn scan(&self, dir: &Path) -> io::Result<Vec<Arc<dyn BackendModule>>>;
}

/// Opens a pre-built index directory as a backend.
pub trait StaticIndexOpener: Send + Sync {
    fn open(
        &self,
        dir: &Path,
        context: &BackendContext,
    ) -> Result<Arc<dyn Queryable>, StaticIndexError>;
}
