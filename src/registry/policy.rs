//! Allow/deny policy deciding which backends may run.

use std::collections::BTreeSet;

use crate::config::BackendConfig;
use crate::flavor::registry_key;

/// Pseudo backend name gating the user-configured static indexes.
pub const STATIC_BACKEND: &str = "static";

/// The allow/deny decision for backend names.
///
/// An explicit allowlist (see [`BackendPolicy::only_allow`]) is exclusive:
/// once it is non-empty only listed names are enabled and configuration is
/// never consulted again. Otherwise every name not on the denylist is
/// enabled. The denylist is seeded lazily from configuration the first time
/// it is needed.
///
/// Names are compared case-insensitively. Unknown names are accepted.
#[derive(Debug, Clone)]
pub struct BackendPolicy {
    allowlist: BTreeSet<String>,
    denylist: BTreeSet<String>,
    configured_denials: Vec<String>,
    read_config: bool,
    config_read: bool,
}

impl Default for BackendPolicy {
    fn default() -> Self {
        Self::new(&BackendConfig::default())
    }
}

impl BackendPolicy {
    /// A policy that will take its denials from `config` once read.
    pub fn new(config: &BackendConfig) -> Self {
        let mut configured_denials: Vec<String> = config
            .denied_backends
            .iter()
            .map(|name| registry_key(name))
            .filter(|name| !name.is_empty())
            .collect();
        if !config.allow_static_backend {
            configured_denials.push(STATIC_BACKEND.to_owned());
        }
        Self {
            allowlist: BTreeSet::new(),
            denylist: BTreeSet::new(),
            configured_denials,
            read_config: true,
            config_read: false,
        }
    }

    /// Restrict the daemon to `name` (and any other names passed here).
    ///
    /// Disables configuration-driven resolution for the rest of the
    /// policy's life.
    pub fn only_allow(&mut self, name: &str) {
        self.read_config = false;
        self.allowlist.insert(registry_key(name));
    }

    /// Enable `name`, removing it from the denylist.
    pub fn allow(&mut self, name: &str) {
        self.read_config();
        self.denylist.remove(&registry_key(name));
    }

    /// Disable `name`.
    pub fn deny(&mut self, name: &str) {
        self.read_config();
        self.denylist.insert(registry_key(name));
    }

    /// Whether `name` may run under the current policy.
    pub fn is_enabled(&self, name: &str) -> bool {
        let key = registry_key(name);
        if self.allowlist.is_empty() {
            !self.denylist.contains(&key)
        } else {
            self.allowlist.contains(&key)
        }
    }

    /// Apply the configured denials. Idempotent; a no-op after
    /// [`BackendPolicy::only_allow`].
    pub fn read_config(&mut self) {
        if !self.read_config || self.config_read {
            return;
        }
        self.config_read = true;
        self.denylist.extend(self.configured_denials.iter().cloned());
        tracing::debug!(
            denied = ?self.denylist,
            "backend policy read from configuration"
        );
    }

    /// Re-arm configuration reading so the next [`BackendPolicy::read_config`]
    /// applies the configured denials again.
    pub fn reset_config(&mut self) {
        self.config_read = false;
    }

    /// Replace the configured denials, e.g. after the config file changed.
    /// Takes effect on the next read.
    pub fn reload(&mut self, config: &BackendConfig) {
        self.configured_denials = Self::new(config).configured_denials;
        self.reset_config();
    }

    pub fn allowlist(&self) -> impl Iterator<Item = &str> {
        self.allowlist.iter().map(String::as_str)
    }

    pub fn denylist(&self) -> impl Iterator<Item = &str> {
        self.denylist.iter().map(String::as_str)
    }

    /// Whether configuration will still be consulted.
    pub fn reads_config(&self) -> bool {
        self.read_config
    }
}
