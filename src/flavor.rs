//! Backend flavors: the immutable metadata that identifies a kind of backend.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use seekd_query::QueryDomain;

/// Metadata identifying one flavor of backend.
///
/// The name is the registry key. Lookups ignore case; the given
/// spelling is kept for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackendFlavor {
    name: String,
    rank: i32,
    domain: QueryDomain,
    requires_change_notification: bool,
    requires_extended_attributes: bool,
}

impl BackendFlavor {
    /// A flavor in `domain` with rank 0 and no host requirements.
    pub fn new(name: impl Into<String>, domain: QueryDomain) -> Self {
        Self {
            name: name.into(),
            rank: 0,
            domain,
            requires_change_notification: false,
            requires_extended_attributes: false,
        }
    }

    /// Higher ranks are preferred when presenting backends.
    #[must_use]
    pub fn with_rank(mut self, rank: i32) -> Self {
        self.rank = rank;
        self
    }

    /// The backend cannot run without file-system change notification.
    #[must_use]
    pub fn requiring_change_notification(mut self) -> Self {
        self.requires_change_notification = true;
        self
    }

    /// The backend cannot run without extended file attributes.
    #[must_use]
    pub fn requiring_extended_attributes(mut self) -> Self {
        self.requires_extended_attributes = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The lowercase registry key for this flavor.
    pub fn key(&self) -> String {
        registry_key(&self.name)
    }

    pub fn rank(&self) -> i32 {
        self.rank
    }

    pub fn domain(&self) -> QueryDomain {
        self.domain
    }

    pub fn requires_change_notification(&self) -> bool {
        self.requires_change_notification
    }

    pub fn requires_extended_attributes(&self) -> bool {
        self.requires_extended_attributes
    }
}

impl fmt::Display for BackendFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.domain)
    }
}

/// Normalise a backend name for registry lookups.
pub fn registry_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Host features a backend flavor may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// File-system change notification (inotify on Linux).
    pub change_notification: bool,
    /// Extended file attributes.
    pub extended_attributes: bool,
}

impl HostCapabilities {
    /// A host offering every capability.
    pub fn all() -> Self {
        Self {
            change_notification: true,
            extended_attributes: true,
        }
    }

    /// Probe the running system.
    pub fn detect() -> Self {
        Self {
            change_notification: detect_change_notification(),
            extended_attributes: cfg!(any(target_os = "linux", target_os = "macos")),
        }
    }

    /// Returns the first requirement of `flavor` this host does not meet.
    pub fn missing_for(&self, flavor: &BackendFlavor) -> Option<&'static str> {
        if flavor.requires_change_notification() && !self.change_notification {
            return Some("change notification");
        }
        if flavor.requires_extended_attributes() && !self.extended_attributes {
            return Some("extended attributes");
        }
        None
    }
}

#[cfg(target_os = "linux")]
fn detect_change_notification() -> bool {
    std::path::Path::new("/proc/sys/fs/inotify/max_user_watches").exists()
}

#[cfg(not(target_os = "linux"))]
fn detect_change_notification() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_defaults() {
        let flavor = BackendFlavor::new("Files", QueryDomain::Local);
        assert_eq!(flavor.name(), "Files");
        assert_eq!(flavor.key(), "files");
        assert_eq!(flavor.rank(), 0);
        assert!(!flavor.requires_change_notification());
        assert!(!flavor.requires_extended_attributes());
    }

    #[test]
    fn flavor_builders() {
        let flavor = BackendFlavor::new("mail", QueryDomain::Local)
            .with_rank(5)
            .requiring_change_notification()
            .requiring_extended_attributes();
        assert_eq!(flavor.rank(), 5);
        assert!(flavor.requires_change_notification());
        assert!(flavor.requires_extended_attributes());
    }

    #[test]
    fn flavor_display() {
        let flavor = BackendFlavor::new("manpages", QueryDomain::System);
        assert_eq!(flavor.to_string(), "manpages (system)");
    }

    #[test]
    fn registry_key_trims_and_lowercases() {
        assert_eq!(registry_key("  KMail "), "kmail");
    }

    #[test]
    fn missing_capabilities() {
        let host = HostCapabilities {
            change_notification: false,
            extended_attributes: true,
        };
        let watcher = BackendFlavor::new("files", QueryDomain::Local).requiring_change_notification();
        assert_eq!(host.missing_for(&watcher), Some("change notification"));

        let xattr = BackendFlavor::new("tags", QueryDomain::Local).requiring_extended_attributes();
        assert_eq!(host.missing_for(&xattr), None);
        assert_eq!(HostCapabilities::all().missing_for(&watcher), None);
    }
}
