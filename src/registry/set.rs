//! The set of live registrations, indexed by name and by instance.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::BackendId;
use crate::flavor::registry_key;
use crate::registry::Registration;

/// Registrations in load order, with name and identity lookups.
///
/// Built once during loading and never modified afterwards.
#[derive(Debug, Default)]
pub struct RegistrationSet {
    registrations: Vec<Arc<Registration>>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<BackendId, usize>,
}

impl RegistrationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `registration`. The first registration for a name wins, and a
    /// backend instance may be registered only once; later ones are rejected
    /// and `false` is returned.
    pub fn insert(&mut self, registration: Registration) -> bool {
        let key = registration.flavor().key();
        if self.by_name.contains_key(&key) {
            tracing::warn!(
                backend = %registration.flavor(),
                "a backend with this name is already registered, skipping"
            );
            return false;
        }
        if let Some(&existing) = self.by_id.get(&registration.id()) {
            tracing::warn!(
                backend = %registration.flavor(),
                registered_as = %self.registrations[existing].flavor(),
                "this backend instance is already registered, skipping"
            );
            return false;
        }
        let index = self.registrations.len();
        self.by_id.insert(registration.id(), index);
        self.by_name.insert(key, index);
        self.registrations.push(Arc::new(registration));
        true
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Registration>> {
        self.by_name
            .get(&registry_key(name))
            .map(|&i| &self.registrations[i])
    }

    pub fn get_by_id(&self, id: BackendId) -> Option<&Arc<Registration>> {
        self.by_id.get(&id).map(|&i| &self.registrations[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(&registry_key(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Registration>> {
        self.registrations.iter()
    }

    /// Display names in load order.
    pub fn names(&self) -> Vec<String> {
        self.registrations
            .iter()
            .map(|r| r.name().to_owned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
