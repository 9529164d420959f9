//! Name ↔ participant mapping shared by both buses.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::participant::ParticipantKey;

type Admission<P> = Box<dyn Fn(&P) -> bool + Send + Sync>;
type RegisterHook<P> = Box<dyn Fn(&str, &Arc<P>) + Send + Sync>;

struct Entry<P: ?Sized> {
    name: String,
    key: ParticipantKey,
    participant: Arc<P>,
}

/// Named participants in registration order.
///
/// A name maps to at most one participant and a participant holds at most
/// one name. Every failure is returned and logged; nothing panics.
pub struct Registry<P: ?Sized> {
    entries: Vec<Entry<P>>,
    admission: Option<Admission<P>>,
    on_register: Option<RegisterHook<P>>,
}

impl<P: ?Sized> Default for Registry<P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            admission: None,
            on_register: None,
        }
    }
}

impl<P: ?Sized> Registry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only participants for which `allowed` returns true may register.
    pub fn with_admission<F>(mut self, allowed: F) -> Self
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.admission = Some(Box::new(allowed));
        self
    }

    /// Run `hook` after every successful registration.
    pub fn with_register_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &Arc<P>) + Send + Sync + 'static,
    {
        self.on_register = Some(Box::new(hook));
        self
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        participant: Arc<P>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let key = ParticipantKey::of(&participant);

        let refused = if name.is_empty() {
            Some(RegistryError::EmptyName)
        } else if self.entries.iter().any(|e| e.name == name) {
            Some(RegistryError::NameTaken { name: name.clone() })
        } else if let Some(existing) = self.entries.iter().find(|e| e.key == key) {
            Some(RegistryError::AlreadyRegistered {
                name: existing.name.clone(),
            })
        } else if self
            .admission
            .as_ref()
            .is_some_and(|allowed| !allowed(&*participant))
        {
            Some(RegistryError::Refused { name: name.clone() })
        } else {
            None
        };

        if let Some(err) = refused {
            warn!(name = %name, error = %err, "Registration failed");
            return Err(err);
        }

        self.entries.push(Entry {
            name: name.clone(),
            key,
            participant: Arc::clone(&participant),
        });
        debug!(name = %name, count = self.entries.len(), "Registered participant");

        if let Some(hook) = &self.on_register {
            hook(&name, &participant);
        }
        Ok(())
    }

    /// Remove `participant`. It may register again afterwards, under any name.
    pub fn deregister<Q: ?Sized>(&mut self, participant: &Arc<Q>) -> Result<String, RegistryError> {
        let key = ParticipantKey::of(participant);
        let Some(index) = self.entries.iter().position(|e| e.key == key) else {
            warn!("Deregistration failed: participant is not registered");
            return Err(RegistryError::NotRegistered);
        };
        let entry = self.entries.remove(index);
        debug!(name = %entry.name, count = self.entries.len(), "Deregistered participant");
        Ok(entry.name)
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the registered participants, in registration order.
    pub fn list(&self) -> Vec<(String, Arc<P>)> {
        self.entries
            .iter()
            .map(|e| (e.name.clone(), Arc::clone(&e.participant)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<P>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| Arc::clone(&e.participant))
    }

    pub fn name_of<Q: ?Sized>(&self, participant: &Arc<Q>) -> Option<&str> {
        let key = ParticipantKey::of(participant);
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.name.as_str())
    }

    /// Drop every registration. Hooks and admission rules are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
