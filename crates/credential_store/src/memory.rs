use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::CredentialStoreError;
use crate::store::{lock_unpoisoned, validate_entry};
use crate::KeyStore;

/// In-process [`KeyStore`] for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyStore for MemoryKeyStore {
    fn get(&self, name: &str) -> Result<Option<String>, CredentialStoreError> {
        Ok(lock_unpoisoned(&self.entries).get(name).cloned())
    }

    fn set(&self, name: &str, value: &str) -> Result<(), CredentialStoreError> {
        validate_entry(name, value)?;
        lock_unpoisoned(&self.entries).insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, CredentialStoreError> {
        Ok(lock_unpoisoned(&self.entries).remove(name).is_some())
    }
}
