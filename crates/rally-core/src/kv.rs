// crates/rally-core/src/kv.rs
// ============================================================================
// Module: Rally Key/Value Contract
// Description: Backend-agnostic string key/value store interface.
// Purpose: Give all app state one durable map with upsert and batch semantics.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! [`KeyValueStore`] is the interface the rest of the application uses for
//! local state: auth flags, encrypted API keys, cache namespaces, and the
//! storage migration flag. [`InMemoryKvStore`] is the volatile implementation
//! that predates the `SQLite` backend; it is the source side of the storage
//! migration and a convenient double in tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use crate::error::StorageError;

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Durable string key/value map.
///
/// # Invariants
/// - At most one value per key; every write is an upsert.
/// - Reading a missing key yields `Ok(None)`, never an error.
/// - [`KeyValueStore::set_many`] is all-or-nothing.
/// - A returned error means no state changed.
pub trait KeyValueStore: Send + Sync {
    /// Reads a single value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Inserts or replaces a single value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a key; removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn clear(&self) -> Result<(), StorageError>;

    /// Lists all keys in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Reads several keys, preserving the input order.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, StorageError>;

    /// Upserts several pairs as one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails; no pair is written.
    fn set_many(&self, pairs: &[(String, String)]) -> Result<(), StorageError>;

    /// Removes several keys.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the backend fails.
    fn remove_many(&self, keys: &[String]) -> Result<(), StorageError>;
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Volatile key/value store held in process memory.
///
/// # Invariants
/// - Contents are lost when the value is dropped.
/// - Keys iterate in ascending order.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    /// Entries guarded for shared access.
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryKvStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `pairs`.
    #[must_use]
    pub fn with_entries<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = pairs.into_iter().map(|(key, value)| (key.into(), value.into())).collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true when the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Locks the entry map, recovering from poisoning.
    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock().remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock().clear();
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.lock().keys().cloned().collect())
    }

    fn get_many(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, StorageError> {
        let entries = self.lock();
        Ok(keys.iter().map(|key| (key.clone(), entries.get(key).cloned())).collect())
    }

    fn set_many(&self, pairs: &[(String, String)]) -> Result<(), StorageError> {
        let mut entries = self.lock();
        for (key, value) in pairs {
            entries.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[String]) -> Result<(), StorageError> {
        let mut entries = self.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}
