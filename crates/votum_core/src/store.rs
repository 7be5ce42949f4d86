//! Local persistent state.
//!
//! [`KeyValueStore`] is the raw port (string values under string keys).
//! [`LocalStore`] layers JSON collections on top of it. Its plain `read`
//! never fails: missing or corrupt entries come back as the caller's
//! default. Read-modify-write sequences go through
//! [`LocalStore::transaction`], where a failing backend aborts the whole
//! unit instead of handing out a default that would then be written back.

use crate::error::StoreError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

pub const MEASURES_KEY: &str = "measures.local";
pub const VOTES_KEY: &str = "votes.local";
pub const COMMENTS_KEY: &str = "comments.local";
pub const USER_ID_KEY: &str = "user.id";
pub const TOKEN_KEY: &str = "token";

/// Reads and writes inside one atomic unit of a [`KeyValueStore`].
pub trait RawTransaction {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Runs `body` with exclusive write access to the whole store, shared
    /// with every other handle on the same data. Writes land when `body`
    /// returns `Ok` and are discarded otherwise. `body` is called once.
    fn transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn RawTransaction) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTransaction<'a> {
    entries: &'a HashMap<String, String>,
    staged: HashMap<String, String>,
}

impl RawTransaction for MemoryTransaction<'_> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .staged
            .get(key)
            .or_else(|| self.entries.get(key))
            .cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.staged.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn RawTransaction) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        let staged = {
            let mut tx = MemoryTransaction {
                entries: &*entries,
                staged: HashMap::new(),
            };
            body(&mut tx)?;
            tx.staged
        };
        entries.extend(staged);
        Ok(())
    }
}

/// JSON view over a raw store. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn KeyValueStore>,
}

impl LocalStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.backend.get(key) {
            Ok(Some(raw)) => decode_or(key, &raw, default),
            Ok(None) => default,
            Err(err) => {
                warn!(key, error = %err, "store read failed, using default");
                default
            }
        }
    }

    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = encode(key, value)?;
        debug!(key, bytes = encoded.len(), "store write");
        self.backend.set(key, &encoded)
    }

    /// Runs `body` as one atomic read-modify-write unit.
    ///
    /// Everything `body` writes commits together, and only when it returns
    /// `Ok`; an `Err` rolls back and is handed to the caller unchanged.
    /// `body` must do all its store access through the [`Transaction`]:
    /// touching this `LocalStore` from inside it blocks.
    pub fn transaction<R, E>(
        &self,
        body: impl FnOnce(&mut Transaction<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let mut body = Some(body);
        let mut outcome: Option<Result<R, E>> = None;

        let committed = self.backend.transaction(&mut |raw: &mut dyn RawTransaction| {
            let body = body.take().ok_or(StoreError::Aborted)?;
            let mut tx = Transaction { raw };
            match body(&mut tx) {
                Ok(value) => {
                    outcome = Some(Ok(value));
                    Ok(())
                }
                Err(err) => {
                    outcome = Some(Err(err));
                    Err(StoreError::Aborted)
                }
            }
        });

        match (committed, outcome) {
            (Ok(()), Some(result)) => result,
            (Err(StoreError::Aborted), Some(Err(err))) => Err(err),
            (Err(err), _) => Err(err.into()),
            (Ok(()), None) => Err(StoreError::Aborted.into()),
        }
    }

    /// Plain string scalars such as the user id are stored unquoted.
    pub fn read_scalar(&self, key: &str) -> Option<String> {
        match self.backend.get(key) {
            Ok(value) => value.filter(|value| !value.trim().is_empty()),
            Err(err) => {
                warn!(key, error = %err, "store read failed");
                None
            }
        }
    }

    pub fn write_scalar(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.backend.set(key, value)
    }
}

/// Store access inside [`LocalStore::transaction`].
pub struct Transaction<'t> {
    raw: &'t mut dyn RawTransaction,
}

impl Transaction<'_> {
    /// Corrupt entries still read as `default`, but a failing backend is an
    /// error so the caller never writes a default over data it could not see.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, StoreError> {
        Ok(match self.raw.get(key)? {
            Some(raw) => decode_or(key, &raw, default),
            None => default,
        })
    }

    pub fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), StoreError> {
        let encoded = encode(key, value)?;
        debug!(key, bytes = encoded.len(), "store write");
        self.raw.set(key, &encoded)
    }

    pub fn read_scalar(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .raw
            .get(key)?
            .filter(|value| !value.trim().is_empty()))
    }

    pub fn write_scalar(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.raw.set(key, value)
    }
}

fn decode_or<T: DeserializeOwned>(key: &str, raw: &str, default: T) -> T {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(err) => {
            warn!(key, error = %err, "corrupt entry in local store, using default");
            default
        }
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Memory store whose next `failures` reads of `key` fail.
    pub struct FailingReads {
        inner: MemoryStore,
        key: &'static str,
        failures: AtomicUsize,
    }

    impl FailingReads {
        pub fn new(key: &'static str, failures: usize) -> Self {
            Self {
                inner: MemoryStore::new(),
                key,
                failures: AtomicUsize::new(failures),
            }
        }

        pub fn fail_next(&self, failures: usize) {
            self.failures.store(failures, Ordering::SeqCst);
        }
    }

    fn check(key: &str, failing: &str, failures: &AtomicUsize) -> Result<(), StoreError> {
        let take_one = |left: usize| left.checked_sub(1);
        if key == failing && failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, take_one).is_ok() {
            return Err(StoreError::Poisoned);
        }
        Ok(())
    }

    struct FailingTransaction<'a> {
        inner: &'a mut dyn RawTransaction,
        key: &'static str,
        failures: &'a AtomicUsize,
    }

    impl RawTransaction for FailingTransaction<'_> {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            check(key, self.key, self.failures)?;
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value)
        }
    }

    impl KeyValueStore for FailingReads {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            check(key, self.key, &self.failures)?;
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.set(key, value)
        }

        fn transaction(
            &self,
            body: &mut dyn FnMut(&mut dyn RawTransaction) -> Result<(), StoreError>,
        ) -> Result<(), StoreError> {
            let (key, failures) = (self.key, &self.failures);
            self.inner.transaction(&mut |raw: &mut dyn RawTransaction| {
                body(&mut FailingTransaction {
                    inner: raw,
                    key,
                    failures,
                })
            })
        }
    }
}
