//! Synchronous key-value state.
//!
//! The host state machine hands every command a [Store]. Reads and writes are
//! plain synchronous calls: a command never suspends, and the host serializes
//! command execution so no locking is needed inside the command layer. A host
//! that cannot guarantee serialized access can share a store as
//! `Arc<parking_lot::Mutex<S>>`, which also implements [Store].
//!
//! Commands must apply all of their writes or none of them. They do so by
//! writing into a [StoreOverlay] and committing it only once the command has
//! succeeded.

use crate::{Classify, ErrorKind};
use parking_lot::Mutex;
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::BTreeMap, sync::Arc};
use thiserror::Error;

/// The error type produced by [Store] implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// An error that occurs while encoding a record
    #[error("Failed to encode a record: {0}")]
    EncodeFailed(String),

    /// An error that occurs while decoding a record
    #[error("Failed to decode a record at {key}: {reason}")]
    DecodeFailed {
        /// Printable form of the key being decoded.
        key: String,
        /// Decoder message.
        reason: String,
    },
}

impl Classify for StoreError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// A [Store] is a facade over the host's key-value state. Keys are ordered
/// byte strings so that prefix scans can serve secondary indexes.
pub trait Store {
    /// Retrieve a value (if any) stored against the given key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Store the given value against the given key
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove the value (if any) stored against the given key
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// All entries whose key starts with `prefix`, in ascending key order
    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Retrieve and JSON-decode the value stored against `key`
    fn get_json<T: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError>
    where
        Self: Sized,
    {
        self.get(key)?
            .map(|bytes| decode_json(key, &bytes))
            .transpose()
    }

    /// JSON-encode `value` and store it against `key`
    fn set_json<T: Serialize>(&mut self, key: Vec<u8>, value: &T) -> Result<(), StoreError>
    where
        Self: Sized,
    {
        let bytes =
            serde_json::to_vec(value).map_err(|e| StoreError::EncodeFailed(e.to_string()))?;
        self.set(key, bytes)
    }
}

/// Decode a JSON record read from `key`.
pub fn decode_json<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::DecodeFailed {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

impl<S> Store for &mut S
where
    S: Store + ?Sized,
{
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        (**self).scan(prefix)
    }
}

impl<S> Store for Arc<Mutex<S>>
where
    S: Store,
{
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.lock().get(key)
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.lock().set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.lock().delete(key)
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.lock().scan(prefix)
    }
}

/// A trivial implementation of [Store] - backed by a [BTreeMap] - where all
/// values are kept in memory and never persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}

/// A [`StoreOverlay`] is a conjunction of a "true" backend and a buffer of
/// pending writes. All writes (and deletes) go to the buffer. All reads first
/// check the buffer, and then fall back to the backend.
///
/// [`StoreOverlay::commit`] flushes the buffer into the backend; dropping the
/// overlay instead discards every pending write.
pub struct StoreOverlay<S: Store> {
    backend: S,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<S: Store> StoreOverlay<S> {
    /// Wrap `backend` with an empty write buffer.
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            pending: BTreeMap::new(),
        }
    }

    /// Number of keys written or deleted since the overlay was created.
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Flush all pending writes into the backend and hand the backend back.
    pub fn commit(mut self) -> Result<S, StoreError> {
        for (key, value) in std::mem::take(&mut self.pending) {
            match value {
                Some(value) => self.backend.set(key, value)?,
                None => self.backend.delete(&key)?,
            }
        }
        Ok(self.backend)
    }

    /// Drop all pending writes and hand the backend back untouched.
    pub fn discard(self) -> S {
        self.backend
    }
}

impl<S: Store> Store for StoreOverlay<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        match self.pending.get(key) {
            Some(value) => Ok(value.clone()),
            None => self.backend.get(key),
        }
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.pending.insert(key, Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.backend.scan(prefix)?.into_iter().collect();

        for (key, value) in self
            .pending
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }
}

/// An auto-increment counter persisted alongside the table it numbers.
///
/// The counter is read, incremented and written back within the command that
/// allocates the id, so ids are unique and strictly increasing. The first id
/// handed out is `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    key: &'static [u8],
}

impl Sequence {
    /// A counter stored under `key`.
    pub const fn new(key: &'static [u8]) -> Self {
        Self { key }
    }

    /// The last id handed out, or `0` if none was.
    pub fn current<S: Store>(&self, store: &S) -> Result<u64, StoreError> {
        match store.get(self.key)? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] =
                    bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| StoreError::DecodeFailed {
                            key: String::from_utf8_lossy(self.key).into_owned(),
                            reason: format!("expected 8 counter bytes, got {}", bytes.len()),
                        })?;
                Ok(u64::from_be_bytes(raw))
            }
        }
    }

    /// Allocate the next id.
    pub fn next<S: Store>(&self, store: &mut S) -> Result<u64, StoreError> {
        let next = self
            .current(store)?
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend("sequence exhausted".into()))?;
        store.set(self.key.to_vec(), next.to_be_bytes().to_vec())?;
        Ok(next)
    }
}
