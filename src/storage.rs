//! In-memory storage module.
//!
//! Provides a thread-safe key-value store guarded by a single reader/writer
//! lock:
//! - `set` and `del` take the lock exclusively
//! - `get` shares the lock with other readers
//!
//! Entries carry an optional expiry that nothing sets yet. `get` already
//! performs the lazy-expiry check, so wiring in TTLs later only touches the
//! write path.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{info, trace};

/// A single stored value
#[derive(Debug, Clone)]
pub struct Entry {
    /// The stored payload
    pub data: Bytes,
    /// Absolute expiration time (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// Create an entry without expiry
    pub fn new(data: Bytes) -> Self {
        Entry {
            data,
            expires_at: None,
        }
    }

    /// Check if this entry has expired at `now`
    pub fn is_expired(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at,
            None => false,
        }
    }
}

/// Thread-safe in-memory key-value storage
#[derive(Debug, Default)]
pub struct Storage {
    data: RwLock<HashMap<Bytes, Entry>>,
}

impl Storage {
    /// Create a new storage instance
    pub fn new() -> Arc<Self> {
        info!("Initializing storage");
        Arc::new(Self::default())
    }

    // Critical sections never run foreign code, so a poisoned lock still
    // guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Bytes, Entry>> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Bytes, Entry>> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite the value stored under `key`
    pub fn set(&self, key: Bytes, value: Bytes) {
        trace!(key = ?key, len = value.len(), "Set");
        self.write().insert(key, Entry::new(value));
    }

    /// Get a copy of the value stored under `key`
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        let data = self.read();
        let entry = data.get(key)?;
        if entry.is_expired(Instant::now()) {
            trace!(key = ?key, "Entry expired on access");
            return None;
        }
        Some(entry.data.clone())
    }

    /// Remove `key`, returning whether it was present
    pub fn del(&self, key: &[u8]) -> bool {
        let removed = self.write().remove(key).is_some();
        trace!(key = ?key, removed, "Del");
        removed
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_basic_set_get() {
        let storage = Storage::new();
        storage.set(Bytes::from("key1"), Bytes::from("value1"));

        assert_eq!(storage.get(b"key1"), Some(Bytes::from("value1")));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let storage = Storage::new();
        assert!(storage.get(b"nonexistent").is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_overwrite() {
        let storage = Storage::new();
        storage.set(Bytes::from("key1"), Bytes::from("v1"));
        storage.set(Bytes::from("key1"), Bytes::from("v2"));

        assert_eq!(storage.get(b"key1"), Some(Bytes::from("v2")));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_delete() {
        let storage = Storage::new();
        storage.set(Bytes::from("key1"), Bytes::from("value1"));

        assert!(storage.del(b"key1"));
        assert!(storage.get(b"key1").is_none());

        // Second delete is a no-op
        assert!(!storage.del(b"key1"));
    }

    #[test]
    fn test_delete_never_set() {
        let storage = Storage::new();
        assert!(!storage.del(b"ghost"));
    }

    #[test]
    fn test_set_after_delete() {
        let storage = Storage::new();
        storage.set(Bytes::from("k"), Bytes::from("a"));
        storage.del(b"k");
        storage.set(Bytes::from("k"), Bytes::from("b"));

        assert_eq!(storage.get(b"k"), Some(Bytes::from("b")));
    }

    #[test]
    fn test_entry_expiry() {
        let now = Instant::now();
        let mut entry = Entry::new(Bytes::from("v"));
        assert!(!entry.is_expired(now));

        entry.expires_at = Some(now + Duration::from_secs(10));
        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_expired_entry_hidden() {
        let storage = Storage::new();
        let past = Instant::now() - Duration::from_millis(1);
        storage.write().insert(
            Bytes::from("old"),
            Entry {
                data: Bytes::from("stale"),
                expires_at: Some(past),
            },
        );

        assert!(storage.get(b"old").is_none());
    }

    #[test]
    fn test_concurrent_readers() {
        let storage = Storage::new();
        storage.set(Bytes::from("shared"), Bytes::from("value"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        assert_eq!(storage.get(b"shared"), Some(Bytes::from("value")));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_concurrent_writers_last_write_wins() {
        let storage = Storage::new();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let storage = Arc::clone(&storage);
                thread::spawn(move || {
                    for _ in 0..500 {
                        storage.set(Bytes::from("k"), Bytes::from(format!("writer-{}", i)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let value = storage.get(b"k").unwrap();
        let valid: Vec<Bytes> = (0..4)
            .map(|i| Bytes::from(format!("writer-{}", i)))
            .collect();
        assert!(valid.contains(&value));
    }
}
