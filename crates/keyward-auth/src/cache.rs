//! Snapshot cache of verification keys.
//!
//! Readers clone the `Arc` of the current snapshot and look keys up without
//! further locking. A refresh builds a complete new snapshot and swaps it in.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::materialize::VerificationKey;

/// One complete, immutable generation of the key set.
#[derive(Debug)]
pub struct KeySnapshot {
    keys: HashMap<String, Arc<VerificationKey>>,
    generation: u64,
    fetched_at: Instant,
    fetched_at_utc: DateTime<Utc>,
}

impl KeySnapshot {
    /// Create a snapshot fetched now.
    #[must_use]
    pub fn new(keys: HashMap<String, Arc<VerificationKey>>, generation: u64) -> Self {
        Self {
            keys,
            generation,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
        }
    }

    /// Get a key by ID.
    #[must_use]
    pub fn get(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        self.keys.get(kid).cloned()
    }

    /// Sorted key IDs in this snapshot.
    #[must_use]
    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Monotonically increasing generation number, starting at 1.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// When the snapshot's document was fetched.
    #[must_use]
    pub const fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Wall-clock time the snapshot's document was fetched.
    #[must_use]
    pub const fn fetched_at_utc(&self) -> DateTime<Utc> {
        self.fetched_at_utc
    }
}

/// Holder of the current [`KeySnapshot`].
#[derive(Debug, Default)]
pub struct KeyCache {
    current: RwLock<Option<Arc<KeySnapshot>>>,
}

impl KeyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key in the current snapshot.
    #[must_use]
    pub fn lookup(&self, kid: &str) -> Option<Arc<VerificationKey>> {
        self.current.read().as_ref().and_then(|snapshot| snapshot.get(kid))
    }

    /// The current snapshot, if one has been installed.
    #[must_use]
    pub fn snapshot(&self) -> Option<Arc<KeySnapshot>> {
        self.current.read().clone()
    }

    /// Replace the current snapshot, returning the previous one.
    pub fn install(&self, snapshot: Arc<KeySnapshot>) -> Option<Arc<KeySnapshot>> {
        self.current.write().replace(snapshot)
    }
}
