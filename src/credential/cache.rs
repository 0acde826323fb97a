//! In-memory bearer credential cache.
//!
//! Entries live for the process lifetime or until overwritten. Losing the
//! cache costs one renewal round-trip per user, never correctness.

use dashmap::DashMap;

use super::{BearerCredential, UserIdentity};

/// Concurrent map from user identity to the current bearer credential.
///
/// Shard locks are only held for the duration of the map access; no I/O
/// happens under them.
#[derive(Debug, Default)]
pub struct CredentialCache {
    entries: DashMap<UserIdentity, BearerCredential>,
}

impl CredentialCache {
    /// Create a new empty [`CredentialCache`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bearer credential for `user`, if any.
    pub fn get(&self, user: &UserIdentity) -> Option<BearerCredential> {
        self.entries.get(user).map(|entry| entry.value().clone())
    }

    /// Store `credential` for `user`, last writer wins.
    pub fn put(&self, user: UserIdentity, credential: BearerCredential) {
        self.entries.insert(user, credential);
    }

    /// Drop the entry for `user` so the next resolution renews.
    pub fn invalidate(&self, user: &UserIdentity) -> Option<BearerCredential> {
        self.entries.remove(user).map(|(_, credential)| credential)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
