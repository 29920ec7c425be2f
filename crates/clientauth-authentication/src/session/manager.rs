//! Bounded cache of authenticated sessions.
//!
//! Sessions are stored under an internal id derived from the credentials, so
//! a device reconnecting with the same credentials replaces its old session
//! instead of adding a second one. Hosts only ever see the external id, a
//! random UUID that stops resolving once its session is replaced, evicted or
//! closed.

use super::factory::SessionCreator;
use crate::errors::Result;
use clientauth_core::config::{MAX_ACTIVE_SESSIONS, MIN_ACTIVE_SESSIONS};
use clientauth_core::Session;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;
use uuid::Uuid;

struct SessionEntry {
    external_id: String,
    session: Arc<Session>,
}

/// LRU keyed by internal id plus the external id index. Both are only ever
/// touched together under one lock.
struct SessionCache {
    sessions: LruCache<String, SessionEntry>,
    external_ids: HashMap<String, String>,
}

impl SessionCache {
    fn forget(&mut self, entry: &SessionEntry) {
        self.external_ids.remove(&entry.external_id);
    }

    fn fresh_external_id(&self) -> String {
        loop {
            let candidate = Uuid::new_v4().to_string();
            if !self.external_ids.contains_key(&candidate) {
                return candidate;
            }
        }
    }
}

/// LRU cache of sessions addressed by external id.
pub struct SessionManager {
    creator: Arc<SessionCreator>,
    cache: Mutex<SessionCache>,
}

impl SessionManager {
    /// Capacity is clamped into the configured session range.
    pub fn new(creator: Arc<SessionCreator>, capacity: usize) -> Self {
        Self {
            creator,
            cache: Mutex::new(SessionCache {
                sessions: LruCache::new(clamp_capacity(capacity)),
                external_ids: HashMap::new(),
            }),
        }
    }

    /// Factory dispatch used for new sessions.
    pub fn creator(&self) -> &Arc<SessionCreator> {
        &self.creator
    }

    /// Authenticate `credentials` and return the external id of the new
    /// session.
    pub async fn create_session(
        &self,
        credential_type: &str,
        credentials: &HashMap<String, String>,
    ) -> Result<String> {
        let session = match self.creator.create_session(credential_type, credentials).await {
            Ok(session) => Arc::new(session),
            Err(err) => {
                tracing::debug!(credential_type, error = %err, "Session creation failed");
                return Err(err);
            }
        };
        let internal_id = internal_session_id(credential_type, credentials);

        let mut cache = self.cache.lock();
        let external_id = cache.fresh_external_id();
        let displaced = cache.sessions.push(
            internal_id.clone(),
            SessionEntry {
                external_id: external_id.clone(),
                session,
            },
        );
        if let Some((displaced_id, entry)) = displaced {
            if displaced_id == internal_id {
                tracing::debug!(session_id = %entry.external_id, "Replacing session for same credentials");
            } else {
                tracing::trace!(session_id = %entry.external_id, "Session cache at capacity, closing session");
            }
            cache.forget(&entry);
        }
        cache.external_ids.insert(external_id.clone(), internal_id);
        drop(cache);

        tracing::debug!(session_id = %external_id, credential_type, "Created session");
        Ok(external_id)
    }

    /// Look up a session. Counts as a use for LRU ordering.
    pub fn find_session(&self, external_id: &str) -> Option<Arc<Session>> {
        let mut cache = self.cache.lock();
        let internal_id = cache.external_ids.get(external_id)?.clone();
        cache
            .sessions
            .get(&internal_id)
            .map(|entry| entry.session.clone())
    }

    /// Close a session. Closing an unknown id is a no-op.
    pub fn close_session(&self, external_id: &str) -> bool {
        let mut cache = self.cache.lock();
        let Some(internal_id) = cache.external_ids.remove(external_id) else {
            return false;
        };
        cache.sessions.pop(&internal_id);
        tracing::debug!(session_id = %external_id, "Closed session");
        true
    }

    /// Change the capacity, evicting least recently used sessions if the
    /// cache is now over it. Out-of-range values are clamped.
    pub fn set_capacity(&self, capacity: usize) {
        let capacity = clamp_capacity(capacity);
        let mut cache = self.cache.lock();
        while cache.sessions.len() > capacity.get() {
            match cache.sessions.pop_lru() {
                Some((_, entry)) => cache.forget(&entry),
                None => break,
            }
        }
        cache.sessions.resize(capacity);
    }

    /// Maximum number of cached sessions.
    pub fn capacity(&self) -> usize {
        self.cache.lock().sessions.cap().get()
    }

    /// Number of cached sessions.
    pub fn len(&self) -> usize {
        self.cache.lock().sessions.len()
    }

    /// Whether no session is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cache = self.cache.lock();
        f.debug_struct("SessionManager")
            .field("sessions", &cache.sessions.len())
            .field("capacity", &cache.sessions.cap())
            .finish_non_exhaustive()
    }
}

fn clamp_capacity(capacity: usize) -> NonZeroUsize {
    let min = usize::try_from(MIN_ACTIVE_SESSIONS).unwrap_or(1);
    let max = usize::try_from(MAX_ACTIVE_SESSIONS).unwrap_or(usize::MAX);
    NonZeroUsize::new(capacity.clamp(min, max)).unwrap_or(NonZeroUsize::MIN)
}

/// Deterministic id for a credential set: SHA-256 over the credential type
/// and the key-sorted credentials, each field length-prefixed.
pub fn internal_session_id(credential_type: &str, credentials: &HashMap<String, String>) -> String {
    let sorted: BTreeMap<&String, &String> = credentials.iter().collect();
    let mut hasher = Sha256::new();
    let mut field = |bytes: &[u8]| {
        hasher.update((bytes.len() as u64).to_be_bytes());
        hasher.update(bytes);
    };
    field(credential_type.as_bytes());
    for (key, value) in sorted {
        field(key.as_bytes());
        field(value.as_bytes());
    }
    hex::encode(hasher.finalize())
}
