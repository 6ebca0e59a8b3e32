//! In-memory stores owned by the session client
//!
//! [`StateStore`] holds logins that have been sent to the provider and not
//! yet answered. [`UserStore`] holds authenticated sessions by key. Both are
//! process-local; a restart forgets every login and session.
//!
//! Both stores are bounded. A full [`StateStore`] evicts its oldest login,
//! and a full [`UserStore`] evicts the session closest to expiry after
//! sweeping the expired ones.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::oidc::session::{SessionKey, UserSession};

// ---------------------------------------------------------------------------
// PendingLogin
// ---------------------------------------------------------------------------

/// A login redirect awaiting its callback, keyed by `state`.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub state: String,
    pub nonce: String,
    pub code_verifier: String,
    pub created_at: DateTime<Utc>,
}

impl PendingLogin {
    /// Whether the login is older than `max_age`.
    pub fn is_stale(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now - self.created_at > max_age,
            Err(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// StateStore
// ---------------------------------------------------------------------------

/// Pending logins kept before the oldest is evicted
pub const MAX_PENDING_LOGINS: usize = 4096;

/// Pending logins by `state`. Each entry can be taken exactly once.
#[derive(Debug)]
pub struct StateStore {
    entries: RwLock<HashMap<String, PendingLogin>>,
    capacity: usize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::with_capacity(MAX_PENDING_LOGINS)
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding at most `capacity` logins (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Stores a login, returning the oldest login if it had to be evicted.
    pub fn insert(&self, login: PendingLogin) -> Option<PendingLogin> {
        let mut entries = self.entries.write();
        let mut evicted = None;
        if entries.len() >= self.capacity && !entries.contains_key(&login.state) {
            let oldest = entries
                .values()
                .min_by_key(|l| l.created_at)
                .map(|l| l.state.clone());
            evicted = oldest.and_then(|state| entries.remove(&state));
        }
        entries.insert(login.state.clone(), login);
        evicted
    }

    /// Removes and returns the login for `state`.
    pub fn take(&self, state: &str) -> Option<PendingLogin> {
        self.entries.write().remove(state)
    }

    /// Drops logins older than `max_age` and returns how many were removed.
    pub fn clear_stale(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, login| !login.is_stale(max_age, now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ---------------------------------------------------------------------------
// UserStore
// ---------------------------------------------------------------------------

/// Sessions kept before the one closest to expiry is evicted
pub const MAX_SESSIONS: usize = 10_000;

/// Authenticated sessions by key.
#[derive(Debug)]
pub struct UserStore {
    sessions: RwLock<HashMap<SessionKey, UserSession>>,
    capacity: usize,
}

impl Default for UserStore {
    fn default() -> Self {
        Self::with_capacity(MAX_SESSIONS)
    }
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store holding at most `capacity` sessions (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Stores a session under its own key, replacing any previous one.
    ///
    /// Expired sessions are dropped first. If the store is still full, the
    /// session expiring soonest goes; sessions without an expiry go last.
    pub fn put(&self, session: UserSession) {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        let swept = before - sessions.len();
        if swept > 0 {
            tracing::debug!(swept, "Dropped expired sessions");
        }

        if sessions.len() >= self.capacity && !sessions.contains_key(&session.key) {
            let victim = sessions
                .values()
                .min_by_key(|s| (s.expires_at.is_none(), s.expires_at))
                .map(|s| s.key.clone());
            if let Some(key) = victim {
                sessions.remove(&key);
                tracing::debug!(session = %key, "Evicted session from a full store");
            }
        }
        sessions.insert(session.key.clone(), session);
    }

    pub fn get(&self, key: &SessionKey) -> Option<UserSession> {
        self.sessions.read().get(key).cloned()
    }

    pub fn remove(&self, key: &SessionKey) -> Option<UserSession> {
        self.sessions.write().remove(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
