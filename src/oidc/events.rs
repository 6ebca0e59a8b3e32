//! Session lifecycle events and their observers
//!
//! Observers are plain callbacks registered per event kind. [`SessionEvents::raise`]
//! calls every observer of the raised kind exactly once, synchronously, in
//! registration order. Events raised before an observer is registered are not
//! replayed to it.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::oidc::session::{SessionKey, UserSession};

/// Callback invoked for a user-loaded event
pub type UserLoadedHandler = Arc<dyn Fn(&UserSession) + Send + Sync + 'static>;

/// Callback invoked for a silent-renew failure
pub type SilentRenewErrorHandler = Arc<dyn Fn(&SilentRenewFailure) + Send + Sync + 'static>;

/// Callback invoked when the provider ended a session
pub type UserSignedOutHandler = Arc<dyn Fn(&SessionKey) + Send + Sync + 'static>;

/// A lifecycle event raised by the session client
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was established or its tokens were refreshed
    UserLoaded(UserSession),
    /// A background token refresh failed
    SilentRenewError(SilentRenewFailure),
    /// The provider reported that the session has ended
    UserSignedOut(SessionKey),
}

/// Details of a failed silent renewal
#[derive(Debug, Clone)]
pub struct SilentRenewFailure {
    pub key: SessionKey,
    pub message: String,
}

/// Registry of lifecycle observers
#[derive(Default)]
pub struct SessionEvents {
    user_loaded: RwLock<Vec<UserLoadedHandler>>,
    silent_renew_error: RwLock<Vec<SilentRenewErrorHandler>>,
    user_signed_out: RwLock<Vec<UserSignedOutHandler>>,
}

impl std::fmt::Debug for SessionEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEvents")
            .field("user_loaded", &self.user_loaded.read().len())
            .field("silent_renew_error", &self.silent_renew_error.read().len())
            .field("user_signed_out", &self.user_signed_out.read().len())
            .finish()
    }
}

impl SessionEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user_loaded<F>(&self, f: F)
    where
        F: Fn(&UserSession) + Send + Sync + 'static,
    {
        self.user_loaded.write().push(Arc::new(f));
    }

    pub fn add_silent_renew_error<F>(&self, f: F)
    where
        F: Fn(&SilentRenewFailure) + Send + Sync + 'static,
    {
        self.silent_renew_error.write().push(Arc::new(f));
    }

    pub fn add_user_signed_out<F>(&self, f: F)
    where
        F: Fn(&SessionKey) + Send + Sync + 'static,
    {
        self.user_signed_out.write().push(Arc::new(f));
    }

    /// Delivers `event` to the observers registered for its kind.
    ///
    /// The observer list is snapshotted before delivery, so an observer may
    /// register further observers without deadlocking; those only see later
    /// events.
    pub fn raise(&self, event: &SessionEvent) {
        match event {
            SessionEvent::UserLoaded(session) => {
                let handlers = self.user_loaded.read().clone();
                for handler in handlers {
                    handler(session);
                }
            }
            SessionEvent::SilentRenewError(failure) => {
                let handlers = self.silent_renew_error.read().clone();
                for handler in handlers {
                    handler(failure);
                }
            }
            SessionEvent::UserSignedOut(key) => {
                let handlers = self.user_signed_out.read().clone();
                for handler in handlers {
                    handler(key);
                }
            }
        }
    }

    /// Total number of registered observers across all kinds.
    pub fn observer_count(&self) -> usize {
        self.user_loaded.read().len()
            + self.silent_renew_error.read().len()
            + self.user_signed_out.read().len()
    }
}
