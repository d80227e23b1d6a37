use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Identity handed over by the external auth provider after sign-in.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
    #[serde(default)]
    pub email: Option<String>,
}

// access tokens must never end up in logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

/// Holder of the current session. Clones share the same state; subscribers
/// are woken on every sign-in and sign-out.
#[derive(Clone)]
pub struct SessionHolder {
    tx: Arc<watch::Sender<Option<Session>>>,
}

impl Default for SessionHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHolder {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<Session> {
        self.tx.borrow().clone()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.tx.borrow().as_ref().map(|s| s.user_id)
    }

    pub fn access_token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.access_token.clone())
    }

    pub fn sign_in(&self, session: Session) {
        tracing::info!("Session started for user {}", session.user_id);
        self.tx.send_replace(Some(session));
    }

    /// Clears the session, returning the one that was active.
    pub fn sign_out(&self) -> Option<Session> {
        let previous = self.tx.send_replace(None);
        if let Some(session) = &previous {
            tracing::info!("Session ended for user {}", session.user_id);
        }
        previous
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}
