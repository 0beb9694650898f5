//! Authentication events
//!
//! The client never navigates on its own. It publishes what happened to the
//! token state and presentation code subscribes to decide what to do about it.

use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 32;

/// Change in authentication state observed by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The backend rejected a request as unauthenticated; tokens were cleared
    Unauthenticated { status_code: u16 },
    /// Stored tokens were removed (logout, failed refresh, invalid session)
    TokensCleared,
    /// A refresh produced a new access token
    TokensRefreshed,
}

/// Fan-out channel for [`AuthEvent`]s
#[derive(Debug, Clone)]
pub struct AuthEvents {
    sender: broadcast::Sender<AuthEvent>,
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    /// Subscribe to events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; dropped silently when nobody listens
    pub fn emit(&self, event: AuthEvent) {
        tracing::trace!(?event, "auth event");
        let _ = self.sender.send(event);
    }
}
