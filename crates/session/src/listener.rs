//! Presentation-side reaction to rejected credentials
//!
//! The API client only reports a 401. Whoever renders pages decides to send
//! the user to the login route, and only when running in a client context.

use crate::navigator::Navigator;
use sms_core::ExecutionContext;
use sms_http::AuthEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Redirects to the login route whenever the backend rejects our credentials
pub struct RedirectOnUnauthenticated {
    navigator: Arc<dyn Navigator>,
    context: ExecutionContext,
    login_route: String,
}

impl RedirectOnUnauthenticated {
    pub fn new(
        navigator: Arc<dyn Navigator>,
        context: ExecutionContext,
        login_route: impl Into<String>,
    ) -> Self {
        Self {
            navigator,
            context,
            login_route: login_route.into(),
        }
    }

    /// Handle one event. Returns true when a redirect happened.
    pub fn handle(&self, event: &AuthEvent) -> bool {
        match event {
            AuthEvent::Unauthenticated { status_code } if self.context.is_client() => {
                tracing::info!(status_code, route = %self.login_route, "Credentials rejected, redirecting");
                self.navigator.replace(&self.login_route);
                true
            }
            _ => false,
        }
    }

    /// Run until the event bus closes
    pub async fn run(self, mut events: broadcast::Receiver<AuthEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.handle(&event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Auth event listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    pub fn spawn(self, events: broadcast::Receiver<AuthEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::navigator::HistoryNavigator;
    use sms_http::AuthEvents;

    #[tokio::test]
    async fn redirects_on_unauthenticated() {
        let navigator = Arc::new(HistoryNavigator::new());
        let events = AuthEvents::new();
        let handle = RedirectOnUnauthenticated::new(
            navigator.clone(),
            ExecutionContext::Client,
            "/login",
        )
        .spawn(events.subscribe());

        events.emit(AuthEvent::TokensRefreshed);
        events.emit(AuthEvent::Unauthenticated { status_code: 401 });
        events.emit(AuthEvent::TokensCleared);
        drop(events);

        handle.await.unwrap();
        assert_eq!(navigator.history(), vec!["/login"]);
    }

    #[test]
    fn server_context_never_navigates() {
        let navigator = Arc::new(HistoryNavigator::new());
        let listener =
            RedirectOnUnauthenticated::new(navigator.clone(), ExecutionContext::Server, "/login");
        assert!(!listener.handle(&AuthEvent::Unauthenticated { status_code: 401 }));
        assert!(navigator.history().is_empty());
    }
}
