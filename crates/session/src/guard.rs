//! Session guard for role-restricted pages
//!
//! A page mounts the guard with the role it requires. The guard decides
//! between rendering, redirecting, or showing a retryable error, and once the
//! page is authorized it keeps polling until the page goes away.

use crate::navigator::Navigator;
use crate::probe::SessionProbe;
use crate::state::{SessionAction, SessionState};
use sms_core::{Role, User};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Interval between health probes while a page is mounted
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

const VALIDATION_FAILED: &str = "Session validation failed. Please try again.";

/// Result of mounting a guarded page
#[derive(Debug, Clone, PartialEq)]
pub enum MountOutcome {
    /// Render the page
    Authorized(User),
    /// Sent to the login page
    RedirectedToLogin,
    /// Sent to the dashboard of the role the user actually has
    RedirectedToHome(Role),
    /// Validation could not complete; offer a retry
    Failed(String),
}

/// How a watch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The page was never authorized, so nothing was watched
    NotAuthorized,
    /// The page unmounted
    Unmounted,
    /// The session was found invalid; tokens were cleared and the user sent to login
    LoggedOut,
}

/// Session validation for one mounted page
pub struct SessionGuard {
    probe: Arc<dyn SessionProbe>,
    navigator: Arc<dyn Navigator>,
    required_role: Role,
    poll_interval: Duration,
    state: Mutex<SessionState>,
}

impl SessionGuard {
    pub fn new(
        probe: Arc<dyn SessionProbe>,
        navigator: Arc<dyn Navigator>,
        required_role: Role,
    ) -> Self {
        Self {
            probe,
            navigator,
            required_role,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: Mutex::new(SessionState::default()),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn required_role(&self) -> Role {
        self.required_role
    }

    /// Snapshot of the page state
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn dispatch(&self, action: SessionAction) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state = std::mem::take(&mut *state).reduce(action);
    }

    fn redirect_to_login(&self) -> MountOutcome {
        self.navigator.replace(self.required_role.login_route());
        MountOutcome::RedirectedToLogin
    }

    /// Validate the session for this page. Also used for retries.
    pub async fn mount(&self) -> MountOutcome {
        self.dispatch(SessionAction::StartValidation);

        if !self.probe.has_local_session() {
            tracing::debug!(role = %self.required_role, "No local session, redirecting to login");
            self.dispatch(SessionAction::Logout);
            return self.redirect_to_login();
        }

        let (validation, health) =
            tokio::join!(self.probe.validate_session(), self.probe.check_health());
        self.dispatch(SessionAction::SetApiHealth(health.api));

        let validation = match validation {
            Ok(validation) => validation,
            Err(e) => {
                tracing::warn!("Session validation failed: {e}");
                self.dispatch(SessionAction::Fail(VALIDATION_FAILED.to_string()));
                return MountOutcome::Failed(VALIDATION_FAILED.to_string());
            }
        };

        if !validation.valid {
            tracing::info!("Session rejected by backend, logging out");
            self.probe.clear_tokens();
            self.dispatch(SessionAction::Logout);
            return self.redirect_to_login();
        }

        let Some(user) = validation.user else {
            self.dispatch(SessionAction::Logout);
            return self.redirect_to_login();
        };

        if user.role != self.required_role {
            tracing::info!(
                required = %self.required_role,
                actual = %user.role,
                "Role mismatch, redirecting to home"
            );
            self.dispatch(SessionAction::Deny(format!(
                "You do not have {} access.",
                self.required_role
            )));
            self.navigator.replace(user.role.home_route());
            return MountOutcome::RedirectedToHome(user.role);
        }

        self.dispatch(SessionAction::Authorize(user.clone()));
        MountOutcome::Authorized(user)
    }

    /// Poll health and session validity until `unmounted` fires or the session dies
    pub async fn watch(&self, unmounted: CancellationToken) -> WatchOutcome {
        if !self.state().is_authorized {
            return WatchOutcome::NotAuthorized;
        }

        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.poll_interval,
            self.poll_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = unmounted.cancelled() => return WatchOutcome::Unmounted,
                _ = ticker.tick() => {
                    if let Some(outcome) = self.poll_once().await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> Option<WatchOutcome> {
        let health = self.probe.check_health().await;
        self.dispatch(SessionAction::SetApiHealth(health.api));

        // Local credentials still good, or nothing to ask: keep going
        if health.auth || !health.api {
            return None;
        }

        match self.probe.validate_session().await {
            Ok(validation) if validation.valid => None,
            Ok(_) => {
                tracing::info!("Session invalidated while page was mounted");
                self.probe.clear_tokens();
                self.dispatch(SessionAction::Logout);
                self.redirect_to_login();
                Some(WatchOutcome::LoggedOut)
            }
            Err(e) => {
                tracing::warn!("Periodic session validation failed: {e}");
                None
            }
        }
    }
}
