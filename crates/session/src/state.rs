//! Page-level session state

use sms_core::User;

/// What a role-restricted page knows about its session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionState {
    pub user: Option<User>,
    pub is_validating: bool,
    pub is_authorized: bool,
    pub session_error: Option<String>,
    pub api_healthy: bool,
}

/// Session state transitions
#[derive(Debug)]
pub enum SessionAction {
    StartValidation,
    Authorize(User),
    Fail(String),
    Deny(String),
    SetApiHealth(bool),
    Logout,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user: None,
            is_validating: true, // Nothing may render before the first validation
            is_authorized: false,
            session_error: None,
            api_healthy: true,
        }
    }
}

impl SessionState {
    #[must_use]
    pub fn reduce(self, action: SessionAction) -> Self {
        match action {
            SessionAction::StartValidation => Self {
                is_validating: true,
                session_error: None,
                ..self
            },
            SessionAction::Authorize(user) => Self {
                user: Some(user),
                is_validating: false,
                is_authorized: true,
                session_error: None,
                ..self
            },
            SessionAction::Fail(message) => Self {
                is_validating: false,
                is_authorized: false,
                session_error: Some(message),
                ..self
            },
            SessionAction::Deny(message) => Self {
                user: None,
                is_validating: false,
                is_authorized: false,
                session_error: Some(message),
                ..self
            },
            SessionAction::SetApiHealth(api_healthy) => Self {
                api_healthy,
                ..self
            },
            SessionAction::Logout => Self {
                is_validating: false,
                api_healthy: self.api_healthy,
                ..Self::default()
            },
        }
    }

    /// A loading indicator should be shown instead of page content
    pub fn is_loading(&self) -> bool {
        self.is_validating || (!self.is_authorized && self.session_error.is_none())
    }
}
