//! Page-level session handling for the school management client
//!
//! A role-restricted page mounts a [`SessionGuard`] to decide whether it may
//! render, then keeps it watching until the page goes away. Navigation is
//! delegated to a [`Navigator`] so the same logic drives any front end.

pub mod guard;
pub mod listener;
pub mod navigator;
pub mod probe;
pub mod state;

pub use guard::{DEFAULT_POLL_INTERVAL, MountOutcome, SessionGuard, WatchOutcome};
pub use listener::RedirectOnUnauthenticated;
pub use navigator::{ChannelNavigator, HistoryNavigator, Navigator};
pub use probe::SessionProbe;
pub use state::{SessionAction, SessionState};
