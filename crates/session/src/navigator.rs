//! Navigation seam between session logic and whatever renders pages

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Replaces the current page with another route
pub trait Navigator: Send + Sync {
    fn replace(&self, route: &str);
}

/// Forwards every navigation over a channel to the presentation loop
#[derive(Debug, Clone)]
pub struct ChannelNavigator {
    sender: mpsc::UnboundedSender<String>,
}

impl ChannelNavigator {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl Navigator for ChannelNavigator {
    fn replace(&self, route: &str) {
        tracing::debug!(route, "navigate");
        if self.sender.send(route.to_string()).is_err() {
            tracing::debug!(route, "Navigation dropped, no page is listening");
        }
    }
}

/// Keeps the history of navigations; handy for headless runs
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    history: Mutex<Vec<String>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current(&self) -> Option<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for HistoryNavigator {
    fn replace(&self, route: &str) {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(route.to_string());
    }
}
