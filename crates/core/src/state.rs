//! Root state container.
//!
//! [`Store`] owns the [`AppState`], applies [`Action`]s through the pure
//! slice reducers, and publishes every new state on a
//! `tokio::sync::watch` channel. It is cheap to clone and is meant to be
//! passed down explicitly rather than held in a global.

use std::sync::Arc;

use tokio::sync::watch;

use crate::session::{AuthAction, AuthState};

// ---------------------------------------------------------------------------
// UI slice
// ---------------------------------------------------------------------------

/// Volatile UI flags. Never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    /// Foreground requests currently in flight.
    pub in_flight: u32,
}

impl UiState {
    /// Whether a global spinner should be shown.
    pub fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn reduce(&mut self, action: UiAction) {
        match action {
            UiAction::RequestStarted => self.in_flight += 1,
            UiAction::RequestFinished => self.in_flight = self.in_flight.saturating_sub(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiAction {
    RequestStarted,
    RequestFinished,
}

// ---------------------------------------------------------------------------
// Root state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppState {
    pub auth: AuthState,
    pub ui: UiState,
}

impl AppState {
    pub fn reduce(&mut self, action: Action) {
        match action {
            Action::Auth(action) => self.auth.reduce(action),
            Action::Ui(action) => self.ui.reduce(action),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Auth(AuthAction),
    Ui(UiAction),
}

impl From<AuthAction> for Action {
    fn from(action: AuthAction) -> Self {
        Action::Auth(action)
    }
}

impl From<UiAction> for Action {
    fn from(action: UiAction) -> Self {
        Action::Ui(action)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Shared handle to the application state.
#[derive(Clone)]
pub struct Store {
    sender: Arc<watch::Sender<AppState>>,
}

impl Store {
    pub fn new(initial: AppState) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Apply `action` and notify subscribers.
    pub fn dispatch(&self, action: impl Into<Action>) {
        let action = action.into();
        tracing::trace!(?action, "dispatch");
        self.sender.send_modify(|state| state.reduce(action));
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AppState {
        self.sender.borrow().clone()
    }

    /// Read the current state without cloning it.
    pub fn with_state<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&self.sender.borrow())
    }

    /// Current access token, read fresh on every call.
    pub fn token(&self) -> Option<String> {
        self.with_state(|state| state.auth.token().map(str::to_owned))
    }

    /// Receive every state published after this call.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.sender.subscribe()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new(AppState::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_counter_never_underflows() {
        let store = Store::default();
        store.dispatch(UiAction::RequestFinished);
        assert_eq!(store.state().ui.in_flight, 0);

        store.dispatch(UiAction::RequestStarted);
        store.dispatch(UiAction::RequestStarted);
        assert!(store.state().ui.is_loading());
        store.dispatch(UiAction::RequestFinished);
        store.dispatch(UiAction::RequestFinished);
        assert!(!store.state().ui.is_loading());
    }

    #[tokio::test]
    async fn subscribers_see_dispatched_state() {
        let store = Store::default();
        let mut rx = store.subscribe();

        store.dispatch(AuthAction::SendOtpPending);
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().auth.is_loading);
    }

    #[test]
    fn token_is_none_when_logged_out() {
        assert!(Store::default().token().is_none());
    }
}
