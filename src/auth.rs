use std::sync::{PoisonError, RwLock};

use crate::records::UserId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Sign-in status not yet known
    Loading,
    SignedOut,
    SignedIn(UserId),
}

impl AuthState {
    pub fn user(&self) -> Option<&UserId> {
        match self {
            AuthState::SignedIn(user) => Some(user),
            AuthState::Loading | AuthState::SignedOut => None,
        }
    }
}

/// Source of the current user
pub trait AuthProvider: Send + Sync {
    fn current(&self) -> AuthState;
}

/// Auth state set by the caller, e.g. from a `--user` flag
#[derive(Debug)]
pub struct StaticAuth {
    state: RwLock<AuthState>,
}

impl StaticAuth {
    pub fn new(state: AuthState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    pub fn signed_in(user: impl Into<String>) -> Self {
        Self::new(AuthState::SignedIn(UserId::new(user)))
    }

    pub fn signed_out() -> Self {
        Self::new(AuthState::SignedOut)
    }

    pub fn set(&self, state: AuthState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl AuthProvider for StaticAuth {
    fn current(&self) -> AuthState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
