//! Identity provider seam.
//!
//! The engine never manages sign-in; it only asks who the current user is.

use std::sync::{PoisonError, RwLock};

use shopez_core::UserId;

/// Source of the current session's user.
pub trait IdentityProvider: Send + Sync {
    /// The signed-in user, or `None` when unauthenticated.
    fn current_user(&self) -> Option<UserId>;
}

/// Identity that never changes.
#[derive(Debug, Clone)]
pub struct StaticIdentity(Option<UserId>);

impl StaticIdentity {
    /// A signed-in user.
    #[must_use]
    pub const fn signed_in(user: UserId) -> Self {
        Self(Some(user))
    }

    /// No user.
    #[must_use]
    pub const fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.0.clone()
    }
}

/// Identity that follows sign-in and sign-out.
#[derive(Debug, Default)]
pub struct SessionIdentity {
    user: RwLock<Option<UserId>>,
}

impl SessionIdentity {
    /// Start signed out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful sign-in.
    pub fn sign_in(&self, user: UserId) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    /// Record a sign-out.
    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_user(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
