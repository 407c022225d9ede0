//! Signed-in user lookup
//!
//! Sign-in itself happens elsewhere; the reconciliation core only needs to
//! know who the current user is before it permits a submission.

use fbk_common::config::SessionConfig;
use fbk_common::UserId;
use std::sync::RwLock;

/// Source of the current user's identity
pub trait Session: Send + Sync {
    /// `None` when nobody is signed in
    fn current_user(&self) -> Option<UserId>;
}

/// Session whose user is set explicitly
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<UserId>>,
}

impl StaticSession {
    pub fn signed_in(user: UserId) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            user: RwLock::new(config.user_id),
        }
    }

    pub fn sign_out(&self) {
        *self.user.write().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

impl Session for StaticSession {
    fn current_user(&self) -> Option<UserId> {
        *self.user.read().unwrap_or_else(|p| p.into_inner())
    }
}
