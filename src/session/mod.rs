// Session state: who is signed in, where that is persisted, and the
// controller that moves between anonymous and active.

mod controller;
mod store;

pub use controller::{AuthError, SessionController, SessionState};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError, StoredSession};

use crate::models::User;
use crate::util::token_fingerprint;
use std::fmt;

/// The authenticated identity held while the user is signed in
#[derive(Clone, PartialEq)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub auth_token: String,
}

impl Session {
    pub fn new(token: impl Into<String>, user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            display_name: user.name.clone(),
            email: user.email.clone(),
            auth_token: token.into(),
        }
    }
}

// Hand-written so the token never ends up in logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("auth_token", &token_fingerprint(&self.auth_token))
            .finish()
    }
}
