use crate::models::User;

/// Read access to the authenticated user. `None` means the session is not
/// ready and data operations are skipped.
pub trait SessionStore: Send + Sync {
    fn current_user(&self) -> Option<User>;
}

/// Store fixed at startup from the saved session, if any.
#[derive(Debug, Default)]
pub struct StaticSession {
    user: Option<User>,
}

impl StaticSession {
    pub fn new(user: Option<User>) -> Self {
        StaticSession { user }
    }
}

impl SessionStore for StaticSession {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }
}
