//! Mock authentication against locally stored credentials
//!
//! Passwords are stored and compared as plaintext strings. This is a login
//! gate for a single-machine client, not a security mechanism, and is
//! documented as such.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{RecordKey, RecordStore};

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// The signed-in identity; the username is the whole of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

/// Failures reported inline by the auth surface
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("username and password are both required")]
    MissingField,

    #[error("password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,

    #[error("that username is already taken")]
    UsernameTaken,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("store error: {0}")]
    Store(String),
}

impl From<crate::Error> for AuthError {
    fn from(e: crate::Error) -> Self {
        Self::Store(e.to_string())
    }
}

/// Account registry over the record store
#[derive(Clone)]
pub struct Accounts {
    store: RecordStore,
}

impl Accounts {
    #[must_use]
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Create an account and sign it in
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UsernameTaken`] for duplicate usernames, and
    /// validation errors for blank fields or short passwords.
    pub fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        validate(username, password)?;

        let key = RecordKey::Credentials(username);
        if self.store.get(&key)?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        self.store.set(&key, password)?;
        tracing::info!(username, "account registered");
        self.sign_in(username)
    }

    /// Sign in with an existing account
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] for unknown usernames and
    /// wrong passwords alike, and validation errors for blank fields.
    pub fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingField);
        }

        let stored = self.store.get(&RecordKey::Credentials(username))?;
        if stored.as_deref() != Some(password) {
            return Err(AuthError::InvalidCredentials);
        }

        tracing::info!(username, "logged in");
        self.sign_in(username)
    }

    /// Clear the signed-in user record
    ///
    /// # Errors
    ///
    /// Returns error if the store write fails
    pub fn logout(&self) -> crate::Result<()> {
        self.store.remove(&RecordKey::CurrentUser)
    }

    /// The user restored from the saved session, if any
    ///
    /// # Errors
    ///
    /// Returns error if the store query fails
    pub fn current_user(&self) -> crate::Result<Option<User>> {
        let Some(raw) = self.store.get(&RecordKey::CurrentUser)? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    fn sign_in(&self, username: &str) -> Result<User, AuthError> {
        let user = User {
            username: username.to_string(),
        };
        let raw = serde_json::to_string(&user).map_err(|e| AuthError::Store(e.to_string()))?;
        self.store.set(&RecordKey::CurrentUser, &raw)?;
        Ok(user)
    }
}

fn validate(username: &str, password: &str) -> Result<(), AuthError> {
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::MissingField);
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AuthError::PasswordTooShort);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_memory;

    fn setup() -> Accounts {
        Accounts::new(open_memory().unwrap())
    }

    #[test]
    fn register_then_login_succeeds() {
        let accounts = setup();
        accounts.register("alice", "secret1").unwrap();

        let user = accounts.login("alice", "secret1").unwrap();
        assert_eq!(user.username, "alice");
    }

    #[test]
    fn wrong_password_is_rejected() {
        let accounts = setup();
        accounts.register("alice", "secret1").unwrap();

        assert_eq!(
            accounts.login("alice", "wrong-1"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn unknown_user_is_rejected() {
        let accounts = setup();
        assert_eq!(
            accounts.login("ghost", "whatever"),
            Err(AuthError::InvalidCredentials)
        );
    }

    #[test]
    fn duplicate_username_is_rejected() {
        let accounts = setup();
        accounts.register("alice", "secret1").unwrap();

        assert_eq!(
            accounts.register("alice", "different-password"),
            Err(AuthError::UsernameTaken)
        );
    }

    #[test]
    fn short_password_is_rejected() {
        let accounts = setup();
        assert_eq!(
            accounts.register("alice", "short"),
            Err(AuthError::PasswordTooShort)
        );
    }

    #[test]
    fn blank_fields_are_rejected() {
        let accounts = setup();
        assert_eq!(accounts.register("", "secret1"), Err(AuthError::MissingField));
        assert_eq!(accounts.register("alice", ""), Err(AuthError::MissingField));
        assert_eq!(accounts.login("", ""), Err(AuthError::MissingField));
    }

    #[test]
    fn login_saves_current_user() {
        let accounts = setup();
        accounts.register("alice", "secret1").unwrap();
        assert_eq!(
            accounts.current_user().unwrap().map(|u| u.username),
            Some("alice".to_string())
        );

        accounts.logout().unwrap();
        assert_eq!(accounts.current_user().unwrap(), None);
    }
}
