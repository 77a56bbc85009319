//! Authentication flow integration tests

mod common;

use common::{ScriptedProvider, memory_store};
use parley::chat::ChatSession;
use parley::{Accounts, AuthError};

#[test]
fn register_then_login_with_same_credentials_succeeds() {
    let accounts = Accounts::new(memory_store());

    for (username, password) in [("alice", "secret1"), ("bob", "hunter22"), ("carol", "pass word")]
    {
        accounts.register(username, password).unwrap();
        let user = accounts.login(username, password).unwrap();
        assert_eq!(user.username, username);
    }
}

#[test]
fn wrong_password_after_register_fails() {
    let accounts = Accounts::new(memory_store());
    accounts.register("alice", "secret1").unwrap();

    assert_eq!(
        accounts.login("alice", "not-the-password"),
        Err(AuthError::InvalidCredentials)
    );
}

#[test]
fn second_register_with_same_username_fails_regardless_of_password() {
    let accounts = Accounts::new(memory_store());
    accounts.register("alice", "secret1").unwrap();

    assert_eq!(
        accounts.register("alice", "secret1"),
        Err(AuthError::UsernameTaken)
    );
    assert_eq!(
        accounts.register("alice", "completely-different"),
        Err(AuthError::UsernameTaken)
    );
}

/// Sign up, sign out, sign back in: same credentials work and the
/// conversation starts empty
#[test]
fn signup_logout_login_shows_an_empty_log() {
    let store = memory_store();
    let accounts = Accounts::new(store.clone());

    accounts.register("alice", "secret1").unwrap();
    accounts.logout().unwrap();
    assert_eq!(accounts.current_user().unwrap(), None);

    let user = accounts.login("alice", "secret1").unwrap();
    assert_eq!(user.username, "alice");

    let provider = ScriptedProvider::new(vec![]);
    let session = ChatSession::new(provider, store, &user.username).unwrap();
    assert!(session.log().is_empty());
}

#[test]
fn current_user_survives_a_new_accounts_handle() {
    let store = memory_store();

    Accounts::new(store.clone())
        .register("alice", "secret1")
        .unwrap();

    // A fresh handle over the same store sees the saved session
    let restored = Accounts::new(store).current_user().unwrap();
    assert_eq!(restored.map(|u| u.username), Some("alice".to_string()));
}
