//! Conversation session integration tests
//!
//! Runs the session against a scripted provider; no network, no audio.

mod common;

use common::{ScriptedProvider, ScriptedReply, memory_store};
use parley::chat::{ChatSession, Role, SEND_FAILURE_REPLY, SendOutcome};
use parley::store::RecordKey;

#[tokio::test]
async fn each_send_appends_one_user_and_one_model_message() {
    let provider = ScriptedProvider::new(vec![
        ScriptedReply::Chunks(vec!["Hi!"]),
        ScriptedReply::Chunks(vec!["Again!"]),
    ]);
    let mut session = ChatSession::new(provider, memory_store(), "alice").unwrap();

    session.send("hello").await.unwrap();
    assert_eq!(session.log().len(), 2);

    session.send("hello again").await.unwrap();
    assert_eq!(session.log().len(), 4);

    assert_eq!(session.log()[0].role, Role::User);
    assert_eq!(session.log()[1].role, Role::Model);
}

#[tokio::test]
async fn blank_input_changes_nothing() {
    let provider = ScriptedProvider::new(vec![]);
    let mut session = ChatSession::new(provider.clone(), memory_store(), "alice").unwrap();

    assert_eq!(session.send("").await.unwrap(), SendOutcome::Ignored);
    assert_eq!(session.send("   \t  ").await.unwrap(), SendOutcome::Ignored);

    assert!(session.log().is_empty());
    assert_eq!(provider.open_count(), 0);
}

#[tokio::test]
async fn chunks_stream_into_a_single_model_message() {
    let provider = ScriptedProvider::new(vec![ScriptedReply::Chunks(vec!["Hel", "lo", " world"])]);
    let mut session = ChatSession::new(provider, memory_store(), "alice").unwrap();

    session.send("hi").await.unwrap();

    let model_messages: Vec<_> = session
        .log()
        .iter()
        .filter(|m| m.role == Role::Model)
        .collect();
    assert_eq!(model_messages.len(), 1);
    assert_eq!(model_messages[0].text(), "Hello world");
}

#[tokio::test]
async fn the_live_handle_is_created_once_from_prior_history() {
    let provider = ScriptedProvider::new(vec![
        ScriptedReply::Chunks(vec!["first reply"]),
        ScriptedReply::Chunks(vec!["second reply"]),
    ]);
    let mut session = ChatSession::new(provider.clone(), memory_store(), "alice").unwrap();

    session.send("first").await.unwrap();
    session.send("second").await.unwrap();

    // One chat opened for both sends, from the log as it was before the
    // first turn (empty here)
    assert_eq!(provider.open_count(), 1);
    assert!(provider.opened.lock().unwrap()[0].is_empty());

    // Each turn's text went through the live handle
    let sent = provider.sent.lock().unwrap();
    assert_eq!(sent.as_slice(), ["first", "second"]);
}

#[tokio::test]
async fn restored_history_is_replayed_in_order() {
    let store = memory_store();
    let provider = ScriptedProvider::new(vec![ScriptedReply::Chunks(vec!["ok"])]);

    // A prior conversation on disk
    {
        let first = ScriptedProvider::new(vec![ScriptedReply::Chunks(vec!["earlier reply"])]);
        let mut session = ChatSession::new(first, store.clone(), "alice").unwrap();
        session.send("earlier question").await.unwrap();
    }

    let mut session = ChatSession::new(provider.clone(), store, "alice").unwrap();
    assert_eq!(session.log().len(), 2);

    session.send("a new question").await.unwrap();

    let opened = provider.opened.lock().unwrap();
    let replayed = &opened[0];
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].role, Role::User);
    assert_eq!(replayed[0].text(), "earlier question");
    assert_eq!(replayed[1].role, Role::Model);
    assert_eq!(replayed[1].text(), "earlier reply");
}

#[tokio::test]
async fn mid_stream_failure_leaves_only_the_fixed_reply() {
    let provider =
        ScriptedProvider::new(vec![ScriptedReply::StreamError(vec!["partial con"])]);
    let mut session = ChatSession::new(provider, memory_store(), "alice").unwrap();

    session.send("hi").await.unwrap();

    assert_eq!(session.log().len(), 2);
    let last = session.log().last().unwrap();
    assert_eq!(last.role, Role::Model);
    assert_eq!(last.text(), SEND_FAILURE_REPLY);
    assert!(!session.is_sending());
}

#[tokio::test]
async fn request_failure_appends_the_fixed_reply() {
    let provider = ScriptedProvider::new(vec![ScriptedReply::RequestError]);
    let mut session = ChatSession::new(provider, memory_store(), "alice").unwrap();

    session.send("hi").await.unwrap();

    assert_eq!(session.log().len(), 2);
    assert_eq!(session.log()[1].text(), SEND_FAILURE_REPLY);
    assert!(!session.is_sending());
}

#[tokio::test]
async fn a_failed_send_does_not_poison_the_next_one() {
    let provider = ScriptedProvider::new(vec![
        ScriptedReply::RequestError,
        ScriptedReply::Chunks(vec!["recovered"]),
    ]);
    let mut session = ChatSession::new(provider, memory_store(), "alice").unwrap();

    session.send("first").await.unwrap();
    session.send("second").await.unwrap();

    assert_eq!(session.log().len(), 4);
    assert_eq!(session.log()[3].text(), "recovered");
}

#[tokio::test]
async fn sends_persist_the_log() {
    let store = memory_store();
    let provider = ScriptedProvider::new(vec![ScriptedReply::Chunks(vec!["saved"])]);
    let mut session = ChatSession::new(provider, store.clone(), "alice").unwrap();

    session.send("persist me").await.unwrap();

    let raw = store
        .get(&RecordKey::ChatHistory("alice"))
        .unwrap()
        .expect("history record missing");
    assert!(raw.contains("persist me"));
    assert!(raw.contains("saved"));
}

#[tokio::test]
async fn clear_empties_log_and_erases_history() {
    let store = memory_store();
    let provider = ScriptedProvider::new(vec![
        ScriptedReply::Chunks(vec!["one"]),
        ScriptedReply::Chunks(vec!["two"]),
    ]);
    let mut session = ChatSession::new(provider.clone(), store.clone(), "alice").unwrap();

    session.send("hello").await.unwrap();
    session.clear().unwrap();

    assert!(session.log().is_empty());
    assert!(store.get(&RecordKey::ChatHistory("alice")).unwrap().is_none());

    // The next send opens a fresh chat from the now-empty log
    session.send("fresh start").await.unwrap();
    assert_eq!(provider.open_count(), 2);
    assert!(provider.opened.lock().unwrap()[1].is_empty());
}

#[tokio::test]
async fn clear_on_an_empty_session_is_fine() {
    let provider = ScriptedProvider::new(vec![]);
    let mut session = ChatSession::new(provider, memory_store(), "alice").unwrap();

    session.clear().unwrap();
    assert!(session.log().is_empty());
}

#[tokio::test]
async fn logs_are_scoped_per_user() {
    let store = memory_store();
    let provider = ScriptedProvider::new(vec![ScriptedReply::Chunks(vec!["for alice"])]);
    let mut session = ChatSession::new(provider, store.clone(), "alice").unwrap();
    session.send("alice's message").await.unwrap();

    let other = ScriptedProvider::new(vec![]);
    let session = ChatSession::new(other, store, "bob").unwrap();
    assert!(session.log().is_empty());
}
