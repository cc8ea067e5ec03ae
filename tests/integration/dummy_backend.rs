//! End-to-end tests of the dummy backend through the cache and dispatcher
//! channel.
//!
//! Verifies:
//! 1. Login delivers `Connect` from the worker thread.
//! 2. `GetChats` yields the 26 seeded chats with decreasing activity times.
//! 3. `GetMessages` for a seeded chat caches exactly its one incoming message.
//! 4. `SendMessage` echoes the text back as a successful outgoing message.
//! 5. Logout stops the worker and later requests are dropped.

use std::sync::Arc;
use std::time::Duration;

use nchat::cache::MessageCache;
use nchat::dispatch;
use nchat::protocol::Protocol;
use nchat::protocol::dummy::{DummyProtocol, NAMES};

use nchat_proto::request::RequestMessage;
use nchat_proto::service::{ServiceKind, ServiceMessage};

use tempfile::TempDir;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Session {
    _dir: TempDir,
    protocol: Arc<DummyProtocol>,
    cache: Arc<MessageCache>,
    rx: mpsc::UnboundedReceiver<ServiceMessage>,
    profile_id: String,
}

/// Set up a fresh dummy profile, wire it through a cache, log in, and
/// consume the `Connect` notification.
async fn logged_in() -> Session {
    let dir = tempfile::tempdir().unwrap();
    let profiles = dir.path().join("profiles");
    std::fs::create_dir_all(&profiles).unwrap();

    let protocol = Arc::new(DummyProtocol::default());
    let profile_id = protocol.setup_profile(&profiles).unwrap();

    let cache = Arc::new(MessageCache::open(&dir.path().join("cache")).unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    protocol.set_message_handler(cache.subscribe(dispatch::message_handler(tx)));
    protocol.login().unwrap();

    let mut session = Session {
        _dir: dir,
        protocol,
        cache,
        rx,
        profile_id,
    };
    let connect = session.next().await;
    assert_eq!(connect.kind, ServiceKind::Connect { success: true });
    session
}

impl Session {
    async fn next(&mut self) -> ServiceMessage {
        tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notification channel closed")
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_reports_connect_for_profile() {
    let session = logged_in().await;
    assert_eq!(session.profile_id, "Dummy_0");
    assert_eq!(session.protocol.profile_id(), "Dummy_0");
    assert_eq!(session.protocol.profile_display_name(), "Dummy #0");
}

#[tokio::test]
async fn get_chats_returns_seeded_chats() {
    let mut session = logged_in().await;
    session.protocol.send_request(RequestMessage::GetChats);

    let message = session.next().await;
    assert_eq!(message.profile_id, session.profile_id);
    let ServiceKind::NewChats { success, chats } = message.kind else {
        panic!("expected NewChats, got {:?}", message.kind);
    };
    assert!(success);
    assert_eq!(chats.len(), 26);

    for (index, (chat, name)) in chats.iter().zip(NAMES).enumerate() {
        assert_eq!(chat.id, format!("{name}_{index}"));
        assert_eq!(chat.name, name);
    }
    assert!(
        chats
            .windows(2)
            .all(|pair| pair[0].last_message_time > pair[1].last_message_time)
    );

    // The cache saw the same notification before the channel did.
    assert_eq!(session.cache.chats(&session.profile_id).len(), 26);
}

#[tokio::test]
async fn get_messages_caches_seeded_message() {
    let mut session = logged_in().await;
    session.protocol.send_request(RequestMessage::GetChats);
    session.next().await;

    session.protocol.send_request(RequestMessage::GetMessages {
        chat_id: "Alice_0".into(),
        from_msg_id: None,
        limit: 50,
    });
    let message = session.next().await;
    assert!(matches!(
        message.kind,
        ServiceKind::NewMessages { success: true, ref chat_id, .. } if chat_id == "Alice_0"
    ));

    let cached = session.cache.messages(&session.profile_id, "Alice_0");
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].sender_id, "Alice_0");
    assert!(!cached[0].is_outgoing);
}

#[tokio::test]
async fn older_history_of_seeded_chat_is_empty() {
    let mut session = logged_in().await;
    session.protocol.send_request(RequestMessage::GetMessages {
        chat_id: "Bob_1".into(),
        from_msg_id: Some("Bob_1_0".into()),
        limit: 50,
    });
    let message = session.next().await;
    let ServiceKind::NewMessages {
        success, messages, ..
    } = message.kind
    else {
        panic!("expected NewMessages");
    };
    assert!(success);
    assert!(messages.is_empty());
}

#[tokio::test]
async fn send_message_echoes_text() {
    let mut session = logged_in().await;
    session
        .protocol
        .send_request(RequestMessage::send_text("Carol_2", "hi"));

    let message = session.next().await;
    let ServiceKind::SendMessage {
        success,
        chat_id,
        chat_message,
    } = message.kind
    else {
        panic!("expected SendMessage");
    };
    assert!(success);
    assert_eq!(chat_id, "Carol_2");
    assert_eq!(chat_message.text, "hi");
    assert!(chat_message.is_outgoing);

    let cached = session.cache.messages(&session.profile_id, "Carol_2");
    assert!(cached.iter().any(|m| m.id == chat_message.id));
}

#[tokio::test]
async fn unknown_message_ids_fail_asynchronously() {
    let mut session = logged_in().await;
    session.protocol.send_request(RequestMessage::DeleteMessage {
        chat_id: "Alice_0".into(),
        msg_id: "missing".into(),
    });
    let message = session.next().await;
    assert_eq!(message.kind.success(), Some(false));
}

#[tokio::test]
async fn logout_stops_worker_and_drops_requests() {
    let mut session = logged_in().await;
    session.protocol.logout().unwrap();

    session.protocol.send_request(RequestMessage::GetChats);
    let late = tokio::time::timeout(Duration::from_millis(200), session.rx.recv()).await;
    assert!(late.is_err(), "stopped backend answered {late:?}");

    session.protocol.close_profile().unwrap();
}

#[tokio::test]
async fn close_before_logout_is_rejected() {
    let session = logged_in().await;
    assert!(session.protocol.close_profile().is_err());
    session.protocol.logout().unwrap();
    session.protocol.close_profile().unwrap();
}
