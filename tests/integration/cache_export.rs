//! Integration tests for cache persistence and JSON export.
//!
//! Verifies:
//! 1. Notifications folded into the cache survive flush and reopen.
//! 2. Export writes per-profile chat lists and per-chat message files.
//! 3. `nchat --export` exports without logging any backend in.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use nchat::cache::MessageCache;
use nchat::dispatch;
use nchat::protocol::Protocol;
use nchat::protocol::dummy::DummyProtocol;

use nchat_proto::message::{ChatInfo, ChatMessage};
use nchat_proto::request::RequestMessage;
use nchat_proto::service::ServiceMessage;

use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn recv(rx: &mut mpsc::UnboundedReceiver<ServiceMessage>) -> ServiceMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notification channel closed")
}

/// Run a dummy session against `confdir`: connect, list chats, read Alice's
/// history, send one message to Bob, then log out and flush the cache.
async fn populate(confdir: &Path) {
    let profiles = confdir.join("profiles");
    std::fs::create_dir_all(&profiles).unwrap();

    let protocol = DummyProtocol::default();
    protocol.setup_profile(&profiles).unwrap();

    let cache = Arc::new(MessageCache::open(&confdir.join("cache")).unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    protocol.set_message_handler(cache.subscribe(dispatch::message_handler(tx)));
    protocol.login().unwrap();
    recv(&mut rx).await;

    protocol.send_request(RequestMessage::GetChats);
    protocol.send_request(RequestMessage::GetMessages {
        chat_id: "Alice_0".into(),
        from_msg_id: None,
        limit: 10,
    });
    protocol.send_request(RequestMessage::send_text("Bob_1", "see you"));
    for _ in 0..3 {
        recv(&mut rx).await;
    }

    protocol.logout().unwrap();
    protocol.close_profile().unwrap();
    assert_eq!(cache.flush().unwrap(), 1);
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let bytes = std::fs::read(path).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn flushed_cache_reopens_with_same_state() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path()).await;

    let reopened = MessageCache::open(&dir.path().join("cache")).unwrap();
    assert_eq!(reopened.profile_ids(), vec!["Dummy_0".to_string()]);
    assert_eq!(reopened.chats("Dummy_0").len(), 26);
    assert_eq!(reopened.messages("Dummy_0", "Alice_0").len(), 1);

    let bob = reopened.messages("Dummy_0", "Bob_1");
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].text, "see you");
    assert!(bob[0].is_outgoing);
}

#[tokio::test]
async fn export_writes_chat_and_message_files() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path()).await;
    let out = dir.path().join("export");

    let cache = MessageCache::open(&dir.path().join("cache")).unwrap();
    let summary = cache.export(&out).unwrap();
    assert_eq!(summary.profiles, 1);
    assert_eq!(summary.chats, 2);
    assert_eq!(summary.messages, 2);

    let chats: Vec<ChatInfo> = read_json(&out.join("Dummy_0").join("chats.json"));
    assert_eq!(chats.len(), 26);
    // Bob's chat carries the latest activity after the send.
    let bob = chats.iter().find(|c| c.id == "Bob_1").unwrap();
    assert!(chats.iter().all(|c| c.last_message_time <= bob.last_message_time));

    let alice: Vec<ChatMessage> =
        read_json(&out.join("Dummy_0").join("messages").join("Alice_0.json"));
    assert_eq!(alice.len(), 1);
    assert_eq!(alice[0].sender_id, "Alice_0");
}

#[tokio::test]
async fn binary_export_needs_no_running_backend() {
    let dir = tempfile::tempdir().unwrap();
    populate(dir.path()).await;
    let out = dir.path().join("export");

    let output = Command::new(env!("CARGO_BIN_EXE_nchat"))
        .arg("-d")
        .arg(dir.path())
        .arg("-x")
        .arg(&out)
        .env_remove("NCHAT_LOG")
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("exported 1 profiles"), "{stdout}");
    assert!(out.join("Dummy_0").join("messages").join("Bob_1.json").is_file());
}
