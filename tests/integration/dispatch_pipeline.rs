//! Integration tests for the notification pipeline:
//! dummy backend -> message cache -> channel -> dispatcher -> UI model.
//!
//! Verifies:
//! 1. `Connect` makes the dispatcher bootstrap contacts and chats.
//! 2. A backend with `AutoGetChatsOnLogin` is not asked again.
//! 3. Notifications reach the dispatcher in submission order.
//! 4. Console history is served from the cache once fetched.
//! 5. A sent message alone does not stand in for fetched history.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use nchat::app::App;
use nchat::cache::MessageCache;
use nchat::console::Command;
use nchat::dispatch::{self, Dispatcher};
use nchat::protocol::Protocol;
use nchat::protocol::dummy::DummyProtocol;

use nchat_proto::feature::ProtocolFeature;
use nchat_proto::request::RequestMessage;
use nchat_proto::service::{ServiceKind, ServiceMessage};

use tempfile::TempDir;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Pipeline {
    _dir: TempDir,
    protocol: Arc<DummyProtocol>,
    dispatcher: Dispatcher,
    rx: mpsc::UnboundedReceiver<ServiceMessage>,
}

fn pipeline(protocol: DummyProtocol) -> Pipeline {
    let dir = tempfile::tempdir().unwrap();
    let profiles = dir.path().join("profiles");
    std::fs::create_dir_all(&profiles).unwrap();

    let protocol = Arc::new(protocol);
    protocol.setup_profile(&profiles).unwrap();

    let cache = Arc::new(MessageCache::open(&dir.path().join("cache")).unwrap());
    let (tx, rx) = mpsc::unbounded_channel();
    protocol.set_message_handler(cache.subscribe(dispatch::message_handler(tx)));

    let mut dispatcher = Dispatcher::new(App::new("%H:%M"), Some(cache));
    dispatcher.add_protocol(Arc::clone(&protocol) as Arc<dyn Protocol>);

    Pipeline {
        _dir: dir,
        protocol,
        dispatcher,
        rx,
    }
}

impl Pipeline {
    /// Receive and dispatch one notification, returning its kind name.
    async fn step(&mut self) -> &'static str {
        let message = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notification channel closed");
        let name = message.kind.name();
        self.dispatcher.handle(message);
        name
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.protocol.logout();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_bootstraps_contacts_and_chats() {
    let mut p = pipeline(DummyProtocol::default());
    p.protocol.login().unwrap();

    assert_eq!(p.step().await, "Connect");
    assert_eq!(p.step().await, "NewContacts");
    assert_eq!(p.step().await, "NewChats");

    let view = p.dispatcher.app().profile("Dummy_0").unwrap();
    assert!(view.connected);
    assert_eq!(view.contacts.len(), 26);
    assert_eq!(view.chats_by_recency()[0].id, "Alice_0");

    let lines = p.dispatcher.app_mut().drain_system_messages();
    assert_eq!(lines, vec!["Dummy_0: connected", "Dummy_0: 26 chats"]);
}

#[tokio::test]
async fn auto_get_chats_backend_is_not_asked_again() {
    let mut p = pipeline(
        DummyProtocol::default().with_features([ProtocolFeature::AutoGetChatsOnLogin]),
    );
    p.protocol.login().unwrap();
    p.step().await;

    let next = tokio::time::timeout(Duration::from_millis(200), p.rx.recv()).await;
    assert!(next.is_err(), "unexpected notification {next:?}");
    assert!(p.dispatcher.app().profile("Dummy_0").unwrap().chats.is_empty());
}

#[tokio::test]
async fn notifications_follow_request_order() {
    let mut p = pipeline(DummyProtocol::default().with_features([
        ProtocolFeature::AutoGetChatsOnLogin,
    ]));
    p.protocol.login().unwrap();
    p.step().await;

    let texts: Vec<String> = (0..20).map(|i| format!("message {i}")).collect();
    for text in &texts {
        p.protocol
            .send_request(RequestMessage::send_text("Dave_3", text.clone()));
    }

    let mut echoed = Vec::new();
    for _ in &texts {
        let message = p.rx.recv().await.unwrap();
        if let ServiceKind::SendMessage { chat_message, .. } = &message.kind {
            echoed.push(chat_message.text.clone());
        }
        p.dispatcher.handle(message);
    }
    assert_eq!(echoed, texts);
    assert_eq!(
        p.dispatcher.app().profile("Dummy_0").unwrap().messages["Dave_3"].len(),
        20
    );
}

#[tokio::test]
async fn history_is_fetched_then_served_from_cache() {
    let mut p = pipeline(DummyProtocol::default().with_features([
        ProtocolFeature::AutoGetChatsOnLogin,
    ]));
    p.protocol.login().unwrap();
    p.step().await;
    p.dispatcher.app_mut().drain_system_messages();

    let history = Command::parse("history Dummy_0 Alice_0").unwrap().unwrap();
    assert_eq!(p.dispatcher.execute(history.clone()), ControlFlow::Continue(()));
    assert_eq!(
        p.dispatcher.app_mut().drain_system_messages(),
        vec!["Dummy_0: fetching history for Alice_0"]
    );

    assert_eq!(p.step().await, "NewMessages");
    p.dispatcher.app_mut().drain_system_messages();

    assert_eq!(p.dispatcher.execute(history), ControlFlow::Continue(()));
    let lines = p.dispatcher.app_mut().drain_system_messages();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].ends_with("Alice_0: Hello from Alice"), "{}", lines[0]);
}

#[tokio::test]
async fn history_after_send_still_fetches_from_backend() {
    let mut p = pipeline(DummyProtocol::default().with_features([
        ProtocolFeature::AutoGetChatsOnLogin,
    ]));
    p.protocol.login().unwrap();
    p.step().await;

    p.protocol
        .send_request(RequestMessage::send_text("Alice_0", "hi"));
    assert_eq!(p.step().await, "SendMessage");
    p.dispatcher.app_mut().drain_system_messages();

    let history = Command::parse("history Dummy_0 Alice_0").unwrap().unwrap();
    assert_eq!(p.dispatcher.execute(history.clone()), ControlFlow::Continue(()));
    assert_eq!(
        p.dispatcher.app_mut().drain_system_messages(),
        vec!["Dummy_0: fetching history for Alice_0"]
    );

    assert_eq!(p.step().await, "NewMessages");
    p.dispatcher.app_mut().drain_system_messages();

    assert_eq!(p.dispatcher.execute(history), ControlFlow::Continue(()));
    let lines = p.dispatcher.app_mut().drain_system_messages();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].ends_with("Alice_0: Hello from Alice"), "{}", lines[0]);
    assert!(lines[1].ends_with(": hi"), "{}", lines[1]);
}
