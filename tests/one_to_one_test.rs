use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use chat_sdk::{ChatService, LocalChatService, Part, StaticTokenProvider, User};
use pairchat::{
    one_to_one_room_id, ChatProvider, OneToOneChat, ProjectorError, ProjectorPhase,
    ProviderConfig,
};

const LOCATOR: &str = "v1:test:f83ad143-342f-4085-9639-9a809dc96466";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn service_with_users(ids: &[&str]) -> Arc<LocalChatService> {
    let service = Arc::new(LocalChatService::new());
    for id in ids {
        service.add_user(User::new(id));
    }
    service
}

fn provider_for(
    service: &Arc<LocalChatService>,
    user_id: &str,
) -> ChatProvider<LocalChatService, StaticTokenProvider> {
    ChatProvider::new(
        Arc::clone(service),
        StaticTokenProvider::new(),
        ProviderConfig::new(LOCATOR, user_id),
    )
}

/// Connected projector for alice talking to bob, plus the room id.
async fn alice_to_bob(
    service: &Arc<LocalChatService>,
) -> (OneToOneChat<LocalChatService>, String) {
    let provider = provider_for(service, "alice");
    let mut chat = OneToOneChat::new(provider.handle(), "bob");
    provider.connect().await;
    chat.start().await;
    let room_id = chat.room_id().expect("No room id after setup").to_string();
    (chat, room_id)
}

#[tokio::test]
async fn full_one_to_one_flow() {
    init_logging();
    let service = Arc::new(LocalChatService::new());
    service.add_user(User::new("alice"));
    service.add_user(User::with_name("bob", "Bob"));
    let provider = provider_for(&service, "alice");
    let mut chat = OneToOneChat::new(provider.handle(), "bob");

    assert!(chat.is_loading());
    assert!(chat.other_user().is_none());

    provider.connect().await;
    chat.start().await;

    assert!(!chat.is_loading());
    assert_eq!(chat.phase(), ProjectorPhase::Ready);
    let other = chat.other_user().expect("No peer view after setup");
    assert_eq!(other.user.id, "bob");
    assert_eq!(other.user.name, Some("Bob".to_string()));
    assert!(!other.is_typing);
    assert!(chat.messages().is_empty());
    let room_id = chat.room_id().expect("No room id").to_string();
    assert_eq!(room_id, one_to_one_room_id("alice", "bob"));

    // Inbound: bob says hi.
    service
        .send_message(&room_id, "bob", vec![Part::text("Hi!")])
        .await
        .expect("Failed to send message");
    chat.try_drain_events();
    assert_eq!(chat.messages().len(), 1);
    assert_eq!(chat.messages()[0].sender_id, "bob");
    assert_eq!(chat.messages()[0].parts, vec![Part::text("Hi!")]);

    // Outbound: alice answers.
    chat.send_simple_message("MY_MESSAGE")
        .await
        .expect("Failed to send simple message");
    let stored = service.room_messages(&room_id);
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].sender_id, "alice");
    assert_eq!(stored[1].parts, vec![Part::text("MY_MESSAGE")]);
}

#[tokio::test]
async fn absent_room_is_created_exactly_once() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let (_chat, _room_id) = alice_to_bob(&service).await;
    assert_eq!(service.create_room_calls(), 1);
}

#[tokio::test]
async fn existing_room_is_not_recreated() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let room_id = one_to_one_room_id("alice", "bob");
    service.add_room(&room_id, vec!["alice".to_string(), "bob".to_string()]);

    let (chat, _) = alice_to_bob(&service).await;
    assert_eq!(chat.phase(), ProjectorPhase::Ready);
    assert_eq!(service.create_room_calls(), 0);
}

#[tokio::test]
async fn typing_events_only_track_the_configured_peer() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let (mut chat, room_id) = alice_to_bob(&service).await;

    service
        .send_typing_indicator(&room_id, "bob")
        .await
        .expect("Failed to send typing indicator");
    chat.try_drain_events();
    assert!(chat.other_user().expect("No peer view").is_typing);

    // Another subject on the same stream must not flip the flag back.
    service.stop_typing(&room_id, "carol");
    chat.try_drain_events();
    assert!(chat.other_user().expect("No peer view").is_typing);

    service.stop_typing(&room_id, "bob");
    chat.try_drain_events();
    assert!(!chat.other_user().expect("No peer view").is_typing);
}

#[tokio::test]
async fn presence_is_recorded_for_the_peer_only() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let (mut chat, _room_id) = alice_to_bob(&service).await;
    assert_eq!(chat.other_user().expect("No peer view").presence, None);

    service.set_presence("bob", "online");
    chat.try_drain_events();
    assert_eq!(
        chat.other_user().expect("No peer view").presence,
        Some("online".to_string())
    );

    // The local user's presence is not part of the peer view.
    service.set_presence("alice", "away");
    chat.try_drain_events();
    assert_eq!(
        chat.other_user().expect("No peer view").presence,
        Some("online".to_string())
    );
}

#[tokio::test]
async fn peer_read_cursor_is_hydrated_and_updated() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let room_id = one_to_one_room_id("alice", "bob");
    service.add_room(&room_id, vec!["alice".to_string(), "bob".to_string()]);
    service
        .set_read_cursor(&room_id, "bob", 3)
        .await
        .expect("Failed to set cursor");

    let (mut chat, _) = alice_to_bob(&service).await;
    // Resolved by direct query during hydration, not from an event.
    assert_eq!(
        chat.other_user().expect("No peer view").last_read_message_id,
        Some(3)
    );

    service
        .set_read_cursor(&room_id, "bob", 5)
        .await
        .expect("Failed to set cursor");
    chat.try_drain_events();
    assert_eq!(
        chat.other_user().expect("No peer view").last_read_message_id,
        Some(5)
    );

    // The local user's own cursor never shows up in the peer view.
    service
        .set_read_cursor(&room_id, "alice", 5)
        .await
        .expect("Failed to set cursor");
    chat.try_drain_events();
    assert_eq!(
        chat.other_user().expect("No peer view").last_read_message_id,
        Some(5)
    );
}

#[tokio::test]
async fn read_cursor_advance_is_idempotent() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let (mut chat, room_id) = alice_to_bob(&service).await;

    // Empty log: nothing to advance to.
    let advanced = chat.set_read_cursor().await.expect("Cursor advance failed");
    assert_eq!(advanced, None);
    assert_eq!(service.set_read_cursor_calls(), 0);

    service
        .send_message(&room_id, "bob", vec![Part::text("one")])
        .await
        .expect("Failed to send message");
    let second = service
        .send_message(&room_id, "bob", vec![Part::text("two")])
        .await
        .expect("Failed to send message");
    chat.try_drain_events();

    let advanced = chat.set_read_cursor().await.expect("Cursor advance failed");
    assert_eq!(advanced, Some(second.id));
    assert_eq!(service.set_read_cursor_calls(), 1);
    assert_eq!(service.read_cursor(&room_id, "alice"), Some(second.id));

    // No new messages: the duplicate advance is suppressed locally.
    let advanced = chat.set_read_cursor().await.expect("Cursor advance failed");
    assert_eq!(advanced, None);
    assert_eq!(service.set_read_cursor_calls(), 1);

    let third = service
        .send_message(&room_id, "bob", vec![Part::text("three")])
        .await
        .expect("Failed to send message");
    chat.try_drain_events();
    let advanced = chat.set_read_cursor().await.expect("Cursor advance failed");
    assert_eq!(advanced, Some(third.id));
    assert_eq!(service.set_read_cursor_calls(), 2);
}

#[tokio::test]
async fn multipart_messages_round_trip() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let (chat, room_id) = alice_to_bob(&service).await;

    let parts = vec![Part::new(
        "application/json",
        &serde_json::json!({ "year": 2019 }).to_string(),
    )];
    chat.send_multipart_message(parts.clone())
        .await
        .expect("Failed to send multipart message");

    let stored = service.room_messages(&room_id);
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].parts, parts);
}

#[tokio::test]
async fn setup_failure_is_terminal_and_exposes_no_peer() {
    init_logging();
    // "nobody" is not registered, so room creation fails.
    let service = service_with_users(&["alice"]);
    let provider = provider_for(&service, "alice");
    let mut chat = OneToOneChat::new(provider.handle(), "nobody");
    provider.connect().await;
    chat.start().await;

    assert_eq!(chat.phase(), ProjectorPhase::Failed);
    assert!(chat.is_loading());
    assert!(chat.other_user().is_none());

    let result = chat.send_simple_message("hello?").await;
    assert!(matches!(result, Err(ProjectorError::SessionNotReady)));
}

#[tokio::test]
async fn actions_before_setup_are_rejected() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let provider = provider_for(&service, "alice");
    let chat = OneToOneChat::new(provider.handle(), "bob");

    let result = chat.send_typing_event().await;
    assert!(matches!(result, Err(ProjectorError::SessionNotReady)));
}

#[tokio::test]
async fn snapshot_watch_publishes_every_change() {
    init_logging();
    let service = service_with_users(&["alice", "bob"]);
    let provider = provider_for(&service, "alice");
    let mut chat = OneToOneChat::new(provider.handle(), "bob");
    let mut rx = chat.subscribe();
    assert!(rx.borrow().is_loading);

    provider.connect().await;
    chat.start().await;
    let room_id = chat.room_id().expect("No room id").to_string();
    {
        let snapshot = rx.borrow_and_update();
        assert!(!snapshot.is_loading);
        assert_eq!(
            snapshot.other_user.as_ref().map(|p| p.user.id.as_str()),
            Some("bob")
        );
        assert!(snapshot.messages.is_empty());
    }

    // Hand the projector its own event loop and observe via the watch.
    let worker = tokio::spawn(chat.run());

    service
        .send_message(&room_id, "bob", vec![Part::text("ping")])
        .await
        .expect("Failed to send message");
    timeout(Duration::from_secs(1), rx.changed())
        .await
        .expect("No snapshot published for the message")
        .expect("Snapshot channel closed");
    {
        let snapshot = rx.borrow_and_update();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].parts, vec![Part::text("ping")]);
    }

    service.set_presence("bob", "online");
    timeout(Duration::from_secs(1), rx.changed())
        .await
        .expect("No snapshot published for the presence change")
        .expect("Snapshot channel closed");
    assert_eq!(
        rx.borrow().other_user.as_ref().and_then(|p| p.presence.clone()),
        Some("online".to_string())
    );

    worker.abort();
}
