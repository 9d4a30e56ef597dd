//! An in-process chat service.
//!
//! Implements the full [`ChatService`](crate::ChatService) surface against
//! in-memory state: a user registry, rooms with membership lists, per-room
//! message logs with a monotonic id counter, per-room subscriber lists, and
//! read-cursor / presence maps. Events are fanned out to subscribers over
//! unbounded channels in send order.
//!
//! Besides backing tests, this is a usable embedder for single-process
//! deployments; the extra control methods (`add_user`, `set_presence`,
//! `stop_typing`, ...) model the parts of a real service that originate
//! outside the client connection.

use std::collections::HashMap;
use std::sync::Mutex;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use log::{debug, info};
use tokio::sync::mpsc;

use crate::error::ChatServiceError;
use crate::service::{ChatService, TokenProvider};
use crate::types::{Message, MessageId, Part, Room, RoomEvent, RoomSnapshot, User};

/// Room id for an unordered user pair: lexicographically larger id first,
/// each id base64-encoded, joined with `-`. Must match the scheme clients
/// use to locate pair rooms.
fn one_to_one_room_id(user_a: &str, user_b: &str) -> String {
    let (first, second) = if user_b > user_a {
        (user_b, user_a)
    } else {
        (user_a, user_b)
    };
    format!("{}-{}", BASE64.encode(first), BASE64.encode(second))
}

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    rooms: HashMap<String, Room>,
    /// room id -> messages in send order
    messages: HashMap<String, Vec<Message>>,
    next_message_id: MessageId,
    /// room id -> live subscriber channels
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<RoomEvent>>>,
    /// (room id, user id) -> highest acknowledged message id
    read_cursors: HashMap<(String, String), MessageId>,
    presence: HashMap<String, String>,
    create_room_calls: usize,
    set_read_cursor_calls: usize,
}

impl Inner {
    fn broadcast(&mut self, room_id: &str, event: RoomEvent) {
        if let Some(senders) = self.subscribers.get_mut(room_id) {
            // Drop channels whose receiving side has gone away.
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn room(&self, room_id: &str) -> Result<&Room, ChatServiceError> {
        self.rooms
            .get(room_id)
            .ok_or_else(|| ChatServiceError::RoomNotFound(room_id.to_string()))
    }
}

/// In-memory [`ChatService`] implementation.
#[derive(Default)]
pub struct LocalChatService {
    inner: Mutex<Inner>,
}

impl LocalChatService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a user record with the service.
    pub fn add_user(&self, user: User) {
        self.lock().users.insert(user.id.clone(), user);
    }

    /// Seed a room directly, bypassing the create-room API (and its call
    /// counter).
    pub fn add_room(&self, room_id: &str, user_ids: Vec<String>) {
        let mut inner = self.lock();
        inner.rooms.insert(
            room_id.to_string(),
            Room {
                id: room_id.to_string(),
                user_ids,
            },
        );
        inner.messages.entry(room_id.to_string()).or_default();
    }

    /// Record a presence change for a user and notify every room they are
    /// a member of.
    pub fn set_presence(&self, user_id: &str, presence: &str) {
        let mut inner = self.lock();
        inner
            .presence
            .insert(user_id.to_string(), presence.to_string());
        let room_ids: Vec<String> = inner
            .rooms
            .values()
            .filter(|r| r.user_ids.iter().any(|id| id == user_id))
            .map(|r| r.id.clone())
            .collect();
        for room_id in room_ids {
            inner.broadcast(
                &room_id,
                RoomEvent::PresenceChanged {
                    user_id: user_id.to_string(),
                    presence: presence.to_string(),
                },
            );
        }
    }

    /// Signal that a user stopped typing in a room. A real service expires
    /// typing indicators server-side; here the embedder decides.
    pub fn stop_typing(&self, room_id: &str, user_id: &str) {
        self.lock().broadcast(
            room_id,
            RoomEvent::TypingStopped {
                user_id: user_id.to_string(),
            },
        );
    }

    /// The messages stored for a room, in send order.
    pub fn room_messages(&self, room_id: &str) -> Vec<Message> {
        self.lock().messages.get(room_id).cloned().unwrap_or_default()
    }

    /// How many times the create-room API has been called.
    pub fn create_room_calls(&self) -> usize {
        self.lock().create_room_calls
    }

    /// How many times the set-read-cursor API has been called.
    pub fn set_read_cursor_calls(&self) -> usize {
        self.lock().set_read_cursor_calls
    }
}

impl ChatService for LocalChatService {
    async fn connect<P: TokenProvider>(
        &self,
        locator: &str,
        token_provider: &P,
        user_id: &str,
    ) -> Result<User, ChatServiceError> {
        // Locator shape: "version:cluster:instance".
        if locator.split(':').count() != 3 || locator.split(':').any(str::is_empty) {
            return Err(ChatServiceError::InvalidLocator(locator.to_string()));
        }

        let token = token_provider.fetch_token().await?;
        debug!(
            "[connect]: token of {} bytes accepted for {user_id}",
            token.as_bytes().len()
        );

        let inner = self.lock();
        let user = inner
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ChatServiceError::UserNotFound(user_id.to_string()))?;
        info!("[connect]: user {user_id} connected");
        Ok(user)
    }

    fn rooms(&self, user_id: &str) -> Vec<Room> {
        let inner = self.lock();
        let mut rooms: Vec<Room> = inner
            .rooms
            .values()
            .filter(|r| r.user_ids.iter().any(|id| id == user_id))
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    async fn create_one_to_one_room(
        &self,
        owner_id: &str,
        peer_id: &str,
    ) -> Result<(), ChatServiceError> {
        let mut inner = self.lock();
        inner.create_room_calls += 1;
        for id in [owner_id, peer_id] {
            if !inner.users.contains_key(id) {
                return Err(ChatServiceError::UserNotFound(id.to_string()));
            }
        }
        let room_id = one_to_one_room_id(owner_id, peer_id);
        info!("[create_one_to_one_room]: creating room {room_id} for ({owner_id}, {peer_id})");
        inner.rooms.insert(
            room_id.clone(),
            Room {
                id: room_id.clone(),
                user_ids: vec![owner_id.to_string(), peer_id.to_string()],
            },
        );
        inner.messages.entry(room_id).or_default();
        Ok(())
    }

    async fn subscribe_to_room(
        &self,
        room_id: &str,
    ) -> Result<(RoomSnapshot, mpsc::UnboundedReceiver<RoomEvent>), ChatServiceError> {
        let mut inner = self.lock();
        let room = inner.room(room_id)?.clone();
        let users = room
            .user_ids
            .iter()
            .filter_map(|id| inner.users.get(id).cloned())
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        inner
            .subscribers
            .entry(room_id.to_string())
            .or_default()
            .push(tx);
        debug!("[subscribe_to_room]: new subscriber on room {room_id}");
        Ok((RoomSnapshot { room, users }, rx))
    }

    async fn send_message(
        &self,
        room_id: &str,
        sender_id: &str,
        parts: Vec<Part>,
    ) -> Result<Message, ChatServiceError> {
        let mut inner = self.lock();
        inner.room(room_id)?;
        let message = Message {
            id: inner.next_message_id,
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            parts,
            created_at: Utc::now(),
        };
        inner.next_message_id += 1;
        inner
            .messages
            .entry(room_id.to_string())
            .or_default()
            .push(message.clone());
        inner.broadcast(room_id, RoomEvent::Message(message.clone()));
        Ok(message)
    }

    async fn send_typing_indicator(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<(), ChatServiceError> {
        let mut inner = self.lock();
        inner.room(room_id)?;
        inner.broadcast(
            room_id,
            RoomEvent::TypingStarted {
                user_id: user_id.to_string(),
            },
        );
        Ok(())
    }

    async fn set_read_cursor(
        &self,
        room_id: &str,
        user_id: &str,
        position: MessageId,
    ) -> Result<(), ChatServiceError> {
        let mut inner = self.lock();
        inner.room(room_id)?;
        inner.set_read_cursor_calls += 1;
        inner
            .read_cursors
            .insert((room_id.to_string(), user_id.to_string()), position);
        inner.broadcast(
            room_id,
            RoomEvent::ReadCursorChanged {
                user_id: user_id.to_string(),
                position,
            },
        );
        Ok(())
    }

    fn read_cursor(&self, room_id: &str, user_id: &str) -> Option<MessageId> {
        self.lock()
            .read_cursors
            .get(&(room_id.to_string(), user_id.to_string()))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::StaticTokenProvider;

    const LOCATOR: &str = "v1:test:f83ad143-342f-4085-9639-9a809dc96466";

    fn service_with_users(ids: &[&str]) -> LocalChatService {
        let service = LocalChatService::new();
        for id in ids {
            service.add_user(User::new(id));
        }
        service
    }

    #[tokio::test]
    async fn connect_rejects_malformed_locator() {
        let service = service_with_users(&["alice"]);
        let res = service
            .connect("not-a-locator", &StaticTokenProvider::new(), "alice")
            .await;
        assert!(matches!(res, Err(ChatServiceError::InvalidLocator(_))));
    }

    #[tokio::test]
    async fn connect_rejects_unknown_user() {
        let service = service_with_users(&["alice"]);
        let res = service
            .connect(LOCATOR, &StaticTokenProvider::new(), "mallory")
            .await;
        assert!(matches!(res, Err(ChatServiceError::UserNotFound(_))));
    }

    #[tokio::test]
    async fn create_room_requires_both_users() {
        let service = service_with_users(&["alice"]);
        let res = service.create_one_to_one_room("alice", "bob").await;
        assert!(matches!(res, Err(ChatServiceError::UserNotFound(_))));
        assert_eq!(service.create_room_calls(), 1);
    }

    #[tokio::test]
    async fn messages_fan_out_to_all_subscribers_in_order() {
        let service = service_with_users(&["alice", "bob"]);
        service
            .create_one_to_one_room("alice", "bob")
            .await
            .expect("Failed to create room");
        let room_id = service.rooms("alice")[0].id.clone();

        let (_, mut rx_a) = service
            .subscribe_to_room(&room_id)
            .await
            .expect("Failed to subscribe");
        let (_, mut rx_b) = service
            .subscribe_to_room(&room_id)
            .await
            .expect("Failed to subscribe");

        let first = service
            .send_message(&room_id, "alice", vec![Part::text("one")])
            .await
            .expect("Failed to send message");
        let second = service
            .send_message(&room_id, "bob", vec![Part::text("two")])
            .await
            .expect("Failed to send message");
        assert!(second.id > first.id, "ids are not monotonic");

        for rx in [&mut rx_a, &mut rx_b] {
            assert_eq!(rx.try_recv().unwrap(), RoomEvent::Message(first.clone()));
            assert_eq!(rx.try_recv().unwrap(), RoomEvent::Message(second.clone()));
        }
    }

    #[tokio::test]
    async fn read_cursor_round_trip() {
        let service = service_with_users(&["alice", "bob"]);
        service
            .create_one_to_one_room("alice", "bob")
            .await
            .expect("Failed to create room");
        let room_id = service.rooms("bob")[0].id.clone();

        assert_eq!(service.read_cursor(&room_id, "bob"), None);
        service
            .set_read_cursor(&room_id, "bob", 7)
            .await
            .expect("Failed to set cursor");
        assert_eq!(service.read_cursor(&room_id, "bob"), Some(7));
        assert_eq!(service.set_read_cursor_calls(), 1);
    }

    #[tokio::test]
    async fn presence_reaches_every_shared_room() {
        let service = service_with_users(&["alice", "bob"]);
        service
            .create_one_to_one_room("alice", "bob")
            .await
            .expect("Failed to create room");
        let room_id = service.rooms("alice")[0].id.clone();
        let (_, mut rx) = service
            .subscribe_to_room(&room_id)
            .await
            .expect("Failed to subscribe");

        service.set_presence("bob", "online");
        assert_eq!(
            rx.try_recv().unwrap(),
            RoomEvent::PresenceChanged {
                user_id: "bob".to_string(),
                presence: "online".to_string(),
            }
        );
    }
}
