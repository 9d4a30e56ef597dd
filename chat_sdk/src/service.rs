//! Service-facing interface: credential exchange plus the chat API surface
//! an integration layer programs against.

use std::future::Future;

use rand::{thread_rng, Rng};
use tokio::sync::mpsc;

use crate::error::ChatServiceError;
use crate::types::{Message, MessageId, Part, Room, RoomEvent, RoomSnapshot, User};

/// An opaque bearer token obtained from a credential provider.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthToken {
    token: Vec<u8>,
}

impl Default for AuthToken {
    fn default() -> Self {
        Self::random()
    }
}

impl AuthToken {
    pub fn random() -> Self {
        let token = thread_rng().gen::<[u8; 32]>().to_vec();
        Self { token }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.token
    }
}

/// Exchanges out-of-band credentials for a service auth token.
pub trait TokenProvider: Send + Sync + 'static {
    fn fetch_token(&self) -> impl Future<Output = Result<AuthToken, ChatServiceError>> + Send;
}

/// A token provider that hands out a fixed token without any round trip.
/// Suitable for local services and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenProvider {
    token: AuthToken,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(&self) -> Result<AuthToken, ChatServiceError> {
        Ok(self.token.clone())
    }
}

/// The chat service boundary.
///
/// One connection is expected per application instance; all other calls are
/// made against the connected user's id. Room event streams are delivered as
/// unbounded channels so no event between subscription and the first read is
/// lost.
pub trait ChatService: Send + Sync + 'static {
    /// Authenticate and connect as `user_id`, returning the connected user
    /// record. Fails on a malformed locator, a failing token provider, or an
    /// unknown user id.
    fn connect<P: TokenProvider>(
        &self,
        locator: &str,
        token_provider: &P,
        user_id: &str,
    ) -> impl Future<Output = Result<User, ChatServiceError>> + Send;

    /// Read-only snapshot of the rooms `user_id` currently belongs to.
    fn rooms(&self, user_id: &str) -> Vec<Room>;

    /// Create a two-party room for `owner_id` and `peer_id`. The room id is
    /// derived by the service from the unordered pair, so both sides of a
    /// conversation agree on it.
    fn create_one_to_one_room(
        &self,
        owner_id: &str,
        peer_id: &str,
    ) -> impl Future<Output = Result<(), ChatServiceError>> + Send;

    /// Subscribe to a room's event stream. Returns the current room snapshot
    /// together with the receiving end of the stream.
    fn subscribe_to_room(
        &self,
        room_id: &str,
    ) -> impl Future<
        Output = Result<(RoomSnapshot, mpsc::UnboundedReceiver<RoomEvent>), ChatServiceError>,
    > + Send;

    /// Store a message in the room and fan it out to subscribers.
    fn send_message(
        &self,
        room_id: &str,
        sender_id: &str,
        parts: Vec<Part>,
    ) -> impl Future<Output = Result<Message, ChatServiceError>> + Send;

    /// Signal that `user_id` started typing in the room.
    fn send_typing_indicator(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<(), ChatServiceError>> + Send;

    /// Advance `user_id`'s read cursor in the room to `position`.
    fn set_read_cursor(
        &self,
        room_id: &str,
        user_id: &str,
        position: MessageId,
    ) -> impl Future<Output = Result<(), ChatServiceError>> + Send;

    /// Synchronous cursor query, used for initial state hydration rather
    /// than waiting for a cursor event.
    fn read_cursor(&self, room_id: &str, user_id: &str) -> Option<MessageId>;
}
