//! One-to-one chat projection.
//!
//! [`OneToOneChat`] turns a raw room subscription into a reconciled local
//! view for a fixed (own user, peer) pair: an append-only message log, the
//! peer's typing flag, presence, and read cursor. Setup is strictly ordered
//! (session ready → room confirmed → subscribed → hydrated) so that no
//! event can be missed between room confirmation and view initialization,
//! and `is_loading` flips to false exactly once.
//!
//! Consumers observe the view through a [`watch`] channel of
//! [`ChatSnapshot`] values, published on every reconciliation step;
//! outbound actions stay as methods on the projector.

use log::{debug, error};
use tokio::sync::watch;

use chat_sdk::{ChatService, Message, MessageId, Part, RoomEvent, User};

use crate::error::ProjectorError;
use crate::provider::ChatHandle;
use crate::room_id::one_to_one_room_id;
use crate::state_machine::{ProjectorPhase, ProjectorStateMachine};

/// The reconciled public state for the other participant.
///
/// Built fresh on every publication by combining the service-owned user
/// record with the locally tracked derived fields; the base record is never
/// mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerView {
    pub user: User,
    pub is_typing: bool,
    pub presence: Option<String>,
    pub last_read_message_id: Option<MessageId>,
}

/// The full consumer-facing state, published on every change.
#[derive(Debug, Clone)]
pub struct ChatSnapshot {
    pub current_user: Option<User>,
    pub other_user: Option<PeerView>,
    pub messages: Vec<Message>,
    pub is_loading: bool,
}

/// Projector for a two-party conversation.
///
/// Keyed by the connected user and one peer, both fixed for the instance's
/// lifetime; talking to a different peer means constructing a new projector.
pub struct OneToOneChat<S> {
    handle: ChatHandle<S>,
    peer_id: String,
    machine: ProjectorStateMachine,

    current_user: Option<User>,
    room_id: Option<String>,
    peer: Option<User>,
    peer_typing: bool,
    peer_presence: Option<String>,
    peer_read_cursor: Option<MessageId>,
    messages: Vec<Message>,
    /// Highest message id this instance has advanced its own cursor to.
    last_sent_cursor: Option<MessageId>,

    events: Option<tokio::sync::mpsc::UnboundedReceiver<RoomEvent>>,
    snapshot_tx: watch::Sender<ChatSnapshot>,
}

impl<S: ChatService> OneToOneChat<S> {
    pub fn new(handle: ChatHandle<S>, peer_id: &str) -> Self {
        let (snapshot_tx, _) = watch::channel(ChatSnapshot {
            current_user: None,
            other_user: None,
            messages: Vec::new(),
            is_loading: true,
        });
        Self {
            handle,
            peer_id: peer_id.to_string(),
            machine: ProjectorStateMachine::new(),
            current_user: None,
            room_id: None,
            peer: None,
            peer_typing: false,
            peer_presence: None,
            peer_read_cursor: None,
            messages: Vec::new(),
            last_sent_cursor: None,
            events: None,
            snapshot_tx,
        }
    }

    /// Observe the reconciled view. The current snapshot is available
    /// immediately; a new one is published on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Run the setup sequence to completion.
    ///
    /// Suspends until the shared session is ready, then: compute the room
    /// id, create the room only if it is absent from the session's room
    /// list, subscribe to its events, and hydrate the initial view (peer
    /// record from the room membership, peer cursor by direct query).
    ///
    /// Any failure is logged and leaves the projector in `Failed`; nothing
    /// is propagated to the caller and no retry is attempted.
    pub async fn start(&mut self) {
        if let Err(e) = self.run_setup().await {
            error!(
                "[start]: one-to-one setup failed for peer {}: {e}",
                self.peer_id
            );
            self.machine.fail();
            self.publish();
        }
    }

    async fn run_setup(&mut self) -> Result<(), ProjectorError> {
        self.machine.await_session()?;
        self.handle.ready().await;
        let current_user = self
            .handle
            .current_user()
            .await
            .ok_or(ProjectorError::SessionNotReady)?;

        let room_id = one_to_one_room_id(&current_user.id, &self.peer_id);
        self.machine.begin_room_setup()?;
        let already_in_room = self
            .handle
            .service()
            .rooms(&current_user.id)
            .iter()
            .any(|r| r.id == room_id);
        if already_in_room {
            debug!("[run_setup]: room {room_id} already present, skipping creation");
        } else {
            self.handle
                .service()
                .create_one_to_one_room(&current_user.id, &self.peer_id)
                .await?;
        }

        // Subscribe before declaring readiness so nothing is missed between
        // room confirmation and view initialization.
        self.machine.begin_subscription()?;
        let (snapshot, events) = self.handle.service().subscribe_to_room(&room_id).await?;
        let peer = snapshot
            .users
            .iter()
            .find(|u| u.id == self.peer_id)
            .cloned()
            .ok_or_else(|| ProjectorError::PeerNotInRoom(self.peer_id.clone()))?;
        self.peer_read_cursor = self.handle.service().read_cursor(&room_id, &self.peer_id);

        self.current_user = Some(current_user);
        self.room_id = Some(room_id);
        self.peer = Some(peer);
        self.events = Some(events);
        self.machine.mark_ready()?;
        self.publish();
        Ok(())
    }

    /// Reconcile one inbound event into the local view.
    pub fn apply_event(&mut self, event: RoomEvent) {
        if !self.machine.is_ready() {
            debug!("[apply_event]: dropping event received before readiness: {event:?}");
            return;
        }
        match event {
            RoomEvent::Message(message) => {
                // Arrival order, append-only; the event source owns ordering
                // and deduplication guarantees.
                self.messages.push(message);
            }
            RoomEvent::TypingStarted { user_id } => {
                if user_id != self.peer_id {
                    return;
                }
                self.peer_typing = true;
            }
            RoomEvent::TypingStopped { user_id } => {
                if user_id != self.peer_id {
                    return;
                }
                self.peer_typing = false;
            }
            RoomEvent::PresenceChanged { user_id, presence } => {
                if user_id != self.peer_id {
                    return;
                }
                self.peer_presence = Some(presence);
            }
            RoomEvent::ReadCursorChanged { user_id, position } => {
                // The local user's cursor is tracked by set_read_cursor, not
                // reflected back into the peer view.
                if user_id != self.peer_id {
                    return;
                }
                self.peer_read_cursor = Some(position);
            }
        }
        self.publish();
    }

    /// Apply everything currently queued on the subscription.
    pub fn try_drain_events(&mut self) {
        loop {
            let event = match self.events.as_mut() {
                Some(rx) => rx.try_recv(),
                None => break,
            };
            match event {
                Ok(event) => self.apply_event(event),
                Err(_) => break,
            }
        }
    }

    /// Consume the projector and apply events until the service closes the
    /// stream. Pair with [`subscribe`](Self::subscribe) to observe state.
    pub async fn run(mut self) {
        let Some(mut rx) = self.events.take() else {
            debug!("[run]: projector has no subscription, nothing to do");
            return;
        };
        while let Some(event) = rx.recv().await {
            self.apply_event(event);
        }
        debug!(
            "[run]: event stream closed for peer {}, shutting down",
            self.peer_id
        );
    }

    /// Send a single `text/plain` part.
    pub async fn send_simple_message(&self, text: &str) -> Result<Message, ProjectorError> {
        self.send_multipart_message(vec![Part::text(text)]).await
    }

    /// Send a message with arbitrary typed parts. Service failures are
    /// propagated unchanged; no local state is touched on failure.
    pub async fn send_multipart_message(
        &self,
        parts: Vec<Part>,
    ) -> Result<Message, ProjectorError> {
        let (room_id, sender_id) = self.ready_room()?;
        let message = self
            .handle
            .service()
            .send_message(room_id, sender_id, parts)
            .await?;
        Ok(message)
    }

    /// Signal that the local user started typing.
    pub async fn send_typing_event(&self) -> Result<(), ProjectorError> {
        let (room_id, user_id) = self.ready_room()?;
        self.handle
            .service()
            .send_typing_indicator(room_id, user_id)
            .await?;
        Ok(())
    }

    /// Advance the local user's read cursor to the tail of the message log.
    ///
    /// Returns `Ok(None)` without a service call when the log is empty or
    /// the tail has already been advanced to. The local mark is recorded
    /// before the call resolves; it only suppresses duplicate sends and is
    /// not display state.
    pub async fn set_read_cursor(&mut self) -> Result<Option<MessageId>, ProjectorError> {
        let (room_id, user_id) = {
            let (room_id, user_id) = self.ready_room()?;
            (room_id.to_string(), user_id.to_string())
        };
        let Some(tail) = self.messages.last().map(|m| m.id) else {
            return Ok(None);
        };
        if self.last_sent_cursor.is_some_and(|mark| mark >= tail) {
            return Ok(None);
        }
        self.last_sent_cursor = Some(tail);
        self.handle
            .service()
            .set_read_cursor(&room_id, &user_id, tail)
            .await?;
        Ok(Some(tail))
    }

    fn ready_room(&self) -> Result<(&str, &str), ProjectorError> {
        match (self.room_id.as_deref(), self.current_user.as_ref()) {
            (Some(room_id), Some(user)) if self.machine.is_ready() => Ok((room_id, &user.id)),
            _ => Err(ProjectorError::SessionNotReady),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(ChatSnapshot {
            current_user: self.current_user.clone(),
            other_user: self.other_user(),
            messages: self.messages.clone(),
            is_loading: self.is_loading(),
        });
    }

    /// True until setup completes; stays true forever after a failure.
    pub fn is_loading(&self) -> bool {
        !self.machine.is_ready()
    }

    pub fn phase(&self) -> ProjectorPhase {
        self.machine.current_phase()
    }

    pub fn room_id(&self) -> Option<&str> {
        self.room_id.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// A fresh view of the peer combining their record with the tracked
    /// derived fields; `None` until setup completes.
    pub fn other_user(&self) -> Option<PeerView> {
        self.peer.as_ref().map(|user| PeerView {
            user: user.clone(),
            is_typing: self.peer_typing,
            presence: self.peer_presence.clone(),
            last_read_message_id: self.peer_read_cursor,
        })
    }
}
