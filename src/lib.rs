//! Integration layer between a real-time chat service and application code.
//!
//! One [`ChatProvider`] owns the single service connection per application
//! instance and hands out [`ChatHandle`] contexts to dependents. On top of
//! that, [`OneToOneChat`] projects a two-party room into a reconciled local
//! view: a deterministic room id per user pair, idempotent room setup, an
//! event subscription, and a message log / typing / presence / read-cursor
//! state published to consumers on every change.
//!
//! The chat service itself is consumed behind the [`chat_sdk::ChatService`]
//! trait; `chat_sdk` also ships an in-memory implementation for tests and
//! single-process embedders.

pub mod error;
pub mod projector;
pub mod provider;
pub mod room_id;
pub mod state_machine;

pub use error::ProjectorError;
pub use projector::{ChatSnapshot, OneToOneChat, PeerView};
pub use provider::{ChatHandle, ChatProvider, ProviderConfig, Session};
pub use room_id::one_to_one_room_id;
pub use state_machine::{ProjectorPhase, ProjectorStateMachine};
