//! Boundary crate for a real-time chat service.
//!
//! Defines the data types and the [`ChatService`] trait an integration layer
//! programs against, plus [`LocalChatService`], a complete in-memory
//! implementation for tests and single-process embedders.

pub mod error;
pub mod local;
pub mod service;
pub mod types;

pub use error::ChatServiceError;
pub use local::LocalChatService;
pub use service::{AuthToken, ChatService, StaticTokenProvider, TokenProvider};
pub use types::{Message, MessageId, Part, Room, RoomEvent, RoomSnapshot, User};
