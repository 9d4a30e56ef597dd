//! State machine for the one-to-one projector setup lifecycle.
//!
//! A projector instance moves through a strictly ordered setup sequence and
//! ends in exactly one of two terminal situations: serving events (`Ready`)
//! or abandoned after a setup failure (`Failed`).
//!
//! # States
//!
//! - **Uninitialized**: Constructed, setup not started
//! - **AwaitingSession**: Waiting for the shared session to become ready
//! - **EnsuringRoom**: Checking room existence / issuing the create request
//! - **Subscribing**: Establishing the room event subscription
//! - **Ready**: Subscription live, initial view hydrated, events applied
//! - **Failed**: A setup step failed; terminal, no retry
//!
//! # State Transitions
//!
//! ```text
//! Uninitialized -- await_session() --> AwaitingSession
//! AwaitingSession -- begin_room_setup() --> EnsuringRoom
//! EnsuringRoom -- begin_subscription() --> Subscribing
//! Subscribing -- mark_ready() --> Ready
//! any state -- fail() --> Failed
//! ```

use std::fmt::Display;

use log::info;

use crate::error::ProjectorError;

/// Lifecycle phase of a one-to-one chat projector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectorPhase {
    /// Constructed, setup not started.
    Uninitialized,
    /// Waiting for the shared session to become ready.
    AwaitingSession,
    /// Confirming the pair room exists, creating it if not.
    EnsuringRoom,
    /// Establishing the room event subscription.
    Subscribing,
    /// Serving events; `is_loading` is false from here on.
    Ready,
    /// A setup step failed. Terminal, no retry.
    Failed,
}

impl Display for ProjectorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            ProjectorPhase::Uninitialized => "Uninitialized",
            ProjectorPhase::AwaitingSession => "AwaitingSession",
            ProjectorPhase::EnsuringRoom => "EnsuringRoom",
            ProjectorPhase::Subscribing => "Subscribing",
            ProjectorPhase::Ready => "Ready",
            ProjectorPhase::Failed => "Failed",
        };
        write!(f, "{phase}")
    }
}

/// Enforces the projector's setup ordering.
#[derive(Debug, Clone)]
pub struct ProjectorStateMachine {
    phase: ProjectorPhase,
}

impl ProjectorStateMachine {
    pub fn new() -> Self {
        Self {
            phase: ProjectorPhase::Uninitialized,
        }
    }

    pub fn current_phase(&self) -> ProjectorPhase {
        self.phase
    }

    pub fn is_ready(&self) -> bool {
        self.phase == ProjectorPhase::Ready
    }

    fn transition(
        &mut self,
        expected: ProjectorPhase,
        next: ProjectorPhase,
    ) -> Result<(), ProjectorError> {
        if self.phase != expected {
            return Err(ProjectorError::InvalidStateTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        self.phase = next;
        Ok(())
    }

    /// Begin waiting for session readiness.
    ///
    /// ## State Transition:
    /// Uninitialized → AwaitingSession
    pub fn await_session(&mut self) -> Result<(), ProjectorError> {
        self.transition(ProjectorPhase::Uninitialized, ProjectorPhase::AwaitingSession)
    }

    /// The session is ready; start confirming or creating the room.
    ///
    /// ## State Transition:
    /// AwaitingSession → EnsuringRoom
    pub fn begin_room_setup(&mut self) -> Result<(), ProjectorError> {
        self.transition(ProjectorPhase::AwaitingSession, ProjectorPhase::EnsuringRoom)
    }

    /// Room confirmed; start the event subscription.
    ///
    /// ## State Transition:
    /// EnsuringRoom → Subscribing
    pub fn begin_subscription(&mut self) -> Result<(), ProjectorError> {
        self.transition(ProjectorPhase::EnsuringRoom, ProjectorPhase::Subscribing)
    }

    /// Subscription established and initial view hydrated.
    ///
    /// ## State Transition:
    /// Subscribing → Ready
    pub fn mark_ready(&mut self) -> Result<(), ProjectorError> {
        self.transition(ProjectorPhase::Subscribing, ProjectorPhase::Ready)?;
        info!("[mark_ready]: projector transitioned to Ready");
        Ok(())
    }

    /// Record a setup failure. Allowed from any phase; terminal.
    pub fn fail(&mut self) {
        info!("[fail]: projector transitioned from {} to Failed", self.phase);
        self.phase = ProjectorPhase::Failed;
    }
}

impl Default for ProjectorStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
