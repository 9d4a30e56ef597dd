use chat_sdk::ChatServiceError;

#[derive(Debug, thiserror::Error)]
pub enum ProjectorError {
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
    #[error("Session is not ready")]
    SessionNotReady,
    #[error("Peer {0} is not a member of the room")]
    PeerNotInRoom(String),

    #[error(transparent)]
    Service(#[from] ChatServiceError),

    #[error("An unknown error occurred: {0}")]
    Other(anyhow::Error),
}
